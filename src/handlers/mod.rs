//! HTTP surface: shared state, filters and the route table

pub mod auth;
pub mod pages;
pub mod users;

use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::auth::mailer::Mailer;
use crate::auth::user::UserDirectory;
use crate::auth::verification::VerificationService;
use crate::config::Settings;
use crate::core::gate::{CallerIdentity, Gate};
use crate::security_logger::SecurityLogger;
use crate::storage::SharedCredentialStore;

pub use auth::{auth_required, extract_token, global_auth, handle_rejection, Unauthorized};

/// Everything a handler may need, cheap to clone per request
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
    pub users: Arc<dyn UserDirectory>,
    pub verification: Arc<VerificationService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the gate and the verification service over one credential store
    pub fn new(
        settings: Settings,
        store: SharedCredentialStore,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        security: Arc<SecurityLogger>,
    ) -> Self {
        let gate = Gate::from_settings(&settings, store.clone(), security);
        let verification = VerificationService::new(
            store,
            mailer,
            settings.email_domain_whitelist.clone(),
            settings.store.default_ttl,
        );
        Self {
            gate: Arc::new(gate),
            users,
            verification: Arc::new(verification),
            settings: Arc::new(settings),
        }
    }
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// A matched route. Pages that render differently for signed-in callers
/// are resolved once the global gate has run.
enum Routed {
    Reply(warp::reply::Response),
    Home,
}

/// The complete application.
///
/// Every request passes the global filter first: allow-listed prefixes
/// (`/users`, `/health` by default) go straight through, browser page loads
/// continue with an optional caller, anything else needs a live session.
/// `/api` routes additionally use the strict filter.
pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(pages::health);

    let whoami = warp::path!("api" / "whoami")
        .and(warp::get())
        .and(auth_required(state.gate.clone()))
        .and_then(pages::whoami);

    let replies = users::routes(state.clone())
        .or(health)
        .unify()
        .or(whoami)
        .unify()
        .map(Routed::Reply);

    let home = warp::path!("home").and(warp::get()).map(|| Routed::Home);

    global_auth(state.gate)
        .and(replies.or(home).unify())
        .and_then(render)
        .with(warp::log("session_gate::access"))
        .recover(handle_rejection)
}

async fn render(
    caller: Option<CallerIdentity>,
    routed: Routed,
) -> Result<warp::reply::Response, Rejection> {
    match routed {
        Routed::Reply(reply) => Ok(reply),
        Routed::Home => pages::home(caller).await,
    }
}
