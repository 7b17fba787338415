//! Warp filters for the strict and the global authorization modes

use std::convert::Infallible;
use std::sync::Arc;
use warp::http::{header, HeaderMap, Method, StatusCode};
use warp::path::FullPath;
use warp::{Filter, Rejection, Reply};

use crate::auth::token::extract_bearer_token;
use crate::constants::TOKEN_COOKIE;
use crate::core::gate::{AuthOutcome, CallerIdentity, Gate, RejectReason, RequestFacts};
use crate::security::with_api_security_headers;

/// Rejection raised by both authorization filters
#[derive(Debug)]
pub struct Unauthorized {
    pub reason: RejectReason,
}

impl warp::reject::Reject for Unauthorized {}

/// Token from the `token` cookie, else from `Authorization: Bearer`
pub fn extract_token(cookie: Option<&str>, authorization: Option<&str>) -> Option<String> {
    if let Some(token) = cookie.filter(|t| !t.is_empty()) {
        log::debug!("Token extracted from cookie");
        return Some(token.to_string());
    }
    if let Some(token) = authorization.and_then(extract_bearer_token) {
        log::debug!("Token extracted from Authorization header");
        return Some(token);
    }
    None
}

/// Value of cookie `name`. Header values that are not visible ASCII are
/// treated as absent.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Token carried by a request's headers, if any
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    extract_token(
        cookie_value(headers, TOKEN_COOKIE),
        header_str(headers, header::AUTHORIZATION),
    )
}

fn with_gate(gate: Arc<Gate>) -> impl Filter<Extract = (Arc<Gate>,), Error = Infallible> + Clone {
    warp::any().map(move || gate.clone())
}

/// Raw token carried by the request, if any. Never rejects.
pub fn request_token() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::headers_cloned().map(|headers: HeaderMap| token_from_headers(&headers))
}

/// Strict mode: yields the caller or rejects with 401
pub fn auth_required(
    gate: Arc<Gate>,
) -> impl Filter<Extract = (CallerIdentity,), Error = Rejection> + Clone {
    warp::path::full()
        .and(request_token())
        .and(with_gate(gate))
        .and_then(strict_check)
}

async fn strict_check(
    path: FullPath,
    token: Option<String>,
    gate: Arc<Gate>,
) -> Result<CallerIdentity, Rejection> {
    match gate.check_strict(path.as_str(), token.as_deref()).await {
        AuthOutcome::Authorized(caller) => Ok(caller),
        AuthOutcome::Rejected(failure) => Err(warp::reject::custom(Unauthorized {
            reason: failure.reason,
        })),
        // Strict mode never passes a request through
        AuthOutcome::PassThroughUnauthenticated => Err(warp::reject::custom(Unauthorized {
            reason: RejectReason::MissingToken,
        })),
    }
}

/// Global mode: yields the caller when authorized, `None` for allow-listed
/// paths and for browser page loads that failed the checks
pub fn global_auth(
    gate: Arc<Gate>,
) -> impl Filter<Extract = (Option<CallerIdentity>,), Error = Rejection> + Clone {
    warp::path::full()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(with_gate(gate))
        .and_then(global_check)
}

async fn global_check(
    path: FullPath,
    method: Method,
    headers: HeaderMap,
    gate: Arc<Gate>,
) -> Result<Option<CallerIdentity>, Rejection> {
    // Allow-listed paths never get their headers looked at
    if gate.is_public(path.as_str()) {
        log::debug!("Global gate: skipping auth for path {}", path.as_str());
        return Ok(None);
    }

    let token = token_from_headers(&headers);
    let request = RequestFacts {
        path: path.as_str(),
        method: &method,
        accept: header_str(&headers, header::ACCEPT),
        token: token.as_deref(),
    };
    match gate.check_global(&request).await {
        AuthOutcome::Authorized(caller) => Ok(Some(caller)),
        AuthOutcome::PassThroughUnauthenticated => Ok(None),
        AuthOutcome::Rejected(failure) => Err(warp::reject::custom(Unauthorized {
            reason: failure.reason,
        })),
    }
}

/// JSON body `{"error": message}` with the API headers
pub fn json_error(status: StatusCode, message: &str) -> warp::reply::Response {
    let body = warp::reply::json(&serde_json::json!({ "error": message }));
    with_api_security_headers(warp::reply::with_status(body, status)).into_response()
}

/// JSON body `{"message": message}` with the API headers
pub fn json_message(status: StatusCode, message: &str) -> warp::reply::Response {
    let body = warp::reply::json(&serde_json::json!({ "message": message }));
    with_api_security_headers(warp::reply::with_status(body, status)).into_response()
}

/// Turn rejections into JSON error responses
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(unauthorized) = err.find::<Unauthorized>() {
        (StatusCode::UNAUTHORIZED, unauthorized.reason.message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "invalid request body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    };

    Ok(json_error(status, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::security_logger::SecurityLogger;
    use crate::storage::MemoryCredentialStore;
    use warp::http::HeaderValue;

    fn gate() -> Arc<Gate> {
        Arc::new(Gate::from_settings(
            &Settings::for_testing(),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(SecurityLogger::new()),
        ))
    }

    fn unreadable() -> HeaderValue {
        HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap()
    }

    #[test]
    fn test_cookie_wins_over_header() {
        assert_eq!(
            extract_token(Some("from-cookie"), Some("Bearer from-header")),
            Some("from-cookie".to_string())
        );
    }

    #[test]
    fn test_header_fallback() {
        assert_eq!(
            extract_token(None, Some("Bearer from-header")),
            Some("from-header".to_string())
        );
        assert_eq!(
            extract_token(Some(""), Some("Bearer from-header")),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn test_no_token() {
        assert_eq!(extract_token(None, None), None);
        assert_eq!(extract_token(None, Some("Basic dXNlcjpwdw==")), None);
    }

    #[test]
    fn test_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; token=abc; lang=en"));
        assert_eq!(token_from_headers(&headers), Some("abc".to_string()));

        headers.insert(header::COOKIE, HeaderValue::from_static("tokens=nope"));
        assert_eq!(token_from_headers(&headers), None);
    }

    #[test]
    fn test_unreadable_headers_count_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, unreadable());
        headers.insert(header::COOKIE, unreadable());
        assert_eq!(token_from_headers(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer good"));
        assert_eq!(token_from_headers(&headers), Some("good".to_string()));
    }

    #[tokio::test]
    async fn test_strict_filter_unreadable_header_is_missing_token() {
        let filter = auth_required(gate());
        let rejection = warp::test::request()
            .path("/api/whoami")
            .header("authorization", unreadable())
            .filter(&filter)
            .await
            .unwrap_err();
        let unauthorized = rejection.find::<Unauthorized>().unwrap();
        assert_eq!(unauthorized.reason, RejectReason::MissingToken);
    }

    #[tokio::test]
    async fn test_global_filter_allow_list_ignores_headers() {
        let filter = global_auth(gate());
        let caller = warp::test::request()
            .method("POST")
            .path("/users/ping")
            .header("authorization", unreadable())
            .header("accept", unreadable())
            .filter(&filter)
            .await
            .unwrap();
        assert_eq!(caller, None);
    }

    #[tokio::test]
    async fn test_global_filter_page_load_with_unreadable_token() {
        let filter = global_auth(gate());
        let caller = warp::test::request()
            .path("/home")
            .header("accept", "text/html")
            .header("authorization", unreadable())
            .filter(&filter)
            .await
            .unwrap();
        assert_eq!(caller, None);
    }

    #[tokio::test]
    async fn test_global_filter_rejects_api_call_without_token() {
        let filter = global_auth(gate());
        let rejection = warp::test::request()
            .method("POST")
            .path("/home")
            .header("accept", "text/html")
            .filter(&filter)
            .await
            .unwrap_err();
        assert!(rejection.find::<Unauthorized>().is_some());
    }
}
