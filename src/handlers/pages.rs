//! Service endpoints and the small HTML pages

use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::constants::LOGIN_PAGE;
use crate::core::gate::CallerIdentity;
use crate::handlers::AppState;
use crate::security::{with_api_security_headers, with_page_security_headers};

fn html_page(title: &str, body: &str) -> warp::reply::Response {
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n</body>\n</html>\n",
        title, body
    );
    with_page_security_headers(warp::reply::html(html)).into_response()
}

/// Minimal HTML escaping for text nodes
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Redirects to the login page unless the server rendered a signed-in view
fn login_guard_script() -> String {
    format!(
        "<script>if (!document.getElementById('caller')) {{ window.location.replace('{}'); }}</script>",
        LOGIN_PAGE
    )
}

pub fn login_page() -> warp::reply::Response {
    html_page(
        "Sign in",
        r#"<h1>Sign in</h1>
<form id="login">
  <input name="username" placeholder="Username" autocomplete="username">
  <input name="password" type="password" placeholder="Password" autocomplete="current-password">
  <button type="submit">Sign in</button>
</form>
<p><a href="/users/to_register">Create an account</a></p>
<script>
document.getElementById('login').addEventListener('submit', async (event) => {
  event.preventDefault();
  const form = new FormData(event.target);
  const response = await fetch('/users/login', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ username: form.get('username'), password: form.get('password') }),
  });
  if (response.ok) { window.location.replace('/home'); }
});
</script>"#,
    )
}

pub fn register_page() -> warp::reply::Response {
    html_page(
        "Register",
        r#"<h1>Register</h1>
<form id="register">
  <input name="email" type="email" placeholder="Email">
  <button type="button" id="send-code">Send code</button>
  <input name="code" placeholder="Verification code">
  <input name="username" placeholder="Username">
  <input name="password" type="password" placeholder="Password">
  <button type="submit">Register</button>
</form>
<script>
const form = document.getElementById('register');
const post = (path, body) => fetch(path, {
  method: 'POST',
  headers: { 'Content-Type': 'application/json' },
  body: JSON.stringify(body),
});
document.getElementById('send-code').addEventListener('click', () => {
  post('/users/send_code', { email: new FormData(form).get('email') });
});
form.addEventListener('submit', async (event) => {
  event.preventDefault();
  const data = Object.fromEntries(new FormData(form));
  const response = await post('/users/register', data);
  if (response.ok) { window.location.replace('/users/to_login'); }
});
</script>"#,
    )
}

/// `GET /home`, reached through the global gate
pub async fn home(caller: Option<CallerIdentity>) -> Result<warp::reply::Response, Rejection> {
    let body = match caller {
        Some(caller) => format!(
            "<h1>Home</h1>\n<p id=\"caller\">Signed in as {}</p>",
            escape_html(&caller.subject)
        ),
        None => format!("<h1>Home</h1>\n{}", login_guard_script()),
    };
    Ok(html_page("Home", &body))
}

/// `GET /api/whoami`, strict
pub async fn whoami(caller: CallerIdentity) -> Result<warp::reply::Response, Rejection> {
    let body = warp::reply::json(&serde_json::json!({ "user": caller.subject }));
    Ok(with_api_security_headers(body).into_response())
}

/// `GET /health`
pub async fn health(state: AppState) -> Result<warp::reply::Response, Rejection> {
    let store = state.gate.sessions().store();
    let store_status = match store.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            log::warn!("Health check: credential store ping failed: {}", e);
            "unavailable".to_string()
        }
    };

    let body = warp::reply::json(&serde_json::json!({
        "status": "ok",
        "store": {
            "backend": store.backend_name(),
            "status": store_status,
        }
    }));
    Ok(with_api_security_headers(warp::reply::with_status(body, StatusCode::OK)).into_response())
}
