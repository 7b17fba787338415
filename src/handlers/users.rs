//! Account endpoints under `/users`

use serde::Deserialize;
use std::time::Duration;
use warp::http::{header, StatusCode};
use warp::{Filter, Rejection, Reply};

use crate::constants::TOKEN_COOKIE;
use crate::error::GateError;
use crate::handlers::auth::{json_error, json_message, request_token};
use crate::handlers::{pages, with_state, AppState};
use crate::security::{with_api_security_headers, AuthTimer};
use crate::security_logger::SecurityEvent;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `Set-Cookie` value carrying a fresh token
pub fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly",
        TOKEN_COOKIE,
        token,
        ttl.as_secs()
    )
}

/// `Set-Cookie` value that removes the token cookie
pub fn cleared_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly", TOKEN_COOKIE)
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// All `/users` routes
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let send_code = warp::path!("users" / "send_code")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(send_code);

    let verify_code = warp::path!("users" / "verify_code")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(verify_code);

    let register = warp::path!("users" / "register")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(register);

    let login = warp::path!("users" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(login);

    let logout = warp::path!("users" / "logout")
        .and(warp::post())
        .and(request_token())
        .and(with_state(state))
        .and_then(logout);

    let to_login = warp::path!("users" / "to_login")
        .and(warp::get())
        .map(pages::login_page);

    let to_register = warp::path!("users" / "to_register")
        .and(warp::get())
        .map(pages::register_page);

    send_code
        .or(verify_code)
        .unify()
        .or(register)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .or(to_login)
        .unify()
        .or(to_register)
        .unify()
}

pub async fn send_code(
    request: SendCodeRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    match state.verification.send_code(&request.email).await {
        Ok(()) => Ok(json_message(StatusCode::OK, "code sent")),
        Err(e @ GateError::ValidationError(_)) | Err(e @ GateError::EmailDomainNotAllowed(_)) => {
            log::info!("Verification code refused: {}", e);
            Ok(json_error(StatusCode::BAD_REQUEST, &e.to_string()))
        }
        Err(e) => {
            log::error!("Failed to send verification code: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to send code"))
        }
    }
}

pub async fn verify_code(
    request: VerifyCodeRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    match state
        .verification
        .verify_code(&request.email, &request.code)
        .await
    {
        Ok(()) => Ok(json_message(StatusCode::OK, "ok")),
        Err(GateError::CodeNotFound) | Err(GateError::InvalidCode) => {
            Ok(json_error(StatusCode::BAD_REQUEST, "invalid or expired code"))
        }
        Err(e) => {
            log::error!("Failed to verify code: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to verify code"))
        }
    }
}

pub async fn register(
    request: RegisterRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    match state
        .verification
        .verify_code(&request.email, &request.code)
        .await
    {
        Ok(()) => {}
        Err(GateError::CodeNotFound) | Err(GateError::InvalidCode) => {
            return Ok(json_error(StatusCode::BAD_REQUEST, "invalid or expired code"));
        }
        Err(e) => {
            log::error!("Failed to verify code during registration: {}", e);
            return Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to verify code"));
        }
    }

    match state
        .users
        .create_user(&request.username, &request.email, &request.password)
        .await
    {
        Ok(user) => {
            log::info!("Registered user {}", user.username);
            Ok(json_message(StatusCode::CREATED, "registered"))
        }
        Err(e @ GateError::UserExists) | Err(e @ GateError::ValidationError(_)) => {
            Ok(json_error(StatusCode::BAD_REQUEST, &e.to_string()))
        }
        Err(e) => {
            log::error!("Failed to create user: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "registration failed"))
        }
    }
}

pub async fn login(
    request: LoginRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    let timer = AuthTimer::new(state.settings.login_min_duration);

    let user = match state
        .users
        .authenticate(&request.username, &request.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            state
                .gate
                .security()
                .log_event(SecurityEvent::AuthenticationFailed {
                    user: Some(request.username.clone()),
                    reason: e.to_string(),
                })
                .await;
            timer.wait().await;
            return Ok(match e {
                GateError::InvalidCredentials => {
                    json_error(StatusCode::UNAUTHORIZED, "invalid credentials")
                }
                _ => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
            });
        }
    };

    let result = state.gate.login(&user.username).await;
    timer.wait().await;

    match result {
        Ok(grant) => {
            let body = warp::reply::json(&serde_json::json!({ "token": grant.token }));
            let reply = warp::reply::with_header(
                body,
                header::SET_COOKIE,
                session_cookie(&grant.token, grant.ttl),
            );
            Ok(with_api_security_headers(reply).into_response())
        }
        Err(GateError::StoreUnavailable(_)) => Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "session store unavailable",
        )),
        Err(e) => {
            log::error!("Login failed for {}: {}", user.username, e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

pub async fn logout(
    token: Option<String>,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    let token = match token {
        Some(token) => token,
        None => return Ok(json_error(StatusCode::BAD_REQUEST, "no token")),
    };

    state.gate.logout(&token).await;

    let reply = warp::reply::with_header(
        json_message(StatusCode::OK, "logged out"),
        header::SET_COOKIE,
        cleared_cookie(),
    );
    Ok(reply.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_format() {
        assert_eq!(
            session_cookie("abc", Duration::from_secs(86400)),
            "token=abc; Path=/; Max-Age=86400; HttpOnly"
        );
    }

    #[test]
    fn test_cleared_cookie_format() {
        assert_eq!(cleared_cookie(), "token=; Path=/; Max-Age=0; HttpOnly");
    }
}
