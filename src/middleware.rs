use crate::{errors::AppError, models::User, AppState};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Stored as a request extension on gated routes.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub access_token: String,
}

/// Rejects requests without a valid bearer token.
///
/// The token is resolved with the identity provider on every request; the
/// resulting user is handed to handlers via `Extension<SignedIn>`.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(req.headers())
        .ok_or(AppError::Unauthorized)?
        .to_string();

    let user = state.identity.get_user(&token).await?.ok_or_else(|| {
        tracing::debug!("Rejected request with unknown or expired token");
        AppError::Unauthorized
    })?;

    req.extensions_mut().insert(SignedIn { user, access_token: token });
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Value of a cookie from the `Cookie` request header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
