use crate::{
    captions::{self, CaptionForm},
    errors::{AppError, AuthError},
    identity::new_code_verifier,
    middleware::{cookie_value, SignedIn},
    models::GalleryPage,
    session::CALLBACK_PATH,
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing;

/// Cookie carrying the PKCE verifier between sign-in and callback.
pub const VERIFIER_COOKIE: &str = "gallery_code_verifier";

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    error_description: Option<String>,
}

/// Handler for GET /captions?page=N
pub async fn list_captions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<GalleryPage>, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let page = query.page.unwrap_or(1);
    let gallery_page = state.gallery.page(page).await?;
    tracing::debug!(page, returned = gallery_page.captions.len(), total_pages = gallery_page.total_pages, "Served gallery page");
    Ok(Json(gallery_page))
}

/// Handler for GET /auth/sign-in. Redirects to the third-party provider.
pub async fn sign_in(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let verifier = new_code_verifier();
    let redirect_to = format!("{}{}", state.public_origin, CALLBACK_PATH);
    let url = state
        .identity
        .authorize_url(&state.oauth_provider, &redirect_to, &verifier);
    tracing::debug!(provider = %state.oauth_provider, "Starting sign-in");

    let cookie = format!(
        "{}={}; Path=/auth; HttpOnly; SameSite=Lax; Max-Age=600",
        VERIFIER_COOKIE, verifier
    );
    ([(header::SET_COOKIE, cookie)], Redirect::temporary(&url))
}

/// Handler for GET /auth/callback?code=...
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    let code = query.code.ok_or_else(|| {
        AppError::InvalidInput(
            query
                .error_description
                .unwrap_or_else(|| "missing sign-in code".to_string()),
        )
    })?;
    let verifier = cookie_value(&headers, VERIFIER_COOKIE).ok_or(AuthError::MissingVerifier)?;

    let session = state.identity.exchange_code(&code, verifier).await?;
    tracing::info!(user_id = %session.user.id, "Sign-in completed");

    let clear = format!("{}=; Path=/auth; HttpOnly; SameSite=Lax; Max-Age=0", VERIFIER_COOKIE);
    Ok(([(header::SET_COOKIE, clear)], Json(session)))
}

/// Handler for POST /auth/sign-out. Always answers 204.
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    Extension(signed_in): Extension<SignedIn>,
) -> StatusCode {
    match state.identity.sign_out(&signed_in.access_token).await {
        Ok(()) => tracing::info!(user_id = %signed_in.user.id, "Signed out"),
        Err(e) => tracing::warn!(user_id = %signed_in.user.id, error = %e, "Sign-out failed at the provider"),
    }
    StatusCode::NO_CONTENT
}

/// Handler for GET /protected
pub async fn protected(Extension(signed_in): Extension<SignedIn>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": signed_in.user.id,
        "email": signed_in.user.email,
    }))
}

/// Handler for POST /protected/captions
pub async fn create_caption(
    State(state): State<Arc<AppState>>,
    Extension(signed_in): Extension<SignedIn>,
    form: Result<Json<CaptionForm>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = form.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let caption = captions::create_caption(state.repo.as_ref(), &signed_in.user, &form).await?;
    Ok((StatusCode::CREATED, Json(caption)))
}
