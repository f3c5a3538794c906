use crate::{handlers, middleware::require_session, AppState};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/protected", get(handlers::protected))
        .route("/protected/captions", post(handlers::create_caption))
        .route("/auth/sign-out", post(handlers::sign_out))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/captions", get(handlers::list_captions))
        .route("/auth/sign-in", get(handlers::sign_in))
        .route("/auth/callback", get(handlers::auth_callback))
        .merge(gated)
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
