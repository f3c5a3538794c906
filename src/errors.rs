use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use aws_smithy_types::error::operation::BuildError;
use thiserror::Error;
use uuid::Uuid;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Image not found with ID: {0}")]
    ImageNotFound(Uuid),

    #[error("Stored data could not be parsed: {0}")]
    DataCorruption(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("No active session")]
    NotSignedIn,

    #[error("No pending sign-in to complete")]
    MissingVerifier,
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Page numbers start at 1, got {0}")]
    InvalidPage(u32),

    #[error("Could not read gallery: {0}")]
    Store(#[from] RepoError),
}

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to save image")]
    ImageInsert(#[source] RepoError),

    #[error("Failed to save caption")]
    CaptionInsert {
        orphaned_image: Uuid,
        #[source]
        source: RepoError,
    },
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Authentication required")]
    Unauthorized,

    // Domain/Service level errors
    #[error("Could not read gallery data")]
    RepositoryError(#[source] RepoError),
    #[error("Identity provider error")]
    AuthError(#[source] AuthError),
    #[error("{0}")]
    CaptionWrite(#[source] CaptionError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),
    #[error("AWS request build error: {0}")]
    BuildError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::RepositoryError(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotSignedIn => AppError::Unauthorized,
            AuthError::MissingVerifier => {
                AppError::InvalidInput("sign-in was not started from this browser".to_string())
            }
            e => AppError::AuthError(e),
        }
    }
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        match err {
            e @ GalleryError::InvalidPage(_) => AppError::InvalidInput(e.to_string()),
            GalleryError::Store(e) => AppError::RepositoryError(e),
        }
    }
}

impl From<CaptionError> for AppError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::Validation(msg) => AppError::InvalidInput(msg),
            e => AppError::CaptionWrite(e),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<BuildError> for AppError {
    fn from(err: BuildError) -> Self {
        AppError::BuildError(format!("{}", err))
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".to_string()),

            // 5xx Server Errors
            AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string())
            }
            AppError::AuthError(e) => {
                tracing::error!(error.source = ?e, "Identity provider error occurred");
                (StatusCode::BAD_GATEWAY, "Identity provider request failed".to_string())
            }
            AppError::CaptionWrite(e) => {
                if let CaptionError::CaptionInsert { orphaned_image, .. } = e {
                    tracing::warn!(image_id = %orphaned_image, "Image row left without a caption");
                }
                tracing::error!(error.source = ?e, "Caption write failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::BuildError(msg) => {
                tracing::error!("AWS request build error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::IoError(e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        tracing::debug!(error.message = %error_message, error.status = %status, "Responding with error");

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}
