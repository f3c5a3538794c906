use crate::errors::{AuthError, RepoError};
use crate::models::{Caption, CaptionWithImage, Image, NewCaption, Session, User};
use async_trait::async_trait;

/// Trait over the remote tabular store holding `captions` and `images`.
///
/// The `*_displayable` reads are the inner join of captions onto images with
/// blank URLs filtered out. Implementations must do that filtering inside
/// the store contract so that counts and pages agree with each other.
#[async_trait]
pub trait GalleryRepository: Send + Sync + 'static {
    /// Exact number of captions that have a displayable image.
    async fn count_displayable(&self) -> Result<u64, RepoError>;

    /// Captions with a displayable image, newest first, skipping `offset`
    /// rows and returning at most `limit`.
    async fn list_displayable(&self, offset: u64, limit: u32) -> Result<Vec<CaptionWithImage>, RepoError>;

    /// Inserts a new image row.
    async fn insert_image(&self, url: &str) -> Result<Image, RepoError>;

    /// Inserts a new caption row.
    async fn insert_caption(&self, caption: NewCaption) -> Result<Caption, RepoError>;
}

/// Trait over the hosted identity provider (OAuth with PKCE).
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// URL the browser is sent to for third-party sign-in.
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String;

    /// Trades the one-time code from the callback for a session.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// Resolves an access token. `Ok(None)` means the token is not valid.
    async fn get_user(&self, access_token: &str) -> Result<Option<User>, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}
