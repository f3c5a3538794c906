//! In-process backends for local development and tests.

use crate::{
    domain::{GalleryRepository, IdentityProvider},
    errors::{AuthError, RepoError},
    models::{is_displayable_url, Caption, CaptionWithImage, Image, NewCaption, Session, User},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Caption and image tables held in memory. Reads perform a real inner
/// join, so a caption whose image row is missing or blank never shows up.
#[derive(Default)]
pub struct InMemoryGalleryRepository {
    captions: RwLock<Vec<Caption>>,
    images: RwLock<HashMap<Uuid, Image>>,
    /// Number of store calls made, successful or not.
    pub store_calls: AtomicU64,
    pub fail_reads: AtomicBool,
    pub fail_image_inserts: AtomicBool,
    pub fail_caption_inserts: AtomicBool,
}

impl InMemoryGalleryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::Relaxed)
    }

    pub async fn image_count(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn caption_count(&self) -> usize {
        self.captions.read().await.len()
    }

    fn record_call(&self) {
        self.store_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<(), RepoError> {
        if flag.load(Ordering::Relaxed) {
            return Err(RepoError::BackendError(anyhow::anyhow!("injected {} failure", what)));
        }
        Ok(())
    }

    async fn joined(&self) -> Vec<CaptionWithImage> {
        let captions = self.captions.read().await;
        let images = self.images.read().await;
        let mut rows: Vec<CaptionWithImage> = captions
            .iter()
            .filter_map(|caption| {
                let image = images.get(&caption.image_id?)?;
                if !is_displayable_url(&image.url) {
                    return None;
                }
                Some(CaptionWithImage {
                    id: caption.id,
                    content: caption.content.clone(),
                    created_datetime_utc: caption.created_datetime_utc,
                    is_public: caption.is_public,
                    profile_id: caption.profile_id,
                    image_id: image.id,
                    image_url: image.url.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.created_datetime_utc.cmp(&a.created_datetime_utc));
        rows
    }
}

#[async_trait]
impl GalleryRepository for InMemoryGalleryRepository {
    async fn count_displayable(&self) -> Result<u64, RepoError> {
        self.record_call();
        Self::injected(&self.fail_reads, "read")?;
        Ok(self.joined().await.len() as u64)
    }

    async fn list_displayable(&self, offset: u64, limit: u32) -> Result<Vec<CaptionWithImage>, RepoError> {
        self.record_call();
        Self::injected(&self.fail_reads, "read")?;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(self
            .joined()
            .await
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect())
    }

    async fn insert_image(&self, url: &str) -> Result<Image, RepoError> {
        self.record_call();
        Self::injected(&self.fail_image_inserts, "image insert")?;
        let image = Image { id: Uuid::new_v4(), url: url.to_string() };
        self.images.write().await.insert(image.id, image.clone());
        tracing::debug!(image_id = %image.id, "Memory: Image inserted");
        Ok(image)
    }

    async fn insert_caption(&self, caption: NewCaption) -> Result<Caption, RepoError> {
        self.record_call();
        Self::injected(&self.fail_caption_inserts, "caption insert")?;
        let caption = Caption {
            id: Uuid::new_v4(),
            content: caption.content,
            created_datetime_utc: caption.created_datetime_utc,
            is_public: caption.is_public,
            profile_id: caption.profile_id,
            image_id: caption.image_id,
        };
        self.captions.write().await.push(caption.clone());
        tracing::debug!(caption_id = %caption.id, "Memory: Caption inserted");
        Ok(caption)
    }
}

/// Identity provider that signs every visitor in as one demo user.
///
/// `authorize_url` mints a one-time code and points straight back at the
/// callback, standing in for the third-party consent screen.
pub struct InMemoryIdentityProvider {
    demo_user: User,
    // Written from the sync `authorize_url`, hence a std mutex.
    pending_codes: std::sync::Mutex<HashMap<String, PendingCode>>,
    tokens: RwLock<TokenTable>,
    code_seq: AtomicU64,
}

struct PendingCode {
    challenge: String,
    minted_at: Instant,
    seq: u64,
}

/// Live token pairs. Each refresh token maps to the access token issued
/// alongside it, so rotating or signing out revokes both halves.
#[derive(Default)]
struct TokenTable {
    access: HashMap<String, User>,
    refresh: HashMap<String, (User, String)>,
}

impl TokenTable {
    fn revoke_user(&mut self, user_id: Uuid) {
        self.access.retain(|_, u| u.id != user_id);
        self.refresh.retain(|_, (u, _)| u.id != user_id);
    }
}

/// Unexchanged codes older than this are dropped.
pub const CODE_TTL: Duration = Duration::from_secs(300);
/// Upper bound on outstanding sign-in codes; the oldest is evicted first.
pub const MAX_PENDING_CODES: usize = 1024;

impl InMemoryIdentityProvider {
    pub fn new(demo_user_email: &str) -> Self {
        Self {
            demo_user: User { id: Uuid::new_v4(), email: Some(demo_user_email.to_string()) },
            pending_codes: std::sync::Mutex::new(HashMap::new()),
            tokens: RwLock::new(TokenTable::default()),
            code_seq: AtomicU64::new(0),
        }
    }

    /// Number of minted codes not yet exchanged.
    pub fn pending_code_count(&self) -> usize {
        self.pending_codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn demo_user(&self) -> &User {
        &self.demo_user
    }

    async fn issue_session(&self, user: User) -> Session {
        let access_token = Uuid::new_v4().simple().to_string();
        let refresh_token = Uuid::new_v4().simple().to_string();
        let mut tokens = self.tokens.write().await;
        tokens.access.insert(access_token.clone(), user.clone());
        tokens.refresh.insert(refresh_token.clone(), (user.clone(), access_token.clone()));
        drop(tokens);
        Session {
            access_token,
            refresh_token,
            expires_in: 3600,
            token_type: "bearer".to_string(),
            user,
        }
    }
}

fn rejected(status: u16, body: &str) -> AuthError {
    AuthError::Rejected { status, body: body.to_string() }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let code = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut pending = self.pending_codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|_, p| now.duration_since(p.minted_at) < CODE_TTL);
        if pending.len() >= MAX_PENDING_CODES {
            if let Some(oldest) = pending.iter().min_by_key(|(_, p)| p.seq).map(|(c, _)| c.clone()) {
                pending.remove(&oldest);
            }
        }
        pending.insert(code.clone(), PendingCode {
            challenge: code_challenge.to_string(),
            minted_at: now,
            seq: self.code_seq.fetch_add(1, Ordering::Relaxed),
        });
        drop(pending);
        tracing::debug!(%provider, "Memory: Minted sign-in code for demo user");
        let separator = if redirect_to.contains('?') { '&' } else { '?' };
        format!("{}{}code={}", redirect_to, separator, code)
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError> {
        let pending = self
            .pending_codes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(code)
            .filter(|p| p.minted_at.elapsed() < CODE_TTL)
            .ok_or_else(|| rejected(400, "invalid or expired code"))?;
        // Plain PKCE: the challenge is the verifier itself.
        if pending.challenge != code_verifier {
            return Err(rejected(400, "code verifier does not match"));
        }
        Ok(self.issue_session(self.demo_user.clone()).await)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let user = {
            let mut tokens = self.tokens.write().await;
            let (user, previous_access) = tokens
                .refresh
                .remove(refresh_token)
                .ok_or_else(|| rejected(400, "invalid refresh token"))?;
            tokens.access.remove(&previous_access);
            user
        };
        Ok(self.issue_session(user).await)
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<User>, AuthError> {
        Ok(self.tokens.read().await.access.get(access_token).cloned())
    }

    /// Global sign-out: every token issued to the user is revoked.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        let user_id = tokens
            .access
            .get(access_token)
            .map(|u| u.id)
            .ok_or_else(|| rejected(401, "invalid token"))?;
        tokens.revoke_user(user_id);
        Ok(())
    }
}
