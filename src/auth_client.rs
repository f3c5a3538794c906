//! Per-client session handle over an [`IdentityProvider`].

use crate::{
    domain::IdentityProvider,
    errors::AuthError,
    identity::new_code_verifier,
    models::{Session, User},
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl SessionEvent {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionEvent::SignedIn(session) | SessionEvent::TokenRefreshed(session) => Some(&session.user),
            SessionEvent::SignedOut => None,
        }
    }
}

/// Receives session change notifications until dropped or unsubscribed.
pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    /// Next event, or `None` once the client is gone. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session subscriber lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

/// Holds one client's session, like a browser-side auth client would.
pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
    session: RwLock<Option<Session>>,
    pending_verifier: Mutex<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthClient {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            provider,
            session: RwLock::new(None),
            pending_verifier: Mutex::new(None),
            events,
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Validates the current access token with the provider.
    pub async fn get_user(&self) -> Result<Option<User>, AuthError> {
        let token = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => return Ok(None),
        };
        self.provider.get_user(&token).await
    }

    pub fn on_auth_state_change(&self) -> SessionSubscription {
        SessionSubscription { rx: self.events.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Starts a third-party sign-in and returns the URL to redirect to.
    pub async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> String {
        let verifier = new_code_verifier();
        let url = self.provider.authorize_url(provider, redirect_to, &verifier);
        *self.pending_verifier.lock().await = Some(verifier);
        url
    }

    /// Completes a sign-in started by [`Self::sign_in_with_oauth`].
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError> {
        let verifier = self
            .pending_verifier
            .lock()
            .await
            .take()
            .ok_or(AuthError::MissingVerifier)?;
        let session = self.provider.exchange_code(code, &verifier).await?;
        *self.session.write().await = Some(session.clone());
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.publish(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let refresh_token = match self.session.read().await.as_ref() {
            Some(session) => session.refresh_token.clone(),
            None => return Err(AuthError::NotSignedIn),
        };
        let session = self.provider.refresh(&refresh_token).await?;
        *self.session.write().await = Some(session.clone());
        self.publish(SessionEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    /// Drops the local session and notifies subscribers, then revokes the
    /// token with the provider.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.session.write().await.take();
        self.publish(SessionEvent::SignedOut);
        match previous {
            Some(session) => self.provider.sign_out(&session.access_token).await,
            None => Ok(()),
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
