//! Session boundary for views that depend on who is signed in.

use crate::{auth_client::AuthClient, models::User};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};

/// Path of the route the provider redirects back to after sign-in.
pub const CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    /// False until the initial user lookup (or a session event) has landed.
    pub resolved: bool,
}

/// Mirrors the provider session into view state for as long as it is mounted.
///
/// Mounting subscribes to session changes and asks for the current user
/// once. The listener task is stopped on [`SessionBoundary::teardown`] or
/// drop, after which the state no longer changes.
pub struct SessionBoundary {
    client: Arc<AuthClient>,
    state: watch::Receiver<SessionState>,
    listener: JoinHandle<()>,
    oauth_provider: String,
    public_origin: String,
}

impl SessionBoundary {
    pub fn mount(client: Arc<AuthClient>, oauth_provider: &str, public_origin: &str) -> Self {
        let (tx, state) = watch::channel(SessionState::default());
        // Subscribe before the lookup so no change can slip in between.
        let mut subscription = client.on_auth_state_change();
        let lookup_client = client.clone();

        let listener = tokio::spawn(async move {
            let user = match lookup_client.get_user().await {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not resolve current user");
                    None
                }
            };
            tx.send_replace(SessionState { user, resolved: true });

            while let Some(event) = subscription.recv().await {
                tracing::debug!(signed_in = event.user().is_some(), "Session changed");
                tx.send_replace(SessionState { user: event.user().cloned(), resolved: true });
            }
        });

        Self {
            client,
            state,
            listener,
            oauth_provider: oauth_provider.to_string(),
            public_origin: public_origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn protected_visible(&self) -> bool {
        self.state.borrow().user.is_some()
    }

    pub fn form_visible(&self) -> bool {
        self.protected_visible()
    }

    /// Waits until the state satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Option<SessionState>
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = self.state.clone();
        let state = rx.wait_for(predicate).await.ok()?.clone();
        Some(state)
    }

    /// Starts third-party sign-in. Returns the provider URL to redirect to.
    pub async fn sign_in(&self) -> String {
        let redirect_to = format!("{}{}", self.public_origin, CALLBACK_PATH);
        self.client.sign_in_with_oauth(&self.oauth_provider, &redirect_to).await
    }

    /// Ends the session. Provider errors are logged only.
    pub async fn sign_out(&self) {
        if let Err(e) = self.client.sign_out().await {
            tracing::warn!(error = %e, "Sign-out failed at the provider");
        }
    }

    /// Stops listening and waits for the listener to finish.
    pub async fn teardown(mut self) {
        self.listener.abort();
        let _ = (&mut self.listener).await;
    }
}

impl Drop for SessionBoundary {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryIdentityProvider;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn client() -> Arc<AuthClient> {
        Arc::new(AuthClient::new(Arc::new(InMemoryIdentityProvider::new("viewer@example.com"))))
    }

    async fn sign_in(client: &AuthClient) {
        let url = client.sign_in_with_oauth("google", "http://localhost/auth/callback").await;
        let code = url.split("code=").nth(1).unwrap().to_string();
        client.exchange_code_for_session(&code).await.unwrap();
    }

    #[tokio::test]
    async fn mount_without_session_resolves_signed_out() {
        let boundary = SessionBoundary::mount(client(), "google", "http://localhost:3000");
        let state = timeout(WAIT, boundary.wait_for(|s| s.resolved)).await.unwrap().unwrap();
        assert_eq!(state.user, None);
        assert!(!boundary.protected_visible());
        assert!(!boundary.form_visible());
    }

    #[tokio::test]
    async fn mount_picks_up_existing_session() {
        let client = client();
        sign_in(&client).await;

        let boundary = SessionBoundary::mount(client, "google", "http://localhost:3000");
        let state = timeout(WAIT, boundary.wait_for(|s| s.resolved)).await.unwrap().unwrap();
        assert_eq!(boundary.state(), state);
        assert_eq!(boundary.user(), state.user);
        assert_eq!(state.user.and_then(|u| u.email).as_deref(), Some("viewer@example.com"));
        assert!(boundary.protected_visible());
    }

    #[tokio::test]
    async fn sign_out_hides_protected_content_and_form() {
        let client = client();
        let boundary = SessionBoundary::mount(client.clone(), "google", "http://localhost:3000");
        timeout(WAIT, boundary.wait_for(|s| s.resolved)).await.unwrap();

        sign_in(&client).await;
        timeout(WAIT, boundary.wait_for(|s| s.user.is_some())).await.unwrap();
        assert!(boundary.protected_visible());
        assert!(boundary.form_visible());

        boundary.sign_out().await;
        timeout(WAIT, boundary.wait_for(|s| s.user.is_none())).await.unwrap();
        assert!(!boundary.protected_visible());
        assert!(!boundary.form_visible());
    }

    #[tokio::test]
    async fn sign_in_redirects_to_callback_route() {
        let boundary = SessionBoundary::mount(client(), "google", "https://gallery.example.com/");
        let url = boundary.sign_in().await;
        assert!(url.starts_with("https://gallery.example.com/auth/callback?code="));
    }

    #[tokio::test]
    async fn teardown_unsubscribes() {
        let client = client();
        let boundary = SessionBoundary::mount(client.clone(), "google", "http://localhost:3000");
        timeout(WAIT, boundary.wait_for(|s| s.resolved)).await.unwrap();
        assert_eq!(client.subscriber_count(), 1);

        boundary.teardown().await;
        assert_eq!(client.subscriber_count(), 0);

        // Events after teardown go nowhere and do not panic.
        sign_in(&client).await;
    }
}
