use crate::{
    domain::IdentityProvider,
    errors::AuthError,
    models::{Session, User},
};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing;
use uuid::Uuid;

/// New PKCE code verifier (64 characters, inside the 43..=128 range).
pub fn new_code_verifier() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Client for a hosted GoTrue-style auth REST API.
///
/// Uses the `plain` PKCE method, so the challenge sent to `/authorize` is
/// the verifier itself.
#[derive(Debug, Clone)]
pub struct HostedIdentityProvider {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
}

impl HostedIdentityProvider {
    pub fn new(auth_url: String, api_key: String) -> Self {
        let auth_url = auth_url.trim_end_matches('/').to_string();
        tracing::info!(%auth_url, "Initializing HostedIdentityProvider");
        Self { http: reqwest::Client::new(), auth_url, api_key }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url, path)
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, AuthError> {
        let resp = self
            .http
            .post(self.endpoint("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;
        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status, %body, "Identity provider rejected request");
        return Err(AuthError::Rejected { status, body });
    }
    Ok(resp.json::<T>().await?)
}

#[async_trait]
impl IdentityProvider for HostedIdentityProvider {
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let params = [
            ("provider", provider),
            ("redirect_to", redirect_to),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "plain"),
        ];
        match Url::parse_with_params(&self.endpoint("authorize"), &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(error = %e, auth_url = %self.auth_url, "Invalid identity provider URL");
                self.endpoint("authorize")
            }
        }
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError> {
        tracing::debug!("Exchanging sign-in code for session");
        self.token_grant(
            "pkce",
            serde_json::json!({ "auth_code": code, "code_verifier": code_verifier }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.token_grant("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<User>, AuthError> {
        let resp = self
            .http
            .get(self.endpoint("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        read_json::<User>(resp).await.map(Some)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let resp = self
            .http
            .post(self.endpoint("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected { status, body });
        }
        Ok(())
    }
}
