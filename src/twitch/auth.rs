//! Client-credentials grant flow.
//!
//! [`Authenticator::authenticate`] is called once at startup, before the
//! server accepts requests. It reuses the token persisted on disk when there
//! is one and otherwise asks the identity provider for a new one.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::io;
use crate::token::{AccessToken, TokenStore};

const TOKEN_PATH: &str = "/oauth2/token";
const VALIDATE_PATH: &str = "/oauth2/validate";
const GRANT_TYPE: &str = "client_credentials";

/// Application credentials.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
struct GrantRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct GrantResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
    token_type: Option<String>,
}

/// Obtains and validates the application access token.
pub struct Authenticator {
    http: reqwest::Client,
    credentials: Credentials,
    id_url: String,
    token_path: PathBuf,
    store: Arc<TokenStore>,
}

impl Authenticator {
    /// Create a new [`Authenticator`].
    pub fn new(
        http: reqwest::Client,
        credentials: Credentials,
        id_url: impl Into<String>,
        token_path: PathBuf,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            http,
            credentials,
            id_url: id_url.into(),
            token_path,
            store,
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Install a usable token in the store: the persisted one when it can be
    /// read and has not expired, otherwise a freshly granted one.
    pub async fn authenticate(&self) -> Result<AccessToken> {
        if let Some(dir) = self.token_path.parent() {
            if !dir.as_os_str().is_empty() {
                io::ensure_directory(dir).await?;
            }
        }

        let token = match self.load_from_disk().await {
            Some(token) if token.is_expired() => {
                tracing::info!(expired_at = %token.expires_at(), "stored token expired; generating a new one");
                self.request_new_token().await?
            },
            Some(token) => token,
            None => {
                tracing::info!("no usable stored token; generating a new one");
                self.request_new_token().await?
            },
        };

        self.store.set(token.clone());
        tracing::info!(
            token_type = %token.token_type,
            expires_at = %token.expires_at(),
            "authenticated"
        );

        Ok(token)
    }

    /// Read the persisted token. Absence and corruption both yield `None`
    /// and are logged differently.
    pub async fn load_from_disk(&self) -> Option<AccessToken> {
        match io::read_document::<AccessToken>(&self.token_path).await {
            Ok(Some(token)) if token.access_token.is_empty() || token.token_type.is_empty() => {
                tracing::warn!(path = %self.token_path.display(), "stored token is incomplete; falling back to generating a new one");
                None
            },
            Ok(Some(token)) => {
                let token = AccessToken::new(
                    token.access_token,
                    &token.token_type,
                    token.expires_in,
                    Some(token.date),
                );
                tracing::info!(
                    token_type = %token.token_type,
                    expires_in = token.expires_in,
                    issued_at = %token.date,
                    expires_at = %token.expires_at(),
                    "loaded token from disk"
                );
                Some(token)
            },
            Ok(None) => {
                tracing::debug!(path = %self.token_path.display(), "token file does not exist");
                None
            },
            Err(err) => {
                tracing::error!(error = %err, path = %self.token_path.display(), "failed reading token file; falling back to generating a new one");
                None
            },
        }
    }

    /// Exchange the client credentials for a new token, persist it and
    /// install it.
    pub async fn request_new_token(&self) -> Result<AccessToken> {
        let response = self
            .http
            .post(format!("{}{}", self.id_url, TOKEN_PATH))
            .json(&GrantRequest {
                client_id: &self.credentials.client_id,
                client_secret: &self.credentials.client_secret,
                grant_type: GRANT_TYPE,
            })
            .send()
            .await
            .map_err(|err| ServerError::UpstreamAuth(format!("token grant failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::UpstreamAuth(format!(
                "token grant returned {status}: {body}"
            )));
        }

        let grant: GrantResponse = response.json().await.map_err(|err| {
            ServerError::UpstreamAuth(format!("token grant response is malformed: {err}"))
        })?;
        let Some(access_token) = grant.access_token.filter(|t| !t.is_empty()) else {
            return Err(ServerError::UpstreamAuth(
                "token grant response has no access_token".into(),
            ));
        };
        let Some(token_type) = grant.token_type.filter(|t| !t.is_empty()) else {
            return Err(ServerError::UpstreamAuth(
                "token grant response has no token_type".into(),
            ));
        };

        let token = AccessToken::new(access_token, &token_type, grant.expires_in, None);

        tracing::info!(path = %self.token_path.display(), "writing new token");
        io::write_document(&self.token_path, &token).await?;
        self.store.set(token.clone());

        Ok(token)
    }

    /// Ask the identity provider whether the current token is valid.
    ///
    /// `Ok(true)` on HTTP 200, any other answer is an error. Never changes
    /// the stored token.
    pub async fn validate(&self) -> Result<bool> {
        let authorization = self.store.header()?;

        let response = self
            .http
            .get(format!("{}{}", self.id_url, VALIDATE_PATH))
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|err| ServerError::UpstreamAuth(format!("token validation failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::OK {
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ServerError::UpstreamAuth(format!(
                "token validation returned {status}: {body}"
            )))
        }
    }
}
