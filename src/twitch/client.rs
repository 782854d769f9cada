//! Authenticated Helix API client.

use std::sync::{Arc, LazyLock};

use regex_lite::Regex;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::badge::BadgeSet;
use crate::error::{Result, ServerError};
use crate::token::TokenStore;

const CLIENT_ID_HEADER: &str = "Client-Id";
const GLOBAL_BADGES_PATH: &str = "/helix/chat/badges/global";
const CHANNEL_BADGES_PATH: &str = "/helix/chat/badges";
const USERS_PATH: &str = "/helix/users";

static INVALID_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)invalid.*id").unwrap());

/// Helix list envelope: `{"data": [...]}`.
#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

/// Helix error body.
#[derive(Debug, Default, Deserialize)]
struct Failure {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Upstream user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
    /// Remaining upstream fields, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Client for the upstream resource API.
///
/// Every request carries the `Client-Id` header and the `Authorization`
/// header of the shared [`TokenStore`].
#[derive(Clone)]
pub struct TwitchClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    store: Arc<TokenStore>,
}

impl TwitchClient {
    /// Create a new [`TwitchClient`].
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            client_id: client_id.into(),
            store,
        }
    }

    /// All global chat badge sets.
    pub async fn global_badges(&self) -> Result<Vec<BadgeSet>> {
        let badges: Page<BadgeSet> = self.get(GLOBAL_BADGES_PATH, &[]).await?;
        tracing::debug!(count = badges.data.len(), "loaded global badges");
        Ok(badges.data)
    }

    /// Custom badge sets of a broadcaster, by numeric ID.
    pub async fn user_badges(&self, broadcaster_id: &str) -> Result<Vec<BadgeSet>> {
        let badges: Page<BadgeSet> = self
            .get(CHANNEL_BADGES_PATH, &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(badges.data)
    }

    /// Look a user up by login.
    pub async fn user(&self, login: &str) -> Result<User> {
        let users: Page<User> = match self.fetch(USERS_PATH, &[("login", login)]).await? {
            Ok(users) => users,
            Err(rejection) if rejection.is_unknown_user() => {
                return Err(ServerError::UserNotFound {
                    user: login.to_owned(),
                    message: Some(rejection.message),
                });
            },
            Err(rejection) => return Err(rejection.into()),
        };

        users
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ServerError::user_not_found(login))
    }

    /// Custom badge sets of a broadcaster, by login.
    pub async fn badges_for(&self, login: &str) -> Result<Vec<BadgeSet>> {
        let user = self.user(login).await?;
        self.user_badges(&user.id).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.fetch(path, query).await?.map_err(ServerError::from)
    }

    /// Send an authenticated GET. Non-success answers are returned as a
    /// [`Rejection`] for the caller to classify.
    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<std::result::Result<T, Rejection>> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .query(query)
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(AUTHORIZATION, self.store.header()?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response.json().await?));
        }

        let body = response.text().await.unwrap_or_default();
        let rejection = Rejection::new(status, &body);
        tracing::debug!(%status, %path, message = %rejection.message, "upstream request failed");

        Ok(Err(rejection))
    }
}

/// Non-success upstream answer.
#[derive(Debug)]
struct Rejection {
    status: StatusCode,
    message: String,
}

impl Rejection {
    fn new(status: StatusCode, body: &str) -> Self {
        let failure: Failure = serde_json::from_str(body).unwrap_or_default();

        let message = if !failure.message.is_empty() {
            failure.message
        } else if !failure.error.is_empty() {
            failure.error
        } else if !body.is_empty() {
            body.to_owned()
        } else {
            status.to_string()
        };

        Self { status, message }
    }

    /// Upstream reports unknown logins either as 404 or as a 400 complaining
    /// about invalid IDs.
    fn is_unknown_user(&self) -> bool {
        match self.status {
            StatusCode::NOT_FOUND => true,
            StatusCode::BAD_REQUEST => INVALID_ID.is_match(&self.message),
            _ => false,
        }
    }
}

impl From<Rejection> for ServerError {
    fn from(rejection: Rejection) -> Self {
        if rejection.status == StatusCode::UNAUTHORIZED {
            ServerError::UpstreamAuth(rejection.message)
        } else {
            ServerError::Api(format!(
                "upstream returned {}: {}",
                rejection.status.as_u16(),
                rejection.message
            ))
        }
    }
}
