//! Application access token.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Token obtained through the client-credentials grant.
///
/// Serialized as the on-disk token file:
/// `{access_token, date (epoch millis), expires_in, token_type}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// When the token was issued.
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub date: DateTime<Utc>,
    /// Declared lifetime, in seconds.
    pub expires_in: u64,
    pub token_type: String,
}

impl AccessToken {
    /// Create a new [`AccessToken`]. `token_type` is title-cased.
    pub fn new(
        access_token: impl Into<String>,
        token_type: &str,
        expires_in: u64,
        date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            date: date.unwrap_or_else(Utc::now),
            expires_in,
            token_type: title_case(token_type),
        }
    }

    /// `date + expires_in`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let lifetime = i64::try_from(self.expires_in).unwrap_or(i64::MAX);
        let lifetime = TimeDelta::try_seconds(lifetime).unwrap_or(TimeDelta::MAX);

        self.date
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at() <= Utc::now()
    }

    /// `Authorization` header value.
    pub fn header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Holds the current token for the whole process.
///
/// Either empty (never authenticated) or holding a complete [`AccessToken`];
/// replacements are wholesale.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<AccessToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token.
    pub fn set(&self, token: AccessToken) {
        let token = AccessToken {
            token_type: title_case(&token.token_type),
            ..token
        };

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Copy of the current token, if any.
    pub fn get(&self) -> Option<AccessToken> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `"<TokenType> <token>"`, or [`ServerError::NoToken`] before the first
    /// authentication.
    pub fn header(&self) -> Result<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(AccessToken::header)
            .ok_or(ServerError::NoToken)
    }

    /// Expiry of the current token, `None` when no token is known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(AccessToken::expires_at)
    }
}

/// Upper-case the first character, lower-case the rest.
pub fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
