//! Error handler for twgate.
//!
//! Every failure of the core (disk, token, upstream) and every domain miss
//! ends up as a [`ServerError`]. [`ServerError::status`] is the only place
//! where an HTTP status code is chosen.

use std::path::PathBuf;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("no access token; authenticate first")]
    NoToken,

    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("{0}")]
    Api(String),

    #[error("User \"{user}\" not found{}", suffix(.message))]
    UserNotFound {
        user: String,
        message: Option<String>,
    },

    #[error("Badge \"{badge}\" not found{}", suffix(.message))]
    BadgeNotFound {
        badge: String,
        message: Option<String>,
    },

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

fn suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|message| format!(": {message}"))
        .unwrap_or_default()
}

impl ServerError {
    /// Create a [`ServerError::UserNotFound`] without details.
    pub fn user_not_found(user: impl Into<String>) -> Self {
        Self::UserNotFound {
            user: user.into(),
            message: None,
        }
    }

    /// Create a [`ServerError::BadgeNotFound`] without details.
    pub fn badge_not_found(badge: impl Into<String>) -> Self {
        Self::BadgeNotFound {
            badge: badge.into(),
            message: None,
        }
    }

    /// HTTP status policy for every error of the crate.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UserNotFound { .. } | ServerError::BadgeNotFound { .. } => {
                StatusCode::NOT_FOUND
            },
            ServerError::Api(_) => StatusCode::BAD_REQUEST,
            ServerError::Io { .. }
            | ServerError::Parse { .. }
            | ServerError::NotFound(_)
            | ServerError::NoToken
            | ServerError::UpstreamAuth(_)
            | ServerError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short type tag sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Io { .. } => "IOError",
            ServerError::Parse { .. } => "ParseError",
            ServerError::NotFound(_) => "NotFound",
            ServerError::NoToken => "NoToken",
            ServerError::UpstreamAuth(_) => "UpstreamAuthError",
            ServerError::Api(_) => "APIError",
            ServerError::UserNotFound { .. } => "UserNotFound",
            ServerError::BadgeNotFound { .. } => "BadgeNotFound",
            ServerError::Http(_) => "HTTPError",
        }
    }

    /// Whether this is one of the "object not found" domain errors.
    pub fn is_object_not_found(&self) -> bool {
        matches!(
            self,
            ServerError::UserNotFound { .. } | ServerError::BadgeNotFound { .. }
        )
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Update `type` field.
    pub fn kind(mut self, kind: &str) -> Self {
        self.r#type = Some(kind.into());
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let response = match status {
            StatusCode::NOT_FOUND => ResponseError::default()
                .title("Requested object does not exist.")
                .details(&self.to_string()),
            StatusCode::BAD_REQUEST => ResponseError::default()
                .title("Upstream API rejected the request.")
                .details(&self.to_string()),
            _ => {
                tracing::error!(err = %self, kind = self.kind(), "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .kind(self.kind())
            .status(status)
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": "",
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_status_policy() {
        assert_eq!(
            ServerError::user_not_found("_").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::badge_not_found("subscriber/9").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Api("bad request".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::NotFound("key \"x\"".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ServerError::NoToken.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ServerError::UpstreamAuth("401".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ServerError::user_not_found("kaedenn_").to_string(),
            "User \"kaedenn_\" not found"
        );
        let err = ServerError::BadgeNotFound {
            badge: "subscriber/1".into(),
            message: Some("lacks size image_url_4x".into()),
        };
        assert_eq!(
            err.to_string(),
            "Badge \"subscriber/1\" not found: lacks size image_url_4x"
        );
        assert!(err.is_object_not_found());
        assert!(!ServerError::NoToken.is_object_not_found());
    }

    #[tokio::test]
    async fn test_into_response() {
        let response = ServerError::user_not_found("_").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["type"], "UserNotFound");
        assert_eq!(body["status"], 404);
        assert_eq!(body["detail"], "User \"_\" not found");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = ServerError::UpstreamAuth("secret leaked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["detail"], "");
        assert_eq!(body["type"], "UpstreamAuthError");
    }
}
