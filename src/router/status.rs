//! Liveness and diagnostics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Plain outcome body.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

pub async fn home() -> Json<Status> {
    Json(Status {
        status: Some("online".into()),
        ..Status::ok()
    })
}

pub async fn status() -> Json<Status> {
    Json(Status::ok())
}

/// Only answers when debugging is enabled.
pub async fn debug(State(config): State<Arc<Configuration>>) -> Response {
    if config.debug {
        tracing::debug!(
            pid = std::process::id(),
            version = config.version(),
            data_path = %config.data_path.display(),
            cache_dir = %config.cache_dir().display(),
            "debug endpoint"
        );
        Json(Status::ok()).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(Status::failure("Bad request"))).into_response()
    }
}
