//! Upstream token validation.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::{AppState, ServerError};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub success: bool,
    pub message: String,
    /// Whether the identity provider accepted the token.
    pub status: bool,
}

pub async fn validate(State(state): State<AppState>) -> Result<Json<Validation>, ServerError> {
    let status = state.auth.validate().await?;
    tracing::info!(valid = status, "validated access token");

    Ok(Json(Validation {
        success: true,
        message: "validated".into(),
        status,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::*;

    #[tokio::test]
    async fn test_validate_handler() {
        let (server, _dir, state) = test_state().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = make_request(app(state), Method::GET, "/validate", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Validation = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            Validation {
                success: true,
                message: "validated".into(),
                status: true,
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let (server, _dir, state) = test_state().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let response = make_request(app(state), Method::GET, "/validate", &[]).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
