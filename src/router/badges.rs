//! Global badges, served from the badge cache.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use super::Data;
use crate::twitch::badge::{self, BadgeSet, BadgeVersion, DEFAULT_SIZE};
use crate::{AppState, ServerError};

/// `/{set}/{version}/url[/{size}]` parameters.
#[derive(Debug, Deserialize)]
pub struct UrlParams {
    pub set: String,
    pub version: String,
    #[serde(default)]
    pub size: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<Data<Vec<BadgeSet>>> {
    Json(Data {
        data: state.badges.values(),
    })
}

pub async fn set(
    State(state): State<AppState>,
    Path(set): Path<String>,
) -> Result<Json<Data<BadgeSet>>, ServerError> {
    let data = state
        .badges
        .get(&set)
        .map_err(|_| ServerError::BadgeNotFound {
            message: Some(format!("unknown set ID \"{set}\"")),
            badge: set,
        })?;

    Ok(Json(Data { data }))
}

pub async fn version(
    State(state): State<AppState>,
    Path((set, version)): Path<(String, String)>,
) -> Result<Json<Data<BadgeVersion>>, ServerError> {
    let data = badge::cached_badge(&state.badges, &set, &version)?;
    Ok(Json(Data { data }))
}

pub async fn url(
    State(state): State<AppState>,
    Path(params): Path<UrlParams>,
) -> Result<String, ServerError> {
    let badge = badge::cached_badge(&state.badges, &params.set, &params.version)?;
    image_url(&badge, &params.set, params.size.as_deref())
}

/// URL of the requested size, or [`ServerError::BadgeNotFound`] when the
/// version has none.
pub(super) fn image_url(
    badge: &BadgeVersion,
    set: &str,
    size: Option<&str>,
) -> Result<String, ServerError> {
    let size = badge::size_field(size.unwrap_or(DEFAULT_SIZE));

    badge
        .url(size)
        .map(str::to_owned)
        .ok_or_else(|| ServerError::BadgeNotFound {
            badge: format!("{set}/{}", badge.id),
            message: Some(format!("lacks size {size}")),
        })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::*;

    async fn state() -> (wiremock::MockServer, tempfile::TempDir, AppState) {
        let (server, dir, state) = test_state().await;
        let sets: Vec<BadgeSet> = serde_json::from_value(json!([
            {
                "set_id": "subscriber",
                "versions": [
                    { "id": "0", "image_url_1x": "https://cdn/sub0/1", "image_url_2x": "https://cdn/sub0/2" }
                ]
            },
            { "set_id": "vip", "versions": [{ "id": "1", "image_url_1x": "https://cdn/vip/1" }] }
        ]))
        .unwrap();
        for set in sets {
            state.badges.set(set.set_id.clone(), set);
        }

        (server, dir, state)
    }

    async fn text(response: axum::http::Response<axum::body::Body>) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_list() {
        let (_server, _dir, state) = state().await;

        for path in ["/badges", "/badge"] {
            let response = make_request(app(state.clone()), Method::GET, path, &[]).await;
            assert_eq!(response.status(), StatusCode::OK);

            let body: Data<Vec<BadgeSet>> = serde_json::from_str(&text(response).await).unwrap();
            assert_eq!(body.data.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_set_and_version() {
        let (_server, _dir, state) = state().await;

        let response = make_request(app(state.clone()), Method::GET, "/badge/vip", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Data<BadgeSet> = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body.data.set_id, "vip");

        let response = make_request(app(state.clone()), Method::GET, "/badge/moderator", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = make_request(app(state.clone()), Method::GET, "/badge/subscriber/0", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Data<BadgeVersion> = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body.data.id, "0");

        let response = make_request(app(state), Method::GET, "/badge/subscriber/7", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body["type"], "BadgeNotFound");
    }

    #[tokio::test]
    async fn test_url() {
        let (_server, _dir, state) = state().await;

        let response = make_request(app(state.clone()), Method::GET, "/badge/subscriber/0/url", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "https://cdn/sub0/1");

        let response =
            make_request(app(state.clone()), Method::GET, "/badge/subscriber/0/url/2x", &[]).await;
        assert_eq!(text(response).await, "https://cdn/sub0/2");

        let response = make_request(
            app(state.clone()),
            Method::GET,
            "/badge/subscriber/0/url/image_url_2x",
            &[],
        )
        .await;
        assert_eq!(text(response).await, "https://cdn/sub0/2");

        let response = make_request(app(state), Method::GET, "/badge/subscriber/0/url/4x", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(
            body["detail"],
            "Badge \"subscriber/0\" not found: lacks size image_url_4x"
        );
    }
}
