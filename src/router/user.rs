//! Users and their custom badges, fetched upstream on every request.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use serde::Deserialize;

use super::Data;
use super::badges::image_url;
use crate::twitch::badge::{BadgeSet, BadgeVersion, find_version};
use crate::twitch::User;
use crate::{AppState, ServerError};

/// Routes nested under `/user`.
pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /user/{login}` goes to `user`.
        .route("/{login}", get(user))
        .route("/badges/{user}", get(badges))
        .route("/badge/{user}", get(badges))
        .route("/badge/{user}/{set}", get(set))
        .route("/badge/{user}/{set}/{version}", get(version))
        .route("/badge/{user}/{set}/{version}/url", get(url))
        .route("/badge/{user}/{set}/{version}/url/{size}", get(url))
}

pub async fn user(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> Result<Json<Data<User>>, ServerError> {
    let data = state.twitch.user(&login).await?;
    Ok(Json(Data { data }))
}

pub async fn badges(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Data<Vec<BadgeSet>>>, ServerError> {
    let data = state.twitch.badges_for(&user).await?;
    Ok(Json(Data { data }))
}

pub async fn set(
    State(state): State<AppState>,
    Path((user, set)): Path<(String, String)>,
) -> Result<Json<Data<BadgeSet>>, ServerError> {
    let data = state
        .twitch
        .badges_for(&user)
        .await?
        .into_iter()
        .find(|badge| badge.set_id == set)
        .ok_or_else(|| ServerError::BadgeNotFound {
            message: Some(format!("no such set for user {user}")),
            badge: set,
        })?;

    Ok(Json(Data { data }))
}

pub async fn version(
    State(state): State<AppState>,
    Path((user, set, version)): Path<(String, String, String)>,
) -> Result<Json<Data<BadgeVersion>>, ServerError> {
    let sets = state.twitch.badges_for(&user).await?;
    let data = find_version(&sets, &set, &version)
        .cloned()
        .ok_or_else(|| not_found(&user, &set, &version))?;

    Ok(Json(Data { data }))
}

/// `/badge/{user}/{set}/{version}/url[/{size}]` parameters.
#[derive(Debug, Deserialize)]
pub struct UrlParams {
    pub user: String,
    pub set: String,
    pub version: String,
    #[serde(default)]
    pub size: Option<String>,
}

pub async fn url(
    State(state): State<AppState>,
    Path(params): Path<UrlParams>,
) -> Result<String, ServerError> {
    let sets = state.twitch.badges_for(&params.user).await?;
    let version = find_version(&sets, &params.set, &params.version)
        .ok_or_else(|| not_found(&params.user, &params.set, &params.version))?;

    image_url(version, &params.set, params.size.as_deref())
}

fn not_found(user: &str, set: &str, version: &str) -> ServerError {
    ServerError::BadgeNotFound {
        badge: format!("{set}/{version}"),
        message: Some(format!("no such badge for user {user}")),
    }
}
