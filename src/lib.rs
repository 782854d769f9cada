//! twgate exposes chat badges and user lookups of the Twitch API under a
//! small REST surface, authenticating with the client-credentials flow and
//! caching upstream data on disk.

#![forbid(unsafe_code)]
#![deny(unused_mut)]
pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod io;
mod middleware;
mod router;
pub mod telemetry;
pub mod token;
pub mod twitch;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use config::Configuration;
pub use error::{Result, ServerError};
use token::TokenStore;
use twitch::badge::{self, BadgeCache, GlobalBadges};
use twitch::{Authenticator, Credentials, TwitchClient};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder().method(method).uri(path);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    app.oneshot(request.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap()
}

/// State backed by a mock upstream and a temporary data directory, already
/// holding a `Bearer abc` token.
#[cfg(test)]
pub async fn test_state() -> (wiremock::MockServer, tempfile::TempDir, AppState) {
    let server = wiremock::MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = Configuration::default();
    config.data_path = dir.path().to_path_buf();
    config.twitch.client_id = "client".into();
    config.twitch.client_secret = "secret".into();
    config.twitch.api_url = server.uri();
    config.twitch.id_url = server.uri();

    let state = AppState::new(config, None).unwrap();
    state
        .auth
        .store()
        .set(token::AccessToken::new("abc", "bearer", 3600, None));

    (server, dir, state)
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub auth: Arc<Authenticator>,
    pub twitch: TwitchClient,
    pub badges: Arc<BadgeCache>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every component together. No request is sent.
    pub fn new(config: Configuration, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let store = Arc::new(TokenStore::new());
        let auth = Authenticator::new(
            http.clone(),
            Credentials {
                client_id: config.twitch.client_id.clone(),
                client_secret: config.twitch.client_secret.clone(),
            },
            config.twitch.id_url.clone(),
            config.token_path(),
            Arc::clone(&store),
        );
        let twitch = TwitchClient::new(
            http,
            config.twitch.api_url.clone(),
            config.twitch.client_id.clone(),
            store,
        );
        let badges = BadgeCache::new(
            badge::CACHE_NAME,
            config.cache_dir(),
            GlobalBadges::new(twitch.clone()),
        );

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            twitch,
            badges: Arc::new(badges),
            metrics,
        })
    }

    /// Load the badge cache. With `refresh_on_start` the stored entries are
    /// also refreshed from upstream and saved.
    pub async fn warm_badges(&self) -> Result<()> {
        if self.config.cache.refresh_on_start {
            self.badges.load().await?;
            self.badges.refresh().await?;
            self.badges.save().await?;
        } else {
            self.badges.init().await?;
        }

        tracing::info!(count = self.badges.len(), "badge cache ready");
        Ok(())
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::PUT, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers(Any),
        )
        // Proxied plain HTTP goes to HTTPS.
        .layer(AxumMiddleware::from_fn(middleware::elevate_https));

    Router::new()
        // `GET /` goes to `home`.
        .route("/", get(router::status::home))
        // `GET /status` goes to `status`.
        .route("/status", get(router::status::status))
        .route("/debug", get(router::status::debug))
        // `GET /validate` checks the upstream token.
        .route("/validate", get(router::auth::validate))
        .route("/metrics", get(telemetry::render))
        // Global badges, served from the cache.
        .route("/badges", get(router::badges::list))
        .route("/badge", get(router::badges::list))
        .route("/badge/{set}", get(router::badges::set))
        .route("/badge/{set}/{version}", get(router::badges::version))
        .route("/badge/{set}/{version}/url", get(router::badges::url))
        .route("/badge/{set}/{version}/url/{size}", get(router::badges::url))
        .route("/badges/{user}", get(router::user::badges))
        .nest("/user", router::user::router())
        .route("/emote", get(router::emote::handler))
        .route("/cheermote", get(router::emote::handler))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
///
/// Failing to authenticate is fatal. A badge cache that cannot be loaded
/// only leaves badge routes empty.
pub async fn initialize_state(
    config: Configuration,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState> {
    let state = AppState::new(config, metrics)?;

    state.auth.authenticate().await?;

    if let Err(err) = state.warm_badges().await {
        tracing::error!(error = %err, kind = err.kind(), "cannot initialize badge cache");
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_initialize_state() {
        let (server, dir, state) = test_state().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/helix/chat/badges/global"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let state = initialize_state((*state.config).clone(), None).await.unwrap();

        assert_eq!(state.auth.store().header().unwrap(), "Bearer fresh");
        assert!(dir.path().join("token.json").is_file());
        assert!(state.badges.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_state_requires_authentication() {
        let (server, _dir, state) = test_state().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = initialize_state((*state.config).clone(), None).await;
        assert!(matches!(result, Err(ServerError::UpstreamAuth(_))));
    }

    #[tokio::test]
    async fn test_warm_badges() {
        let (server, dir, state) = test_state().await;
        Mock::given(method("GET"))
            .and(path("/helix/chat/badges/global"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "set_id": "vip", "versions": [{ "id": "1" }] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        state.warm_badges().await.unwrap();

        assert!(state.badges.has("vip"));
        assert!(dir.path().join("cache").join("badges.json").is_file());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (_server, _dir, state) = test_state().await;

        let response = make_request(app(state), Method::GET, "/nothing", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
