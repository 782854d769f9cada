//! Middlewares for routes.

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Send clients that reached a TLS-terminating proxy over plain HTTP to the
/// HTTPS root of the same host.
pub async fn elevate_https(req: Request, next: Next) -> Response {
    match https_location(req.headers()) {
        Some(location) => {
            tracing::debug!(%location, "elevating to https");
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        },
        None => next.run(req).await,
    }
}

fn https_location(headers: &HeaderMap) -> Option<String> {
    let proto = headers.get(FORWARDED_PROTO)?.to_str().ok()?;
    if proto != "http" {
        return None;
    }

    let host = headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or_default();

    Some(format!("https://{host}/"))
}
