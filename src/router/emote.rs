//! Emote and cheermote lookups are not served yet.

use axum::Json;
use axum::http::{StatusCode, Uri};

use super::status::Status;

pub async fn handler(uri: Uri) -> (StatusCode, Json<Status>) {
    (
        StatusCode::BAD_REQUEST,
        Json(Status::failure(format!(
            "The endpoint \"{}\" is not yet functional",
            uri.path()
        ))),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;

    use super::*;
    use crate::*;

    #[tokio::test]
    async fn test_not_yet_functional() {
        let (_server, _dir, state) = test_state().await;

        for path in ["/emote", "/cheermote"] {
            let response = make_request(app(state.clone()), Method::GET, path, &[]).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body: Status = serde_json::from_slice(&body).unwrap();
            assert!(!body.success);
            assert_eq!(
                body.message.unwrap(),
                format!("The endpoint \"{path}\" is not yet functional")
            );
        }
    }
}
