pub mod api;
pub mod realtime;

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Build the complete application router.
///
/// When `static_dir` is set, its files are served for every path not claimed
/// by the API, with `index.html` answering directory requests.
pub fn create_app(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let router = api::create_api_router().merge(realtime::create_realtime_router());

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::Credential;
    use crate::core::relay::{RtMiddleTier, SessionOverrides, UpstreamConfig};
    use crate::core::tools::ToolRegistry;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let upstream =
            UpstreamConfig::new("http://127.0.0.1:1", "deployment", Credential::api_key("k"));
        AppState::new(RtMiddleTier::new(
            upstream,
            SessionOverrides::default(),
            ToolRegistry::new(),
        ))
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_app(state(), None);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["tools"], 0);
    }

    #[tokio::test]
    async fn test_realtime_requires_upgrade() {
        let app = create_app(state(), None);
        let response = app
            .oneshot(Request::get("/realtime").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_static_dir_serves_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>relay</h1>").unwrap();

        let app = create_app(state(), Some(dir.path()));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<h1>relay</h1>");
    }

    #[tokio::test]
    async fn test_unknown_path_without_static_dir() {
        let app = create_app(state(), None);
        let response = app
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
