use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::pipeline::Pipeline;

pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/:channel", get(channel_news))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Custom error type
pub enum AppError {
    UnknownChannel(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::UnknownChannel(name) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "unknown channel", "channel": name })),
            )
                .into_response(),
        }
    }
}

// Route handlers
pub async fn channel_news(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let channel = state
        .config
        .channel(&name)
        .ok_or_else(|| AppError::UnknownChannel(name.clone()))?;

    let digest = state.pipeline.run(channel).await;
    let cache_control = format!("public, max-age={}", channel.cache_seconds);

    Ok(([(header::CACHE_CONTROL, cache_control)], Json(digest)))
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_app(config_toml: &str) -> Router {
        let config = Config::from_str(config_toml).unwrap();
        let pipeline = Pipeline::new(&config.fetch).unwrap();
        router(Arc::new(AppState { config, pipeline }))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Option<String>, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let cache = response
            .headers()
            .get(header::CACHE_CONTROL)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, cache, serde_json::from_slice(&body).unwrap())
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let app = create_test_app("[[channels]]\nname = \"latest\"");

            let response = app
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"OK");
        }
    }

    mod channel_tests {
        use super::*;

        #[tokio::test]
        async fn test_unknown_channel_is_404() {
            let app = create_test_app("[[channels]]\nname = \"latest\"");

            let (status, _, body) = get_json(app, "/api/nope").await;

            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"], "unknown channel");
            assert_eq!(body["channel"], "nope");
        }

        #[tokio::test]
        async fn test_channel_returns_news_with_cache_header() {
            let mock_server = MockServer::start().await;
            let rss = format!(
                r#"<rss><channel>
                    <item>
                        <title>Robot learns to cook</title>
                        <link>{uri}/story</link>
                        <pubDate>Tue, 02 Jan 2024 08:00:00 GMT</pubDate>
                        <description>A kitchen robot</description>
                        <media:thumbnail url="https://cdn.example.com/robot.jpg"/>
                    </item>
                </channel></rss>"#,
                uri = mock_server.uri()
            );
            Mock::given(method("GET"))
                .and(path("/feed"))
                .respond_with(ResponseTemplate::new(200).set_body_string(rss))
                .mount(&mock_server)
                .await;

            let app = create_test_app(&format!(
                r#"
                [[channels]]
                name = "latest"
                cache_seconds = 7200

                [[channels.sources]]
                name = "Mock Tech"
                url = "{}/feed"
                category = "technology"
                "#,
                mock_server.uri()
            ));

            let (status, cache, body) = get_json(app, "/api/latest").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(cache.as_deref(), Some("public, max-age=7200"));
            assert!(body.get("error").is_none());

            let news = body["news"].as_array().unwrap();
            assert_eq!(news.len(), 1);
            assert_eq!(news[0]["title"], "Robot learns to cook");
            assert_eq!(news[0]["publishedAt"], "Tue, 02 Jan 2024 08:00:00 GMT");
            assert_eq!(news[0]["source"], "Mock Tech");
            assert_eq!(news[0]["summary"], "A kitchen robot");
            assert_eq!(news[0]["category"], "technology");
            assert_eq!(news[0]["image"], "https://cdn.example.com/robot.jpg");
        }

        #[tokio::test]
        async fn test_total_failure_is_still_200() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&mock_server)
                .await;

            let app = create_test_app(&format!(
                r#"
                [[channels]]
                name = "latest"

                [[channels.sources]]
                name = "Down"
                url = "{}/feed"
                category = "finance"
                "#,
                mock_server.uri()
            ));

            let (status, _, body) = get_json(app, "/api/latest").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["news"], serde_json::json!([]));
            assert!(!body["error"].as_str().unwrap().is_empty());
        }
    }
}
