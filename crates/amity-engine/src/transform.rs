//! Script normalization for outgoing text. Never fails: any problem hands
//! the input back unchanged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[async_trait]
pub trait TextTransform: Send + Sync {
    async fn apply(&self, text: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl TextTransform for PassThrough {
    async fn apply(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Serialize)]
struct TransformRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TransformResponse {
    text: String,
}

/// Remote Simplified→Traditional converter: POSTs `{"text": ...}` and reads
/// `{"text": ...}` back.
pub struct HttpTextTransform {
    http: Client,
    url: String,
}

impl HttpTextTransform {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    async fn convert(&self, text: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .post(&self.url)
            .json(&TransformRequest { text })
            .send()
            .await?
            .error_for_status()?;
        let body: TransformResponse = response.json().await?;
        Ok(body.text)
    }
}

#[async_trait]
impl TextTransform for HttpTextTransform {
    async fn apply(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        match self.convert(text).await {
            Ok(converted) => converted,
            Err(e) => {
                warn!("Text transform failed, passing text through: {}", e);
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/convert", addr)
    }

    #[tokio::test]
    async fn converts_through_service() {
        let router = Router::new().route(
            "/convert",
            post(|Json(body): Json<Value>| async move {
                let text = body["text"].as_str().unwrap_or_default().replace("这", "這");
                Json(json!({ "text": text }))
            }),
        );
        let transform = HttpTextTransform::new(serve(router).await, Duration::from_secs(5)).unwrap();
        assert_eq!(transform.apply("这是 Amy 😊").await, "這是 Amy 😊");
    }

    #[tokio::test]
    async fn failure_passes_input_through() {
        let router = Router::new().route(
            "/convert",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let transform = HttpTextTransform::new(serve(router).await, Duration::from_secs(5)).unwrap();
        assert_eq!(transform.apply("这是").await, "这是");
    }

    #[tokio::test]
    async fn unreachable_service_passes_input_through() {
        let transform =
            HttpTextTransform::new("http://127.0.0.1:1/convert", Duration::from_millis(500)).unwrap();
        assert_eq!(transform.apply("早安").await, "早安");
        assert_eq!(PassThrough.apply("早安").await, "早安");
    }
}
