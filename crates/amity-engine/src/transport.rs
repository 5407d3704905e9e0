//! Outbound chat-platform messaging. Delivery is best effort: each call
//! reports success as a bool and is never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const LINE_API_BASE: &str = "https://api.line.me";

#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Answers an inbound event. Reply tokens are single use.
    async fn reply(&self, reply_token: &str, text: &str) -> bool;

    /// Sends an unsolicited message to an external identity.
    async fn push(&self, to: &str, text: &str) -> bool;

    /// Profile display name, if the platform will tell us.
    async fn display_name(&self, user_id: &str) -> Option<String>;
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct PushBody<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    display_name: String,
}

pub struct LineTransport {
    http: Client,
    base_url: String,
    access_token: String,
}

impl LineTransport {
    pub fn new(access_token: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_base_url(LINE_API_BASE, access_token)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(10)).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> bool {
        let result = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("LINE {} returned {}: {}", path, status, body);
                false
            }
            Err(e) => {
                warn!("LINE {} failed: {}", path, e);
                false
            }
        }
    }
}

fn text(text: &str) -> [TextMessage<'_>; 1] {
    [TextMessage { kind: "text", text }]
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[async_trait]
impl MessagingTransport for LineTransport {
    async fn reply(&self, reply_token: &str, body: &str) -> bool {
        let ok = self
            .post(
                "/v2/bot/message/reply",
                &ReplyBody {
                    reply_token,
                    messages: text(body),
                },
            )
            .await;
        if ok {
            info!("Replied: {}", preview(body));
        }
        ok
    }

    async fn push(&self, to: &str, body: &str) -> bool {
        let ok = self
            .post(
                "/v2/bot/message/push",
                &PushBody {
                    to,
                    messages: text(body),
                },
            )
            .await;
        if ok {
            info!("Pushed to {}: {}", to, preview(body));
        }
        ok
    }

    async fn display_name(&self, user_id: &str) -> Option<String> {
        let path = format!("/v2/bot/profile/{}", user_id);
        let response = match self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("LINE {} returned {}", path, response.status());
                return None;
            }
            Err(e) => {
                warn!("LINE {} failed: {}", path, e);
                return None;
            }
        };
        match response.json::<Profile>().await {
            Ok(profile) => Some(profile.display_name),
            Err(e) => {
                warn!("LINE {} returned an unreadable profile: {}", path, e);
                None
            }
        }
    }
}
