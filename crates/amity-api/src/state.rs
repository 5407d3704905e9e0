use std::sync::Arc;

use amity_engine::ChatEngine;
use amity_engine::transport::MessagingTransport;

pub const DEFAULT_BOT_NAME: &str = "纏綿悱惻 - 聊出激情吧!";
pub const DEFAULT_SETUP_URL: &str = "http://localhost:8000/ui2";

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    /// Absent when no messaging channel is configured; the webhook then
    /// answers 404.
    pub line: Option<LineChannel>,
}

#[derive(Clone)]
pub struct LineChannel {
    pub channel_secret: String,
    pub transport: Arc<dyn MessagingTransport>,
    /// Named in the welcome sent to new followers.
    pub bot_name: String,
    /// Character setup page; new followers get it with their id attached.
    pub setup_url: String,
}

impl LineChannel {
    pub fn new(channel_secret: impl Into<String>, transport: Arc<dyn MessagingTransport>) -> Self {
        Self {
            channel_secret: channel_secret.into(),
            transport,
            bot_name: DEFAULT_BOT_NAME.to_string(),
            setup_url: DEFAULT_SETUP_URL.to_string(),
        }
    }

    pub fn with_welcome(mut self, bot_name: impl Into<String>, setup_url: impl Into<String>) -> Self {
        self.bot_name = bot_name.into();
        self.setup_url = setup_url.into();
        self
    }
}

impl AppState {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine, line: None }
    }

    pub fn with_line(mut self, channel: LineChannel) -> Self {
        self.line = Some(channel);
        self
    }
}
