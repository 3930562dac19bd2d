//! Gemini Live configuration types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::messages::ContextMessage;
use crate::core::realtime::base::{ReceiveRetryConfig, RealtimeError, RealtimeResult};

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Model used when the caller does not name one.
pub const GEMINI_LIVE_DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Audio sample rate in both directions.
pub const GEMINI_LIVE_SAMPLE_RATE: u32 = 24000;

/// Everything a [`super::GeminiLiveConnection`] needs to open a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiLiveConfig {
    pub api_key: String,

    /// Endpoint without the `key` query parameter.
    pub endpoint: String,

    pub model: String,

    /// Passed through to the `setup` message untouched.
    pub generation_config: Option<Value>,

    /// Replayed as user or system turns right after `setup`.
    pub initial_messages: Vec<ContextMessage>,

    pub receive_retry: ReceiveRetryConfig,
}

impl Default for GeminiLiveConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: GEMINI_LIVE_URL.to_string(),
            model: GEMINI_LIVE_DEFAULT_MODEL.to_string(),
            generation_config: None,
            initial_messages: Vec::new(),
            receive_retry: ReceiveRetryConfig::default(),
        }
    }
}

impl GeminiLiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Connection URL with the API key as the `key` query parameter.
    pub fn ws_url(&self) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "endpoint must use ws or wss, got '{}'",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}
