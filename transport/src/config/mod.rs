//! Configuration module for the Gemini Live client
//!
//! This module handles client configuration from various sources: .env files,
//! YAML files, and environment variables. Priority: YAML > ENV vars > .env
//! values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML on top of the environment configuration
//!
//! # Example
//! ```rust,no_run
//! use gemini_live_transport::config::LiveConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = LiveConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config_path = PathBuf::from("config.yaml");
//! let config = LiveConfig::from_file(&config_path)?;
//!
//! println!("Using model {}", config.model);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use gemini_live_host_api::ClientOptions;
use serde_json::Value;

use crate::core::audio::DEFAULT_CAPTURE_LEVEL_BOOST;
use crate::core::realtime::gemini::{
    ContextMessage, GEMINI_LIVE_DEFAULT_MODEL, GEMINI_LIVE_URL, GeminiLiveConfig,
};
use crate::core::realtime::ReceiveRetryConfig;
use crate::session::{
    LLM_API_KEY, LLM_GENERATION_CONFIG, LLM_INITIAL_MESSAGES, LLM_MODEL, TransportSettings,
};

mod env;
mod merge;
mod yaml;

pub use env::ENV_VARS;

/// Client configuration
///
/// Contains everything needed to run a Gemini Live session from the command
/// line:
/// - Service settings (API key, model, endpoint, generation config)
/// - Conversation seed (initial messages)
/// - Session behaviour (microphone, receive retry policy)
/// - Audio device settings
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    // Service settings
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub generation_config: Option<Value>,
    pub initial_messages: Vec<ContextMessage>,

    // Session settings
    pub enable_mic: bool,
    pub receive_retry_delay_ms: u64,
    /// `None` retries failed reads until disconnect.
    pub max_receive_retries: Option<u32>,

    // Audio settings
    pub capture_level_boost: f32,
    /// `None` disables input device polling.
    pub device_poll_interval_ms: Option<u64>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        let retry = ReceiveRetryConfig::default();
        Self {
            api_key: None,
            model: GEMINI_LIVE_DEFAULT_MODEL.to_string(),
            endpoint: GEMINI_LIVE_URL.to_string(),
            generation_config: None,
            initial_messages: Vec::new(),
            enable_mic: true,
            receive_retry_delay_ms: retry.delay_ms,
            max_receive_retries: retry.max_retries,
            capture_level_boost: DEFAULT_CAPTURE_LEVEL_BOOST,
            device_poll_interval_ms: None,
        }
    }
}

impl LiveConfig {
    /// Load configuration from environment variables
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// Values in the file win over environment variables, which win over the
    /// defaults.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        merge::merge_yaml(&mut config, yaml_config);
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise only fail at connect time.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid endpoint '{}': {e}", self.endpoint))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(format!(
                "Invalid endpoint '{}': scheme must be ws or wss",
                self.endpoint
            )
            .into());
        }
        if self.model.trim().is_empty() {
            return Err("Model name must not be empty".into());
        }
        if !self.capture_level_boost.is_finite() || self.capture_level_boost <= 0.0 {
            return Err(format!(
                "capture_level_boost must be a positive number, got {}",
                self.capture_level_boost
            )
            .into());
        }
        if self.device_poll_interval_ms == Some(0) {
            return Err("device_poll_interval_ms must be greater than zero".into());
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Host options carrying the `llm` service settings.
    pub fn to_client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::default()
            .with_enable_mic(self.enable_mic)
            .with_llm_option(LLM_MODEL, Value::String(self.model.clone()));

        if let Some(api_key) = &self.api_key {
            options = options.with_llm_option(LLM_API_KEY, Value::String(api_key.clone()));
        }
        if let Some(generation_config) = &self.generation_config {
            options = options.with_llm_option(LLM_GENERATION_CONFIG, generation_config.clone());
        }
        if !self.initial_messages.is_empty()
            && let Ok(messages) = serde_json::to_value(&self.initial_messages)
        {
            options = options.with_llm_option(LLM_INITIAL_MESSAGES, messages);
        }

        options
    }

    /// Transport settings that the host options cannot express.
    pub fn to_transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connection: GeminiLiveConfig {
                endpoint: self.endpoint.clone(),
                receive_retry: ReceiveRetryConfig {
                    delay_ms: self.receive_retry_delay_ms,
                    max_retries: self.max_receive_retries,
                },
                ..Default::default()
            },
            capture_level_boost: self.capture_level_boost,
            device_poll_interval: self.device_poll_interval_ms.map(Duration::from_millis),
        }
    }
}
