//! Host option extraction.
//!
//! The host hands the transport a generic [`ClientOptions`]. Only the `llm`
//! service options below are understood; everything else is reported once
//! at construction so misconfiguration is visible in the logs.

use std::time::Duration;

use gemini_live_host_api::ClientOptions;
use serde_json::Value;
use tracing::warn;

use crate::core::audio::DEFAULT_CAPTURE_LEVEL_BOOST;
use crate::core::realtime::gemini::{ContextMessage, GeminiLiveConfig};

pub const LLM_API_KEY: &str = "api_key";
pub const LLM_INITIAL_MESSAGES: &str = "initial_messages";
pub const LLM_GENERATION_CONFIG: &str = "generation_config";
pub const LLM_MODEL: &str = "model";

/// `llm` options the transport acts on.
pub const SUPPORTED_LLM_OPTIONS: [&str; 4] = [
    LLM_API_KEY,
    LLM_INITIAL_MESSAGES,
    LLM_GENERATION_CONFIG,
    LLM_MODEL,
];

/// Transport settings that do not come from the host.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Base connection config. Host `llm` options are applied on top.
    pub connection: GeminiLiveConfig,

    /// Boost applied to the microphone level before clamping.
    pub capture_level_boost: f32,

    /// How often to poll for input device changes. `None` disables polling.
    pub device_poll_interval: Option<Duration>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connection: GeminiLiveConfig::default(),
            capture_level_boost: DEFAULT_CAPTURE_LEVEL_BOOST,
            device_poll_interval: None,
        }
    }
}

/// Apply the host's `llm` options to `base`.
///
/// A non-string `api_key` or `model` is ignored, as is an `initial_messages`
/// value that is not a list of `{role, content}` objects.
pub fn connection_config(options: &ClientOptions, base: &GeminiLiveConfig) -> GeminiLiveConfig {
    let mut config = base.clone();

    if let Some(api_key) = options.llm_option(LLM_API_KEY).and_then(Value::as_str) {
        config.api_key = api_key.to_string();
    }
    if let Some(model) = options.llm_option(LLM_MODEL).and_then(Value::as_str) {
        config.model = model.to_string();
    }
    if let Some(generation_config) = options.llm_option(LLM_GENERATION_CONFIG) {
        config.generation_config = Some(generation_config.clone());
    }
    if let Some(value) = options.llm_option(LLM_INITIAL_MESSAGES) {
        match ContextMessage::list_from_value(value) {
            Some(messages) => config.initial_messages = messages,
            None => warn!("Ignoring malformed '{}' option", LLM_INITIAL_MESSAGES),
        }
    }

    config
}

/// Names of the options in `options` that the transport ignores.
pub fn unsupported_options(options: &ClientOptions) -> Vec<String> {
    let mut unsupported = Vec::new();

    if options.enable_cam {
        unsupported.push("enableCam option".to_string());
    }
    if !options.services.is_empty() {
        unsupported.push("services option".to_string());
    }
    if options.custom_body_params.is_some() || options.params.request_data.is_some() {
        unsupported.push("params.requestData/customBodyParams option".to_string());
    }
    if options.custom_headers.is_some() || !options.params.headers.is_empty() {
        unsupported.push("params.headers/customHeaders option".to_string());
    }

    let config = options.effective_config();
    if config.iter().any(|c| c.service != "llm") {
        unsupported.push("config for service other than 'llm'".to_string());
    }
    if let Some(llm) = options.llm_config()
        && llm
            .options
            .iter()
            .any(|o| !SUPPORTED_LLM_OPTIONS.contains(&o.name.as_str()))
    {
        unsupported.push(format!(
            "'llm' service config option other than {}",
            SUPPORTED_LLM_OPTIONS.join(", ")
        ));
    }

    unsupported
}

pub fn log_unsupported_options(options: &ClientOptions) {
    for option in unsupported_options(options) {
        warn!("{} not supported", option);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_live_host_api::{ConfigOption, ServiceConfig};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_connection_config_from_llm_options() {
        let options = ClientOptions::default()
            .with_llm_option(LLM_API_KEY, json!("K"))
            .with_llm_option(LLM_MODEL, json!("models/custom"))
            .with_llm_option(LLM_GENERATION_CONFIG, json!({"temperature": 0.5}))
            .with_llm_option(
                LLM_INITIAL_MESSAGES,
                json!([{"role": "user", "content": "hi"}]),
            );

        let config = connection_config(&options, &GeminiLiveConfig::default());
        assert_eq!(config.api_key, "K");
        assert_eq!(config.model, "models/custom");
        assert_eq!(config.generation_config, Some(json!({"temperature": 0.5})));
        assert_eq!(config.initial_messages, vec![ContextMessage::new("user", "hi")]);
    }

    #[test]
    fn test_connection_config_keeps_base_values() {
        let base = GeminiLiveConfig {
            endpoint: "ws://127.0.0.1:9000/live".to_string(),
            ..GeminiLiveConfig::new("base-key")
        };
        let options = ClientOptions::default()
            .with_llm_option(LLM_API_KEY, json!(42))
            .with_llm_option(LLM_INITIAL_MESSAGES, json!("not a list"));

        let config = connection_config(&options, &base);
        assert_eq!(config.api_key, "base-key");
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/live");
        assert!(config.initial_messages.is_empty());
    }

    #[test]
    fn test_supported_options_are_not_reported() {
        let options = ClientOptions::default()
            .with_llm_option(LLM_API_KEY, json!("K"))
            .with_llm_option(LLM_MODEL, json!("m"));
        assert!(unsupported_options(&options).is_empty());
    }

    #[test]
    fn test_unsupported_options_are_reported() {
        let mut options = ClientOptions::default().with_llm_option("voice", json!("Puck"));
        options.enable_cam = true;
        options.services = HashMap::from([("llm".to_string(), "gemini".to_string())]);
        options.custom_headers = Some(HashMap::new());
        options.params.request_data = Some(json!({}));
        if let Some(config) = options.config.as_mut() {
            config.push(ServiceConfig {
                service: "tts".to_string(),
                options: vec![ConfigOption {
                    name: "voice".to_string(),
                    value: json!("x"),
                }],
            });
        }

        let unsupported = unsupported_options(&options);
        assert_eq!(unsupported.len(), 6);
        assert!(unsupported.iter().any(|o| o.starts_with("enableCam")));
        assert!(unsupported.iter().any(|o| o.starts_with("services")));
        assert!(unsupported.iter().any(|o| o.contains("requestData")));
        assert!(unsupported.iter().any(|o| o.contains("headers")));
        assert!(unsupported.iter().any(|o| o.contains("other than 'llm'")));
        assert!(unsupported.iter().any(|o| o.starts_with("'llm' service config option")));
    }
}
