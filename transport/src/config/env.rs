use std::env;
use std::str::FromStr;

use super::LiveConfig;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_ENDPOINT: &str = "GEMINI_LIVE_ENDPOINT";
pub const ENV_ENABLE_MIC: &str = "GEMINI_LIVE_ENABLE_MIC";
pub const ENV_RECEIVE_RETRY_DELAY_MS: &str = "GEMINI_LIVE_RECEIVE_RETRY_DELAY_MS";
pub const ENV_MAX_RECEIVE_RETRIES: &str = "GEMINI_LIVE_MAX_RECEIVE_RETRIES";
pub const ENV_CAPTURE_LEVEL_BOOST: &str = "GEMINI_LIVE_CAPTURE_LEVEL_BOOST";
pub const ENV_DEVICE_POLL_INTERVAL_MS: &str = "GEMINI_LIVE_DEVICE_POLL_INTERVAL_MS";

/// Every variable read by [`load_from_env`].
pub const ENV_VARS: [&str; 8] = [
    ENV_API_KEY,
    ENV_MODEL,
    ENV_ENDPOINT,
    ENV_ENABLE_MIC,
    ENV_RECEIVE_RETRY_DELAY_MS,
    ENV_MAX_RECEIVE_RETRIES,
    ENV_CAPTURE_LEVEL_BOOST,
    ENV_DEVICE_POLL_INTERVAL_MS,
];

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: '{value}' ({e})").into()),
        None => Ok(None),
    }
}

fn parse_bool(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match non_empty(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid value for {name}: '{value}' (expected true or false)").into()),
        },
        None => Ok(None),
    }
}

/// Build a configuration from environment variables on top of the defaults.
pub fn load_from_env() -> Result<LiveConfig, Box<dyn std::error::Error>> {
    let mut config = LiveConfig::default();

    if let Some(api_key) = non_empty(ENV_API_KEY) {
        config.api_key = Some(api_key);
    }
    if let Some(model) = non_empty(ENV_MODEL) {
        config.model = model;
    }
    if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
        config.endpoint = endpoint;
    }
    if let Some(enable_mic) = parse_bool(ENV_ENABLE_MIC)? {
        config.enable_mic = enable_mic;
    }
    if let Some(delay) = parse_var::<u64>(ENV_RECEIVE_RETRY_DELAY_MS)? {
        config.receive_retry_delay_ms = delay;
    }
    if let Some(max) = parse_var::<u32>(ENV_MAX_RECEIVE_RETRIES)? {
        config.max_receive_retries = Some(max);
    }
    if let Some(boost) = parse_var::<f32>(ENV_CAPTURE_LEVEL_BOOST)? {
        config.capture_level_boost = boost;
    }
    if let Some(interval) = parse_var::<u64>(ENV_DEVICE_POLL_INTERVAL_MS)? {
        config.device_poll_interval_ms = Some(interval);
    }

    Ok(config)
}
