use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::core::realtime::gemini::ContextMessage;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// gemini:
///   api_key: "your-api-key"
///   model: "models/gemini-2.0-flash-exp"
///   endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent"
///   generation_config:
///     speech_config:
///       voice_config:
///         prebuilt_voice_config:
///           voice_name: "Puck"
///   initial_messages:
///     - role: "system"
///       content: "You are a friendly assistant."
///     - role: "user"
///       content: "Say hello."
///
/// session:
///   enable_mic: true
///   receive_retry_delay_ms: 250
///   max_receive_retries: 40
///
/// audio:
///   capture_level_boost: 10.0
///   device_poll_interval_ms: 2000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub gemini: Option<GeminiYaml>,
    pub session: Option<SessionYaml>,
    pub audio: Option<AudioYaml>,
}

/// Gemini Live service settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    /// Passed through to the `setup` message as `generationConfig`
    pub generation_config: Option<Value>,
    pub initial_messages: Option<Vec<ContextMessage>>,
}

/// Session behaviour from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub enable_mic: Option<bool>,
    pub receive_retry_delay_ms: Option<u64>,
    /// Omit to retry failed reads until disconnect
    pub max_receive_retries: Option<u32>,
}

/// Audio device settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub capture_level_boost: Option<f32>,
    pub device_poll_interval_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
gemini:
  api_key: "yaml-key"
  model: "models/custom"
  endpoint: "ws://localhost:9000/live"
  generation_config:
    temperature: 0.4
  initial_messages:
    - role: "user"
      content: "hi"

session:
  enable_mic: false
  receive_retry_delay_ms: 100
  max_receive_retries: 5

audio:
  capture_level_boost: 4.0
  device_poll_interval_ms: 500
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let gemini = config.gemini.unwrap();
        assert_eq!(gemini.api_key, Some("yaml-key".to_string()));
        assert_eq!(gemini.model, Some("models/custom".to_string()));
        assert_eq!(gemini.endpoint, Some("ws://localhost:9000/live".to_string()));
        assert_eq!(gemini.generation_config, Some(json!({"temperature": 0.4})));
        assert_eq!(
            gemini.initial_messages,
            Some(vec![ContextMessage::new("user", "hi")])
        );

        let session = config.session.unwrap();
        assert_eq!(session.enable_mic, Some(false));
        assert_eq!(session.receive_retry_delay_ms, Some(100));
        assert_eq!(session.max_receive_retries, Some(5));

        let audio = config.audio.unwrap();
        assert_eq!(audio.capture_level_boost, Some(4.0));
        assert_eq!(audio.device_poll_interval_ms, Some(500));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
gemini:
  model: "models/custom"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let gemini = config.gemini.unwrap();
        assert_eq!(gemini.model, Some("models/custom".to_string()));
        assert!(gemini.api_key.is_none());
        assert!(gemini.initial_messages.is_none());
        assert!(config.session.is_none());
        assert!(config.audio.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.gemini.is_none());
        assert!(config.session.is_none());
        assert!(config.audio.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "session:\n  enable_mic: false\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(config.session.unwrap().enable_mic, Some(false));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
