use super::LiveConfig;
use super::yaml::YamlConfig;

/// Overlay the values present in `yaml` on top of `config`.
///
/// Absent YAML fields leave the existing (environment or default) value in
/// place.
pub fn merge_yaml(config: &mut LiveConfig, yaml: YamlConfig) {
    if let Some(gemini) = yaml.gemini {
        if let Some(api_key) = gemini.api_key {
            config.api_key = Some(api_key);
        }
        if let Some(model) = gemini.model {
            config.model = model;
        }
        if let Some(endpoint) = gemini.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(generation_config) = gemini.generation_config {
            config.generation_config = Some(generation_config);
        }
        if let Some(initial_messages) = gemini.initial_messages {
            config.initial_messages = initial_messages;
        }
    }

    if let Some(session) = yaml.session {
        if let Some(enable_mic) = session.enable_mic {
            config.enable_mic = enable_mic;
        }
        if let Some(delay) = session.receive_retry_delay_ms {
            config.receive_retry_delay_ms = delay;
        }
        if let Some(max) = session.max_receive_retries {
            config.max_receive_retries = Some(max);
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(boost) = audio.capture_level_boost {
            config.capture_level_boost = boost;
        }
        if let Some(interval) = audio.device_poll_interval_ms {
            config.device_poll_interval_ms = Some(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AudioYaml, GeminiYaml, SessionYaml};

    #[test]
    fn test_yaml_overrides_present_fields_only() {
        let mut config = LiveConfig {
            api_key: Some("env-key".to_string()),
            model: "models/env".to_string(),
            ..Default::default()
        };

        let yaml = YamlConfig {
            gemini: Some(GeminiYaml {
                model: Some("models/yaml".to_string()),
                ..Default::default()
            }),
            session: Some(SessionYaml {
                max_receive_retries: Some(2),
                ..Default::default()
            }),
            audio: Some(AudioYaml {
                device_poll_interval_ms: Some(750),
                ..Default::default()
            }),
        };

        merge_yaml(&mut config, yaml);

        assert_eq!(config.api_key, Some("env-key".to_string()));
        assert_eq!(config.model, "models/yaml");
        assert_eq!(config.max_receive_retries, Some(2));
        assert_eq!(config.device_poll_interval_ms, Some(750));
        assert!(config.enable_mic);
    }

    #[test]
    fn test_empty_yaml_is_a_no_op() {
        let mut config = LiveConfig::default();
        merge_yaml(&mut config, YamlConfig::default());
        assert_eq!(config, LiveConfig::default());
    }
}
