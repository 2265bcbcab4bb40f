//! Configuration file support

use anyhow::Context;
use forkchat_ai::{IngestConfig, ProviderConfig, ProviderRegistry};
use forkchat_core::GenerationSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Model used when neither the config nor the command line names one
pub const DEFAULT_MODEL: &str = "OpenAI: gpt-4o-mini";

/// Configuration for forkchat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider-prefixed default model, e.g. "OpenAI: gpt-4o-mini"
    pub model: Option<String>,
    /// System prompt sent ahead of every request
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Visible messages at which a title is generated
    pub title_threshold: Option<usize>,
    /// Seconds of silence after the first token before a reply counts as done
    pub idle_timeout_secs: Option<u64>,
    pub providers: Vec<ProviderEntry>,
}

/// One `[[providers]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub base_url: String,
    /// Inline credential; prefer `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl ProviderEntry {
    /// Credential from the config, then from the named env var
    pub fn api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty())
        })
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forkchat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FORKCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> anyhow::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        Self::starter().save_to(&path)?;
        Ok(path)
    }

    /// Config written by `--init-config`
    pub fn starter() -> Self {
        Self {
            model: Some(DEFAULT_MODEL.to_string()),
            system_prompt: None,
            temperature: Some(0.7),
            max_tokens: Some(2048),
            title_threshold: Some(forkchat_core::title::DEFAULT_TITLE_THRESHOLD),
            idle_timeout_secs: Some(forkchat_ai::stream::DEFAULT_IDLE_TIMEOUT.as_secs()),
            providers: vec![
                ProviderEntry {
                    name: "OpenAI".to_string(),
                    base_url: "https://api.openai.com/v1".to_string(),
                    api_key: None,
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                },
                ProviderEntry {
                    name: "Ollama".to_string(),
                    base_url: "http://localhost:11434/v1".to_string(),
                    api_key: None,
                    api_key_env: None,
                },
            ],
        }
    }

    /// Model from the config, or the built-in default
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Provider table; an empty config gets the starter providers.
    ///
    /// Fails on the first unusable `[[providers]]` entry.
    pub fn registry(&self) -> forkchat_ai::Result<ProviderRegistry> {
        let entries = if self.providers.is_empty() {
            Self::starter().providers
        } else {
            self.providers.clone()
        };

        let mut registry = ProviderRegistry::default();
        for entry in entries {
            let mut provider = ProviderConfig::new(entry.name.clone(), entry.base_url.clone());
            if let Some(key) = entry.api_key() {
                provider = provider.with_api_key(key);
            }
            registry.register(provider)?;
        }
        Ok(registry)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        let defaults = GenerationSettings::default();
        let ingest = match self.idle_timeout_secs {
            Some(secs) if secs > 0 => IngestConfig {
                idle_timeout: Duration::from_secs(secs),
            },
            _ => IngestConfig::default(),
        };
        GenerationSettings {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            system_prompt: self.system_prompt.clone(),
            title_threshold: self.title_threshold.unwrap_or(defaults.title_threshold),
            ingest,
            title_model: None,
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# forkchat configuration file
# Place at ~/.config/forkchat/config.toml or point FORKCHAT_CONFIG_PATH at it

# Default model, as "<Provider>: <model>"
model = "OpenAI: gpt-4o-mini"

# system_prompt = "You are a concise assistant."
temperature = 0.7
max_tokens = 2048

# Generate a title once the conversation shows this many messages
title_threshold = 2

# Treat a reply as finished after this many seconds without a new token
idle_timeout_secs = 8

[[providers]]
name = "OpenAI"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"

[[providers]]
name = "Ollama"
base_url = "http://localhost:11434/v1"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.model.as_deref(), Some("OpenAI: gpt-4o-mini"));
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.title_threshold, Some(2));

        let registry = config.registry().unwrap();
        let resolved = registry.resolve("Ollama: llama3").unwrap();
        assert_eq!(resolved.model, "llama3");
        assert!(resolved.api_key.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.model(), DEFAULT_MODEL);

        let settings = config.generation_settings();
        assert_eq!(settings.title_threshold, 2);
        assert_eq!(settings.ingest.idle_timeout, Duration::from_secs(8));
        assert!(config.registry().unwrap().get("OpenAI").is_some());
    }

    #[test]
    fn test_settings_from_config() {
        let config: Config = toml::from_str(
            r#"
            system_prompt = "Be brief."
            temperature = 0.2
            max_tokens = 100
            title_threshold = 4
            idle_timeout_secs = 30
            "#,
        )
        .unwrap();
        let settings = config.generation_settings();
        assert_eq!(settings.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(settings.temperature, 0.2);
        assert_eq!(settings.max_tokens, 100);
        assert_eq!(settings.title_threshold, 4);
        assert_eq!(settings.ingest.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_registry_rejects_bad_provider() {
        let config: Config = toml::from_str(
            r#"
            [[providers]]
            name = "Local"
            base_url = ""
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.registry(),
            Err(forkchat_ai::Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_inline_key_wins_over_env() {
        let entry = ProviderEntry {
            name: "Local".into(),
            base_url: "http://localhost:8080/v1".into(),
            api_key: Some("inline".into()),
            api_key_env: Some("FORKCHAT_TEST_UNSET_KEY_VAR".into()),
        };
        assert_eq!(entry.api_key().as_deref(), Some("inline"));

        let entry = ProviderEntry {
            api_key: None,
            ..entry
        };
        assert_eq!(entry.api_key(), None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::starter();
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }
}
