//! Provider registry and `"Provider: model"` resolution.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between the provider name and the provider-local model name
pub const PROVIDER_SEPARATOR: &str = ": ";

/// Connection info for one configured provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name, used as the model prefix (e.g. "OpenAI")
    pub name: String,
    /// Base endpoint, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    /// Bearer credential; local servers usually need none
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Reject entries that could never be resolved or reached
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() || self.name.contains(PROVIDER_SEPARATOR) {
            return Err(Error::InvalidConfig(format!(
                "provider name '{}' must be non-empty and must not contain '{}'",
                self.name, PROVIDER_SEPARATOR
            )));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "provider '{}' needs an http(s) base_url, got '{}'",
                self.name, self.base_url
            )));
        }
        Ok(())
    }
}

/// A model string routed to its provider, prefix stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ResolvedModel {
    /// Full chat-completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Lookup table of configured providers
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    /// Add or replace a provider by name.
    ///
    /// Fails with [`Error::InvalidConfig`] for an unusable entry.
    pub fn register(&mut self, provider: ProviderConfig) -> Result<()> {
        provider.validate()?;
        if let Some(existing) = self.providers.iter_mut().find(|p| p.name == provider.name) {
            *existing = provider;
        } else {
            self.providers.push(provider);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Resolve a `"<Provider>: <model>"` string.
    ///
    /// Fails with [`Error::UnknownProvider`] when the prefix is missing or
    /// does not name a registered provider.
    pub fn resolve(&self, model: &str) -> Result<ResolvedModel> {
        let (prefix, name) = split_model_id(model)
            .ok_or_else(|| Error::UnknownProvider(model.to_string()))?;
        let provider = self
            .get(prefix)
            .ok_or_else(|| Error::UnknownProvider(model.to_string()))?;

        Ok(ResolvedModel {
            provider: provider.name.clone(),
            model: name.to_string(),
            base_url: provider.base_url.clone(),
            api_key: provider.api_key.clone(),
        })
    }
}

/// Split `"Provider: model"` into its parts; `None` if either side is empty.
pub fn split_model_id(model: &str) -> Option<(&str, &str)> {
    let (prefix, name) = model.split_once(PROVIDER_SEPARATOR)?;
    let (prefix, name) = (prefix.trim(), name.trim());
    if prefix.is_empty() || name.is_empty() {
        None
    } else {
        Some((prefix, name))
    }
}

/// Join a provider name and model name into a routed model id
pub fn model_id(provider: &str, model: &str) -> String {
    format!("{provider}{PROVIDER_SEPARATOR}{model}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            ProviderConfig::new("OpenAI", "https://api.openai.com/v1/").with_api_key("sk-test"),
            ProviderConfig::new("Ollama", "http://localhost:11434/v1"),
        ])
    }

    #[test]
    fn test_resolve_strips_prefix() {
        let resolved = registry().resolve("OpenAI: gpt-4o-mini").unwrap();
        assert_eq!(resolved.provider, "OpenAI");
        assert_eq!(resolved.model, "gpt-4o-mini");
        assert_eq!(resolved.api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            resolved.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_resolve_keeps_colons_in_model_name() {
        let resolved = registry().resolve("Ollama: llama3:8b").unwrap();
        assert_eq!(resolved.model, "llama3:8b");
        assert!(resolved.api_key.is_none());
    }

    #[test]
    fn test_resolve_unknown_prefix() {
        let err = registry().resolve("Anthropic: claude").unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(m) if m == "Anthropic: claude"));
    }

    #[test]
    fn test_resolve_missing_prefix() {
        assert!(matches!(
            registry().resolve("gpt-4o"),
            Err(Error::UnknownProvider(_))
        ));
        assert!(matches!(
            registry().resolve("OpenAI: "),
            Err(Error::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut reg = registry();
        reg.register(ProviderConfig::new("OpenAI", "https://proxy.local/v1"))
            .unwrap();
        assert_eq!(reg.providers().len(), 2);
        assert_eq!(reg.get("OpenAI").unwrap().base_url, "https://proxy.local/v1");
    }

    #[test]
    fn test_register_rejects_unusable_entries() {
        let mut reg = ProviderRegistry::default();
        for provider in [
            ProviderConfig::new("", "https://api.openai.com/v1"),
            ProviderConfig::new("Open: AI", "https://api.openai.com/v1"),
            ProviderConfig::new("Local", ""),
            ProviderConfig::new("Local", "localhost:8080"),
        ] {
            let err = reg.register(provider).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
        }
        assert!(reg.providers().is_empty());
    }

    #[test]
    fn test_model_id_round_trips() {
        let id = model_id("Groq", "llama-3.1-8b");
        assert_eq!(split_model_id(&id), Some(("Groq", "llama-3.1-8b")));
    }
}
