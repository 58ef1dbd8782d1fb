//! Provider and model selection.

use crate::errors::ConfigError;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Environment variable consulted when no API key is passed.
pub const API_KEY_ENV: &str = "AGENT_API_KEY";

const KNOWN_OPENAI_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-3.5-turbo",
    "whisper-1",
];

/// Models accepted for the xAI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XAiModel {
    /// `grok-beta`
    GrokBeta,
    /// `grok-2`
    Grok2,
    /// `grok-2-latest`
    Grok2Latest,
    /// `grok-2-vision`
    Grok2Vision,
    /// `grok-3`
    Grok3,
    /// `grok-3-mini`
    Grok3Mini,
}

impl XAiModel {
    /// Returns the API model identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GrokBeta => "grok-beta",
            Self::Grok2 => "grok-2",
            Self::Grok2Latest => "grok-2-latest",
            Self::Grok2Vision => "grok-2-vision",
            Self::Grok3 => "grok-3",
            Self::Grok3Mini => "grok-3-mini",
        }
    }
}

impl FromStr for XAiModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grok-beta" => Ok(Self::GrokBeta),
            "grok-2" => Ok(Self::Grok2),
            "grok-2-latest" => Ok(Self::Grok2Latest),
            "grok-2-vision" => Ok(Self::Grok2Vision),
            "grok-3" => Ok(Self::Grok3),
            "grok-3-mini" => Ok(Self::Grok3Mini),
            other => Err(ConfigError::UnknownModel {
                provider: "xai".to_string(),
                model: other.to_string(),
            }),
        }
    }
}

/// A provider together with a model it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderModel {
    /// OpenAI; any model name is accepted.
    OpenAi(String),
    /// Anthropic; any model name is accepted.
    Anthropic(String),
    /// xAI; only known models.
    XAi(XAiModel),
}

impl ProviderModel {
    /// Parses a provider name (case-insensitive) and model name.
    ///
    /// Unknown OpenAI models are accepted with a warning since the provider
    /// may be newer than this list.
    pub fn parse(provider: &str, model: &str) -> Result<Self, ConfigError> {
        match provider.to_ascii_lowercase().as_str() {
            "openai" => {
                if !KNOWN_OPENAI_MODELS.contains(&model) {
                    warn!(model, "unknown OpenAI model, calls may fail");
                }
                Ok(Self::OpenAi(model.to_string()))
            }
            "anthropic" => Ok(Self::Anthropic(model.to_string())),
            "xai" => model.parse().map(Self::XAi),
            _ => Err(ConfigError::UnknownProvider(provider.to_string())),
        }
    }

    /// Returns the provider name.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai",
            Self::Anthropic(_) => "anthropic",
            Self::XAi(_) => "xai",
        }
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(model) | Self::Anthropic(model) => model,
            Self::XAi(model) => model.as_str(),
        }
    }
}

/// Validated selection a provider client is built from.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelConfig {
    api_key: String,
    model: ProviderModel,
}

impl ModelConfig {
    /// Validates `provider` and `model`, taking the API key from
    /// `api_key` or else from [`API_KEY_ENV`].
    pub fn new(api_key: Option<String>, provider: &str, model: &str) -> Result<Self, ConfigError> {
        Self::with_env(api_key, provider, model, |name| std::env::var(name).ok())
    }

    /// Like [`ModelConfig::new`] with a custom environment lookup.
    pub fn with_env<E>(
        api_key: Option<String>,
        provider: &str,
        model: &str,
        env: E,
    ) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let model = ProviderModel::parse(provider, model)?;
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .or_else(|| env(API_KEY_ENV).filter(|key| !key.is_empty()))
            .ok_or(ConfigError::MissingApiKey {
                env_var: API_KEY_ENV,
            })?;
        Ok(Self { api_key, model })
    }

    /// Returns the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the provider and model.
    #[must_use]
    pub const fn model(&self) -> &ProviderModel {
        &self.model
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}
