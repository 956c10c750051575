//! Built-in provider presets for the upstream LLM APIs the relay can target.
//!
//! Each preset defines the base URL, API format, the environment variable that
//! holds the API key, and the model used when neither the caller nor the config
//! names one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire format spoken by an upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    /// `POST {base}/chat/completions` with a bearer token.
    #[serde(rename = "openai")]
    OpenAi,
    /// `POST {base}/models/{model}:generateContent?key=...`
    Gemini,
}

impl fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub format: ApiFormat,
    pub default_api_key_env: &'static str,
    pub default_model: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        format: ApiFormat::OpenAi,
        default_api_key_env: "OPENAI_API_KEY",
        default_model: "gpt-4o-mini",
    },
    ProviderPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        format: ApiFormat::OpenAi,
        default_api_key_env: "OPENROUTER_API_KEY",
        default_model: "openai/gpt-4o-mini",
    },
    ProviderPreset {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        format: ApiFormat::OpenAi,
        default_api_key_env: "GROQ_API_KEY",
        default_model: "llama-3.1-8b-instant",
    },
    ProviderPreset {
        name: "together",
        base_url: "https://api.together.xyz/v1",
        format: ApiFormat::OpenAi,
        default_api_key_env: "TOGETHER_API_KEY",
        default_model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo",
    },
    ProviderPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        format: ApiFormat::OpenAi,
        default_api_key_env: "DEEPSEEK_API_KEY",
        default_model: "deepseek-chat",
    },
    ProviderPreset {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference/v1",
        format: ApiFormat::OpenAi,
        default_api_key_env: "FIREWORKS_API_KEY",
        default_model: "accounts/fireworks/models/llama-v3p1-8b-instruct",
    },
    ProviderPreset {
        name: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        format: ApiFormat::Gemini,
        default_api_key_env: "GEMINI_API_KEY",
        default_model: "gemini-1.5-flash",
    },
];

impl ProviderPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ProviderPreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    #[must_use]
    pub fn all() -> &'static [ProviderPreset] {
        PRESETS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        assert!(ProviderPreset::from_name("openai").is_some());
        assert!(ProviderPreset::from_name("gemini").is_some());
        assert!(ProviderPreset::from_name("OpenRouter").is_some()); // case-insensitive
        assert!(ProviderPreset::from_name("unknown_provider").is_none());
    }

    #[test]
    fn test_gemini_is_only_gemini_format() {
        for preset in ProviderPreset::all() {
            let expected = if preset.name == "gemini" {
                ApiFormat::Gemini
            } else {
                ApiFormat::OpenAi
            };
            assert_eq!(preset.format, expected, "Provider {} has wrong format", preset.name);
        }
    }

    #[test]
    fn test_default_models() {
        assert_eq!(
            ProviderPreset::from_name("openai").unwrap().default_model,
            "gpt-4o-mini"
        );
        assert_eq!(
            ProviderPreset::from_name("gemini").unwrap().default_model,
            "gemini-1.5-flash"
        );
    }

    #[test]
    fn test_format_serde_names() {
        let f: ApiFormat = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(f, ApiFormat::OpenAi);
        let f: ApiFormat = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(f, ApiFormat::Gemini);
        assert_eq!(ApiFormat::OpenAi.to_string(), "openai");
    }
}
