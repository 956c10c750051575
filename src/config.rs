use crate::error::{ProxyError, Result};
use crate::providers::{ApiFormat, ProviderPreset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest `/chat` body accepted before answering 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub defaults: ChatDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ApiFormat>,
}

/// Values applied when a chat request leaves a field out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// The upstream API key, read once at startup and injected into the app state.
#[derive(Debug, Clone)]
pub struct ApiCredential {
    pub env_var: String,
    pub key: Option<String>,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            provider: ProviderConfig::default(),
            defaults: ChatDefaults::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
            api_key_env: None,
            format: None,
        }
    }
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            system: None,
        }
    }
}

impl ApiCredential {
    pub fn new(env_var: impl Into<String>, key: Option<String>) -> Self {
        Self {
            env_var: env_var.into(),
            key: key.filter(|k| !k.is_empty()),
        }
    }

    /// Snapshot the named environment variable. Unset and empty are both "absent".
    pub fn from_env(env_var: &str) -> Self {
        Self::new(env_var, std::env::var(env_var).ok())
    }

    pub fn is_present(&self) -> bool {
        self.key.is_some()
    }

    /// The key, or the error the chat endpoint reports when it is missing.
    pub fn require(&self) -> Result<&str> {
        self.key
            .as_deref()
            .ok_or_else(|| ProxyError::missing_api_key(&self.env_var))
    }
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    fn preset(&self) -> Option<&'static ProviderPreset> {
        ProviderPreset::from_name(&self.provider.name)
    }

    /// Resolve the effective base URL (config override or provider preset default)
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.provider.base_url {
            return Ok(url.clone());
        }

        let preset = self.preset().ok_or_else(|| {
            ProxyError::config(format!(
                "Unknown provider '{}' and no base_url configured. Known providers: {}",
                self.provider.name,
                known_provider_names()
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Wire format: explicit override, then preset, then OpenAI-compatible.
    pub fn api_format(&self) -> ApiFormat {
        if let Some(format) = self.provider.format {
            return format;
        }

        self.preset().map_or(ApiFormat::OpenAi, |p| p.format)
    }

    /// Name of the environment variable holding the upstream API key.
    pub fn api_key_env(&self) -> String {
        if let Some(ref name) = self.provider.api_key_env {
            return name.clone();
        }

        match self.preset() {
            Some(preset) => preset.default_api_key_env.to_string(),
            None => match self.api_format() {
                ApiFormat::OpenAi => "OPENAI_API_KEY".to_string(),
                ApiFormat::Gemini => "GEMINI_API_KEY".to_string(),
            },
        }
    }

    /// Model used when the request names none: config default, then preset default.
    pub fn default_model(&self) -> String {
        if let Some(ref model) = self.defaults.model {
            return model.clone();
        }

        match self.preset() {
            Some(preset) => preset.default_model.to_string(),
            None => match self.api_format() {
                ApiFormat::OpenAi => "gpt-4o-mini".to_string(),
                ApiFormat::Gemini => "gemini-1.5-flash".to_string(),
            },
        }
    }

    /// Read the API key from the configured environment variable.
    pub fn resolve_credential(&self) -> ApiCredential {
        ApiCredential::from_env(&self.api_key_env())
    }

    /// Point the config at a different preset, resetting the fields the old one implied.
    pub fn use_provider(&mut self, name: &str) {
        self.provider.name = name.to_string();
        if let Some(preset) = ProviderPreset::from_name(name) {
            self.provider.base_url = Some(preset.base_url.to_string());
            self.provider.api_key_env = Some(preset.default_api_key_env.to_string());
            self.provider.format = Some(preset.format);
        }
    }
}

fn known_provider_names() -> String {
    ProviderPreset::all()
        .iter()
        .map(|p| p.name)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("chat-relay.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("chat-relay").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("chat-relay").join("config.toml"));
        paths.push(home.join(".chat-relay.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[provider]
name = "gemini"

[defaults]
temperature = 0.2
system = "Keep answers short."
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.provider.name, "gemini");
        assert_eq!(config.api_format(), ApiFormat::Gemini);
        assert_eq!(config.api_key_env(), "GEMINI_API_KEY");
        assert_eq!(config.default_model(), "gemini-1.5-flash");
        assert_eq!(config.defaults.temperature, 0.2);
        assert_eq!(config.defaults.system.as_deref(), Some("Keep answers short."));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.provider.name, "openai");
        assert_eq!(config.defaults.temperature, 0.7);
        assert_eq!(config.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "port = \"not a number\"").unwrap();
        assert!(matches!(
            ProxyConfig::load(f.path()),
            Err(ProxyError::Toml(_))
        ));
    }

    #[test]
    fn test_effective_base_url_from_preset() {
        let config = ProxyConfig::default();
        assert_eq!(config.effective_base_url().unwrap(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_effective_base_url_override() {
        let mut config = ProxyConfig::default();
        config.provider = ProviderConfig {
            name: "custom".to_string(),
            base_url: Some("https://my-server.com/v1".to_string()),
            api_key_env: Some("MY_KEY".to_string()),
            format: None,
        };

        assert_eq!(config.effective_base_url().unwrap(), "https://my-server.com/v1");
        assert_eq!(config.api_key_env(), "MY_KEY");
        assert_eq!(config.api_format(), ApiFormat::OpenAi);
    }

    #[test]
    fn test_unknown_provider_without_base_url() {
        let mut config = ProxyConfig::default();
        config.provider.name = "nowhere".to_string();
        let err = config.effective_base_url().unwrap_err();
        assert!(err.to_string().contains("Unknown provider 'nowhere'"));
    }

    #[test]
    fn test_custom_gemini_format_falls_back_to_gemini_defaults() {
        let mut config = ProxyConfig::default();
        config.provider = ProviderConfig {
            name: "vertex-proxy".to_string(),
            base_url: Some("http://localhost:9000".to_string()),
            api_key_env: None,
            format: Some(ApiFormat::Gemini),
        };

        assert_eq!(config.api_key_env(), "GEMINI_API_KEY");
        assert_eq!(config.default_model(), "gemini-1.5-flash");
    }

    #[test]
    fn test_configured_model_beats_preset() {
        let mut config = ProxyConfig::default();
        config.defaults.model = Some("gpt-4o".to_string());
        assert_eq!(config.default_model(), "gpt-4o");
    }

    #[test]
    fn test_use_provider_resets_preset_fields() {
        let mut config = ProxyConfig::default();
        config.provider.base_url = Some("https://stale.example".to_string());
        config.use_provider("gemini");

        assert_eq!(config.api_format(), ApiFormat::Gemini);
        assert_eq!(config.api_key_env(), "GEMINI_API_KEY");
        assert_eq!(
            config.effective_base_url().unwrap(),
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn test_credential_presence() {
        assert!(ApiCredential::new("K", Some("abc".to_string())).is_present());
        assert!(!ApiCredential::new("K", Some(String::new())).is_present());

        let missing = ApiCredential::new("OPENAI_API_KEY", None);
        assert!(!missing.is_present());
        assert_eq!(
            missing.require().unwrap_err().to_string(),
            "Missing OPENAI_API_KEY on the server"
        );
    }
}
