//! Configuration — loaded from a TOML file at startup.
//!
//! Secrets (mailbox password, API keys) can live in the file or in the
//! environment; they are held as `SecretString` either way so they never
//! end up in debug output or logs.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default poll interval in seconds for continuous mode.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Our own mailbox address; used for reply-loop detection and as the
    /// From address on outbound replies.
    pub own_address: String,
    pub mailbox: MailboxConfig,
    pub llm: LlmSettings,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.own_address.contains('@') {
            return Err(ConfigError::InvalidValue {
                key: "own_address".into(),
                message: format!("'{}' is not an email address", self.own_address),
            });
        }
        Ok(())
    }
}

/// Mailbox provider selection plus provider-specific settings.
#[derive(Debug, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum MailboxConfig {
    Imap(ImapConfig),
    Gmail(GmailConfig),
}

/// IMAP + SMTP settings for a generic provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub password: SecretString,
}

fn default_imap_port() -> u16 {
    993
}

fn default_smtp_port() -> u16 {
    587
}

/// Gmail REST API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    /// OAuth2 access token with the gmail.modify scope.
    pub access_token: SecretString,
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable consulted when the config file carries no key.
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Reply generator settings.
#[derive(Debug, Deserialize)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub model: String,
    /// API key; falls back to the backend's environment variable.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Assistant persona woven into the reply prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
}

fn default_persona() -> String {
    "a helpful, professional assistant".to_string()
}

impl LlmSettings {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<SecretString, ConfigError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        let var = self.backend.api_key_env_var();
        match std::env::var(var) {
            Ok(key) if !key.is_empty() => Ok(SecretString::from(key)),
            _ => Err(ConfigError::MissingRequired {
                key: "llm.api_key".into(),
                hint: format!("Set it in the config file or export {var}"),
            }),
        }
    }
}

/// Interaction log sink selection.
#[derive(Debug, Deserialize)]
#[serde(tag = "sink", rename_all = "lowercase")]
pub enum LogConfig {
    Csv {
        #[serde(default = "default_csv_path")]
        path: String,
    },
    Jsonl {
        #[serde(default = "default_jsonl_path")]
        path: String,
    },
}

fn default_csv_path() -> String {
    "interactions.csv".to_string()
}

fn default_jsonl_path() -> String {
    "interactions.jsonl".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::Csv {
            path: default_csv_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_imap_config() {
        let raw = r#"
            own_address = "assistant@co.com"

            [mailbox]
            provider = "imap"
            host = "imap.co.com"
            smtp_host = "smtp.co.com"
            password = "hunter2"

            [llm]
            backend = "anthropic"
            model = "claude-sonnet-4-20250514"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.own_address, "assistant@co.com");
        match config.mailbox {
            MailboxConfig::Imap(imap) => {
                assert_eq!(imap.host, "imap.co.com");
                assert_eq!(imap.port, 993);
                assert_eq!(imap.smtp_port, 587);
            }
            MailboxConfig::Gmail(_) => panic!("expected imap"),
        }
        assert_eq!(config.llm.backend, LlmBackend::Anthropic);
        assert_eq!(config.llm.persona, "a helpful, professional assistant");
        assert!(matches!(config.log, LogConfig::Csv { .. }));
    }

    #[test]
    fn parses_gmail_with_jsonl_log() {
        let raw = r#"
            own_address = "assistant@gmail.com"

            [mailbox]
            provider = "gmail"
            access_token = "ya29.token"

            [llm]
            backend = "openai"
            model = "gpt-4o"
            persona = "a terse operations bot"

            [log]
            sink = "jsonl"
            path = "out/interactions.jsonl"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(config.mailbox, MailboxConfig::Gmail(_)));
        assert_eq!(config.llm.persona, "a terse operations bot");
        match config.log {
            LogConfig::Jsonl { path } => assert_eq!(path, "out/interactions.jsonl"),
            LogConfig::Csv { .. } => panic!("expected jsonl"),
        }
    }

    #[test]
    fn rejects_unknown_provider() {
        let raw = r#"
            own_address = "a@b.com"

            [mailbox]
            provider = "pigeon"

            [llm]
            backend = "anthropic"
            model = "m"
        "#;
        assert!(toml::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn validate_rejects_bad_address() {
        let raw = r#"
            own_address = "not-an-address"

            [mailbox]
            provider = "gmail"
            access_token = "t"

            [llm]
            backend = "anthropic"
            model = "m"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = Config::load(Path::new("/nonexistent/mailpilot.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn backend_env_var_names() {
        assert_eq!(LlmBackend::Anthropic.api_key_env_var(), "ANTHROPIC_API_KEY");
        assert_eq!(LlmBackend::OpenAi.api_key_env_var(), "OPENAI_API_KEY");
    }
}
