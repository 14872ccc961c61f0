//! Error types for mailpilot.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

/// Configuration-related errors.
///
/// These are the only errors that abort the process — everything else is
/// contained inside a cycle.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox gateway errors (IMAP, SMTP, Gmail API).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("Authentication failed for {account}: {reason}")]
    AuthFailed { account: String, reason: String },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Failed to send reply to {recipient}: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("Failed to update read state for message {id}: {reason}")]
    MarkReadFailed { id: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reply generator setup errors.
///
/// Only construction can fail. Drafting never surfaces an error — the
/// generator substitutes fallback text instead (see `generator` module).
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Provider {provider} setup failed: {reason}")]
    SetupFailed { provider: String, reason: String },

    #[error("Missing API key for provider {provider} (set {env_var})")]
    MissingApiKey { provider: String, env_var: String },
}

/// Interaction log sink errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Failed to append to log at {path}: {reason}")]
    AppendFailed { path: String, reason: String },

    #[error("Failed to create log at {path}: {reason}")]
    CreateFailed { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
