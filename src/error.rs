use std::io;

/// Custom error type for simple_git_hooks operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Could not parse webhook payload: {0}")]
    PayloadParseFailure(#[from] serde_json::Error),

    #[error("No hook configured for repository '{repository}' ref '{reference}'")]
    NoMatchingHook {
        repository: String,
        reference: String,
    },

    #[error("Unhandled webhook for repository '{repository}' ref '{reference}'")]
    UnhandledEvent {
        repository: String,
        reference: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;
