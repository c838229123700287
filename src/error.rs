//! Error types for the assistant pipeline

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while authorizing or talking to the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Client credential file missing, unreadable, or malformed
    #[error("failed to read credentials from {}: {reason}", path.display())]
    CredentialRead {
        /// Path of the credential file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// OAuth2 authorization flow failed
    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),

    /// Transport channel to the assistant could not be established
    #[error("connection error: {0}")]
    Connection(String),

    /// Query frame could not be delivered
    #[error("send error: {0}")]
    Send(String),

    /// Inbound response stream failed
    #[error("receive error: {0}")]
    Recv(#[from] RecvError),

    /// No usable audio output device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio write error
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures of the authorization-code flow
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// Callback listener could not bind its address
    #[error("cannot listen on {addr}: {reason}")]
    Bind {
        /// Address the listener tried to bind
        addr: String,
        /// Underlying bind failure
        reason: String,
    },

    /// No callback arrived in time
    #[error("no authorization callback within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Token endpoint rejected the exchange
    #[error("token endpoint rejected the request ({status}): {body}")]
    ExchangeRejected {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Response body
        body: String,
    },

    /// Token endpoint did not answer in time
    #[error("token endpoint did not answer within {}s", .0.as_secs())]
    ExchangeTimeout(Duration),

    /// Token endpoint could not be reached or answered garbage
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// User or provider refused consent
    #[error("authorization denied: {0}")]
    Denied(String),

    /// Granted token could not be written to the cache
    #[error("failed to persist token: {0}")]
    Persist(String),

    /// Redirect URI cannot be served locally
    #[error("invalid redirect uri: {0}")]
    InvalidRedirect(String),

    /// Callback listener stopped before delivering a result
    #[error("callback listener failed: {0}")]
    Listener(String),
}

/// Failures while consuming the response stream
#[derive(Debug, Error)]
pub enum RecvError {
    /// Conversation deadline elapsed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Stream reported an error status
    #[error("stream failed: {0}")]
    Stream(String),
}
