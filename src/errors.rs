use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by a platform store.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum StoreError {
    #[error("User cancelled the payment.")]
    UserCancelled,
    #[error("Product is unavailable in the store: {0}.")]
    ProductUnavailable(String),
    #[error("Payment was declined: {0}.")]
    PaymentDeclined(String),
    #[error("Store could not be reached: {0}.")]
    NetworkUnavailable(String),
    #[error("Operation is not supported on this platform: {0}.")]
    PlatformNotSupported(String),
    #[error("Store call timed out.")]
    Timeout,
}

/// Failures reported by the game backend.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum BackendError {
    #[error("Backend returned client error {status}: {body}")]
    Http4xx { status: u16, body: String },
    #[error("Backend returned server error {status}: {body}")]
    Http5xx { status: u16, body: String },
    #[error("Backend could not be reached in time: {0}")]
    NetworkTimeout(String),
    #[error("Backend response could not be parsed: {0}")]
    MalformedResponse(String),
    #[error("Backend rejected the request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Only transport level failures are worth another attempt. A 4xx or an
    /// explicit denial will not change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Http5xx { .. } | BackendError::NetworkTimeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to access transaction ledger: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transaction ledger is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IapError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Social login failed with code {code}.")]
    SocialLogin { code: i32 },
    #[error("Init message could not be parsed: {0}")]
    InvalidInitMessage(String),
    #[error("Purchase service is no longer running.")]
    ServiceStopped,
}

