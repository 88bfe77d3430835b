use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{BackendError, StoreError};

/// Why a purchase attempt ended without entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum PurchaseFailureReason {
    /// Session fields missing, item not in the catalog, or another attempt for
    /// the same item still running. No provider was contacted.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The user backed out voluntarily. Not an error worth a dialog.
    #[error("cancelled by user")]
    UserCancelled,

    /// The platform store refused or could not take the payment.
    #[error("store error: {0}")]
    StoreError(StoreError),

    /// The backend stayed unreachable (timeout / 5xx) after every retry. The
    /// store transaction is left unconfirmed and will be replayed.
    #[error("backend unavailable: {0}")]
    BackendTransient(String),

    /// The backend refused the purchase (4xx / explicit denial). The store
    /// transaction is left unconfirmed and will be replayed.
    #[error("backend rejected: {0}")]
    BackendRejected(String),

    /// The backend answered with something that could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl PurchaseFailureReason {
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, PurchaseFailureReason::UserCancelled)
    }

    pub(crate) fn from_store_error(e: StoreError) -> Self {
        match e {
            StoreError::UserCancelled => PurchaseFailureReason::UserCancelled,
            other => PurchaseFailureReason::StoreError(other),
        }
    }

    pub(crate) fn from_backend_error(e: BackendError) -> Self {
        match e {
            BackendError::Http5xx { .. } | BackendError::NetworkTimeout(_) => {
                PurchaseFailureReason::BackendTransient(e.to_string())
            }
            BackendError::MalformedResponse(m) => PurchaseFailureReason::MalformedResponse(m),
            BackendError::Http4xx { .. } | BackendError::Rejected(_) => {
                PurchaseFailureReason::BackendRejected(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_side() {
        assert_eq!(
            PurchaseFailureReason::UserCancelled.to_string(),
            "cancelled by user"
        );
        let reason = PurchaseFailureReason::from_store_error(StoreError::Timeout);
        assert!(reason.to_string().starts_with("store error: "));
        let reason = PurchaseFailureReason::from_backend_error(BackendError::Http5xx {
            status: 502,
            body: String::new(),
        });
        assert!(reason.to_string().starts_with("backend unavailable: "));
        let err: &dyn std::error::Error = &reason;
        assert!(err.source().is_none());
    }
}
