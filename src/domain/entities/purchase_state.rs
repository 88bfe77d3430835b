use serde::{Deserialize, Serialize};

use super::{
    purchase::{PurchaseIntent, PurchaseRequest},
    purchase_failure_reason::PurchaseFailureReason,
    store_transaction::StoreTransaction,
};

/// Lifecycle of the session-wide catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogState {
    Idle,
    CatalogRequested,
    CatalogReady,
}

/// State of one purchase attempt. Each item id owns at most one of these at a
/// time; terminal states are kept until the next attempt for the item.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseState {
    PurchaseInitiated {
        intent: PurchaseIntent,
        attempt_id: u64,
    },
    AwaitingStoreConfirmation {
        intent: PurchaseIntent,
        attempt_id: u64,
    },
    AwaitingBackendConfirmation {
        transaction: StoreTransaction,
        request: PurchaseRequest,
        retries: u32,
    },
    PurchaseSucceeded {
        item_id: String,
        order_id: String,
    },
    PurchaseFailed {
        item_id: String,
        reason: PurchaseFailureReason,
    },
}

impl PurchaseState {
    pub fn kind(&self) -> PurchaseStateKind {
        match self {
            PurchaseState::PurchaseInitiated { .. } => PurchaseStateKind::PurchaseInitiated,
            PurchaseState::AwaitingStoreConfirmation { .. } => {
                PurchaseStateKind::AwaitingStoreConfirmation
            }
            PurchaseState::AwaitingBackendConfirmation { .. } => {
                PurchaseStateKind::AwaitingBackendConfirmation
            }
            PurchaseState::PurchaseSucceeded { .. } => PurchaseStateKind::PurchaseSucceeded,
            PurchaseState::PurchaseFailed { .. } => PurchaseStateKind::PurchaseFailed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Whether a cancellation may still stop this attempt. Once the backend
    /// has been contacted the attempt must resolve on its own.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            PurchaseState::PurchaseInitiated { .. }
                | PurchaseState::AwaitingStoreConfirmation { .. }
        )
    }

    /// Id of the store payment this attempt is waiting on, while it still
    /// waits on one.
    pub fn attempt_id(&self) -> Option<u64> {
        match self {
            PurchaseState::PurchaseInitiated { attempt_id, .. }
            | PurchaseState::AwaitingStoreConfirmation { attempt_id, .. } => Some(*attempt_id),
            _ => None,
        }
    }
}

/// Payload-free view of [`PurchaseState`], used for tracing and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseStateKind {
    PurchaseInitiated,
    AwaitingStoreConfirmation,
    AwaitingBackendConfirmation,
    PurchaseSucceeded,
    PurchaseFailed,
}

impl PurchaseStateKind {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseStateKind::PurchaseSucceeded | PurchaseStateKind::PurchaseFailed
        )
    }
}
