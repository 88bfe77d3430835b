use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A payment taken by a platform store.
///
/// Until the store is told to confirm it, the transaction stays in the
/// platform's unfinished queue and is delivered again on the next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTransaction {
    /// The platform's identifier for this payment (App Store transaction id,
    /// Google Play order id, ...).
    pub transaction_id: String,
    pub item_id: String,
    /// Opaque proof of payment, forwarded to the backend for verification.
    pub receipt: String,
    pub purchase_time: DateTime<Utc>,
}
