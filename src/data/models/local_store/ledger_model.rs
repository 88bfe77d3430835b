use serde::{Deserialize, Serialize};

use crate::domain::entities::store_transaction::StoreTransaction;

/// On-disk unfinished-transaction queue of the generic store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LedgerModel {
    #[serde(default)]
    pub(crate) unfinished: Vec<StoreTransaction>,
    /// Monotonic counter used to mint transaction ids.
    #[serde(default)]
    pub(crate) next_sequence: u64,
}
