use async_trait::async_trait;

use crate::{
    domain::entities::{
        product::Product, purchase::PaymentRequest, store_transaction::StoreTransaction,
    },
    errors::StoreError,
};

/// Platform store capability. Every variant honours the same contract: a
/// paid transaction stays in the unfinished queue until
/// [`confirm_transaction`](StoreDatasource::confirm_transaction) succeeds, and
/// is returned by
/// [`unfinished_transactions`](StoreDatasource::unfinished_transactions) until
/// then, across restarts.
#[async_trait]
pub(crate) trait StoreDatasource: Send + Sync {
    /// Products the store knows for the given SKUs. Unknown SKUs are left out.
    async fn request_catalog(&self, item_ids: &[String]) -> Result<Vec<Product>, StoreError>;

    /// Shows the platform payment sheet (or equivalent) and waits for it.
    async fn add_payment(&self, request: &PaymentRequest) -> Result<StoreTransaction, StoreError>;

    async fn confirm_transaction(&self, transaction: &StoreTransaction) -> Result<(), StoreError>;

    async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError>;
}
