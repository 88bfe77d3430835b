use async_trait::async_trait;

use crate::{
    domain::entities::{
        product::Product,
        purchase::{PaymentRequest, PurchaseRequest, PurchaseResponse},
        store_transaction::StoreTransaction,
    },
    errors::{BackendError, StoreError},
};

#[async_trait]
pub trait IapRepository: Send + Sync {
    /// Catalog as listed by the game backend for this game / payment channel.
    async fn fetch_backend_catalog(
        &self,
        game_id: &str,
        payment_id: &str,
    ) -> Result<Vec<Product>, BackendError>;

    /// Catalog as known to the platform store, restricted to the given SKUs.
    async fn fetch_store_catalog(&self, item_ids: &[String]) -> Result<Vec<Product>, StoreError>;

    /// Starts a platform payment. May wait on user interaction.
    async fn add_payment(&self, request: &PaymentRequest) -> Result<StoreTransaction, StoreError>;

    /// Finalizes a transaction with the platform store, removing it from the
    /// unfinished queue.
    async fn confirm_transaction(&self, transaction: &StoreTransaction) -> Result<(), StoreError>;

    /// Transactions paid for but never confirmed, e.g. left over from a
    /// previous run.
    async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError>;

    /// Records the purchase with the game backend. Submitting the same
    /// `(order_id, item_id)` twice must not grant twice.
    async fn submit_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> Result<PurchaseResponse, BackendError>;
}
