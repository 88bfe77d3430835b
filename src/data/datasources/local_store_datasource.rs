use std::path::PathBuf;

use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine as _};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    data::{
        datasources::store_datasource::StoreDatasource, models::local_store::ledger_model::LedgerModel,
    },
    domain::entities::{
        product::Product, purchase::PaymentRequest, store_transaction::StoreTransaction,
    },
    errors::{LedgerError, StoreError},
};

/// Generic store variant for platforms without a billing SDK. Payments for
/// known SKUs are approved immediately; the unfinished queue is kept in a JSON
/// ledger so it survives restarts.
pub(crate) struct LocalStoreDatasourceImpl {
    item_ids: Vec<String>,
    ledger_path: Option<PathBuf>,
    ledger: Mutex<LedgerModel>,
}

#[async_trait]
impl StoreDatasource for LocalStoreDatasourceImpl {
    async fn request_catalog(&self, item_ids: &[String]) -> Result<Vec<Product>, StoreError> {
        Ok(item_ids
            .iter()
            .filter(|id| self.sells(id))
            .map(|id| Product {
                title: id.clone(),
                image_url: String::new(),
                item_id: id.clone(),
                description: String::new(),
                currency_code: String::new(),
                on_sale_id: String::new(),
                price: 0.0,
            })
            .collect())
    }

    async fn add_payment(&self, request: &PaymentRequest) -> Result<StoreTransaction, StoreError> {
        if !self.sells(&request.item_id) {
            return Err(StoreError::ProductUnavailable(request.item_id.clone()));
        }
        let mut ledger = self.ledger.lock().await;
        // Applied in memory only once the ledger file has been written.
        let mut next = ledger.clone();
        next.next_sequence += 1;
        let purchase_time = Utc::now();
        let transaction_id = format!(
            "local-{}-{}",
            purchase_time.timestamp_millis(),
            next.next_sequence
        );
        let receipt = BASE64_STANDARD.encode(
            serde_json::json!({
                "transactionId": transaction_id,
                "itemId": request.item_id,
                "purchaseTime": purchase_time.timestamp_millis(),
            })
            .to_string(),
        );
        let transaction = StoreTransaction {
            transaction_id,
            item_id: request.item_id.clone(),
            receipt,
            purchase_time,
        };
        next.unfinished.push(transaction.clone());
        self.persist(&next).await.map_err(ledger_unavailable)?;
        *ledger = next;
        Ok(transaction)
    }

    async fn confirm_transaction(&self, transaction: &StoreTransaction) -> Result<(), StoreError> {
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        next.unfinished
            .retain(|t| t.transaction_id != transaction.transaction_id);
        if next.unfinished.len() == ledger.unfinished.len() {
            tracing::debug!(
                transaction_id = %transaction.transaction_id,
                "transaction was already confirmed"
            );
            return Ok(());
        }
        self.persist(&next).await.map_err(ledger_unavailable)?;
        *ledger = next;
        Ok(())
    }

    async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError> {
        Ok(self.ledger.lock().await.unfinished.clone())
    }
}

impl LocalStoreDatasourceImpl {
    /// Opens the ledger at `ledger_path`, if any. A missing file is an empty
    /// ledger.
    pub(crate) async fn new(
        item_ids: Vec<String>,
        ledger_path: Option<PathBuf>,
    ) -> Result<Self, LedgerError> {
        let ledger = match &ledger_path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(json) => serde_json::from_str(&json)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerModel::default(),
                Err(e) => return Err(e.into()),
            },
            None => LedgerModel::default(),
        };
        Ok(Self {
            item_ids,
            ledger_path,
            ledger: Mutex::new(ledger),
        })
    }

    /// With no configured SKUs everything is for sale.
    fn sells(&self, item_id: &str) -> bool {
        self.item_ids.is_empty() || self.item_ids.iter().any(|id| id == item_id)
    }

    async fn persist(&self, ledger: &LedgerModel) -> Result<(), LedgerError> {
        let Some(path) = &self.ledger_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(ledger)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn ledger_unavailable(e: LedgerError) -> StoreError {
    StoreError::NetworkUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(item_id: &str) -> PaymentRequest {
        PaymentRequest {
            item_id: item_id.to_string(),
            on_sale_id: String::new(),
            attempt_id: 1,
        }
    }

    #[tokio::test]
    async fn unfinished_transactions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let store = LocalStoreDatasourceImpl::new(vec![], Some(path.clone()))
            .await
            .unwrap();
        let transaction = store.add_payment(&payment("gbomb005")).await.unwrap();
        drop(store);

        let reopened = LocalStoreDatasourceImpl::new(vec![], Some(path.clone()))
            .await
            .unwrap();
        assert_eq!(
            reopened.unfinished_transactions().await.unwrap(),
            vec![transaction.clone()]
        );
        reopened.confirm_transaction(&transaction).await.unwrap();
        drop(reopened);

        let reopened = LocalStoreDatasourceImpl::new(vec![], Some(path)).await.unwrap();
        assert!(reopened.unfinished_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transaction_ids_are_unique() {
        let store = LocalStoreDatasourceImpl::new(vec![], None).await.unwrap();
        let a = store.add_payment(&payment("a")).await.unwrap();
        let b = store.add_payment(&payment("a")).await.unwrap();
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(store.unfinished_transactions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_sku_is_unavailable() {
        let store = LocalStoreDatasourceImpl::new(vec!["gbomb005".to_string()], None)
            .await
            .unwrap();
        let err = store.add_payment(&payment("other")).await.unwrap_err();
        assert_eq!(err, StoreError::ProductUnavailable("other".to_string()));
        let catalog = store
            .request_catalog(&["gbomb005".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_ledger_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").unwrap();
        let result = LocalStoreDatasourceImpl::new(vec![], Some(path)).await;
        assert!(matches!(result, Err(LedgerError::Corrupt(_))));
    }

    #[tokio::test]
    async fn failed_ledger_write_leaves_queue_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("ledger.json");
        let store = LocalStoreDatasourceImpl::new(vec![], Some(path)).await.unwrap();
        let err = store.add_payment(&payment("gbomb005")).await.unwrap_err();
        assert!(matches!(err, StoreError::NetworkUnavailable(_)));
        assert!(store.unfinished_transactions().await.unwrap().is_empty());
        assert_eq!(store.ledger.lock().await.next_sequence, 0);
    }

    #[tokio::test]
    async fn failed_confirmation_write_keeps_transaction_unfinished() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_dir = dir.path().join("ledger");
        std::fs::create_dir(&ledger_dir).unwrap();
        let store = LocalStoreDatasourceImpl::new(vec![], Some(ledger_dir.join("ledger.json")))
            .await
            .unwrap();
        let transaction = store.add_payment(&payment("gbomb005")).await.unwrap();
        std::fs::remove_dir_all(&ledger_dir).unwrap();
        assert!(store.confirm_transaction(&transaction).await.is_err());
        assert_eq!(
            store.unfinished_transactions().await.unwrap(),
            vec![transaction]
        );
    }
}
