use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine as _};
use tokio::sync::Mutex;

use crate::{
    config::StorePlatform,
    data::{
        datasources::store_datasource::StoreDatasource,
        models::native_store::{
            google_play_receipt_model::GooglePlayReceiptModel,
            native_product_model::NativeProductModel,
            native_purchase_model::{FinalizationModel, NativePurchaseModel},
        },
    },
    domain::entities::{
        product::Product, purchase::PaymentRequest, store_transaction::StoreTransaction,
    },
    errors::StoreError,
};

/// Glue the host application provides around the platform billing SDK
/// (StoreKit, Play Billing, Windows.ApplicationModel.Store).
///
/// Calls complete when the SDK reports back; `purchase` typically waits on the
/// user.
#[async_trait]
pub trait NativeStoreBridge: Send + Sync {
    async fn query_products(&self, skus: &[String]) -> Result<Vec<NativeProductModel>, StoreError>;

    async fn purchase(&self, sku: &str) -> Result<NativePurchaseModel, StoreError>;

    async fn finalize(&self, finalization: FinalizationModel) -> Result<(), StoreError>;

    /// Purchases the platform still holds as unfinished.
    async fn pending_purchases(&self) -> Result<Vec<NativePurchaseModel>, StoreError>;
}

/// Store variant backed by a platform billing SDK. Platforms differ only in
/// how the receipt is encoded and how a purchase is finalized.
pub(crate) struct NativeStoreDatasourceImpl {
    platform: StorePlatform,
    bridge: Arc<dyn NativeStoreBridge>,
    // Purchases seen this run, by transaction id, for finalization.
    purchases: Mutex<HashMap<String, NativePurchaseModel>>,
}

#[async_trait]
impl StoreDatasource for NativeStoreDatasourceImpl {
    async fn request_catalog(&self, item_ids: &[String]) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .bridge
            .query_products(item_ids)
            .await?
            .into_iter()
            .map(Product::from_native_product)
            .collect())
    }

    async fn add_payment(&self, request: &PaymentRequest) -> Result<StoreTransaction, StoreError> {
        let purchase = self.bridge.purchase(&request.item_id).await?;
        let transaction = self.to_transaction(&purchase)?;
        self.purchases
            .lock()
            .await
            .insert(purchase.transaction_id.clone(), purchase);
        Ok(transaction)
    }

    async fn confirm_transaction(&self, transaction: &StoreTransaction) -> Result<(), StoreError> {
        let known = self
            .purchases
            .lock()
            .await
            .get(&transaction.transaction_id)
            .cloned();
        let purchase = match known {
            Some(p) => p,
            None => self
                .bridge
                .pending_purchases()
                .await?
                .into_iter()
                .find(|p| p.transaction_id == transaction.transaction_id)
                .ok_or_else(|| {
                    StoreError::ProductUnavailable(format!(
                        "transaction {} is not pending",
                        transaction.transaction_id
                    ))
                })?,
        };
        self.bridge.finalize(self.finalization(&purchase)?).await?;
        self.purchases
            .lock()
            .await
            .remove(&transaction.transaction_id);
        Ok(())
    }

    async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError> {
        let pending = self.bridge.pending_purchases().await?;
        let mut transactions = Vec::with_capacity(pending.len());
        let mut purchases = self.purchases.lock().await;
        for purchase in pending {
            match self.to_transaction(&purchase) {
                Ok(t) => {
                    transactions.push(t);
                    purchases.insert(purchase.transaction_id.clone(), purchase);
                }
                Err(e) => tracing::warn!(
                    transaction_id = %purchase.transaction_id,
                    error = %e,
                    "skipping pending purchase without a usable receipt"
                ),
            }
        }
        Ok(transactions)
    }
}

impl NativeStoreDatasourceImpl {
    pub(crate) fn new(
        platform: StorePlatform,
        bridge: Arc<dyn NativeStoreBridge>,
    ) -> Result<Self, StoreError> {
        if platform == StorePlatform::Generic {
            return Err(StoreError::PlatformNotSupported(
                "generic store has no native bridge".to_string(),
            ));
        }
        Ok(Self {
            platform,
            bridge,
            purchases: Mutex::new(HashMap::new()),
        })
    }

    fn to_transaction(&self, p: &NativePurchaseModel) -> Result<StoreTransaction, StoreError> {
        Ok(StoreTransaction {
            transaction_id: p.transaction_id.clone(),
            item_id: p.sku.clone(),
            receipt: self.encode_receipt(p)?,
            purchase_time: p.purchase_time,
        })
    }

    fn encode_receipt(&self, p: &NativePurchaseModel) -> Result<String, StoreError> {
        let missing = |what: &str| {
            StoreError::PaymentDeclined(format!(
                "store returned no {what} for transaction {}",
                p.transaction_id
            ))
        };
        match self.platform {
            StorePlatform::AppStore => {
                if p.receipt_data.is_empty() {
                    return Err(missing("receipt data"));
                }
                Ok(BASE64_STANDARD.encode(&p.receipt_data))
            }
            StorePlatform::GooglePlay => {
                let token = p
                    .purchase_token
                    .clone()
                    .ok_or_else(|| missing("purchase token"))?;
                serde_json::to_string(&GooglePlayReceiptModel {
                    order_id: p.transaction_id.clone(),
                    product_id: p.sku.clone(),
                    purchase_token: token,
                    purchase_time: p.purchase_time.timestamp_millis(),
                })
                .map_err(|e| StoreError::PaymentDeclined(e.to_string()))
            }
            StorePlatform::WindowsStore => {
                p.receipt_xml.clone().ok_or_else(|| missing("receipt xml"))
            }
            StorePlatform::Generic => Err(StoreError::PlatformNotSupported(
                "generic store has no native receipts".to_string(),
            )),
        }
    }

    fn finalization(&self, p: &NativePurchaseModel) -> Result<FinalizationModel, StoreError> {
        match self.platform {
            StorePlatform::AppStore => Ok(FinalizationModel::Finish {
                transaction_id: p.transaction_id.clone(),
            }),
            StorePlatform::GooglePlay => Ok(FinalizationModel::Consume {
                purchase_token: p.purchase_token.clone().ok_or_else(|| {
                    StoreError::PaymentDeclined("purchase token missing".to_string())
                })?,
            }),
            StorePlatform::WindowsStore => Ok(FinalizationModel::ReportFulfillment {
                sku: p.sku.clone(),
                transaction_id: p.transaction_id.clone(),
            }),
            StorePlatform::Generic => Err(StoreError::PlatformNotSupported(
                "generic store has no native finalization".to_string(),
            )),
        }
    }
}

impl Product {
    fn from_native_product(m: NativeProductModel) -> Self {
        Product {
            title: m.title,
            image_url: String::new(),
            item_id: m.sku,
            description: m.description,
            currency_code: m.currency_code,
            on_sale_id: String::new(),
            price: m.price_micros as f64 / 1_000_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::{TimeZone, Utc};

    use super::*;

    #[derive(Default)]
    struct FakeBridge {
        pending: StdMutex<Vec<NativePurchaseModel>>,
        finalized: StdMutex<Vec<FinalizationModel>>,
    }

    #[async_trait]
    impl NativeStoreBridge for FakeBridge {
        async fn query_products(
            &self,
            skus: &[String],
        ) -> Result<Vec<NativeProductModel>, StoreError> {
            Ok(skus
                .iter()
                .map(|sku| NativeProductModel {
                    sku: sku.clone(),
                    title: "Bombs".to_string(),
                    description: String::new(),
                    price_micros: 4_990_000,
                    currency_code: "USD".to_string(),
                })
                .collect())
        }

        async fn purchase(&self, sku: &str) -> Result<NativePurchaseModel, StoreError> {
            let purchase = NativePurchaseModel {
                transaction_id: "GPA.1234".to_string(),
                sku: sku.to_string(),
                purchase_time: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
                receipt_data: b"receipt".to_vec(),
                purchase_token: Some("token-1".to_string()),
                receipt_xml: Some("<Receipt/>".to_string()),
            };
            self.pending.lock().unwrap().push(purchase.clone());
            Ok(purchase)
        }

        async fn finalize(&self, finalization: FinalizationModel) -> Result<(), StoreError> {
            self.finalized.lock().unwrap().push(finalization);
            self.pending.lock().unwrap().clear();
            Ok(())
        }

        async fn pending_purchases(&self) -> Result<Vec<NativePurchaseModel>, StoreError> {
            Ok(self.pending.lock().unwrap().clone())
        }
    }

    fn payment() -> PaymentRequest {
        PaymentRequest {
            item_id: "gbomb005".to_string(),
            on_sale_id: "s1".to_string(),
            attempt_id: 1,
        }
    }

    #[tokio::test]
    async fn app_store_receipt_is_base64() {
        let bridge = Arc::new(FakeBridge::default());
        let store = NativeStoreDatasourceImpl::new(StorePlatform::AppStore, bridge.clone()).unwrap();
        let transaction = store.add_payment(&payment()).await.unwrap();
        assert_eq!(transaction.receipt, BASE64_STANDARD.encode(b"receipt"));
        store.confirm_transaction(&transaction).await.unwrap();
        assert_eq!(
            *bridge.finalized.lock().unwrap(),
            vec![FinalizationModel::Finish {
                transaction_id: "GPA.1234".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn google_play_receipt_carries_purchase_token() {
        let bridge = Arc::new(FakeBridge::default());
        let store =
            NativeStoreDatasourceImpl::new(StorePlatform::GooglePlay, bridge.clone()).unwrap();
        let transaction = store.add_payment(&payment()).await.unwrap();
        let receipt: GooglePlayReceiptModel = serde_json::from_str(&transaction.receipt).unwrap();
        assert_eq!(receipt.purchase_token, "token-1");
        assert_eq!(receipt.product_id, "gbomb005");
        assert_eq!(receipt.purchase_time, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn confirm_after_restart_finds_pending_purchase() {
        let bridge = Arc::new(FakeBridge::default());
        let first = NativeStoreDatasourceImpl::new(StorePlatform::WindowsStore, bridge.clone())
            .unwrap();
        first.add_payment(&payment()).await.unwrap();

        let second =
            NativeStoreDatasourceImpl::new(StorePlatform::WindowsStore, bridge.clone()).unwrap();
        let pending = second.unfinished_transactions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].receipt, "<Receipt/>");
        second.confirm_transaction(&pending[0]).await.unwrap();
        assert!(matches!(
            bridge.finalized.lock().unwrap()[0],
            FinalizationModel::ReportFulfillment { .. }
        ));
        assert!(second.unfinished_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn catalog_prices_are_converted_from_micros() {
        let store =
            NativeStoreDatasourceImpl::new(StorePlatform::AppStore, Arc::new(FakeBridge::default()))
                .unwrap();
        let products = store
            .request_catalog(&["gbomb005".to_string()])
            .await
            .unwrap();
        assert_eq!(products[0].price, 4.99);
        assert!(products[0].on_sale_id.is_empty());
    }

    #[test]
    fn generic_platform_has_no_native_variant() {
        let result =
            NativeStoreDatasourceImpl::new(StorePlatform::Generic, Arc::new(FakeBridge::default()));
        assert!(matches!(result, Err(StoreError::PlatformNotSupported(_))));
    }
}
