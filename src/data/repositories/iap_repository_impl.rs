use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{IapConfig, StorePlatform},
    data::{
        datasources::{
            backend_datasource::{BackendDatasource, GbApiBackendDatasourceImpl},
            local_store_datasource::LocalStoreDatasourceImpl,
            native_store_datasource::{NativeStoreBridge, NativeStoreDatasourceImpl},
            store_datasource::StoreDatasource,
        },
        models::gbapi::{
            common::Protocol, product_list_response_model as pl, purchase_model::PurchaseModel,
            purchase_response_model::PurchaseResponseModel,
        },
    },
    domain::{
        entities::{
            product::Product,
            purchase::{PaymentRequest, PurchaseRequest, PurchaseResponse},
            store_transaction::StoreTransaction,
        },
        repositories::iap_repository::IapRepository,
    },
    errors::{BackendError, IapError, StoreError},
};

pub struct IapRepositoryImpl<B: BackendDatasource> {
    store_datasource: Box<dyn StoreDatasource>,
    backend_datasource: B,
}

#[async_trait]
impl<B: BackendDatasource> IapRepository for IapRepositoryImpl<B> {
    async fn fetch_backend_catalog(
        &self,
        game_id: &str,
        payment_id: &str,
    ) -> Result<Vec<Product>, BackendError> {
        let response = self
            .backend_datasource
            .fetch_catalog(game_id, payment_id)
            .await?;
        if response.success == 0 {
            return Err(BackendError::Rejected(if response.error_msg.is_empty() {
                "product list request failed".to_string()
            } else {
                response.error_msg
            }));
        }
        Ok(response
            .products
            .into_iter()
            .map(Product::from_backend_product)
            .collect())
    }

    async fn fetch_store_catalog(&self, item_ids: &[String]) -> Result<Vec<Product>, StoreError> {
        self.store_datasource.request_catalog(item_ids).await
    }

    async fn add_payment(&self, request: &PaymentRequest) -> Result<StoreTransaction, StoreError> {
        self.store_datasource.add_payment(request).await
    }

    async fn confirm_transaction(&self, transaction: &StoreTransaction) -> Result<(), StoreError> {
        self.store_datasource.confirm_transaction(transaction).await
    }

    async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError> {
        self.store_datasource.unfinished_transactions().await
    }

    async fn submit_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> Result<PurchaseResponse, BackendError> {
        let response = self
            .backend_datasource
            .submit_purchase(&PurchaseModel::from_request(request))
            .await?;
        PurchaseResponse::from_backend_response(response)
    }
}

impl IapRepositoryImpl<GbApiBackendDatasourceImpl> {
    /// Builds the store variant named by `config.store_platform`. Native
    /// platforms need the host's billing bridge.
    pub(crate) async fn new(
        config: &IapConfig,
        bridge: Option<Arc<dyn NativeStoreBridge>>,
    ) -> Result<Self, IapError> {
        let store_datasource: Box<dyn StoreDatasource> = match (config.store_platform, bridge) {
            (StorePlatform::Generic, _) => Box::new(
                LocalStoreDatasourceImpl::new(
                    config.store_item_ids.clone(),
                    config.ledger_path.clone(),
                )
                .await?,
            ),
            (platform, Some(bridge)) => Box::new(NativeStoreDatasourceImpl::new(platform, bridge)?),
            (platform, None) => {
                return Err(StoreError::PlatformNotSupported(format!(
                    "{platform:?} requires a native store bridge"
                ))
                .into())
            }
        };
        Ok(Self {
            store_datasource,
            backend_datasource: GbApiBackendDatasourceImpl::new(
                &config.backend_base_url,
                config.backend_timeout,
            )?,
        })
    }
}

impl Product {
    fn from_backend_product(m: pl::ProductModel) -> Self {
        Product {
            title: m.title,
            image_url: m.image_url,
            item_id: m.item_id,
            description: m.description,
            currency_code: m.currency_code,
            on_sale_id: m.on_sale_id,
            price: m.price,
        }
    }
}

impl PurchaseModel {
    fn from_request(r: &PurchaseRequest) -> Self {
        PurchaseModel {
            protocol: Protocol::Purchase,
            provider_id: r.provider_id.clone(),
            access_token: r.access_token.clone(),
            on_sale_id: r.on_sale_id.clone(),
            receipt: r.receipt.clone(),
            server_id: r.server_id.clone(),
            character_id: r.character_id.clone(),
            order_id: r.order_id.clone(),
            item_id: r.item_id.clone(),
            order_details: r.order_details.clone(),
            game_id: r.game_id.clone(),
        }
    }
}

impl PurchaseResponse {
    /// An explicit `Success: 0` is a denial, not a transport failure.
    fn from_backend_response(m: PurchaseResponseModel) -> Result<Self, BackendError> {
        if m.success == 0 {
            return Err(BackendError::Rejected(if m.error_msg.is_empty() {
                "purchase was not accepted".to_string()
            } else {
                m.error_msg
            }));
        }
        Ok(PurchaseResponse {
            success: true,
            error_message: m.error_msg,
            order_id: m.order_id,
        })
    }
}
