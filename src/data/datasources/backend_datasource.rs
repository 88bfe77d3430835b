use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    data::models::gbapi::{
        common::Protocol, product_list_model::ProductListModel,
        product_list_response_model::ProductListResponseModel, purchase_model::PurchaseModel,
        purchase_response_model::PurchaseResponseModel,
    },
    errors::BackendError,
};

/// Game backend capability. Stateless per call.
#[async_trait]
pub(crate) trait BackendDatasource: Send + Sync {
    /// Product list (6001 -> 6002).
    ///
    /// game_id:
    ///   The game whose catalog is requested.
    /// payment_id:
    ///   Payment channel the catalog is priced for.
    async fn fetch_catalog(
        &self,
        game_id: &str,
        payment_id: &str,
    ) -> Result<ProductListResponseModel, BackendError>;

    /// Purchase (6003 -> 6004).
    ///
    /// The backend deduplicates on `OrderId` + `ItemId`; retries of one
    /// logical purchase must resend the same order id.
    async fn submit_purchase(
        &self,
        purchase: &PurchaseModel,
    ) -> Result<PurchaseResponseModel, BackendError>;
}

pub struct GbApiBackendDatasourceImpl {
    client: reqwest::Client,
    base_url: String,
}

#[async_trait]
impl BackendDatasource for GbApiBackendDatasourceImpl {
    async fn fetch_catalog(
        &self,
        game_id: &str,
        payment_id: &str,
    ) -> Result<ProductListResponseModel, BackendError> {
        let url = format!("{}/iap/products", self.base_url);
        let response: ProductListResponseModel = self
            .callout(&url, &ProductListModel::new(game_id, payment_id), "ProductList")
            .await?;
        expect_protocol(response.protocol, Protocol::ProductListResponse)?;
        Ok(response)
    }

    async fn submit_purchase(
        &self,
        purchase: &PurchaseModel,
    ) -> Result<PurchaseResponseModel, BackendError> {
        let url = format!("{}/iap/purchase", self.base_url);
        let response: PurchaseResponseModel = self.callout(&url, purchase, "Purchase").await?;
        expect_protocol(response.protocol, Protocol::PurchaseResponse)?;
        Ok(response)
    }
}

impl GbApiBackendDatasourceImpl {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::NetworkTimeout(format!("client could not be built: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn callout<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        function_name: &str,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::NetworkTimeout(format!("{function_name}; {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = format!(
                "{function_name}; {}",
                response.text().await.unwrap_or_default()
            );
            return Err(if status.is_server_error() {
                BackendError::Http5xx {
                    status: status.as_u16(),
                    body,
                }
            } else {
                BackendError::Http4xx {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| BackendError::NetworkTimeout(format!("{function_name}; {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedResponse(format!("{function_name}; {e}")))
    }
}

fn expect_protocol(actual: Protocol, expected: Protocol) -> Result<(), BackendError> {
    if actual != expected {
        return Err(BackendError::MalformedResponse(format!(
            "expected protocol {:?}, got {:?}",
            expected, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn purchase() -> PurchaseModel {
        PurchaseModel {
            protocol: Protocol::Purchase,
            provider_id: "p1".to_string(),
            access_token: "tok".to_string(),
            on_sale_id: "s1".to_string(),
            receipt: "9cf1b".to_string(),
            server_id: String::new(),
            character_id: "Steve Jobs".to_string(),
            order_id: "t1".to_string(),
            item_id: "gbomb005".to_string(),
            order_details: String::new(),
            game_id: "g1".to_string(),
        }
    }

    async fn datasource(server: &MockServer) -> GbApiBackendDatasourceImpl {
        GbApiBackendDatasourceImpl::new(&format!("{}/", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn fetch_catalog_sends_product_list_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/iap/products"))
            .and(body_partial_json(json!({
                "Protocol": 6001,
                "GameId": "g1",
                "PaymentID": "pay"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Protocol": 6002,
                "Success": 1,
                "ErrorMsg": "",
                "Products": [{
                    "Title": "5 Bombs",
                    "ImageUrl": "",
                    "ItemId": "gbomb005",
                    "Description": "",
                    "CurrencyCode": "USD",
                    "OnSaleId": "s1",
                    "Price": 5.0
                }]
            })))
            .mount(&server)
            .await;

        let response = datasource(&server)
            .await
            .fetch_catalog("g1", "pay")
            .await
            .unwrap();
        assert_eq!(response.success, 1);
        assert_eq!(response.products.len(), 1);
        assert_eq!(response.products[0].item_id, "gbomb005");
    }

    #[tokio::test]
    async fn submit_purchase_reads_order_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/iap/purchase"))
            .and(body_partial_json(json!({
                "Protocol": 6003,
                "OrderId": "t1",
                "ItemId": "gbomb005"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Protocol": 6004,
                "Success": 1,
                "OrderID": "ord-42"
            })))
            .mount(&server)
            .await;

        let response = datasource(&server)
            .await
            .submit_purchase(&purchase())
            .await
            .unwrap();
        assert_eq!(response.order_id, "ord-42");
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = datasource(&server)
            .await
            .submit_purchase(&purchase())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Http5xx { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn client_errors_are_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = datasource(&server)
            .await
            .fetch_catalog("g1", "pay")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Http4xx { status: 401, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn wrong_protocol_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Protocol": 6002,
                "Success": 1
            })))
            .mount(&server)
            .await;

        let err = datasource(&server)
            .await
            .submit_purchase(&purchase())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unparseable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = datasource(&server)
            .await
            .fetch_catalog("g1", "pay")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }
}
