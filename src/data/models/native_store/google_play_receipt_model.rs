use serde::{Deserialize, Serialize};

/// Receipt forwarded to the backend for Google Play purchases. The backend
/// verifies it against the Play Developer API using the token.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GooglePlayReceiptModel {
    pub(crate) order_id: String,
    pub(crate) product_id: String,
    pub(crate) purchase_token: String,
    pub(crate) purchase_time: i64,
}
