use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purchase as reported by the platform store SDK. Which of the receipt
/// fields are set depends on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePurchaseModel {
    /// App Store transaction identifier, Google Play order id, or Windows
    /// Store transaction GUID.
    pub transaction_id: String,
    pub sku: String,
    #[serde(with = "ts_milliseconds")]
    pub purchase_time: DateTime<Utc>,
    /// App Store: raw bytes of the app receipt.
    #[serde(default)]
    pub receipt_data: Vec<u8>,
    /// Google Play: token identifying the purchase for acknowledge / consume.
    #[serde(default)]
    pub purchase_token: Option<String>,
    /// Windows Store: signed receipt XML.
    #[serde(default)]
    pub receipt_xml: Option<String>,
}

/// How a purchase is finalized, so the platform drops it from its unfinished
/// queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationModel {
    /// App Store: `finishTransaction`.
    Finish { transaction_id: String },
    /// Google Play: `consumeAsync` with the purchase token.
    Consume { purchase_token: String },
    /// Windows Store: `ReportConsumableFulfillmentAsync`.
    ReportFulfillment { sku: String, transaction_id: String },
}
