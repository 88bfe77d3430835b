use serde::{Deserialize, Serialize};

/// Product as described by the platform store SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeProductModel {
    pub sku: String,
    pub title: String,
    pub description: String,
    /// Localized price in micro-units of `currency_code` (1_000_000 = 1.00).
    pub price_micros: i64,
    pub currency_code: String,
}
