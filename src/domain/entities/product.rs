use serde::{Deserialize, Serialize};

/// A purchasable item as exposed to the client. Identity is `item_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub title: String,
    pub image_url: String,
    pub item_id: String,
    pub description: String,
    pub currency_code: String,
    /// Backend-side sale listing the item is sold under. Products that only
    /// come from the platform store have this empty.
    pub on_sale_id: String,
    pub price: f64,
}

/// Outcome of a single catalog fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResult {
    pub success: bool,
    pub error_message: String,
    pub products: Vec<Product>,
}

impl CatalogResult {
    pub fn ok(products: Vec<Product>) -> Self {
        Self {
            success: true,
            error_message: String::new(),
            products,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
            products: Vec::new(),
        }
    }
}
