use serde::Deserialize;

use super::common::Protocol;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ProductListResponseModel {
    pub(crate) protocol: Protocol,
    /// 1 on success, 0 otherwise.
    pub(crate) success: i32,
    #[serde(default)]
    pub(crate) error_msg: String,
    #[serde(default)]
    pub(crate) products: Vec<ProductModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ProductModel {
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) image_url: String,
    pub(crate) item_id: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) currency_code: String,
    #[serde(default)]
    pub(crate) on_sale_id: String,
    pub(crate) price: f64,
}
