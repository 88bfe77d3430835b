use serde::Deserialize;

use super::common::Protocol;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PurchaseResponseModel {
    pub(crate) protocol: Protocol,
    /// 1 on success, 0 otherwise.
    pub(crate) success: i32,
    #[serde(default)]
    pub(crate) error_msg: String,
    #[serde(rename = "OrderID", default)]
    pub(crate) order_id: String,
}
