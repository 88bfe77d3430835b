use serde::Serialize;

use super::common::Protocol;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PurchaseModel {
    pub(crate) protocol: Protocol,
    pub(crate) provider_id: String,
    pub(crate) access_token: String,
    pub(crate) on_sale_id: String,
    pub(crate) receipt: String,
    pub(crate) server_id: String,
    pub(crate) character_id: String,
    pub(crate) order_id: String,
    pub(crate) item_id: String,
    pub(crate) order_details: String,
    pub(crate) game_id: String,
}
