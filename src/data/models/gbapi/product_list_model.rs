use serde::Serialize;

use super::common::Protocol;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ProductListModel {
    pub(crate) protocol: Protocol,
    #[serde(rename = "PaymentID")]
    pub(crate) payment_id: String,
    pub(crate) game_id: String,
}

impl ProductListModel {
    pub(crate) fn new(game_id: &str, payment_id: &str) -> Self {
        Self {
            protocol: Protocol::ProductList,
            payment_id: payment_id.to_owned(),
            game_id: game_id.to_owned(),
        }
    }
}
