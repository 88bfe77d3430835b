use serde::Deserialize;

use super::common::Protocol;

/// Session hand-over from the host application.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InitModel {
    pub(crate) protocol: Protocol,
    #[serde(rename = "PaymentID", default)]
    pub(crate) payment_id: String,
    #[serde(rename = "ProviderID")]
    pub(crate) provider_id: String,
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) game_id: String,
    #[serde(rename = "FreeID", default)]
    pub(crate) free_id: i32,
    /// Present in older hosts, unused.
    #[serde(rename = "ClientID", default)]
    pub(crate) _client_id: Option<String>,
}
