use serde::{Deserialize, Serialize};

/// Purchase record submitted to the game backend once the platform store has
/// taken payment.
///
/// `order_id` is the store transaction id of the payment being recorded. It
/// stays the same across retries and across process restarts, which is what
/// the backend keys its idempotency on (together with `item_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub provider_id: String,
    pub access_token: String,
    pub on_sale_id: String,
    pub receipt: String,
    pub server_id: String,
    pub character_id: String,
    pub order_id: String,
    pub item_id: String,
    pub order_details: String,
    pub game_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub success: bool,
    pub error_message: String,
    pub order_id: String,
}

/// What the caller supplies when asking to buy an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseIntent {
    pub item_id: String,
    #[serde(default)]
    pub character_id: String,
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub on_sale_id: String,
}

/// Payment request handed to the platform store.
///
/// `attempt_id` identifies the purchase attempt that issued the request; the
/// store completion for it carries the same id back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub item_id: String,
    pub on_sale_id: String,
    #[serde(default)]
    pub attempt_id: u64,
}
