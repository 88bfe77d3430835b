use serde::{Deserialize, Serialize};

use crate::errors::{BackendError, StoreError};

use super::{
    product::CatalogResult, purchase::PurchaseIntent,
    purchase_failure_reason::PurchaseFailureReason, store_transaction::StoreTransaction,
};

/// Every message that travels over the event bus.
///
/// Serialized form is `{"name": "iap.…", "payload": {…}}`, which is what a
/// host bridge exchanges with the native side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum IapEvent {
    // Requests coming from the client.
    // ----------------------------
    #[serde(rename = "iap.init")]
    Init(InitPayload),
    #[serde(rename = "iap.logout")]
    Logout,
    #[serde(rename = "iap.catalog.requested")]
    CatalogRequested {
        #[serde(rename = "gameId")]
        game_id: String,
    },
    #[serde(rename = "iap.purchase.requested")]
    PurchaseRequested(PurchaseIntent),
    #[serde(rename = "iap.purchase.cancelled")]
    PurchaseCancelled {
        #[serde(rename = "itemId")]
        item_id: String,
    },

    // Completions from the store and the backend. `attempt_id` ties a store
    // completion to the payment request that produced it; replayed
    // transactions carry none.
    // ----------------------------
    #[serde(rename = "iap.backend.catalogReceived")]
    BackendCatalogReceived(CatalogResult),
    #[serde(rename = "iap.store.catalogReceived")]
    StoreCatalogReceived(CatalogResult),
    #[serde(rename = "iap.store.paymentSucceeded")]
    StorePaymentSucceeded {
        #[serde(rename = "attemptId", default)]
        attempt_id: Option<u64>,
        transaction: StoreTransaction,
    },
    #[serde(rename = "iap.store.paymentFailed")]
    StorePaymentFailed {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "attemptId")]
        attempt_id: u64,
        reason: StoreError,
    },
    #[serde(rename = "iap.store.paymentCancelled")]
    StorePaymentCancelled {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "attemptId")]
        attempt_id: u64,
    },
    #[serde(rename = "iap.store.transactionFinished")]
    StoreTransactionFinished {
        #[serde(rename = "transactionId")]
        transaction_id: String,
    },
    #[serde(rename = "iap.backend.confirmed")]
    BackendConfirmed {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "orderId")]
        order_id: String,
    },
    #[serde(rename = "iap.backend.rejected")]
    BackendRejected {
        #[serde(rename = "itemId")]
        item_id: String,
        error: BackendError,
    },

    // Results published to the client.
    // ----------------------------
    #[serde(rename = "iap.catalog.ready")]
    CatalogReady(CatalogResult),
    #[serde(rename = "iap.purchase.succeeded")]
    PurchaseSucceeded {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "orderId")]
        order_id: String,
    },
    #[serde(rename = "iap.purchase.failed")]
    PurchaseFailed {
        #[serde(rename = "itemId")]
        item_id: String,
        reason: PurchaseFailureReason,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub game_id: String,
    pub provider_id: String,
    pub access_token: String,
    pub payment_id: String,
    /// Host-assigned free-play id, zero when the host has none.
    #[serde(default)]
    pub free_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IapEventName {
    Init,
    Logout,
    CatalogRequested,
    PurchaseRequested,
    PurchaseCancelled,
    BackendCatalogReceived,
    StoreCatalogReceived,
    StorePaymentSucceeded,
    StorePaymentFailed,
    StorePaymentCancelled,
    StoreTransactionFinished,
    BackendConfirmed,
    BackendRejected,
    CatalogReady,
    PurchaseSucceeded,
    PurchaseFailed,
}

impl IapEventName {
    /// Events the state machine consumes.
    pub const INPUTS: [IapEventName; 13] = [
        IapEventName::Init,
        IapEventName::Logout,
        IapEventName::CatalogRequested,
        IapEventName::PurchaseRequested,
        IapEventName::PurchaseCancelled,
        IapEventName::BackendCatalogReceived,
        IapEventName::StoreCatalogReceived,
        IapEventName::StorePaymentSucceeded,
        IapEventName::StorePaymentFailed,
        IapEventName::StorePaymentCancelled,
        IapEventName::StoreTransactionFinished,
        IapEventName::BackendConfirmed,
        IapEventName::BackendRejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IapEventName::Init => "iap.init",
            IapEventName::Logout => "iap.logout",
            IapEventName::CatalogRequested => "iap.catalog.requested",
            IapEventName::PurchaseRequested => "iap.purchase.requested",
            IapEventName::PurchaseCancelled => "iap.purchase.cancelled",
            IapEventName::BackendCatalogReceived => "iap.backend.catalogReceived",
            IapEventName::StoreCatalogReceived => "iap.store.catalogReceived",
            IapEventName::StorePaymentSucceeded => "iap.store.paymentSucceeded",
            IapEventName::StorePaymentFailed => "iap.store.paymentFailed",
            IapEventName::StorePaymentCancelled => "iap.store.paymentCancelled",
            IapEventName::StoreTransactionFinished => "iap.store.transactionFinished",
            IapEventName::BackendConfirmed => "iap.backend.confirmed",
            IapEventName::BackendRejected => "iap.backend.rejected",
            IapEventName::CatalogReady => "iap.catalog.ready",
            IapEventName::PurchaseSucceeded => "iap.purchase.succeeded",
            IapEventName::PurchaseFailed => "iap.purchase.failed",
        }
    }
}

impl std::fmt::Display for IapEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IapEvent {
    pub fn name(&self) -> IapEventName {
        match self {
            IapEvent::Init(_) => IapEventName::Init,
            IapEvent::Logout => IapEventName::Logout,
            IapEvent::CatalogRequested { .. } => IapEventName::CatalogRequested,
            IapEvent::PurchaseRequested(_) => IapEventName::PurchaseRequested,
            IapEvent::PurchaseCancelled { .. } => IapEventName::PurchaseCancelled,
            IapEvent::BackendCatalogReceived(_) => IapEventName::BackendCatalogReceived,
            IapEvent::StoreCatalogReceived(_) => IapEventName::StoreCatalogReceived,
            IapEvent::StorePaymentSucceeded { .. } => IapEventName::StorePaymentSucceeded,
            IapEvent::StorePaymentFailed { .. } => IapEventName::StorePaymentFailed,
            IapEvent::StorePaymentCancelled { .. } => IapEventName::StorePaymentCancelled,
            IapEvent::StoreTransactionFinished { .. } => IapEventName::StoreTransactionFinished,
            IapEvent::BackendConfirmed { .. } => IapEventName::BackendConfirmed,
            IapEvent::BackendRejected { .. } => IapEventName::BackendRejected,
            IapEvent::CatalogReady(_) => IapEventName::CatalogReady,
            IapEvent::PurchaseSucceeded { .. } => IapEventName::PurchaseSucceeded,
            IapEvent::PurchaseFailed { .. } => IapEventName::PurchaseFailed,
        }
    }

    /// The item the event concerns, if it is purchase scoped.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            IapEvent::PurchaseRequested(intent) => Some(&intent.item_id),
            IapEvent::StorePaymentSucceeded { transaction, .. } => Some(&transaction.item_id),
            IapEvent::PurchaseCancelled { item_id }
            | IapEvent::StorePaymentFailed { item_id, .. }
            | IapEvent::StorePaymentCancelled { item_id, .. }
            | IapEvent::BackendConfirmed { item_id, .. }
            | IapEvent::BackendRejected { item_id, .. }
            | IapEvent::PurchaseSucceeded { item_id, .. }
            | IapEvent::PurchaseFailed { item_id, .. } => Some(item_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_name_matches_event_name() {
        let event = IapEvent::PurchaseSucceeded {
            item_id: "gbomb005".to_string(),
            order_id: "ord-42".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], event.name().as_str());
        assert_eq!(json["payload"]["itemId"], "gbomb005");
        assert_eq!(json["payload"]["orderId"], "ord-42");
    }

    #[test]
    fn parses_purchase_request_from_host_json() {
        let event: IapEvent = serde_json::from_str(
            r#"{"name":"iap.purchase.requested","payload":{"itemId":"gbomb005","onSaleId":"s1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            IapEvent::PurchaseRequested(PurchaseIntent {
                item_id: "gbomb005".to_string(),
                on_sale_id: "s1".to_string(),
                ..Default::default()
            })
        );
        assert_eq!(event.item_id(), Some("gbomb005"));
    }

    #[test]
    fn failure_reason_keeps_cancellation_distinguishable() {
        let event = IapEvent::PurchaseFailed {
            item_id: "a".to_string(),
            reason: PurchaseFailureReason::UserCancelled,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: IapEvent = serde_json::from_str(&json).unwrap();
        let IapEvent::PurchaseFailed { reason, .. } = back else {
            panic!("unexpected event {back:?}");
        };
        assert!(reason.is_user_cancellation());
    }

    #[test]
    fn replayed_payment_parses_without_attempt_id() {
        let event: IapEvent = serde_json::from_str(
            r#"{"name":"iap.store.paymentSucceeded","payload":{"transaction":{
                "transactionId":"t1","itemId":"gbomb005","receipt":"9cf1b",
                "purchaseTime":"2024-01-01T00:00:00Z"}}}"#,
        )
        .unwrap();
        let IapEvent::StorePaymentSucceeded { attempt_id, .. } = &event else {
            panic!("unexpected event {event:?}");
        };
        assert_eq!(*attempt_id, None);
        assert_eq!(event.item_id(), Some("gbomb005"));
    }
}
