use std::collections::HashMap;

use super::{iap_event::InitPayload, product::Product};

/// Session-scoped purchase state.
///
/// Owned by the state machine, which is the only writer. Everyone else gets
/// owned snapshots.
#[derive(Debug, Clone, Default)]
pub struct IapSession {
    pub access_token: String,
    pub payment_id: String,
    pub provider_id: String,
    pub game_id: String,
    pub free_id: i32,
    catalog: HashMap<String, Product>,
}

impl IapSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the credentials from an init message. The cached catalog is
    /// kept.
    pub fn initialize(&mut self, payload: InitPayload) {
        self.game_id = payload.game_id;
        self.provider_id = payload.provider_id;
        self.access_token = payload.access_token;
        self.payment_id = payload.payment_id;
        self.free_id = payload.free_id;
    }

    /// Both credentials must be present before anything purchase related is
    /// dispatched.
    pub fn has_credentials(&self) -> bool {
        !self.access_token.is_empty() && !self.provider_id.is_empty()
    }

    /// Replaces the cached catalog. Entries are keyed by item id; when the
    /// given list holds duplicates the earlier entry wins.
    pub fn replace_catalog(&mut self, products: &[Product]) {
        let mut catalog = HashMap::with_capacity(products.len());
        for p in products {
            catalog
                .entry(p.item_id.clone())
                .or_insert_with(|| p.clone());
        }
        self.catalog = catalog;
    }

    pub fn product(&self, item_id: &str) -> Option<&Product> {
        self.catalog.get(item_id)
    }

    pub fn catalog_snapshot(&self) -> HashMap<String, Product> {
        self.catalog.clone()
    }

    /// Drops credentials and cached catalog, e.g. on logout.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
