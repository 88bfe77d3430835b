use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::domain::entities::iap_event::{IapEvent, IapEventName};

type Handler = Arc<dyn Fn(&IapEvent) + Send + Sync>;

/// Typed publish / subscribe bus connecting the state machine, the store, the
/// backend and the client.
///
/// Handlers run synchronously on the publishing thread and must not block;
/// anything slow belongs on a channel the handler feeds.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<IapEventName, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, name: IapEventName, handler: F)
    where
        F: Fn(&IapEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Subscribes one handler to several event names.
    pub fn subscribe_many<F>(&self, names: &[IapEventName], handler: F)
    where
        F: Fn(&IapEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for name in names {
            handlers.entry(*name).or_default().push(handler.clone());
        }
    }

    pub fn publish(&self, event: IapEvent) {
        // Handlers are cloned out so they may publish or subscribe themselves.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.name())
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::trace!(event = %event.name(), "no subscribers");
        }
        for handler in handlers {
            handler(&event);
        }
    }
}
