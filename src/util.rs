use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::IapConfig,
    data::{
        datasources::{
            backend_datasource::GbApiBackendDatasourceImpl,
            native_store_datasource::NativeStoreBridge,
        },
        models::gbapi::{common::Protocol, init_model::InitModel},
        repositories::iap_repository_impl::IapRepositoryImpl,
    },
    domain::{
        entities::{
            iap_event::{IapEvent, IapEventName, InitPayload},
            iap_session::IapSession,
            product::{CatalogResult, Product},
            purchase::PurchaseIntent,
            store_transaction::StoreTransaction,
        },
        purchase_state_machine::{Command, PurchaseStateMachine},
        repositories::{iap_repository::IapRepository, social_provider::SocialLoginProvider},
    },
    errors::{BackendError, IapError, StoreError},
    event_bus::EventBus,
};

/// Entry point for the host application.
///
/// Owns the purchase state machine on a single task: every input event is
/// applied in bus order, and store / backend calls run on their own tasks
/// whose completions come back over the bus.
pub struct IapUtil<R: IapRepository + 'static> {
    iap_repository: Arc<R>,
    bus: EventBus,
    catalog: watch::Receiver<HashMap<String, Product>>,
    event_loop: JoinHandle<()>,
}

impl<R: IapRepository + 'static> IapUtil<R> {
    /// Subscribes the state machine to the bus and replays any store
    /// transactions left unfinished by a previous run. Must be called from
    /// within a tokio runtime.
    pub async fn start(config: IapConfig, iap_repository: Arc<R>, bus: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe_many(&IapEventName::INPUTS, move |event| {
            if tx.send(event.clone()).is_err() {
                tracing::warn!(event = %event.name(), "purchase service stopped, event dropped");
            }
        });

        let (catalog_tx, catalog) = watch::channel(HashMap::new());
        let event_loop = EventLoop {
            machine: PurchaseStateMachine::new(IapSession::new(), &config),
            iap_repository: iap_repository.clone(),
            bus: bus.clone(),
            store_timeout: config.store_timeout,
            backend_timeout: config.backend_timeout,
            catalog_tx,
            payments: HashMap::new(),
        };
        let event_loop = tokio::spawn(event_loop.run(rx));

        let util = Self {
            iap_repository,
            bus,
            catalog,
            event_loop,
        };
        util.replay_unfinished().await;
        util
    }

    async fn replay_unfinished(&self) {
        match self.iap_repository.unfinished_transactions().await {
            Ok(transactions) => {
                if !transactions.is_empty() {
                    tracing::info!(
                        count = transactions.len(),
                        "replaying unfinished store transactions"
                    );
                }
                for transaction in transactions {
                    self.bus.publish(IapEvent::StorePaymentSucceeded {
                        attempt_id: None,
                        transaction,
                    });
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not list unfinished store transactions"),
        }
    }

    pub fn init(
        &self,
        game_id: &str,
        provider_id: &str,
        access_token: &str,
        payment_id: &str,
    ) -> Result<(), IapError> {
        self.init_with(InitPayload {
            game_id: game_id.to_owned(),
            provider_id: provider_id.to_owned(),
            access_token: access_token.to_owned(),
            payment_id: payment_id.to_owned(),
            free_id: 0,
        })
    }

    pub fn init_with(&self, payload: InitPayload) -> Result<(), IapError> {
        self.send(IapEvent::Init(payload))
    }

    /// Ends the session: credentials and the cached catalog are dropped, and
    /// purchases still waiting on the store fail. Purchases already at the
    /// backend finish normally.
    pub fn logout(&self) -> Result<(), IapError> {
        self.send(IapEvent::Logout)
    }

    /// Initializes from the host's init message (protocol 6000).
    pub fn init_from_json(&self, message: &str) -> Result<(), IapError> {
        let model: InitModel = serde_json::from_str(message)
            .map_err(|e| IapError::InvalidInitMessage(e.to_string()))?;
        if model.protocol != Protocol::Init {
            return Err(IapError::InvalidInitMessage(format!(
                "expected protocol {:?}, got {:?}",
                Protocol::Init,
                model.protocol
            )));
        }
        self.init_with(InitPayload {
            game_id: model.game_id,
            provider_id: model.provider_id,
            access_token: model.access_token,
            payment_id: model.payment_id,
            free_id: model.free_id,
        })
    }

    /// Logs in through the social provider and uses its token as the access
    /// token of the session.
    pub async fn init_with_social_login(
        &self,
        provider: &dyn SocialLoginProvider,
        game_id: &str,
        provider_id: &str,
        payment_id: &str,
    ) -> Result<(), IapError> {
        let login = provider.login().await;
        if login.code != 0 {
            tracing::warn!(code = login.code, "social login failed");
            return Err(IapError::SocialLogin { code: login.code });
        }
        self.init(game_id, provider_id, &login.token, payment_id)
    }

    /// An empty `game_id` reuses the session's.
    pub fn request_catalog(&self, game_id: &str) -> Result<(), IapError> {
        self.send(IapEvent::CatalogRequested {
            game_id: game_id.to_owned(),
        })
    }

    pub fn purchase(&self, intent: PurchaseIntent) -> Result<(), IapError> {
        self.send(IapEvent::PurchaseRequested(intent))
    }

    /// Honored only before the store has taken payment.
    pub fn cancel(&self, item_id: &str) -> Result<(), IapError> {
        self.send(IapEvent::PurchaseCancelled {
            item_id: item_id.to_owned(),
        })
    }

    /// Catalog as of the last successful fetch.
    pub fn catalog_snapshot(&self) -> HashMap<String, Product> {
        self.catalog.borrow().clone()
    }

    pub fn subscribe<F>(&self, name: IapEventName, handler: F)
    where
        F: Fn(&IapEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(name, handler);
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, IapError> {
        Ok(self.iap_repository.unfinished_transactions().await?)
    }

    fn send(&self, event: IapEvent) -> Result<(), IapError> {
        if self.event_loop.is_finished() {
            return Err(IapError::ServiceStopped);
        }
        self.bus.publish(event);
        Ok(())
    }
}

impl<R: IapRepository + 'static> Drop for IapUtil<R> {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

impl IapUtil<IapRepositoryImpl<GbApiBackendDatasourceImpl>> {
    /// Wires the game backend client and the store variant selected by
    /// `config.store_platform`. Native platforms need `bridge`.
    pub async fn new(
        config: IapConfig,
        bridge: Option<Arc<dyn NativeStoreBridge>>,
        bus: EventBus,
    ) -> Result<Self, IapError> {
        let iap_repository = IapRepositoryImpl::new(&config, bridge).await?;
        Ok(Self::start(config, Arc::new(iap_repository), bus).await)
    }
}

struct EventLoop<R: IapRepository + 'static> {
    machine: PurchaseStateMachine,
    iap_repository: Arc<R>,
    bus: EventBus,
    store_timeout: Duration,
    backend_timeout: Duration,
    catalog_tx: watch::Sender<HashMap<String, Product>>,
    // Running store payments by attempt id.
    payments: HashMap<u64, JoinHandle<()>>,
}

impl<R: IapRepository + 'static> EventLoop<R> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<IapEvent>) {
        while let Some(event) = rx.recv().await {
            let name = event.name();
            tracing::debug!(event = %name, item_id = ?event.item_id(), "applying event");
            let logout = matches!(event, IapEvent::Logout);
            let outcome = self.machine.handle(event);
            if logout {
                self.catalog_tx.send_replace(HashMap::new());
            }
            for (item_id, state) in &outcome.transitions {
                tracing::trace!(%item_id, ?state, trigger = %name, "state entered");
            }
            for command in outcome.commands {
                self.execute(command);
            }
        }
        tracing::debug!("purchase event loop finished");
    }

    fn execute(&mut self, command: Command) {
        let repository = self.iap_repository.clone();
        let bus = self.bus.clone();
        let store_timeout = self.store_timeout;
        let backend_timeout = self.backend_timeout;
        match command {
            Command::Publish(event) => {
                if matches!(event, IapEvent::CatalogReady(CatalogResult { success: true, .. })) {
                    self.catalog_tx
                        .send_replace(self.machine.session().catalog_snapshot());
                }
                self.bus.publish(event);
            }
            Command::FetchBackendCatalog {
                game_id,
                payment_id,
            } => {
                tokio::spawn(async move {
                    let result = match tokio::time::timeout(
                        backend_timeout,
                        repository.fetch_backend_catalog(&game_id, &payment_id),
                    )
                    .await
                    {
                        Ok(Ok(products)) => CatalogResult::ok(products),
                        Ok(Err(e)) => CatalogResult::error(e.to_string()),
                        Err(_) => CatalogResult::error(
                            BackendError::NetworkTimeout("product list".to_string()).to_string(),
                        ),
                    };
                    bus.publish(IapEvent::BackendCatalogReceived(result));
                });
            }
            Command::FetchStoreCatalog { item_ids } => {
                tokio::spawn(async move {
                    let result = match tokio::time::timeout(
                        store_timeout,
                        repository.fetch_store_catalog(&item_ids),
                    )
                    .await
                    {
                        Ok(Ok(products)) => CatalogResult::ok(products),
                        Ok(Err(e)) => CatalogResult::error(e.to_string()),
                        Err(_) => CatalogResult::error(StoreError::Timeout.to_string()),
                    };
                    bus.publish(IapEvent::StoreCatalogReceived(result));
                });
            }
            Command::AddPayment(payment) => {
                self.payments.retain(|_, handle| !handle.is_finished());
                let attempt_id = payment.attempt_id;
                let handle = tokio::spawn(async move {
                    let event = match tokio::time::timeout(
                        store_timeout,
                        repository.add_payment(&payment),
                    )
                    .await
                    {
                        Ok(Ok(transaction)) => IapEvent::StorePaymentSucceeded {
                            attempt_id: Some(attempt_id),
                            transaction,
                        },
                        Ok(Err(StoreError::UserCancelled)) => IapEvent::StorePaymentCancelled {
                            item_id: payment.item_id,
                            attempt_id,
                        },
                        Ok(Err(reason)) => IapEvent::StorePaymentFailed {
                            item_id: payment.item_id,
                            attempt_id,
                            reason,
                        },
                        Err(_) => IapEvent::StorePaymentFailed {
                            item_id: payment.item_id,
                            attempt_id,
                            reason: StoreError::Timeout,
                        },
                    };
                    bus.publish(event);
                });
                self.payments.insert(attempt_id, handle);
            }
            Command::AbortPayment { attempt_id } => {
                if let Some(handle) = self.payments.remove(&attempt_id) {
                    handle.abort();
                    tracing::debug!(attempt_id, "store payment abandoned");
                }
            }
            Command::SubmitPurchase { request, delay } => {
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let event = match tokio::time::timeout(
                        backend_timeout,
                        repository.submit_purchase(&request),
                    )
                    .await
                    {
                        Ok(Ok(response)) => IapEvent::BackendConfirmed {
                            item_id: request.item_id,
                            order_id: if response.order_id.is_empty() {
                                request.order_id
                            } else {
                                response.order_id
                            },
                        },
                        Ok(Err(error)) => IapEvent::BackendRejected {
                            item_id: request.item_id,
                            error,
                        },
                        Err(_) => IapEvent::BackendRejected {
                            item_id: request.item_id,
                            error: BackendError::NetworkTimeout(format!(
                                "no answer within {backend_timeout:?}"
                            )),
                        },
                    };
                    bus.publish(event);
                });
            }
            Command::ConfirmTransaction(transaction) => {
                tokio::spawn(async move {
                    match tokio::time::timeout(
                        store_timeout,
                        repository.confirm_transaction(&transaction),
                    )
                    .await
                    {
                        Ok(Ok(())) => {
                            tracing::debug!(
                                transaction_id = %transaction.transaction_id,
                                "store transaction finalized"
                            );
                            bus.publish(IapEvent::StoreTransactionFinished {
                                transaction_id: transaction.transaction_id,
                            });
                        }
                        Ok(Err(e)) => tracing::warn!(
                            transaction_id = %transaction.transaction_id,
                            error = %e,
                            "store transaction could not be finalized"
                        ),
                        Err(_) => tracing::warn!(
                            transaction_id = %transaction.transaction_id,
                            "store transaction finalization timed out"
                        ),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{
        entities::purchase::{PaymentRequest, PurchaseRequest, PurchaseResponse},
        repositories::social_provider::SocialLogin,
    };

    struct EmptyRepository;

    #[async_trait]
    impl IapRepository for EmptyRepository {
        async fn fetch_backend_catalog(
            &self,
            _game_id: &str,
            _payment_id: &str,
        ) -> Result<Vec<Product>, BackendError> {
            Ok(Vec::new())
        }

        async fn fetch_store_catalog(&self, _ids: &[String]) -> Result<Vec<Product>, StoreError> {
            Ok(Vec::new())
        }

        async fn add_payment(&self, _r: &PaymentRequest) -> Result<StoreTransaction, StoreError> {
            Err(StoreError::UserCancelled)
        }

        async fn confirm_transaction(&self, _t: &StoreTransaction) -> Result<(), StoreError> {
            Ok(())
        }

        async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError> {
            Ok(Vec::new())
        }

        async fn submit_purchase(
            &self,
            _r: &PurchaseRequest,
        ) -> Result<PurchaseResponse, BackendError> {
            Err(BackendError::Rejected("unused".to_string()))
        }
    }

    /// Lists `gbomb005` and never completes a payment.
    #[derive(Default)]
    struct StalledStore {
        started: AtomicBool,
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl IapRepository for StalledStore {
        async fn fetch_backend_catalog(
            &self,
            _game_id: &str,
            _payment_id: &str,
        ) -> Result<Vec<Product>, BackendError> {
            Ok(vec![Product {
                title: "5 Bombs".to_string(),
                image_url: String::new(),
                item_id: "gbomb005".to_string(),
                description: String::new(),
                currency_code: "TWD".to_string(),
                on_sale_id: "s1".to_string(),
                price: 5.0,
            }])
        }

        async fn fetch_store_catalog(&self, _ids: &[String]) -> Result<Vec<Product>, StoreError> {
            Ok(Vec::new())
        }

        async fn add_payment(&self, _r: &PaymentRequest) -> Result<StoreTransaction, StoreError> {
            let _guard = SetOnDrop(self.dropped.clone());
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn confirm_transaction(&self, _t: &StoreTransaction) -> Result<(), StoreError> {
            Ok(())
        }

        async fn unfinished_transactions(&self) -> Result<Vec<StoreTransaction>, StoreError> {
            Ok(Vec::new())
        }

        async fn submit_purchase(
            &self,
            _r: &PurchaseRequest,
        ) -> Result<PurchaseResponse, BackendError> {
            Err(BackendError::Rejected("unused".to_string()))
        }
    }

    struct FixedLogin(SocialLogin);

    #[async_trait]
    impl SocialLoginProvider for FixedLogin {
        async fn login(&self) -> SocialLogin {
            self.0.clone()
        }
    }

    async fn util(bus: EventBus) -> IapUtil<EmptyRepository> {
        let config = IapConfig::new(crate::config::StorePlatform::Generic, "http://localhost");
        IapUtil::start(config, Arc::new(EmptyRepository), bus).await
    }

    async fn wait_for(flag: &AtomicBool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn observe(bus: &EventBus, name: IapEventName) -> mpsc::UnboundedReceiver<IapEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(name, move |e| {
            let _ = tx.send(e.clone());
        });
        rx
    }

    #[tokio::test]
    async fn failed_social_login_does_not_initialize() {
        let bus = EventBus::new();
        let mut inits = observe(&bus, IapEventName::Init);
        let util = util(bus).await;
        let provider = FixedLogin(SocialLogin {
            code: 7,
            token: String::new(),
        });
        let err = util
            .init_with_social_login(&provider, "g1", "p1", "pay")
            .await
            .unwrap_err();
        assert!(matches!(err, IapError::SocialLogin { code: 7 }));
        assert!(inits.try_recv().is_err());
    }

    #[tokio::test]
    async fn social_login_token_becomes_access_token() {
        let bus = EventBus::new();
        let mut inits = observe(&bus, IapEventName::Init);
        let util = util(bus).await;
        let provider = FixedLogin(SocialLogin {
            code: 0,
            token: "fb-token".to_string(),
        });
        util.init_with_social_login(&provider, "g1", "p1", "pay")
            .await
            .unwrap();
        match inits.try_recv().unwrap() {
            IapEvent::Init(payload) => assert_eq!(payload.access_token, "fb-token"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn item_missing_from_catalog_is_not_sent_to_store() {
        let bus = EventBus::new();
        let mut ready = observe(&bus, IapEventName::CatalogReady);
        let mut failed = observe(&bus, IapEventName::PurchaseFailed);
        let mut paid = observe(&bus, IapEventName::StorePaymentSucceeded);
        let util = util(bus).await;
        util.init("g1", "p1", "tok", "pay").unwrap();
        ready.recv().await.unwrap();

        util.purchase(PurchaseIntent {
            item_id: "gbomb005".to_string(),
            ..Default::default()
        })
        .unwrap();
        match failed.recv().await.unwrap() {
            IapEvent::PurchaseFailed { reason, .. } => {
                assert!(!reason.is_user_cancellation());
                assert!(reason.to_string().starts_with("precondition failed"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(paid.try_recv().is_err());
        assert!(util.catalog_snapshot().is_empty());
    }

    #[tokio::test]
    async fn stopped_service_rejects_requests() {
        let util = util(EventBus::new()).await;
        util.event_loop.abort();
        tokio::task::yield_now().await;
        while !util.event_loop.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(util.cancel("a"), Err(IapError::ServiceStopped)));
    }

    #[tokio::test]
    async fn cancelled_purchase_stops_waiting_on_store() {
        let bus = EventBus::new();
        let mut ready = observe(&bus, IapEventName::CatalogReady);
        let mut failed = observe(&bus, IapEventName::PurchaseFailed);
        let repository = Arc::new(StalledStore::default());
        let config = IapConfig::new(crate::config::StorePlatform::Generic, "http://localhost");
        let util = IapUtil::start(config, repository.clone(), bus).await;
        util.init("g1", "p1", "tok", "pay").unwrap();
        ready.recv().await.unwrap();

        util.purchase(PurchaseIntent {
            item_id: "gbomb005".to_string(),
            ..Default::default()
        })
        .unwrap();
        wait_for(&repository.started).await;
        util.cancel("gbomb005").unwrap();
        match failed.recv().await.unwrap() {
            IapEvent::PurchaseFailed { reason, .. } => assert!(reason.is_user_cancellation()),
            other => panic!("unexpected event {other:?}"),
        }
        wait_for(&repository.dropped).await;
    }

    #[tokio::test]
    async fn logout_clears_catalog_and_fails_waiting_purchase() {
        let bus = EventBus::new();
        let mut ready = observe(&bus, IapEventName::CatalogReady);
        let mut failed = observe(&bus, IapEventName::PurchaseFailed);
        let repository = Arc::new(StalledStore::default());
        let config = IapConfig::new(crate::config::StorePlatform::Generic, "http://localhost");
        let util = IapUtil::start(config, repository.clone(), bus).await;
        util.init("g1", "p1", "tok", "pay").unwrap();
        ready.recv().await.unwrap();
        assert!(util.catalog_snapshot().contains_key("gbomb005"));

        util.purchase(PurchaseIntent {
            item_id: "gbomb005".to_string(),
            ..Default::default()
        })
        .unwrap();
        wait_for(&repository.started).await;

        let mut catalog = util.catalog.clone();
        catalog.borrow_and_update();
        util.logout().unwrap();
        match failed.recv().await.unwrap() {
            IapEvent::PurchaseFailed { reason, .. } => {
                assert!(reason.to_string().starts_with("precondition failed"))
            }
            other => panic!("unexpected event {other:?}"),
        }
        catalog.changed().await.unwrap();
        assert!(util.catalog_snapshot().is_empty());
        wait_for(&repository.dropped).await;
    }

    #[tokio::test]
    async fn init_message_carries_free_id() {
        let bus = EventBus::new();
        let mut inits = observe(&bus, IapEventName::Init);
        let util = util(bus).await;
        util.init_from_json(
            r#"{"Protocol":6000,"PaymentID":"pay","ProviderID":"p1","AccessToken":"tok","GameId":"g1","FreeID":12}"#,
        )
        .unwrap();
        match inits.try_recv().unwrap() {
            IapEvent::Init(payload) => assert_eq!(payload.free_id, 12),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
