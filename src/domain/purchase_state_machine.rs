use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

use crate::{
    config::{CatalogSource, IapConfig, RetryPolicy},
    domain::entities::{
        iap_event::{IapEvent, InitPayload},
        iap_session::IapSession,
        product::{CatalogResult, Product},
        purchase::{PaymentRequest, PurchaseIntent, PurchaseRequest},
        purchase_failure_reason::PurchaseFailureReason,
        purchase_state::{CatalogState, PurchaseState, PurchaseStateKind},
        store_transaction::StoreTransaction,
    },
    errors::{BackendError, StoreError},
};

/// Work the state machine asks its driver to carry out. Every call ends in an
/// event fed back into [`PurchaseStateMachine::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchBackendCatalog { game_id: String, payment_id: String },
    FetchStoreCatalog { item_ids: Vec<String> },
    AddPayment(PaymentRequest),
    /// Stops waiting on a store payment whose attempt was abandoned.
    AbortPayment { attempt_id: u64 },
    SubmitPurchase { request: PurchaseRequest, delay: Duration },
    ConfirmTransaction(StoreTransaction),
    Publish(IapEvent),
}

/// What handling one event produced.
#[derive(Debug, Default)]
pub struct Outcome {
    pub commands: Vec<Command>,
    /// Purchase states entered, in order.
    pub transitions: Vec<(String, PurchaseStateKind)>,
}

#[derive(Debug, Default)]
struct CatalogFetch {
    backend: Option<CatalogResult>,
    store: Option<CatalogResult>,
    expect_backend: bool,
    expect_store: bool,
}

impl CatalogFetch {
    fn is_complete(&self) -> bool {
        (!self.expect_backend || self.backend.is_some())
            && (!self.expect_store || self.store.is_some())
    }
}

/// The purchase / catalog lifecycle.
///
/// Pure: it never performs I/O. Each call to [`handle`](Self::handle) applies
/// one event and returns the commands to run. Purchase attempts are tracked
/// per item id, so attempts for different items do not interfere.
pub struct PurchaseStateMachine {
    session: IapSession,
    catalog_state: CatalogState,
    catalog_source: CatalogSource,
    store_item_ids: Vec<String>,
    retry: RetryPolicy,
    catalog_fetch: Option<CatalogFetch>,
    purchases: HashMap<String, PurchaseState>,
    // Store transactions replayed before the session had credentials.
    parked: Vec<StoreTransaction>,
    // Paid transactions for an item whose previous attempt is still at the
    // backend.
    deferred: HashMap<String, VecDeque<StoreTransaction>>,
    // Transactions the backend accepted whose store confirmation is pending.
    settled: HashSet<String>,
    next_attempt: u64,
}

impl PurchaseStateMachine {
    pub fn new(session: IapSession, config: &IapConfig) -> Self {
        Self {
            session,
            catalog_state: CatalogState::Idle,
            catalog_source: config.catalog_source,
            store_item_ids: config.store_item_ids.clone(),
            retry: config.retry.clone(),
            catalog_fetch: None,
            purchases: HashMap::new(),
            parked: Vec::new(),
            deferred: HashMap::new(),
            settled: HashSet::new(),
            next_attempt: 0,
        }
    }

    pub fn session(&self) -> &IapSession {
        &self.session
    }

    pub fn catalog_state(&self) -> CatalogState {
        self.catalog_state
    }

    pub fn purchase_state(&self, item_id: &str) -> Option<&PurchaseState> {
        self.purchases.get(item_id)
    }

    pub fn handle(&mut self, event: IapEvent) -> Outcome {
        let mut out = Outcome::default();
        match event {
            IapEvent::Init(payload) => self.on_init(payload, &mut out),
            IapEvent::Logout => self.on_logout(&mut out),
            IapEvent::CatalogRequested { game_id } => self.on_catalog_requested(game_id, &mut out),
            IapEvent::BackendCatalogReceived(result) => {
                self.on_catalog_part(CatalogPart::Backend, result, &mut out)
            }
            IapEvent::StoreCatalogReceived(result) => {
                self.on_catalog_part(CatalogPart::Store, result, &mut out)
            }
            IapEvent::PurchaseRequested(intent) => self.on_purchase_requested(intent, &mut out),
            IapEvent::PurchaseCancelled { item_id } => self.on_cancel(item_id, &mut out),
            IapEvent::StorePaymentSucceeded {
                attempt_id,
                transaction,
            } => self.on_store_payment_succeeded(attempt_id, transaction, &mut out),
            IapEvent::StorePaymentFailed {
                item_id,
                attempt_id,
                reason,
            } => self.on_store_payment_failed(item_id, attempt_id, reason, &mut out),
            IapEvent::StorePaymentCancelled {
                item_id,
                attempt_id,
            } => self.on_store_payment_failed(
                item_id,
                attempt_id,
                StoreError::UserCancelled,
                &mut out,
            ),
            IapEvent::StoreTransactionFinished { transaction_id } => {
                self.settled.remove(&transaction_id);
            }
            IapEvent::BackendConfirmed { item_id, order_id } => {
                self.on_backend_confirmed(item_id, order_id, &mut out)
            }
            IapEvent::BackendRejected { item_id, error } => {
                self.on_backend_rejected(item_id, error, &mut out)
            }
            IapEvent::CatalogReady(_)
            | IapEvent::PurchaseSucceeded { .. }
            | IapEvent::PurchaseFailed { .. } => {
                tracing::trace!(event = %event.name(), "ignoring outbound event");
            }
        }
        out
    }

    // Catalog.
    // ----------------------------

    fn on_init(&mut self, payload: InitPayload, out: &mut Outcome) {
        tracing::info!(
            game_id = %payload.game_id,
            provider_id = %payload.provider_id,
            "purchase session initialized"
        );
        self.session.initialize(payload);
        self.start_catalog_fetch(out);
        if self.session.has_credentials() {
            for transaction in std::mem::take(&mut self.parked) {
                self.recover(transaction, out);
            }
        }
    }

    /// Ends the session. Attempts still waiting on the store are abandoned;
    /// attempts already at the backend run to completion.
    fn on_logout(&mut self, out: &mut Outcome) {
        tracing::info!(game_id = %self.session.game_id, "purchase session ended");
        self.session.clear();
        self.catalog_fetch = None;
        self.catalog_state = CatalogState::Idle;
        let waiting: Vec<(String, u64)> = self
            .purchases
            .iter()
            .filter_map(|(item_id, state)| state.attempt_id().map(|a| (item_id.clone(), a)))
            .collect();
        for (item_id, attempt_id) in waiting {
            out.commands.push(Command::AbortPayment { attempt_id });
            self.fail(
                item_id,
                PurchaseFailureReason::PreconditionFailed("purchase session ended".to_string()),
                out,
            );
        }
        self.purchases.retain(|_, state| !state.is_terminal());
    }

    fn on_catalog_requested(&mut self, game_id: String, out: &mut Outcome) {
        if !game_id.is_empty() {
            self.session.game_id = game_id;
        }
        if self.session.game_id.is_empty() {
            out.commands
                .push(Command::Publish(IapEvent::CatalogReady(CatalogResult::error(
                    "purchase session is not initialized",
                ))));
            return;
        }
        self.start_catalog_fetch(out);
    }

    fn start_catalog_fetch(&mut self, out: &mut Outcome) {
        if self.catalog_state == CatalogState::CatalogRequested {
            tracing::debug!("catalog fetch already in flight");
            return;
        }
        let fetch = CatalogFetch {
            expect_backend: self.catalog_source.uses_backend(),
            expect_store: self.catalog_source.uses_store(),
            ..Default::default()
        };
        if fetch.expect_backend {
            out.commands.push(Command::FetchBackendCatalog {
                game_id: self.session.game_id.clone(),
                payment_id: self.session.payment_id.clone(),
            });
        }
        if fetch.expect_store {
            out.commands.push(Command::FetchStoreCatalog {
                item_ids: self.store_item_ids.clone(),
            });
        }
        self.catalog_fetch = Some(fetch);
        self.catalog_state = CatalogState::CatalogRequested;
    }

    fn on_catalog_part(&mut self, part: CatalogPart, result: CatalogResult, out: &mut Outcome) {
        let Some(fetch) = self.catalog_fetch.as_mut() else {
            tracing::warn!(?part, "catalog result arrived without a pending fetch");
            return;
        };
        match part {
            CatalogPart::Backend => fetch.backend = Some(result),
            CatalogPart::Store => fetch.store = Some(result),
        }
        if !fetch.is_complete() {
            return;
        }
        let Some(fetch) = self.catalog_fetch.take() else {
            return;
        };
        let merged = merge_catalogs(fetch.backend, fetch.store);
        if merged.success {
            self.session.replace_catalog(&merged.products);
            tracing::info!(products = merged.products.len(), "catalog ready");
        } else {
            tracing::warn!(error = %merged.error_message, "catalog fetch failed");
        }
        self.catalog_state = CatalogState::CatalogReady;
        out.commands
            .push(Command::Publish(IapEvent::CatalogReady(merged)));
    }

    // Purchases.
    // ----------------------------

    fn on_purchase_requested(&mut self, mut intent: PurchaseIntent, out: &mut Outcome) {
        let item_id = intent.item_id.clone();
        if self
            .purchases
            .get(&item_id)
            .is_some_and(|s| !s.is_terminal())
        {
            // The running attempt is left untouched.
            tracing::warn!(%item_id, "purchase requested while another attempt is running");
            out.commands.push(Command::Publish(IapEvent::PurchaseFailed {
                item_id,
                reason: PurchaseFailureReason::PreconditionFailed(
                    "a purchase of this item is already in progress".to_string(),
                ),
            }));
            return;
        }
        if !self.session.has_credentials() {
            self.fail(
                item_id,
                PurchaseFailureReason::PreconditionFailed(
                    "access token or provider id is missing".to_string(),
                ),
                out,
            );
            return;
        }
        let Some(product) = self.session.product(&item_id) else {
            self.fail(
                item_id,
                PurchaseFailureReason::PreconditionFailed("item is not in the catalog".to_string()),
                out,
            );
            return;
        };
        if intent.on_sale_id.is_empty() {
            intent.on_sale_id = product.on_sale_id.clone();
        }
        self.next_attempt += 1;
        let attempt_id = self.next_attempt;
        let payment = PaymentRequest {
            item_id: item_id.clone(),
            on_sale_id: intent.on_sale_id.clone(),
            attempt_id,
        };
        self.set_state(
            &item_id,
            PurchaseState::PurchaseInitiated {
                intent: intent.clone(),
                attempt_id,
            },
            out,
        );
        self.set_state(
            &item_id,
            PurchaseState::AwaitingStoreConfirmation { intent, attempt_id },
            out,
        );
        out.commands.push(Command::AddPayment(payment));
    }

    fn on_cancel(&mut self, item_id: String, out: &mut Outcome) {
        match self.purchases.get(&item_id) {
            Some(state) if state.is_cancellable() => {
                if let Some(attempt_id) = state.attempt_id() {
                    out.commands.push(Command::AbortPayment { attempt_id });
                }
                self.fail(item_id, PurchaseFailureReason::UserCancelled, out)
            }
            Some(state) => {
                tracing::warn!(%item_id, state = ?state.kind(), "cancellation not honored");
            }
            None => tracing::debug!(%item_id, "nothing to cancel"),
        }
    }

    fn on_store_payment_succeeded(
        &mut self,
        attempt_id: Option<u64>,
        transaction: StoreTransaction,
        out: &mut Outcome,
    ) {
        let item_id = transaction.item_id.clone();
        match self.purchases.get(&item_id) {
            Some(
                PurchaseState::PurchaseInitiated {
                    intent,
                    attempt_id: live,
                }
                | PurchaseState::AwaitingStoreConfirmation {
                    intent,
                    attempt_id: live,
                },
            ) if attempt_id == Some(*live) => {
                let intent = intent.clone();
                self.submit_to_backend(intent, transaction, out);
            }
            // Paid, but not by the attempt now waiting on the store.
            Some(PurchaseState::PurchaseInitiated { .. })
            | Some(PurchaseState::AwaitingStoreConfirmation { .. }) => {
                self.defer(item_id, transaction);
            }
            Some(PurchaseState::AwaitingBackendConfirmation {
                transaction: current,
                ..
            }) => {
                if current.transaction_id == transaction.transaction_id {
                    tracing::debug!(%item_id, "duplicate store delivery ignored");
                } else {
                    self.defer(item_id, transaction);
                }
            }
            _ => self.recover(transaction, out),
        }
    }

    fn defer(&mut self, item_id: String, transaction: StoreTransaction) {
        if self
            .deferred
            .get(&item_id)
            .is_some_and(|q| q.iter().any(|t| t.transaction_id == transaction.transaction_id))
        {
            return;
        }
        tracing::info!(
            %item_id,
            transaction_id = %transaction.transaction_id,
            "deferring paid transaction until the running attempt resolves"
        );
        self.deferred
            .entry(item_id)
            .or_default()
            .push_back(transaction);
    }

    /// Routes a paid transaction with no live attempt (replayed at startup,
    /// or completed after a cancellation) straight to the backend.
    fn recover(&mut self, transaction: StoreTransaction, out: &mut Outcome) {
        if self.settled.contains(&transaction.transaction_id) {
            tracing::debug!(
                transaction_id = %transaction.transaction_id,
                "transaction already settled"
            );
            return;
        }
        if !self.session.has_credentials() {
            tracing::info!(
                item_id = %transaction.item_id,
                "parking recovered transaction until the session is initialized"
            );
            self.parked.push(transaction);
            return;
        }
        tracing::info!(
            item_id = %transaction.item_id,
            transaction_id = %transaction.transaction_id,
            "recovering unfinished store transaction"
        );
        let intent = PurchaseIntent {
            item_id: transaction.item_id.clone(),
            on_sale_id: self
                .session
                .product(&transaction.item_id)
                .map(|p| p.on_sale_id.clone())
                .unwrap_or_default(),
            ..Default::default()
        };
        self.submit_to_backend(intent, transaction, out);
    }

    fn submit_to_backend(
        &mut self,
        intent: PurchaseIntent,
        transaction: StoreTransaction,
        out: &mut Outcome,
    ) {
        let request = PurchaseRequest {
            provider_id: self.session.provider_id.clone(),
            access_token: self.session.access_token.clone(),
            on_sale_id: intent.on_sale_id,
            receipt: transaction.receipt.clone(),
            server_id: intent.server_id,
            character_id: intent.character_id,
            order_id: transaction.transaction_id.clone(),
            item_id: intent.item_id.clone(),
            order_details: String::new(),
            game_id: self.session.game_id.clone(),
        };
        out.commands.push(Command::SubmitPurchase {
            request: request.clone(),
            delay: Duration::ZERO,
        });
        self.set_state(
            &intent.item_id,
            PurchaseState::AwaitingBackendConfirmation {
                transaction,
                request,
                retries: 0,
            },
            out,
        );
    }

    fn on_store_payment_failed(
        &mut self,
        item_id: String,
        attempt_id: u64,
        error: StoreError,
        out: &mut Outcome,
    ) {
        match self.purchases.get(&item_id) {
            Some(state) if state.attempt_id() == Some(attempt_id) => {
                self.fail(item_id, PurchaseFailureReason::from_store_error(error), out)
            }
            Some(state) if state.is_cancellable() => {
                tracing::debug!(%item_id, attempt_id, %error, "stale store completion ignored");
            }
            _ => tracing::warn!(%item_id, %error, "store failure without a waiting attempt"),
        }
    }

    fn on_backend_confirmed(&mut self, item_id: String, order_id: String, out: &mut Outcome) {
        let Some(PurchaseState::AwaitingBackendConfirmation { transaction, .. }) =
            self.purchases.get(&item_id)
        else {
            tracing::warn!(%item_id, "backend confirmation without a waiting attempt");
            return;
        };
        let transaction = transaction.clone();
        self.settled.insert(transaction.transaction_id.clone());
        self.set_state(
            &item_id,
            PurchaseState::PurchaseSucceeded {
                item_id: item_id.clone(),
                order_id: order_id.clone(),
            },
            out,
        );
        tracing::info!(%item_id, %order_id, "purchase succeeded");
        out.commands.push(Command::ConfirmTransaction(transaction));
        out.commands.push(Command::Publish(IapEvent::PurchaseSucceeded {
            item_id: item_id.clone(),
            order_id,
        }));
        self.resume_deferred(&item_id, out);
    }

    fn on_backend_rejected(&mut self, item_id: String, error: BackendError, out: &mut Outcome) {
        let Some(PurchaseState::AwaitingBackendConfirmation {
            request, retries, ..
        }) = self.purchases.get_mut(&item_id)
        else {
            tracing::warn!(%item_id, %error, "backend rejection without a waiting attempt");
            return;
        };
        if error.is_retryable() && *retries < self.retry.max_retries {
            *retries += 1;
            let delay = self.retry.delay_for(*retries);
            tracing::warn!(%item_id, retry = *retries, %error, "retrying purchase submission");
            out.commands.push(Command::SubmitPurchase {
                request: request.clone(),
                delay,
            });
            return;
        }
        if matches!(error, BackendError::MalformedResponse(_)) {
            tracing::error!(%item_id, %error, "backend answered with a malformed response");
        }
        // The store transaction stays unconfirmed so it is replayed later.
        self.fail(item_id, PurchaseFailureReason::from_backend_error(error), out);
    }

    fn resume_deferred(&mut self, item_id: &str, out: &mut Outcome) {
        let next = self.deferred.get_mut(item_id).and_then(VecDeque::pop_front);
        if self.deferred.get(item_id).is_some_and(VecDeque::is_empty) {
            self.deferred.remove(item_id);
        }
        if let Some(transaction) = next {
            self.recover(transaction, out);
        }
    }

    fn fail(&mut self, item_id: String, reason: PurchaseFailureReason, out: &mut Outcome) {
        if reason.is_user_cancellation() {
            tracing::info!(%item_id, "purchase cancelled by user");
        } else {
            tracing::info!(%item_id, %reason, "purchase failed");
        }
        self.set_state(
            &item_id,
            PurchaseState::PurchaseFailed {
                item_id: item_id.clone(),
                reason: reason.clone(),
            },
            out,
        );
        out.commands.push(Command::Publish(IapEvent::PurchaseFailed {
            item_id: item_id.clone(),
            reason,
        }));
        self.resume_deferred(&item_id, out);
    }

    fn set_state(&mut self, item_id: &str, state: PurchaseState, out: &mut Outcome) {
        let kind = state.kind();
        tracing::debug!(%item_id, state = ?kind, "purchase transition");
        self.purchases.insert(item_id.to_owned(), state);
        out.transitions.push((item_id.to_owned(), kind));
    }
}

#[derive(Debug, Clone, Copy)]
enum CatalogPart {
    Backend,
    Store,
}

/// Backend entries first, then store entries the backend does not list. The
/// merge succeeds when at least one source did.
fn merge_catalogs(backend: Option<CatalogResult>, store: Option<CatalogResult>) -> CatalogResult {
    let mut products: Vec<Product> = Vec::new();
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    let mut any_success = false;
    for result in [backend, store].into_iter().flatten() {
        if !result.success {
            errors.push(result.error_message);
            continue;
        }
        any_success = true;
        for product in result.products {
            if seen.insert(product.item_id.clone()) {
                products.push(product);
            }
        }
    }
    if any_success {
        CatalogResult::ok(products)
    } else {
        CatalogResult::error(errors.join("; "))
    }
}
