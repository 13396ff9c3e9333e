//! Spy implementations of the checkout seams plus a harness wiring them into
//! a `CheckoutService`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cafe_server::activity::{ActivityEntry, ActivityLog};
use cafe_server::checkout::{CheckoutService, CheckoutSettings, ConfirmPolicy};
use cafe_server::store::{
    AttemptPatch, AttemptState, CatalogSource, CheckoutAttempt, MenuItem, NewAttempt, OrderStore,
    ReconciliationLedger, StoreError,
};
use cafe_server::stripe::{
    ConfirmIntent, CreateIntent, GatewayError, LastPaymentError, PaymentGateway, PaymentIntent,
    PaymentIntentStatus,
};
use chrono::Utc;
use rust_decimal::Decimal;
use shared::checkout::{
    BillingDetails, CartItem, CheckoutRequest, CustomerDetails, IntentRequest, NewOrder,
    NewOrderItem, Order, OrderItem, OrderStatus, OrderType,
};
use tokio::sync::mpsc;

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn unavailable() -> StoreError {
    StoreError::Api {
        status: 503,
        code: None,
        message: "store unavailable".into(),
    }
}

// ============================================================================
// Payment gateway
// ============================================================================

/// What the next confirmation does
#[derive(Debug, Clone)]
pub enum ConfirmScript {
    Succeed,
    /// Card declined (HTTP 402 from the processor)
    Decline(String),
    /// Intent left in the given status
    Status(PaymentIntentStatus),
    /// Succeeds but the processor reports a different charged amount
    ChargeAmount(i64),
}

struct GatewayState {
    intents: HashMap<String, PaymentIntent>,
    /// Creation response per idempotency key, replayed verbatim
    created: HashMap<String, PaymentIntent>,
    script: ConfirmScript,
    next_id: u32,
    create_calls: u32,
    confirm_calls: u32,
    retrieve_calls: u32,
    cancel_calls: u32,
    lost_confirm_responses: u32,
    failing_retrieves: u32,
}

fn missing_intent(intent_id: &str) -> GatewayError {
    GatewayError::Api {
        status: 404,
        kind: Some("invalid_request_error".into()),
        code: Some("resource_missing".into()),
        message: format!("No such payment_intent: {intent_id}"),
    }
}

fn unexpected_state(intent: &PaymentIntent, action: &str) -> GatewayError {
    GatewayError::Api {
        status: 400,
        kind: Some("invalid_request_error".into()),
        code: Some("payment_intent_unexpected_state".into()),
        message: format!(
            "You cannot {action} this PaymentIntent because it has a status of {}.",
            intent.status
        ),
    }
}

pub struct SpyGateway {
    state: Mutex<GatewayState>,
}

impl SpyGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                intents: HashMap::new(),
                created: HashMap::new(),
                script: ConfirmScript::Succeed,
                next_id: 1,
                create_calls: 0,
                confirm_calls: 0,
                retrieve_calls: 0,
                cancel_calls: 0,
                lost_confirm_responses: 0,
                failing_retrieves: 0,
            }),
        }
    }

    pub fn script(&self, script: ConfirmScript) {
        self.state.lock().unwrap().script = script;
    }

    /// Simulate the browser (or processor) moving an intent to `status`
    pub fn mark(&self, intent_id: &str, status: PaymentIntentStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Simulate a decline seen only by the browser; the intent stays payable
    pub fn decline(&self, intent_id: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.status = PaymentIntentStatus::RequiresPaymentMethod;
            intent.last_payment_error = Some(LastPaymentError {
                code: Some("card_declined".into()),
                decline_code: Some("insufficient_funds".into()),
                message: Some(message.to_string()),
            });
        }
    }

    /// The next `n` confirmations take effect but their responses never arrive
    pub fn lose_next_confirm_responses(&self, n: u32) {
        self.state.lock().unwrap().lost_confirm_responses = n;
    }

    /// The next `n` retrieves fail as if the processor were down
    pub fn fail_next_retrieves(&self, n: u32) {
        self.state.lock().unwrap().failing_retrieves = n;
    }

    pub fn cancel_calls(&self) -> u32 {
        self.state.lock().unwrap().cancel_calls
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.state.lock().unwrap().intents.get(intent_id).cloned()
    }

    /// (create, confirm, retrieve)
    pub fn calls(&self) -> (u32, u32, u32) {
        let state = self.state.lock().unwrap();
        (state.create_calls, state.confirm_calls, state.retrieve_calls)
    }

    pub fn total_calls(&self) -> u32 {
        let (c, f, r) = self.calls();
        c + f + r
    }
}

#[async_trait]
impl PaymentGateway for SpyGateway {
    async fn create_intent(
        &self,
        request: &CreateIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;

        // Same key replays the original creation response, not the live intent
        if let Some(original) = state.created.get(idempotency_key) {
            return Ok(original.clone());
        }

        let id = format!("pi_test_{}", state.next_id);
        state.next_id += 1;
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret_x")),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            amount: request.amount_minor,
            currency: request.currency.clone(),
            metadata: request.metadata.iter().cloned().collect(),
            last_payment_error: None,
        };
        state
            .created
            .insert(idempotency_key.to_string(), intent.clone());
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        _request: &ConfirmIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.confirm_calls += 1;
        let script = state.script.clone();
        let lose_response = state.lost_confirm_responses > 0;
        if lose_response {
            state.lost_confirm_responses -= 1;
        }
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| missing_intent(intent_id))?;
        if matches!(
            intent.status,
            PaymentIntentStatus::Succeeded | PaymentIntentStatus::Canceled
        ) {
            return Err(unexpected_state(intent, "confirm"));
        }

        match script {
            ConfirmScript::Succeed => intent.status = PaymentIntentStatus::Succeeded,
            ConfirmScript::Decline(message) => {
                intent.status = PaymentIntentStatus::RequiresPaymentMethod;
                intent.last_payment_error = Some(LastPaymentError {
                    code: Some("card_declined".into()),
                    decline_code: Some("generic_decline".into()),
                    message: Some(message.clone()),
                });
                return Err(GatewayError::CardDeclined {
                    code: Some("card_declined".into()),
                    decline_code: Some("generic_decline".into()),
                    message,
                });
            }
            ConfirmScript::Status(status) => intent.status = status,
            ConfirmScript::ChargeAmount(amount) => {
                intent.status = PaymentIntentStatus::Succeeded;
                intent.amount = amount;
            }
        }
        if lose_response {
            return Err(GatewayError::InvalidResponse("connection reset by peer".into()));
        }
        Ok(intent.clone())
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.retrieve_calls += 1;
        if state.failing_retrieves > 0 {
            state.failing_retrieves -= 1;
            return Err(GatewayError::Api {
                status: 503,
                kind: Some("api_error".into()),
                code: None,
                message: "processor unavailable".into(),
            });
        }
        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| missing_intent(intent_id))
    }

    async fn cancel_intent(
        &self,
        intent_id: &str,
        _reason: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls += 1;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| missing_intent(intent_id))?;
        if matches!(
            intent.status,
            PaymentIntentStatus::Succeeded | PaymentIntentStatus::Canceled
        ) {
            return Err(unexpected_state(intent, "cancel"));
        }
        intent.status = PaymentIntentStatus::Canceled;
        Ok(intent.clone())
    }
}

// ============================================================================
// Order store
// ============================================================================

struct OrderState {
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    next_order_id: i64,
    next_item_id: i64,
    fail_order_inserts: u32,
    fail_item_inserts: u32,
    fail_status_updates: u32,
    writes: u32,
}

pub struct SpyOrderStore {
    state: Mutex<OrderState>,
}

impl SpyOrderStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OrderState {
                orders: Vec::new(),
                items: Vec::new(),
                next_order_id: 1001,
                next_item_id: 1,
                fail_order_inserts: 0,
                fail_item_inserts: 0,
                fail_status_updates: 0,
                writes: 0,
            }),
        }
    }

    pub fn fail_next_order_inserts(&self, n: u32) {
        self.state.lock().unwrap().fail_order_inserts = n;
    }

    pub fn fail_next_item_inserts(&self, n: u32) {
        self.state.lock().unwrap().fail_item_inserts = n;
    }

    pub fn fail_next_status_updates(&self, n: u32) {
        self.state.lock().unwrap().fail_status_updates = n;
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn items_for(&self, order_id: i64) -> Vec<OrderItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Write calls attempted, failed ones included
    pub fn writes(&self) -> u32 {
        self.state.lock().unwrap().writes
    }
}

#[async_trait]
impl OrderStore for SpyOrderStore {
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if state.fail_order_inserts > 0 {
            state.fail_order_inserts -= 1;
            return Err(unavailable());
        }
        if state
            .orders
            .iter()
            .any(|o| o.payment_reference.as_deref() == Some(order.payment_reference.as_str()))
        {
            return Err(StoreError::Conflict(
                "duplicate key value violates unique constraint \"orders_payment_reference_key\""
                    .into(),
            ));
        }

        let now = Utc::now();
        let row = Order {
            id: state.next_order_id,
            customer_email: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            customer_phone: order.customer_phone.clone(),
            order_type: order.order_type,
            total_amount: order.total_amount,
            status: order.status,
            payment_reference: Some(order.payment_reference.clone()),
            special_instructions: order.special_instructions.clone(),
            delivery_address: order.delivery_address.clone(),
            created_at: now,
            updated_at: now,
        };
        state.next_order_id += 1;
        state.orders.push(row.clone());
        Ok(row)
    }

    async fn insert_items(&self, items: &[NewOrderItem]) -> Result<Vec<OrderItem>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if state.fail_item_inserts > 0 {
            state.fail_item_inserts -= 1;
            return Err(unavailable());
        }

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let row = OrderItem {
                id: state.next_item_id,
                order_id: item.order_id,
                menu_item_id: item.menu_item_id.clone(),
                quantity: item.quantity,
                price_at_time: item.price_at_time,
                special_requests: item.special_requests.clone(),
            };
            state.next_item_id += 1;
            rows.push(row);
        }
        state.items.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if state.fail_status_updates > 0 {
            state.fail_status_updates -= 1;
            return Err(unavailable());
        }
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::InvalidResponse(format!("no order {order_id}")))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn count_items(&self, order_id: i64) -> Result<usize, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .count())
    }
}

// ============================================================================
// Catalog
// ============================================================================

pub struct SpyCatalog {
    items: Mutex<Vec<MenuItem>>,
}

impl SpyCatalog {
    /// Flat white 4.50 and croissant 3.00
    pub fn cafe_menu() -> Self {
        Self {
            items: Mutex::new(vec![
                MenuItem {
                    id: "flat-white".into(),
                    name: "Flat white".into(),
                    price: d("4.50"),
                    is_available: true,
                },
                MenuItem {
                    id: "croissant".into(),
                    name: "Croissant".into(),
                    price: d("3.00"),
                    is_available: true,
                },
            ]),
        }
    }

    pub fn set_price(&self, id: &str, price: Decimal) {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|i| i.id == id) {
            item.price = price;
        }
    }
}

#[async_trait]
impl CatalogSource for SpyCatalog {
    async fn menu_items(&self, ids: &[String]) -> Result<Vec<MenuItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Default)]
pub struct MemoryLedger {
    attempts: Mutex<HashMap<String, CheckoutAttempt>>,
}

impl MemoryLedger {
    pub fn attempt(&self, attempt_id: &str) -> Option<CheckoutAttempt> {
        self.attempts.lock().unwrap().get(attempt_id).cloned()
    }

    pub fn all(&self) -> Vec<CheckoutAttempt> {
        self.attempts.lock().unwrap().values().cloned().collect()
    }

    /// Shift an attempt's timestamps into the past
    pub fn backdate(&self, attempt_id: &str, secs: i64) {
        let mut attempts = self.attempts.lock().unwrap();
        if let Some(a) = attempts.get_mut(attempt_id) {
            a.created_at -= chrono::Duration::seconds(secs);
            a.updated_at -= chrono::Duration::seconds(secs);
        }
    }
}

#[async_trait]
impl ReconciliationLedger for MemoryLedger {
    async fn open(&self, attempt: &NewAttempt) -> Result<CheckoutAttempt, StoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        if attempts.contains_key(&attempt.attempt_id) {
            return Err(StoreError::Conflict(attempt.attempt_id.clone()));
        }
        let now = Utc::now();
        let row = CheckoutAttempt {
            attempt_id: attempt.attempt_id.clone(),
            state: attempt.state,
            payment_reference: None,
            order_id: None,
            snapshot: attempt.snapshot.clone(),
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        attempts.insert(row.attempt_id.clone(), row.clone());
        Ok(row)
    }

    async fn get(&self, attempt_id: &str) -> Result<Option<CheckoutAttempt>, StoreError> {
        Ok(self.attempt(attempt_id))
    }

    async fn update(
        &self,
        attempt_id: &str,
        patch: &AttemptPatch,
    ) -> Result<CheckoutAttempt, StoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        let row = attempts
            .get_mut(attempt_id)
            .ok_or_else(|| StoreError::InvalidResponse(format!("no attempt {attempt_id}")))?;
        if let Some(state) = patch.state {
            row.state = state;
        }
        if let Some(reference) = &patch.payment_reference {
            row.payment_reference = Some(reference.clone());
        }
        if let Some(order_id) = patch.order_id {
            row.order_id = Some(order_id);
        }
        if let Some(count) = patch.retry_count {
            row.retry_count = count;
        }
        if let Some(error) = &patch.last_error {
            row.last_error = Some(error.clone());
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn list_by_state(
        &self,
        states: &[AttemptState],
    ) -> Result<Vec<CheckoutAttempt>, StoreError> {
        let mut rows: Vec<CheckoutAttempt> = self
            .attempts
            .lock()
            .unwrap()
            .values()
            .filter(|a| states.contains(&a.state))
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub service: Arc<CheckoutService>,
    pub gateway: Arc<SpyGateway>,
    pub orders: Arc<SpyOrderStore>,
    pub catalog: Arc<SpyCatalog>,
    pub ledger: Arc<MemoryLedger>,
    pub activity_rx: mpsc::Receiver<ActivityEntry>,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = Arc::new(SpyGateway::new());
        let orders = Arc::new(SpyOrderStore::new());
        let catalog = Arc::new(SpyCatalog::cafe_menu());
        let ledger = Arc::new(MemoryLedger::default());
        let (activity, activity_rx) = ActivityLog::new(64);

        let service = CheckoutService::new(
            gateway.clone(),
            orders.clone(),
            catalog.clone(),
            ledger.clone(),
            activity,
            CheckoutSettings {
                currency: "gbp".into(),
                delivery_fee: d("2.50"),
                confirm: ConfirmPolicy {
                    poll_attempts: 2,
                    poll_interval: Duration::from_millis(1),
                },
            },
        );

        Self {
            service: Arc::new(service),
            gateway,
            orders,
            catalog,
            ledger,
            activity_rx,
        }
    }

    /// Activity entries queued so far
    pub fn drain_activity(&mut self) -> Vec<ActivityEntry> {
        let mut entries = Vec::new();
        while let Ok(entry) = self.activity_rx.try_recv() {
            entries.push(entry);
        }
        entries
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Two flat whites at 4.50 and one croissant at 3.00 (items total 12.00)
pub fn cart(order_type: OrderType, declared_total: &str) -> IntentRequest {
    IntentRequest {
        customer: CustomerDetails {
            email: "ada@example.com".into(),
            name: "Ada Lovelace".into(),
            phone: Some("07700 900123".into()),
        },
        order_type,
        items: vec![
            CartItem {
                id: "flat-white".into(),
                name: "Flat white".into(),
                price: d("4.50"),
                quantity: 2,
                special_requests: Some("oat milk".into()),
            },
            CartItem {
                id: "croissant".into(),
                name: "Croissant".into(),
                price: d("3.00"),
                quantity: 1,
                special_requests: None,
            },
        ],
        declared_total: d(declared_total),
        delivery_address: match order_type {
            OrderType::Delivery => Some("12 Harbour Street, Whitby".into()),
            OrderType::Collection => None,
        },
        special_instructions: None,
    }
}

pub fn checkout_request(order_type: OrderType, declared_total: &str) -> CheckoutRequest {
    CheckoutRequest {
        order: cart(order_type, declared_total),
        payment_method: "pm_card_visa".into(),
        billing: Some(BillingDetails {
            name: Some("Ada Lovelace".into()),
            email: Some("ada@example.com".into()),
            phone: None,
            postal_code: Some("YO21 1AA".into()),
        }),
    }
}
