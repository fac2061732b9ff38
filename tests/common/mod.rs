#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use food_delivery_api::{
    build_app,
    config::AppConfig,
    models::{Address, Cart, MenuItem, Order, Restaurant, Rider, User},
    payments::{
        CheckoutSession, CreateCheckoutSession, CreatePaymentIntent, CreateRefund, PaymentIntent,
        PaymentIntentStatus, PaymentProcessor, ProcessorError, Refund,
    },
    services::{
        cart_service::{AddItemInput, CreateCartInput},
        directory_service::{NewMenuItem, NewRestaurant, NewRider, NewUser},
        order_service::CreateOrderInput,
    },
    store::{Collection, DocumentStore, InMemoryStore, StoreError},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Payment processor double. Intents live in memory and their status can be
/// scripted by tests.
#[derive(Default)]
pub struct FakeProcessor {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    pub created: Mutex<Vec<CreatePaymentIntent>>,
    pub refunds: Mutex<Vec<CreateRefund>>,
    pub sessions: Mutex<Vec<CreateCheckoutSession>>,
    pub cancelled: Mutex<Vec<String>>,
    counter: AtomicUsize,
    reject_next: Mutex<Option<String>>,
}

impl FakeProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn set_status(&self, intent_id: &str, status: PaymentIntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Registers an intent that was not created through the service.
    pub fn insert_intent(&self, intent: PaymentIntent) {
        self.intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent);
    }

    /// The next processor call fails as an invalid request with `message`.
    pub fn reject_next(&self, message: &str) {
        *self.reject_next.lock().unwrap() = Some(message.to_string());
    }

    fn take_rejection(&self) -> Result<(), ProcessorError> {
        match self.reject_next.lock().unwrap().take() {
            Some(message) => Err(ProcessorError::InvalidRequest(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntent,
    ) -> Result<PaymentIntent, ProcessorError> {
        self.take_rejection()?;
        let id = self.next_id("pi");
        let intent = PaymentIntent {
            id: id.clone(),
            amount: request.amount_minor,
            currency: request.currency.clone(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("{}_secret", id)),
            description: request.description.clone(),
            metadata: request.metadata.clone(),
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        self.created.lock().unwrap().push(request);
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.take_rejection()?;
        self.intents
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessorError::InvalidRequest(format!("No such payment_intent: '{}'", id)))
    }

    async fn cancel_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.take_rejection()?;
        self.set_status(id, PaymentIntentStatus::Canceled);
        self.cancelled.lock().unwrap().push(id.to_string());
        self.retrieve_payment_intent(id).await
    }

    async fn create_refund(&self, request: CreateRefund) -> Result<Refund, ProcessorError> {
        self.take_rejection()?;
        let amount = match request.amount_minor {
            Some(amount) => amount,
            None => {
                self.retrieve_payment_intent(&request.payment_intent_id)
                    .await?
                    .amount
            }
        };
        let refund = Refund {
            id: self.next_id("re"),
            amount,
            status: "succeeded".to_string(),
            payment_intent: Some(request.payment_intent_id.clone()),
        };
        self.refunds.lock().unwrap().push(request);
        Ok(refund)
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, ProcessorError> {
        self.take_rejection()?;
        let id = self.next_id("cs");
        let session = CheckoutSession {
            url: Some(format!("https://checkout.example.test/{}", id)),
            id,
        };
        self.sessions.lock().unwrap().push(request);
        Ok(session)
    }
}

/// Wraps a store and fails `replace` on one collection while armed.
pub struct FailingStore {
    inner: InMemoryStore,
    fail_replace_on: Mutex<Option<Collection>>,
    pub armed: AtomicBool,
    /// `ping` fails while set.
    pub unhealthy: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new(),
            fail_replace_on: Mutex::new(None),
            armed: AtomicBool::new(false),
            unhealthy: AtomicBool::new(false),
        })
    }

    pub fn fail_replace(&self, collection: Collection) {
        *self.fail_replace_on.lock().unwrap() = Some(collection);
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing-memory"
    }

    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), StoreError> {
        self.inner.insert(collection, id, doc).await
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        self.inner.list(collection).await
    }

    async fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        self.inner.find_by_field(collection, field, value).await
    }

    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> Result<u64, StoreError> {
        let target = *self.fail_replace_on.lock().unwrap();
        if self.armed.load(Ordering::SeqCst) && target == Some(collection) {
            return Err(StoreError::Backend(format!("injected failure on {}", collection)));
        }
        self.inner.replace(collection, id, doc).await
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<u64, StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unreachable".into()));
        }
        self.inner.ping().await
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new("test");
    cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
    cfg
}

/// Application wired onto an in-memory store and a fake processor.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub processor: Arc<FakeProcessor>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self::build(store, test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(Arc::new(InMemoryStore::new()), config)
    }

    fn build(store: Arc<dyn DocumentStore>, config: AppConfig) -> Self {
        let processor = FakeProcessor::new();
        let state = AppState::new(store, processor.clone(), config);
        let router = build_app(state.clone());
        Self {
            router,
            state,
            processor,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("build request"))
            .await
            .expect("router error during test request")
    }

    pub async fn seed_user(&self, email: &str) -> User {
        self.state
            .services
            .directory
            .create_user(NewUser {
                email: email.to_string(),
                name: "Test Customer".to_string(),
                phone: Some("+8801700000000".to_string()),
                role: Default::default(),
            })
            .await
            .expect("seed user")
    }

    pub async fn seed_restaurant(&self, name: &str) -> Restaurant {
        let mut location = Address::new("12 Kitchen Road", "Dhaka");
        location.latitude = Some(23.78);
        location.longitude = Some(90.41);
        self.state
            .services
            .directory
            .create_restaurant(NewRestaurant {
                name: name.to_string(),
                location,
                phone: Some("+8801800000000".to_string()),
                email: None,
                cuisine: vec!["bengali".to_string()],
                category: "restaurant".to_string(),
                is_featured: false,
            })
            .await
            .expect("seed restaurant")
    }

    pub async fn seed_menu_item(&self, restaurant_id: Uuid, name: &str, price: Decimal) -> MenuItem {
        self.state
            .services
            .directory
            .add_menu_item(
                restaurant_id,
                NewMenuItem {
                    name: name.to_string(),
                    description: None,
                    price,
                    category: "main_course".to_string(),
                    is_available: true,
                    is_featured: false,
                },
            )
            .await
            .expect("seed menu item")
    }

    pub async fn seed_rider(&self, name: &str) -> Rider {
        self.state
            .services
            .directory
            .create_rider(NewRider {
                name: name.to_string(),
                email: format!("{}@riders.test", name.to_lowercase()),
                phone: "+8801900000000".to_string(),
                vehicle_type: Some("bike".to_string()),
                city: Some("Dhaka".to_string()),
            })
            .await
            .expect("seed rider")
    }

    /// A user, a restaurant and an open cart holding `lines` of (name, price, qty).
    pub async fn seed_cart(&self, email: &str, lines: &[(&str, Decimal, i32)]) -> (Restaurant, Cart) {
        if self
            .state
            .services
            .directory
            .find_user(email)
            .await
            .expect("lookup user")
            .is_none()
        {
            self.seed_user(email).await;
        }
        let restaurant = self.seed_restaurant("Kacchi House").await;
        let mut cart = self
            .state
            .services
            .carts
            .create_cart(CreateCartInput {
                user_email: email.to_string(),
                restaurant_id: restaurant.id,
            })
            .await
            .expect("seed cart");
        for (name, price, quantity) in lines {
            let item = self.seed_menu_item(restaurant.id, name, *price).await;
            cart = self
                .state
                .services
                .carts
                .add_item(
                    cart.id,
                    AddItemInput {
                        menu_item_id: item.id,
                        quantity: *quantity,
                        price: None,
                        notes: None,
                    },
                )
                .await
                .expect("seed cart item");
        }
        (restaurant, cart)
    }

    pub fn order_input(cart_id: Uuid, email: &str, delivery_fee: Option<Decimal>) -> CreateOrderInput {
        let mut address = Address::new("House 5, Road 3", "Dhaka");
        address.area = Some("Banani".to_string());
        address.instructions = Some("Ring twice".to_string());
        CreateOrderInput {
            cart_id,
            user_email: email.to_string(),
            delivery_address: address,
            payment_method: "card".to_string(),
            delivery_fee,
            tax_amount: None,
            discount_amount: None,
            special_instructions: Some("Extra napkins, no cutlery".to_string()),
        }
    }

    /// An order placed from a freshly seeded cart.
    pub async fn seed_order(&self, email: &str, lines: &[(&str, Decimal, i32)], fee: Decimal) -> Order {
        let (_, cart) = self.seed_cart(email, lines).await;
        self.state
            .services
            .orders
            .create_order(Self::order_input(cart.id, email, Some(fee)))
            .await
            .expect("seed order")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Metadata map as the service attaches it to intents.
pub fn order_metadata(order: &Order) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("order_id".to_string(), order.id.to_string());
    metadata.insert("order_number".to_string(), order.order_number.clone());
    metadata
}
