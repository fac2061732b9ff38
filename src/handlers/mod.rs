pub mod carts;
pub mod common;
pub mod deliveries;
pub mod directory;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    payments::PaymentProcessor,
    services::{
        cart_service::CartService,
        delivery_service::DeliveryService,
        directory_service::DirectoryService,
        order_service::OrderService,
        payment_service::{PaymentService, PaymentSettings},
    },
    store::DocumentStore,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub deliveries: Arc<DeliveryService>,
    pub payments: Arc<PaymentService>,
    pub directory: Arc<DirectoryService>,
}

impl AppServices {
    /// Wires every service onto one shared store handle.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        processor: Arc<dyn PaymentProcessor>,
        config: &AppConfig,
    ) -> Self {
        let settings = PaymentSettings {
            webhook_secret: config.payment_webhook_secret.clone(),
            webhook_tolerance_secs: config.payment_webhook_tolerance_secs,
            default_currency: config.default_currency.clone(),
        };

        Self {
            carts: Arc::new(CartService::new(store.clone())),
            orders: Arc::new(OrderService::new(store.clone())),
            deliveries: Arc::new(DeliveryService::new(store.clone())),
            payments: Arc::new(PaymentService::new(store.clone(), processor, settings)),
            directory: Arc::new(DirectoryService::new(store)),
        }
    }
}
