use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{
        order::generate_order_number, Address, Cart, CartStatus, Order, OrderCharges, OrderItem,
        OrderStatus, PaymentStatus, Restaurant, Rider, User, WorkflowStatus,
    },
    store::{DocumentStore, Repository},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderInput {
    pub cart_id: Uuid,
    #[validate(email)]
    pub user_email: String,
    #[validate]
    pub delivery_address: Address,
    #[validate(length(min = 1, message = "payment_method is required"))]
    pub payment_method: String,
    #[serde(default)]
    pub delivery_fee: Option<Decimal>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub special_instructions: Option<String>,
}

/// Optional criteria for listing orders. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub user_email: Option<String>,
    pub restaurant_id: Option<Uuid>,
    pub rider_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_email
            .as_deref()
            .map_or(true, |e| order.user_email.eq_ignore_ascii_case(e.trim()))
            && self.restaurant_id.map_or(true, |r| order.restaurant_id == r)
            && self.rider_id.map_or(true, |r| order.rider_id == Some(r))
            && self.status.map_or(true, |s| order.status == s)
            && self.payment_status.map_or(true, |s| order.payment_status == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatusBucket {
    pub status: OrderStatus,
    pub count: u64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub total_amount: Decimal,
    pub by_status: Vec<OrderStatusBucket>,
}

/// Order lifecycle: creation from a cart, status and payment-status
/// machines, rider assignment and delivery estimates.
#[derive(Clone)]
pub struct OrderService {
    orders: Repository<Order>,
    carts: Repository<Cart>,
    users: Repository<User>,
    restaurants: Repository<Restaurant>,
    riders: Repository<Rider>,
}

impl OrderService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            orders: Repository::new(store.clone()),
            carts: Repository::new(store.clone()),
            users: Repository::new(store.clone()),
            restaurants: Repository::new(store.clone()),
            riders: Repository::new(store),
        }
    }

    /// Converts a cart into an order.
    ///
    /// The order is inserted first and the cart is marked `ordered` second.
    /// The two writes are independent: if the second fails the order stays
    /// and the caller receives [`ServiceError::PartialFailure`] naming it.
    #[instrument(skip(self, input), fields(cart_id = %input.cart_id, user_email = %input.user_email))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<Order, ServiceError> {
        if input.user_email.trim().is_empty() || input.payment_method.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "cart_id, user_email, delivery_address and payment_method are required".into(),
            ));
        }
        input.validate()?;

        let charges_in = [
            ("delivery_fee", input.delivery_fee),
            ("tax_amount", input.tax_amount),
            ("discount_amount", input.discount_amount),
        ];
        for (field, value) in charges_in {
            if value.is_some_and(|v| v < Decimal::ZERO) {
                return Err(ServiceError::BadRequest(format!(
                    "{} must not be negative",
                    field
                )));
            }
        }

        let email = input.user_email.trim().to_lowercase();
        if self.users.find_one_by_field("email", &email).await?.is_none() {
            return Err(ServiceError::not_found("User", &email));
        }

        let mut cart = self
            .carts
            .find_by_id(input.cart_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart", input.cart_id))?;
        if !cart.user_email.eq_ignore_ascii_case(&email) {
            return Err(ServiceError::BadRequest(
                "Cart does not belong to this user".into(),
            ));
        }
        if cart.items.is_empty() {
            return Err(ServiceError::BadRequest("Cart is empty".into()));
        }
        if !cart.status.is_open() {
            return Err(ServiceError::Conflict(format!(
                "Cart {} is already {}",
                cart.id, cart.status
            )));
        }

        let restaurant = self
            .restaurants
            .find_by_id(cart.restaurant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Restaurant", cart.restaurant_id))?;

        let charges = OrderCharges {
            subtotal: cart.total_amount,
            delivery_fee: input.delivery_fee.unwrap_or(Decimal::ZERO),
            tax_amount: input.tax_amount.unwrap_or(Decimal::ZERO),
            discount_amount: input.discount_amount.unwrap_or(Decimal::ZERO),
        };
        let total_amount = charges
            .total()
            .ok_or_else(|| ServiceError::BadRequest("Order amount is out of range".into()))?;
        if total_amount < Decimal::ZERO {
            return Err(ServiceError::BadRequest(
                "discount_amount exceeds the order amount".into(),
            ));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            order_number: generate_order_number(now),
            user_email: email,
            restaurant_id: restaurant.id,
            rider_id: None,
            items: cart.items.iter().map(OrderItem::from).collect(),
            subtotal: charges.subtotal,
            delivery_fee: charges.delivery_fee,
            tax_amount: charges.tax_amount,
            discount_amount: charges.discount_amount,
            total_amount,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: input.payment_method.trim().to_string(),
            payment_intent_id: None,
            checkout_session_id: None,
            delivery_address: input.delivery_address,
            restaurant_address: restaurant.address_snapshot(),
            special_instructions: input.special_instructions,
            cancellation_reason: None,
            estimated_delivery_time: Some(Order::estimated_delivery_from(now)),
            actual_delivery_time: None,
            placed_at: now,
            confirmed_at: None,
            prepared_at: None,
            picked_up_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(&order).await?;
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "order created");

        cart.status = CartStatus::Ordered;
        match self.carts.save(&mut cart).await {
            Ok(1) => {}
            Ok(_) => {
                error!(order_id = %order.id, cart_id = %cart.id, "cart vanished before it could be marked ordered");
                return Err(ServiceError::PartialFailure(format!(
                    "Order {} was created but cart {} could not be marked ordered",
                    order.id, cart.id
                )));
            }
            Err(e) => {
                error!(order_id = %order.id, cart_id = %cart.id, error = %e, "failed to mark cart ordered");
                return Err(ServiceError::PartialFailure(format!(
                    "Order {} was created but cart {} could not be marked ordered",
                    order.id, cart.id
                )));
            }
        }

        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    pub async fn get_order_by_number(&self, order_number: &str) -> Result<Order, ServiceError> {
        self.orders
            .find_one_by_field("order_number", order_number)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_number))
    }

    /// Orders matching `filter`, newest first.
    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.find(|o| filter.matches(o)).await?)
    }

    /// Count and amount per status, in lifecycle order.
    pub async fn order_stats(&self) -> Result<OrderStats, ServiceError> {
        let orders = self.orders.find_all().await?;
        let mut by_status: Vec<OrderStatusBucket> = Vec::new();
        for order in &orders {
            match by_status.iter_mut().find(|b| b.status == order.status) {
                Some(bucket) => {
                    bucket.count += 1;
                    bucket.total_amount += order.total_amount;
                }
                None => by_status.push(OrderStatusBucket {
                    status: order.status,
                    count: 1,
                    total_amount: order.total_amount,
                }),
            }
        }
        by_status.sort_by_key(|b| b.status.rank());

        Ok(OrderStats {
            total_orders: orders.len() as u64,
            total_amount: orders.iter().map(|o| o.total_amount).sum(),
            by_status,
        })
    }

    async fn persist(&self, order: &mut Order) -> Result<(), ServiceError> {
        if self.orders.save(order).await? == 0 {
            return Err(ServiceError::not_found("Order", order.id));
        }
        Ok(())
    }

    /// Moves the order forward (steps may be skipped) or to `cancelled`.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, ServiceError> {
        let mut order = self.get_order(id).await?;
        if !order.status.can_transition_to(status) {
            error!(order_id = %id, from = %order.status, to = %status, "invalid order status transition");
            return Err(ServiceError::Conflict(format!(
                "Invalid status transition from {} to {}",
                order.status, status
            )));
        }

        let previous = order.status;
        order.apply_status(status, Utc::now());
        self.persist(&mut order).await?;

        info!(order_id = %id, from = %previous, to = %status, "order status updated");
        Ok(order)
    }

    /// Explicit payment-status update. Re-applying the current status is a no-op.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<Order, ServiceError> {
        let mut order = self.get_order(id).await?;
        if order.payment_status == status {
            return Ok(order);
        }
        if !order.payment_status.can_transition_to(status) {
            return Err(ServiceError::Conflict(format!(
                "Invalid payment status transition from {} to {}",
                order.payment_status, status
            )));
        }

        let previous = order.payment_status;
        order.payment_status = status;
        self.persist(&mut order).await?;

        info!(order_id = %id, from = %previous, to = %status, "order payment status updated");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn assign_rider(&self, id: Uuid, rider_id: Uuid) -> Result<Order, ServiceError> {
        let mut order = self.get_order(id).await?;
        if self.riders.find_by_id(rider_id).await?.is_none() {
            return Err(ServiceError::not_found("Rider", rider_id));
        }
        if order.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Order {} is already {}",
                id, order.status
            )));
        }

        order.rider_id = Some(rider_id);
        self.persist(&mut order).await?;

        info!(order_id = %id, rider_id = %rider_id, "rider assigned to order");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn update_delivery_time(
        &self,
        id: Uuid,
        estimated: Option<DateTime<Utc>>,
        actual: Option<DateTime<Utc>>,
    ) -> Result<Order, ServiceError> {
        if estimated.is_none() && actual.is_none() {
            return Err(ServiceError::BadRequest(
                "estimated_delivery_time or actual_delivery_time is required".into(),
            ));
        }

        let mut order = self.get_order(id).await?;
        if estimated.is_some() {
            order.estimated_delivery_time = estimated;
        }
        if actual.is_some() {
            order.actual_delivery_time = actual;
        }
        self.persist(&mut order).await?;

        info!(order_id = %id, "order delivery time updated");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(&self, id: Uuid, reason: Option<String>) -> Result<Order, ServiceError> {
        let mut order = self.get_order(id).await?;
        if order.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Order cannot be cancelled in its current status: {}",
                order.status
            )));
        }

        order.apply_status(OrderStatus::Cancelled, Utc::now());
        order.cancellation_reason = reason.filter(|r| !r.trim().is_empty());
        self.persist(&mut order).await?;

        info!(order_id = %id, "order cancelled");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: Uuid) -> Result<(), ServiceError> {
        if self.orders.delete(id).await? == 0 {
            return Err(ServiceError::not_found("Order", id));
        }
        info!(order_id = %id, "order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with(status: OrderStatus, email: &str) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            order_number: generate_order_number(now),
            user_email: email.into(),
            restaurant_id: Uuid::new_v4(),
            rider_id: None,
            items: vec![],
            subtotal: Decimal::ZERO,
            delivery_fee: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: "card".into(),
            payment_intent_id: None,
            checkout_session_id: None,
            delivery_address: Address::new("1 Road", "City"),
            restaurant_address: Address::new("2 Road", "City"),
            special_instructions: None,
            cancellation_reason: None,
            estimated_delivery_time: None,
            actual_delivery_time: None,
            placed_at: now,
            confirmed_at: None,
            prepared_at: None,
            picked_up_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let order = order_with(OrderStatus::Ready, "A@Example.com");

        assert!(OrderFilter::default().matches(&order));
        assert!(OrderFilter {
            user_email: Some("a@example.com".into()),
            status: Some(OrderStatus::Ready),
            ..Default::default()
        }
        .matches(&order));
        assert!(!OrderFilter {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        }
        .matches(&order));
        assert!(!OrderFilter {
            rider_id: Some(Uuid::new_v4()),
            ..Default::default()
        }
        .matches(&order));
    }
}
