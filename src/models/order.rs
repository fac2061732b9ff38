use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use super::{cart::CartItem, common::Address, impl_document, WorkflowStatus};
use crate::store::Collection;

/// Prefix of every generated order number.
pub const ORDER_NUMBER_PREFIX: &str = "YG";

/// Fixed delivery estimate applied at order creation.
pub const ESTIMATED_DELIVERY_MINUTES: i64 = 45;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl WorkflowStatus for OrderStatus {
    const CANCELLED: Self = OrderStatus::Cancelled;

    fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Preparing => 2,
            OrderStatus::Ready => 3,
            OrderStatus::PickedUp => 4,
            OrderStatus::OnTheWay => 5,
            OrderStatus::Delivered => 6,
            OrderStatus::Cancelled => u8::MAX,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// `pending -> paid | failed`, `failed -> paid` (retry), `paid -> refunded`.
    /// Re-applying the current status is not a transition.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Failed, PaymentStatus::Paid)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }
}

/// Line copied from the cart at checkout. Independent of the cart afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu_item_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub notes: Option<String>,
    pub subtotal: Decimal,
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            menu_item_id: item.menu_item_id,
            name: item.name.clone(),
            price: item.price,
            quantity: item.quantity,
            notes: item.notes.clone(),
            subtotal: item.subtotal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_email: String,
    pub restaurant_id: Uuid,
    #[serde(default)]
    pub rider_id: Option<Uuid>,
    pub items: Vec<OrderItem>,

    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub checkout_session_id: Option<String>,

    pub delivery_address: Address,
    pub restaurant_address: Address,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,

    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_delivery_time: Option<DateTime<Utc>>,

    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prepared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(Order, Collection::Orders);

/// Price breakdown fixed at order creation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrderCharges {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
}

impl OrderCharges {
    /// `None` when the amounts overflow.
    pub fn total(&self) -> Option<Decimal> {
        self.subtotal
            .checked_add(self.delivery_fee)?
            .checked_add(self.tax_amount)?
            .checked_sub(self.discount_amount)
    }
}

/// `YG<unix millis><000-999>`. Unique with high probability only.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!(
        "{}{}{:03}",
        ORDER_NUMBER_PREFIX,
        now.timestamp_millis(),
        suffix
    )
}

impl Order {
    pub fn estimated_delivery_from(placed_at: DateTime<Utc>) -> DateTime<Utc> {
        placed_at + Duration::minutes(ESTIMATED_DELIVERY_MINUTES)
    }

    /// Sets `status` and stamps the matching milestone timestamp.
    pub fn apply_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            OrderStatus::Confirmed => self.confirmed_at = Some(now),
            OrderStatus::Ready => self.prepared_at = Some(now),
            OrderStatus::PickedUp => self.picked_up_at = Some(now),
            OrderStatus::Delivered => {
                self.delivered_at = Some(now);
                self.actual_delivery_time.get_or_insert(now);
            }
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::OnTheWay => {}
        }
    }
}
