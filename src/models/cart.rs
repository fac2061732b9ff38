use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use super::impl_document;
use crate::store::Collection;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CartStatus {
    Active,
    Checkout,
    Ordered,
    Cancelled,
}

impl CartStatus {
    /// A user may hold at most one cart in an open status.
    pub fn is_open(self) -> bool {
        matches!(self, CartStatus::Active | CartStatus::Checkout)
    }
}

/// A line quantity, subtotal or cart total left the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Cart quantity or amount is out of range")]
pub struct AmountOutOfRange;

/// One basket line. Owned by its cart; has no identity of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub menu_item_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub notes: Option<String>,
    pub subtotal: Decimal,
}

fn line_total(price: Decimal, quantity: i32) -> Result<Decimal, AmountOutOfRange> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or(AmountOutOfRange)
}

fn sum_lines(items: &[CartItem]) -> Result<Decimal, AmountOutOfRange> {
    items.iter().try_fold(Decimal::ZERO, |total, line| {
        total.checked_add(line.subtotal).ok_or(AmountOutOfRange)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_email: String,
    pub restaurant_id: Uuid,
    pub items: Vec<CartItem>,
    pub total_amount: Decimal,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(Cart, Collection::Carts);

impl Cart {
    pub fn new(user_email: impl Into<String>, restaurant_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_email: user_email.into(),
            restaurant_id,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            status: CartStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds `quantity` of a menu item. An existing line for the same menu
    /// item is incremented in place; otherwise one line is appended.
    /// On overflow the cart is left unchanged.
    pub fn add_item(
        &mut self,
        menu_item_id: Uuid,
        name: impl Into<String>,
        price: Decimal,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<(), AmountOutOfRange> {
        let mut items = self.items.clone();
        match items.iter_mut().find(|i| i.menu_item_id == menu_item_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or(AmountOutOfRange)?;
                line.subtotal = line_total(line.price, line.quantity)?;
            }
            None => items.push(CartItem {
                menu_item_id,
                name: name.into(),
                price,
                quantity,
                notes,
                subtotal: line_total(price, quantity)?,
            }),
        }
        self.replace_items(items)
    }

    /// Overwrites a line's quantity; zero removes the line.
    /// Returns `Ok(false)` when the cart has no line for `menu_item_id`.
    pub fn set_quantity(
        &mut self,
        menu_item_id: Uuid,
        quantity: i32,
    ) -> Result<bool, AmountOutOfRange> {
        if quantity == 0 {
            return Ok(self.remove_item(menu_item_id));
        }
        let mut items = self.items.clone();
        let Some(line) = items.iter_mut().find(|i| i.menu_item_id == menu_item_id) else {
            return Ok(false);
        };
        line.quantity = quantity;
        line.subtotal = line_total(line.price, quantity)?;
        self.replace_items(items)?;
        Ok(true)
    }

    pub fn remove_item(&mut self, menu_item_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.menu_item_id != menu_item_id);
        let removed = self.items.len() != before;
        // a subset of lines whose sum already fit cannot overflow
        self.total_amount = self.items.iter().map(|i| i.subtotal).sum();
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.total_amount = Decimal::ZERO;
    }

    fn replace_items(&mut self, items: Vec<CartItem>) -> Result<(), AmountOutOfRange> {
        self.total_amount = sum_lines(&items)?;
        self.items = items;
        Ok(())
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}
