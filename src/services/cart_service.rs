use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{Cart, CartStatus, MenuItem, Restaurant},
    store::{DocumentStore, Repository},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCartInput {
    #[validate(email)]
    pub user_email: String,
    pub restaurant_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    pub menu_item_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be greater than 0"))]
    pub quantity: i32,
    /// Unit price; the menu price when omitted.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Pre-checkout baskets.
///
/// Every item operation recomputes line subtotals and `total_amount` and
/// persists the cart in one document write. Two concurrent writers on the
/// same cart are last-writer-wins.
#[derive(Clone)]
pub struct CartService {
    carts: Repository<Cart>,
    restaurants: Repository<Restaurant>,
    menu_items: Repository<MenuItem>,
}

impl CartService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            carts: Repository::new(store.clone()),
            restaurants: Repository::new(store.clone()),
            menu_items: Repository::new(store),
        }
    }

    /// Opens a cart for `user_email` at a restaurant.
    ///
    /// Fails with `Conflict` when the user already has an active or
    /// checkout cart or the restaurant is deactivated, and with `NotFound`
    /// for an unknown restaurant.
    #[instrument(skip(self, input), fields(user_email = %input.user_email))]
    pub async fn create_cart(&self, input: CreateCartInput) -> Result<Cart, ServiceError> {
        if input.user_email.trim().is_empty() {
            return Err(ServiceError::BadRequest("user_email is required".into()));
        }
        input.validate()?;
        let email = input.user_email.trim().to_lowercase();

        if let Some(existing) = self.find_open_cart(&email).await? {
            return Err(ServiceError::Conflict(format!(
                "User already has an open cart ({})",
                existing.id
            )));
        }

        let restaurant = self
            .restaurants
            .find_by_id(input.restaurant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Restaurant", input.restaurant_id))?;
        if !restaurant.is_active {
            return Err(ServiceError::Conflict(
                "Restaurant is not accepting orders".into(),
            ));
        }

        let cart = Cart::new(email, input.restaurant_id);
        self.carts.insert(&cart).await?;
        info!(cart_id = %cart.id, "cart created");
        Ok(cart)
    }

    pub async fn get_cart(&self, id: Uuid) -> Result<Cart, ServiceError> {
        self.carts
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart", id))
    }

    async fn find_open_cart(&self, email: &str) -> Result<Option<Cart>, ServiceError> {
        Ok(self
            .carts
            .find_by_field("user_email", email)
            .await?
            .into_iter()
            .find(|c| c.status.is_open()))
    }

    /// The user's newest open cart.
    pub async fn get_cart_for_user(&self, user_email: &str) -> Result<Cart, ServiceError> {
        let email = user_email.trim().to_lowercase();
        self.find_open_cart(&email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No open cart for {}", email)))
    }

    pub async fn list_carts(&self) -> Result<Vec<Cart>, ServiceError> {
        Ok(self.carts.find_all().await?)
    }

    async fn get_mutable_cart(&self, id: Uuid) -> Result<Cart, ServiceError> {
        let cart = self.get_cart(id).await?;
        if !cart.status.is_open() {
            return Err(ServiceError::Conflict(format!(
                "Cart {} is {} and can no longer be modified",
                id, cart.status
            )));
        }
        Ok(cart)
    }

    async fn persist(&self, cart: &mut Cart) -> Result<(), ServiceError> {
        if self.carts.save(cart).await? == 0 {
            return Err(ServiceError::not_found("Cart", cart.id));
        }
        Ok(())
    }

    /// Adds a menu item. Re-adding the same menu item increments its line.
    #[instrument(skip(self, input), fields(menu_item_id = %input.menu_item_id, quantity = input.quantity))]
    pub async fn add_item(&self, cart_id: Uuid, input: AddItemInput) -> Result<Cart, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::BadRequest(
                "quantity must be greater than 0".into(),
            ));
        }
        input.validate()?;
        if input.price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(ServiceError::BadRequest("price must not be negative".into()));
        }

        let mut cart = self.get_mutable_cart(cart_id).await?;
        let menu_item = self
            .menu_items
            .find_by_id(input.menu_item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Menu item", input.menu_item_id))?;
        if menu_item.restaurant_id != cart.restaurant_id {
            warn!(
                cart_restaurant = %cart.restaurant_id,
                item_restaurant = %menu_item.restaurant_id,
                "menu item belongs to a different restaurant"
            );
        }

        let price = input.price.unwrap_or(menu_item.price);
        cart.add_item(menu_item.id, menu_item.name, price, input.quantity, input.notes)?;
        self.persist(&mut cart).await?;

        info!(cart_id = %cart_id, total = %cart.total_amount, "item added to cart");
        Ok(cart)
    }

    /// Overwrites a line's quantity. Zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        menu_item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::BadRequest(
                "quantity must not be negative".into(),
            ));
        }

        let mut cart = self.get_mutable_cart(cart_id).await?;
        if !cart.set_quantity(menu_item_id, quantity)? {
            return Err(ServiceError::NotFound(format!(
                "Item {} not found in cart {}",
                menu_item_id, cart_id
            )));
        }
        self.persist(&mut cart).await?;

        info!(cart_id = %cart_id, total = %cart.total_amount, "cart item quantity updated");
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: Uuid, menu_item_id: Uuid) -> Result<Cart, ServiceError> {
        let mut cart = self.get_mutable_cart(cart_id).await?;
        if !cart.remove_item(menu_item_id) {
            return Err(ServiceError::NotFound(format!(
                "Item {} not found in cart {}",
                menu_item_id, cart_id
            )));
        }
        self.persist(&mut cart).await?;

        info!(cart_id = %cart_id, "item removed from cart");
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<Cart, ServiceError> {
        let mut cart = self.get_mutable_cart(cart_id).await?;
        cart.clear();
        self.persist(&mut cart).await?;

        info!(cart_id = %cart_id, "cart cleared");
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn delete_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        if self.carts.delete(cart_id).await? == 0 {
            return Err(ServiceError::not_found("Cart", cart_id));
        }
        info!(cart_id = %cart_id, "cart deleted");
        Ok(())
    }

    /// Sets any cart status; there is no guarded machine for carts.
    #[instrument(skip(self))]
    pub async fn change_status(&self, cart_id: Uuid, status: CartStatus) -> Result<Cart, ServiceError> {
        let mut cart = self.get_cart(cart_id).await?;
        let previous = cart.status;
        cart.status = status;
        self.persist(&mut cart).await?;

        info!(cart_id = %cart_id, from = %previous, to = %status, "cart status changed");
        Ok(cart)
    }
}
