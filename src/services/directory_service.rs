use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{
        directory::{default_menu_category, default_restaurant_category},
        Address, GeoPoint, MenuItem, Restaurant, Rider, RiderAvailability, User, UserRole,
    },
    store::{DocumentStore, Repository},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRestaurant {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate]
    pub location: Address,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    pub cuisine: Vec<String>,
    #[serde(default = "default_restaurant_category")]
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMenuItem {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default = "default_menu_category")]
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRider {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 32))]
    pub phone: String,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Partial restaurant update. Unset fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RestaurantUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate]
    pub location: Option<Address>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub cuisine: Option<Vec<String>>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MenuItemUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub is_available: Option<bool>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RiderUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub phone: Option<String>,
    pub vehicle_type: Option<String>,
    pub city: Option<String>,
}

/// Optional criteria for listing restaurants. Unset fields match everything;
/// text comparisons ignore case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestaurantFilter {
    pub cuisine: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub category: Option<String>,
    pub featured: Option<bool>,
    /// Matched against name, cuisine, area and category.
    pub search: Option<String>,
}

impl RestaurantFilter {
    pub fn matches(&self, restaurant: &Restaurant) -> bool {
        let area = restaurant.location.area.as_deref().unwrap_or("");
        restaurant.is_active
            && self.cuisine.as_deref().map_or(true, |c| {
                restaurant
                    .cuisine
                    .iter()
                    .any(|own| own.eq_ignore_ascii_case(c.trim()))
            })
            && self
                .city
                .as_deref()
                .map_or(true, |c| contains_ignore_case(&restaurant.location.city, c))
            && self.area.as_deref().map_or(true, |a| contains_ignore_case(area, a))
            && self
                .category
                .as_deref()
                .map_or(true, |c| restaurant.category.eq_ignore_ascii_case(c.trim()))
            && self.featured.map_or(true, |f| restaurant.is_featured == f)
            && self.search.as_deref().map_or(true, |q| {
                contains_ignore_case(&restaurant.name, q)
                    || contains_ignore_case(area, q)
                    || contains_ignore_case(&restaurant.category, q)
                    || restaurant.cuisine.iter().any(|c| contains_ignore_case(c, q))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuFilter {
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub available: Option<bool>,
}

impl MenuFilter {
    pub fn matches(&self, item: &MenuItem) -> bool {
        self.category
            .as_deref()
            .map_or(true, |c| item.category.eq_ignore_ascii_case(c.trim()))
            && self.featured.map_or(true, |f| item.is_featured == f)
            && self.available.map_or(true, |a| item.is_available == a)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.trim().to_lowercase())
}

fn validate_coordinates(point: GeoPoint) -> Result<(), ServiceError> {
    if !point.latitude.is_finite() || !point.longitude.is_finite() || !point.is_valid() {
        return Err(ServiceError::BadRequest(format!(
            "Invalid coordinates ({}, {})",
            point.latitude, point.longitude
        )));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::BadRequest("price must not be negative".into()));
    }
    Ok(())
}

/// Users, restaurants, menus and riders.
#[derive(Clone)]
pub struct DirectoryService {
    users: Repository<User>,
    restaurants: Repository<Restaurant>,
    menu_items: Repository<MenuItem>,
    riders: Repository<Rider>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Repository::new(store.clone()),
            restaurants: Repository::new(store.clone()),
            menu_items: Repository::new(store.clone()),
            riders: Repository::new(store),
        }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: NewUser) -> Result<User, ServiceError> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();
        if self.find_user(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "User with email {} already exists",
                email
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            name: input.name,
            phone: input.phone,
            role: input.role,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(&user).await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let email = email.trim().to_lowercase();
        Ok(self.users.find_one_by_field("email", &email).await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, ServiceError> {
        self.find_user(email)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", email))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_restaurant(&self, input: NewRestaurant) -> Result<Restaurant, ServiceError> {
        input.validate()?;
        if let Some(point) = input.location.coordinates() {
            validate_coordinates(point)?;
        }
        let now = Utc::now();
        let restaurant = Restaurant {
            id: Uuid::new_v4(),
            name: input.name,
            location: input.location,
            phone: input.phone,
            email: input.email,
            cuisine: input.cuisine,
            category: input.category,
            is_featured: input.is_featured,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.restaurants.insert(&restaurant).await?;
        info!(restaurant_id = %restaurant.id, "restaurant created");
        Ok(restaurant)
    }

    pub async fn get_restaurant(&self, id: Uuid) -> Result<Restaurant, ServiceError> {
        self.restaurants
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Restaurant", id))
    }

    /// Active restaurants matching `filter`, featured first and then by name.
    pub async fn list_restaurants(
        &self,
        filter: &RestaurantFilter,
    ) -> Result<Vec<Restaurant>, ServiceError> {
        let mut restaurants = self.restaurants.find(|r| filter.matches(r)).await?;
        restaurants.sort_by(|a, b| {
            b.is_featured
                .cmp(&a.is_featured)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(restaurants)
    }

    #[instrument(skip(self, input))]
    pub async fn update_restaurant(
        &self,
        id: Uuid,
        input: RestaurantUpdate,
    ) -> Result<Restaurant, ServiceError> {
        input.validate()?;
        if let Some(point) = input.location.as_ref().and_then(Address::coordinates) {
            validate_coordinates(point)?;
        }
        let mut restaurant = self.get_restaurant(id).await?;
        if let Some(name) = input.name {
            restaurant.name = name;
        }
        if let Some(location) = input.location {
            restaurant.location = location;
        }
        if let Some(phone) = input.phone {
            restaurant.phone = Some(phone);
        }
        if let Some(email) = input.email {
            restaurant.email = Some(email);
        }
        if let Some(cuisine) = input.cuisine {
            restaurant.cuisine = cuisine;
        }
        if let Some(category) = input.category {
            restaurant.category = category;
        }
        if let Some(is_featured) = input.is_featured {
            restaurant.is_featured = is_featured;
        }
        if let Some(is_active) = input.is_active {
            restaurant.is_active = is_active;
        }
        if self.restaurants.save(&mut restaurant).await? == 0 {
            return Err(ServiceError::not_found("Restaurant", id));
        }
        info!(restaurant_id = %id, "restaurant updated");
        Ok(restaurant)
    }

    /// Deactivates the restaurant. It drops out of listings and new carts are
    /// refused, while existing orders still resolve it.
    #[instrument(skip(self))]
    pub async fn delete_restaurant(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut restaurant = self.get_restaurant(id).await?;
        restaurant.is_active = false;
        if self.restaurants.save(&mut restaurant).await? == 0 {
            return Err(ServiceError::not_found("Restaurant", id));
        }
        info!(restaurant_id = %id, "restaurant deactivated");
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn add_menu_item(
        &self,
        restaurant_id: Uuid,
        input: NewMenuItem,
    ) -> Result<MenuItem, ServiceError> {
        input.validate()?;
        validate_price(input.price)?;
        self.get_restaurant(restaurant_id).await?;

        let now = Utc::now();
        let item = MenuItem {
            id: Uuid::new_v4(),
            restaurant_id,
            name: input.name,
            description: input.description,
            price: input.price,
            category: input.category,
            is_available: input.is_available,
            is_featured: input.is_featured,
            created_at: now,
            updated_at: now,
        };
        self.menu_items.insert(&item).await?;
        info!(menu_item_id = %item.id, "menu item added");
        Ok(item)
    }

    /// Menu items of a restaurant matching `filter`, grouped by category.
    pub async fn list_menu(
        &self,
        restaurant_id: Uuid,
        filter: &MenuFilter,
    ) -> Result<Vec<MenuItem>, ServiceError> {
        self.get_restaurant(restaurant_id).await?;
        let mut items = self
            .menu_items
            .find_by_field("restaurant_id", &restaurant_id.to_string())
            .await?;
        items.retain(|m| filter.matches(m));
        items.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    /// A menu item of `restaurant_id`. Items of other restaurants are reported
    /// as missing.
    pub async fn get_menu_item(
        &self,
        restaurant_id: Uuid,
        id: Uuid,
    ) -> Result<MenuItem, ServiceError> {
        self.menu_items
            .find_by_id(id)
            .await?
            .filter(|m| m.restaurant_id == restaurant_id)
            .ok_or_else(|| ServiceError::not_found("Menu item", id))
    }

    #[instrument(skip(self, input))]
    pub async fn update_menu_item(
        &self,
        restaurant_id: Uuid,
        id: Uuid,
        input: MenuItemUpdate,
    ) -> Result<MenuItem, ServiceError> {
        input.validate()?;
        if let Some(price) = input.price {
            validate_price(price)?;
        }
        let mut item = self.get_menu_item(restaurant_id, id).await?;
        if let Some(name) = input.name {
            item.name = name;
        }
        if let Some(description) = input.description {
            item.description = Some(description);
        }
        if let Some(price) = input.price {
            item.price = price;
        }
        if let Some(category) = input.category {
            item.category = category;
        }
        if let Some(is_available) = input.is_available {
            item.is_available = is_available;
        }
        if let Some(is_featured) = input.is_featured {
            item.is_featured = is_featured;
        }
        if self.menu_items.save(&mut item).await? == 0 {
            return Err(ServiceError::not_found("Menu item", id));
        }
        info!(menu_item_id = %id, "menu item updated");
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn delete_menu_item(&self, restaurant_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        self.get_menu_item(restaurant_id, id).await?;
        if self.menu_items.delete(id).await? == 0 {
            return Err(ServiceError::not_found("Menu item", id));
        }
        info!(menu_item_id = %id, "menu item deleted");
        Ok(())
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_rider(&self, input: NewRider) -> Result<Rider, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let rider = Rider {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email.trim().to_lowercase(),
            phone: input.phone,
            vehicle_type: input.vehicle_type,
            availability: RiderAvailability::Available,
            city: input.city,
            current_location: None,
            location_updated_at: None,
            created_at: now,
            updated_at: now,
        };
        self.riders.insert(&rider).await?;
        info!(rider_id = %rider.id, "rider registered");
        Ok(rider)
    }

    pub async fn get_rider(&self, id: Uuid) -> Result<Rider, ServiceError> {
        self.riders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Rider", id))
    }

    #[instrument(skip(self))]
    pub async fn set_rider_availability(
        &self,
        id: Uuid,
        availability: RiderAvailability,
    ) -> Result<Rider, ServiceError> {
        let mut rider = self.get_rider(id).await?;
        rider.availability = availability;
        if self.riders.save(&mut rider).await? == 0 {
            return Err(ServiceError::not_found("Rider", id));
        }
        info!(rider_id = %id, availability = %availability, "rider availability changed");
        Ok(rider)
    }

    #[instrument(skip(self, input))]
    pub async fn update_rider(&self, id: Uuid, input: RiderUpdate) -> Result<Rider, ServiceError> {
        input.validate()?;
        let mut rider = self.get_rider(id).await?;
        if let Some(name) = input.name {
            rider.name = name;
        }
        if let Some(phone) = input.phone {
            rider.phone = phone;
        }
        if let Some(vehicle_type) = input.vehicle_type {
            rider.vehicle_type = Some(vehicle_type);
        }
        if let Some(city) = input.city {
            rider.city = Some(city);
        }
        if self.riders.save(&mut rider).await? == 0 {
            return Err(ServiceError::not_found("Rider", id));
        }
        info!(rider_id = %id, "rider updated");
        Ok(rider)
    }

    /// Records where the rider is now. Coordinates outside the valid
    /// latitude/longitude ranges are rejected.
    #[instrument(skip(self))]
    pub async fn update_rider_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<Rider, ServiceError> {
        validate_coordinates(location)?;
        let mut rider = self.get_rider(id).await?;
        rider.current_location = Some(location);
        rider.location_updated_at = Some(Utc::now());
        if self.riders.save(&mut rider).await? == 0 {
            return Err(ServiceError::not_found("Rider", id));
        }
        Ok(rider)
    }

    #[instrument(skip(self))]
    pub async fn delete_rider(&self, id: Uuid) -> Result<(), ServiceError> {
        if self.riders.delete(id).await? == 0 {
            return Err(ServiceError::not_found("Rider", id));
        }
        info!(rider_id = %id, "rider deleted");
        Ok(())
    }

    /// Riders marked available, optionally limited to one city.
    pub async fn available_riders(&self, city: Option<&str>) -> Result<Vec<Rider>, ServiceError> {
        let city = city.map(str::trim).filter(|c| !c.is_empty());
        Ok(self
            .riders
            .find(|r| {
                r.availability == RiderAvailability::Available
                    && city.map_or(true, |c| {
                        r.city.as_deref().map_or(false, |own| own.eq_ignore_ascii_case(c))
                    })
            })
            .await?)
    }
}
