//! Reference entities the workflow existence-checks: users, restaurants,
//! menu items and riders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{
    common::{Address, GeoPoint},
    impl_document,
};
use crate::store::Collection;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UserRole {
    #[default]
    User,
    Admin,
    RestaurantOwner,
    Rider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(User, Collection::Users);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Uuid,
    pub name: String,
    pub location: Address,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cuisine: Vec<String>,
    #[serde(default = "default_restaurant_category")]
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
    /// Cleared instead of deleting, so orders keep a valid reference.
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(Restaurant, Collection::Restaurants);

pub const DEFAULT_RESTAURANT_CATEGORY: &str = "restaurant";
pub const DEFAULT_MENU_CATEGORY: &str = "main_course";

pub(crate) fn default_restaurant_category() -> String {
    DEFAULT_RESTAURANT_CATEGORY.to_string()
}

pub(crate) fn default_menu_category() -> String {
    DEFAULT_MENU_CATEGORY.to_string()
}

fn default_true() -> bool {
    true
}

impl Restaurant {
    /// Address snapshot copied onto orders and used as the default pickup.
    pub fn address_snapshot(&self) -> Address {
        let mut address = self.location.clone();
        if address.phone.is_none() {
            address.phone = self.phone.clone();
        }
        address
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default = "default_menu_category")]
    pub category: String,
    pub is_available: bool,
    #[serde(default)]
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(MenuItem, Collection::MenuItems);

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RiderAvailability {
    #[default]
    Available,
    Busy,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub availability: RiderAvailability,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub current_location: Option<GeoPoint>,
    #[serde(default)]
    pub location_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(Rider, Collection::Riders);
