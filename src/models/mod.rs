//! Domain documents for the order workflow.

use std::str::FromStr;

use crate::errors::ServiceError;

pub mod cart;
pub mod common;
pub mod delivery;
pub mod directory;
pub mod order;

pub use cart::{AmountOutOfRange, Cart, CartItem, CartStatus};
pub use common::{Address, GeoPoint};
pub use delivery::{
    CurrentLocation, Delivery, DeliveryIssue, DeliveryPriority, DeliveryProof, DeliveryStatus,
    IssueSeverity, LocationSample,
};
pub use directory::{MenuItem, Restaurant, Rider, RiderAvailability, User, UserRole};
pub use order::{Order, OrderCharges, OrderItem, OrderStatus, PaymentStatus};

/// A status vocabulary with a forward-only progression and a cancel exit.
pub trait WorkflowStatus: Copy + Eq + std::fmt::Display {
    const CANCELLED: Self;

    /// Position along the happy path. Higher means further along.
    fn rank(self) -> u8;

    fn is_terminal(self) -> bool;

    /// Forward moves may skip steps; `CANCELLED` is reachable from any
    /// non-terminal status; nothing leaves a terminal status.
    fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        next == Self::CANCELLED || next.rank() > self.rank()
    }
}

/// Parses a vocabulary value, rejecting anything outside the enumeration.
pub fn parse_enum<T: FromStr>(field: &str, raw: &str) -> Result<T, ServiceError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ServiceError::BadRequest(format!("Invalid {}: '{}'", field, raw)))
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr) => {
        impl $crate::store::Document for $ty {
            const COLLECTION: $crate::store::Collection = $collection;

            fn id(&self) -> uuid::Uuid {
                self.id
            }

            fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.created_at
            }

            fn touch(&mut self, now: chrono::DateTime<chrono::Utc>) {
                self.updated_at = now;
            }
        }
    };
}

pub(crate) use impl_document;
