use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use super::{common::Address, common::GeoPoint, impl_document, WorkflowStatus};
use crate::store::Collection;

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
pub enum DeliveryStatus {
    Assigned,
    Accepted,
    PickedUp,
    OnTheWay,
    Arrived,
    Delivered,
    Cancelled,
}

impl WorkflowStatus for DeliveryStatus {
    const CANCELLED: Self = DeliveryStatus::Cancelled;

    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Assigned => 0,
            DeliveryStatus::Accepted => 1,
            DeliveryStatus::PickedUp => 2,
            DeliveryStatus::OnTheWay => 3,
            DeliveryStatus::Arrived => 4,
            DeliveryStatus::Delivered => 5,
            DeliveryStatus::Cancelled => u8::MAX,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

impl DeliveryStatus {
    /// Rider is on the job: assigned through arrived.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

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
pub enum DeliveryPriority {
    #[default]
    Normal,
    High,
    Urgent,
}

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
pub enum IssueSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub last_updated: DateTime<Utc>,
}

/// One entry of the append-only location trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryProof {
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub verification_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryIssue {
    pub issue_type: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub rider_id: Uuid,
    pub user_email: String,
    pub restaurant_id: Uuid,
    pub status: DeliveryStatus,

    pub pickup_address: Address,
    pub delivery_address: Address,
    #[serde(default)]
    pub current_location: Option<CurrentLocation>,
    #[serde(default)]
    pub location_history: Vec<LocationSample>,

    pub delivery_fee: Decimal,
    #[serde(default)]
    pub priority: DeliveryPriority,
    #[serde(default)]
    pub delivery_instructions: Option<String>,

    #[serde(default)]
    pub estimated_pickup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrived_at_customer_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,

    #[serde(default)]
    pub delivery_proof: Option<DeliveryProof>,
    #[serde(default)]
    pub issues: Vec<DeliveryIssue>,
    #[serde(default)]
    pub rider_notes: Option<String>,
    #[serde(default)]
    pub customer_rating: Option<u8>,
    #[serde(default)]
    pub customer_feedback: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(Delivery, Collection::Deliveries);

impl Delivery {
    /// Sets `status` and stamps the matching milestone timestamp.
    pub fn apply_status(&mut self, status: DeliveryStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            DeliveryStatus::Accepted => self.accepted_at = Some(now),
            DeliveryStatus::PickedUp => self.picked_up_at = Some(now),
            DeliveryStatus::Arrived => self.arrived_at_customer_at = Some(now),
            DeliveryStatus::Delivered => self.delivered_at = Some(now),
            DeliveryStatus::Cancelled => self.cancelled_at = Some(now),
            DeliveryStatus::Assigned | DeliveryStatus::OnTheWay => {}
        }
    }

    /// Moves the rider marker and appends to the trail.
    pub fn record_location(&mut self, point: GeoPoint, now: DateTime<Utc>) {
        self.current_location = Some(CurrentLocation {
            latitude: point.latitude,
            longitude: point.longitude,
            last_updated: now,
        });
        self.location_history.push(LocationSample {
            latitude: point.latitude,
            longitude: point.longitude,
            timestamp: now,
        });
    }
}
