use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{
        Address, Delivery, DeliveryIssue, DeliveryPriority, DeliveryProof, DeliveryStatus,
        GeoPoint, IssueSeverity, Order, Restaurant, Rider, RiderAvailability, WorkflowStatus,
    },
    store::{DocumentStore, Repository},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDeliveryInput {
    pub order_id: Uuid,
    pub rider_id: Uuid,
    /// Defaults to the restaurant location.
    #[serde(default)]
    pub pickup_address: Option<Address>,
    /// Defaults to the order's delivery address.
    #[serde(default)]
    pub delivery_address: Option<Address>,
    #[serde(default)]
    pub delivery_fee: Option<Decimal>,
    #[serde(default)]
    pub priority: DeliveryPriority,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub delivery_instructions: Option<String>,
    #[serde(default)]
    pub estimated_pickup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewIssue {
    #[validate(length(min = 1, max = 100))]
    pub issue_type: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[serde(default)]
    pub severity: IssueSeverity,
}

/// Optional criteria for listing deliveries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryFilter {
    pub rider_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub status: Option<DeliveryStatus>,
    /// Only deliveries that have not reached a terminal status.
    pub active_only: bool,
}

impl DeliveryFilter {
    pub fn matches(&self, delivery: &Delivery) -> bool {
        self.rider_id.map_or(true, |r| delivery.rider_id == r)
            && self
                .user_email
                .as_deref()
                .map_or(true, |e| delivery.user_email.eq_ignore_ascii_case(e.trim()))
            && self.status.map_or(true, |s| delivery.status == s)
            && (!self.active_only || delivery.status.is_active())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStatusBucket {
    pub status: DeliveryStatus,
    pub count: u64,
    pub total_fee: Decimal,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub rider_id: Option<Uuid>,
    pub total_deliveries: u64,
    pub total_fee: Decimal,
    pub average_rating: Option<f64>,
    pub by_status: Vec<DeliveryStatusBucket>,
}

fn average_rating<'a>(deliveries: impl Iterator<Item = &'a Delivery>) -> Option<f64> {
    let ratings: Vec<f64> = deliveries
        .filter_map(|d| d.customer_rating)
        .map(f64::from)
        .collect();
    if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    }
}

/// Physical fulfilment of orders: rider progress, live location, proof,
/// issues and customer rating.
#[derive(Clone)]
pub struct DeliveryService {
    deliveries: Repository<Delivery>,
    orders: Repository<Order>,
    riders: Repository<Rider>,
    restaurants: Repository<Restaurant>,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            deliveries: Repository::new(store.clone()),
            orders: Repository::new(store.clone()),
            riders: Repository::new(store.clone()),
            restaurants: Repository::new(store),
        }
    }

    /// Creates the single delivery for an order.
    ///
    /// Fails with `NotFound` for an unknown order, rider or restaurant and
    /// with `Conflict` when the order already has a delivery.
    #[instrument(skip(self, input), fields(order_id = %input.order_id, rider_id = %input.rider_id))]
    pub async fn create_delivery(&self, input: CreateDeliveryInput) -> Result<Delivery, ServiceError> {
        input.validate()?;
        if input.delivery_fee.is_some_and(|f| f < Decimal::ZERO) {
            return Err(ServiceError::BadRequest(
                "delivery_fee must not be negative".into(),
            ));
        }
        for address in [&input.pickup_address, &input.delivery_address]
            .into_iter()
            .flatten()
        {
            address.validate()?;
            if address.coordinates().is_some_and(|p| !p.is_valid()) {
                return Err(ServiceError::BadRequest(
                    "address coordinates are out of range".into(),
                ));
            }
        }

        let order = self
            .orders
            .find_by_id(input.order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", input.order_id))?;
        let rider = self
            .riders
            .find_by_id(input.rider_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Rider", input.rider_id))?;

        if self
            .deliveries
            .find_one_by_field("order_id", &order.id.to_string())
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "Delivery already exists for order {}",
                order.id
            )));
        }

        let restaurant = self
            .restaurants
            .find_by_id(order.restaurant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Restaurant", order.restaurant_id))?;

        if rider.availability != RiderAvailability::Available {
            warn!(rider_id = %rider.id, availability = %rider.availability, "assigning delivery to a rider who is not available");
        }

        let now = Utc::now();
        let delivery = Delivery {
            id: Uuid::new_v4(),
            order_id: order.id,
            order_number: order.order_number.clone(),
            rider_id: rider.id,
            user_email: order.user_email.clone(),
            restaurant_id: restaurant.id,
            status: DeliveryStatus::Assigned,
            pickup_address: input
                .pickup_address
                .unwrap_or_else(|| restaurant.address_snapshot()),
            delivery_address: input
                .delivery_address
                .unwrap_or_else(|| order.delivery_address.clone()),
            current_location: None,
            location_history: Vec::new(),
            delivery_fee: input.delivery_fee.unwrap_or(order.delivery_fee),
            priority: input.priority,
            delivery_instructions: input
                .delivery_instructions
                .or_else(|| order.special_instructions.clone()),
            estimated_pickup_time: input.estimated_pickup_time,
            estimated_delivery_time: input
                .estimated_delivery_time
                .or(order.estimated_delivery_time),
            accepted_at: None,
            picked_up_at: None,
            arrived_at_customer_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            delivery_proof: None,
            issues: Vec::new(),
            rider_notes: None,
            customer_rating: None,
            customer_feedback: None,
            created_at: now,
            updated_at: now,
        };
        self.deliveries.insert(&delivery).await?;

        info!(delivery_id = %delivery.id, order_number = %delivery.order_number, "delivery created");
        Ok(delivery)
    }

    pub async fn get_delivery(&self, id: Uuid) -> Result<Delivery, ServiceError> {
        self.deliveries
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Delivery", id))
    }

    pub async fn get_delivery_for_order(&self, order_id: Uuid) -> Result<Delivery, ServiceError> {
        self.deliveries
            .find_one_by_field("order_id", &order_id.to_string())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No delivery for order {}", order_id)))
    }

    /// Deliveries matching `filter`, newest first.
    pub async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>, ServiceError> {
        Ok(self.deliveries.find(|d| filter.matches(d)).await?)
    }

    /// Count, fees and average rating per status, optionally for one rider.
    pub async fn delivery_stats(&self, rider_id: Option<Uuid>) -> Result<DeliveryStats, ServiceError> {
        let deliveries = self
            .deliveries
            .find(|d| rider_id.map_or(true, |r| d.rider_id == r))
            .await?;

        let mut statuses: Vec<DeliveryStatus> = deliveries.iter().map(|d| d.status).collect();
        statuses.sort_by_key(|s| s.rank());
        statuses.dedup();

        let by_status = statuses
            .into_iter()
            .map(|status| {
                let group = || deliveries.iter().filter(move |d| d.status == status);
                DeliveryStatusBucket {
                    status,
                    count: group().count() as u64,
                    total_fee: group().map(|d| d.delivery_fee).sum(),
                    average_rating: average_rating(group()),
                }
            })
            .collect();

        Ok(DeliveryStats {
            rider_id,
            total_deliveries: deliveries.len() as u64,
            total_fee: deliveries.iter().map(|d| d.delivery_fee).sum(),
            average_rating: average_rating(deliveries.iter()),
            by_status,
        })
    }

    async fn persist(&self, delivery: &mut Delivery) -> Result<(), ServiceError> {
        if self.deliveries.save(delivery).await? == 0 {
            return Err(ServiceError::not_found("Delivery", delivery.id));
        }
        Ok(())
    }

    /// Advances the delivery. `rider_notes`, when given, replaces the rider's note.
    #[instrument(skip(self, rider_notes))]
    pub async fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        rider_notes: Option<String>,
    ) -> Result<Delivery, ServiceError> {
        let mut delivery = self.get_delivery(id).await?;
        if !delivery.status.can_transition_to(status) {
            error!(delivery_id = %id, from = %delivery.status, to = %status, "invalid delivery status transition");
            return Err(ServiceError::Conflict(format!(
                "Invalid status transition from {} to {}",
                delivery.status, status
            )));
        }

        let previous = delivery.status;
        delivery.apply_status(status, Utc::now());
        if rider_notes.is_some() {
            delivery.rider_notes = rider_notes;
        }
        self.persist(&mut delivery).await?;

        info!(delivery_id = %id, from = %previous, to = %status, "delivery status updated");
        Ok(delivery)
    }

    /// Moves the rider marker and appends one entry to the location trail.
    #[instrument(skip(self))]
    pub async fn update_location(
        &self,
        id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<Delivery, ServiceError> {
        let point = GeoPoint {
            latitude,
            longitude,
        };
        if !point.is_valid() {
            return Err(ServiceError::BadRequest(format!(
                "Invalid coordinates ({}, {})",
                latitude, longitude
            )));
        }

        let mut delivery = self.get_delivery(id).await?;
        delivery.record_location(point, Utc::now());
        self.persist(&mut delivery).await?;

        info!(delivery_id = %id, trail = delivery.location_history.len(), "delivery location updated");
        Ok(delivery)
    }

    #[instrument(skip(self, issue), fields(issue_type = %issue.issue_type))]
    pub async fn add_issue(&self, id: Uuid, issue: NewIssue) -> Result<Delivery, ServiceError> {
        issue.validate()?;
        let mut delivery = self.get_delivery(id).await?;
        delivery.issues.push(DeliveryIssue {
            issue_type: issue.issue_type,
            description: issue.description,
            severity: issue.severity,
            reported_at: Utc::now(),
        });
        self.persist(&mut delivery).await?;

        warn!(delivery_id = %id, severity = %issue.severity, "delivery issue reported");
        Ok(delivery)
    }

    #[instrument(skip(self, proof))]
    pub async fn update_delivery_proof(
        &self,
        id: Uuid,
        proof: DeliveryProof,
    ) -> Result<Delivery, ServiceError> {
        if proof == DeliveryProof::default() {
            return Err(ServiceError::BadRequest(
                "delivery proof must contain at least one field".into(),
            ));
        }
        let mut delivery = self.get_delivery(id).await?;
        delivery.delivery_proof = Some(proof);
        self.persist(&mut delivery).await?;

        info!(delivery_id = %id, "delivery proof recorded");
        Ok(delivery)
    }

    #[instrument(skip(self, feedback))]
    pub async fn add_customer_rating(
        &self,
        id: Uuid,
        rating: i64,
        feedback: Option<String>,
    ) -> Result<Delivery, ServiceError> {
        let rating = u8::try_from(rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| ServiceError::BadRequest("Rating must be between 1 and 5".into()))?;

        let mut delivery = self.get_delivery(id).await?;
        delivery.customer_rating = Some(rating);
        if feedback.is_some() {
            delivery.customer_feedback = feedback;
        }
        self.persist(&mut delivery).await?;

        info!(delivery_id = %id, rating, "customer rating recorded");
        Ok(delivery)
    }

    #[instrument(skip(self))]
    pub async fn update_estimated_times(
        &self,
        id: Uuid,
        estimated_pickup_time: Option<DateTime<Utc>>,
        estimated_delivery_time: Option<DateTime<Utc>>,
    ) -> Result<Delivery, ServiceError> {
        if estimated_pickup_time.is_none() && estimated_delivery_time.is_none() {
            return Err(ServiceError::BadRequest(
                "estimated_pickup_time or estimated_delivery_time is required".into(),
            ));
        }

        let mut delivery = self.get_delivery(id).await?;
        if estimated_pickup_time.is_some() {
            delivery.estimated_pickup_time = estimated_pickup_time;
        }
        if estimated_delivery_time.is_some() {
            delivery.estimated_delivery_time = estimated_delivery_time;
        }
        self.persist(&mut delivery).await?;

        info!(delivery_id = %id, "delivery estimates updated");
        Ok(delivery)
    }

    #[instrument(skip(self))]
    pub async fn cancel_delivery(
        &self,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Delivery, ServiceError> {
        let mut delivery = self.get_delivery(id).await?;
        if delivery.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Delivery cannot be cancelled in its current status: {}",
                delivery.status
            )));
        }

        delivery.apply_status(DeliveryStatus::Cancelled, Utc::now());
        delivery.cancellation_reason = reason.filter(|r| !r.trim().is_empty());
        self.persist(&mut delivery).await?;

        info!(delivery_id = %id, "delivery cancelled");
        Ok(delivery)
    }

    #[instrument(skip(self))]
    pub async fn delete_delivery(&self, id: Uuid) -> Result<(), ServiceError> {
        if self.deliveries.delete(id).await? == 0 {
            return Err(ServiceError::not_found("Delivery", id));
        }
        info!(delivery_id = %id, "delivery deleted");
        Ok(())
    }
}
