use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{Order, PaymentStatus},
    payments::{
        from_minor_units, to_minor_units, CheckoutLineItem, CreateCheckoutSession,
        CreatePaymentIntent, CreateRefund, PaymentIntent, PaymentIntentStatus, PaymentProcessor,
        RefundReason, WebhookEvent, METADATA_ORDER_ID, METADATA_ORDER_NUMBER, METADATA_USER_EMAIL,
    },
    store::{DocumentStore, Repository},
};

/// Webhook and currency settings taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct PaymentSettings {
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub default_currency: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentIntentInput {
    pub order_id: Uuid,
    /// Major units; the order total when omitted.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentCreated {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub order: Order,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub payment_intent_id: String,
    pub intent_status: PaymentIntentStatus,
    pub order: Order,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefundInput {
    pub order_id: Uuid,
    /// Partial refund in major units; the full payment when omitted.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<RefundReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub amount: Decimal,
    pub status: String,
    pub order: Order,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentDetails {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub intent: PaymentIntent,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutSessionInput {
    pub order_id: Uuid,
    #[validate(url)]
    pub success_url: String,
    #[validate(url)]
    pub cancel_url: String,
    #[serde(default)]
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionCreated {
    pub session_id: String,
    pub url: Option<String>,
    pub order: Order,
}

/// What a webhook delivery did. Unhandled event types are acknowledged
/// with `handled == false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub event_id: String,
    pub event_type: String,
    pub handled: bool,
    pub order_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
}

/// Reconciles order payment status with the payment processor.
#[derive(Clone)]
pub struct PaymentService {
    orders: Repository<Order>,
    processor: Arc<dyn PaymentProcessor>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        processor: Arc<dyn PaymentProcessor>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders: Repository::new(store),
            processor,
            settings,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.processor.provider_name()
    }

    async fn get_order(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    fn currency_or_default(&self, currency: Option<String>) -> String {
        currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_currency.clone())
            .to_lowercase()
    }

    /// Writes processor-side state onto the order after the processor call
    /// already succeeded; a failed write is reported as a partial failure.
    async fn persist_after_processor(
        &self,
        order: &mut Order,
        what: &str,
    ) -> Result<(), ServiceError> {
        match self.orders.save(order).await {
            Ok(1) => Ok(()),
            Ok(_) => Err(ServiceError::PartialFailure(format!(
                "{} succeeded but order {} no longer exists",
                what, order.id
            ))),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "{} succeeded but the order update failed", what);
                Err(ServiceError::PartialFailure(format!(
                    "{} succeeded but order {} could not be updated",
                    what, order.id
                )))
            }
        }
    }

    /// Moves `order_id` to `target` when the payment machine allows it.
    /// Disallowed moves (e.g. a late failure after payment) are skipped.
    async fn reconcile(
        &self,
        order_id: Uuid,
        target: PaymentStatus,
    ) -> Result<Option<Order>, ServiceError> {
        let Some(mut order) = self.orders.find_by_id(order_id).await? else {
            warn!(order_id = %order_id, "payment event references an unknown order");
            return Ok(None);
        };
        if order.payment_status == target {
            return Ok(Some(order));
        }
        if !order.payment_status.can_transition_to(target) {
            warn!(
                order_id = %order_id,
                from = %order.payment_status,
                to = %target,
                "skipping payment status change not allowed from current status"
            );
            return Ok(Some(order));
        }

        let previous = order.payment_status;
        order.payment_status = target;
        if self.orders.save(&mut order).await? == 0 {
            return Err(ServiceError::not_found("Order", order_id));
        }
        info!(order_id = %order_id, from = %previous, to = %target, "payment status reconciled");
        Ok(Some(order))
    }

    /// Opens a payment intent for an order and remembers its id.
    /// Does not change the order's payment status.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create_payment_intent(
        &self,
        input: CreatePaymentIntentInput,
    ) -> Result<PaymentIntentCreated, ServiceError> {
        input.validate()?;
        let mut order = self.get_order(input.order_id).await?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::Conflict("Order is already paid".into()));
        }

        let amount = input.amount.unwrap_or(order.total_amount);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::BadRequest(
                "amount must be greater than 0".into(),
            ));
        }
        let currency = self.currency_or_default(input.currency);

        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_ORDER_ID.to_string(), order.id.to_string());
        metadata.insert(METADATA_ORDER_NUMBER.to_string(), order.order_number.clone());
        metadata.insert(METADATA_USER_EMAIL.to_string(), order.user_email.clone());

        let intent = self
            .processor
            .create_payment_intent(CreatePaymentIntent {
                amount_minor: to_minor_units(amount)?,
                currency: currency.clone(),
                description: input
                    .description
                    .or_else(|| Some(format!("Order {}", order.order_number))),
                metadata,
            })
            .await?;

        order.payment_intent_id = Some(intent.id.clone());
        order.payment_method = self.processor.provider_name().to_string();
        self.persist_after_processor(&mut order, "Payment intent creation")
            .await?;

        info!(order_id = %order.id, payment_intent_id = %intent.id, "payment intent created");
        Ok(PaymentIntentCreated {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount,
            currency,
            order,
        })
    }

    /// Pulls the intent from the processor and applies its outcome.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentConfirmation, ServiceError> {
        if payment_intent_id.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "payment_intent_id is required".into(),
            ));
        }

        let intent = self
            .processor
            .retrieve_payment_intent(payment_intent_id)
            .await?;
        let order_id = intent.order_id().ok_or_else(|| {
            ServiceError::BadRequest("Order ID not found in payment metadata".into())
        })?;

        let order = match intent_outcome(intent.status) {
            Some(target) => self
                .reconcile(order_id, target)
                .await?
                .ok_or_else(|| ServiceError::not_found("Order", order_id))?,
            None => self.get_order(order_id).await?,
        };

        Ok(PaymentConfirmation {
            payment_intent_id: intent.id,
            intent_status: intent.status,
            order,
        })
    }

    /// Verifies and applies one processor webhook delivery.
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let secret = self
            .settings
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Webhook secret not configured".into()))?;
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Missing webhook signature header".into()))?;

        let event = self.processor.construct_event(
            payload,
            signature,
            secret,
            self.settings.webhook_tolerance_secs,
        )?;
        info!(event_id = %event.id, event_type = %event.event_type, "webhook received");

        self.apply_event(event).await
    }

    async fn apply_event(&self, event: WebhookEvent) -> Result<WebhookOutcome, ServiceError> {
        let target = match event.event_type.as_str() {
            "payment_intent.succeeded" => Some(PaymentStatus::Paid),
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                Some(PaymentStatus::Failed)
            }
            "charge.refunded" => Some(PaymentStatus::Refunded),
            other => {
                info!(event_type = %other, "unhandled webhook event type");
                None
            }
        };

        let mut outcome = WebhookOutcome {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            handled: false,
            order_id: None,
            payment_status: None,
        };
        let Some(target) = target else {
            return Ok(outcome);
        };

        let order_id = if target == PaymentStatus::Refunded {
            self.order_id_for_charge(&event).await?
        } else {
            let intent: PaymentIntent = serde_json::from_value(event.data.object.clone())?;
            intent.order_id()
        };
        let Some(order_id) = order_id else {
            warn!(event_id = %event.id, "webhook event carries no order reference");
            return Ok(outcome);
        };

        if let Some(order) = self.reconcile(order_id, target).await? {
            outcome.handled = true;
            outcome.order_id = Some(order.id);
            outcome.payment_status = Some(order.payment_status);
        }
        Ok(outcome)
    }

    /// A refunded charge only names its intent; the order id lives on the intent.
    async fn order_id_for_charge(&self, event: &WebhookEvent) -> Result<Option<Uuid>, ServiceError> {
        let Some(intent_id) = event
            .data
            .object
            .get("payment_intent")
            .and_then(|v| v.as_str())
        else {
            return Ok(None);
        };
        let intent = self.processor.retrieve_payment_intent(intent_id).await?;
        Ok(intent.order_id())
    }

    /// Refunds all or part of an order's payment. Only `paid` orders can
    /// be refunded.
    ///
    /// Any successful refund, partial or full, leaves the order `refunded`.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn refund_payment(&self, input: RefundInput) -> Result<RefundOutcome, ServiceError> {
        let mut order = self.get_order(input.order_id).await?;
        let Some(intent_id) = order.payment_intent_id.clone() else {
            return Err(ServiceError::BadRequest(
                "No payment found for this order".into(),
            ));
        };
        if order.payment_status == PaymentStatus::Refunded {
            return Err(ServiceError::Conflict("Order already refunded".into()));
        }
        if !order.payment_status.can_transition_to(PaymentStatus::Refunded) {
            return Err(ServiceError::Conflict(format!(
                "Cannot refund a payment that is {}",
                order.payment_status
            )));
        }
        if input.amount.is_some_and(|a| a <= Decimal::ZERO) {
            return Err(ServiceError::BadRequest(
                "refund amount must be greater than 0".into(),
            ));
        }

        let amount_minor = input.amount.map(to_minor_units).transpose()?;
        let refund = self
            .processor
            .create_refund(CreateRefund {
                payment_intent_id: intent_id,
                amount_minor,
                reason: input.reason,
            })
            .await?;

        order.payment_status = PaymentStatus::Refunded;
        self.persist_after_processor(&mut order, "Refund").await?;

        info!(order_id = %order.id, refund_id = %refund.id, amount = refund.amount, "payment refunded");
        Ok(RefundOutcome {
            refund_id: refund.id,
            amount: from_minor_units(refund.amount),
            status: refund.status,
            order,
        })
    }

    /// Cancels the order's open intent and marks the payment failed.
    #[instrument(skip(self))]
    pub async fn cancel_payment(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.get_order(order_id).await?;
        let Some(intent_id) = order.payment_intent_id.as_deref() else {
            return Err(ServiceError::BadRequest(
                "No payment found for this order".into(),
            ));
        };
        if matches!(
            order.payment_status,
            PaymentStatus::Paid | PaymentStatus::Refunded
        ) {
            return Err(ServiceError::Conflict(format!(
                "Payment is already {}",
                order.payment_status
            )));
        }

        self.processor.cancel_payment_intent(intent_id).await?;
        self.reconcile(order_id, PaymentStatus::Failed)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))
    }

    pub async fn get_payment_details(&self, order_id: Uuid) -> Result<PaymentDetails, ServiceError> {
        let order = self.get_order(order_id).await?;
        let intent_id = order
            .payment_intent_id
            .as_deref()
            .ok_or_else(|| ServiceError::NotFound("No payment found for this order".into()))?;
        let intent = self.processor.retrieve_payment_intent(intent_id).await?;

        Ok(PaymentDetails {
            order_id: order.id,
            order_number: order.order_number,
            payment_status: order.payment_status,
            amount: from_minor_units(intent.amount),
            currency: intent.currency.clone(),
            intent,
        })
    }

    /// Hosted checkout for the order's items plus a delivery-fee line.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create_checkout_session(
        &self,
        input: CheckoutSessionInput,
    ) -> Result<CheckoutSessionCreated, ServiceError> {
        input.validate()?;
        let mut order = self.get_order(input.order_id).await?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::Conflict("Order is already paid".into()));
        }

        let mut line_items = order
            .items
            .iter()
            .map(|item| -> Result<CheckoutLineItem, ServiceError> {
                Ok(CheckoutLineItem {
                    name: item.name.clone(),
                    unit_amount_minor: to_minor_units(item.price)?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;
        if order.delivery_fee > Decimal::ZERO {
            line_items.push(CheckoutLineItem {
                name: "Delivery Fee".to_string(),
                unit_amount_minor: to_minor_units(order.delivery_fee)?,
                quantity: 1,
            });
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_ORDER_ID.to_string(), order.id.to_string());
        metadata.insert(METADATA_ORDER_NUMBER.to_string(), order.order_number.clone());

        let session = self
            .processor
            .create_checkout_session(CreateCheckoutSession {
                currency: self.currency_or_default(input.currency),
                line_items,
                success_url: input.success_url,
                cancel_url: input.cancel_url,
                client_reference_id: Some(order.id.to_string()),
                metadata,
            })
            .await?;

        order.checkout_session_id = Some(session.id.clone());
        self.persist_after_processor(&mut order, "Checkout session creation")
            .await?;

        info!(order_id = %order.id, session_id = %session.id, "checkout session created");
        Ok(CheckoutSessionCreated {
            session_id: session.id,
            url: session.url,
            order,
        })
    }
}

/// Payment status implied by a processor intent status, if any.
fn intent_outcome(status: PaymentIntentStatus) -> Option<PaymentStatus> {
    match status {
        PaymentIntentStatus::Succeeded => Some(PaymentStatus::Paid),
        PaymentIntentStatus::Canceled => Some(PaymentStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_terminal_intent_statuses_change_payment_status() {
        assert_eq!(
            intent_outcome(PaymentIntentStatus::Succeeded),
            Some(PaymentStatus::Paid)
        );
        assert_eq!(
            intent_outcome(PaymentIntentStatus::Canceled),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(intent_outcome(PaymentIntentStatus::Processing), None);
        assert_eq!(intent_outcome(PaymentIntentStatus::RequiresAction), None);
        assert_eq!(intent_outcome(PaymentIntentStatus::Unknown), None);
    }
}
