//! Gateway event payloads.
//!
//! Only the fields the portal acts on are modelled; everything else in the gateway's objects is
//! ignored during deserialization.

use serde::Deserialize;
use std::collections::HashMap;

use crate::money::{Currency, Money, MoneyError};

/// Envelope common to every gateway event
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The event types the portal handles, with their typed payloads
#[derive(Debug, Clone)]
pub enum EventKind {
    CheckoutCompleted(CheckoutSessionObject),
    PaymentIntentSucceeded(PaymentIntentObject),
    TransferCreated(TransferObject),
    TransferPaid(TransferObject),
    Unhandled,
}

impl GatewayEvent {
    pub const CHECKOUT_COMPLETED: &'static str = "checkout.session.completed";
    pub const PAYMENT_INTENT_SUCCEEDED: &'static str = "payment_intent.succeeded";
    pub const TRANSFER_CREATED: &'static str = "transfer.created";
    pub const TRANSFER_PAID: &'static str = "transfer.paid";

    /// Decode the payload according to the event type
    pub fn kind(&self) -> Result<EventKind, serde_json::Error> {
        let object = || self.data.object.clone();
        Ok(match self.event_type.as_str() {
            Self::CHECKOUT_COMPLETED => EventKind::CheckoutCompleted(serde_json::from_value(object())?),
            Self::PAYMENT_INTENT_SUCCEEDED => EventKind::PaymentIntentSucceeded(serde_json::from_value(object())?),
            Self::TRANSFER_CREATED => EventKind::TransferCreated(serde_json::from_value(object())?),
            Self::TRANSFER_PAID => EventKind::TransferPaid(serde_json::from_value(object())?),
            _ => EventKind::Unhandled,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

impl CheckoutSessionObject {
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn total(&self) -> Result<Option<Money>, MoneyError> {
        match (self.amount_total, self.currency.as_deref()) {
            (Some(amount), Some(code)) => Ok(Some(Money::new(amount, code.parse::<Currency>()?))),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub transfer_group: Option<String>,
    /// Present on current API versions
    pub latest_charge: Option<String>,
    /// Present on older API versions
    pub charges: Option<ChargeList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeList {
    #[serde(default)]
    pub data: Vec<ChargeObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
}

impl PaymentIntentObject {
    pub fn amount(&self) -> Result<Money, MoneyError> {
        Ok(Money::new(self.amount, self.currency.parse()?))
    }

    /// Charge that payout transfers are funded from
    pub fn source_charge(&self) -> Option<&str> {
        self.latest_charge
            .as_deref()
            .or_else(|| self.charges.as_ref()?.data.first().map(|c| c.id.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferObject {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    pub transfer_group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> GatewayEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "object": "event",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_checkout_completed() {
        let e = event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "object": "checkout.session",
                "metadata": {"projectId": "p", "type": "initial_payment"},
                "payment_intent": "pi_1",
                "amount_total": 7500,
                "currency": "gbp"
            }),
        );
        let EventKind::CheckoutCompleted(session) = e.kind().unwrap() else {
            panic!("wrong kind");
        };
        assert_eq!(session.metadata("type"), Some("initial_payment"));
        assert_eq!(session.total().unwrap(), Some(Money::new(7500, Currency::Gbp)));
    }

    #[test]
    fn test_source_charge_prefers_latest_charge() {
        let e = event(
            "payment_intent.succeeded",
            json!({"id": "pi_1", "amount": 1001, "currency": "gbp", "latest_charge": "ch_new",
                   "charges": {"data": [{"id": "ch_old"}]}}),
        );
        let EventKind::PaymentIntentSucceeded(intent) = e.kind().unwrap() else {
            panic!("wrong kind");
        };
        assert_eq!(intent.source_charge(), Some("ch_new"));

        let legacy: PaymentIntentObject =
            serde_json::from_value(json!({"id": "pi_2", "amount": 1, "currency": "gbp", "charges": {"data": [{"id": "ch_old"}]}}))
                .unwrap();
        assert_eq!(legacy.source_charge(), Some("ch_old"));
    }

    #[test]
    fn test_unknown_type_is_unhandled() {
        let e = event("customer.created", json!({"id": "cus_1"}));
        assert!(matches!(e.kind().unwrap(), EventKind::Unhandled));
    }

    #[test]
    fn test_malformed_object_is_an_error() {
        let e = event("transfer.created", json!({"id": "tr_1"}));
        assert!(e.kind().is_err());
    }
}
