//! Inbound payment gateway webhooks.
//!
//! - [`signing`]: HMAC-SHA256 verification of the `stripe-signature` header
//! - [`events`]: Typed payloads for the event types the portal consumes
//! - [`service`]: Idempotent processing: checkout completion, fund split, transfer mirroring

pub mod events;
pub mod service;
pub mod signing;

pub use events::GatewayEvent;
pub use service::{Outcome, WebhookError, WebhookProcessor};
pub use signing::{sign_payload, verify_signature};
