//! Payment gateway abstraction.
//!
//! The portal needs two things from a gateway: hosted checkout sessions for project installments,
//! and transfers that pay each installment out to the two connected accounts. Incoming gateway
//! events are handled separately in [`crate::webhooks`].

use async_trait::async_trait;

use crate::{config::PaymentProviderConfig, lifecycle::payment::PaymentType, money::Money, types::ProjectId};

pub mod dummy;
pub mod stripe;

/// Create a payment provider from configuration
pub fn create_provider(config: &PaymentProviderConfig) -> Result<Box<dyn PaymentProvider>> {
    Ok(match config {
        PaymentProviderConfig::Stripe(stripe_config) => Box::new(stripe::StripeProvider::new(stripe_config)?),
        PaymentProviderConfig::Dummy(dummy_config) => Box::new(dummy::DummyProvider::from(dummy_config.clone())),
    })
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The gateway answered with an error
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    /// The gateway could not be reached
    #[error("Payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with something we could not interpret
    #[error("Invalid payment data: {0}")]
    InvalidData(String),
}

/// Parameters of a hosted checkout for one installment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub project_id: ProjectId,
    pub payment_type: PaymentType,
    pub amount: Money,
    pub customer_email: String,
    /// Shown on the hosted page under the product name
    pub description: String,
    /// Tag that ties the resulting payment intent to its payout transfers
    pub transfer_group: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A checkout session created at the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted page the client is redirected to
    pub url: Option<String>,
}

/// A payout of part of a settled payment to a connected account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount: Money,
    pub destination: String,
    pub transfer_group: String,
    /// Charge the funds are drawn from
    pub source_transaction: Option<String>,
    /// Repeating a request with the same key returns the original transfer instead of paying twice
    pub idempotency_key: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session for one installment
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession>;

    /// Issue a transfer; returns the gateway's transfer id
    async fn create_transfer(&self, request: &TransferRequest) -> Result<String>;
}
