//! Dummy payment provider implementation
//!
//! Never talks to a real gateway. Checkout sessions point at a fake hosted page and transfers are
//! recorded in memory, honouring idempotency keys the way a real gateway would. Useful for local
//! development and for exercising the payment flow in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use crate::{
    config::DummyConfig,
    payment_providers::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider, Result, TransferRequest},
};

#[derive(Debug, Default)]
struct Ledger {
    sessions: Vec<(String, CheckoutSessionRequest)>,
    transfers: Vec<(String, TransferRequest)>,
    by_idempotency_key: HashMap<String, String>,
    failing_destinations: HashMap<String, usize>,
}

pub struct DummyProvider {
    checkout_base_url: Url,
    ledger: Mutex<Ledger>,
}

impl From<DummyConfig> for DummyProvider {
    fn from(config: DummyConfig) -> Self {
        Self {
            checkout_base_url: config.checkout_base_url,
            ledger: Mutex::default(),
        }
    }
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::from(DummyConfig::default())
    }
}

impl DummyProvider {
    /// Checkout sessions created so far, oldest first
    pub async fn sessions(&self) -> Vec<(String, CheckoutSessionRequest)> {
        self.ledger.lock().await.sessions.clone()
    }

    /// Distinct transfers issued so far, oldest first
    pub async fn transfers(&self) -> Vec<(String, TransferRequest)> {
        self.ledger.lock().await.transfers.clone()
    }

    /// Make the next `count` transfers to `destination` fail with a provider error
    pub async fn fail_transfers_to(&self, destination: &str, count: usize) {
        self.ledger.lock().await.failing_destinations.insert(destination.to_string(), count);
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession> {
        let id = format!("cs_dummy_{}", Uuid::new_v4().simple());
        let url = self
            .checkout_base_url
            .join(&format!("pay/{id}"))
            .map_err(|e| PaymentError::InvalidData(e.to_string()))?;

        tracing::info!(
            "Dummy provider created checkout session {} for project {} ({})",
            id,
            request.project_id,
            request.amount
        );
        self.ledger.lock().await.sessions.push((id.clone(), request.clone()));

        Ok(CheckoutSession {
            id,
            url: Some(url.to_string()),
        })
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<String> {
        let mut ledger = self.ledger.lock().await;
        if let Some(remaining) = ledger.failing_destinations.get_mut(&request.destination)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(PaymentError::ProviderApi("simulated transfer failure".to_string()));
        }
        if let Some(existing) = ledger.by_idempotency_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let id = format!("tr_dummy_{}", Uuid::new_v4().simple());
        tracing::info!("Dummy provider transferred {} to {}", request.amount, request.destination);
        ledger.by_idempotency_key.insert(request.idempotency_key.clone(), id.clone());
        ledger.transfers.push((id.clone(), request.clone()));
        Ok(id)
    }
}
