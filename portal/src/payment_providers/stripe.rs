//! Stripe payment provider implementation
//!
//! Talks to the Stripe REST API directly: requests are form-encoded, authenticated with the secret
//! key as a bearer token, and errors come back as `{"error": {"message": ...}}`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::{
    config::StripeConfig,
    payment_providers::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider, Result, TransferRequest},
    types::abbrev_uuid,
};

/// Product name shown on the hosted checkout page
const LINE_ITEM_NAME: &str = "Website Development Project";

pub struct StripeProvider {
    client: Client,
    api_key: String,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

impl StripeProvider {
    pub fn new(config: &StripeConfig) -> Result<Self> {
        Ok(Self {
            client: crate::build_http_client(config.timeout)?,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
        })
    }

    fn post(&self, path: &str, form: &[(String, String)]) -> Result<RequestBuilder> {
        let url = self
            .api_base
            .join(path)
            .map_err(|e| PaymentError::InvalidData(format!("bad Stripe endpoint {path}: {e}")))?;
        let body = serde_urlencoded::to_string(form).map_err(|e| PaymentError::InvalidData(e.to_string()))?;
        Ok(self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body))
    }

    /// Send a request and decode the success body, turning Stripe's error envelope into
    /// [`PaymentError::ProviderApi`]
    async fn send<T: for<'de> Deserialize<'de>>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<StripeErrorBody>(&bytes)
                .ok()
                .map(|body| match (body.error.kind, body.error.message) {
                    (Some(kind), Some(message)) => format!("{kind}: {message}"),
                    (None, Some(message)) => message,
                    (Some(kind), None) => kind,
                    (None, None) => status.to_string(),
                })
                .unwrap_or_else(|| status.to_string());
            return Err(PaymentError::ProviderApi(message));
        }

        serde_json::from_slice(&bytes).map_err(|e| PaymentError::InvalidData(format!("unexpected Stripe response: {e}")))
    }
}

fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let pairs = [
        ("mode", "payment".to_string()),
        ("payment_method_types[0]", "card".to_string()),
        ("customer_email", request.customer_email.clone()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", request.amount.currency.code().to_lowercase()),
        ("line_items[0][price_data][unit_amount]", request.amount.amount_minor.to_string()),
        ("line_items[0][price_data][product_data][name]", LINE_ITEM_NAME.to_string()),
        ("line_items[0][price_data][product_data][description]", request.description.clone()),
        ("metadata[projectId]", request.project_id.to_string()),
        ("metadata[type]", request.payment_type.metadata_tag().to_string()),
        ("payment_intent_data[transfer_group]", request.transfer_group.clone()),
        ("payment_intent_data[metadata][projectId]", request.project_id.to_string()),
    ];
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn transfer_form(request: &TransferRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount.amount_minor.to_string()),
        ("currency".to_string(), request.amount.currency.code().to_lowercase()),
        ("destination".to_string(), request.destination.clone()),
        ("transfer_group".to_string(), request.transfer_group.clone()),
    ];
    if let Some(charge) = &request.source_transaction {
        form.push(("source_transaction".to_string(), charge.clone()));
    }
    form
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    #[instrument(skip_all, fields(project_id = %abbrev_uuid(&request.project_id), payment_type = %request.payment_type))]
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession> {
        let form = checkout_form(request);
        let session: SessionResponse = Self::send(self.post("v1/checkout/sessions", &form)?).await?;
        info!("Created Stripe checkout session {} for {}", session.id, request.amount);

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    #[instrument(skip_all, fields(destination = %request.destination, transfer_group = %request.transfer_group))]
    async fn create_transfer(&self, request: &TransferRequest) -> Result<String> {
        let form = transfer_form(request);
        let builder = self
            .post("v1/transfers", &form)?
            .header("Idempotency-Key", request.idempotency_key.as_str());
        let transfer: TransferResponse = Self::send(builder).await?;
        debug!("Stripe transfer {} of {} created", transfer.id, request.amount);
        Ok(transfer.id)
    }
}
