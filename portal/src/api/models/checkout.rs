//! API models for hosted checkout.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /api/create-checkout-session`.
///
/// Every field is optional at the wire level so that missing fields produce the endpoint's own
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSession {
    #[schema(format = "uuid")]
    pub project_id: Option<String>,
    /// Installment in minor units; must equal the amount currently due
    pub amount: Option<i64>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    /// Hosted checkout page to redirect the browser to
    pub url: Option<String>,
}
