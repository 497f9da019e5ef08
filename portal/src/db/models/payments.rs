//! Database models for payment records.

use crate::{
    lifecycle::payment::{PaymentRecordStatus, PaymentType},
    money::{Currency, Money},
    types::{InvoiceId, PaymentId, ProjectId, UserId},
};
use chrono::{DateTime, Utc};

/// Database request for recording a payment
#[derive(Debug, Clone)]
pub struct PaymentCreateDBRequest {
    pub user_id: UserId,
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentRecordStatus,
    pub payment_method: String,
    pub payment_type: PaymentType,
    pub invoice_id: Option<InvoiceId>,
    pub project_id: Option<ProjectId>,
    /// Gateway object the payment was settled through (checkout session id)
    pub stripe_id: String,
}

/// Status update guarded by the status it was checked against
#[derive(Debug, Clone)]
pub struct PaymentUpdateDBRequest {
    pub expected_status: PaymentRecordStatus,
    pub status: PaymentRecordStatus,
}

/// Database response for a payment
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentDBResponse {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentRecordStatus,
    pub payment_method: String,
    pub payment_type: PaymentType,
    pub invoice_id: Option<InvoiceId>,
    pub project_id: Option<ProjectId>,
    pub stripe_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentDBResponse {
    pub fn total(&self) -> Money {
        Money::new(self.amount, self.currency)
    }
}
