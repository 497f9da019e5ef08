//! Database models for invoices.

use crate::{
    lifecycle::invoice::{self, InvoiceStatus},
    money::{Currency, Money},
    types::{InvoiceId, ProjectId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

/// A billed line, stored inside the invoice's `items` JSONB column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: i64,
    /// Price per unit in minor units
    pub unit_price: i64,
    /// `quantity * unit_price` in minor units
    pub amount: i64,
}

/// Database request for creating an invoice
#[derive(Debug, Clone)]
pub struct InvoiceCreateDBRequest {
    pub invoice_number: String,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub project_id: Option<ProjectId>,
    pub amount: i64,
    pub currency: Currency,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
}

/// Status update guarded by the status it was checked against
#[derive(Debug, Clone)]
pub struct InvoiceUpdateDBRequest {
    pub expected_status: InvoiceStatus,
    pub status: InvoiceStatus,
    pub paid_date: Option<DateTime<Utc>>,
}

/// Database response for an invoice
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceDBResponse {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub project_id: Option<ProjectId>,
    pub amount: i64,
    pub currency: Currency,
    pub status: InvoiceStatus,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub items: Json<Vec<InvoiceItem>>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceDBResponse {
    pub fn total(&self) -> Money {
        Money::new(self.amount, self.currency)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        invoice::is_overdue(self.status, self.due_date, now)
    }
}
