//! API request/response models for invoices.

use crate::{
    db::models::invoices::{InvoiceDBResponse, InvoiceItem},
    lifecycle::invoice::InvoiceStatus,
    money::Currency,
    types::{InvoiceId, ProjectId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemCreate {
    pub description: String,
    pub quantity: i64,
    /// Minor units
    pub unit_price: i64,
}

/// Admin invoice creation. The total is computed from the line items.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCreate {
    /// Client being billed
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub project_id: Option<ProjectId>,
    /// Generated as `INV-{date}-{suffix}` when absent
    pub invoice_number: Option<String>,
    /// Defaults to the configured currency
    pub currency: Option<Currency>,
    /// Defaults to now
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub items: Vec<InvoiceItemCreate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: InvoiceId,
    pub invoice_number: String,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub project_id: Option<ProjectId>,
    /// Minor units
    pub amount: i64,
    pub currency: Currency,
    /// e.g. `£1,250.50`
    pub formatted_amount: String,
    pub status: InvoiceStatus,
    /// `overdue` for sent invoices past their due date, otherwise the status
    pub display_status: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub items: Vec<InvoiceItem>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceResponse {
    pub fn from_db(db: InvoiceDBResponse, now: DateTime<Utc>) -> Self {
        let display_status = if db.is_overdue(now) {
            "overdue".to_string()
        } else {
            db.status.to_string()
        };
        Self {
            formatted_amount: db.total().to_string(),
            display_status,
            id: db.id,
            invoice_number: db.invoice_number,
            user_id: db.user_id,
            user_name: db.user_name,
            user_email: db.user_email,
            project_id: db.project_id,
            amount: db.amount,
            currency: db.currency,
            status: db.status,
            issue_date: db.issue_date,
            due_date: db.due_date,
            paid_date: db.paid_date,
            items: db.items.0,
            created_at: db.created_at,
        }
    }
}

/// Totals across invoices in the reporting currency, in minor units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStats {
    pub currency: Currency,
    /// Sum of sent, unpaid invoices
    pub outstanding: i64,
    pub paid: i64,
    pub overdue_count: usize,
    pub draft_count: usize,
}
