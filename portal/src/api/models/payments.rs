//! API response models for payments and payout transfers.

use crate::{
    db::models::{payments::PaymentDBResponse, transfers::TransferDBResponse},
    lifecycle::payment::{PaymentRecordStatus, PaymentType, TransferStatus},
    money::Currency,
    types::{InvoiceId, PaymentId, ProjectId, TransferId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PaymentId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Minor units
    pub amount: i64,
    pub currency: Currency,
    pub formatted_amount: String,
    pub status: PaymentRecordStatus,
    pub payment_method: String,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub invoice_id: Option<InvoiceId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub project_id: Option<ProjectId>,
    pub stripe_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentDBResponse> for PaymentResponse {
    fn from(db: PaymentDBResponse) -> Self {
        Self {
            formatted_amount: db.total().to_string(),
            id: db.id,
            user_id: db.user_id,
            amount: db.amount,
            currency: db.currency,
            status: db.status,
            payment_method: db.payment_method,
            payment_type: db.payment_type,
            invoice_id: db.invoice_id,
            project_id: db.project_id,
            stripe_id: db.stripe_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TransferId,
    /// Gateway transfer id
    pub transfer_id: String,
    pub amount: i64,
    pub currency: Currency,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<TransferDBResponse> for TransferResponse {
    fn from(db: TransferDBResponse) -> Self {
        Self {
            id: db.id,
            transfer_id: db.transfer_id,
            amount: db.amount,
            currency: db.currency,
            destination: db.destination,
            transfer_group: db.transfer_group,
            status: db.status,
            created_at: db.created_at,
            paid_at: db.paid_at,
        }
    }
}
