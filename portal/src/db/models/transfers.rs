//! Database models for gateway payout transfers.

use crate::{lifecycle::payment::TransferStatus, money::Currency, types::TransferId};
use chrono::{DateTime, Utc};

/// Insert-or-update keyed on the gateway's transfer id.
///
/// An existing record keeps the furthest status seen and its first `paid_at`.
#[derive(Debug, Clone)]
pub struct TransferUpsertDBRequest {
    pub transfer_id: String,
    pub amount: i64,
    pub currency: Currency,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub status: TransferStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Database response for a transfer
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransferDBResponse {
    pub id: TransferId,
    pub transfer_id: String,
    pub amount: i64,
    pub currency: Currency,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}
