use super::TransitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceAction {
    Send,
    MarkPaid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
        }
    }

    /// `draft -> sent -> paid`
    pub fn apply(self, action: InvoiceAction) -> Result<InvoiceStatus, TransitionError> {
        match (self, action) {
            (InvoiceStatus::Draft, InvoiceAction::Send) => Ok(InvoiceStatus::Sent),
            (InvoiceStatus::Sent, InvoiceAction::MarkPaid) => Ok(InvoiceStatus::Paid),
            (from, action) => Err(TransitionError::NotAllowed {
                entity: "invoice",
                action: match action {
                    InvoiceAction::Send => "send",
                    InvoiceAction::MarkPaid => "mark as paid",
                },
                from: from.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overdue is a label, not a state: a sent invoice whose due date has passed
pub fn is_overdue(status: InvoiceStatus, due_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    status == InvoiceStatus::Sent && due_date < now
}
