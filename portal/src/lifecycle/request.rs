use super::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    #[sqlx(rename = "on hold")]
    #[serde(rename = "on hold")]
    OnHold,
}

/// Admin triage actions on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Approve,
    Reject,
    Hold,
}

impl RequestAction {
    fn verb(&self) -> &'static str {
        match self {
            RequestAction::Approve => "approve",
            RequestAction::Reject => "reject",
            RequestAction::Hold => "hold",
        }
    }
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::OnHold => "on hold",
        }
    }

    /// `pending|on hold -> approved|rejected`, `pending -> on hold`
    pub fn apply(self, action: RequestAction) -> Result<RequestStatus, TransitionError> {
        use RequestAction::*;
        use RequestStatus::*;

        match (self, action) {
            (Pending | OnHold, Approve) => Ok(Approved),
            (Pending | OnHold, Reject) => Ok(Rejected),
            (Pending, Hold) => Ok(OnHold),
            (from, action) => Err(TransitionError::NotAllowed {
                entity: "request",
                action: action.verb(),
                from: from.as_str().to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }

    /// Clients may withdraw a request only before it has been triaged
    pub fn ensure_deletable(&self) -> Result<(), TransitionError> {
        if *self == RequestStatus::Pending {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                entity: "request",
                action: "delete",
                from: self.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
