//! API request/response models for client project requests.

use super::projects::ProjectResponse;
use crate::{
    db::models::requests::RequestDBResponse,
    lifecycle::request::RequestStatus,
    money::Money,
    types::{RequestId, UserId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Website type that takes its real value from `otherWebsiteType`
pub const OTHER_WEBSITE_TYPE: &str = "Other";

/// A client's project submission
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestCreate {
    pub website_type: String,
    /// Required when `websiteType` is `Other`
    pub other_website_type: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub deadline: NaiveDate,
    /// Free-text budget as the client wrote it, e.g. `£150-£200`
    pub budget: String,
    pub design_preferences: Option<String>,
    pub additional_notes: Option<String>,
}

impl RequestCreate {
    /// The website type to store, resolving `Other`
    pub fn resolved_website_type(&self) -> Option<String> {
        let chosen = if self.website_type == OTHER_WEBSITE_TYPE {
            self.other_website_type.as_deref().unwrap_or_default()
        } else {
            &self.website_type
        };
        let chosen = chosen.trim();
        (!chosen.is_empty()).then(|| chosen.to_string())
    }
}

/// Admin approval with the quoted price, e.g. `£150` or `1,250.50 GBP`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestApprove {
    pub quoted_budget: String,
}

/// Reason recorded when rejecting or holding a request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestTriage {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: RequestId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub website_type: String,
    pub features: Vec<String>,
    pub deadline: NaiveDate,
    pub budget: String,
    pub design_preferences: Option<String>,
    pub additional_notes: Option<String>,
    pub status: RequestStatus,
    /// The admin's quote, formatted for display
    pub quoted_budget: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub approved_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub held_at: Option<DateTime<Utc>>,
    pub hold_reason: Option<String>,
}

impl From<RequestDBResponse> for RequestResponse {
    fn from(db: RequestDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            user_email: db.user_email,
            user_name: db.user_name,
            website_type: db.website_type,
            features: db.features,
            deadline: db.deadline,
            budget: db.budget,
            design_preferences: db.design_preferences,
            additional_notes: db.additional_notes,
            status: db.status,
            quoted_budget: db.quoted_budget.map(|minor| Money::new(minor, db.currency).to_string()),
            created_at: db.created_at,
            approved_at: db.approved_at,
            approved_by: db.approved_by,
            rejected_at: db.rejected_at,
            rejection_reason: db.rejection_reason,
            held_at: db.held_at,
            hold_reason: db.hold_reason,
        }
    }
}

/// Result of approving a request: the updated request and the project created from it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestApproval {
    pub request: RequestResponse,
    pub project: ProjectResponse,
}
