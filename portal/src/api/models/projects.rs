//! API request/response models for projects.

use crate::{
    db::models::projects::ProjectDBResponse,
    lifecycle::project::{PaymentStatus, ProjectStatus},
    money::{Currency, Money},
    types::{ProjectId, RequestId, UserId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProjectId,
    #[schema(value_type = String, format = "uuid")]
    pub request_id: RequestId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub website_type: String,
    pub features: Vec<String>,
    /// Display form of the budget, e.g. `£150`
    pub budget: String,
    /// Budget in minor units
    pub budget_amount: i64,
    pub currency: Currency,
    pub deadline: NaiveDate,
    pub design_preferences: Option<String>,
    pub additional_notes: Option<String>,
    pub status: ProjectStatus,
    pub payment_status: PaymentStatus,
    pub client_approved: bool,
    pub client_feedback: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Last installment received, in minor units
    pub payment_amount: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<ProjectDBResponse> for ProjectResponse {
    fn from(db: ProjectDBResponse) -> Self {
        Self {
            budget: Money::new(db.budget, db.currency).to_string(),
            budget_amount: db.budget,
            id: db.id,
            request_id: db.request_id,
            user_id: db.user_id,
            user_email: db.user_email,
            user_name: db.user_name,
            website_type: db.website_type,
            features: db.features,
            currency: db.currency,
            deadline: db.deadline,
            design_preferences: db.design_preferences,
            additional_notes: db.additional_notes,
            status: db.status,
            payment_status: db.payment_status,
            client_approved: db.client_approved,
            client_feedback: db.client_feedback,
            checkout_session_id: db.checkout_session_id,
            payment_intent_id: db.payment_intent_id,
            payment_amount: db.payment_amount,
            paid_at: db.paid_at,
            created_at: db.created_at,
            approved_at: db.approved_at,
            completed_at: db.completed_at,
            cancelled_at: db.cancelled_at,
        }
    }
}

/// Admin move to the next stage, or to `cancelled`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAdvance {
    pub status: ProjectStatus,
}

/// Client sign-off during review
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientApproval {
    pub feedback: Option<String>,
}
