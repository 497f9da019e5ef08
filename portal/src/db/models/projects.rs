//! Database models for projects.

use super::requests::RequestDBResponse;
use crate::{
    lifecycle::project::{PaymentStatus, ProjectSnapshot, ProjectStatus},
    money::{Currency, Money},
    types::{ProjectId, RequestId, UserId},
};
use chrono::{DateTime, NaiveDate, Utc};

/// Database request for creating a project from an approved request
#[derive(Debug, Clone)]
pub struct ProjectCreateDBRequest {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub website_type: String,
    pub features: Vec<String>,
    pub budget: i64,
    pub currency: Currency,
    pub deadline: NaiveDate,
    pub design_preferences: Option<String>,
    pub additional_notes: Option<String>,
}

impl ProjectCreateDBRequest {
    /// Carry the request's fields over, with the admin's quote as the budget
    pub fn from_request(request: &RequestDBResponse, budget: Money) -> Self {
        Self {
            request_id: request.id,
            user_id: request.user_id,
            user_email: request.user_email.clone(),
            user_name: request.user_name.clone(),
            website_type: request.website_type.clone(),
            features: request.features.clone(),
            budget: budget.amount_minor,
            currency: budget.currency,
            deadline: request.deadline,
            design_preferences: request.design_preferences.clone(),
            additional_notes: request.additional_notes.clone(),
        }
    }
}

/// Database request for updating a project.
///
/// `payment_status` is merged monotonically: a write never moves it backwards. When
/// `expected_status` is set the write only applies if the stored status still matches it.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdateDBRequest {
    pub expected_status: Option<ProjectStatus>,
    pub status: Option<ProjectStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub client_approved: Option<bool>,
    pub client_feedback: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_amount: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Database response for a project
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectDBResponse {
    pub id: ProjectId,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub website_type: String,
    pub features: Vec<String>,
    pub budget: i64,
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
    pub payment_amount: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl ProjectDBResponse {
    pub fn budget(&self) -> Money {
        Money::new(self.budget, self.currency)
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            status: self.status,
            payment_status: self.payment_status,
            client_approved: self.client_approved,
        }
    }

    /// Gateway transfer group tying payments for this project to their payouts
    pub fn transfer_group(&self) -> String {
        format!("project_{}", self.id)
    }
}
