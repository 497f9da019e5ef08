//! Database models for client project requests.

use crate::{
    lifecycle::request::RequestStatus,
    money::{Currency, Money},
    types::{RequestId, UserId},
};
use chrono::{DateTime, NaiveDate, Utc};

/// Database request for a new client submission
#[derive(Debug, Clone)]
pub struct RequestCreateDBRequest {
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub website_type: String,
    pub features: Vec<String>,
    pub deadline: NaiveDate,
    pub budget: String,
    pub design_preferences: Option<String>,
    pub additional_notes: Option<String>,
    pub currency: Currency,
}

/// Admin triage update.
///
/// When `expected_status` is set the write only applies if the stored status still matches it.
#[derive(Debug, Clone, Default)]
pub struct RequestUpdateDBRequest {
    pub expected_status: Option<RequestStatus>,
    pub status: Option<RequestStatus>,
    pub quoted_budget: Option<i64>,
    pub currency: Option<Currency>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub held_at: Option<DateTime<Utc>>,
    pub held_by: Option<UserId>,
    pub hold_reason: Option<String>,
}

impl RequestUpdateDBRequest {
    pub fn approve(from: RequestStatus, to: RequestStatus, quoted: Money, by: UserId, at: DateTime<Utc>) -> Self {
        Self {
            expected_status: Some(from),
            status: Some(to),
            quoted_budget: Some(quoted.amount_minor),
            currency: Some(quoted.currency),
            approved_at: Some(at),
            approved_by: Some(by),
            ..Default::default()
        }
    }

    pub fn reject(from: RequestStatus, to: RequestStatus, reason: String, by: UserId, at: DateTime<Utc>) -> Self {
        Self {
            expected_status: Some(from),
            status: Some(to),
            rejected_at: Some(at),
            rejected_by: Some(by),
            rejection_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn hold(from: RequestStatus, to: RequestStatus, reason: String, by: UserId, at: DateTime<Utc>) -> Self {
        Self {
            expected_status: Some(from),
            status: Some(to),
            held_at: Some(at),
            held_by: Some(by),
            hold_reason: Some(reason),
            ..Default::default()
        }
    }
}

/// Database response for a request
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestDBResponse {
    pub id: RequestId,
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
    pub quoted_budget: Option<i64>,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub held_at: Option<DateTime<Utc>>,
    pub held_by: Option<UserId>,
    pub hold_reason: Option<String>,
}

impl RequestDBResponse {
    pub fn quoted_budget(&self) -> Option<Money> {
        self.quoted_budget.map(|amount| Money::new(amount, self.currency))
    }
}
