//! API models for the admin overview.

use super::projects::ProjectResponse;
use crate::money::Currency;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub total_users: usize,
    pub total_projects: usize,
    pub total_invoices: usize,
    /// Sum of paid invoices in the reporting currency, minor units
    pub revenue: i64,
    pub currency: Currency,
    pub formatted_revenue: String,
    /// Five most recently created projects
    pub recent_projects: Vec<ProjectResponse>,
}
