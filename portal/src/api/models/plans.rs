//! API models for the plan suggester.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestPlanRequest {
    pub project_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuggestPlanResponse {
    pub text: String,
}

/// This endpoint reports failures as `{"error": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuggestPlanError {
    pub error: String,
}
