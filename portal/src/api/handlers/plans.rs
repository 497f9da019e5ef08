use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::{
    AppState,
    api::models::plans::{SuggestPlanError, SuggestPlanRequest, SuggestPlanResponse},
};

fn failure(status: StatusCode, error: &str) -> Response {
    (status, Json(SuggestPlanError { error: error.to_string() })).into_response()
}

#[utoipa::path(
    post,
    path = "/suggest-plan",
    tag = "plans",
    summary = "Suggest a pricing plan",
    description = "Asks a language model which of the agency's three plans fits a project description.",
    request_body = SuggestPlanRequest,
    responses(
        (status = 200, description = "Suggestion", body = SuggestPlanResponse),
        (status = 400, description = "No project description", body = SuggestPlanError),
        (status = 500, description = "The language model failed", body = SuggestPlanError),
        (status = 503, description = "Plan suggestions are not configured", body = SuggestPlanError),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn suggest_plan(State(state): State<AppState>, Json(body): Json<SuggestPlanRequest>) -> Response {
    let Some(description) = body.project_description.as_deref().map(str::trim).filter(|d| !d.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "Project description is required");
    };
    let Some(suggester) = state.plan_suggester.as_ref() else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "Plan suggestions are not available");
    };

    match suggester.suggest(description).await {
        Ok(text) => Json(SuggestPlanResponse { text }).into_response(),
        Err(e) => {
            error!("Plan suggestion failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate suggestion")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PlanSuggesterConfig, db::MemoryStore, plans::PlanSuggester, test_utils::create_test_config};
    use serde_json::{Value, json};
    use std::{sync::Arc, time::Duration};
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    async fn server_with(llm: &MockServer) -> axum_test::TestServer {
        let suggester = PlanSuggester::new(&PlanSuggesterConfig {
            base_url: Url::parse(&format!("{}/v1/", llm.uri())).unwrap(),
            api_key: "test".to_string(),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
            max_tokens: 400,
            temperature: 0.7,
        })
        .unwrap();
        crate::Application::with_components(create_test_config(), Arc::new(MemoryStore::new()), None, Some(Arc::new(suggester)))
            .await
            .unwrap()
            .into_test_server()
    }

    #[test_log::test(tokio::test)]
    async fn test_suggestion() {
        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Go with the Medium plan."}}]
            })))
            .mount(&llm)
            .await;
        let server = server_with(&llm).await;

        let response = server
            .post("/api/suggest-plan")
            .json(&json!({"projectDescription": "A bakery site with a blog"}))
            .await;
        response.assert_status_ok();
        response.assert_json(&json!({"text": "Go with the Medium plan."}));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_description() {
        let llm = MockServer::start().await;
        let server = server_with(&llm).await;

        for body in [json!({}), json!({"projectDescription": "   "})] {
            let response = server.post("/api/suggest-plan").json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            let error: Value = response.json();
            assert_eq!(error["error"], "Project description is required");
        }
        assert!(llm.received_requests().await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_upstream_failure() {
        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&llm)
            .await;
        let server = server_with(&llm).await;

        let response = server.post("/api/suggest-plan").json(&json!({"projectDescription": "Shop"})).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({"error": "Failed to generate suggestion"}));
    }

    #[test_log::test(tokio::test)]
    async fn test_not_configured() {
        let server = crate::Application::with_components(create_test_config(), Arc::new(MemoryStore::new()), None, None)
            .await
            .unwrap()
            .into_test_server();
        server
            .post("/api/suggest-plan")
            .json(&json!({"projectDescription": "Shop"}))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
