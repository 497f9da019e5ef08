//! Plan suggestions from a hosted language model.
//!
//! One prompt, one completion: the client's project description is embedded in a fixed prompt
//! describing the agency's three pricing tiers and sent to an OpenAI-compatible
//! `chat/completions` endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::config::PlanSuggesterConfig;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("language model unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("language model returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("language model returned no completion")]
    EmptyCompletion,

    #[error("bad language model endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Build the pricing prompt for a project description
pub fn build_prompt(project_description: &str) -> String {
    format!(
        "You are a web development pricing assistant for ARPK Web Development.
Based on the following project description, recommend one of our three plans:
1. Simple Website (£100-£200): 1-3 pages, clean design, ideal for portfolios, takes 2-4 days
2. Medium Website (£250-£400): 4-8 pages, custom animations, forms, optional blog, takes 5-7 days
3. Complex Website (£500-£1000+): Logins, dashboards, admin panels, Stripe integration, takes 10-20 days

Project description: {project_description}

Provide a friendly, concise recommendation with:
1. Which plan is best suited (Simple, Medium, or Complex)
2. Estimated price range within that plan's range
3. Estimated timeline
4. Brief explanation of why this plan fits their needs
5. 1-2 suggestions for features they might want to consider

Keep your response under 150 words and make it conversational."
    )
}

pub struct PlanSuggester {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl PlanSuggester {
    pub fn new(config: &PlanSuggesterConfig) -> Result<Self, PlanError> {
        Ok(Self {
            client: crate::build_http_client(config.timeout)?,
            endpoint: config.base_url.join("chat/completions")?,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    #[instrument(skip_all, fields(model = %self.model), err)]
    pub async fn suggest(&self, project_description: &str) -> Result<String, PlanError> {
        let prompt = build_prompt(project_description);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlanError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(PlanError::EmptyCompletion)?;

        debug!("Received {} character suggestion", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    fn suggester(server: &MockServer) -> PlanSuggester {
        PlanSuggester::new(&PlanSuggesterConfig {
            base_url: Url::parse(&format!("{}/openai/v1/", server.uri())).unwrap(),
            api_key: "gsk_test".to_string(),
            model: "llama3-70b-8192".to_string(),
            timeout: Duration::from_secs(5),
            max_tokens: 400,
            temperature: 0.7,
        })
        .unwrap()
    }

    #[test]
    fn test_prompt_embeds_description_and_tiers() {
        let prompt = build_prompt("A portfolio for my photography");
        assert!(prompt.contains("Project description: A portfolio for my photography"));
        assert!(prompt.contains("Simple Website (£100-£200)"));
        assert!(prompt.contains("Medium Website (£250-£400)"));
        assert!(prompt.contains("Complex Website (£500-£1000+)"));
    }

    #[tokio::test]
    async fn test_suggest_returns_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer gsk_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "  The Simple plan fits.  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = suggester(&server).suggest("A one-page portfolio").await.unwrap();
        assert_eq!(text, "The Simple plan fits.");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "llama3-70b-8192");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("A one-page portfolio"));
    }

    #[tokio::test]
    async fn test_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = suggester(&server).suggest("anything").await.unwrap_err();
        assert!(matches!(err, PlanError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = suggester(&server).suggest("anything").await.unwrap_err();
        assert!(matches!(err, PlanError::EmptyCompletion));
    }
}
