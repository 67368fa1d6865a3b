//! OpenAI-compatible chat completions provider.

use super::{InferenceGateway, classify_status, classify_transport};
use crate::error::{ArchitectError, InferError};
use crate::types::{ChatTurn, ModelId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiGateway {
    client: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiGateway {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ArchitectError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ArchitectError::HttpClient)?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature,
            timeout,
        })
    }
}

#[async_trait]
impl InferenceGateway for OpenAiGateway {
    async fn infer(&self, history: &[ChatTurn], model: &ModelId) -> Result<String, InferError> {
        let request = ChatRequest {
            model: model.as_str(),
            messages: history
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            temperature: self.temperature,
        };

        tracing::debug!(
            model = %model,
            turns = history.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let envelope: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| InferError::Malformed(format!("undecodable response: {e}")))?;
        envelope.into_text()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, InferError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| InferError::Malformed("missing choices[0].message.content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn history() -> Vec<ChatTurn> {
        vec![
            ChatTurn {
                role: Role::System,
                content: "You are Architect AI.".into(),
            },
            ChatTurn {
                role: Role::User,
                content: "hello".into(),
            },
        ]
    }

    fn gateway(server: &MockServer) -> OpenAiGateway {
        OpenAiGateway::new(server.uri(), "sk-test", 0.7, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_model_messages_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "You are Architect AI." },
                    { "role": "user", "content": "hello" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hi!" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = gateway(&server)
            .infer(&history(), &ModelId::from("gpt-4o"))
            .await
            .unwrap();
        assert_eq!(text, "Hi!");
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .infer(&history(), &ModelId::from("gpt-4o"))
            .await;
        assert!(matches!(result, Err(InferError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .infer(&history(), &ModelId::from("gpt-4o"))
            .await;
        assert!(matches!(result, Err(InferError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_taxonomy() {
        let cases = [
            (401, InferError::Unauthorized),
            (429, InferError::RateLimited),
        ];
        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let result = gateway(&server)
                .infer(&history(), &ModelId::from("gpt-4o"))
                .await;
            assert_eq!(result, Err(expected));
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let result = gateway(&server)
            .infer(&history(), &ModelId::from("gpt-4o"))
            .await;
        assert!(matches!(result, Err(InferError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "choices": [] }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let gateway =
            OpenAiGateway::new(server.uri(), "sk-test", 0.7, Duration::from_millis(100)).unwrap();
        let result = gateway.infer(&history(), &ModelId::from("gpt-4o")).await;
        assert_eq!(result, Err(InferError::Timeout(Duration::from_millis(100))));
    }
}
