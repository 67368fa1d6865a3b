use super::{InferenceGateway, classify_status, classify_transport};
use crate::error::{ArchitectError, InferError};
use crate::types::{ChatTurn, ModelId, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative Language `generateContent` provider
pub struct GeminiGateway {
    client: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiGateway {
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

    fn build_request<'a>(&self, history: &'a [ChatTurn]) -> GenerateContentRequest<'a> {
        let (system, turns): (Vec<&ChatTurn>, Vec<&ChatTurn>) =
            history.iter().partition(|turn| turn.role == Role::System);

        let system_instruction = (!system.is_empty()).then(|| Instruction {
            parts: system
                .iter()
                .map(|turn| Part {
                    text: &turn.content,
                })
                .collect(),
        });

        let contents = turns
            .into_iter()
            .map(|turn| Content {
                role: match turn.role {
                    Role::Assistant => "model",
                    _ => "user",
                },
                parts: vec![Part {
                    text: &turn.content,
                }],
            })
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl InferenceGateway for GeminiGateway {
    async fn infer(&self, history: &[ChatTurn], model: &ModelId) -> Result<String, InferError> {
        let request = self.build_request(history);
        let url = format!("{}/models/{}:generateContent", self.endpoint, model);

        tracing::debug!(model = %model, turns = history.len(), "sending generateContent request");

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
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

        let envelope: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| InferError::Malformed(format!("undecodable response: {e}")))?;
        envelope.into_text()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Instruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, InferError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| InferError::Malformed("response has no candidates".into()))?;

        let texts: Vec<String> = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if texts.is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
            return Err(InferError::Malformed(format!(
                "candidate has no text (finish reason: {reason})"
            )));
        }
        Ok(texts.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
        }
    }

    fn gateway(server: &MockServer) -> GeminiGateway {
        GeminiGateway::new(server.uri(), "g-key", 0.7, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_request_moves_system_turns_to_instruction() {
        let gateway =
            GeminiGateway::new(GEMINI_API_BASE, "k", 0.2, Duration::from_secs(1)).unwrap();
        let history = vec![
            turn(Role::System, "You are Architect AI."),
            turn(Role::User, "hello"),
            turn(Role::Assistant, "hi"),
        ];

        let value = serde_json::to_value(gateway.build_request(&history)).unwrap();
        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            "You are Architect AI."
        );
        assert_eq!(value["contents"].as_array().unwrap().len(), 2);
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][1]["role"], "model");
        assert!((value["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_request_without_system_turns_omits_instruction() {
        let gateway =
            GeminiGateway::new(GEMINI_API_BASE, "k", 0.7, Duration::from_secs(1)).unwrap();
        let history = vec![turn(Role::User, "hello")];
        let value = serde_json::to_value(gateway.build_request(&history)).unwrap();
        assert!(value.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn test_generate_content_round() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Hi " }, { "text": "there" }] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = gateway(&server)
            .infer(&[turn(Role::User, "hello")], &ModelId::from("gemini-1.5-pro"))
            .await
            .unwrap();
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn test_blocked_candidate_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "finishReason": "SAFETY" }]
            })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .infer(&[turn(Role::User, "hello")], &ModelId::from("gemini-1.5-pro"))
            .await;
        assert!(matches!(result, Err(InferError::Malformed(msg)) if msg.contains("SAFETY")));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .infer(&[turn(Role::User, "hello")], &ModelId::from("gemini-1.5-pro"))
            .await;
        assert!(matches!(result, Err(InferError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .infer(&[turn(Role::User, "hello")], &ModelId::from("gemini-1.5-pro"))
            .await;
        assert_eq!(result, Err(InferError::Unauthorized));
    }

    #[tokio::test]
    async fn test_key_stays_out_of_the_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .mount(&server)
            .await;

        gateway(&server)
            .infer(&[turn(Role::User, "hello")], &ModelId::from("gemini-1.5-pro"))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].url.as_str().contains("g-key"));
        assert_eq!(requests[0].headers["x-goog-api-key"], "g-key");
    }

    #[tokio::test]
    async fn test_refused_connection_does_not_leak_key() {
        let gateway = GeminiGateway::new(
            "http://127.0.0.1:1",
            "SECRET-KEY-123",
            0.7,
            Duration::from_secs(5),
        )
        .unwrap();

        let result = gateway
            .infer(&[turn(Role::User, "hello")], &ModelId::from("gemini-1.5-pro"))
            .await;
        let error = result.unwrap_err();
        assert!(matches!(error, InferError::Unavailable(_)));
        assert!(!error.to_string().contains("SECRET-KEY-123"));
    }
}
