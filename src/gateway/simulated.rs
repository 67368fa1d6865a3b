use super::InferenceGateway;
use crate::error::InferError;
use crate::types::{ChatTurn, ModelId, Role};
use async_trait::async_trait;
use std::time::Duration;

pub const SIMULATION_LABEL: &str = "[simulation]";

/// Offline stand-in used when no API key is configured. Replies are canned
/// and labelled so they are never mistaken for model output.
pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceGateway for SimulatedGateway {
    async fn infer(&self, history: &[ChatTurn], model: &ModelId) -> Result<String, InferError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let last = history
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();

        Ok(format!(
            "{SIMULATION_LABEL} No API key configured, so {model} was not called. \
             You said {} characters: \"{}\"",
            last.chars().count(),
            preview(last)
        ))
    }
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 60;
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_is_labelled_and_echoes_last_user_turn() {
        let history = vec![
            ChatTurn {
                role: Role::User,
                content: "first".into(),
            },
            ChatTurn {
                role: Role::Assistant,
                content: "ack".into(),
            },
            ChatTurn {
                role: Role::User,
                content: "design a cache".into(),
            },
        ];

        let reply = SimulatedGateway::new()
            .infer(&history, &ModelId::from("gemini-1.5-pro"))
            .await
            .unwrap();
        assert!(reply.starts_with(SIMULATION_LABEL));
        assert!(reply.contains("design a cache"));
        assert!(!reply.contains("first"));
    }

    #[test]
    fn test_long_input_is_previewed() {
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), 61);
        assert!(shown.ends_with('…'));
    }
}
