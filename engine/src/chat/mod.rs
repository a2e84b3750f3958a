//! Free-text answers
//!
//! Requests that name no pipeline step and no project are general
//! conversation. The orchestrator hands them to a [`ChatResponder`]; the
//! answer never touches project state.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vane_sdk::errors::EngineError;
use vane_sdk::types::StepKind;

/// What the responder knows about the conversation
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub active_project: Option<String>,
    pub recent_projects: Vec<String>,
}

#[async_trait]
pub trait ChatResponder: Send + Sync {
    fn name(&self) -> &str;

    async fn respond(&self, query: &str, context: &ChatContext) -> Result<String, EngineError>;
}

/// Help text describing what the pipeline can do
pub fn help_text(context: &ChatContext) -> String {
    let mut text = String::from("I can run these analysis steps for a wind farm project:\n");
    for step in StepKind::ALL {
        text.push_str(&format!("  - {}: \"{}\"\n", step.label(), step.example_request()));
    }
    text.push_str("You can also say \"list my projects\" or \"show project <name>\".");

    if let Some(active) = &context.active_project {
        text.push_str(&format!("\nCurrent project: {}", active));
    } else if !context.recent_projects.is_empty() {
        text.push_str(&format!(
            "\nRecent projects: {}",
            context.recent_projects.join(", ")
        ));
    }
    text
}

/// Offline responder answering with the help text
pub struct CannedChat;

#[async_trait]
impl ChatResponder for CannedChat {
    fn name(&self) -> &str {
        "canned"
    }

    async fn respond(&self, _query: &str, context: &ChatContext) -> Result<String, EngineError> {
        Ok(help_text(context))
    }
}

const SYSTEM_PROMPT: &str = "You are the assistant of a wind farm analysis pipeline with four steps: \
terrain analysis, layout optimization, wake simulation and report generation. Answer briefly. \
If the user wants an analysis, tell them which request to make. Never invent analysis results.";

/// Responder backed by an Ollama chat model
#[derive(Debug, Clone)]
pub struct OllamaChat {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaChat {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn messages(&self, query: &str, context: &ChatContext) -> Vec<OllamaMessage> {
        let mut system = SYSTEM_PROMPT.to_string();
        if let Some(active) = &context.active_project {
            system.push_str(&format!(" The user's current project is {}.", active));
        }

        vec![
            OllamaMessage {
                role: "system".to_string(),
                content: system,
            },
            OllamaMessage {
                role: "user".to_string(),
                content: query.to_string(),
            },
        ]
    }
}

#[async_trait]
impl ChatResponder for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn respond(&self, query: &str, context: &ChatContext) -> Result<String, EngineError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            messages: self.messages(query, context),
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::Network(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.base_url
                    ))
                } else {
                    EngineError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Network(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(body.message.content.trim().to_string())
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_canned_lists_every_step() {
        let context = ChatContext {
            active_project: Some("amarillo-wind-farm".to_string()),
            recent_projects: Vec::new(),
        };
        let answer = CannedChat.respond("hello", &context).await.unwrap();

        for step in StepKind::ALL {
            assert!(answer.contains(step.label()));
        }
        assert!(answer.contains("Current project: amarillo-wind-farm"));
    }

    #[test]
    fn test_ollama_messages_carry_context() {
        let chat = OllamaChat::new("http://localhost:11434", "llama3.1:8b");
        let context = ChatContext {
            active_project: Some("ohio-wind-farm".to_string()),
            recent_projects: Vec::new(),
        };

        let messages = chat.messages("what is a wake?", &context);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("ohio-wind-farm"));
        assert_eq!(messages[1].content, "what is a wake?");
    }
}
