//! Completion providers.
//!
//! [`CompletionProvider`] is the seam between the analysis engine and a
//! hosted model. [`OpenAiProvider`] speaks the OpenAI-compatible chat
//! completions protocol; [`ScriptedProvider`] replays canned replies.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use forge_core::config::LlmConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One element of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text parts, ignoring images.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A hosted (or fake) chat model.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send the conversation and return the assistant's reply text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, AnalysisError>;

    fn name(&self) -> &str;
}

// =============================================================================
// OpenAI-compatible HTTP provider
// =============================================================================

/// Chat completions over HTTP with a Bearer key.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, AnalysisError> {
        if !config.is_api_key_set() {
            return Err(AnalysisError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            endpoint: completions_url(&config.base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a response body. A null
/// content is an empty reply, not an error.
fn extract_reply(body: &str) -> Result<String, AnalysisError> {
    let parsed: ChatResponseBody = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| AnalysisError::MalformedResponse("response has no choices".into()))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AnalysisError> {
        if request.messages.is_empty() {
            return Err(AnalysisError::EmptyPrompt);
        }

        let body = ChatRequestBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(model = %self.model, messages = request.messages.len(), "Sending completion request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AnalysisError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }
        extract_reply(&text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// =============================================================================
// Scripted provider
// =============================================================================

/// Replays queued replies in order and records every request.
///
/// When the queue is empty the fallback reply is used, or an error is
/// returned if none was set.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, AnalysisError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    /// Reply used once the queue runs dry.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: AnalysisError) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AnalysisError> {
        if request.messages.is_empty() {
            return Err(AnalysisError::EmptyPrompt);
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(AnalysisError::MalformedResponse(
                "no scripted reply left".into(),
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            temperature: 0.3,
            max_tokens: 64,
        }
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:11434/v1/"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_openai_requires_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiProvider::new(&config),
            Err(AnalysisError::MissingApiKey)
        ));

        let config = LlmConfig {
            api_key: "sk-test".into(),
            base_url: "http://localhost:9/v1/".into(),
            ..LlmConfig::default()
        };
        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:9/v1/chat/completions");
        assert!(!format!("{:?}", provider).contains("sk-test"));
    }

    #[test]
    fn test_extract_reply() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Revenue is up."}}]}"#;
        assert_eq!(extract_reply(body).unwrap(), "Revenue is up.");

        let null_content = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(extract_reply(null_content).unwrap(), "");

        assert!(matches!(
            extract_reply(r#"{"choices":[]}"#),
            Err(AnalysisError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_reply("<html>bad gateway</html>"),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage::user_parts(vec![
            ContentPart::Text { text: "Describe".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: "data:image/png;base64,AAAA".into() },
            },
        ]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");

        let plain = serde_json::to_value(ChatMessage::system("hi")).unwrap();
        assert_eq!(plain["content"], "hi");
        assert_eq!(msg.content.text(), "Describe");
    }

    #[tokio::test]
    async fn test_scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::with_replies(["first", "second"]);
        provider.push_error(AnalysisError::Http("timeout".into()));

        assert_eq!(provider.complete(request("a")).await.unwrap(), "first");
        assert_eq!(provider.complete(request("b")).await.unwrap(), "second");
        assert!(matches!(
            provider.complete(request("c")).await,
            Err(AnalysisError::Http(_))
        ));
        assert!(provider.complete(request("d")).await.is_err());
        assert_eq!(provider.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_scripted_provider_fallback() {
        let provider = ScriptedProvider::new().with_fallback("connected");
        assert_eq!(provider.complete(request("ping")).await.unwrap(), "connected");
        assert_eq!(provider.complete(request("ping")).await.unwrap(), "connected");
    }

    #[tokio::test]
    async fn test_scripted_provider_rejects_empty_request() {
        let provider = ScriptedProvider::with_replies(["unused"]);
        let empty = CompletionRequest {
            messages: Vec::new(),
            temperature: 0.0,
            max_tokens: 1,
        };
        assert!(matches!(
            provider.complete(empty).await,
            Err(AnalysisError::EmptyPrompt)
        ));
        assert!(provider.requests().is_empty());
    }
}
