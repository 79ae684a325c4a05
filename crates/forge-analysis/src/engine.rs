//! The analysis engine.
//!
//! Builds a prompt, sends it through the configured provider and parses the
//! reply. Provider errors are returned as-is; there is no retry.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use forge_core::config::LlmConfig;
use forge_core::{AnalysisKind, AnalysisResult, Section, SectionKind};
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::prompts;
use crate::provider::{
    ChatMessage, CompletionProvider, CompletionRequest, ContentPart, ImageUrl, OpenAiProvider,
};
use crate::sections::{SectionParser, VisualizationSuggestion};

/// Shown when the model answers with nothing but whitespace.
pub const EMPTY_RESPONSE: &str = "The model returned an empty response. Please try again.";

pub struct AnalysisEngine {
    provider: Arc<dyn CompletionProvider>,
    temperature: f32,
    max_tokens: u32,
    parser: SectionParser,
}

impl AnalysisEngine {
    /// Engine backed by the OpenAI-compatible endpoint in `config`.
    ///
    /// Fails with [`AnalysisError::MissingApiKey`] when no key is set.
    pub fn from_config(config: &LlmConfig) -> Result<Self, AnalysisError> {
        let provider = OpenAiProvider::new(config)?;
        info!(model = %provider.model(), endpoint = %provider.endpoint(), "Analysis engine ready");
        Self::with_provider(Arc::new(provider), config)
    }

    /// Engine with an injected provider. Only the sampling settings of
    /// `config` are used.
    pub fn with_provider(
        provider: Arc<dyn CompletionProvider>,
        config: &LlmConfig,
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            parser: SectionParser::new()?,
        })
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn parser(&self) -> &SectionParser {
        &self.parser
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AnalysisError> {
        let request = CompletionRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let reply = self.provider.complete(request).await?;
        debug!(provider = self.provider.name(), chars = reply.len(), "Completion received");
        Ok(reply)
    }

    /// System persona plus one user prompt.
    async fn prompt(&self, prompt: String) -> Result<String, AnalysisError> {
        self.complete(vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])
        .await
    }

    fn structure(&self, kind: AnalysisKind, reply: String) -> AnalysisResult {
        if reply.trim().is_empty() {
            warn!(?kind, "Model returned an empty response");
            return AnalysisResult::new(
                kind,
                vec![Section::new(SectionKind::Fallback, EMPTY_RESPONSE)],
                reply,
            );
        }
        let sections = self.parser.parse_sections(&reply);
        AnalysisResult::new(kind, sections, reply)
    }

    /// Five-section overview of the dataset.
    pub async fn analyze_data(
        &self,
        data_context: &str,
        rag_context: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        require(data_context)?;
        let reply = self
            .prompt(prompts::data_analysis_prompt(data_context, rag_context))
            .await?;
        let result = self.structure(AnalysisKind::Overview, reply);
        info!(sections = result.sections.len(), fallback = result.fallback, "Data analysis complete");
        Ok(result)
    }

    pub async fn answer_question(
        &self,
        question: &str,
        data_context: &str,
        rag_context: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        require(question)?;
        let reply = self
            .prompt(prompts::question_prompt(question, data_context, rag_context))
            .await?;
        Ok(self.structure(AnalysisKind::Question, reply))
    }

    pub async fn custom_analysis(
        &self,
        request: &str,
        data_context: &str,
        rag_context: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        require(request)?;
        let reply = self
            .prompt(prompts::custom_analysis_prompt(request, data_context, rag_context))
            .await?;
        Ok(self.structure(AnalysisKind::Custom, reply))
    }

    /// Chart ideas as prose plus the suggestions that could be parsed out
    /// of it.
    pub async fn suggest_visualizations(
        &self,
        data_context: &str,
    ) -> Result<(AnalysisResult, Vec<VisualizationSuggestion>), AnalysisError> {
        require(data_context)?;
        let reply = self
            .prompt(prompts::visualization_prompt(data_context))
            .await?;
        let suggestions = self.parser.parse_suggestions(&reply);
        debug!(count = suggestions.len(), "Visualization suggestions parsed");
        Ok((self.structure(AnalysisKind::ChartSuggestions, reply), suggestions))
    }

    /// Free-form chat. The data context, when present, rides along as a
    /// second system message.
    pub async fn chat(
        &self,
        message: &str,
        data_context: &str,
        rag_context: &str,
    ) -> Result<String, AnalysisError> {
        require(message)?;
        let mut messages = vec![ChatMessage::system(prompts::SYSTEM_PROMPT)];
        if let Some(context) = prompts::chat_context_message(data_context, rag_context) {
            messages.push(ChatMessage::system(context));
        }
        messages.push(ChatMessage::user(message));

        let reply = self.complete(messages).await?;
        if reply.trim().is_empty() {
            return Ok(EMPTY_RESPONSE.to_string());
        }
        Ok(reply)
    }

    /// Describe an image. `mime` is the image media type, e.g. `image/png`.
    pub async fn analyze_image(
        &self,
        bytes: &[u8],
        mime: &str,
        prompt: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyPrompt);
        }
        let prompt = if prompt.trim().is_empty() {
            prompts::DEFAULT_IMAGE_PROMPT
        } else {
            prompt.trim()
        };
        let url = format!("data:{};base64,{}", mime, BASE64.encode(bytes));

        let reply = self
            .complete(vec![
                ChatMessage::system(prompts::SYSTEM_PROMPT),
                ChatMessage::user_parts(vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url },
                    },
                ]),
            ])
            .await?;
        info!(bytes = bytes.len(), mime, "Image analysis complete");
        Ok(self.structure(AnalysisKind::Image, reply))
    }

    /// True when the model echoes "connected". Any error counts as false.
    pub async fn test_connection(&self) -> bool {
        match self
            .complete(vec![ChatMessage::user(prompts::CONNECTION_PROBE)])
            .await
        {
            Ok(reply) => reply.to_lowercase().contains("connected"),
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("provider", &self.provider.name())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn require(text: &str) -> Result<(), AnalysisError> {
    if text.trim().is_empty() {
        Err(AnalysisError::EmptyPrompt)
    } else {
        Ok(())
    }
}
