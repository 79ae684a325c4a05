//! InsightForge analysis crate - prompt building, completion providers and
//! response parsing.
//!
//! The engine turns a data context plus retrieved chunks into a
//! deterministic prompt, sends it through a [`CompletionProvider`] and
//! splits the reply into labeled sections.

pub mod engine;
pub mod error;
pub mod prompts;
pub mod provider;
pub mod sections;

pub use engine::{AnalysisEngine, EMPTY_RESPONSE};
pub use error::AnalysisError;
pub use provider::{
    ChatMessage, CompletionProvider, CompletionRequest, ContentPart, ImageUrl, MessageContent,
    OpenAiProvider, Role, ScriptedProvider,
};
pub use sections::{SectionParser, VisualizationSuggestion};
