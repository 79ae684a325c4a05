//! Prompt templates.
//!
//! Every builder is a pure function of its inputs, so the same data context
//! and retrieved text always produce byte-identical prompts.

use forge_core::SectionKind;

/// Persona shared by every analysis request.
pub const SYSTEM_PROMPT: &str = "You are InsightForge, an expert AI Business Intelligence Analyst.
You help organizations turn raw data into actionable business insight.

Your capabilities include:
- Identifying key trends, patterns and anomalies in business data
- Generating clear, actionable recommendations
- Explaining complex findings in accessible business language
- Suggesting appropriate visualizations for different data types
- Giving strategic advice grounded in the data

Guidelines:
- Be specific and data-driven
- Recommend actions, not just observations
- Use professional business language
- Structure responses with clear sections and bullet points
- Suggest KPIs to track when relevant
- Highlight both opportunities and risks";

/// Substituted when retrieval produced nothing.
pub const NO_ADDITIONAL_CONTEXT: &str = "No additional context available.";

/// Default instruction for image analysis.
pub const DEFAULT_IMAGE_PROMPT: &str = "Analyze this business chart/image.";

/// Sent by `test_connection`.
pub const CONNECTION_PROBE: &str = "Say 'connected' if you can read this.";

/// Sections requested by the full data analysis, in order.
pub const ANALYSIS_SECTIONS: [SectionKind; 5] = [
    SectionKind::Summary,
    SectionKind::Trends,
    SectionKind::Anomalies,
    SectionKind::Recommendations,
    SectionKind::Kpis,
];

fn rag_or_default(rag_context: &str) -> &str {
    if rag_context.trim().is_empty() {
        NO_ADDITIONAL_CONTEXT
    } else {
        rag_context
    }
}

fn section_hint(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Summary => "A brief overview of the key findings",
        SectionKind::Trends => "Important trends identified in the data",
        SectionKind::Anomalies => "Any unusual patterns or potential issues",
        SectionKind::Recommendations => "Specific, prioritized actions to take",
        SectionKind::Kpis => "Key performance indicators to track going forward",
        SectionKind::Fallback => "",
    }
}

pub fn data_analysis_prompt(data_context: &str, rag_context: &str) -> String {
    let sections: String = ANALYSIS_SECTIONS
        .iter()
        .enumerate()
        .map(|(i, kind)| format!("{}. **{}**: {}\n", i + 1, kind.title(), section_hint(*kind)))
        .collect();

    format!(
        "Analyze the following business data and provide comprehensive insights.

DATA CONTEXT:
{data_context}

ADDITIONAL CONTEXT FROM KNOWLEDGE BASE:
{rag}

Please provide:
{sections}",
        rag = rag_or_default(rag_context),
    )
}

pub fn question_prompt(question: &str, data_context: &str, rag_context: &str) -> String {
    format!(
        "Answer the following business question using the provided data and context.

DATA CONTEXT:
{data_context}

RELEVANT CONTEXT FROM KNOWLEDGE BASE:
{rag}

QUESTION: {question}

Provide a thorough, data-backed answer with specific references to the data when possible.
",
        rag = rag_or_default(rag_context),
        question = question.trim(),
    )
}

pub fn custom_analysis_prompt(request: &str, data_context: &str, rag_context: &str) -> String {
    format!(
        "Perform the following custom analysis on the business data.

DATA CONTEXT:
{data_context}

RELEVANT CONTEXT FROM KNOWLEDGE BASE:
{rag}

ANALYSIS REQUEST: {request}

Provide detailed findings with supporting data points and actionable recommendations.
",
        rag = rag_or_default(rag_context),
        request = request.trim(),
    )
}

pub fn visualization_prompt(data_context: &str) -> String {
    format!(
        "Based on the following data profile, suggest the most effective visualizations.

DATA PROFILE:
{data_context}

For each visualization, provide:
1. Chart type (bar, line, scatter, pie, heatmap, histogram, box)
2. Which columns to use for the X-axis, Y-axis and any grouping
3. Why this visualization is insightful
4. What business question it answers

Suggest 3-5 visualizations, ordered by importance. Format each suggestion as:
- **Chart Type**: [type]
- **X-Axis**: [column]
- **Y-Axis**: [column]
- **Group By**: [column or None]
- **Title**: [descriptive title]
- **Insight**: [what it reveals]
"
    )
}

/// Extra system message carrying the dataset for free-form chat.
pub fn chat_context_message(data_context: &str, rag_context: &str) -> Option<String> {
    if data_context.trim().is_empty() {
        return None;
    }
    let mut message = format!("Current data context:\n{}", data_context);
    if !rag_context.trim().is_empty() {
        message.push_str("\n\nAdditional context:\n");
        message.push_str(rag_context);
    }
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_lists_sections_in_order() {
        let prompt = data_analysis_prompt("Dataset Shape: 3 rows × 2 columns", "");
        let positions: Vec<usize> = ANALYSIS_SECTIONS
            .iter()
            .map(|k| prompt.find(&format!("**{}**", k.title())).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        assert!(prompt.contains("1. **Executive Summary**:"));
        assert!(prompt.contains("5. **KPIs to Monitor**:"));
    }

    #[test]
    fn test_empty_rag_context_is_replaced() {
        let prompt = data_analysis_prompt("ctx", "   ");
        assert!(prompt.contains(NO_ADDITIONAL_CONTEXT));

        let prompt = question_prompt("Why?", "ctx", "");
        assert!(prompt.contains(NO_ADDITIONAL_CONTEXT));

        let prompt = custom_analysis_prompt("Churn", "ctx", "[Source 1] retention fell");
        assert!(!prompt.contains(NO_ADDITIONAL_CONTEXT));
        assert!(prompt.contains("[Source 1] retention fell"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let a = question_prompt("Which region leads?", "ctx", "rag");
        let b = question_prompt("Which region leads?", "ctx", "rag");
        assert_eq!(a, b);
        assert_eq!(visualization_prompt("p"), visualization_prompt("p"));
    }

    #[test]
    fn test_question_is_embedded() {
        let prompt = question_prompt("  Which region leads?  ", "ctx", "");
        assert!(prompt.contains("QUESTION: Which region leads?\n"));
    }

    #[test]
    fn test_visualization_prompt_format_lines() {
        let prompt = visualization_prompt("profile");
        for label in ["Chart Type", "X-Axis", "Y-Axis", "Group By", "Title", "Insight"] {
            assert!(prompt.contains(&format!("- **{}**:", label)), "missing {}", label);
        }
        assert!(prompt.contains("3-5 visualizations"));
    }

    #[test]
    fn test_chat_context_message() {
        assert!(chat_context_message("", "rag").is_none());
        let msg = chat_context_message("rows", "").unwrap();
        assert_eq!(msg, "Current data context:\nrows");
        let msg = chat_context_message("rows", "chunk").unwrap();
        assert!(msg.ends_with("Additional context:\nchunk"));
    }
}
