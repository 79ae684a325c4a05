//! Splitting free-text model replies into labeled sections.
//!
//! A marker is a line holding one of the known section titles, optionally
//! decorated the way models tend to write headings: `## Title`,
//! `1. **Title**:`, `- **Title**`, `**Title:**` or `Title:`. Text after
//! the marker on the same line belongs to that section.

use forge_core::{Section, SectionKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Heading-like line. Exactly one of `bold`, `plain` or `bare` matches.
/// Only the bold form may sit behind a list bullet; `- Trends: ...` is body.
const MARKER_PATTERN: &str = r"^\s*(?:#{1,6}\s*)?(?:\d{1,2}[.)]\s+)?(?:(?:[-*]\s+)?\*\*(?P<bold>[^*]+?)\*\*\s*:?|(?P<plain>[^-:*\s][^:*]*?)\s*:|(?P<bare>[^-:*\s][^:*]*?)\s*$)(?P<rest>.*)$";

/// `- **Key**: value` line of a visualization suggestion.
const FIELD_PATTERN: &str = r"^\s*(?:[-*]\s+|\d{1,2}[.)]\s+)?\*\*(?P<key>[^*]+?)\*\*\s*:?\s*(?P<value>.*)$";

const ALIASES: &[(&str, SectionKind)] = &[
    ("executive summary", SectionKind::Summary),
    ("summary", SectionKind::Summary),
    ("overview", SectionKind::Summary),
    ("key findings", SectionKind::Summary),
    ("key trends & patterns", SectionKind::Trends),
    ("key trends and patterns", SectionKind::Trends),
    ("trends & patterns", SectionKind::Trends),
    ("trends and patterns", SectionKind::Trends),
    ("key trends", SectionKind::Trends),
    ("trends", SectionKind::Trends),
    ("anomalies & concerns", SectionKind::Anomalies),
    ("anomalies and concerns", SectionKind::Anomalies),
    ("anomalies & risks", SectionKind::Anomalies),
    ("anomalies", SectionKind::Anomalies),
    ("concerns", SectionKind::Anomalies),
    ("risks", SectionKind::Anomalies),
    ("actionable recommendations", SectionKind::Recommendations),
    ("recommendations", SectionKind::Recommendations),
    ("recommended actions", SectionKind::Recommendations),
    ("kpis to monitor", SectionKind::Kpis),
    ("kpis to track", SectionKind::Kpis),
    ("key performance indicators", SectionKind::Kpis),
    ("kpis", SectionKind::Kpis),
    ("metrics to monitor", SectionKind::Kpis),
];

/// One chart idea from a visualization suggestion reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSuggestion {
    pub chart_type: String,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub group_by: Option<String>,
    pub title: String,
    pub insight: String,
}

#[derive(Debug, Clone)]
pub struct SectionParser {
    marker: Regex,
    field: Regex,
}

impl SectionParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            marker: Regex::new(MARKER_PATTERN)?,
            field: Regex::new(FIELD_PATTERN)?,
        })
    }

    /// Section kind and trailing text if `line` is a marker.
    fn marker<'a>(&self, line: &'a str) -> Option<(SectionKind, &'a str)> {
        let caps = self.marker.captures(line)?;
        let title = caps
            .name("bold")
            .or_else(|| caps.name("plain"))
            .or_else(|| caps.name("bare"))?
            .as_str();
        let kind = section_kind(title)?;
        let rest = caps.name("rest").map_or("", |m| m.as_str());
        let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        Some((kind, rest))
    }

    /// Split `text` at section markers.
    ///
    /// Text before the first marker is dropped. A kind seen twice has its
    /// bodies joined. Without any marker the whole trimmed text becomes a
    /// single fallback section.
    pub fn parse_sections(&self, text: &str) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();
        let mut current: Option<(SectionKind, Vec<&str>)> = None;

        for line in text.lines() {
            match self.marker(line) {
                Some((kind, rest)) => {
                    if let Some((prev, lines)) = current.take() {
                        push_section(&mut sections, prev, &lines);
                    }
                    let mut lines = Vec::new();
                    if !rest.is_empty() {
                        lines.push(rest);
                    }
                    current = Some((kind, lines));
                }
                None => {
                    if let Some((_, lines)) = current.as_mut() {
                        lines.push(line);
                    }
                }
            }
        }
        if let Some((kind, lines)) = current {
            push_section(&mut sections, kind, &lines);
        }

        if sections.is_empty() {
            sections.push(Section::new(SectionKind::Fallback, text.trim()));
        }
        sections
    }

    /// Parse `- **Chart Type**: ...` blocks. Each `Chart Type` line starts a
    /// new suggestion; blocks without a chart type are skipped.
    pub fn parse_suggestions(&self, text: &str) -> Vec<VisualizationSuggestion> {
        let mut out = Vec::new();
        let mut current: Option<VisualizationSuggestion> = None;

        for line in text.lines() {
            let Some(caps) = self.field.captures(line) else {
                continue;
            };
            let key = normalize(caps.name("key").map_or("", |m| m.as_str()));
            let value = clean_value(caps.name("value").map_or("", |m| m.as_str()));

            if key == "chart type" {
                if let Some(done) = current.take() {
                    out.push(done);
                }
                current = Some(VisualizationSuggestion {
                    chart_type: value.to_lowercase(),
                    ..Default::default()
                });
                continue;
            }

            let Some(s) = current.as_mut() else {
                continue;
            };
            match key.as_str() {
                "x-axis" | "x axis" => s.x_axis = optional(value),
                "y-axis" | "y axis" => s.y_axis = optional(value),
                "group by" | "grouping" | "color" => s.group_by = optional(value),
                "title" => s.title = value,
                "insight" | "why" => s.insight = value,
                _ => {}
            }
        }
        if let Some(done) = current {
            out.push(done);
        }
        out.retain(|s| !s.chart_type.is_empty());
        out
    }
}

fn push_section(sections: &mut Vec<Section>, kind: SectionKind, lines: &[&str]) {
    let body = lines.join("\n").trim().to_string();
    if let Some(existing) = sections.iter_mut().find(|s| s.kind == kind) {
        if !body.is_empty() {
            if !existing.body.is_empty() {
                existing.body.push_str("\n\n");
            }
            existing.body.push_str(&body);
        }
        return;
    }
    sections.push(Section::new(kind, body));
}

/// Lowercase, drop a trailing colon and collapse whitespace.
fn normalize(title: &str) -> String {
    title
        .trim()
        .trim_end_matches(':')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn section_kind(title: &str) -> Option<SectionKind> {
    let title = normalize(title);
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == title)
        .map(|(_, kind)| *kind)
}

/// Strip template brackets and backticks around a field value.
fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_matches('`')
        .trim()
        .to_string()
}

fn optional(value: String) -> Option<String> {
    match value.to_lowercase().as_str() {
        "" | "none" | "n/a" | "-" => None,
        _ => Some(value),
    }
}
