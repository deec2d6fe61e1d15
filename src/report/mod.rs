//! Turns a loosely structured report payload into an ordered list of
//! display sections.
//!
//! The builder runs [`SECTION_RULES`] top to bottom. Each rule pairs a
//! predicate with the handler that emits its sections, so the order in which
//! report keys are surfaced is this table and nothing else. Building never
//! fails: shapes no rule understands are dropped or shown serialized.

pub mod distribution;
pub mod render;
pub mod shape;

use phf::phf_set;
use serde_json::{Map, Value};
use tracing::trace;

use crate::types::Report;
use crate::utils::{
    NumberFormatOptions, display_value, format_cell, inline_value, is_set, text_of, title_from_key,
};

pub use distribution::Segment;
pub use shape::{ItemShape, classify};

/// Keys with a dedicated section ahead of the generic pass.
static DEDICATED_KEYS: phf::Set<&'static str> = phf_set! {
    "sentimentDistribution",
    "topThemes",
    "frictionCategories",
    "periodDelta",
    "reportPrompt",
    "context",
    "reportMarkdown",
};

/// Keys never shown as metric chips. `meta` is rendered in the generic pass,
/// at its own position, as a key/value grid.
static RESERVED_KEYS: phf::Set<&'static str> = phf_set! {
    "sentimentDistribution",
    "topThemes",
    "frictionCategories",
    "periodDelta",
    "reportPrompt",
    "context",
    "reportMarkdown",
    "meta",
};

const SUMMARY_POSITIVE: &str = "PositiveSentiments";
const SUMMARY_NEGATIVE: &str = "NegativeSentiments";
const SUMMARY_RECOMMENDATIONS: &str = "Recommendations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Meta,
    Insights,
    Strengths,
    Weaknesses,
    Default,
}

const TONE_TOKENS: [(&str, Tone); 4] = [
    ("meta", Tone::Meta),
    ("insights", Tone::Insights),
    ("strengths", Tone::Strengths),
    ("weaknesses", Tone::Weaknesses),
];

/// First tone token contained in the key, case-insensitively.
pub fn tone_for_key(key: &str) -> Tone {
    let key = key.to_lowercase();
    TONE_TOKENS
        .iter()
        .find(|(token, _)| key.contains(token))
        .map(|(_, tone)| *tone)
        .unwrap_or(Tone::Default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    SentimentSummary,
    SentimentBars,
    Themes,
    FrictionGrid,
    DeltaChips,
    MetricChips,
    MetaBlock,
    ListSection,
    KVSection,
    TextBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentimentSummary {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionPayload {
    Summary(SentimentSummary),
    Segments(Vec<Segment>),
    Themes(Vec<String>),
    Entries(Vec<Entry>),
    Items(Vec<ItemShape>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub key: String,
    pub title: String,
    pub tone: Tone,
    pub kind: SectionKind,
    pub payload: SectionPayload,
}

impl Section {
    fn new(key: &str, title: impl Into<String>, kind: SectionKind, payload: SectionPayload) -> Self {
        Self {
            key: key.to_string(),
            title: title.into(),
            tone: tone_for_key(key),
            kind,
            payload,
        }
    }
}

pub struct SectionRule {
    pub name: &'static str,
    applies: fn(&Report) -> bool,
    emit: fn(&Report, &NumberFormatOptions) -> Vec<Section>,
}

pub const SECTION_RULES: &[SectionRule] = &[
    SectionRule {
        name: "sentiment-summary",
        applies: has_summary,
        emit: summary_section,
    },
    SectionRule {
        name: "sentiment-distribution",
        applies: |r| object_at(r, "sentimentDistribution").is_some(),
        emit: distribution_section,
    },
    SectionRule {
        name: "themes",
        applies: |r| matches!(r.get("topThemes"), Some(Value::Array(_))),
        emit: themes_section,
    },
    SectionRule {
        name: "friction-categories",
        applies: |r| object_at(r, "frictionCategories").is_some(),
        emit: friction_section,
    },
    SectionRule {
        name: "period-delta",
        applies: |r| object_at(r, "periodDelta").is_some(),
        emit: delta_section,
    },
    SectionRule {
        name: "metrics-overview",
        applies: |r| metric_entries(r).next().is_some(),
        emit: metrics_section,
    },
    SectionRule {
        name: "generic",
        applies: |_| true,
        emit: generic_sections,
    },
];

/// Build the display sections for a report. Pure: the same report always
/// yields the same sections.
pub fn build(report: &Report, options: &NumberFormatOptions) -> Vec<Section> {
    SECTION_RULES
        .iter()
        .filter(|rule| (rule.applies)(report))
        .flat_map(|rule| {
            let sections = (rule.emit)(report, options);
            trace!(rule = rule.name, count = sections.len(), "report sections");
            sections
        })
        .collect()
}

fn object_at<'a>(report: &'a Report, key: &str) -> Option<&'a Map<String, Value>> {
    report.get(key).and_then(Value::as_object)
}

fn non_empty_array<'a>(report: &'a Report, key: &str) -> Option<&'a Vec<Value>> {
    report
        .get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
}

fn has_summary(report: &Report) -> bool {
    [SUMMARY_POSITIVE, SUMMARY_NEGATIVE]
        .iter()
        .any(|key| is_set(report.get(key)))
}

fn quote_line(item: &Value) -> String {
    match item {
        Value::Object(obj) => format!(
            "\"{}\" — {}",
            text_of(obj.get("Text")),
            text_of(obj.get("Explanation"))
        ),
        other => display_value(other),
    }
}

fn summary_section(report: &Report, _: &NumberFormatOptions) -> Vec<Section> {
    let lines = |key: &str, f: fn(&Value) -> String| {
        non_empty_array(report, key)
            .map(|items| items.iter().map(f).collect::<Vec<String>>())
            .unwrap_or_default()
    };

    let summary = SentimentSummary {
        positive: lines(SUMMARY_POSITIVE, quote_line),
        negative: lines(SUMMARY_NEGATIVE, quote_line),
        recommendations: lines(SUMMARY_RECOMMENDATIONS, display_value),
    };

    vec![Section::new(
        "sentimentSummary",
        "Sentiment Summary",
        SectionKind::SentimentSummary,
        SectionPayload::Summary(summary),
    )]
}

fn distribution_section(report: &Report, _: &NumberFormatOptions) -> Vec<Section> {
    let Some(map) = object_at(report, "sentimentDistribution") else {
        return Vec::new();
    };
    vec![Section::new(
        "sentimentDistribution",
        "Sentiment",
        SectionKind::SentimentBars,
        SectionPayload::Segments(distribution::segments_from_map(map)),
    )]
}

fn themes_section(report: &Report, _: &NumberFormatOptions) -> Vec<Section> {
    let Some(Value::Array(themes)) = report.get("topThemes") else {
        return Vec::new();
    };
    let themes = themes
        .iter()
        .map(|t| match t {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    vec![Section::new(
        "topThemes",
        "Themes",
        SectionKind::Themes,
        SectionPayload::Themes(themes),
    )]
}

fn formatted_entries(map: &Map<String, Value>, options: &NumberFormatOptions) -> Vec<Entry> {
    map.iter()
        .map(|(k, v)| Entry {
            key: k.clone(),
            value: format_cell(v, options),
        })
        .collect()
}

fn friction_section(report: &Report, options: &NumberFormatOptions) -> Vec<Section> {
    object_at(report, "frictionCategories")
        .map(|map| {
            Section::new(
                "frictionCategories",
                "Friction Categories",
                SectionKind::FrictionGrid,
                SectionPayload::Entries(formatted_entries(map, options)),
            )
        })
        .into_iter()
        .collect()
}

fn delta_section(report: &Report, options: &NumberFormatOptions) -> Vec<Section> {
    object_at(report, "periodDelta")
        .map(|map| {
            Section::new(
                "periodDelta",
                "Period Delta",
                SectionKind::DeltaChips,
                SectionPayload::Entries(formatted_entries(map, options)),
            )
        })
        .into_iter()
        .collect()
}

fn metric_entries(report: &Report) -> impl Iterator<Item = (&String, &Value)> {
    report
        .entries()
        .filter(|(k, v)| v.is_number() && !RESERVED_KEYS.contains(k.as_str()))
}

fn metrics_section(report: &Report, options: &NumberFormatOptions) -> Vec<Section> {
    let entries: Vec<Entry> = metric_entries(report)
        .map(|(k, v)| Entry {
            key: k.clone(),
            value: format_cell(v, options),
        })
        .collect();
    if entries.is_empty() {
        return Vec::new();
    }
    vec![Section::new(
        "metricsOverview",
        "Metrics Overview",
        SectionKind::MetricChips,
        SectionPayload::Entries(entries),
    )]
}

fn generic_sections(report: &Report, _: &NumberFormatOptions) -> Vec<Section> {
    report
        .entries()
        .filter(|(k, v)| !DEDICATED_KEYS.contains(k.as_str()) && !v.is_number())
        .filter_map(|(k, v)| generic_section(k, v))
        .collect()
}

fn generic_section(key: &str, value: &Value) -> Option<Section> {
    let title = title_from_key(key);
    let section = match value {
        Value::Object(map) if key == "meta" => Section::new(
            key,
            title,
            SectionKind::MetaBlock,
            SectionPayload::Entries(
                map.iter()
                    .map(|(k, v)| Entry {
                        key: k.clone(),
                        value: display_value(v),
                    })
                    .collect(),
            ),
        ),
        Value::Array(items) => Section::new(
            key,
            title,
            SectionKind::ListSection,
            SectionPayload::Items(items.iter().map(classify).collect()),
        ),
        Value::Object(map) => Section::new(
            key,
            title,
            SectionKind::KVSection,
            SectionPayload::Entries(
                map.iter()
                    .map(|(k, v)| Entry {
                        key: k.clone(),
                        value: inline_value(v),
                    })
                    .collect(),
            ),
        ),
        Value::String(text) => Section::new(
            key,
            title,
            SectionKind::TextBlock,
            SectionPayload::Text(text.clone()),
        ),
        // Booleans and nulls have no section.
        _ => return None,
    };
    Some(section)
}
