//! Classification of individual list entries by the fields they carry.
//!
//! Rules, checked in this order, first match wins:
//! 1. an object with both `text` and `explanation` is a sentiment quote;
//! 2. an object with both `action` and `rationale` is a recommendation;
//! 3. anything else is opaque and shown serialized (strings as-is).

use serde_json::{Map, Value};
use std::fmt;

use crate::utils::{display_value, is_set, text_of};

#[derive(Debug, Clone, PartialEq)]
pub enum ItemShape {
    Sentiment(SentimentItem),
    Recommendation(RecommendationItem),
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentItem {
    pub text: String,
    pub explanation: String,
    /// Suffix parts: category, impact, confidence. Empty when none is set.
    pub meta: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationItem {
    pub action: String,
    pub rationale: String,
    /// `Priority`, `Effort`, `Owner` fields that are set, already labelled.
    pub details: Vec<String>,
    pub success_metrics: Vec<String>,
}

type Rule = (fn(&Map<String, Value>) -> bool, fn(&Map<String, Value>) -> ItemShape);

const RULES: [Rule; 2] = [
    (is_sentiment, sentiment),
    (is_recommendation, recommendation),
];

fn is_sentiment(obj: &Map<String, Value>) -> bool {
    obj.contains_key("text") && obj.contains_key("explanation")
}

fn is_recommendation(obj: &Map<String, Value>) -> bool {
    obj.contains_key("action") && obj.contains_key("rationale")
}

pub fn classify(value: &Value) -> ItemShape {
    let obj = match value {
        Value::Object(obj) => obj,
        Value::Array(_) => return ItemShape::Opaque(value.to_string()),
        scalar => return ItemShape::Opaque(display_value(scalar)),
    };

    RULES
        .iter()
        .find(|(applies, _)| applies(obj))
        .map(|(_, shape)| shape(obj))
        .unwrap_or_else(|| ItemShape::Opaque(value.to_string()))
}

fn sentiment(obj: &Map<String, Value>) -> ItemShape {
    let mut meta = Vec::new();
    if is_set(obj.get("category")) {
        meta.push(text_of(obj.get("category")));
    }
    if is_set(obj.get("impact")) {
        meta.push(format!("Impact: {}", text_of(obj.get("impact"))));
    }
    if let Some(confidence) = obj.get("confidence").and_then(Value::as_f64) {
        meta.push(format!("Conf: {:.0}%", (confidence * 100.0).round()));
    }

    ItemShape::Sentiment(SentimentItem {
        text: text_of(obj.get("text")),
        explanation: text_of(obj.get("explanation")),
        meta,
    })
}

fn recommendation(obj: &Map<String, Value>) -> ItemShape {
    let details = [("priority", "Priority"), ("effort", "Effort"), ("owner", "Owner")]
        .into_iter()
        .filter(|(field, _)| is_set(obj.get(*field)))
        .map(|(field, label)| format!("{label}: {}", text_of(obj.get(field))))
        .collect();

    let success_metrics = match obj.get("successMetrics") {
        Some(Value::Array(items)) => items.iter().map(display_value).collect(),
        _ => Vec::new(),
    };

    ItemShape::Recommendation(RecommendationItem {
        action: text_of(obj.get("action")),
        rationale: text_of(obj.get("rationale")),
        details,
        success_metrics,
    })
}

impl SentimentItem {
    pub fn meta_suffix(&self) -> Option<String> {
        (!self.meta.is_empty()).then(|| format!("({})", self.meta.join(" · ")))
    }
}

impl RecommendationItem {
    pub fn details_line(&self) -> Option<String> {
        (!self.details.is_empty()).then(|| self.details.join(" | "))
    }

    pub fn metrics_line(&self) -> Option<String> {
        (!self.success_metrics.is_empty())
            .then(|| format!("Metrics: {}", self.success_metrics.join(", ")))
    }
}

impl fmt::Display for ItemShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemShape::Sentiment(item) => {
                write!(f, "\"{}\" — {}", item.text, item.explanation)?;
                if let Some(suffix) = item.meta_suffix() {
                    write!(f, " {suffix}")?;
                }
                Ok(())
            }
            ItemShape::Recommendation(item) => {
                write!(f, "{} — {}", item.action, item.rationale)?;
                if let Some(details) = item.details_line() {
                    write!(f, "\n{details}")?;
                }
                if let Some(metrics) = item.metrics_line() {
                    write!(f, "\n{metrics}")?;
                }
                Ok(())
            }
            ItemShape::Opaque(text) => f.write_str(text),
        }
    }
}
