use chrono::{DateTime, FixedOffset, Local};
use num_format::{Locale, ToFormattedString};
use serde_json::{Number, Value};

/// Largest number of fraction digits shown for non-integral values.
const MAX_FRACTION_DIGITS: usize = 3;

#[derive(Clone, Debug)]
pub struct NumberFormatOptions {
    pub use_comma: bool,
    pub locale: String,
}

impl Default for NumberFormatOptions {
    fn default() -> Self {
        Self {
            use_comma: true,
            locale: "en".to_string(),
        }
    }
}

impl NumberFormatOptions {
    fn locale(&self) -> Locale {
        match self.locale.as_str() {
            "de" => Locale::de,
            "fr" => Locale::fr,
            "es" => Locale::es,
            "it" => Locale::it,
            "ja" => Locale::ja,
            "ko" => Locale::ko,
            "zh" => Locale::zh,
            _ => Locale::en,
        }
    }
}

/// Format a report number for display, with locale digit grouping when enabled.
pub fn format_number(n: &Number, options: &NumberFormatOptions) -> String {
    if let Some(v) = n.as_u64() {
        return format_integer(v, false, options);
    }
    if let Some(v) = n.as_i64() {
        return format_integer(v.unsigned_abs(), true, options);
    }
    match n.as_f64() {
        Some(v) => format_float(v, options),
        None => n.to_string(),
    }
}

fn format_integer(magnitude: u64, negative: bool, options: &NumberFormatOptions) -> String {
    let digits = if options.use_comma {
        magnitude.to_formatted_string(&options.locale())
    } else {
        magnitude.to_string()
    };
    if negative {
        format!("-{digits}")
    } else {
        digits
    }
}

fn format_float(v: f64, options: &NumberFormatOptions) -> String {
    if !v.is_finite() {
        return v.to_string();
    }

    let rendered = format!("{:.prec$}", v.abs(), prec = MAX_FRACTION_DIGITS);
    let (int_part, frac_part) = rendered
        .split_once('.')
        .unwrap_or((rendered.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let Ok(magnitude) = int_part.parse::<u64>() else {
        return v.to_string();
    };
    let negative = v < 0.0 && (magnitude > 0 || !frac_part.is_empty());
    let mut out = format_integer(magnitude, negative, options);
    if !frac_part.is_empty() {
        let separator = if options.use_comma {
            options.locale().decimal()
        } else {
            "."
        };
        out.push_str(separator);
        out.push_str(frac_part);
    }
    out
}

/// Format any report value the way a chip or grid cell shows it: numbers go
/// through [`format_number`], everything else through [`display_value`].
pub fn format_cell(value: &Value, options: &NumberFormatOptions) -> String {
    match value {
        Value::Number(n) => format_number(n, options),
        other => display_value(other),
    }
}

/// Plain string form of a JSON value. Strings are unquoted, arrays are
/// joined with ", " and objects are serialized.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    }
}

/// Like [`display_value`] but serializes every non-string value, including
/// arrays and null. Used for inline `key: value` lines.
pub fn inline_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Text a field contributes when interpolated into a line. Missing, null and
/// boolean fields contribute nothing.
pub fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(v @ (Value::Array(_) | Value::Object(_))) => v.to_string(),
        _ => String::new(),
    }
}

/// Whether an optional field is "set": present, non-null, non-empty, non-zero.
pub fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Turn a camelCase report key into a heading: "topPainPoints" -> "Top Pain Points".
pub fn title_from_key(key: &str) -> String {
    let mut spaced = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            spaced.push(' ');
        }
        spaced.push(c);
    }

    spaced
        .trim()
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Local wall-clock time of a message, e.g. "09:41".
pub fn format_clock(ts: &DateTime<FixedOffset>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}
