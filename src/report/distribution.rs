use serde_json::{Map, Value};

/// Segments narrower than this keep their label out of the inline bar.
pub const INLINE_LABEL_MIN_PERCENT: f64 = 12.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub label: String,
    pub value: f64,
    pub percent: f64,
}

impl Segment {
    pub fn shows_inline_label(&self) -> bool {
        self.percent > INLINE_LABEL_MIN_PERCENT
    }

    /// One-decimal percentage used by the legend, e.g. "70.0%".
    pub fn legend_percent(&self) -> String {
        format!("{:.1}%", self.percent)
    }
}

/// Split a label -> count mapping into proportional segments, keeping the
/// mapping's order. The total is floored at 1 so an all-zero distribution
/// yields zero-width segments.
pub fn segments<'a, I>(counts: I) -> Vec<Segment>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let counts: Vec<(&str, f64)> = counts.into_iter().collect();
    let total = counts.iter().map(|(_, v)| *v).sum::<f64>().max(1.0);

    counts
        .into_iter()
        .map(|(label, value)| Segment {
            label: label.to_string(),
            value,
            percent: value / total * 100.0,
        })
        .collect()
}

/// [`segments`] over a report mapping. Non-numeric counts count as zero.
pub fn segments_from_map(map: &Map<String, Value>) -> Vec<Segment> {
    segments(
        map.iter()
            .map(|(k, v)| (k.as_str(), v.as_f64().unwrap_or(0.0))),
    )
}
