use crossterm::style::Stylize;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use std::io::{self, Write};

use super::{Entry, ItemShape, Section, SectionPayload, Segment, SentimentSummary, Tone};

const SEGMENT_COLORS: [Color; 5] = [
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::Yellow,
    Color::LightBlue,
];

pub fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Meta => Color::Blue,
        Tone::Insights => Color::Cyan,
        Tone::Strengths => Color::Green,
        Tone::Weaknesses => Color::Red,
        Tone::Default => Color::White,
    }
}

fn segment_color(label: &str, index: usize) -> Color {
    match label.to_lowercase().as_str() {
        "positive" => Color::Green,
        "negative" => Color::Red,
        "neutral" => Color::Gray,
        "mixed" => Color::Yellow,
        _ => SEGMENT_COLORS[index % SEGMENT_COLORS.len()],
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

/// Render every section, separated by a blank line.
pub fn sections_to_lines(sections: &[Section], width: u16) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            lines.push(Line::default());
        }
        lines.extend(section_lines(section, width));
    }
    lines
}

pub fn section_lines(section: &Section, width: u16) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        section.title.clone(),
        bold().fg(tone_color(section.tone)),
    ))];

    match &section.payload {
        SectionPayload::Summary(summary) => lines.extend(summary_lines(summary)),
        SectionPayload::Segments(segments) => {
            lines.push(bar_line(segments, width));
            lines.extend(legend_lines(segments));
        }
        SectionPayload::Themes(themes) => {
            lines.extend(themes.iter().map(|t| Line::from(format!("  • {t}"))));
        }
        SectionPayload::Entries(entries) => lines.extend(entries.iter().map(entry_line)),
        SectionPayload::Items(items) => {
            for item in items {
                lines.extend(item_lines(item));
            }
        }
        SectionPayload::Text(text) => {
            lines.extend(text.lines().map(|l| Line::from(format!("  {l}"))));
        }
    }
    lines
}

fn summary_lines(summary: &SentimentSummary) -> Vec<Line<'static>> {
    let blocks = [
        ("🔹 Positive Sentiments", &summary.positive),
        ("🔸 Negative Sentiments", &summary.negative),
        ("✅ Recommendations", &summary.recommendations),
    ];

    let mut lines = Vec::new();
    for (heading, items) in blocks {
        if items.is_empty() {
            continue;
        }
        lines.push(Line::from(Span::styled(format!("  {heading}"), bold())));
        lines.extend(items.iter().map(|i| Line::from(format!("    • {i}"))));
    }
    lines
}

/// Proportional bar. Labels appear only inside segments wider than the
/// inline threshold, and only when they fit.
fn bar_line(segments: &[Segment], width: u16) -> Line<'static> {
    let inner = width.saturating_sub(4) as f64;
    let spans = segments
        .iter()
        .enumerate()
        .filter_map(|(i, seg)| {
            let cells = (seg.percent / 100.0 * inner).round() as usize;
            if cells == 0 {
                return None;
            }
            let label = if seg.shows_inline_label() && seg.label.chars().count() < cells {
                format!("{:^cells$}", seg.label)
            } else {
                " ".repeat(cells)
            };
            Some(Span::styled(
                label,
                Style::default()
                    .bg(segment_color(&seg.label, i))
                    .fg(Color::Black),
            ))
        });

    Line::from(std::iter::once(Span::raw("  ")).chain(spans).collect::<Vec<_>>())
}

fn legend_lines(segments: &[Segment]) -> Vec<Line<'static>> {
    segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            Line::from(vec![
                Span::styled("  ■ ", Style::default().fg(segment_color(&seg.label, i))),
                Span::styled(seg.label.clone(), bold()),
                Span::raw(format!(": {}", seg.legend_percent())),
            ])
        })
        .collect()
}

fn entry_line(entry: &Entry) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{}:", entry.key), bold()),
        Span::raw(format!(" {}", entry.value)),
    ])
}

pub fn item_lines(item: &ItemShape) -> Vec<Line<'static>> {
    match item {
        ItemShape::Sentiment(s) => {
            let mut spans = vec![Span::raw(format!(
                "  • \"{}\" — {}",
                s.text, s.explanation
            ))];
            if let Some(suffix) = s.meta_suffix() {
                spans.push(Span::styled(format!(" {suffix}"), dim()));
            }
            vec![Line::from(spans)]
        }
        ItemShape::Recommendation(r) => {
            let mut lines = vec![Line::from(vec![
                Span::raw("  • "),
                Span::styled(r.action.clone(), bold()),
                Span::raw(format!(" — {}", r.rationale)),
            ])];
            if let Some(details) = r.details_line() {
                lines.push(Line::from(Span::styled(format!("    {details}"), dim())));
            }
            if let Some(metrics) = r.metrics_line() {
                lines.push(Line::from(Span::styled(format!("    {metrics}"), dim())));
            }
            lines
        }
        ItemShape::Opaque(text) => vec![Line::from(format!("  • {text}"))],
    }
}

#[cfg(test)]
pub fn plain_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

/// Print rendered lines. With `styled`, bold spans keep their ANSI bold.
pub fn write_lines(out: &mut impl Write, lines: &[Line<'_>], styled: bool) -> io::Result<()> {
    for line in lines {
        for span in &line.spans {
            if styled && span.style.add_modifier.contains(Modifier::BOLD) {
                write!(out, "{}", span.content.to_string().bold())?;
            } else {
                write!(out, "{}", span.content)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
