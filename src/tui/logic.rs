use ratatui::text::Line;

use crate::pipeline::{PipelineState, Stage};
use crate::urls::UrlState;

/// Right-hand status next to the URL summary.
pub fn queue_status(urls: &UrlState, pipeline: &PipelineState) -> &'static str {
    if !urls.is_ready() {
        return "Async queue";
    }
    if !pipeline.is_running() {
        return "Ready to analyze";
    }
    match pipeline.stage() {
        Stage::Idle => "Starting",
        stage => stage.status_text().unwrap_or("Starting"),
    }
}

/// Offset that puts the last line at the bottom of a viewport.
pub fn scroll_to_latest(total_lines: usize, viewport_height: u16) -> u16 {
    let offset = total_lines.saturating_sub(viewport_height as usize);
    u16::try_from(offset).unwrap_or(u16::MAX)
}

/// Rows for the chat composer: one per input line, within `[1, max_rows]`.
pub fn composer_height(input: &str, max_rows: usize) -> u16 {
    let rows = input.split('\n').count().clamp(1, max_rows.max(1));
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// Rows the lines take once wrapped to `width` columns.
pub fn wrapped_height(lines: &[Line<'_>], width: u16) -> usize {
    let width = width.max(1) as usize;
    lines
        .iter()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum()
}

/// Keeps a viewport pinned to the newest content.
///
/// The offset jumps to the end whenever the watched revision or the busy flag
/// changes; manual scrolling in between is left alone.
#[derive(Debug, Default)]
pub struct FollowLatest {
    seen: Option<(u64, bool)>,
    offset: u16,
}

impl FollowLatest {
    #[cfg(test)]
    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn sync(&mut self, revision: u64, busy: bool, total_lines: usize, viewport_height: u16) -> u16 {
        let max = scroll_to_latest(total_lines, viewport_height);
        if self.seen != Some((revision, busy)) {
            self.seen = Some((revision, busy));
            self.offset = max;
        }
        self.offset = self.offset.min(max);
        self.offset
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.offset = self.offset.saturating_sub(rows);
    }

    /// Clamped to the bottom on the next [`sync`](Self::sync).
    pub fn scroll_down(&mut self, rows: u16) {
        self.offset = self.offset.saturating_add(rows);
    }
}
