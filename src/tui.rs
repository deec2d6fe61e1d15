use anyhow::{Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Gauge, Paragraph, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::chat::{self, ChatController, ChatState};
use crate::client::AnalysisApi;
use crate::config::Config;
use crate::flight::Completion;
use crate::overall::OverallController;
use crate::pipeline::{Navigate, PipelineRunner, RunOutcome, STEPS, Stage, StepMarker};
use crate::report::render;
use crate::types::MessageRole;
use crate::urls::{SubmitStatus, UrlController};
use crate::utils::{NumberFormatOptions, format_clock};

pub mod logic;

use logic::{FollowLatest, composer_height, queue_status, scroll_to_latest, wrapped_height};

const TICK: Duration = Duration::from_millis(50);
const PAGE: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Overall,
    Chat,
    Research,
    Pipeline,
}

impl View {
    pub const ALL: [View; 4] = [View::Overall, View::Chat, View::Research, View::Pipeline];

    pub fn title(self) -> &'static str {
        match self {
            View::Overall => "Overall Analysis",
            View::Chat => "Chat with Agent",
            View::Research => "Research",
            View::Pipeline => "Pipeline",
        }
    }

    fn index(self) -> usize {
        View::ALL.iter().position(|v| *v == self).unwrap_or(0)
    }

    fn next(self) -> View {
        View::ALL[(self.index() + 1) % View::ALL.len()]
    }

    fn prev(self) -> View {
        View::ALL[(self.index() + View::ALL.len() - 1) % View::ALL.len()]
    }
}

/// Completions reported back to the UI loop by spawned tasks.
#[derive(Debug)]
pub enum AppEvent {
    Overall(Completion),
    Chat(Completion),
    Urls(Completion),
    Stage(Stage),
    Navigate(Navigate),
    PipelineFinished(RunOutcome),
}

pub struct App {
    overall: OverallController,
    chat: ChatController,
    urls: UrlController,
    pipeline: PipelineRunner,
    options: NumberFormatOptions,
    research_url: String,
    max_input_rows: usize,
    view: View,
    report_scroll: u16,
    chat_follow: FollowLatest,
    events: UnboundedSender<AppEvent>,
    should_quit: bool,
}

impl App {
    pub fn new(api: Arc<dyn AnalysisApi>, config: &Config, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            overall: OverallController::new(api.clone()),
            chat: ChatController::new(api.clone()),
            urls: UrlController::new(api.clone()),
            pipeline: PipelineRunner::new(api, config.settle_delay()),
            options: config.number_format(),
            research_url: config.server.research_url.clone(),
            max_input_rows: usize::from(config.chat.max_input_rows),
            view: View::Overall,
            report_scroll: 0,
            chat_follow: FollowLatest::default(),
            events,
            should_quit: false,
        }
    }

    #[cfg(test)]
    pub fn view(&self) -> View {
        self.view
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Switch views. Opening the overall view loads the report unless one is
    /// already there.
    pub fn select(&mut self, view: View) {
        self.view = view;
        if view == View::Overall {
            self.refresh(false);
        }
    }

    fn refresh(&self, force: bool) {
        let overall = self.overall.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(done) = overall.fetch(force).await {
                let _ = events.send(AppEvent::Overall(done));
            }
        });
    }

    fn send_chat(&self) {
        {
            let state = self.chat.state();
            if state.ended || !state.composer_enabled() || state.input.trim().is_empty() {
                return;
            }
        }
        let chat = self.chat.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(done) = chat.submit_composer().await {
                let _ = events.send(AppEvent::Chat(done));
            }
        });
    }

    fn submit_urls(&self) {
        if !self.urls.state().can_submit() {
            return;
        }
        let urls = self.urls.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(done) = urls.submit().await {
                let _ = events.send(AppEvent::Urls(done));
            }
        });
    }

    fn run_pipeline(&self) {
        let ready = self.urls.state().is_ready();
        if !ready || self.pipeline.state().is_running() {
            return;
        }
        let runner = self.pipeline.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let stages = events.clone();
            let navigate = events.clone();
            let outcome = runner
                .run(
                    move |stage| {
                        let _ = stages.send(AppEvent::Stage(stage));
                    },
                    move |target| {
                        let _ = navigate.send(AppEvent::Navigate(target));
                    },
                )
                .await;
            if let Some(outcome) = outcome {
                let _ = events.send(AppEvent::PipelineFinished(outcome));
            }
        });
    }

    pub fn on_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Navigate(Navigate::Results) => {
                self.view = View::Overall;
                self.report_scroll = 0;
                self.refresh(true);
            }
            AppEvent::Overall(done) | AppEvent::Chat(done) | AppEvent::Urls(done) => {
                debug!(generation = done.generation, applied = done.applied, "operation finished");
            }
            AppEvent::Stage(stage) => debug!(?stage, "pipeline stage"),
            AppEvent::PipelineFinished(outcome) => debug!(?outcome, "pipeline finished"),
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.select(self.view.next()),
            KeyCode::BackTab => self.select(self.view.prev()),
            KeyCode::PageUp => self.scroll_up(),
            KeyCode::PageDown => self.scroll_down(),
            _ => match self.view {
                View::Overall | View::Research => self.on_navigation_key(key),
                View::Chat => self.on_chat_key(key),
                View::Pipeline => self.on_pipeline_key(key),
            },
        }
    }

    fn scroll_up(&mut self) {
        match self.view {
            View::Overall => self.report_scroll = self.report_scroll.saturating_sub(PAGE),
            View::Chat => self.chat_follow.scroll_up(PAGE),
            _ => {}
        }
    }

    fn scroll_down(&mut self) {
        match self.view {
            View::Overall => self.report_scroll = self.report_scroll.saturating_add(PAGE),
            View::Chat => self.chat_follow.scroll_down(PAGE),
            _ => {}
        }
    }

    fn on_navigation_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => self.refresh(true),
            KeyCode::Char(c @ '1'..='4') => {
                let index = c as usize - '1' as usize;
                self.select(View::ALL[index]);
            }
            _ => {}
        }
    }

    fn on_chat_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);
        match key.code {
            KeyCode::Char('n') if ctrl => {
                let allowed = self.chat.state().can_start_new();
                if allowed {
                    self.chat.start_new();
                }
            }
            KeyCode::Char('e') if ctrl => {
                let allowed = self.chat.state().can_end();
                if allowed {
                    self.chat.end();
                }
            }
            KeyCode::Enter if alt => self.edit_composer(|input| input.push('\n')),
            KeyCode::Enter => self.send_chat(),
            KeyCode::Backspace => self.edit_composer(|input| {
                input.pop();
            }),
            KeyCode::Char(c) if !ctrl => self.edit_composer(|input| input.push(c)),
            _ => {}
        }
    }

    fn edit_composer(&self, edit: impl FnOnce(&mut String)) {
        let mut state = self.chat.state();
        if state.composer_enabled() {
            edit(&mut state.input);
        }
    }

    fn on_pipeline_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);
        match key.code {
            KeyCode::Char('r') if ctrl => self.run_pipeline(),
            KeyCode::Char('a') if ctrl => self.edit_urls(|urls| urls.append_recommended()),
            KeyCode::Char('l') if ctrl => {
                let running = self.pipeline.state().is_running();
                let mut urls = self.urls.state();
                if !running && urls.can_clear() {
                    urls.clear();
                    self.pipeline.state().reset();
                }
            }
            KeyCode::Enter if alt => self.edit_urls(|urls| urls.push('\n')),
            KeyCode::Enter => self.submit_urls(),
            KeyCode::Backspace => self.edit_urls(|urls| urls.backspace()),
            KeyCode::Char(c) if !ctrl => self.edit_urls(|urls| urls.push(c)),
            _ => {}
        }
    }

    fn edit_urls(&self, edit: impl FnOnce(&mut crate::urls::UrlState)) {
        let running = self.pipeline.state().is_running();
        let mut urls = self.urls.state();
        if !running && !urls.is_submitting() {
            edit(&mut *urls);
        }
    }

    /// Abandon everything in flight.
    pub fn dispose(&self) {
        self.overall.dispose();
        self.chat.dispose();
        self.pipeline.dispose();
    }
}

pub fn draw(frame: &mut Frame, app: &mut App) {
    let [header, body, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let tabs = Tabs::new(View::ALL.map(View::title))
        .select(app.view.index())
        .block(Block::bordered().title(" Voice of Customer Analysis "))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, header);

    match app.view {
        View::Overall => draw_overall(frame, body, app),
        View::Chat => draw_chat(frame, body, app),
        View::Research => draw_research(frame, body, app),
        View::Pipeline => draw_pipeline(frame, body, app),
    }

    let help = match app.view {
        View::Overall | View::Research => "Tab/1-4 switch  r refresh  PgUp/PgDn scroll  q quit",
        View::Chat => "Enter send  Alt+Enter newline  Ctrl+N new  Ctrl+E end  Tab switch  Esc quit",
        View::Pipeline => "Enter submit  Ctrl+A recommended  Ctrl+L clear  Ctrl+R run  Tab switch  Esc quit",
    };
    frame.render_widget(
        Paragraph::new(Span::styled(help, Style::default().fg(Color::DarkGray))),
        footer,
    );
}

fn inner_size(area: Rect) -> (u16, u16) {
    (area.width.saturating_sub(2), area.height.saturating_sub(2))
}

fn draw_overall(frame: &mut Frame, area: Rect, app: &mut App) {
    let (width, height) = inner_size(area);
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut title = String::from(" Overall Analysis ");
    {
        let state = app.overall.state();
        if let Some(error) = &state.error {
            lines.push(Line::from(Span::styled(
                format!("Error: {error}"),
                Style::default().fg(Color::Red),
            )));
            lines.push(Line::default());
        }
        match &state.report {
            None if state.is_loading() => lines.push(Line::from("Loading overall analysis...")),
            None => lines.push(Line::from("No report loaded. Press r to refresh.")),
            Some(_) => {
                let sections = state.sections(&app.options);
                if sections.is_empty() {
                    lines.push(Line::from("No report data."));
                } else {
                    lines.extend(render::sections_to_lines(&sections, width));
                }
                if state.is_loading() {
                    title = String::from(" Overall Analysis (refreshing...) ");
                }
            }
        }
    }

    let max = scroll_to_latest(wrapped_height(&lines, width), height);
    app.report_scroll = app.report_scroll.min(max);
    let paragraph = Paragraph::new(lines)
        .block(Block::bordered().title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.report_scroll, 0));
    frame.render_widget(paragraph, area);
}

/// Transcript lines: empty prompt, ended banner, messages, thinking
/// placeholder, error.
pub fn chat_lines(state: &ChatState) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    if state.shows_empty_prompt() {
        lines.push(Line::from(chat::EMPTY_PROMPT));
        lines.extend(
            chat::SUGGESTIONS
                .iter()
                .map(|s| Line::from(Span::styled(format!("  • {s}"), dim))),
        );
    }
    if state.ended {
        lines.push(Line::from(Span::styled(
            chat::ENDED_BANNER,
            Style::default().fg(Color::Yellow),
        )));
        lines.push(Line::default());
    }

    for message in &state.messages {
        let role_color = match message.role {
            MessageRole::Assistant => Color::Cyan,
            MessageRole::User => Color::Green,
        };
        let mut role_line = vec![Span::styled(
            chat::role_label(message.role),
            Style::default().fg(role_color).add_modifier(Modifier::BOLD),
        )];
        if let Some(ts) = message.created_at() {
            role_line.push(Span::styled(format!("  {}", format_clock(&ts)), dim));
        }
        lines.push(Line::from(role_line));
        lines.extend(message.text.lines().map(|l| Line::from(format!("  {l}"))));

        let sources = message.visible_sources();
        if !sources.is_empty() {
            lines.push(Line::from(Span::styled("  Sources:", dim)));
            lines.extend(
                sources
                    .iter()
                    .map(|s| Line::from(Span::styled(format!("    - {}", s.display()), dim))),
            );
        }
        lines.push(Line::default());
    }

    if state.shows_thinking() {
        lines.push(Line::from(vec![
            Span::styled(
                chat::role_label(MessageRole::Assistant),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled("  …", dim),
        ]));
        lines.push(Line::from(Span::styled("  thinking...", dim)));
    }
    if let Some(error) = &state.last_error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    lines
}

fn draw_chat(frame: &mut Frame, area: Rect, app: &mut App) {
    let state = app.chat.state();
    let composer_rows = composer_height(&state.input, app.max_input_rows);
    let [header, transcript_area, composer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(composer_rows + 2),
    ])
    .areas(area);

    let action = |label: &str, enabled: bool| {
        let style = if enabled {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Span::styled(format!("[{label}] "), style)
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            action("Ctrl+N New Conversation", state.can_start_new()),
            action("Ctrl+E End Conversation", state.can_end()),
            Span::styled(state.thread_label(), Style::default().fg(Color::Blue)),
        ])),
        header,
    );

    let lines = chat_lines(&state);
    let (width, height) = inner_size(transcript_area);
    let offset = app.chat_follow.sync(
        state.revision(),
        state.is_sending(),
        wrapped_height(&lines, width),
        height,
    );
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::bordered().title(" Conversation "))
            .wrap(Wrap { trim: false })
            .scroll((offset, 0)),
        transcript_area,
    );

    let (text, style) = if state.input.is_empty() {
        let placeholder = if state.ended {
            chat::ENDED_PLACEHOLDER
        } else {
            chat::COMPOSER_PLACEHOLDER
        };
        (placeholder.to_string(), Style::default().fg(Color::DarkGray))
    } else if state.composer_enabled() {
        (state.input.clone(), Style::default())
    } else {
        (state.input.clone(), Style::default().fg(Color::DarkGray))
    };
    let title = if state.is_sending() { " Sending... " } else { " Message " };
    frame.render_widget(
        Paragraph::new(text)
            .style(style)
            .block(Block::bordered().title(title))
            .wrap(Wrap { trim: false }),
        composer,
    );
}

fn draw_research(frame: &mut Frame, area: Rect, app: &App) {
    let lines = vec![
        Line::from("The research workspace runs in the browser."),
        Line::default(),
        Line::from(Span::styled(
            app.research_url.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::UNDERLINED),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title(" Research ")),
        area,
    );
}

fn step_style(marker: StepMarker) -> Style {
    match marker {
        StepMarker::Done => Style::default().fg(Color::Green),
        StepMarker::Active => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        StepMarker::Failed => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        StepMarker::Pending(_) => Style::default().fg(Color::DarkGray),
    }
}

fn draw_pipeline(frame: &mut Frame, area: Rect, app: &mut App) {
    let urls = app.urls.state();
    let pipeline = app.pipeline.state();
    let show_progress = urls.is_ready() && pipeline.has_progress();

    let [input_area, status_area, progress_area] = Layout::vertical([
        Constraint::Min(5),
        Constraint::Length(3),
        Constraint::Length(if show_progress { 5 } else { 0 }),
    ])
    .areas(area);

    let input = if urls.input.is_empty() {
        Paragraph::new("Enter one URL per line, or press Ctrl+A for the recommended list...")
            .style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(urls.input.clone())
    };
    frame.render_widget(
        input.block(Block::bordered().title(" Submit URLs for Sentiment Analysis ")),
        input_area,
    );

    let submit_line = match (&urls.status, urls.is_submitting()) {
        (_, true) => Line::from("Submitting..."),
        (SubmitStatus::Submitted(msg), _) => {
            Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Green)))
        }
        (SubmitStatus::Failed(msg), _) => {
            Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Red)))
        }
        (SubmitStatus::Idle, _) => Line::default(),
    };
    let mut actions = vec![Span::raw(format!("[Enter] Submit ({})  ", urls.url_count()))];
    if urls.is_ready() {
        actions.push(Span::styled(
            format!("[Ctrl+R] {}  ", pipeline.button_text()),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }
    actions.push(Span::raw("[Ctrl+L] Clear"));
    let status = vec![
        Line::from(vec![
            Span::raw(urls.summary()),
            Span::styled(
                format!("  ·  {}", queue_status(&urls, &pipeline)),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        submit_line,
        Line::from(actions),
    ];
    frame.render_widget(Paragraph::new(status), status_area);

    if show_progress {
        let [gauge_area, steps_area] =
            Layout::vertical([Constraint::Length(3), Constraint::Length(2)]).areas(progress_area);
        let gauge_color = if pipeline.stage() == Stage::Error {
            Color::Red
        } else {
            Color::Green
        };
        frame.render_widget(
            Gauge::default()
                .block(Block::bordered().title(" Analysis "))
                .gauge_style(Style::default().fg(gauge_color))
                .percent(u16::from(pipeline.progress_percent()))
                .label(pipeline.progress_text()),
            gauge_area,
        );

        let mut steps = Vec::new();
        for step in STEPS {
            let marker = pipeline.step_marker(step);
            steps.push(Span::styled(
                format!("{} {}   ", marker.symbol(), step.step_label()),
                step_style(marker),
            ));
        }
        let status_text = pipeline.stage().status_text().unwrap_or_default();
        let mut status_line = vec![Span::raw(status_text.to_string())];
        if let Some(error) = pipeline.error() {
            status_line.push(Span::styled(
                format!(": {error}"),
                Style::default().fg(Color::Red),
            ));
        }
        frame.render_widget(
            Paragraph::new(vec![Line::from(steps), Line::from(status_line)]),
            steps_area,
        );
    }
}

/// Drive the UI until quit. Input comes through `poll`/`read` so tests can
/// script it; `max_iterations` bounds the loop for the same reason.
pub async fn run_app<B, P, R>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &mut UnboundedReceiver<AppEvent>,
    mut poll: P,
    mut read: R,
    max_iterations: Option<usize>,
) -> Result<()>
where
    B: Backend,
    P: FnMut(Duration) -> io::Result<bool>,
    R: FnMut() -> io::Result<Event>,
{
    let mut iterations = 0usize;
    loop {
        while let Ok(event) = events.try_recv() {
            app.on_event(event);
        }

        terminal
            .draw(|frame| draw(frame, app))
            .map_err(|e| anyhow!("Failed to draw: {e}"))?;

        if poll(TICK)? {
            if let Event::Key(key) = read()? {
                app.on_key(key);
            }
        }

        if app.should_quit() {
            break;
        }
        iterations += 1;
        if max_iterations.is_some_and(|max| iterations >= max) {
            break;
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}

pub async fn run(api: Arc<dyn AnalysisApi>, config: &Config) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::new(api, config, tx);
    app.select(View::Overall);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(&mut terminal, &mut app, &mut rx, event::poll, event::read, None).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    app.dispose();
    result
}
