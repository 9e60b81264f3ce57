use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{Counters, ProgressEvent, ProgressSink, RunState};
use crate::domain::{BackupMode, Subject};
use crate::error::BackupError;
use crate::worker::{Worker, WorkerMessage};

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
    Help,
}

#[derive(Debug)]
struct AppState {
    status: String,
    run_state: RunState,
    counters: Counters,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    finished: bool,
}

/// Interactive dashboard. Owns all presentation state; the backup itself runs
/// on a [`Worker`] and reaches the UI only through its channel.
pub struct Tui {
    mode: BackupMode,
    subject: String,
    destination: String,
    state: AppState,
    log_scroll: u16,
}

impl Tui {
    pub fn new(mode: BackupMode, subject: &Subject, destination: impl Into<String>) -> Self {
        Self {
            mode,
            subject: subject.to_string(),
            destination: destination.into(),
            state: AppState {
                status: "ready".to_string(),
                run_state: RunState::Idle,
                counters: Counters::default(),
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
                finished: false,
            },
            log_scroll: 0,
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, BackupError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        self.state.started = Instant::now();
        let mut worker = Worker::spawn(f);

        let mut tick = 0usize;
        let mut outcome = None;
        loop {
            if outcome.is_none() {
                while let Some(message) = worker.try_recv() {
                    match message {
                        WorkerMessage::Event(event) => self.apply(event),
                        WorkerMessage::Finished(result) => {
                            outcome = Some(result);
                            break;
                        }
                    }
                }
                if outcome.is_some() {
                    worker.join();
                    self.finish();
                }
            }

            terminal
                .draw(|frame| draw_ui(frame, self, tick))
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;

        match outcome {
            Some(result) => result.map_err(miette::Report::new),
            None => Err(miette::Report::msg("aborted")),
        }
    }

    fn finish(&mut self) {
        self.state.finished = true;
        let note = "run finished; press q to exit".to_string();
        push_bounded(&mut self.state.events, note.clone(), EVENTS_MAX);
        push_bounded(&mut self.state.logs, note, LOGS_MAX);
    }

    fn apply(&mut self, event: ProgressEvent) {
        let message = event.message.trim().to_string();
        self.state.run_state = event.state;
        self.state.counters = event.counters;
        self.state.status = message.clone();
        push_bounded(&mut self.state.events, message.clone(), EVENTS_MAX);
        push_bounded(
            &mut self.state.logs,
            format!("[{}] {message}", event.timestamp.format("%H:%M:%S")),
            LOGS_MAX,
        );
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::F(1) | KeyCode::Char('?') => self.state.view = View::Help,
            KeyCode::F(3) => self.state.view = View::Operational,
            KeyCode::F(4) | KeyCode::Char('l') => self.state.view = View::Logs,
            KeyCode::PageUp => self.scroll_logs(5),
            KeyCode::PageDown => self.scroll_logs(-5),
            KeyCode::Char('q') => return self.state.finished,
            KeyCode::Esc => {
                if self.state.view != View::Operational {
                    self.state.view = View::Operational;
                } else {
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    fn scroll_logs(&mut self, delta: i16) {
        let max_scroll = self.state.logs.len().saturating_sub(1) as i16;
        let next = (self.log_scroll as i16 + delta).clamp(0, max_scroll);
        self.log_scroll = next as u16;
    }
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, tick: usize) {
    match tui.state.view {
        View::Operational => draw_operational(frame, tui, tick),
        View::Logs => draw_logs(frame, tui, tick),
        View::Help => draw_help(frame),
    }
}

fn draw_operational(frame: &mut ratatui::Frame, tui: &Tui, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, tick), chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);
    frame.render_widget(draw_status_panel(&tui.state), main[0]);
    frame.render_widget(draw_details_panel(tui), main[1]);

    frame.render_widget(draw_footer(), chunks[2]);
}

fn draw_logs(frame: &mut ratatui::Frame, tui: &Tui, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, tick), chunks[0]);
    let visible = chunks[1].height.saturating_sub(1) as usize;
    frame.render_widget(draw_logs_view(&tui.state, tui.log_scroll, visible), chunks[1]);
    frame.render_widget(draw_footer(), chunks[2]);
}

fn draw_help(frame: &mut ratatui::Frame) {
    let block = Block::default().borders(Borders::ALL).title("Help");
    let lines = vec![
        Line::from("F1/? help   F3 dashboard   F4/l logs"),
        Line::from("PgUp/PgDown scroll logs"),
        Line::from("q quits once the run has finished; Esc leaves a view or abandons the run"),
    ];
    let view = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(view, frame.area());
}

fn draw_header(tui: &Tui, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let header_line = Line::from(vec![
        Span::styled(
            "GDRIVE-BACKUP",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Mode: "),
        Span::styled(tui.mode.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("   Subject: "),
        Span::styled(tui.subject.clone(), Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let destination_line = Line::from(Span::styled(
        format!("Destination: {}", tui.destination),
        Style::default().fg(Color::Gray),
    ));
    Paragraph::new(vec![header_line, destination_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &AppState) -> Paragraph<'static> {
    let counters = state.counters;
    let percent = percent_done(&counters);
    let state_color = match state.run_state {
        RunState::Completed => Color::Green,
        RunState::Failed => Color::Red,
        RunState::Idle => Color::Yellow,
        _ => Color::Cyan,
    };
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("State: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<14} ", state.run_state.label()),
                Style::default().fg(state_color),
            ),
            Span::raw(progress_bar(percent)),
            Span::raw(format!(" {percent:>3}%")),
        ]),
        Line::from(vec![
            Span::styled("Processed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}/{}", counters.processed, counters.total)),
            Span::styled("   Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}s", state.started.elapsed().as_secs())),
        ]),
        Line::from(vec![
            Span::styled("Saved: ", Style::default().fg(Color::Gray)),
            Span::styled(
                counters.succeeded.to_string(),
                Style::default().fg(Color::Green),
            ),
            Span::styled("   Skipped: ", Style::default().fg(Color::Gray)),
            Span::styled(counters.skipped.to_string(), Style::default().fg(Color::Yellow)),
            Span::styled("   Failed: ", Style::default().fg(Color::Gray)),
            Span::styled(counters.failed.to_string(), Style::default().fg(Color::Red)),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];

    for event in state.events.iter().rev().take(4) {
        lines.push(Line::from(format!("- {event}")));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_details_panel(tui: &Tui) -> Paragraph<'static> {
    let lines = vec![
        Line::from(Span::styled(
            "DETAILS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(tui.state.status.clone()),
        ]),
        Line::from(vec![
            Span::styled("Log lines: ", Style::default().fg(Color::Gray)),
            Span::raw(tui.state.logs.len().to_string()),
        ]),
    ];
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_footer() -> Paragraph<'static> {
    Paragraph::new(Line::from(Span::styled(
        "F1 help  F4 logs  q quit when done  Esc abandon",
        Style::default().fg(Color::DarkGray),
    )))
    .block(Block::default().borders(Borders::TOP))
}

fn draw_logs_view(state: &AppState, scroll: u16, visible: usize) -> Paragraph<'static> {
    let total = state.logs.len();
    let start = total.saturating_sub(scroll as usize + visible);
    let mut lines = Vec::with_capacity(visible + 1);
    lines.push(Line::from(Span::styled(
        "LOGS (PgUp/PgDown)",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));
    for line in state.logs.iter().skip(start).take(visible) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn percent_done(counters: &Counters) -> u8 {
    if counters.total == 0 {
        return 0;
    }
    ((counters.processed * 100) / counters.total).min(100) as u8
}

fn progress_bar(percent: u8) -> String {
    let total = 20;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;
    use crossterm::event::KeyModifiers;

    use super::*;

    fn dashboard() -> Tui {
        let subject: Subject = "someone@example.com".parse().unwrap();
        Tui::new(BackupMode::Full, &subject, "/tmp/backup")
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn q_is_ignored_while_the_run_is_active() {
        let mut tui = dashboard();
        tui.apply(ProgressEvent {
            timestamp: Local::now(),
            message: "backup complete".to_string(),
            state: RunState::Completed,
            counters: Counters::default(),
            elapsed: None,
        });
        assert!(!tui.handle_key(press(KeyCode::Char('q'))));
        assert_eq!(tui.state.run_state, RunState::Completed);

        tui.finish();
        assert!(tui.handle_key(press(KeyCode::Char('q'))));
        assert_eq!(tui.state.events.back().unwrap(), "run finished; press q to exit");
    }

    #[test]
    fn esc_leaves_a_view_before_quitting() {
        let mut tui = dashboard();
        assert!(!tui.handle_key(press(KeyCode::F(4))));
        assert_eq!(tui.state.view, View::Logs);
        assert!(!tui.handle_key(press(KeyCode::Esc)));
        assert_eq!(tui.state.view, View::Operational);
        assert!(tui.handle_key(press(KeyCode::Esc)));
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0), "[....................]");
        assert_eq!(progress_bar(50), "[##########..........]");
        assert_eq!(progress_bar(100), "[####################]");
    }

    #[test]
    fn percent_handles_empty_runs() {
        let mut counters = Counters::default();
        assert_eq!(percent_done(&counters), 0);
        counters.total = 4;
        counters.processed = 3;
        assert_eq!(percent_done(&counters), 75);
    }
}
