//! Live view of an assessment run with progress display

use crate::proxy::{AssessConfig, Assessment, Assessor, CandidateList, Progress, ProxyResult};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Duration;

/// Maximum number of recent results to keep per list
const MAX_RECENT_RESULTS: usize = 100;

/// Assessment TUI application state
pub struct AssessApp {
    /// Candidates to assess; handed to the run when it starts
    candidates: Vec<String>,
    /// Assessment configuration
    config: AssessConfig,
    /// Where the accepted set is written once the run completes
    accepted_output: Option<PathBuf>,
    /// Progress after the latest result
    progress: Progress,
    /// Number of results meeting the threshold
    accepted_count: usize,
    /// Number of results below the threshold or failed
    rejected_count: usize,
    /// Most recent accepted results, oldest first
    recent_accepted: VecDeque<ProxyResult>,
    /// Most recent rejected results, oldest first
    recent_rejected: VecDeque<ProxyResult>,
    /// Selected list (0 = accepted, 1 = rejected)
    selected_list: usize,
    /// Selected item in the current list
    list_state: ListState,
    /// Status bar text
    status_message: String,
    /// Final assessment, set once the run completes
    assessment: Option<Assessment>,
    /// Whether the user wants to quit
    should_quit: bool,
}

impl AssessApp {
    pub fn new(candidates: Vec<String>, config: AssessConfig, accepted_output: Option<PathBuf>) -> Self {
        let total = candidates.len();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            candidates,
            config,
            accepted_output,
            progress: Progress::new(0, total),
            accepted_count: 0,
            rejected_count: 0,
            recent_accepted: VecDeque::new(),
            recent_rejected: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting assessment... Press 'q' to quit.".to_string(),
            assessment: None,
            should_quit: false,
        }
    }

    /// Run the TUI; returns the assessment unless the user quit before it finished
    pub async fn run(mut self) -> Result<Option<Assessment>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result?;
        Ok(self.assessment)
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let assessor = Assessor::with_config(self.config.clone());
        let (mut rx, handle) = assessor.assess_stream(std::mem::take(&mut self.candidates));
        let mut handle = Some(handle);

        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            match rx.try_recv() {
                Ok((result, progress)) => self.record(result, progress),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    if let Some(handle) = handle.take() {
                        let assessment = handle.await??;
                        self.finish(&assessment)?;
                        self.assessment = Some(assessment);
                    }
                }
            }
        }

        if let Some(handle) = handle {
            handle.abort();
        }

        Ok(())
    }

    fn record(&mut self, result: ProxyResult, progress: Progress) {
        self.progress = progress;

        let list = if result.meets_threshold(self.config.threshold_mbps) {
            self.accepted_count += 1;
            &mut self.recent_accepted
        } else {
            self.rejected_count += 1;
            &mut self.recent_rejected
        };
        list.push_back(result);
        if list.len() > MAX_RECENT_RESULTS {
            list.pop_front();
        }

        self.status_message = format!(
            "Assessing... {:.0}% ({}/{}) | Accepted: {} | Rejected: {}",
            progress.fraction() * 100.0,
            progress.completed,
            progress.total,
            self.accepted_count,
            self.rejected_count
        );
    }

    fn finish(&mut self, assessment: &Assessment) -> Result<()> {
        let saved = match &self.accepted_output {
            Some(path) => {
                CandidateList::save_to_file(&assessment.accepted, path)?;
                format!(" | Saved to {}", path.display())
            }
            None => String::new(),
        };

        self.status_message = format!(
            "Complete! Assessed: {} | Accepted: {} | Rejected: {}{} | Press 'q' to quit",
            assessment.report.len(),
            assessment.accepted.len(),
            assessment.report.len() - assessment.accepted.len(),
            saved
        );
        Ok(())
    }

    fn handle_input(&mut self, key: KeyCode) {
        let len = if self.selected_list == 0 {
            self.recent_accepted.len()
        } else {
            self.recent_rejected.len()
        };

        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let i = match self.list_state.selected() {
                    Some(i) if i < len.saturating_sub(1) => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(f.size());

        let title = Paragraph::new(format!(
            "Proxy Assessment (threshold {} MB/s, {} rounds)",
            self.config.threshold_mbps, self.config.rounds
        ))
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let percent = (self.progress.fraction() * 100.0) as u16;
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(percent.min(100))
            .label(format!(
                "{}/{} ({}%)",
                self.progress.completed, self.progress.total, percent
            ));
        f.render_widget(gauge, chunks[1]);

        let list_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        Self::render_result_list(
            f,
            list_chunks[0],
            "Accepted",
            &self.recent_accepted,
            self.accepted_count,
            Color::Green,
            if self.selected_list == 0 { Some(&mut self.list_state) } else { None },
        );

        Self::render_result_list(
            f,
            list_chunks[1],
            "Rejected",
            &self.recent_rejected,
            self.rejected_count,
            Color::Red,
            if self.selected_list == 1 { Some(&mut self.list_state) } else { None },
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.assessment.is_some() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    fn render_result_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        results: &VecDeque<ProxyResult>,
        total_count: usize,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = results
            .iter()
            .rev()
            .map(|result| ListItem::new(result_line(result)).style(Style::default().fg(color)))
            .collect();

        let border_style = if list_state.is_some() {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} ({})", title, total_count))
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}

/// One list row: measurements for successes, status text otherwise
fn result_line(result: &ProxyResult) -> String {
    match (result.average_latency_secs, result.average_throughput_mbps) {
        (Some(latency), Some(mbps)) if result.is_success() => {
            format!("{} ({:.3}s, {:.2} MB/s)", result.address, latency, mbps)
        }
        _ => format!("{} - {}", result.address, result.status_text()),
    }
}
