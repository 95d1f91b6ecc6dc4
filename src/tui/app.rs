use crate::config::SystemConfig;
use crate::controller::{Controller, Group};
use crate::error::Result;
use crate::pool::PoolSnapshot;
use crate::storage::SalesLogEntry;
use crate::vendor::Vendor;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, prelude::*};
use std::collections::VecDeque;
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ui;

/// Ledger lines kept for the tail pane
const LEDGER_TAIL: usize = 200;
/// Pool samples kept for the trend line
const HISTORY_LEN: usize = 120;
const REFRESH_INTERVAL: Duration = Duration::from_millis(500);
const MESSAGE_TTL: Duration = Duration::from_secs(4);

/// Operator console state
pub struct App {
    controller: Arc<Controller>,
    pub(super) running: bool,
    start_time: Instant,
    max_duration: Option<Duration>,
    last_refresh: Option<Instant>,

    pub(super) snapshot: PoolSnapshot,
    pub(super) config: Option<SystemConfig>,
    pub(super) vendors: Vec<Vendor>,
    pub(super) scheduled_vendors: usize,
    pub(super) ledger: Vec<SalesLogEntry>,
    pub(super) history: VecDeque<i64>,

    pub(super) selected_row: usize,
    pub(super) scroll_offset: usize,
    /// Height of the vendor table body from the last draw
    pub(super) table_height: u16,
    message: Option<(String, Instant)>,
}

impl App {
    pub fn new(controller: Arc<Controller>, max_duration: Option<Duration>) -> Self {
        let snapshot = controller.market().pool().snapshot();
        App {
            controller,
            running: true,
            start_time: Instant::now(),
            max_duration,
            last_refresh: None,
            snapshot,
            config: None,
            vendors: Vec::new(),
            scheduled_vendors: 0,
            ledger: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            selected_row: 0,
            scroll_offset: 0,
            table_height: 0,
            message: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_running(&self) -> bool {
        self.config
            .map(|cfg| cfg.system_status.is_running())
            .unwrap_or(false)
    }

    pub fn message(&self) -> Option<&str> {
        self.message
            .as_ref()
            .filter(|(_, at)| at.elapsed() < MESSAGE_TTL)
            .map(|(text, _)| text.as_str())
    }

    pub fn is_group_running(&self, group: Group) -> bool {
        self.controller.is_group_running(group)
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.main_loop(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        while self.running {
            if let Some(max) = self.max_duration
                && self.start_time.elapsed() >= max
            {
                break;
            }

            if event::poll(Duration::from_millis(50))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code, key.modifiers);
            }

            if self
                .last_refresh
                .is_none_or(|at| at.elapsed() >= REFRESH_INTERVAL)
            {
                self.refresh();
            }

            terminal.draw(|frame| {
                ui::render(frame, self);
            })?;
        }

        Ok(())
    }

    /// Pull fresh state from the engine and the store
    pub(super) fn refresh(&mut self) {
        let market = self.controller.market().clone();
        self.snapshot = market.pool().snapshot();
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(self.snapshot.total_tickets);

        match SystemConfig::load(market.config()) {
            Ok(cfg) => self.config = Some(cfg),
            Err(e) => self.set_message(format!("Config read failed: {e}")),
        }
        match self.controller.directory().list_active() {
            Ok(vendors) => self.vendors = vendors,
            Err(e) => self.set_message(format!("Vendor read failed: {e}")),
        }
        match market.ledger().recent(LEDGER_TAIL) {
            Ok(entries) => self.ledger = entries,
            Err(e) => self.set_message(format!("Ledger read failed: {e}")),
        }
        self.scheduled_vendors = self.controller.vendor_jobs().len();

        if !self.vendors.is_empty() {
            self.selected_row = self.selected_row.min(self.vendors.len() - 1);
        } else {
            self.selected_row = 0;
        }
        let visible = usize::from(self.table_height).max(1);
        if self.selected_row < self.scroll_offset {
            self.scroll_offset = self.selected_row;
        } else if self.selected_row >= self.scroll_offset + visible {
            self.scroll_offset = self.selected_row + 1 - visible;
        }

        self.last_refresh = Some(Instant::now());
    }

    fn set_message(&mut self, text: String) {
        self.message = Some((text, Instant::now()));
    }

    fn report(&mut self, done: &str, result: Result<()>) {
        match result {
            Ok(()) => self.set_message(done.to_string()),
            Err(e) => self.set_message(format!("Error: {e}")),
        }
        self.refresh();
    }

    pub(super) fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);

        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('c') if ctrl => self.running = false,

            KeyCode::Char('s') => {
                let result = self.controller.start();
                self.report("System started", result);
            }
            KeyCode::Char('x') => {
                self.controller.stop();
                self.report("System stopped", Ok(()));
            }
            KeyCode::Char('r') => {
                let result = self.controller.restart_all();
                self.report("System restarted", result);
            }
            KeyCode::Char('v') => {
                let result = self.controller.restart(Group::Vendors);
                self.report("Vendors restarted", result);
            }
            KeyCode::Char('c') => {
                let result = self.controller.restart(Group::Customers);
                self.report("Customers restarted", result);
            }

            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_row + 1 < self.vendors.len() {
                    self.selected_row += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_row = self.selected_row.saturating_sub(1);
            }
            KeyCode::Char('g') | KeyCode::Home => {
                self.selected_row = 0;
                self.scroll_offset = 0;
            }
            KeyCode::Char('G') | KeyCode::End => {
                self.selected_row = self.vendors.len().saturating_sub(1);
            }
            _ => {}
        }
    }
}
