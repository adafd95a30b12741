use anyhow::Result;
use chrono::Timelike;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use vehicle_access::clock::format_timestamp;
use vehicle_access::{
    aggregate, daily_summary, entries_today, export_entries_to_dir, export_vehicles_to_dir,
    list_active_vehicles, list_all_vehicles, register_vehicle, AccessError, AppConfig, Clock,
    DailySummary, EntryCategory, EntryStats, EntryView, GuardSession, LookupOutcome, NewVehicle,
    StatsPeriod, Vehicle, VehicleStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Gate,
    Register,
    Vehicles,
    Entries,
    Stats,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Gate => Page::Register,
            Page::Register => Page::Vehicles,
            Page::Vehicles => Page::Entries,
            Page::Entries => Page::Stats,
            Page::Stats => Page::Gate,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Gate => Page::Stats,
            Page::Register => Page::Gate,
            Page::Vehicles => Page::Register,
            Page::Entries => Page::Vehicles,
            Page::Stats => Page::Entries,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Gate => "Gate",
            Page::Register => "Register",
            Page::Vehicles => "Vehicles",
            Page::Entries => "Today",
            Page::Stats => "Statistics",
        }
    }
}

/// Which text field receives keystrokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    None,
    Guard,
    Plate,
    Form(usize),
    Filter(usize),
}

const FORM_LABELS: [&str; 8] = [
    "Plate *", "Owner *", "Unit *", "Make", "Model", "Color", "Phone", "Notes",
];
const FILTER_LABELS: [&str; 3] = ["Plate", "Unit", "Owner"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

/// The parts of `AppConfig` the screens need
#[derive(Debug, Clone)]
pub struct UiSettings {
    pub site_name: String,
    pub top_vehicles: usize,
    pub refresh_seconds: u64,
    pub export_dir: PathBuf,
}

impl From<&AppConfig> for UiSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            site_name: config.site.name.clone(),
            top_vehicles: config.reporting.top_vehicles,
            refresh_seconds: config.reporting.refresh_seconds.max(1),
            export_dir: config.reporting.export_dir.clone(),
        }
    }
}

pub struct App<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
    pub settings: UiSettings,
    pub session: GuardSession,
    pub current_page: Page,
    pub focus: Focus,

    // Gate
    pub guard_input: String,
    pub plate_input: String,
    pub category: EntryCategory,

    // Register
    pub form: NewVehicle,

    // Vehicles
    pub vehicles: Vec<Vehicle>,
    pub show_all: bool,
    pub vehicles_state: TableState,

    // Today
    pub entries: Vec<EntryView>,
    pub entries_state: TableState,

    // Statistics
    pub period: StatsPeriod,
    pub stats: Option<EntryStats>,

    pub summary: Option<DailySummary>,
    pub message: Option<(String, MessageKind)>,
}

impl<'a> App<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock, settings: UiSettings) -> Self {
        let mut app = Self {
            conn,
            clock,
            settings,
            session: GuardSession::new(),
            current_page: Page::Gate,
            focus: Focus::Guard,
            guard_input: String::new(),
            plate_input: String::new(),
            category: EntryCategory::default(),
            form: NewVehicle::default(),
            vehicles: Vec::new(),
            show_all: false,
            vehicles_state: TableState::default(),
            entries: Vec::new(),
            entries_state: TableState::default(),
            period: StatsPeriod::Daily,
            stats: None,
            summary: None,
            message: None,
        };
        app.reload();
        app
    }

    fn info(&mut self, text: impl Into<String>) {
        self.message = Some((text.into(), MessageKind::Info));
    }

    fn success(&mut self, text: impl Into<String>) {
        self.message = Some((text.into(), MessageKind::Success));
    }

    fn fail(&mut self, err: AccessError) {
        let text = match &err {
            AccessError::Validation(fields) => fields
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; "),
            AccessError::Storage(_) | AccessError::Io(_) | AccessError::Export(_) => {
                tracing::error!("Operation failed: {}", err);
                err.to_string()
            }
            _ => err.to_string(),
        };
        self.message = Some((text, MessageKind::Error));
    }

    /// Re-run every read query behind the screens
    pub fn reload(&mut self) {
        if let Err(e) = self.try_reload() {
            self.fail(e);
        }
    }

    fn try_reload(&mut self) -> Result<(), AccessError> {
        self.summary = Some(daily_summary(self.conn, self.clock)?);

        let vehicles = if self.show_all {
            list_all_vehicles(self.conn)?
        } else {
            list_active_vehicles(self.conn)?
        };
        self.vehicles = self.session.vehicle_filter.apply(&vehicles);
        clamp_selection(&mut self.vehicles_state, self.vehicles.len());

        self.entries = entries_today(self.conn, self.clock)?;
        clamp_selection(&mut self.entries_state, self.entries.len());

        self.stats = Some(aggregate(
            self.conn,
            self.clock,
            self.period.window_days(),
            self.settings.top_vehicles,
        )?);

        Ok(())
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.focus = self.default_focus();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.focus = self.default_focus();
    }

    fn default_focus(&self) -> Focus {
        match self.current_page {
            Page::Gate if self.session.guard().is_none() => Focus::Guard,
            Page::Gate => Focus::Plate,
            _ => Focus::None,
        }
    }

    pub fn selected_vehicle(&self) -> Option<&Vehicle> {
        self.vehicles_state.selected().and_then(|i| self.vehicles.get(i))
    }

    // ------------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------------

    pub fn sign_in(&mut self) {
        let name = self.guard_input.clone();
        match self.session.sign_in(&name) {
            Ok(guard) => {
                let text = format!("Guard on duty: {}", guard);
                self.success(text);
                self.focus = Focus::Plate;
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn check_plate(&mut self) {
        let plate = self.plate_input.clone();
        match self.session.lookup(self.conn, &plate) {
            Ok(LookupOutcome::Authorized { vehicle }) => {
                let text = format!("{} authorized. Press y to log the entry", vehicle.plate);
                self.info(text);
                self.focus = Focus::None;
            }
            Ok(LookupOutcome::NotAuthorized { plate }) => {
                let text = format!("{} is NOT authorized", plate);
                self.message = Some((text, MessageKind::Error));
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn confirm_entry(&mut self) {
        match self.session.confirm_entry(self.conn, self.clock, self.category) {
            Ok(entry) => {
                let text = format!(
                    "Entry logged: {} at {} ({})",
                    entry.plate,
                    format_timestamp(&entry.occurred_at),
                    entry.category
                );
                self.success(text);
                self.plate_input.clear();
                self.focus = Focus::Plate;
                self.reload();
            }
            Err(e) => self.fail(e),
        }
    }

    // ------------------------------------------------------------------------
    // Register
    // ------------------------------------------------------------------------

    fn form_field_mut(&mut self, index: usize) -> Option<&mut String> {
        match index {
            0 => Some(&mut self.form.plate),
            1 => Some(&mut self.form.owner),
            2 => Some(&mut self.form.unit),
            3 => Some(&mut self.form.make),
            4 => Some(&mut self.form.model),
            5 => Some(&mut self.form.color),
            6 => Some(&mut self.form.phone),
            7 => Some(&mut self.form.notes),
            _ => None,
        }
    }

    fn form_field(&self, index: usize) -> &str {
        match index {
            0 => &self.form.plate,
            1 => &self.form.owner,
            2 => &self.form.unit,
            3 => &self.form.make,
            4 => &self.form.model,
            5 => &self.form.color,
            6 => &self.form.phone,
            7 => &self.form.notes,
            _ => "",
        }
    }

    pub fn submit_registration(&mut self) {
        match register_vehicle(self.conn, self.clock, &self.form) {
            Ok(vehicle) => {
                let text = format!("Registered {} for {} (unit {})", vehicle.plate, vehicle.owner, vehicle.unit);
                self.success(text);
                self.form = NewVehicle::default();
                self.focus = Focus::Form(0);
                self.reload();
            }
            Err(e) => self.fail(e),
        }
    }

    // ------------------------------------------------------------------------
    // Vehicles
    // ------------------------------------------------------------------------

    fn filter_field_mut(&mut self, index: usize) -> Option<&mut String> {
        let filter = &mut self.session.vehicle_filter;
        match index {
            0 => Some(&mut filter.plate),
            1 => Some(&mut filter.unit),
            2 => Some(&mut filter.owner),
            _ => None,
        }
    }

    fn filter_field(&self, index: usize) -> &str {
        let filter = &self.session.vehicle_filter;
        match index {
            0 => &filter.plate,
            1 => &filter.unit,
            2 => &filter.owner,
            _ => "",
        }
    }

    /// First step of a deactivate/reactivate: mark the selected row
    pub fn request_status_change(&mut self) {
        let Some(vehicle) = self.selected_vehicle() else {
            return;
        };
        let (id, plate, action) = (
            vehicle.id,
            vehicle.plate.clone(),
            if vehicle.is_active() { "deactivate" } else { "reactivate" },
        );

        self.session.request_status_change(id);
        self.info(format!("Press y to {} {}, n to cancel", action, plate));
    }

    pub fn confirm_status_change(&mut self) {
        let Some(vehicle) = self.selected_vehicle() else {
            return;
        };
        let id = vehicle.id;
        let plate = vehicle.plate.clone();
        let target = if vehicle.is_active() {
            VehicleStatus::Inactive
        } else {
            VehicleStatus::Active
        };

        match self.session.confirm_status_change(self.conn, id, target) {
            Ok(true) => {
                self.success(format!("{} is now {}", plate, target.as_str()));
                self.reload();
            }
            Ok(false) => self.info("Press d on a vehicle first"),
            Err(e) => self.fail(e),
        }
    }

    pub fn cancel_status_change(&mut self) {
        if let Some(id) = self.selected_vehicle().map(|v| v.id) {
            self.session.cancel_status_change(id);
            self.info("Cancelled");
        }
    }

    pub fn toggle_show_all(&mut self) {
        self.show_all = !self.show_all;
        self.reload();
    }

    pub fn export_vehicles(&mut self) {
        let today = self.clock.today();
        match export_vehicles_to_dir(&self.settings.export_dir, today, &self.vehicles, self.show_all) {
            Ok(path) => self.success(format!("Exported to {}", path.display())),
            Err(e) => self.fail(e),
        }
    }

    pub fn export_entries(&mut self) {
        let today = self.clock.today();
        match export_entries_to_dir(&self.settings.export_dir, today, &self.entries) {
            Ok(path) => self.success(format!("Exported to {}", path.display())),
            Err(e) => self.fail(e),
        }
    }

    pub fn cycle_period(&mut self) {
        self.period = self.period.next();
        self.reload();
    }

    /// Called when no key arrived within the refresh interval
    pub fn on_tick(&mut self) {
        if self.session.auto_refresh {
            self.reload();
        }
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    /// Returns false when the user asked to quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.focus {
            Focus::None => self.handle_command_key(key),
            focus => {
                self.handle_input_key(focus, key);
                true
            }
        }
    }

    fn handle_input_key(&mut self, focus: Focus, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.focus = Focus::None,
            KeyCode::Enter => match focus {
                Focus::Guard => self.sign_in(),
                Focus::Plate => self.check_plate(),
                Focus::Form(_) => self.submit_registration(),
                Focus::Filter(_) => {
                    self.focus = Focus::None;
                    self.reload();
                }
                Focus::None => {}
            },
            KeyCode::Tab | KeyCode::Down => {
                self.focus = match focus {
                    Focus::Form(i) => Focus::Form((i + 1) % FORM_LABELS.len()),
                    Focus::Filter(i) => Focus::Filter((i + 1) % FILTER_LABELS.len()),
                    Focus::Guard => Focus::Plate,
                    Focus::Plate => Focus::Guard,
                    Focus::None => Focus::None,
                }
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = match focus {
                    Focus::Form(i) => Focus::Form((i + FORM_LABELS.len() - 1) % FORM_LABELS.len()),
                    Focus::Filter(i) => Focus::Filter((i + FILTER_LABELS.len() - 1) % FILTER_LABELS.len()),
                    Focus::Guard => Focus::Plate,
                    Focus::Plate => Focus::Guard,
                    Focus::None => Focus::None,
                }
            }
            KeyCode::Backspace => {
                if let Some(field) = self.field_mut(focus) {
                    field.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(field) = self.field_mut(focus) {
                    field.push(c);
                }
            }
            _ => {}
        }
    }

    fn field_mut(&mut self, focus: Focus) -> Option<&mut String> {
        match focus {
            Focus::Guard => Some(&mut self.guard_input),
            Focus::Plate => Some(&mut self.plate_input),
            Focus::Form(i) => self.form_field_mut(i),
            Focus::Filter(i) => self.filter_field_mut(i),
            Focus::None => None,
        }
    }

    fn handle_command_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Tab => self.next_page(),
            KeyCode::BackTab => self.previous_page(),
            KeyCode::Char('t') => {
                let on = self.session.toggle_auto_refresh();
                self.info(if on { "Auto-refresh on" } else { "Auto-refresh off" });
            }
            KeyCode::Char('r') => {
                self.reload();
                self.info("Refreshed");
            }
            _ => match self.current_page {
                Page::Gate => self.handle_gate_key(key),
                Page::Register => self.handle_register_key(key),
                Page::Vehicles => self.handle_vehicles_key(key),
                Page::Entries => self.handle_entries_key(key),
                Page::Stats => self.handle_stats_key(key),
            },
        }
        true
    }

    fn handle_gate_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('g') => self.focus = Focus::Guard,
            KeyCode::Char('p') | KeyCode::Char('/') | KeyCode::Enter => {
                self.plate_input.clear();
                self.focus = Focus::Plate;
            }
            KeyCode::Char('c') => self.category = self.category.next(),
            KeyCode::Char('y') => self.confirm_entry(),
            KeyCode::Char('x') => {
                self.session.clear_lookup();
                self.plate_input.clear();
                self.focus = Focus::Plate;
            }
            _ => {}
        }
    }

    fn handle_register_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('e') | KeyCode::Enter => self.focus = Focus::Form(0),
            KeyCode::Char('n') => {
                self.form = NewVehicle::default();
                self.info("Form cleared");
            }
            _ => {}
        }
    }

    fn handle_vehicles_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.vehicles_state, self.vehicles.len(), 1),
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.vehicles_state, self.vehicles.len(), -1),
            KeyCode::Char('a') => self.toggle_show_all(),
            KeyCode::Char('f') => self.focus = Focus::Filter(0),
            KeyCode::Char('c') => {
                self.session.vehicle_filter = Default::default();
                self.reload();
            }
            KeyCode::Char('d') => self.request_status_change(),
            KeyCode::Char('y') => self.confirm_status_change(),
            KeyCode::Char('n') => self.cancel_status_change(),
            KeyCode::Char('x') => self.export_vehicles(),
            _ => {}
        }
    }

    fn handle_entries_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.entries_state, self.entries.len(), 1),
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.entries_state, self.entries.len(), -1),
            KeyCode::Char('x') => self.export_entries(),
            _ => {}
        }
    }

    fn handle_stats_key(&mut self, key: KeyEvent) {
        if let KeyCode::Char('p') = key.code {
            self.cycle_period();
        }
    }

    /// Per-hour counts of today's entries
    pub fn hourly_today(&self) -> [u64; 24] {
        let mut buckets = [0u64; 24];
        for e in &self.entries {
            buckets[e.entry.occurred_at.hour() as usize] += 1;
        }
        buckets
    }
}

fn clamp_selection(state: &mut TableState, len: usize) {
    match (state.selected(), len) {
        (_, 0) => state.select(None),
        (None, _) => state.select(Some(0)),
        (Some(i), len) if i >= len => state.select(Some(len - 1)),
        _ => {}
    }
}

fn move_selection(state: &mut TableState, len: usize, delta: isize) {
    if len == 0 {
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).clamp(0, len as isize - 1);
    state.select(Some(next as usize));
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("UI loop failed: {:?}", err);
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let tick = Duration::from_secs(app.settings.refresh_seconds);

    loop {
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(tick)? {
            app.on_tick();
            continue;
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if !app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Gate => render_gate(f, chunks[1], app),
        Page::Register => render_register(f, chunks[1], app),
        Page::Vehicles => render_vehicles(f, chunks[1], app),
        Page::Entries => render_entries(f, chunks[1], app),
        Page::Stats => render_stats(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Gate, Page::Register, Page::Vehicles, Page::Entries, Page::Stats];

    let mut tab_spans = vec![Span::styled(
        format!("{}  ", app.settings.site_name),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    if let Some(summary) = &app.summary {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            format!("Entries today: {}", summary.entries_today),
            Style::default().fg(Color::White),
        ));
        tab_spans.push(Span::raw("  "));
        tab_spans.push(Span::styled(
            format!("Authorized: {}", summary.authorized_vehicles),
            Style::default().fg(Color::Green),
        ));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(match app.session.guard() {
        Some(guard) => Span::styled(format!("Guard: {}", guard), Style::default().fg(Color::White)),
        None => Span::styled("No guard on duty", Style::default().fg(Color::Red)),
    });

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn input_line<'s>(label: &'s str, value: &'s str, focused: bool) -> Line<'s> {
    let label_style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };

    let mut spans = vec![
        Span::styled(format!("  {:<10} ", label), label_style),
        Span::styled(value, Style::default().fg(Color::White)),
    ];
    if focused {
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn render_gate(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let mut category_spans = vec![Span::styled("  Category   ", Style::default().fg(Color::Gray))];
    for c in EntryCategory::ALL {
        let style = if c == app.category {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        category_spans.push(Span::styled(format!(" {} ", c.label()), style));
        category_spans.push(Span::raw(" "));
    }

    let form = vec![
        Line::from(""),
        input_line("Guard", &app.guard_input, app.focus == Focus::Guard),
        Line::from(""),
        input_line("Plate", &app.plate_input, app.focus == Focus::Plate),
        Line::from(""),
        Line::from(category_spans),
        Line::from(""),
        Line::from(Span::styled(
            "  Formats: BB-BB-22, BBBB22, AB-12-34, AB1234",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    f.render_widget(
        Paragraph::new(form).block(Block::default().borders(Borders::ALL).title(" Check plate ")),
        chunks[0],
    );

    let (lines, border) = match app.session.current_lookup() {
        None => (
            vec![Line::from(""), Line::from("  Enter a plate and press Enter")],
            Color::White,
        ),
        Some(LookupOutcome::NotAuthorized { plate }) => (
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "  ⛔ NOT AUTHORIZED",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("  Plate: {}", plate)),
                Line::from(""),
                Line::from(Span::styled(
                    "  Call the resident before letting the vehicle in",
                    Style::default().fg(Color::DarkGray),
                )),
            ],
            Color::Red,
        ),
        Some(LookupOutcome::Authorized { vehicle }) => {
            let mut lines = vec![
                Line::from(""),
                Line::from(Span::styled(
                    "  ✅ AUTHORIZED",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("  Plate:  {}", vehicle.plate)),
                Line::from(format!("  Owner:  {}", vehicle.owner)),
                Line::from(format!("  Unit:   {}", vehicle.unit)),
            ];
            let description = describe_vehicle(vehicle);
            if !description.is_empty() {
                lines.push(Line::from(format!("  Car:    {}", description)));
            }
            if let Some(phone) = &vehicle.phone {
                lines.push(Line::from(format!("  Phone:  {}", phone)));
            }
            if let Some(notes) = &vehicle.notes {
                lines.push(Line::from(format!("  Notes:  {}", notes)));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(vec![
                Span::raw("  Press "),
                Span::styled("y", Style::default().fg(Color::Yellow)),
                Span::raw(format!(" to log entry as {}", app.category)),
            ]));
            (lines, Color::Green)
        }
    };

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(" Result "),
        ),
        chunks[1],
    );
}

fn render_register(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = vec![Line::from("")];
    for (i, label) in FORM_LABELS.iter().enumerate() {
        lines.push(input_line(label, app.form_field(i), app.focus == Focus::Form(i)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  * required. Enter submits, Tab moves between fields, Esc leaves the form",
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Register vehicle ")),
        area,
    );
}

fn render_vehicles(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let mut filter_spans = Vec::new();
    for (i, label) in FILTER_LABELS.iter().enumerate() {
        let focused = app.focus == Focus::Filter(i);
        let style = if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        filter_spans.push(Span::styled(format!(" {}: ", label), style));
        filter_spans.push(Span::raw(app.filter_field(i).to_string()));
        if focused {
            filter_spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        }
        filter_spans.push(Span::raw("   "));
    }
    f.render_widget(
        Paragraph::new(Line::from(filter_spans)).block(Block::default().borders(Borders::ALL).title(" Filters ")),
        chunks[0],
    );

    let header_cells = ["ID", "Plate", "Owner", "Unit", "Vehicle", "Phone", "Status", "Registered"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray)).height(1);

    let rows = app.vehicles.iter().map(|v| {
        let (status, color) = if app.session.is_status_change_pending(v.id) {
            ("confirm?", Color::Yellow)
        } else if v.is_active() {
            ("active", Color::Green)
        } else {
            ("inactive", Color::Red)
        };

        Row::new(vec![
            Cell::from(v.id.to_string()),
            Cell::from(v.plate.clone()),
            Cell::from(truncate(&v.owner, 24)),
            Cell::from(truncate(&v.unit, 8)),
            Cell::from(truncate(&describe_vehicle(v), 22)),
            Cell::from(v.phone.clone().unwrap_or_default()),
            Cell::from(status).style(Style::default().fg(color)),
            Cell::from(format_timestamp(&v.registered_at)),
        ])
        .height(1)
    });

    let title = if app.show_all {
        format!(" All vehicles ({}) ", app.vehicles.len())
    } else {
        format!(" Authorized vehicles ({}) ", app.vehicles.len())
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(8),
            Constraint::Length(26),
            Constraint::Length(10),
            Constraint::Length(24),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(20),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.vehicles_state);
}

fn render_entries(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(10)])
        .split(area);

    let header_cells = ["Time", "Plate", "Category", "Guard", "Owner", "Unit"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray)).height(1);

    let rows = app.entries.iter().map(|e| {
        let color = match e.entry.category.parse::<EntryCategory>() {
            Ok(EntryCategory::Resident) => Color::Green,
            Ok(EntryCategory::Visitor) => Color::Cyan,
            Ok(EntryCategory::Service) => Color::Magenta,
            Err(_) => Color::White,
        };

        Row::new(vec![
            Cell::from(e.entry.occurred_at.format("%H:%M:%S").to_string()),
            Cell::from(e.entry.plate.clone()),
            Cell::from(e.entry.category.clone()).style(Style::default().fg(color)),
            Cell::from(truncate(&e.entry.guard, 16)),
            Cell::from(truncate(e.owner.as_deref().unwrap_or("-"), 24)),
            Cell::from(e.unit.clone().unwrap_or_else(|| "-".to_string())),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(18),
            Constraint::Length(26),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Entries today ({}) ", app.entries.len())),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], &mut app.entries_state);

    render_hour_chart(f, chunks[1], " Entries per hour ", &app.hourly_today());
}

fn render_hour_chart(f: &mut Frame, area: Rect, title: &str, buckets: &[u64; 24]) {
    let labels: Vec<String> = (0..24).map(|h| format!("{:02}", h)).collect();
    let data: Vec<(&str, u64)> = labels.iter().map(String::as_str).zip(buckets.iter().copied()).collect();

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .data(data.as_slice())
        .bar_width(3)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, area);
}

fn render_stats(f: &mut Frame, area: Rect, app: &App) {
    let Some(stats) = &app.stats else {
        f.render_widget(
            Paragraph::new("  No statistics loaded").block(Block::default().borders(Borders::ALL)),
            area,
        );
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(10)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}  ({} → {})", app.period.title(), stats.start, stats.end),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("  Total entries:  {}", stats.total)),
    ];
    if let Some(peak) = stats.peak_hour() {
        lines.push(Line::from(format!("  Peak hour:      {:02}:00 ({})", peak.hour, peak.count)));
    }
    if let Some(day) = stats.busiest_day() {
        lines.push(Line::from(format!("  Busiest day:    {} ({})", day.date, day.count)));
    }
    lines.push(Line::from(""));
    for c in &stats.per_category {
        lines.push(Line::from(format!("  {:<12} {:>6}", c.category, c.count)));
    }

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Summary ")),
        columns[0],
    );

    let header = Row::new(
        ["#", "Plate", "Entries", "Owner", "Unit"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::DarkGray));

    let top_rows = stats.top_plates.iter().enumerate().map(|(i, p)| {
        Row::new(vec![
            Cell::from((i + 1).to_string()),
            Cell::from(p.plate.clone()),
            Cell::from(p.count.to_string()),
            Cell::from(truncate(p.owner.as_deref().unwrap_or("-"), 24)),
            Cell::from(p.unit.clone().unwrap_or_else(|| "-".to_string())),
        ])
    });

    let table = Table::new(
        top_rows,
        [
            Constraint::Length(4),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(26),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" Top vehicles "));

    f.render_widget(table, columns[1]);

    let histogram = stats.hourly_histogram().map(|count| count.max(0) as u64);
    render_hour_chart(f, rows[1], " Entries per hour of day ", &histogram);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some((text, kind)) = &app.message {
        let color = match kind {
            MessageKind::Info => Color::Cyan,
            MessageKind::Success => Color::Green,
            MessageKind::Error => Color::Red,
        };
        status_spans.push(Span::styled(format!(" {} ", text), Style::default().fg(color)));
        status_spans.push(Span::raw(" | "));
    }

    let hints: &[(&str, &str)] = if app.focus != Focus::None {
        &[("Enter", "Submit"), ("Tab", "Next field"), ("Esc", "Done")]
    } else {
        match app.current_page {
            Page::Gate => &[("p", "Plate"), ("g", "Guard"), ("c", "Category"), ("y", "Log entry"), ("x", "Clear")],
            Page::Register => &[("e", "Edit"), ("n", "Clear form")],
            Page::Vehicles => &[("f", "Filter"), ("a", "All/active"), ("d", "(De)activate"), ("y/n", "Confirm"), ("x", "Export")],
            Page::Entries => &[("↑/↓", "Nav"), ("x", "Export")],
            Page::Stats => &[("p", "Period")],
        }
    };

    for (key, label) in hints {
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(format!(" {} | ", label)));
    }

    if app.focus == Focus::None {
        status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Page | "));
        status_spans.push(Span::styled("t", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(if app.session.auto_refresh { " Auto ✓ | " } else { " Auto | " }));
        status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" Quit"));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn describe_vehicle(v: &Vehicle) -> String {
    [&v.make, &v.model, &v.color]
        .iter()
        .filter_map(|part| part.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vehicle_access::{setup_database, ManualClock};

    fn settings() -> UiSettings {
        UiSettings::from(&AppConfig::default())
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn setup() -> (Connection, ManualClock) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let clock = ManualClock::at("2026-10-16 07:45:00").unwrap();
        register_vehicle(
            &conn,
            &clock,
            &NewVehicle {
                plate: "BB-BB-22".to_string(),
                owner: "Juan Perez".to_string(),
                unit: "101".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, clock)
    }

    #[test]
    fn test_gate_flow_logs_one_entry() {
        let (conn, clock) = setup();
        let mut app = App::new(&conn, &clock, settings());
        assert_eq!(app.focus, Focus::Guard);

        type_text(&mut app, "Ana");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.guard(), Some("Ana"));
        assert_eq!(app.focus, Focus::Plate);

        type_text(&mut app, "bbbb22");
        press(&mut app, KeyCode::Enter);
        assert!(app.session.current_lookup().unwrap().is_authorized());

        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.category, EntryCategory::Visitor);
        press(&mut app, KeyCode::Char('y'));

        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0].entry.category, "Visita");
        assert_eq!(app.summary.unwrap().entries_today, 1);

        // The lookup was consumed by the first confirmation
        assert_eq!(app.focus, Focus::Plate);
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('y'));
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.message.as_ref().unwrap().1, MessageKind::Error);
    }

    #[test]
    fn test_new_guard_does_not_inherit_lookup() {
        let (conn, clock) = setup();
        let mut app = App::new(&conn, &clock, settings());

        app.guard_input = "Ana".to_string();
        app.sign_in();
        app.plate_input = "BBBB22".to_string();
        app.check_plate();
        assert!(app.session.current_lookup().unwrap().is_authorized());

        app.guard_input = "Luis".to_string();
        app.sign_in();
        assert!(app.session.current_lookup().is_none());

        app.confirm_entry();
        assert!(app.entries.is_empty());
        assert_eq!(app.message.as_ref().unwrap().1, MessageKind::Error);
    }

    #[test]
    fn test_register_form_reports_every_missing_field() {
        let (conn, clock) = setup();
        let mut app = App::new(&conn, &clock, settings());
        app.current_page = Page::Register;
        app.focus = Focus::None;

        press(&mut app, KeyCode::Char('e'));
        type_text(&mut app, "ABCD123");
        press(&mut app, KeyCode::Enter);

        let (text, kind) = app.message.clone().unwrap();
        assert_eq!(kind, MessageKind::Error);
        assert!(text.contains("plate"));
        assert!(text.contains("owner"));
        assert!(text.contains("unit"));
        assert_eq!(app.vehicles.len(), 1);
    }

    #[test]
    fn test_deactivation_needs_confirmation() {
        let (conn, clock) = setup();
        let mut app = App::new(&conn, &clock, settings());
        app.current_page = Page::Vehicles;
        app.focus = Focus::None;

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.vehicles.len(), 1);

        press(&mut app, KeyCode::Char('y'));
        assert!(app.vehicles.is_empty());
        assert_eq!(app.summary.unwrap().authorized_vehicles, 0);

        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.vehicles.len(), 1);
        assert_eq!(app.vehicles[0].status, VehicleStatus::Inactive);
    }

    #[test]
    fn test_stats_period_cycles() {
        let (conn, clock) = setup();
        let mut app = App::new(&conn, &clock, settings());
        app.current_page = Page::Stats;
        app.focus = Focus::None;

        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.period, StatsPeriod::Weekly);
        assert_eq!(app.stats.as_ref().unwrap().window_days, 7);
    }

    #[test]
    fn test_quit_only_outside_text_fields() {
        let (conn, clock) = setup();
        let mut app = App::new(&conn, &clock, settings());

        // Focused on the guard field: q is a letter
        assert!(press(&mut app, KeyCode::Char('q')));
        assert_eq!(app.guard_input, "q");

        press(&mut app, KeyCode::Esc);
        assert!(!press(&mut app, KeyCode::Char('q')));
    }
}
