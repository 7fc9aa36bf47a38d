use crate::binding::WidgetBindingService;
use crate::discovery::Candle;
use crate::format::FieldFormatter;
use crate::projection::{
    project, CardView, ChartView, SortDirection, TableQuery, TableView, WidgetState, WidgetView,
    PAGE_SIZES,
};
use crate::refresh::{RefreshScheduler, RefreshUpdate};
use crate::store::DashboardStore;
use crate::widget::{DisplayMode, Theme, WidgetConfig};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, List, ListItem, Paragraph,
        Row, Table, Wrap,
    },
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use tui_big_text::{BigText, PixelSize};

const SERIES_COLORS: [Color; 5] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::Blue,
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Palette {
    text: Color,
    muted: Color,
    accent: Color,
    border: Color,
    selection: Color,
    positive: Color,
    negative: Color,
    background: Color,
}

impl Palette {
    fn for_theme(theme: Theme) -> Palette {
        match theme {
            Theme::Dark => Palette {
                text: Color::White,
                muted: Color::Gray,
                accent: Color::Yellow,
                border: Color::Cyan,
                selection: Color::DarkGray,
                positive: Color::Green,
                negative: Color::Red,
                background: Color::Reset,
            },
            Theme::Light => Palette {
                text: Color::Black,
                muted: Color::DarkGray,
                accent: Color::Blue,
                border: Color::Blue,
                selection: Color::Gray,
                positive: Color::Green,
                negative: Color::Red,
                background: Color::White,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Normal,
    Search,
}

pub struct App {
    pub mode: AppMode,
    pub search_input: String,
    pub widgets: Vec<WidgetConfig>,
    pub states: HashMap<String, WidgetState>,
    pub queries: HashMap<String, TableQuery>,
    pub selected: usize,
    pub theme: Theme,
    pub formatter: FieldFormatter,
    pub should_quit: bool,
    pub error_message: Option<String>,
    pub last_update: Instant,
    pub flash_state: bool,
}

impl App {
    pub fn new(widgets: Vec<WidgetConfig>, theme: Theme, formatter: FieldFormatter) -> App {
        let states = widgets
            .iter()
            .map(|w| (w.id.clone(), WidgetState::loading()))
            .collect();
        App {
            mode: AppMode::Normal,
            search_input: String::new(),
            widgets,
            states,
            queries: HashMap::new(),
            selected: 0,
            theme,
            formatter,
            should_quit: false,
            error_message: None,
            last_update: Instant::now(),
            flash_state: false,
        }
    }

    pub fn selected_widget(&self) -> Option<&WidgetConfig> {
        self.widgets.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected < self.widgets.len().saturating_sub(1) {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn mark_loading(&mut self, widget_id: &str) {
        self.states.entry(widget_id.to_string()).or_default().loading = true;
    }

    /// Apply a refresh result unless it belongs to an outdated schedule.
    pub fn apply_update(&mut self, update: RefreshUpdate, current: bool) -> bool {
        if !current || !self.widgets.iter().any(|w| w.id == update.widget_id) {
            debug!(widget_id = %update.widget_id, generation = update.generation, "refresh_discarded");
            return false;
        }
        self.states
            .entry(update.widget_id)
            .or_default()
            .apply(update.result);
        self.mark_refreshed();
        true
    }

    pub fn seconds_since_update(&self) -> u64 {
        self.last_update.elapsed().as_secs()
    }

    pub fn mark_refreshed(&mut self) {
        self.last_update = Instant::now();
        self.flash_state = !self.flash_state;
    }

    pub fn remove_selected(&mut self) -> Option<WidgetConfig> {
        if self.selected >= self.widgets.len() {
            return None;
        }
        let widget = self.widgets.remove(self.selected);
        self.states.remove(&widget.id);
        self.queries.remove(&widget.id);
        if self.selected >= self.widgets.len() && self.selected > 0 {
            self.selected -= 1;
        }
        Some(widget)
    }

    /// Swap the selected widget with its neighbour. Returns the new order.
    pub fn move_selected(&mut self, down: bool) -> Option<Vec<String>> {
        let target = if down {
            self.selected + 1
        } else {
            self.selected.checked_sub(1)?
        };
        if target >= self.widgets.len() {
            return None;
        }
        self.widgets.swap(self.selected, target);
        self.selected = target;
        Some(self.widgets.iter().map(|w| w.id.clone()).collect())
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn view(&self, widget: &WidgetConfig) -> WidgetView {
        let idle = WidgetState::default();
        let unsorted = TableQuery::default();
        project(
            widget,
            self.states.get(&widget.id).unwrap_or(&idle),
            &self.formatter,
            self.queries.get(&widget.id).unwrap_or(&unsorted),
        )
    }

    pub fn selected_view(&self) -> Option<WidgetView> {
        self.selected_widget().map(|w| self.view(w))
    }

    fn selected_query_mut(&mut self) -> Option<&mut TableQuery> {
        let id = self.selected_widget()?.id.clone();
        Some(self.queries.entry(id).or_default())
    }

    pub fn next_page(&mut self) {
        if let Some(WidgetView::Table(table)) = self.selected_view() {
            if table.page < table.total_pages {
                if let Some(query) = self.selected_query_mut() {
                    query.page = table.page + 1;
                }
            }
        }
    }

    pub fn previous_page(&mut self) {
        if let Some(WidgetView::Table(table)) = self.selected_view() {
            if let Some(query) = self.selected_query_mut() {
                query.page = table.page.saturating_sub(1).max(1);
            }
        }
    }

    pub fn cycle_page_size(&mut self) {
        if let Some(query) = self.selected_query_mut() {
            let next = PAGE_SIZES
                .iter()
                .position(|&n| n == query.per_page)
                .map_or(PAGE_SIZES[0], |i| PAGE_SIZES[(i + 1) % PAGE_SIZES.len()]);
            query.set_per_page(next);
        }
    }

    pub fn enter_search_mode(&mut self) {
        if self.selected_widget().map(|w| w.display_mode) != Some(DisplayMode::Table) {
            return;
        }
        self.search_input = self
            .selected_widget()
            .and_then(|w| self.queries.get(&w.id))
            .map(|q| q.search.clone())
            .unwrap_or_default();
        self.mode = AppMode::Search;
    }

    pub fn exit_search_mode(&mut self) {
        self.mode = AppMode::Normal;
        self.search_input.clear();
    }

    /// Filter the selected table by the typed text.
    pub fn apply_search(&mut self) {
        let term = self.search_input.clone();
        if let Some(query) = self.selected_query_mut() {
            query.set_search(&term);
        }
        self.exit_search_mode();
    }

    /// Ascending, then descending, then on to the next column.
    pub fn cycle_sort(&mut self) {
        let Some(widget) = self.selected_widget() else {
            return;
        };
        if widget.display_mode != DisplayMode::Table || widget.fields.is_empty() {
            return;
        }
        let paths: Vec<String> = widget.fields.iter().map(|f| f.path.clone()).collect();
        let Some(query) = self.selected_query_mut() else {
            return;
        };
        match query.sort_field.clone() {
            Some(current) if query.sort_direction == SortDirection::Asc => {
                query.toggle_sort(&current)
            }
            Some(current) => {
                let next = paths
                    .iter()
                    .position(|p| *p == current)
                    .map_or(0, |i| (i + 1) % paths.len());
                query.toggle_sort(&paths[next]);
            }
            None => query.toggle_sort(&paths[0]),
        }
    }
}

pub async fn run_tui(
    store: DashboardStore,
    binding: WidgetBindingService,
    formatter: FieldFormatter,
) -> eyre::Result<()> {
    let state = store.load()?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(state.widgets, state.theme, formatter);

    let (mut scheduler, mut updates) = RefreshScheduler::new(binding);
    for widget in &app.widgets {
        scheduler.schedule(widget);
    }

    let res = run_app(&mut terminal, &mut app, &store, &mut scheduler, &mut updates).await;
    scheduler.cancel_all();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    store: &DashboardStore,
    scheduler: &mut RefreshScheduler,
    updates: &mut UnboundedReceiver<RefreshUpdate>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        while let Ok(update) = updates.try_recv() {
            let current = scheduler.is_current(&update);
            app.apply_update(update, current);
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                // any key dismisses the error popup
                if app.error_message.take().is_some() {
                    continue;
                }
                match app.mode {
                    AppMode::Normal => handle_normal_key(key.code, app, store, scheduler),
                    AppMode::Search => match key.code {
                        KeyCode::Esc => app.exit_search_mode(),
                        KeyCode::Enter => app.apply_search(),
                        KeyCode::Backspace => {
                            app.search_input.pop();
                        }
                        KeyCode::Char(c) => app.search_input.push(c),
                        _ => {}
                    },
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn handle_normal_key(
    code: KeyCode,
    app: &mut App,
    store: &DashboardStore,
    scheduler: &mut RefreshScheduler,
) {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
        KeyCode::Char('J') | KeyCode::Char('K') => {
            if let Some(order) = app.move_selected(code == KeyCode::Char('J')) {
                if let Err(e) = store.reorder_widgets(&order) {
                    app.error_message = Some(e.to_string());
                }
            }
        }
        KeyCode::Char('r') => {
            if let Some(id) = app.selected_widget().map(|w| w.id.clone()) {
                if scheduler.refresh_now(&id) {
                    app.mark_loading(&id);
                }
            }
        }
        KeyCode::Char('R') => {
            scheduler.clear_cache();
            let ids: Vec<String> = app.widgets.iter().map(|w| w.id.clone()).collect();
            for id in ids {
                if scheduler.refresh_now(&id) {
                    app.mark_loading(&id);
                }
            }
        }
        KeyCode::Char('d') => {
            if let Some(widget) = app.remove_selected() {
                scheduler.cancel(&widget.id);
                if let Err(e) = store.remove_widget(&widget.id) {
                    app.error_message = Some(e.to_string());
                }
            }
        }
        KeyCode::Char('t') => {
            let theme = app.toggle_theme();
            if let Err(e) = store.set_theme(theme) {
                app.error_message = Some(e.to_string());
            }
        }
        KeyCode::Char('n') | KeyCode::Right => app.next_page(),
        KeyCode::Char('p') | KeyCode::Left => app.previous_page(),
        KeyCode::Char('s') => app.cycle_sort(),
        KeyCode::Char('z') => app.cycle_page_size(),
        KeyCode::Char('/') => app.enter_search_mode(),
        _ => {}
    }
}

fn ui(f: &mut Frame, app: &App) {
    let palette = Palette::for_theme(app.theme);
    f.render_widget(
        Block::default().style(Style::default().bg(palette.background)),
        f.area(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let indicator = if app.flash_state { "*" } else { " " };
    let header = Paragraph::new(format!(
        "{} widgets | theme: {} | updated {}s ago {}",
        app.widgets.len(),
        app.theme.as_str(),
        app.seconds_since_update(),
        indicator
    ))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border))
            .title("Finance Dashboard"),
    )
    .style(Style::default().fg(palette.text));
    f.render_widget(header, chunks[0]);

    if app.widgets.is_empty() {
        let placeholder = Paragraph::new("No widgets yet. Add one with `findash_rs add`.")
            .block(Block::default().borders(Borders::ALL).title("Widgets"))
            .style(Style::default().fg(palette.muted))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, chunks[1]);
    } else {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(chunks[1]);
        render_widget_list(f, body[0], app, &palette);
        if let Some(widget) = app.selected_widget() {
            render_selected(f, body[1], app, widget, &palette);
        }
    }

    let help_text = match app.mode {
        AppMode::Normal => "j/k (select) | J/K (move) | r/R (refresh/all) | d (delete) | t (theme) \
             | n/p (page) | z (page size) | s (sort) | / (search) | q (quit)"
            .to_string(),
        AppMode::Search => format!("Search: {}_ | Enter (apply) | Esc (cancel)", app.search_input),
    };
    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(palette.muted))
        .alignment(Alignment::Center);
    f.render_widget(help, chunks[2]);

    if let Some(error) = &app.error_message {
        render_error_popup(f, error);
    }
}

fn render_widget_list(f: &mut Frame, area: Rect, app: &App, palette: &Palette) {
    let items: Vec<ListItem> = app
        .widgets
        .iter()
        .enumerate()
        .map(|(i, widget)| {
            let state = app.states.get(&widget.id);
            let marker = match state {
                Some(s) if s.loading => Span::styled("~ ", Style::default().fg(palette.accent)),
                Some(s) if s.error.is_some() => {
                    Span::styled("! ", Style::default().fg(palette.negative))
                }
                Some(s) if s.data.is_some() => {
                    Span::styled("● ", Style::default().fg(palette.positive))
                }
                _ => Span::styled("○ ", Style::default().fg(palette.muted)),
            };
            let style = if i == app.selected {
                Style::default()
                    .bg(palette.selection)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                marker,
                Span::styled(widget.name.clone(), Style::default().fg(palette.text)),
                Span::styled(
                    format!(" [{}]", widget.display_mode.as_str()),
                    Style::default().fg(palette.muted),
                ),
            ]))
            .style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border))
            .title("Widgets"),
    );
    f.render_widget(list, area);
}

fn widget_title(app: &App, widget: &WidgetConfig) -> String {
    let mut title = widget.name.clone();
    if widget.display_mode == DisplayMode::Chart {
        title.push_str(&format!(" - {}", widget.chart_type().as_str()));
        if let Some(interval) = widget.chart_interval {
            title.push_str(&format!(" ({})", interval.as_str()));
        }
    }
    if let Some(updated) = app
        .states
        .get(&widget.id)
        .and_then(|s| s.last_updated.as_ref())
    {
        title.push_str(&format!(" | updated {}", updated.format("%H:%M:%S")));
    }
    title
}

fn render_selected(f: &mut Frame, area: Rect, app: &App, widget: &WidgetConfig, palette: &Palette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.border))
        .title(widget_title(app, widget));
    let inner = block.inner(area);
    f.render_widget(block, area);

    match app.view(widget) {
        WidgetView::Loading => render_loading(f, inner, palette),
        WidgetView::Error(msg) => {
            let p = Paragraph::new(msg)
                .style(Style::default().fg(palette.negative))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true });
            f.render_widget(p, inner);
        }
        WidgetView::Empty(msg) => {
            let p = Paragraph::new(msg)
                .style(Style::default().fg(palette.muted))
                .alignment(Alignment::Center);
            f.render_widget(p, inner);
        }
        WidgetView::Card(card) => render_card(f, inner, &card, palette),
        WidgetView::Table(table) => {
            let query = app.queries.get(&widget.id);
            render_table(f, inner, widget, &table, query, palette)
        }
        WidgetView::Chart(chart) => render_chart(f, inner, &chart, &app.formatter, palette),
    }
}

fn render_loading(f: &mut Frame, area: Rect, palette: &Palette) {
    let loading_text = Paragraph::new("Loading widget data...")
        .style(Style::default().fg(palette.accent))
        .alignment(Alignment::Center);
    f.render_widget(loading_text, area);
}

/// Approximate width of `value` in quadrant big text.
fn big_text_width(value: &str) -> u16 {
    u16::try_from(value.chars().count())
        .unwrap_or(u16::MAX)
        .saturating_mul(4)
}

fn render_card(f: &mut Frame, area: Rect, card: &CardView, palette: &Palette) {
    if let [row] = card.rows.as_slice() {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);
        let label = Paragraph::new(row.label.clone())
            .style(Style::default().fg(palette.muted))
            .alignment(Alignment::Center);
        f.render_widget(label, chunks[0]);

        let big_text = BigText::builder()
            .pixel_size(PixelSize::Quadrant)
            .style(
                Style::default()
                    .fg(palette.positive)
                    .add_modifier(Modifier::BOLD),
            )
            .lines(vec![row.value.clone().into()])
            .build();

        let width = big_text_width(&row.value);
        let centered = if width < chunks[1].width {
            let margin = (chunks[1].width - width) / 2;
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Length(margin),
                    Constraint::Min(0),
                    Constraint::Length(margin),
                ])
                .split(chunks[1])[1]
        } else {
            chunks[1]
        };
        f.render_widget(big_text, centered);
        return;
    }

    let rows = card.rows.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.label.clone()).style(Style::default().fg(palette.muted)),
            Cell::from(row.value.clone()).style(
                Style::default()
                    .fg(palette.text)
                    .add_modifier(Modifier::BOLD),
            ),
        ])
    });
    let table = Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)]);
    f.render_widget(table, area);
}

fn render_table(
    f: &mut Frame,
    area: Rect,
    widget: &WidgetConfig,
    view: &TableView,
    query: Option<&TableQuery>,
    palette: &Palette,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let header_cells = widget.fields.iter().map(|field| {
        let arrow = match query {
            Some(q) if q.sort_field.as_deref() == Some(field.path.as_str()) => {
                match q.sort_direction {
                    SortDirection::Asc => " ▲",
                    SortDirection::Desc => " ▼",
                }
            }
            _ => "",
        };
        Cell::from(format!("{}{}", field.label, arrow)).style(
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = view
        .rows
        .iter()
        .map(|row| Row::new(row.iter().map(|c| Cell::from(c.clone()))).height(1));

    let share = 100 / view.columns.len().max(1) as u16;
    let widths = vec![Constraint::Percentage(share); view.columns.len()];
    let table = Table::new(rows, widths)
        .header(header)
        .style(Style::default().fg(palette.text));
    f.render_widget(table, chunks[0]);

    let footer = Paragraph::new(format!(
        "{} | page {}/{}",
        view.summary(),
        view.page,
        view.total_pages
    ))
    .style(Style::default().fg(palette.muted))
    .alignment(Alignment::Right);
    f.render_widget(footer, chunks[1]);
}

fn candle_series(candles: &[Candle], pick: fn(&Candle) -> f64) -> Vec<(f64, f64)> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| (i as f64, pick(c)))
        .collect()
}

fn render_chart(
    f: &mut Frame,
    area: Rect,
    chart: &ChartView,
    formatter: &FieldFormatter,
    palette: &Palette,
) {
    let Some((mut lo, mut hi)) = chart.bounds() else {
        render_no_series(f, area, palette);
        return;
    };
    if lo == hi {
        lo -= 1.0;
        hi += 1.0;
    }

    let (series, names): (Vec<(String, Vec<(f64, f64)>, Color)>, Vec<&str>) =
        if chart.candles.is_empty() {
            let series = chart
                .series
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let color = SERIES_COLORS[i % SERIES_COLORS.len()];
                    (label.clone(), chart.series_values(label), color)
                })
                .collect();
            (series, chart.points.iter().map(|p| p.name.as_str()).collect())
        } else {
            let series = vec![
                ("High".to_string(), candle_series(&chart.candles, |c| c.high), palette.positive),
                ("Low".to_string(), candle_series(&chart.candles, |c| c.low), palette.negative),
                ("Close".to_string(), candle_series(&chart.candles, |c| c.close), palette.accent),
            ];
            (series, chart.candles.iter().map(|c| c.name.as_str()).collect())
        };

    let datasets: Vec<Dataset> = series
        .iter()
        .map(|(name, data, color)| {
            Dataset::default()
                .name(name.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(*color))
                .data(data)
        })
        .collect();

    let x_max = names.len().saturating_sub(1).max(1) as f64;
    let x_labels = vec![
        names.first().copied().unwrap_or("").to_string(),
        names.last().copied().unwrap_or("").to_string(),
    ];
    let y_labels = vec![
        formatter.format_number(lo),
        formatter.format_number((lo + hi) / 2.0),
        formatter.format_number(hi),
    ];

    let chart_widget = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(palette.muted))
                .bounds([0.0, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(palette.muted))
                .bounds([lo, hi])
                .labels(y_labels),
        );
    f.render_widget(chart_widget, area);
}

fn render_no_series(f: &mut Frame, area: Rect, palette: &Palette) {
    let p = Paragraph::new("No numeric fields to chart")
        .style(Style::default().fg(palette.muted))
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}

fn render_error_popup(f: &mut Frame, error: &str) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let error_paragraph = Paragraph::new(error)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::widget::{ValueType, WidgetField};
    use serde_json::json;

    fn widget(id: &str, mode: DisplayMode) -> WidgetConfig {
        let fields = vec![
            WidgetField::new("symbol", "Symbol", ValueType::String, None),
            WidgetField::new("close", "Close", ValueType::Number, None),
        ];
        let mut w = WidgetConfig::new(id, "https://api.example.com", fields, mode);
        w.id = id.to_string();
        w
    }

    fn app() -> App {
        App::new(
            vec![widget("a", DisplayMode::Table), widget("b", DisplayMode::Card)],
            Theme::Dark,
            FieldFormatter::default(),
        )
    }

    fn update(id: &str, result: Result<serde_json::Value, FetchError>) -> RefreshUpdate {
        RefreshUpdate {
            widget_id: id.to_string(),
            generation: 1,
            result,
        }
    }

    fn rows(n: usize) -> serde_json::Value {
        let items: Vec<_> = (0..n)
            .map(|i| json!({"symbol": format!("S{i}"), "close": i}))
            .collect();
        json!({ "items": items })
    }

    #[test]
    fn test_new_app_starts_loading() {
        let app = app();
        assert_eq!(app.selected_view(), Some(WidgetView::Loading));
    }

    #[test]
    fn test_stale_update_is_discarded() {
        let mut app = app();
        assert!(!app.apply_update(update("a", Ok(rows(3))), false));
        assert_eq!(app.selected_view(), Some(WidgetView::Loading));

        assert!(app.apply_update(update("a", Ok(rows(3))), true));
        assert!(matches!(app.selected_view(), Some(WidgetView::Table(_))));
    }

    #[test]
    fn test_update_for_removed_widget_is_discarded() {
        let mut app = app();
        let removed = app.remove_selected().unwrap();
        assert_eq!(removed.id, "a");
        assert!(!app.apply_update(update("a", Ok(rows(1))), true));
        assert!(!app.states.contains_key("a"));
    }

    #[test]
    fn test_applied_update_resets_last_update() {
        let mut app = app();
        app.last_update = Instant::now() - Duration::from_secs(90);
        assert!(app.seconds_since_update() >= 90);
        let flash = app.flash_state;
        app.apply_update(update("b", Ok(json!({"symbol": "INFY", "close": 1450.5}))), true);
        assert!(app.seconds_since_update() < 90);
        assert_ne!(app.flash_state, flash);
    }

    #[test]
    fn test_big_text_width_saturates() {
        assert_eq!(big_text_width("1,234"), 20);
        assert_eq!(big_text_width(&"9".repeat(16_384)), u16::MAX);
        assert_eq!(big_text_width(&"9".repeat(100_000)), u16::MAX);
    }

    #[test]
    fn test_selection_bounds() {
        let mut app = app();
        app.select_previous();
        assert_eq!(app.selected, 0);
        app.select_next();
        app.select_next();
        assert_eq!(app.selected, 1);
        app.remove_selected();
        assert_eq!(app.selected, 0);
        app.remove_selected();
        assert!(app.remove_selected().is_none());
    }

    #[test]
    fn test_paging_stays_in_range() {
        let mut app = app();
        app.apply_update(update("a", Ok(rows(15))), true);
        app.next_page();
        app.next_page();
        match app.selected_view() {
            Some(WidgetView::Table(t)) => {
                assert_eq!(t.page, 2);
                assert_eq!(t.rows.len(), 5);
            }
            other => panic!("expected table, got {other:?}"),
        }
        app.previous_page();
        app.previous_page();
        assert_eq!(app.queries["a"].page, 1);
    }

    #[test]
    fn test_cycle_sort() {
        let mut app = app();
        app.cycle_sort();
        let q = &app.queries["a"];
        assert_eq!(q.sort_field.as_deref(), Some("symbol"));
        assert_eq!(q.sort_direction, SortDirection::Asc);

        app.cycle_sort();
        assert_eq!(app.queries["a"].sort_direction, SortDirection::Desc);

        app.cycle_sort();
        let q = &app.queries["a"];
        assert_eq!(q.sort_field.as_deref(), Some("close"));
        assert_eq!(q.sort_direction, SortDirection::Asc);
    }

    #[test]
    fn test_cycle_sort_ignores_cards() {
        let mut app = app();
        app.select_next();
        app.cycle_sort();
        assert!(!app.queries.contains_key("b"));
    }

    #[test]
    fn test_move_selected_returns_order() {
        let mut app = app();
        assert_eq!(app.move_selected(false), None);
        assert_eq!(app.move_selected(true), Some(vec!["b".to_string(), "a".to_string()]));
        assert_eq!(app.selected, 1);
        assert_eq!(app.move_selected(true), None);
    }

    #[test]
    fn test_search_mode_filters_table() {
        let mut app = app();
        app.apply_update(update("a", Ok(rows(15))), true);
        app.enter_search_mode();
        assert_eq!(app.mode, AppMode::Search);
        app.search_input.push_str("s1");
        app.apply_search();
        assert_eq!(app.mode, AppMode::Normal);
        match app.selected_view() {
            Some(WidgetView::Table(t)) => assert_eq!(t.total, 6),
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn test_search_mode_only_for_tables() {
        let mut app = app();
        app.select_next();
        app.enter_search_mode();
        assert_eq!(app.mode, AppMode::Normal);
    }

    #[test]
    fn test_cycle_page_size() {
        let mut app = app();
        app.cycle_page_size();
        assert_eq!(app.queries["a"].per_page, 20);
        app.cycle_page_size();
        app.cycle_page_size();
        assert_eq!(app.queries["a"].per_page, 5);
    }

    #[test]
    fn test_toggle_theme_palette() {
        let mut app = app();
        assert_eq!(app.toggle_theme(), Theme::Light);
        assert_eq!(Palette::for_theme(app.theme).background, Color::White);
    }
}
