use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::warn;
use ratatui::{
    prelude::*,
    symbols,
    text::Line,
    widgets::{Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table},
};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{AppConfig, FetchConfig};
use crate::core::{self, SummaryTable};
use crate::fetch;
use crate::prices::PriceTable;
use crate::storage::AsyncStorageManager;

const RANGES: &[&str] = &["5d", "1mo", "3mo", "6mo", "1y"];

const PALETTE: &[Color] = &[
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::LightBlue,
    Color::LightRed,
    Color::LightCyan,
    Color::LightYellow,
    Color::LightMagenta,
    Color::LightGreen,
];

// --- App State ---

struct App {
    config: AppConfig,
    table: PriceTable,
    normalized: PriceTable,
    summary: SummaryTable,
    is_refreshing: bool,
    views: Vec<String>,
    selected_view: usize,
    selected_asset: usize,
    range_index: usize,
}

impl App {
    async fn new() -> Result<Self> {
        let storage = AsyncStorageManager::new_relative("storage").await?;
        let config = AppConfig::load(&storage).await?;
        let cached: PriceTable = storage.load("snapshot").await.unwrap_or_default();

        let range_index = RANGES
            .iter()
            .position(|r| *r == config.fetch.range)
            .unwrap_or(0);

        let mut app = Self {
            config,
            table: PriceTable::default(),
            normalized: PriceTable::default(),
            summary: SummaryTable::default(),
            is_refreshing: false,
            views: vec![
                "Relative Performance".to_string(),
                "Deep Dive".to_string(),
                "Summary".to_string(),
            ],
            selected_view: 0,
            selected_asset: 0,
            range_index,
        };
        app.set_table(cached);
        Ok(app)
    }

    /// Installs a freshly fetched table and recomputes everything derived
    /// from it. Analysis failures leave the chart blank instead of killing
    /// the dashboard; the cause goes to the log.
    fn set_table(&mut self, table: PriceTable) {
        self.summary = match core::analyze(&table, &self.config.benchmark) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("analysis skipped: {}", e);
                SummaryTable::default()
            }
        };
        self.normalized = match core::normalize(&table) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("normalization skipped: {}", e);
                PriceTable::default()
            }
        };
        self.table = table;
        let symbol_count = self.table.symbols().count();
        if symbol_count > 0 {
            self.selected_asset %= symbol_count;
        } else {
            self.selected_asset = 0;
        }
        self.is_refreshing = false;
    }

    fn selected_symbol(&self) -> Option<&str> {
        self.table.symbols().nth(self.selected_asset)
    }

    fn current_range(&self) -> &'static str {
        RANGES[self.range_index]
    }
}

/// Fetches and caches a fresh table. Runs on a background task so the
/// draw loop never blocks on the network.
async fn refresh(config: AppConfig, range: String) -> Result<PriceTable> {
    let fetch_config = FetchConfig {
        range,
        interval: config.fetch.interval.clone(),
    };
    let table = fetch::fetch_price_table(&config.all_symbols(), &fetch_config).await?;

    let storage = AsyncStorageManager::new_relative("storage").await?;
    storage.save("snapshot", &table).await?;
    Ok(table)
}

// --- TUI ---

pub async fn run_dashboard() -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>) -> Result<()> {
    let (data_tx, mut data_rx) = mpsc::channel::<Result<PriceTable>>(1);
    let mut app = App::new().await?;

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok(result) = data_rx.try_recv() {
            match result {
                Ok(table) => app.set_table(table),
                Err(e) => {
                    warn!("refresh failed: {}", e);
                    app.is_refreshing = false;
                }
            }
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => {
                    if !handle_key_event(key, &mut app, &data_tx) {
                        return Ok(());
                    }
                }
                // Redraw picks up the new size on the next iteration.
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
}

fn spawn_refresh(app: &mut App, tx: &mpsc::Sender<Result<PriceTable>>) {
    app.is_refreshing = true;
    let config = app.config.clone();
    let range = app.current_range().to_string();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = refresh(config, range).await;
        let _ = tx.send(result).await;
    });
}

fn handle_key_event(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<Result<PriceTable>>) -> bool {
    match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::F(5) if !app.is_refreshing => spawn_refresh(app, tx),
        KeyCode::Char('r') if !app.is_refreshing => {
            app.range_index = (app.range_index + 1) % RANGES.len();
            spawn_refresh(app, tx);
        }
        KeyCode::Up => {
            app.selected_view = app
                .selected_view
                .checked_sub(1)
                .unwrap_or(app.views.len() - 1);
        }
        KeyCode::Down => {
            app.selected_view = (app.selected_view + 1) % app.views.len();
        }
        KeyCode::Left => {
            let count = app.table.symbols().count();
            if count > 0 {
                app.selected_asset = app.selected_asset.checked_sub(1).unwrap_or(count - 1);
            }
        }
        KeyCode::Right => {
            let count = app.table.symbols().count();
            if count > 0 {
                app.selected_asset = (app.selected_asset + 1) % count;
            }
        }
        KeyCode::Char(c) if c.is_ascii_digit() => {
            let digit = c.to_digit(10).unwrap_or(0);
            if digit > 0 && digit <= app.views.len() as u32 {
                app.selected_view = (digit - 1) as usize;
            }
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(f.size());

    let content_chunks =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[1]);

    render_sidebar(f, app, main_layout[0]);

    let as_of = app
        .table
        .dates
        .last()
        .map(|d| d.format("%d-%m-%Y").to_string())
        .unwrap_or_else(|| "Never".to_string());
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title_alignment(Alignment::Center)
            .title(format!(
                "Market Lab | Range: {} | Data as of: {}",
                app.current_range(),
                as_of
            )),
        content_chunks[0],
    );

    match app.selected_view {
        0 => render_performance_chart(f, app, content_chunks[1]),
        1 => render_deep_dive(f, app, content_chunks[1]),
        _ => render_summary_table(f, app, content_chunks[1]),
    }

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Fetching prices...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title_alignment(Alignment::Center);
    let inner = sidebar_block.inner(area);
    f.render_widget(sidebar_block, area);

    let chunks = Layout::vertical([
        Constraint::Min(1),    // view list
        Constraint::Length(2), // key hints
    ])
    .split(inner);

    let view_lines: Vec<Line> = app
        .views
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let mut line = Line::from(format!("{}. {}", i + 1, view));
            if i == app.selected_view {
                line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
            }
            line
        })
        .collect();
    f.render_widget(Paragraph::new(view_lines), chunks[0]);

    f.render_widget(
        Paragraph::new("F5 refresh | r range\n←/→ asset | q quit").alignment(Alignment::Center),
        chunks[1],
    );
}

/// Points for one column, skipping gaps. X is the row index so all lines
/// share an axis even when a symbol starts later than the others.
fn column_points(column: &[Option<f64>]) -> Vec<(f64, f64)> {
    column
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| cell.map(|v| (i as f64, v)))
        .collect()
}

fn y_bounds(point_sets: &[(String, Vec<(f64, f64)>)]) -> (f64, f64) {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for (_, points) in point_sets {
        for &(_, y) in points {
            min = min.min(y);
            max = max.max(y);
        }
    }
    if min > max {
        (0.0, 1.0)
    } else if min == max {
        (min - 1.0, max + 1.0)
    } else {
        (min, max)
    }
}

fn date_labels(dates: &[NaiveDate]) -> Vec<Span<'static>> {
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => vec![
            Span::from(first.format("%d-%m").to_string()),
            Span::from(last.format("%d-%m").to_string()),
        ],
        _ => Vec::new(),
    }
}

fn render_chart(
    f: &mut Frame,
    area: Rect,
    title: String,
    dates: &[NaiveDate],
    point_sets: &[(String, Vec<(f64, f64)>)],
    y_title: &str,
) {
    if point_sets.iter().all(|(_, p)| p.is_empty()) {
        f.render_widget(
            Paragraph::new("No data yet. Press F5 to fetch.")
                .block(Block::default().borders(Borders::ALL).title(title))
                .alignment(Alignment::Center),
            area,
        );
        return;
    }

    let datasets: Vec<Dataset> = point_sets
        .iter()
        .enumerate()
        .map(|(i, (name, points))| {
            Dataset::default()
                .name(name.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(PALETTE[i % PALETTE.len()]))
                .data(points)
        })
        .collect();

    let (y_min, y_max) = y_bounds(point_sets);
    let x_max = dates.len().saturating_sub(1).max(1) as f64;

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(date_labels(dates)),
        )
        .y_axis(
            Axis::default()
                .title(y_title.to_string())
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::from(format!("{:.1}", y_min)),
                    Span::from(format!("{:.1}", (y_min + y_max) / 2.0)),
                    Span::from(format!("{:.1}", y_max)),
                ]),
        );
    f.render_widget(chart, area);
}

/// Every asset rebased to 100 on one axis. Pure growth comparison.
fn render_performance_chart(f: &mut Frame, app: &App, area: Rect) {
    let point_sets: Vec<(String, Vec<(f64, f64)>)> = app
        .normalized
        .closes
        .iter()
        .map(|(symbol, column)| (symbol.clone(), column_points(column)))
        .collect();

    render_chart(
        f,
        area,
        format!("Relative Performance ({})", app.current_range()),
        &app.normalized.dates,
        &point_sets,
        "Growth (Base=100)",
    );
}

/// One asset's raw closes with its moving-average trend line.
fn render_deep_dive(f: &mut Frame, app: &App, area: Rect) {
    let Some(symbol) = app.selected_symbol().map(String::from) else {
        render_chart(f, area, "Deep Dive".to_string(), &[], &[], "Price ($)");
        return;
    };

    let column = &app.table.closes[&symbol];
    let mut point_sets = vec![(symbol.clone(), column_points(column))];

    match core::moving_average(column, app.config.ma_window) {
        Ok(ma) => {
            let ma_points = column_points(&ma);
            if !ma_points.is_empty() {
                point_sets.push((format!("{}-Day MA", app.config.ma_window), ma_points));
            }
        }
        Err(e) => warn!("moving average skipped: {}", e),
    }

    render_chart(
        f,
        area,
        format!("{} Price Action (←/→ to switch)", symbol),
        &app.table.dates,
        &point_sets,
        "Price ($)",
    );
}

fn render_summary_table(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new([
        Cell::from("Rank"),
        Cell::from("Symbol"),
        Cell::from("Group"),
        Cell::from("Price ($)"),
        Cell::from("Day %"),
        Cell::from("Rel Strength"),
    ])
    .style(Style::default().bg(Color::DarkGray));

    let ranked = app.summary.ranked();
    let top_strength = ranked.first().map_or(1.0, |(_, r)| r.rel_strength);
    let safe_top = if top_strength == 0.0 { 1.0 } else { top_strength };

    let rows: Vec<Row> = ranked
        .iter()
        .enumerate()
        .map(|(i, (symbol, raw_row))| {
            let row = raw_row.rounded();
            let ratio = if safe_top <= 0.0 {
                1.0
            } else {
                (0.4 + 0.6 * (row.rel_strength / safe_top)).max(0.4)
            };
            let cyan_val = (255.0 * ratio) as u8;
            let green_val = (255.0 * ratio) as u8;
            let gray_val = (150.0 * ratio) as u8;

            let pct_style = |v: f64| {
                if v < 0.0 {
                    Style::default().fg(Color::Rgb(green_val, 0, 0))
                } else {
                    Style::default().fg(Color::Rgb(0, green_val, 0))
                }
            };

            Row::new([
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(symbol.to_string())
                    .style(Style::default().fg(Color::Rgb(0, cyan_val, cyan_val))),
                Cell::from(app.config.group_of(symbol))
                    .style(Style::default().fg(Color::Rgb(gray_val, gray_val, gray_val))),
                Cell::from(format!("{:.2}", row.price)),
                Cell::from(format!("{:+.2}%", row.day_pct)).style(pct_style(row.day_pct)),
                Cell::from(format!("{:+.2}%", row.rel_strength)).style(pct_style(row.rel_strength)),
            ])
            .height(1)
        })
        .collect();

    f.render_widget(
        Table::new(
            rows,
            [
                Constraint::Length(6),
                Constraint::Percentage(18),
                Constraint::Percentage(26),
                Constraint::Percentage(18),
                Constraint::Percentage(18),
                Constraint::Percentage(20),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Summary vs {}", app.summary.benchmark)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
