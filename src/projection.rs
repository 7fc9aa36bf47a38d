//! Turns a widget's raw response into what its display mode draws.
//!
//! Every render cycle produces exactly one [`WidgetView`]: a loading
//! marker, an error, an empty state, or a card/table/chart body.

use crate::discovery::{chart_points, find_display_array, numeric_fields, Candle, ChartPoint};
use crate::error::FetchError;
use crate::format::{plain, FieldFormatter};
use crate::path::resolve;
use crate::widget::{ChartType, DisplayMode, WidgetConfig, WidgetField};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::cmp::Ordering;

pub const NO_DATA: &str = "No data available";
pub const NO_FIELDS: &str = "No fields found";

pub const PAGE_SIZES: [usize; 4] = [5, 10, 20, 50];

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetView {
    Loading,
    Error(String),
    Empty(&'static str),
    Card(CardView),
    Table(TableView),
    Chart(ChartView),
}

/// Fetch state of one widget instance.
#[derive(Debug, Clone, Default)]
pub struct WidgetState {
    pub data: Option<Value>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Local>>,
}

impl WidgetState {
    pub fn loading() -> Self {
        WidgetState {
            loading: true,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, result: Result<Value, FetchError>) {
        self.loading = false;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.last_updated = Some(Local::now());
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }
}

/// Build the view for `widget` in its current state.
pub fn project(
    widget: &WidgetConfig,
    state: &WidgetState,
    formatter: &FieldFormatter,
    query: &TableQuery,
) -> WidgetView {
    if state.loading {
        return WidgetView::Loading;
    }
    if let Some(error) = &state.error {
        return WidgetView::Error(error.clone());
    }
    let Some(data) = &state.data else {
        return WidgetView::Empty(NO_DATA);
    };

    match widget.display_mode {
        DisplayMode::Card => {
            if widget.fields.is_empty() {
                return WidgetView::Empty(NO_FIELDS);
            }
            WidgetView::Card(project_card(data, &widget.fields, formatter))
        }
        DisplayMode::Table => {
            let table = project_table(data, &widget.fields, query, formatter);
            if table.rows.is_empty() {
                WidgetView::Empty(NO_DATA)
            } else {
                WidgetView::Table(table)
            }
        }
        DisplayMode::Chart => {
            let chart = project_chart(data, &widget.fields, widget.chart_type());
            if chart.points.is_empty() {
                WidgetView::Empty(NO_DATA)
            } else {
                WidgetView::Chart(chart)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CardRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub rows: Vec<CardRow>,
}

pub fn project_card(data: &Value, fields: &[WidgetField], formatter: &FieldFormatter) -> CardView {
    let rows = fields
        .iter()
        .map(|field| CardRow {
            label: field.label.clone(),
            value: formatter.format(resolve(data, &field.path), field.format()),
        })
        .collect();
    CardView { rows }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Search, sort and paging applied to a table widget.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub search: String,
    pub sort_field: Option<String>,
    pub sort_direction: SortDirection,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        TableQuery {
            search: String::new(),
            sort_field: None,
            sort_direction: SortDirection::Asc,
            page: 1,
            per_page: 10,
        }
    }
}

impl TableQuery {
    /// Sort by `path`; asking again for the same path flips the direction.
    pub fn toggle_sort(&mut self, path: &str) {
        if self.sort_field.as_deref() == Some(path) {
            self.sort_direction = match self.sort_direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
        } else {
            self.sort_field = Some(path.to_string());
            self.sort_direction = SortDirection::Asc;
        }
        self.page = 1;
    }

    pub fn set_search(&mut self, search: &str) {
        self.search = search.to_string();
        self.page = 1;
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.per_page = per_page.max(1);
        self.page = 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub showing_from: usize,
    pub showing_to: usize,
}

impl TableView {
    pub fn summary(&self) -> String {
        format!(
            "Showing {} - {} of {} items",
            self.showing_from, self.showing_to, self.total
        )
    }
}

pub fn project_table(
    data: &Value,
    fields: &[WidgetField],
    query: &TableQuery,
    formatter: &FieldFormatter,
) -> TableView {
    let needle = query.search.trim().to_lowercase();
    let mut rows: Vec<&Value> = find_display_array(data)
        .iter()
        .filter(|row| needle.is_empty() || row_matches(row, fields, &needle))
        .collect();

    if let Some(sort_field) = &query.sort_field {
        let desc = query.sort_direction == SortDirection::Desc;
        rows.sort_by(|a, b| compare_values(resolve(a, sort_field), resolve(b, sort_field), desc));
    }

    let total = rows.len();
    let per_page = query.per_page.max(1);
    let total_pages = total.div_ceil(per_page);
    let page = query.page.clamp(1, total_pages.max(1));
    let start = (page - 1) * per_page;

    let page_rows: Vec<Vec<String>> = rows
        .iter()
        .skip(start)
        .take(per_page)
        .map(|row| {
            fields
                .iter()
                .map(|field| formatter.format(resolve(row, &field.path), field.format()))
                .collect()
        })
        .collect();

    let showing_from = if page_rows.is_empty() { 0 } else { start + 1 };
    TableView {
        columns: fields.iter().map(|f| f.label.clone()).collect(),
        showing_to: (page * per_page).min(total),
        rows: page_rows,
        total,
        page,
        total_pages,
        showing_from,
    }
}

fn row_matches(row: &Value, fields: &[WidgetField], needle: &str) -> bool {
    fields.iter().any(|field| match resolve(row, &field.path) {
        None | Some(Value::Null) => false,
        Some(v) => plain(v).to_lowercase().contains(needle),
    })
}

/// Missing values sort last in either direction.
fn compare_values(a: Option<&Value>, b: Option<&Value>, desc: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ord = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => plain(x).cmp(&plain(y)),
    };
    if desc {
        ord.reverse()
    } else {
        ord
    }
}

// ---------------------------------------------------------------------------
// Chart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ChartView {
    pub chart_type: ChartType,
    pub points: Vec<ChartPoint>,
    /// Labels of the fields drawn as series.
    pub series: Vec<String>,
    /// Complete candles; empty unless the chart type is candle.
    pub candles: Vec<Candle>,
}

impl ChartView {
    /// Values of one series, indexed by point position.
    pub fn series_values(&self, label: &str) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.get(label).map(|v| (i as f64, v)))
            .collect()
    }

    /// Smallest and largest value across drawn series and candles.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let series = self
            .series
            .iter()
            .flat_map(|label| self.points.iter().filter_map(move |p| p.get(label)));
        let candles = self.candles.iter().flat_map(|c| [c.low, c.high]);
        series.chain(candles).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

pub fn project_chart(data: &Value, fields: &[WidgetField], chart_type: ChartType) -> ChartView {
    let points = chart_points(data, fields, chart_type);
    let series = numeric_fields(fields, &points)
        .into_iter()
        .map(|f| f.label.clone())
        .collect();
    let candles = match chart_type {
        ChartType::Candle => points.iter().filter_map(ChartPoint::candle).collect(),
        ChartType::Line => Vec::new(),
    };
    ChartView {
        chart_type,
        points,
        series,
        candles,
    }
}
