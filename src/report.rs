//! Plain-terminal tables for the non-interactive commands.

use crate::format::FieldFormatter;
use crate::portfolio::{Portfolio, SectorSummary};
use crate::projection::{ChartView, TableView, WidgetView};
use crate::schema::sample_preview;
use crate::widget::{DisplayMode, FieldFormat, WidgetConfig, WidgetField};
use comfy_table::{
    presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement, Table,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
    table
}

fn header<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<Cell> {
    names
        .into_iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

/// Discovered fields with a short preview of their sample values.
pub fn catalog_table(fields: &[&WidgetField]) -> Table {
    let mut table = new_table();
    table.set_header(header(["Path", "Label", "Type", "Sample"]));
    for field in fields {
        table.add_row(vec![
            Cell::new(&field.path),
            Cell::new(&field.label),
            Cell::new(field.value_type.as_str()).fg(TColor::DarkCyan),
            Cell::new(sample_preview(field)),
        ]);
    }
    table
}

pub fn widgets_table(widgets: &[WidgetConfig]) -> Table {
    let mut table = new_table();
    table.set_header(header(["ID", "Name", "Mode", "Fields", "Refresh", "API URL"]));
    for widget in widgets {
        let mode = match widget.display_mode {
            DisplayMode::Chart => format!("chart ({})", widget.chart_type().as_str()),
            other => other.as_str().to_string(),
        };
        let refresh = match widget.refresh_interval {
            0 => "off".to_string(),
            secs => format!("{secs}s"),
        };
        table.add_row(vec![
            Cell::new(&widget.id),
            Cell::new(&widget.name).add_attribute(Attribute::Bold),
            Cell::new(mode),
            Cell::new(fields_summary(&widget.fields)),
            Cell::new(refresh).set_alignment(CellAlignment::Right),
            Cell::new(&widget.api_url),
        ]);
    }
    table
}

/// `path` per field, with `:format` when one is set.
fn fields_summary(fields: &[WidgetField]) -> String {
    fields
        .iter()
        .map(|field| match field.format {
            None | Some(FieldFormat::None) => field.path.clone(),
            Some(format) => format!("{}:{}", field.path, format.as_str()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One widget's projection as a table.
pub fn view_table(view: &WidgetView) -> Table {
    match view {
        WidgetView::Loading => message_table("Loading...", TColor::Yellow),
        WidgetView::Error(msg) => message_table(msg, TColor::Red),
        WidgetView::Empty(msg) => message_table(msg, TColor::Grey),
        WidgetView::Card(card) => {
            let mut table = new_table();
            table.set_header(header(["Field", "Value"]));
            for row in &card.rows {
                table.add_row(vec![
                    Cell::new(&row.label),
                    Cell::new(&row.value).set_alignment(CellAlignment::Right),
                ]);
            }
            table
        }
        WidgetView::Table(t) => rows_table(t),
        WidgetView::Chart(chart) => chart_table(chart),
    }
}

fn message_table(msg: &str, color: TColor) -> Table {
    let mut table = new_table();
    table.add_row(vec![Cell::new(msg).fg(color)]);
    table
}

fn rows_table(view: &TableView) -> Table {
    let mut table = new_table();
    table.set_header(header(view.columns.iter().map(String::as_str)));
    for row in &view.rows {
        table.add_row(row.iter().map(Cell::new).collect::<Vec<_>>());
    }
    table
}

fn chart_table(chart: &ChartView) -> Table {
    let mut table = new_table();
    if !chart.candles.is_empty() {
        table.set_header(header(["Point", "Open", "High", "Low", "Close"]));
        for c in &chart.candles {
            let color = if c.is_bullish() { TColor::Green } else { TColor::Red };
            table.add_row(vec![
                Cell::new(&c.name),
                Cell::new(c.open).set_alignment(CellAlignment::Right),
                Cell::new(c.high).set_alignment(CellAlignment::Right),
                Cell::new(c.low).set_alignment(CellAlignment::Right),
                Cell::new(c.close).set_alignment(CellAlignment::Right).fg(color),
            ]);
        }
        return table;
    }

    table.set_header(header(
        std::iter::once("Point").chain(chart.series.iter().map(String::as_str)),
    ));
    for point in &chart.points {
        let mut cells = vec![Cell::new(&point.name)];
        for label in &chart.series {
            let cell = match point.get(label) {
                Some(v) => Cell::new(v),
                None => Cell::new("-"),
            };
            cells.push(cell.set_alignment(CellAlignment::Right));
        }
        table.add_row(cells);
    }
    table
}

fn right(text: impl Into<String>) -> Cell {
    Cell::new(text.into()).set_alignment(CellAlignment::Right)
}

fn gain_color(value: f64) -> TColor {
    if value >= 0.0 {
        TColor::Green
    } else {
        TColor::Red
    }
}

fn signed(value: f64, text: String) -> String {
    if value > 0.0 {
        format!("+{text}")
    } else {
        text
    }
}

/// Holdings with derived columns, followed by a totals row.
pub fn holdings_table(portfolio: &Portfolio, formatter: &FieldFormatter) -> Table {
    let mut table = new_table();
    table.set_header(header([
        "Particulars",
        "Exchange",
        "Sector",
        "Qty",
        "Purchase",
        "CMP",
        "Investment",
        "Weight",
        "Present Value",
        "Gain/Loss",
        "P/E",
        "Earnings",
    ]));

    let optional = |value: Option<f64>| match value {
        Some(v) if v > 0.0 => format!("{v:.2}"),
        _ => "-".to_string(),
    };

    for holding in &portfolio.holdings {
        let gain = holding.gain_loss();
        let exchange = match holding.exchange.as_str() {
            "" => "-",
            e => e,
        };
        table.add_row(vec![
            Cell::new(&holding.particulars).add_attribute(Attribute::Bold),
            Cell::new(exchange),
            Cell::new(holding.sector()).fg(TColor::DarkCyan),
            right(formatter.format_number(holding.quantity)),
            right(formatter.format_currency(holding.purchase_price)),
            right(formatter.format_currency(holding.market_price())),
            right(formatter.format_currency(holding.investment())),
            right(format!("{:.2}%", portfolio.portfolio_percentage(holding))),
            right(formatter.format_currency(holding.present_value())),
            right(signed(gain, formatter.format_currency(gain))).fg(gain_color(gain)),
            right(optional(holding.pe_ratio)),
            right(optional(holding.latest_earnings)),
        ]);
    }

    let totals = portfolio.totals();
    let weight = if portfolio.holdings.is_empty() { "0.00%" } else { "100.00%" };
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        right(formatter.format_currency(totals.total_investment)).add_attribute(Attribute::Bold),
        right(weight),
        right(formatter.format_currency(totals.total_present_value)).add_attribute(Attribute::Bold),
        right(signed(
            totals.total_gain_loss,
            format!(
                "{} ({:.2}%)",
                formatter.format_currency(totals.total_gain_loss),
                totals.total_gain_loss_percentage
            ),
        ))
        .fg(gain_color(totals.total_gain_loss)),
        Cell::new(""),
        Cell::new(""),
    ]);
    table
}

/// Per-sector totals in the order sectors first appear.
pub fn sectors_table(sectors: &[SectorSummary], formatter: &FieldFormatter) -> Table {
    let mut table = new_table();
    table.set_header(header([
        "Sector",
        "Stocks",
        "Investment",
        "Present Value",
        "Gain/Loss",
        "Return",
    ]));
    for sector in sectors {
        let gain = sector.total_gain_loss;
        let color = gain_color(gain);
        table.add_row(vec![
            Cell::new(&sector.sector).add_attribute(Attribute::Bold),
            right(sector.stock_count.to_string()),
            right(formatter.format_currency(sector.total_investment)),
            right(formatter.format_currency(sector.total_present_value)),
            right(signed(gain, formatter.format_currency(gain))).fg(color),
            right(signed(gain, format!("{:.2}%", sector.return_percentage()))).fg(color),
        ]);
    }
    table
}
