//! Heuristics that locate the interesting array inside an API response.
//!
//! Both searches walk object keys in document order and stop at the first
//! match, so key order in the response is part of the contract.

use crate::format::{as_number, plain};
use crate::path::resolve;
use crate::widget::{ChartType, ValueType, WidgetField};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys checked, in order, before a blind search for a series array.
pub const TIME_SERIES_KEYS: [&str; 6] = ["data", "values", "series", "timeSeries", "history", "prices"];

/// Keys checked, in order, for a point's x-axis label.
pub const DATE_KEYS: [&str; 5] = ["date", "time", "timestamp", "datetime", "x"];

pub const OHLC_KEYS: [&str; 8] = ["open", "high", "low", "close", "o", "h", "l", "c"];

pub const OHLC_PREFIX: &str = "ohlc_";

/// Unix timestamps below this are taken as seconds rather than milliseconds.
const SECONDS_CUTOFF: f64 = 1e11;

/// The array a table widget should list.
///
/// An array document is returned as-is. Otherwise each property is checked
/// in key order: a non-empty array wins immediately, a nested value is
/// searched depth-first before moving to the next key. Returns an empty
/// slice when nothing is found.
pub fn find_display_array(document: &Value) -> &[Value] {
    match document {
        Value::Array(items) => items,
        Value::Object(map) => {
            for value in map.values() {
                if let Value::Array(items) = value {
                    if !items.is_empty() {
                        return items;
                    }
                }
                let found = find_display_array(value);
                if !found.is_empty() {
                    return found;
                }
            }
            &[]
        }
        _ => &[],
    }
}

/// The array a chart widget should plot.
///
/// An array whose first element is an object is the series itself. For
/// objects the conventional keys in [`TIME_SERIES_KEYS`] are tried first,
/// then every value is searched in key order. Array elements are searched
/// the same way when the array does not itself look like a series.
pub fn find_time_series(document: &Value) -> &[Value] {
    match document {
        Value::Array(items) => {
            if items.first().is_some_and(Value::is_object) {
                return items;
            }
            for item in items {
                let found = find_time_series(item);
                if !found.is_empty() {
                    return found;
                }
            }
            &[]
        }
        Value::Object(map) => {
            for key in TIME_SERIES_KEYS {
                if let Some(Value::Array(items)) = map.get(key) {
                    return items;
                }
            }
            for value in map.values() {
                let found = find_time_series(value);
                if !found.is_empty() {
                    return found;
                }
            }
            &[]
        }
        _ => &[],
    }
}

/// One x-axis tick. Series values are keyed by field label; OHLC values
/// found on candle charts are stored under `ohlc_<key>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub name: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl ChartPoint {
    pub fn new(name: &str) -> ChartPoint {
        ChartPoint {
            name: name.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn ohlc(&self, long: &str, short: &str) -> Option<f64> {
        self.get(&format!("{OHLC_PREFIX}{long}"))
            .or_else(|| self.get(&format!("{OHLC_PREFIX}{short}")))
    }

    /// The point as a candle, when all four prices were found.
    pub fn candle(&self) -> Option<Candle> {
        let open = self.ohlc("open", "o")?;
        let high = self.ohlc("high", "h")?;
        let low = self.ohlc("low", "l")?;
        let close = self.ohlc("close", "c")?;
        Some(Candle {
            name: self.name.clone(),
            open,
            high,
            low,
            close,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub name: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Build chart points for a widget's selected fields.
///
/// Without a series in the document, a single point named `Value` is built
/// from the first field's value resolved against the whole document, so a
/// chart always has something to draw once any field is selected.
pub fn chart_points(document: &Value, fields: &[WidgetField], chart_type: ChartType) -> Vec<ChartPoint> {
    let series = find_time_series(document);
    if series.is_empty() {
        let Some(first) = fields.first() else {
            return Vec::new();
        };
        let mut point = ChartPoint::new("Value");
        if let Some(n) = resolve(document, &first.path).and_then(as_number) {
            point.values.insert(first.label.clone(), n);
        }
        return vec![point];
    }

    series
        .iter()
        .enumerate()
        .map(|(idx, item)| map_point(idx, item, fields, chart_type))
        .collect()
}

fn map_point(idx: usize, item: &Value, fields: &[WidgetField], chart_type: ChartType) -> ChartPoint {
    let name = DATE_KEYS
        .iter()
        .filter_map(|key| item.get(*key))
        .find(|v| is_truthy(v))
        .map(format_date)
        .unwrap_or_else(|| format!("Point {}", idx + 1));

    let mut point = ChartPoint::new(&name);
    for field in fields {
        if let Some(n) = resolve(item, &field.path).and_then(as_number) {
            point.values.insert(field.label.clone(), n);
        }
    }

    if chart_type == ChartType::Candle {
        for key in OHLC_KEYS {
            if let Some(n) = resolve(item, key).and_then(as_number) {
                point.values.insert(format!("{OHLC_PREFIX}{key}"), n);
            }
        }
    }
    point
}

/// Fields worth drawing as a series: declared numbers, or fields whose
/// label carries a number on the first point.
pub fn numeric_fields<'a>(fields: &'a [WidgetField], points: &[ChartPoint]) -> Vec<&'a WidgetField> {
    fields
        .iter()
        .filter(|f| {
            f.value_type == ValueType::Number
                || points.first().is_some_and(|p| p.get(&f.label).is_some())
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Day/month/year label for a date-ish value. Unparseable values are shown
/// as they are.
pub fn format_date(value: &Value) -> String {
    parse_date(value)
        .map(|d| d.format("%-d/%-m/%Y").to_string())
        .unwrap_or_else(|| plain(value))
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let millis = if raw.abs() < SECONDS_CUTOFF { raw * 1000.0 } else { raw };
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .map(|d| d.date_naive())
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Some(d.date_naive());
            }
            for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
                if let Ok(d) = NaiveDateTime::parse_from_str(s, pattern) {
                    return Some(d.date());
                }
            }
            for pattern in ["%Y-%m-%d", "%Y/%m/%d"] {
                if let Ok(d) = NaiveDate::parse_from_str(s, pattern) {
                    return Some(d);
                }
            }
            None
        }
        _ => None,
    }
}
