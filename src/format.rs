//! Rendering of raw JSON values under a field's declared format.

use crate::widget::FieldFormat;
use serde_json::Value;

pub const NOT_AVAILABLE: &str = "N/A";

/// Formats values for display. Digit grouping follows the configured
/// currency: Indian lakh/crore grouping for INR, thousands everywhere else.
#[derive(Debug, Clone)]
pub struct FieldFormatter {
    currency: String,
}

impl Default for FieldFormatter {
    fn default() -> Self {
        Self::new("INR")
    }
}

impl FieldFormatter {
    pub fn new(currency: &str) -> FieldFormatter {
        FieldFormatter {
            currency: currency.trim().to_uppercase(),
        }
    }

    fn indian_grouping(&self) -> bool {
        self.currency == "INR"
    }

    /// Render `value` under `format`. Never fails: missing values become
    /// `N/A` and anything non-numeric is shown as plain text.
    pub fn format(&self, value: Option<&Value>, format: FieldFormat) -> String {
        let value = match value {
            None | Some(Value::Null) => return NOT_AVAILABLE.to_string(),
            Some(v) => v,
        };

        match (as_number(value), format) {
            (Some(n), FieldFormat::Currency) => self.format_currency(n),
            (Some(n), FieldFormat::Percentage) => {
                format!("{}%", self.grouped_fixed(n, 2))
            }
            (Some(n), FieldFormat::Number) => self.format_number(n),
            (Some(n), FieldFormat::Compact) => format_compact(n),
            _ => plain(value),
        }
    }

    pub fn format_currency(&self, value: f64) -> String {
        let currency = self.currency.as_str();
        let decimals = if currency == "JPY" { 0 } else { 2 };
        let number = self.grouped_fixed(value.abs(), decimals);
        let sign = if value < 0.0 { "-" } else { "" };

        match currency {
            "INR" => format!("{sign}₹{number}"),
            "USD" | "CAD" | "AUD" | "HKD" | "SGD" => format!("{sign}${number}"),
            "GBP" => format!("{sign}£{number}"),
            "JPY" => format!("{sign}¥{number}"),
            "EUR" => format!("{sign}{number} €"),
            _ => format!("{sign}{number} {currency}"),
        }
    }

    /// Grouped digits with at most three fraction digits, trailing zeros dropped.
    pub fn format_number(&self, value: f64) -> String {
        let fixed = self.grouped_fixed(value, 3);
        if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        }
    }

    fn grouped_fixed(&self, value: f64, decimals: usize) -> String {
        let formatted = format!("{:.*}", decimals, value.abs());
        let (integer_part, decimal_part) = match formatted.split_once('.') {
            Some((i, d)) => (i, Some(d)),
            None => (formatted.as_str(), None),
        };
        let grouped = group_digits(integer_part, self.indian_grouping());
        let sign = if value < 0.0 { "-" } else { "" };
        match decimal_part {
            Some(d) => format!("{sign}{grouped}.{d}"),
            None => format!("{sign}{grouped}"),
        }
    }
}

/// Numeric reading of a JSON value: numbers as-is, strings only when the
/// whole string parses to a finite number.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Plain string form: strings without quotes, everything else as JSON text.
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => n.as_f64().map_or_else(|| n.to_string(), plain_number),
        other => other.to_string(),
    }
}

fn format_compact(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        plain_number(value)
    }
}

fn plain_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn group_digits(digits: &str, indian: bool) -> String {
    let chars: Vec<char> = digits.chars().collect();
    if chars.len() <= 3 {
        return digits.to_string();
    }

    let (head, tail) = chars.split_at(chars.len() - 3);
    let size = if indian { 2 } else { 3 };
    let mut groups: Vec<String> = head
        .rchunks(size)
        .rev()
        .map(|chunk| chunk.iter().collect::<String>())
        .collect();
    groups.push(tail.iter().collect());
    groups.join(",")
}
