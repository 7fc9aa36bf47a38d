//! Widget data model.
//!
//! A widget binds an arbitrary JSON API to one of three display modes. The
//! types here are shared by schema discovery, the binding service, the
//! projection engines and the persisted dashboard state.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Path sentinel that addresses the document itself.
pub const ROOT_PATH: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    /// Type of a JSON value as seen at discovery time. `null` reports as
    /// `Object`, the same answer a JavaScript `typeof` gives.
    pub fn of(value: &Value) -> ValueType {
        match value {
            Value::String(_) => ValueType::String,
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Boolean,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) | Value::Null => ValueType::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a selected field is rendered. Unknown names read from storage fall
/// back to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    Currency,
    Percentage,
    Number,
    Compact,
    // serde(other) must sit on the last variant
    #[default]
    #[serde(other)]
    None,
}

impl FieldFormat {
    pub fn all() -> &'static [FieldFormat] {
        &[
            FieldFormat::None,
            FieldFormat::Currency,
            FieldFormat::Percentage,
            FieldFormat::Number,
            FieldFormat::Compact,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldFormat::None => "none",
            FieldFormat::Currency => "currency",
            FieldFormat::Percentage => "percentage",
            FieldFormat::Number => "number",
            FieldFormat::Compact => "compact",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldFormat::None)
    }
}

impl FromStr for FieldFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(FieldFormat::None),
            "currency" => Ok(FieldFormat::Currency),
            "percentage" | "percent" => Ok(FieldFormat::Percentage),
            "number" => Ok(FieldFormat::Number),
            "compact" => Ok(FieldFormat::Compact),
            _ => {
                let known: Vec<&str> = FieldFormat::all().iter().map(FieldFormat::as_str).collect();
                Err(format!(
                    "Unknown field format: '{s}' (expected one of {})",
                    known.join(", ")
                ))
            }
        }
    }
}

/// A discovered or selected location inside a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetField {
    pub path: String,
    pub label: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
}

impl WidgetField {
    pub fn new(path: &str, label: &str, value_type: ValueType, sample_value: Option<Value>) -> Self {
        WidgetField {
            path: path.to_string(),
            label: label.to_string(),
            value_type,
            sample_value,
            format: None,
        }
    }

    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn format(&self) -> FieldFormat {
        self.format.unwrap_or_default()
    }

    /// Parse a `PATH[:LABEL[:FORMAT]]` selector as given on the command line.
    /// The label defaults to the last path segment.
    pub fn from_selector(selector: &str) -> Result<WidgetField, ValidationError> {
        let mut parts = selector.splitn(3, ':');
        let path = parts.next().unwrap_or("").trim();
        if path.is_empty() {
            return Err(ValidationError::EmptyFieldPath);
        }
        let label = match parts.next().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => default_label(path),
        };
        let format = match parts.next() {
            Some(f) => FieldFormat::from_str(f).map_err(ValidationError::InvalidFormat)?,
            None => FieldFormat::None,
        };
        let value_type = if format.is_numeric() {
            ValueType::Number
        } else {
            ValueType::String
        };
        Ok(WidgetField::new(path, &label, value_type, None).with_format(format))
    }
}

/// Last segment of a dotted path.
pub fn default_label(path: &str) -> String {
    path.rsplit('.').next().unwrap_or(path).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Card,
    Table,
    Chart,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Card => "card",
            DisplayMode::Table => "table",
            DisplayMode::Chart => "chart",
        }
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "card" => Ok(DisplayMode::Card),
            "table" => Ok(DisplayMode::Table),
            "chart" => Ok(DisplayMode::Chart),
            _ => Err(format!("Unknown display mode: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
    Candle,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Candle => "candle",
        }
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "line" => Ok(ChartType::Line),
            "candle" | "candlestick" => Ok(ChartType::Candle),
            _ => Err(format!("Unknown chart type: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartInterval {
    Daily,
    Weekly,
    Monthly,
}

impl ChartInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartInterval::Daily => "daily",
            ChartInterval::Weekly => "weekly",
            ChartInterval::Monthly => "monthly",
        }
    }
}

impl FromStr for ChartInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(ChartInterval::Daily),
            "weekly" => Ok(ChartInterval::Weekly),
            "monthly" => Ok(ChartInterval::Monthly),
            _ => Err(format!("Unknown chart interval: '{s}'")),
        }
    }
}

/// A user-configured widget. Treated as immutable for the duration of one
/// fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub api_url: String,
    /// Seconds between refreshes, 0 disables the timer.
    pub refresh_interval: u64,
    pub fields: Vec<WidgetField>,
    #[serde(alias = "type", default)]
    pub display_mode: DisplayMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_interval: Option<ChartInterval>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl WidgetConfig {
    pub fn new(name: &str, api_url: &str, fields: Vec<WidgetField>, display_mode: DisplayMode) -> Self {
        let created_at = Utc::now();
        WidgetConfig {
            id: format!("widget-{}", created_at.timestamp_millis()),
            name: name.to_string(),
            description: None,
            api_url: api_url.to_string(),
            refresh_interval: 30,
            fields,
            display_mode,
            chart_type: None,
            chart_interval: None,
            created_at,
            last_updated: None,
        }
    }

    pub fn chart_type(&self) -> ChartType {
        self.chart_type.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::NameRequired);
        }
        if self.api_url.trim().is_empty() {
            return Err(ValidationError::UrlRequired);
        }
        if self.fields.is_empty() {
            return Err(ValidationError::NoFieldsSelected);
        }
        if self.fields.iter().any(|f| f.path.trim().is_empty()) {
            return Err(ValidationError::EmptyFieldPath);
        }
        if let Some(field) = self.fields.iter().find(|f| f.label.trim().is_empty()) {
            return Err(ValidationError::EmptyFieldLabel(field.path.clone()));
        }
        Ok(())
    }
}

/// Outcome of probing a candidate API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<WidgetField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiTestResult {
    pub fn ok(data: Value, fields: Vec<WidgetField>) -> Self {
        ApiTestResult {
            success: true,
            data: Some(data),
            fields: Some(fields),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        ApiTestResult {
            success: false,
            data: None,
            fields: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(format!("Unknown theme: '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_type_of() {
        assert_eq!(ValueType::of(&json!("a")), ValueType::String);
        assert_eq!(ValueType::of(&json!(1.5)), ValueType::Number);
        assert_eq!(ValueType::of(&json!(true)), ValueType::Boolean);
        assert_eq!(ValueType::of(&json!([1])), ValueType::Array);
        assert_eq!(ValueType::of(&json!({})), ValueType::Object);
        assert_eq!(ValueType::of(&Value::Null), ValueType::Object);
    }

    #[test]
    fn test_unknown_format_deserializes_as_none() {
        let field: WidgetField =
            serde_json::from_value(json!({"path": "a", "label": "a", "type": "number", "format": "fancy"}))
                .unwrap();
        assert_eq!(field.format(), FieldFormat::None);
    }

    #[test]
    fn test_from_selector() {
        let field = WidgetField::from_selector("price.current:Price:currency").unwrap();
        assert_eq!(field.path, "price.current");
        assert_eq!(field.label, "Price");
        assert_eq!(field.format(), FieldFormat::Currency);
        assert_eq!(field.value_type, ValueType::Number);

        let field = WidgetField::from_selector("quote.symbol").unwrap();
        assert_eq!(field.label, "symbol");
        assert_eq!(field.format(), FieldFormat::None);

        assert!(WidgetField::from_selector(":x").is_err());
        assert!(WidgetField::from_selector("a:b:bogus").is_err());
        let err = "bogus".parse::<FieldFormat>().unwrap_err();
        assert!(err.contains("'bogus'"));
        assert!(err.contains("none, currency, percentage, number, compact"));
    }

    #[test]
    fn test_display_mode_alias_type() {
        let cfg: WidgetConfig = serde_json::from_value(json!({
            "id": "w1",
            "name": "Quotes",
            "apiUrl": "https://example.com",
            "refreshInterval": 30,
            "fields": [],
            "type": "table",
            "createdAt": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(cfg.display_mode, DisplayMode::Table);
        assert_eq!(cfg.chart_type(), ChartType::Line);
    }

    #[test]
    fn test_validate() {
        let field = WidgetField::new("a", "A", ValueType::Number, None);
        let mut cfg = WidgetConfig::new("W", "https://example.com", vec![field], DisplayMode::Card);
        assert!(cfg.validate().is_ok());

        cfg.fields.clear();
        assert!(matches!(cfg.validate(), Err(ValidationError::NoFieldsSelected)));

        cfg.name = " ".into();
        assert!(matches!(cfg.validate(), Err(ValidationError::NameRequired)));
    }
}
