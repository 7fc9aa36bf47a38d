//! Field discovery over JSON of unknown shape.
//!
//! `infer_fields` flattens a document into the list of addressable leaves a
//! user can bind a widget to. Paths use the same convention as
//! [`crate::path::resolve`], so every discovered path resolves against the
//! document it was discovered in.

use crate::widget::{FieldFormat, ValueType, WidgetField, ROOT_PATH};
use serde_json::Value;

pub const DEFAULT_MAX_DEPTH: usize = 5;

const OBJECT_ROW_SAMPLE: usize = 3;
const PRIMITIVE_SAMPLE: usize = 5;
const PREVIEW_CHARS: usize = 30;

/// Discover fields with no path prefix and the default depth bound.
pub fn infer_fields(document: &Value) -> Vec<WidgetField> {
    infer_fields_with(document, "", DEFAULT_MAX_DEPTH)
}

/// Discover fields under `prefix`, never descending `max_depth` levels or more.
///
/// Output is depth-first in the key order of the source document. Nested
/// objects are flattened into their leaves and arrays inside objects are
/// reported as a single field. When the value being walked is itself an
/// array of objects, its first element is also walked under the same
/// (unindexed) path so row-level fields can be picked for tables.
pub fn infer_fields_with(document: &Value, prefix: &str, max_depth: usize) -> Vec<WidgetField> {
    let mut fields = Vec::new();
    walk(document, prefix, max_depth, 0, &mut fields);
    fields
}

fn walk(value: &Value, prefix: &str, max_depth: usize, depth: usize, out: &mut Vec<WidgetField>) {
    if depth >= max_depth {
        return;
    }

    match value {
        Value::Null => {}
        Value::Array(items) => {
            let Some(first) = items.first() else {
                return;
            };
            let path = if prefix.is_empty() { ROOT_PATH } else { prefix };
            let label = if prefix.is_empty() { "Array" } else { prefix };
            if first.is_object() {
                out.push(array_field(path, label, items, OBJECT_ROW_SAMPLE));
                walk(first, prefix, max_depth, depth + 1, out);
            } else {
                out.push(array_field(path, label, items, PRIMITIVE_SAMPLE));
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match child {
                    Value::Object(_) => walk(child, &child_path, max_depth, depth + 1, out),
                    Value::Array(items) => {
                        out.push(array_field(&child_path, key, items, OBJECT_ROW_SAMPLE))
                    }
                    _ => out.push(WidgetField::new(
                        &child_path,
                        key,
                        ValueType::of(child),
                        Some(child.clone()),
                    )),
                }
            }
        }
        primitive => {
            let path = if prefix.is_empty() { ROOT_PATH } else { prefix };
            let label = if prefix.is_empty() { "Value" } else { prefix };
            out.push(WidgetField::new(
                path,
                label,
                ValueType::of(primitive),
                Some(primitive.clone()),
            ));
        }
    }
}

fn array_field(path: &str, label: &str, items: &[Value], sample: usize) -> WidgetField {
    let head: Vec<Value> = items.iter().take(sample).cloned().collect();
    WidgetField::new(path, label, ValueType::Array, Some(Value::Array(head)))
}

/// Narrow a field catalog by a case-insensitive search over label and path,
/// optionally keeping arrays only.
pub fn filter_fields<'a>(fields: &'a [WidgetField], search: &str, arrays_only: bool) -> Vec<&'a WidgetField> {
    let needle = search.trim().to_lowercase();
    fields
        .iter()
        .filter(|f| !arrays_only || f.value_type == ValueType::Array)
        .filter(|f| {
            needle.is_empty()
                || f.label.to_lowercase().contains(&needle)
                || f.path.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Toggle `field` in a selection keyed by path. Newly selected numbers
/// default to the `number` format.
pub fn select_field(selected: &mut Vec<WidgetField>, field: &WidgetField) {
    if let Some(pos) = selected.iter().position(|f| f.path == field.path) {
        selected.remove(pos);
        return;
    }
    let format = if field.value_type == ValueType::Number {
        FieldFormat::Number
    } else {
        FieldFormat::None
    };
    selected.push(field.clone().with_format(format));
}

/// Every non-array leaf of a catalog, selected with its default format.
pub fn default_selection(fields: &[WidgetField]) -> Vec<WidgetField> {
    let mut selected = Vec::new();
    for field in fields.iter().filter(|f| f.value_type != ValueType::Array) {
        if !selected.iter().any(|s: &WidgetField| s.path == field.path) {
            select_field(&mut selected, field);
        }
    }
    selected
}

/// Short JSON preview of a field's sample value.
pub fn sample_preview(field: &WidgetField) -> String {
    match &field.sample_value {
        Some(sample) => sample.to_string().chars().take(PREVIEW_CHARS).collect(),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve;
    use serde_json::json;

    fn paths(fields: &[WidgetField]) -> Vec<&str> {
        fields.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_infer_flattens_objects_in_document_order() {
        let doc = json!({
            "symbol": "INFY",
            "price": {"current": 1500.5, "change": -2.1},
            "active": true
        });
        let fields = infer_fields(&doc);
        assert_eq!(paths(&fields), vec!["symbol", "price.current", "price.change", "active"]);
        assert_eq!(fields[0].value_type, ValueType::String);
        assert_eq!(fields[1].value_type, ValueType::Number);
        assert_eq!(fields[1].label, "current");
        assert_eq!(fields[3].value_type, ValueType::Boolean);
    }

    #[test]
    fn test_infer_array_of_objects_walks_first_row() {
        let doc = json!({"quotes": [
            {"symbol": "A", "close": 1},
            {"symbol": "B", "close": 2},
            {"symbol": "C", "close": 3},
            {"symbol": "D", "close": 4}
        ]});
        let fields = infer_fields(&doc);
        assert_eq!(paths(&fields), vec!["quotes"]);
        assert_eq!(fields[0].value_type, ValueType::Array);
        assert_eq!(fields[0].sample_value.as_ref().unwrap().as_array().unwrap().len(), 3);

        let doc = json!([{"symbol": "A", "close": 1}, {"symbol": "B", "close": 2}]);
        let fields = infer_fields(&doc);
        assert_eq!(paths(&fields), vec!["root", "symbol", "close"]);
        assert_eq!(fields[0].label, "Array");
    }

    #[test]
    fn test_infer_primitive_array_samples_five() {
        let doc = json!([1, 2, 3, 4, 5, 6, 7]);
        let fields = infer_fields(&doc);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].sample_value, Some(json!([1, 2, 3, 4, 5])));
    }

    #[test]
    fn test_infer_top_level_primitive_and_null() {
        let fields = infer_fields(&json!(42));
        assert_eq!(paths(&fields), vec!["root"]);
        assert_eq!(fields[0].label, "Value");
        assert!(infer_fields(&Value::Null).is_empty());
        assert!(infer_fields(&json!([])).is_empty());
        assert!(infer_fields(&json!({})).is_empty());
    }

    #[test]
    fn test_infer_respects_max_depth() {
        let mut doc = json!({"leaf": 1});
        for level in (1..=10).rev() {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(format!("l{level}"), doc);
            doc = Value::Object(wrapper);
        }
        doc["shallow"] = json!("here");
        let fields = infer_fields_with(&doc, "", 5);
        assert_eq!(paths(&fields), vec!["shallow"]);

        let fields = infer_fields_with(&doc, "", 20);
        assert!(fields.iter().any(|f| f.path.ends_with("l10.leaf")));
    }

    #[test]
    fn test_infer_is_stable() {
        let doc = json!({"a": {"b": [{"c": 1}]}, "d": [1, 2]});
        assert_eq!(paths(&infer_fields(&doc)), paths(&infer_fields(&doc.clone())));
    }

    #[test]
    fn test_every_inferred_path_resolves() {
        let docs = vec![
            json!({"meta": {"source": "x"}, "data": [{"date": "2024-01-01", "ohlc": {"open": 1}}]}),
            json!([{"a": {"b": 2}, "tags": ["x"]}]),
            json!({"n": null, "v": [1, 2], "s": "str"}),
            json!(3.5),
        ];
        for doc in docs {
            for field in infer_fields(&doc) {
                let resolved = resolve(&doc, &field.path);
                assert!(resolved.is_some(), "{} did not resolve", field.path);
                assert_eq!(ValueType::of(resolved.unwrap()), field.value_type, "{}", field.path);
            }
        }
    }

    #[test]
    fn test_filter_fields() {
        let doc = json!({"price": {"current": 1}, "history": [1, 2], "name": "x"});
        let fields = infer_fields(&doc);
        assert_eq!(filter_fields(&fields, "PRICE", false).len(), 1);
        let arrays = filter_fields(&fields, "", true);
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].path, "history");
        assert_eq!(filter_fields(&fields, "", false).len(), 3);
    }

    #[test]
    fn test_select_field_toggles_with_default_format() {
        let fields = infer_fields(&json!({"price": 1.0, "name": "x"}));
        let mut selected = Vec::new();
        select_field(&mut selected, &fields[0]);
        select_field(&mut selected, &fields[1]);
        assert_eq!(selected[0].format(), FieldFormat::Number);
        assert_eq!(selected[1].format(), FieldFormat::None);
        select_field(&mut selected, &fields[0]);
        assert_eq!(paths(&selected), vec!["name"]);
    }

    #[test]
    fn test_default_selection_skips_arrays() {
        let fields = infer_fields(&json!([{"a": 1, "b": [1, 2], "c": "x"}]));
        let selected = default_selection(&fields);
        assert_eq!(paths(&selected), vec!["a", "c"]);
    }

    #[test]
    fn test_sample_preview_truncates() {
        let field = WidgetField::new("a", "a", ValueType::String, Some(json!("x".repeat(50))));
        assert_eq!(sample_preview(&field).chars().count(), 30);
        let field = WidgetField::new("a", "a", ValueType::String, None);
        assert_eq!(sample_preview(&field), "N/A");
    }
}
