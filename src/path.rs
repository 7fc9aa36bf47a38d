//! Dotted-path lookup into arbitrary JSON.

use crate::widget::ROOT_PATH;
use serde_json::Value;

/// Resolve `path` against `document`.
///
/// An empty path or the root sentinel returns the document itself. Segments
/// are applied as property lookups in order; when the current value is an
/// array the lookup is applied to its first element, so `items.price`
/// against `{"items": [..]}` reads `items[0].price`. Single-value displays
/// therefore only ever see the first element of an array.
///
/// Returns `None` as soon as a segment cannot be applied.
pub fn resolve<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() || path == ROOT_PATH {
        return Some(document);
    }

    let mut current = document;
    for segment in path.split('.') {
        if current.is_null() {
            return None;
        }
        if let Value::Array(items) = current {
            current = items.first()?;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_root() {
        let doc = json!({"a": 1});
        assert_eq!(resolve(&doc, ""), Some(&doc));
        assert_eq!(resolve(&doc, "root"), Some(&doc));
    }

    #[test]
    fn test_resolve_nested() {
        let doc = json!({"price": {"current": 101.2, "currency": "INR"}});
        assert_eq!(resolve(&doc, "price.current"), Some(&json!(101.2)));
        assert_eq!(resolve(&doc, "price.currency"), Some(&json!("INR")));
    }

    #[test]
    fn test_resolve_descends_into_first_array_element() {
        let doc = json!({"quotes": [{"symbol": "INFY"}, {"symbol": "TCS"}]});
        assert_eq!(resolve(&doc, "quotes.symbol"), Some(&json!("INFY")));

        let doc = json!([{"close": 10}, {"close": 11}]);
        assert_eq!(resolve(&doc, "close"), Some(&json!(10)));
    }

    #[test]
    fn test_resolve_misses() {
        let doc = json!({"a": null, "b": [], "c": 5, "d": [null]});
        assert_eq!(resolve(&doc, "a.x"), None);
        assert_eq!(resolve(&doc, "b.x"), None);
        assert_eq!(resolve(&doc, "c.x"), None);
        assert_eq!(resolve(&doc, "d.x"), None);
        assert_eq!(resolve(&doc, "missing"), None);
        assert_eq!(resolve(&doc, "missing.deeper"), None);
    }

    #[test]
    fn test_resolve_null_leaf() {
        let doc = json!({"a": {"b": null}});
        assert_eq!(resolve(&doc, "a.b"), Some(&Value::Null));
    }
}
