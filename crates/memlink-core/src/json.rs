//! Ordered field lookup over loosely shaped JSON.
//!
//! Hosts and backends disagree on field names. Callers keep an explicit,
//! ordered table of candidate paths and read through [`pick`] instead of
//! chaining optional lookups at every call site.

use serde_json::Value;

/// First present, non-null value among `paths`.
///
/// A path is a `/`-separated list of object keys, e.g. `"thread/id"`.
pub fn pick<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        let mut cur = value;
        for segment in path.split('/') {
            cur = cur.get(segment)?;
        }
        (!cur.is_null()).then_some(cur)
    })
}

/// String view of a scalar. Numbers and booleans are rendered; arrays and
/// objects yield `None`.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First candidate that renders as a non-blank string, trimmed.
pub fn pick_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| {
        pick(value, &[path])
            .and_then(scalar_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pick_follows_order() {
        let v = json!({"b": 2, "a": 1});
        assert_eq!(pick(&v, &["a", "b"]), Some(&json!(1)));
        assert_eq!(pick(&v, &["missing", "b"]), Some(&json!(2)));
    }

    #[test]
    fn pick_nested_path() {
        let v = json!({"thread": {"id": "t-1"}});
        assert_eq!(pick(&v, &["thread/id"]), Some(&json!("t-1")));
        assert_eq!(pick(&v, &["thread/missing"]), None);
    }

    #[test]
    fn pick_skips_null() {
        let v = json!({"a": null, "b": "x"});
        assert_eq!(pick(&v, &["a", "b"]), Some(&json!("x")));
    }

    #[test]
    fn pick_str_skips_blank_strings() {
        let v = json!({"a": "  ", "b": 7});
        assert_eq!(pick_str(&v, &["a", "b"]).as_deref(), Some("7"));
    }

    #[test]
    fn scalar_string_rejects_containers() {
        assert_eq!(scalar_string(&json!([1])), None);
        assert_eq!(scalar_string(&json!(true)).as_deref(), Some("true"));
    }
}
