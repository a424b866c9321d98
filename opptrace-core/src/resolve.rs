//! Config path resolver
//!
//! Walks a run's config along a [`TracePath`](crate::path::TracePath) to find
//! the exact trigger, condition or action fragment a trace step executed.
//!
//! ## Segment rules
//!
//! | Current value | Segment | Result |
//! |---------------|---------|--------|
//! | object | key | field value, error if missing |
//! | list | index | element, error if out of range |
//! | anything but a list | `0` | unchanged |
//! | anything but a list | other index | error |
//! | anything but an object | key | error |
//!
//! The `0` rule covers configs that use a single object where a one-element
//! list is expected (`condition: {...}` instead of `condition: [{...}]`).
//!
//! A failure means the trace and config are out of sync. Callers surface it;
//! they never substitute a default fragment.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::path::{Segment, TracePath};

/// Resolve `path` against `config`.
pub fn resolve<'a>(config: &'a Value, path: &str) -> Result<&'a Value> {
    let parsed = TracePath::parse(path)?;
    resolve_path(config, &parsed)
}

/// Resolve an already parsed path against `config`.
pub fn resolve_path<'a>(config: &'a Value, path: &TracePath) -> Result<&'a Value> {
    let mut current = config;

    for segment in path.segments() {
        current = step(current, segment).map_err(|reason| Error::Resolution {
            path: path.to_string(),
            segment: segment.to_string(),
            reason,
        })?;
    }

    Ok(current)
}

/// Like [`resolve`], but a missing fragment is `None` instead of an error.
///
/// Only for probing optional structure while building graphs; trace keys
/// always go through [`resolve`].
pub fn try_resolve<'a>(config: &'a Value, path: &TracePath) -> Option<&'a Value> {
    resolve_path(config, path).ok()
}

fn step<'a>(current: &'a Value, segment: &Segment) -> std::result::Result<&'a Value, String> {
    match (segment, current) {
        (Segment::Key(key), Value::Object(map)) => map
            .get(key)
            .ok_or_else(|| format!("no key {:?} on object", key)),
        (Segment::Key(key), other) => Err(format!(
            "cannot read key {:?} from {}",
            key,
            kind_name(other)
        )),
        (Segment::Index(index), Value::Array(items)) => items.get(*index).ok_or_else(|| {
            format!(
                "index {} out of range for sequence of length {}",
                index,
                items.len()
            )
        }),
        (Segment::Index(0), other) => Ok(other),
        (Segment::Index(index), other) => Err(format!(
            "cannot index non-sequence ({}) with {}",
            kind_name(other),
            index
        )),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_condition_field() {
        let config = json!({
            "condition": [{"condition": "state"}],
            "action": [{"service": "x"}]
        });
        assert_eq!(
            resolve(&config, "condition/0/condition").unwrap(),
            &json!("state")
        );
        assert_eq!(
            resolve(&config, "action/0").unwrap(),
            &json!({"service": "x"})
        );
    }

    #[test]
    fn test_zero_index_on_object_is_noop() {
        // Single object where a one-element list is expected
        let config = json!({"condition": {"foo": 1}});
        assert_eq!(resolve(&config, "condition/0/foo").unwrap(), &json!(1));
    }

    #[test]
    fn test_nonzero_index_on_object_fails() {
        let config = json!({"condition": {"foo": 1}});
        let err = resolve(&config, "condition/1/foo").unwrap_err();
        match err {
            Error::Resolution {
                path,
                segment,
                reason,
            } => {
                assert_eq!(path, "condition/1/foo");
                assert_eq!(segment, "1");
                assert!(reason.contains("cannot index non-sequence"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_key_fails() {
        let config = json!({"action": [{"service": "x"}]});
        assert!(resolve(&config, "condition/0").is_err());
        assert!(resolve(&config, "action/0/data").is_err());
    }

    #[test]
    fn test_out_of_range_fails() {
        let config = json!({"action": [{"service": "x"}]});
        let err = resolve(&config, "action/1").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_key_on_scalar_fails() {
        let config = json!({"action": [{"service": "x"}]});
        assert!(resolve(&config, "action/0/service/name").is_err());
    }

    #[test]
    fn test_nested_choose() {
        let config = json!({
            "action": [
                {"delay": 1},
                {"choose": [
                    {"conditions": [{"condition": "template"}],
                     "sequence": [{"service": "light.turn_on"}, {"service": "light.turn_off"}]}
                ], "default": [{"stop": "nope"}]}
            ]
        });
        assert_eq!(
            resolve(&config, "action/1/choose/0/sequence/1/service").unwrap(),
            &json!("light.turn_off")
        );
        assert_eq!(
            resolve(&config, "action/1/default/0/stop").unwrap(),
            &json!("nope")
        );
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let config = json!({});
        assert!(matches!(
            resolve(&config, ""),
            Err(Error::InvalidPath { .. })
        ));
    }
}
