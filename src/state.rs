//! Structural matching of expected state trees against actual state.
//!
//! An expected tree is plain data, except that an object carrying one of the
//! keys `exact`, `exists`, `contains` or `regex` is a match operator instead of
//! a nested structure. Absent values and `null` are treated alike.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::State;

/// How one expected node is compared against its actual counterpart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Matcher<'a> {
    Exact(&'a Value),
    Exists(&'a Value),
    Contains(&'a Value),
    Regex(&'a Value),
    Nested(&'a Map<String, Value>),
    Sequence(&'a [Value]),
    Literal(&'a Value),
}

impl<'a> Matcher<'a> {
    /// Operator keys are checked in the order `exact`, `exists`, `contains`, `regex`;
    /// the first one present wins and any sibling keys are ignored.
    pub fn parse(expected: &'a Value) -> Self {
        match expected {
            Value::Object(map) => {
                if let Some(v) = map.get("exact") {
                    Matcher::Exact(v)
                } else if let Some(v) = map.get("exists") {
                    Matcher::Exists(v)
                } else if let Some(v) = map.get("contains") {
                    Matcher::Contains(v)
                } else if let Some(v) = map.get("regex") {
                    Matcher::Regex(v)
                } else {
                    Matcher::Nested(map)
                }
            }
            Value::Array(items) => Matcher::Sequence(items),
            other => Matcher::Literal(other),
        }
    }

    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.filter(|v| !v.is_null());
        match *self {
            Matcher::Exact(expected) | Matcher::Literal(expected) => {
                values_equal(expected, actual.unwrap_or(&Value::Null))
            }
            Matcher::Exists(expected) => values_equal(&Value::Bool(actual.is_some()), expected),
            Matcher::Contains(needle) => match (needle, actual) {
                (Value::String(needle), Some(Value::String(hay))) => hay.contains(needle.as_str()),
                _ => false,
            },
            Matcher::Regex(pattern) => match (pattern, actual) {
                (Value::String(pattern), Some(Value::String(text))) => regex_search(pattern, text),
                _ => false,
            },
            Matcher::Nested(expected) => match actual {
                Some(Value::Object(actual)) => expected
                    .iter()
                    .all(|(key, exp)| compare_field(exp, actual.get(key))),
                _ => false,
            },
            Matcher::Sequence(expected) => match actual {
                Some(Value::Array(actual)) => {
                    expected.len() == actual.len()
                        && expected
                            .iter()
                            .zip(actual)
                            .all(|(exp, act)| compare_field(exp, Some(act)))
                }
                _ => false,
            },
        }
    }
}

fn regex_search(pattern: &str, text: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "invalid regex in expected state");
            false
        }
    }
}

/// Recursive structural match of one expected node against an optional actual node.
pub fn compare_field(expected: &Value, actual: Option<&Value>) -> bool {
    Matcher::parse(expected).matches(actual)
}

/// Deep equality where numbers compare by value, so `1` equals `1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(x), Some(y)) if x == y)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, v)| y.get(key).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateComparison {
    #[serde(rename = "match")]
    pub matched: bool,
    /// Fraction of top-level expected fields that matched.
    pub correctness: f64,
    /// Per-field outcome as a boolean, in the expected tree's key order.
    pub field_results: Map<String, Value>,
}

/// Scores each top-level expected field separately; nested levels are all-or-nothing.
pub fn compare_state(expected: &State, actual: &State) -> StateComparison {
    if expected.is_empty() {
        return StateComparison {
            matched: true,
            correctness: 1.0,
            field_results: Map::new(),
        };
    }

    let field_results: Map<String, Value> = expected
        .iter()
        .map(|(key, exp)| (key.clone(), Value::Bool(compare_field(exp, actual.get(key)))))
        .collect();
    let hits = field_results
        .values()
        .filter(|ok| ok.as_bool() == Some(true))
        .count();

    StateComparison {
        matched: hits == field_results.len(),
        correctness: hits as f64 / field_results.len() as f64,
        field_results,
    }
}

/// Shallow merge: each top-level key of `delta` replaces the same key in `state`.
pub fn merge_state(state: &mut State, delta: &State) {
    for (key, value) in delta {
        state.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: Value) -> State {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn exact_operator() {
        assert!(compare_field(&json!({ "exact": 5 }), Some(&json!(5))));
        assert!(compare_field(&json!({ "exact": 5 }), Some(&json!(5.0))));
        assert!(!compare_field(&json!({ "exact": 5 }), Some(&json!(6))));
        assert!(compare_field(&json!({ "exact": { "a": [1, 2] } }), Some(&json!({ "a": [1, 2] }))));
        assert!(!compare_field(&json!({ "exact": { "a": 1 } }), Some(&json!({ "a": 1, "b": 2 }))));
        assert!(!compare_field(&json!({ "exact": "x" }), None));
    }

    #[test]
    fn exists_operator() {
        assert!(compare_field(&json!({ "exists": true }), Some(&json!(0))));
        assert!(!compare_field(&json!({ "exists": true }), None));
        assert!(!compare_field(&json!({ "exists": true }), Some(&Value::Null)));
        assert!(compare_field(&json!({ "exists": false }), None));
        assert!(!compare_field(&json!({ "exists": false }), Some(&json!("here"))));
    }

    #[test]
    fn contains_and_regex_operators() {
        assert!(compare_field(&json!({ "contains": "fund" }), Some(&json!("refunded"))));
        assert!(!compare_field(&json!({ "contains": "fund" }), Some(&json!(["fund"]))));
        assert!(compare_field(&json!({ "regex": "^ref.*ed$" }), Some(&json!("refunded"))));
        assert!(compare_field(&json!({ "regex": "\\d+" }), Some(&json!("order 42 done"))));
        assert!(!compare_field(&json!({ "regex": "\\d+" }), Some(&json!(42))));
        assert!(!compare_field(&json!({ "regex": "(" }), Some(&json!("("))));
    }

    #[test]
    fn first_operator_key_wins() {
        let expected = json!({ "exact": "a", "contains": "zzz" });
        assert!(compare_field(&expected, Some(&json!("a"))));
    }

    #[test]
    fn nested_structure_ignores_extra_keys() {
        let expected = json!({ "order": { "status": { "exact": "refunded" }, "id": "o1" } });
        let actual = json!({ "order": { "status": "refunded", "id": "o1", "amount": 49.99 } });
        assert!(compare_field(&expected, Some(&actual)));

        let actual = json!({ "order": { "status": "open", "id": "o1" } });
        assert!(!compare_field(&expected, Some(&actual)));
        assert!(!compare_field(&expected, Some(&json!({ "order": "o1" }))));
        assert!(!compare_field(&expected, None));
    }

    #[test]
    fn sequences_match_positionally() {
        let expected = json!([{ "contains": "a" }, 2]);
        assert!(compare_field(&expected, Some(&json!(["cat", 2]))));
        assert!(!compare_field(&expected, Some(&json!([2, "cat"]))));
        assert!(!compare_field(&expected, Some(&json!(["cat", 2, 3]))));
        assert!(!compare_field(&expected, Some(&json!("cat"))));
    }

    #[test]
    fn literals_use_equality() {
        assert!(compare_field(&json!("x"), Some(&json!("x"))));
        assert!(compare_field(&Value::Null, None));
        assert!(!compare_field(&json!(true), Some(&json!(1))));
    }

    #[test]
    fn empty_expected_state_always_matches() {
        let result = compare_state(&State::new(), &state(json!({ "anything": 1 })));
        assert!(result.matched);
        assert_eq!(result.correctness, 1.0);
        assert!(result.field_results.is_empty());

        let result = compare_state(&State::new(), &State::new());
        assert!(result.matched);
        assert_eq!(result.correctness, 1.0);
    }

    #[test]
    fn state_gives_partial_credit_per_top_level_field() {
        let expected = state(json!({
            "status": { "exact": "refunded" },
            "counter": 2,
            "order": { "id": "o1", "amount": 10 },
            "note": { "exists": true }
        }));
        let actual = state(json!({
            "status": "refunded",
            "counter": 2,
            "order": { "id": "o1", "amount": 11 }
        }));

        let result = compare_state(&expected, &actual);
        assert!(!result.matched);
        assert_eq!(result.correctness, 0.5);
        assert_eq!(result.field_results.get("status"), Some(&json!(true)));
        assert_eq!(result.field_results.get("order"), Some(&json!(false)));
        assert_eq!(result.field_results.get("note"), Some(&json!(false)));
    }

    #[test]
    fn field_results_follow_expected_key_order() {
        let expected = state(json!({ "zeta": 1, "alpha": 2, "mid": { "exists": true } }));
        let actual = state(json!({ "alpha": 2, "mid": "x", "zeta": 0 }));

        let result = compare_state(&expected, &actual);
        let keys: Vec<&str> = result.field_results.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""field_results":{"zeta":false,"alpha":true,"mid":true}"#));
    }

    #[test]
    fn merge_replaces_top_level_keys_only() {
        let mut working = state(json!({ "a": 1, "nested": { "x": 1, "y": 2 } }));
        let delta = state(json!({ "nested": { "x": 5 }, "b": true }));
        merge_state(&mut working, &delta);

        assert_eq!(
            Value::Object(working),
            json!({ "a": 1, "nested": { "x": 5 }, "b": true })
        );
    }
}
