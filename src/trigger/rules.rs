//! Rule engine (spec.md §4.8 "Rule engine", §8 property 8).

use regex::Regex;
use serde_json::Value;

use crate::model::trigger::{Operator, Rule, RuleCondition};

/// Resolves dot-notation field access over an event map. Traversal
/// through a non-map value yields a missing field (`None`), never an
/// error.
fn resolve_field<'a>(event: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = event;
    for segment in field.split('.') {
        match current.as_object() {
            Some(obj) => current = obj.get(segment)?,
            None => return None,
        }
    }
    Some(current)
}

/// Coerces a JSON value to f64 for numeric comparisons (spec.md §4.8:
/// "coerce via float conversion (lexical int, int64, float, float64,
/// string)").
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (coerce_f64(a), coerce_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn value_in_list(value: &Value, list: &Value) -> bool {
    match list.as_array() {
        Some(items) => items.iter().any(|item| values_equal(value, item)),
        None => false,
    }
}

/// Evaluates a single condition against an event. Never raises: an
/// invalid regex or a missing field simply yields a non-match (except
/// `notExists`, which is satisfied precisely when the field is
/// missing).
pub fn condition_matches(cond: &RuleCondition, event: &Value) -> bool {
    let field_value = resolve_field(event, &cond.field);

    match cond.operator {
        Operator::Exists => field_value.is_some(),
        Operator::NotExists => field_value.is_none(),
        _ => {
            let Some(field_value) = field_value else {
                return false;
            };
            match cond.operator {
                Operator::Eq => values_equal(field_value, &cond.value),
                Operator::Neq => !values_equal(field_value, &cond.value),
                Operator::Contains => match (value_as_str(field_value), value_as_str(&cond.value)) {
                    (Some(a), Some(b)) => a.contains(&b),
                    _ => false,
                },
                Operator::StartsWith => match (value_as_str(field_value), value_as_str(&cond.value)) {
                    (Some(a), Some(b)) => a.starts_with(&b),
                    _ => false,
                },
                Operator::EndsWith => match (value_as_str(field_value), value_as_str(&cond.value)) {
                    (Some(a), Some(b)) => a.ends_with(&b),
                    _ => false,
                },
                Operator::Gt => match (coerce_f64(field_value), coerce_f64(&cond.value)) {
                    (Some(a), Some(b)) => a > b,
                    _ => false,
                },
                Operator::Lt => match (coerce_f64(field_value), coerce_f64(&cond.value)) {
                    (Some(a), Some(b)) => a < b,
                    _ => false,
                },
                Operator::Regex => {
                    let (Some(haystack), Some(pattern)) =
                        (value_as_str(field_value), value_as_str(&cond.value))
                    else {
                        return false;
                    };
                    match Regex::new(&pattern) {
                        Ok(re) => re.is_match(&haystack),
                        Err(_) => false,
                    }
                }
                Operator::In => value_in_list(field_value, &cond.value),
                Operator::NotIn => !value_in_list(field_value, &cond.value),
                Operator::Exists | Operator::NotExists => unreachable!("handled above"),
            }
        }
    }
}

/// A rule matches when every `all` condition matches AND at least one
/// `any` condition matches (or `any` is empty).
pub fn rule_matches(rule: &Rule, event: &Value) -> bool {
    let all_ok = rule.all.iter().all(|c| condition_matches(c, event));
    let any_ok = rule.any.is_empty() || rule.any.iter().any(|c| condition_matches(c, event));
    all_ok && any_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Value {
        json!({"status": "active", "count": 10, "message": "Hello World"})
    }

    fn cond(field: &str, op: Operator, value: Value) -> RuleCondition {
        RuleCondition {
            field: field.to_string(),
            operator: op,
            value,
        }
    }

    #[test]
    fn eq_and_neq() {
        assert!(condition_matches(&cond("status", Operator::Eq, json!("active")), &event()));
        assert!(!condition_matches(&cond("status", Operator::Neq, json!("active")), &event()));
    }

    #[test]
    fn gt_and_lt() {
        assert!(condition_matches(&cond("count", Operator::Gt, json!(5)), &event()));
        assert!(!condition_matches(&cond("count", Operator::Lt, json!(5)), &event()));
    }

    #[test]
    fn contains_and_starts_with() {
        assert!(condition_matches(
            &cond("message", Operator::Contains, json!("World")),
            &event()
        ));
        assert!(condition_matches(
            &cond("message", Operator::StartsWith, json!("Hello")),
            &event()
        ));
    }

    #[test]
    fn regex_match_and_invalid_pattern_is_false() {
        assert!(condition_matches(
            &cond("message", Operator::Regex, json!("^Hello .*d$")),
            &event()
        ));
        assert!(!condition_matches(
            &cond("message", Operator::Regex, json!("[invalid")),
            &event()
        ));
    }

    #[test]
    fn exists_and_not_exists() {
        assert!(!condition_matches(&cond("age", Operator::Exists, json!(null)), &event()));
        assert!(condition_matches(&cond("age", Operator::NotExists, json!(null)), &event()));
    }

    #[test]
    fn rule_requires_all_and_any() {
        let rule = Rule {
            all: vec![cond("status", Operator::Eq, json!("active"))],
            any: vec![
                cond("count", Operator::Gt, json!(100)),
                cond("message", Operator::Contains, json!("World")),
            ],
        };
        assert!(rule_matches(&rule, &event()));
    }

    #[test]
    fn rule_with_empty_any_only_checks_all() {
        let rule = Rule {
            all: vec![cond("status", Operator::Eq, json!("active"))],
            any: vec![],
        };
        assert!(rule_matches(&rule, &event()));
    }

    #[test]
    fn nested_field_traversal_through_non_map_is_missing() {
        let event = json!({"a": "scalar"});
        assert!(!condition_matches(&cond("a.b", Operator::Exists, json!(null)), &event));
    }
}
