//! Pure condition evaluation for workflow transitions.
//!
//! Conditions are stored as JSON on the transition row and decoded into
//! typed values when a definition is written or a graph is loaded, so a
//! malformed condition is rejected at admin/validation time and can never
//! surface during evaluation.
//!
//! Absent-field policy: a field whose dot-path does not resolve (or
//! resolves to JSON null) is "absent". Every operator evaluates to false
//! against an absent value, except `not_equals` and `is_absent`, which
//! evaluate to true.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    InSet,
    IsAbsent,
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionOp::Equals => "equals",
            ConditionOp::NotEquals => "not_equals",
            ConditionOp::GreaterThan => "greater_than",
            ConditionOp::GreaterThanOrEqual => "greater_than_or_equal",
            ConditionOp::LessThan => "less_than",
            ConditionOp::LessThanOrEqual => "less_than_or_equal",
            ConditionOp::Contains => "contains",
            ConditionOp::InSet => "in_set",
            ConditionOp::IsAbsent => "is_absent",
        };
        f.write_str(s)
    }
}

/// One predicate over the application's condition context. A transition's
/// condition list is combined with logical AND; an empty list is
/// unconditionally true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: Value,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// Resolve a dot-path (e.g. "application_data.gpa") into the context.
fn resolve<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    if current.is_null() { None } else { Some(current) }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    // Numbers compare numerically so 3 == 3.0 holds across JSON sources.
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

/// Ordering comparison: numeric if both sides are numbers, lexicographic
/// if both are strings, otherwise no ordering (None).
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

/// Evaluate a single condition against the context.
pub fn evaluate_one(condition: &Condition, ctx: &Value) -> bool {
    let actual = resolve(ctx, &condition.field);

    let Some(actual) = actual else {
        return matches!(condition.op, ConditionOp::NotEquals | ConditionOp::IsAbsent);
    };

    match condition.op {
        ConditionOp::Equals => values_equal(actual, &condition.value),
        ConditionOp::NotEquals => !values_equal(actual, &condition.value),
        ConditionOp::GreaterThan => {
            compare(actual, &condition.value) == Some(std::cmp::Ordering::Greater)
        }
        ConditionOp::GreaterThanOrEqual => matches!(
            compare(actual, &condition.value),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        ),
        ConditionOp::LessThan => {
            compare(actual, &condition.value) == Some(std::cmp::Ordering::Less)
        }
        ConditionOp::LessThanOrEqual => matches!(
            compare(actual, &condition.value),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        ),
        ConditionOp::Contains => contains(actual, &condition.value),
        ConditionOp::InSet => match &condition.value {
            Value::Array(set) => set.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        ConditionOp::IsAbsent => false,
    }
}

/// Evaluate all conditions (logical AND). Empty list is true.
pub fn evaluate_all(conditions: &[Condition], ctx: &Value) -> bool {
    conditions.iter().all(|c| evaluate_one(c, ctx))
}

/// Return the first condition that does not hold, for structured error
/// reporting. None means the whole list is satisfied.
pub fn first_unmet<'a>(conditions: &'a [Condition], ctx: &Value) -> Option<&'a Condition> {
    conditions.iter().find(|c| !evaluate_one(c, ctx))
}

/// Decode a stored JSON condition list. Used at definition-write time and
/// by the validator, so evaluation never sees malformed input.
pub fn decode(raw: &str) -> Result<Vec<Condition>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, op: ConditionOp, value: Value) -> Condition {
        Condition { field: field.to_string(), op, value }
    }

    #[test]
    fn resolves_dot_paths() {
        let ctx = json!({ "application_data": { "gpa": 3.2 } });
        assert!(evaluate_one(
            &cond("application_data.gpa", ConditionOp::GreaterThan, json!(3.0)),
            &ctx
        ));
    }

    #[test]
    fn absent_policy() {
        let ctx = json!({});
        assert!(!evaluate_one(&cond("gpa", ConditionOp::GreaterThanOrEqual, json!(3.0)), &ctx));
        assert!(!evaluate_one(&cond("gpa", ConditionOp::Equals, json!(3.0)), &ctx));
        assert!(evaluate_one(&cond("gpa", ConditionOp::NotEquals, json!(3.0)), &ctx));
        assert!(evaluate_one(&cond("gpa", ConditionOp::IsAbsent, Value::Null), &ctx));

        // Explicit null counts as absent too.
        let ctx = json!({ "gpa": null });
        assert!(evaluate_one(&cond("gpa", ConditionOp::IsAbsent, Value::Null), &ctx));
    }

    #[test]
    fn boundary_is_inclusive() {
        let ctx = json!({ "gpa": 3.0 });
        assert!(evaluate_one(&cond("gpa", ConditionOp::GreaterThanOrEqual, json!(3.0)), &ctx));
        let ctx = json!({ "gpa": 2.5 });
        assert!(!evaluate_one(&cond("gpa", ConditionOp::GreaterThanOrEqual, json!(3.0)), &ctx));
    }

    #[test]
    fn mixed_types_do_not_order() {
        let ctx = json!({ "gpa": "high" });
        assert!(!evaluate_one(&cond("gpa", ConditionOp::GreaterThan, json!(3.0)), &ctx));
        assert!(!evaluate_one(&cond("gpa", ConditionOp::LessThan, json!(3.0)), &ctx));
    }

    #[test]
    fn contains_and_in_set() {
        let ctx = json!({ "tags": ["stem", "honors"], "essay": "strong opening" });
        assert!(evaluate_one(&cond("tags", ConditionOp::Contains, json!("honors")), &ctx));
        assert!(!evaluate_one(&cond("tags", ConditionOp::Contains, json!("arts")), &ctx));
        assert!(evaluate_one(&cond("essay", ConditionOp::Contains, json!("strong")), &ctx));
        assert!(evaluate_one(
            &cond("essay", ConditionOp::InSet, json!(["weak", "strong opening"])),
            &ctx
        ));
    }

    #[test]
    fn integer_and_float_equality() {
        let ctx = json!({ "credits": 12 });
        assert!(evaluate_one(&cond("credits", ConditionOp::Equals, json!(12.0)), &ctx));
    }

    #[test]
    fn empty_list_is_true_and_and_semantics() {
        let ctx = json!({ "a": 1, "b": 2 });
        assert!(evaluate_all(&[], &ctx));
        let conds = vec![
            cond("a", ConditionOp::Equals, json!(1)),
            cond("b", ConditionOp::Equals, json!(3)),
        ];
        assert!(!evaluate_all(&conds, &ctx));
        assert_eq!(first_unmet(&conds, &ctx).unwrap().field, "b");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let ctx = json!({ "gpa": 2.9999 });
        let c = cond("gpa", ConditionOp::LessThan, json!(3.0));
        for _ in 0..100 {
            assert!(evaluate_one(&c, &ctx));
        }
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(decode(r#"[{"field":"gpa","op":"greater_than","value":3.0}]"#).is_ok());
        assert!(decode(r#"[{"field":"gpa","op":"bigger","value":3.0}]"#).is_err());
        assert!(decode("").unwrap().is_empty());
    }
}
