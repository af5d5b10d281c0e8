//! Condition expression evaluator

use super::ast::{CompareOp, Expression, Literal, Operand};
use crate::waypoint::workflow::state::WorkflowState;
use serde_json::Value;

/// Evaluate a condition expression against workflow state
pub fn evaluate(expr: &Expression, state: &WorkflowState) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Truthy(operand) => is_truthy(resolve(operand, state).as_ref()),
        Expression::Compare { left, op, right } => {
            evaluate_compare(resolve(left, state).as_ref(), *op, right)
        }
        Expression::And(left, right) => evaluate(left, state) && evaluate(right, state),
        Expression::Or(left, right) => evaluate(left, state) || evaluate(right, state),
        Expression::Not(inner) => !evaluate(inner, state),
    }
}

/// Look up the operand's path; a modulo applies to numbers only
fn resolve(operand: &Operand, state: &WorkflowState) -> Option<Value> {
    let value = state.get_path(&operand.path)?;
    match operand.modulo {
        None => Some(value.clone()),
        Some(m) => value
            .as_f64()
            .and_then(|n| serde_json::Number::from_f64(n % m))
            .map(Value::Number),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn evaluate_compare(left: Option<&Value>, op: CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => compare_numbers(left, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => check_contains(left, right),
    }
}

fn values_equal(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (None | Some(Value::Null), Literal::Null) => true,
        (Some(value), literal) => literal_matches(value, literal),
        (None, _) => false,
    }
}

fn literal_matches(value: &Value, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::String(s), Literal::String(rs)) => s == rs,
        (Value::Number(n), Literal::Number(rn)) => n
            .as_f64()
            .is_some_and(|f| (f - rn).abs() < f64::EPSILON),
        (Value::Bool(b), Literal::Boolean(rb)) => b == rb,
        (Value::Null, Literal::Null) => true,
        _ => false,
    }
}

fn compare_numbers<F>(left: Option<&Value>, right: &Literal, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left.and_then(Value::as_f64), right) {
        (Some(l), Literal::Number(r)) => cmp(l, *r),
        _ => false,
    }
}

fn check_contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Array(items)), literal) => items.iter().any(|item| literal_matches(item, literal)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::workflow::condition::parser::parse;
    use serde_json::json;

    fn state_with(pairs: Vec<(&str, Value)>) -> WorkflowState {
        let mut state = WorkflowState::empty();
        for (k, v) in pairs {
            state.update(k, v).unwrap();
        }
        state
    }

    fn check(expr: &str, state: &WorkflowState) -> bool {
        evaluate(&parse(expr).unwrap(), state)
    }

    #[test]
    fn test_string_equality() {
        let state = state_with(vec![("approval", json!("yes"))]);
        assert!(check("approval == 'yes'", &state));
        assert!(!check("approval == 'no'", &state));
        assert!(check("approval != 'no'", &state));
    }

    #[test]
    fn test_parity_with_modulo() {
        let even = state_with(vec![("count", json!(4))]);
        let odd = state_with(vec![("count", json!(3))]);

        assert!(check("count % 2 == 0", &even));
        assert!(!check("count % 2 == 0", &odd));
        assert!(check("count % 2 == 1", &odd));
    }

    #[test]
    fn test_number_comparison() {
        let state = state_with(vec![("score", json!(2))]);

        assert!(check("score > 1", &state));
        assert!(check("score >= 2", &state));
        assert!(!check("score < 2", &state));
        assert!(check("score <= 2.5", &state));
        assert!(!check("score > 'a'", &state));
    }

    #[test]
    fn test_null_and_missing() {
        let state = state_with(vec![("result", json!(null))]);

        assert!(check("result == null", &state));
        assert!(check("missing == null", &state));
        assert!(!check("missing == 'value'", &state));
        assert!(!check("missing > 0", &state));
    }

    #[test]
    fn test_contains() {
        let state = state_with(vec![
            ("query", json!("I want to book a flight")),
            ("tags", json!(["bug", 3, true])),
        ]);

        assert!(check("query contains 'book'", &state));
        assert!(!check("query contains 'cancel'", &state));
        assert!(check("tags contains 'bug'", &state));
        assert!(check("tags contains 3", &state));
        assert!(check("tags contains true", &state));
        assert!(!check("tags contains 'feature'", &state));
    }

    #[test]
    fn test_truthiness() {
        let state = state_with(vec![
            ("approved", json!(true)),
            ("messages", json!([])),
            ("topic", json!("rust")),
        ]);

        assert!(check("approved", &state));
        assert!(!check("messages", &state));
        assert!(check("topic and not messages", &state));
        assert!(!check("missing", &state));
    }

    #[test]
    fn test_logical_combinations() {
        let state = state_with(vec![("intent", json!("code")), ("confidence", json!(0.9))]);

        assert!(check("intent == 'code' and confidence > 0.8", &state));
        assert!(!check("intent == 'search' and confidence > 0.8", &state));
        assert!(check("intent == 'search' or confidence > 0.8", &state));
        assert!(check("not (intent == 'search')", &state));
        assert!(!check("(intent == 'code' or false) and confidence > 0.95", &state));
    }

    #[test]
    fn test_nested_path() {
        let state = state_with(vec![("result", json!({"data": {"intent": "search"}}))]);
        assert!(check("result.data.intent == 'search'", &state));
    }
}
