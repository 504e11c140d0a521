//! Structured filter -> backend formula.

use serde_json::Value;

use crate::{Query, QueryError, QueryResult};

const OR_KEY: &str = "$or";

/// Recognized operator symbols inside an operator-object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    On,
    In,
    Nin,
    Lt,
    Lte,
    Gt,
    Gte,
    Ne,
}

impl Operator {
    pub fn parse(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "$on" => Self::On,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$ne" => Self::Ne,
            _ => return None,
        })
    }

    fn comparison(&self) -> Option<&'static str> {
        match self {
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Ne => Some("!="),
            Self::On | Self::In | Self::Nin => None,
        }
    }

    fn condition(&self, field: &str, operand: &Value) -> String {
        match self {
            Self::On => format!("FIND('{}', ARRAYJOIN({{{field}}}, ',')) > 0", escape_operand(operand)),
            Self::In => {
                let parts: Vec<String> = operand_list(operand)
                    .iter()
                    .map(|v| equals(field, v))
                    .collect();
                format!("OR({})", parts.join(","))
            }
            Self::Nin => {
                let parts: Vec<String> = operand_list(operand)
                    .iter()
                    .map(|v| format!("NOT({})", equals(field, v)))
                    .collect();
                format!("AND({})", parts.join(","))
            }
            cmp => {
                // Only comparison operators reach this arm.
                let symbol = cmp.comparison().unwrap_or("=");
                format!("{{{field}}} {symbol} '{}'", escape_operand(operand))
            }
        }
    }
}

/// Compile filter predicates into one formula.
///
/// Directive keys must already be stripped (see [`crate::normalize`]). Returns
/// an empty string when there is nothing to filter on.
pub fn compile_formula(query: &Query) -> QueryResult<String> {
    if let Some(Value::Array(subs)) = query.get(OR_KEY) {
        let mut parts = Vec::with_capacity(subs.len());
        for sub in subs {
            let part = match sub {
                Value::Object(m) => compile_formula(m)?,
                other => value_text(other),
            };
            if !part.is_empty() {
                parts.push(part);
            }
        }
        return Ok(format!("OR({})", parts.join(",")));
    }

    let mut conditions: Vec<String> = Vec::new();
    for (field, value) in query.iter() {
        if field == OR_KEY {
            continue;
        }
        match value {
            Value::Object(ops) => {
                for (symbol, operand) in ops.iter() {
                    let op = Operator::parse(symbol).ok_or_else(|| invalid(symbol, field))?;
                    conditions.push(op.condition(field, operand));
                }
            }
            // A list in predicate position is an operator-object keyed by position.
            Value::Array(items) => {
                if !items.is_empty() {
                    return Err(invalid("0", field));
                }
            }
            literal => conditions.push(equals(field, literal)),
        }
    }

    Ok(match conditions.len() {
        0 => String::new(),
        1 => conditions.remove(0),
        _ => format!("AND({})", conditions.join(",")),
    })
}

/// Textual form of an operand for embedding between single quotes.
///
/// Strings get each `'` escaped as `\'`; everything else uses its plain text.
pub fn escape_operand(v: &Value) -> String {
    match v {
        Value::String(s) => s.replace('\'', "\\'"),
        other => value_text(other),
    }
}

/// Plain textual representation used for operands and query-string values.
pub(crate) fn value_text(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_text(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|i| if i.is_null() { String::new() } else { value_text(i) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => v.to_string(),
    }
}

/// Integral floats print without a fractional part (`1.0` -> `1`).
fn number_text(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f == 0.0 => "0".to_string(),
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}

fn equals(field: &str, v: &Value) -> String {
    format!("{{{field}}} = '{}'", escape_operand(v))
}

fn operand_list(operand: &Value) -> Vec<&Value> {
    match operand {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

fn invalid(operator: &str, field: &str) -> QueryError {
    QueryError::InvalidOperator { operator: operator.to_string(), field: field.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn q(v: Value) -> Query {
        v.as_object().cloned().unwrap()
    }

    fn compile(v: Value) -> String {
        compile_formula(&q(v)).unwrap()
    }

    #[test]
    fn empty_filter_is_empty_formula() {
        assert_eq!(compile(json!({})), "");
    }

    #[test]
    fn single_predicate_is_unwrapped() {
        assert_eq!(compile(json!({ "name": "ada" })), "{name} = 'ada'");
    }

    #[test]
    fn multiple_predicates_and_in_insertion_order() {
        assert_eq!(
            compile(json!({ "b": 2, "a": "x", "c": true })),
            "AND({b} = '2',{a} = 'x',{c} = 'true')"
        );
    }

    #[test]
    fn or_combines_subqueries() {
        assert_eq!(compile(json!({ "$or": [{ "a": 1 }, { "b": 2 }] })), "OR({a} = '1',{b} = '2')");
    }

    #[test]
    fn or_drops_empty_subqueries_and_short_circuits_level() {
        assert_eq!(
            compile(json!({ "z": 9, "$or": [{}, { "a": 1 }, {}] })),
            "OR({a} = '1')"
        );
    }

    #[test]
    fn nested_and_inside_or() {
        assert_eq!(
            compile(json!({ "$or": [{ "a": 1, "b": 2 }, { "c": { "$gt": 3 } }] })),
            "OR(AND({a} = '1',{b} = '2'),{c} > '3')"
        );
    }

    #[test]
    fn non_list_or_is_ignored() {
        assert_eq!(compile(json!({ "$or": "x", "a": 1 })), "{a} = '1'");
    }

    #[test]
    fn operator_fragments() {
        assert_eq!(compile(json!({ "tags": { "$on": "red" } })), "FIND('red', ARRAYJOIN({tags}, ',')) > 0");
        assert_eq!(compile(json!({ "s": { "$in": ["a", "b"] } })), "OR({s} = 'a',{s} = 'b')");
        assert_eq!(compile(json!({ "s": { "$nin": ["a", "b"] } })), "AND(NOT({s} = 'a'),NOT({s} = 'b'))");
        assert_eq!(compile(json!({ "n": { "$lt": 1 } })), "{n} < '1'");
        assert_eq!(compile(json!({ "n": { "$lte": 1 } })), "{n} <= '1'");
        assert_eq!(compile(json!({ "n": { "$gt": 1 } })), "{n} > '1'");
        assert_eq!(compile(json!({ "n": { "$gte": 1 } })), "{n} >= '1'");
        assert_eq!(compile(json!({ "n": { "$ne": "x" } })), "{n} != 'x'");
    }

    #[test]
    fn several_operators_on_one_field_each_add_a_condition() {
        assert_eq!(compile(json!({ "n": { "$gte": 1, "$lt": 5 } })), "AND({n} >= '1',{n} < '5')");
    }

    #[test]
    fn integral_floats_drop_fraction() {
        assert_eq!(compile(json!({ "n": 1.0 })), "{n} = '1'");
        assert_eq!(compile(json!({ "n": -0.0 })), "{n} = '0'");
        assert_eq!(compile(json!({ "n": 2.5 })), "{n} = '2.5'");
        assert_eq!(compile(json!({ "n": { "$gt": 1e20 } })), "{n} > '100000000000000000000'");
    }

    #[test]
    fn scalar_in_operand_is_one_element_list() {
        assert_eq!(compile(json!({ "s": { "$in": "a" } })), "OR({s} = 'a')");
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(compile(json!({ "name": "O'Brien" })), "{name} = 'O\\'Brien'");
        assert_eq!(compile(json!({ "tags": { "$on": "it's" } })), "FIND('it\\'s', ARRAYJOIN({tags}, ',')) > 0");
    }

    #[test]
    fn unknown_operator_names_symbol_and_field() {
        let err = compile_formula(&q(json!({ "a": { "$foo": 1 } }))).unwrap_err();
        assert_eq!(err, QueryError::InvalidOperator { operator: "$foo".into(), field: "a".into() });
        assert_eq!(err.to_string(), "invalid operator $foo for field a");
    }

    #[test]
    fn unknown_operator_inside_or_propagates() {
        let err = compile_formula(&q(json!({ "$or": [{ "a": 1 }, { "b": { "$regex": "x" } }] }))).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperator { ref operator, ref field } if operator == "$regex" && field == "b"));
    }

    #[test]
    fn null_and_list_literals_use_plain_text() {
        assert_eq!(compile(json!({ "a": null })), "{a} = 'null'");
        assert_eq!(compile(json!({ "n": { "$lt": [1, 2] } })), "{n} < '1,2'");
    }
}
