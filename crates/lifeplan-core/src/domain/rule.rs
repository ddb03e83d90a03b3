//! Boolean eligibility rule tree (C1).
//!
//! A rule is a recursive tagged union: `{all:[...]}`, `{any:[...]}`,
//! `{not: rule}`, or a predicate `{fact, op, value?}`. Evaluation is pure
//! and never mutates `facts`.

use serde_json::Value;

use super::error::RuleError;

/// A predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Exists,
    Eq,
    Ne,
    In,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "exists" => Op::Exists,
            "=" => Op::Eq,
            "!=" => Op::Ne,
            "in" => Op::In,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            "<=" => Op::Le,
            _ => return None,
        })
    }
}

/// A single predicate: `{fact, op, value?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub fact: String,
    pub op: Op,
    pub value: Option<Value>,
}

/// The recursive eligibility rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    All(Vec<Rule>),
    Any(Vec<Rule>),
    Not(Box<Rule>),
    Predicate(Predicate),
}

impl Rule {
    /// Parse a rule from its raw JSON representation.
    ///
    /// `null` is rejected ([`RuleError::NullRule`]) since the planner always
    /// substitutes a default of `{all: []}` before calling this.
    pub fn from_value(raw: &Value) -> Result<Rule, RuleError> {
        if raw.is_null() {
            return Err(RuleError::NullRule);
        }
        let obj = raw.as_object().ok_or(RuleError::NotAnObject)?;

        if let Some(clauses) = obj.get("all") {
            let list = clauses.as_array().ok_or(RuleError::AllNotAList)?;
            return Ok(Rule::All(
                list.iter()
                    .map(Rule::from_value)
                    .collect::<Result<_, _>>()?,
            ));
        }
        if let Some(clauses) = obj.get("any") {
            let list = clauses.as_array().ok_or(RuleError::AnyNotAList)?;
            return Ok(Rule::Any(
                list.iter()
                    .map(Rule::from_value)
                    .collect::<Result<_, _>>()?,
            ));
        }
        if let Some(inner) = obj.get("not") {
            return Ok(Rule::Not(Box::new(Rule::from_value(inner)?)));
        }

        let fact = obj.get("fact").and_then(Value::as_str);
        let op_raw = obj.get("op").and_then(Value::as_str);
        let (fact, op_raw) = match (fact, op_raw) {
            (Some(f), Some(o)) => (f, o),
            _ => return Err(RuleError::InvalidPredicate(raw.to_string())),
        };
        let op = Op::parse(op_raw).ok_or_else(|| RuleError::UnsupportedOp(op_raw.to_string()))?;

        Ok(Rule::Predicate(Predicate {
            fact: fact.to_string(),
            op,
            value: obj.get("value").cloned(),
        }))
    }

    /// The default eligibility for a task that declares none: always active.
    pub fn always() -> Rule {
        Rule::All(Vec::new())
    }
}

/// Evaluate `rule` against a flat fact map.
pub fn eval(rule: &Rule, facts: &serde_json::Map<String, Value>) -> bool {
    match rule {
        Rule::All(clauses) => clauses.iter().all(|c| eval(c, facts)),
        Rule::Any(clauses) => clauses.iter().any(|c| eval(c, facts)),
        Rule::Not(inner) => !eval(inner, facts),
        Rule::Predicate(pred) => eval_predicate(pred, facts),
    }
}

fn eval_predicate(pred: &Predicate, facts: &serde_json::Map<String, Value>) -> bool {
    if pred.op != Op::Exists && !facts.contains_key(&pred.fact) {
        return false;
    }
    let left = facts.get(&pred.fact);
    let right = pred.value.as_ref();

    match pred.op {
        Op::Exists => facts.contains_key(&pred.fact),
        Op::Eq => left == right,
        Op::Ne => left != right,
        Op::In => match right.and_then(Value::as_array) {
            Some(list) => left.map(|l| list.contains(l)).unwrap_or(false),
            None => false,
        },
        Op::Gt => compare_numeric(left, right, |a, b| a > b),
        Op::Ge => compare_numeric(left, right, |a, b| a >= b),
        Op::Lt => compare_numeric(left, right, |a, b| a < b),
        Op::Le => compare_numeric(left, right, |a, b| a <= b),
    }
}

fn compare_numeric(left: Option<&Value>, right: Option<&Value>, f: impl Fn(f64, f64) -> bool) -> bool {
    match (left.and_then(Value::as_f64), right.and_then(Value::as_f64)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts(v: Value) -> serde_json::Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn null_rule_is_rejected() {
        assert_eq!(Rule::from_value(&Value::Null), Err(RuleError::NullRule));
    }

    #[test]
    fn empty_all_is_true() {
        let rule = Rule::from_value(&json!({"all": []})).unwrap();
        assert!(eval(&rule, &facts(json!({}))));
    }

    #[test]
    fn empty_any_is_false() {
        let rule = Rule::from_value(&json!({"any": []})).unwrap();
        assert!(!eval(&rule, &facts(json!({}))));
    }

    #[test]
    fn missing_fact_is_false_except_for_exists() {
        let eq_rule = Rule::from_value(&json!({"fact": "x", "op": "=", "value": 1})).unwrap();
        assert!(!eval(&eq_rule, &facts(json!({}))));

        let exists_rule = Rule::from_value(&json!({"fact": "x", "op": "exists"})).unwrap();
        assert!(!eval(&exists_rule, &facts(json!({}))));
        assert!(eval(&exists_rule, &facts(json!({"x": null}))));
    }

    #[test]
    fn in_requires_list_on_right() {
        let rule = Rule::from_value(&json!({"fact": "k", "op": "in", "value": "not-a-list"})).unwrap();
        assert!(!eval(&rule, &facts(json!({"k": "a"}))));

        let rule = Rule::from_value(&json!({"fact": "k", "op": "in", "value": ["a", "b"]})).unwrap();
        assert!(eval(&rule, &facts(json!({"k": "a"}))));
        assert!(!eval(&rule, &facts(json!({"k": "c"}))));
    }

    #[test]
    fn numeric_comparisons_require_both_sides_numeric() {
        let rule = Rule::from_value(&json!({"fact": "age", "op": ">=", "value": 18})).unwrap();
        assert!(eval(&rule, &facts(json!({"age": 21}))));
        assert!(!eval(&rule, &facts(json!({"age": "21"}))));
    }

    #[test]
    fn not_negates_inner_rule() {
        let rule = Rule::from_value(&json!({"not": {"fact": "x", "op": "exists"}})).unwrap();
        assert!(eval(&rule, &facts(json!({}))));
        assert!(!eval(&rule, &facts(json!({"x": 1}))));
    }

    #[test]
    fn any_short_circuits_on_first_true() {
        let rule = Rule::from_value(&json!({"any": [
            {"fact": "a", "op": "exists"},
            {"fact": "b", "op": "exists"}
        ]}))
        .unwrap();
        assert!(eval(&rule, &facts(json!({"b": 1}))));
    }

    #[test]
    fn unsupported_op_is_rejected_at_parse_time() {
        let err = Rule::from_value(&json!({"fact": "x", "op": "~="})).unwrap_err();
        assert_eq!(err, RuleError::UnsupportedOp("~=".into()));
    }

    #[test]
    fn nested_all_any_not_composes() {
        let rule = Rule::from_value(&json!({
            "all": [
                {"fact": "employed", "op": "=", "value": true},
                {"any": [
                    {"fact": "public_insurance", "op": "=", "value": true},
                    {"fact": "private_insurance", "op": "=", "value": true}
                ]},
                {"not": {"fact": "opted_out", "op": "exists"}}
            ]
        }))
        .unwrap();
        assert!(eval(
            &rule,
            &facts(json!({"employed": true, "public_insurance": true}))
        ));
        assert!(!eval(
            &rule,
            &facts(json!({"employed": false, "public_insurance": true}))
        ));
    }
}
