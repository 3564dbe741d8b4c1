//! Expression evaluation
//!
//! Expressions evaluate against one document at a time. Missing paths
//! yield null, null propagates through arithmetic, and filters treat
//! null as false, so a WHERE clause never fails just because a field
//! is absent.

use crate::document::{Collation, Document, Value};
use crate::errors::{Result, VellumError};
use crate::query::ast::{BinaryOp, Expr, UnaryOp};

/// Everything an expression can see: the current document, the query
/// parameters and the store collation.
pub struct EvalContext<'a> {
    pub root: &'a Document,
    pub params: &'a Document,
    pub collation: Collation,
}

pub fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::DocumentLiteral(fields) => {
            let mut doc = Document::new();
            for (name, field_expr) in fields {
                doc.insert(name.clone(), eval(field_expr, ctx)?);
            }
            Ok(Value::Document(doc))
        }
        Expr::ArrayLiteral(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Path(path) => {
            if path.is_root() {
                return Ok(Value::Document(ctx.root.clone()));
            }
            Ok(ctx
                .root
                .get_steps(&path.steps)
                .cloned()
                .unwrap_or(Value::Null))
        }
        Expr::Parameter(name) => ctx
            .params
            .get(name)
            .cloned()
            .ok_or_else(|| VellumError::Parameter(name.clone())),
        Expr::Unary { op: UnaryOp::Not, expr } => {
            let inner = eval(expr, ctx)?;
            Ok(Value::Bool(!truthy(&inner)?))
        }
        Expr::Unary { op: UnaryOp::Neg, expr } => match eval(expr, ctx)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| VellumError::eval("integer overflow")),
            Value::Double(n) => Ok(Value::Double(-n)),
            Value::Null => Ok(Value::Null),
            other => Err(VellumError::eval(format!(
                "cannot negate a {} value",
                other.type_name()
            ))),
        },
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
    }
}

/// Evaluate a filter expression to a yes or no.
///
/// Null counts as false; any other non-boolean result is an error.
pub fn eval_predicate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<bool> {
    let value = eval(expr, ctx)?;
    truthy(&value)
}

fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(VellumError::eval(format!(
            "filter must evaluate to a boolean, got {}",
            other.type_name()
        ))),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    // AND and OR short-circuit
    match op {
        BinaryOp::And => {
            if !eval_predicate(left, ctx)? {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval_predicate(right, ctx)?));
        }
        BinaryOp::Or => {
            if eval_predicate(left, ctx)? {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval_predicate(right, ctx)?));
        }
        _ => {}
    }

    let a = eval(left, ctx)?;
    let b = eval(right, ctx)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(a.eq_with(&b, ctx.collation))),
        BinaryOp::NotEq => Ok(Value::Bool(!a.eq_with(&b, ctx.collation))),
        BinaryOp::Lt => Ok(Value::Bool(a.cmp_with(&b, ctx.collation).is_lt())),
        BinaryOp::LtEq => Ok(Value::Bool(a.cmp_with(&b, ctx.collation).is_le())),
        BinaryOp::Gt => Ok(Value::Bool(a.cmp_with(&b, ctx.collation).is_gt())),
        BinaryOp::GtEq => Ok(Value::Bool(a.cmp_with(&b, ctx.collation).is_ge())),
        BinaryOp::Like => eval_like(&a, &b, ctx.collation),
        BinaryOp::In => eval_in(&a, &b, ctx.collation),
        BinaryOp::Add => eval_add(&a, &b),
        BinaryOp::Sub => eval_numeric(op, &a, &b),
        BinaryOp::Mul => eval_numeric(op, &a, &b),
        BinaryOp::Div => eval_numeric(op, &a, &b),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn eval_like(a: &Value, b: &Value, collation: Collation) -> Result<Value> {
    let pattern = match b {
        Value::String(p) => p,
        other => {
            return Err(VellumError::eval(format!(
                "LIKE pattern must be a string, got {}",
                other.type_name()
            )))
        }
    };
    let text = match a {
        Value::String(s) => s,
        // Non-string subjects never match, they do not error
        _ => return Ok(Value::Bool(false)),
    };
    let text: Vec<char> = collation.fold(text).chars().collect();
    let pattern: Vec<char> = collation.fold(pattern).chars().collect();
    Ok(Value::Bool(like_match(&text, &pattern)))
}

/// `%` matches any run of characters, `_` exactly one.
fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like_match(&text[i..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_match(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_match(&text[1..], rest),
    }
}

fn eval_in(a: &Value, b: &Value, collation: Collation) -> Result<Value> {
    match b {
        Value::Array(items) => Ok(Value::Bool(
            items.iter().any(|item| a.eq_with(item, collation)),
        )),
        Value::Null => Ok(Value::Bool(false)),
        other => Err(VellumError::eval(format!(
            "IN requires an array, got {}",
            other.type_name()
        ))),
    }
}

fn eval_add(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(Value::String(format!("{x}{y}")));
    }
    eval_numeric(BinaryOp::Add, a, b)
}

fn eval_numeric(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let result = match op {
            BinaryOp::Add => x.checked_add(*y),
            BinaryOp::Sub => x.checked_sub(*y),
            BinaryOp::Mul => x.checked_mul(*y),
            BinaryOp::Div => {
                if *y == 0 {
                    return Err(VellumError::eval("division by zero"));
                }
                // Division always yields a double
                return Ok(Value::Double(*x as f64 / *y as f64));
            }
            _ => None,
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| VellumError::eval("integer overflow"));
    }
    let (x, y) = match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(VellumError::eval(format!(
                "cannot apply {} to {} and {}",
                op.as_str(),
                a.type_name(),
                b.type_name()
            )))
        }
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(VellumError::eval("division by zero"));
            }
            x / y
        }
        _ => return Err(VellumError::eval("not an arithmetic operator")),
    };
    Ok(Value::Double(result))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Double(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use crate::query::ast::Statement;

    fn filter_of(sql: &str) -> Expr {
        match parse(sql).unwrap() {
            Statement::Select(s) => s.filter.unwrap(),
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn check(sql_filter: &str, doc: &Document) -> bool {
        let expr = filter_of(&format!("SELECT $ FROM t WHERE {sql_filter}"));
        let params = Document::new();
        let ctx = EvalContext { root: doc, params: &params, collation: Collation::Binary };
        eval_predicate(&expr, &ctx).unwrap()
    }

    fn sample() -> Document {
        let mut address = Document::new();
        address.insert("city", "Lisbon");
        let mut doc = Document::new();
        doc.insert("_id", 1i64);
        doc.insert("name", "Ada");
        doc.insert("age", 36i64);
        doc.insert("score", 2.5f64);
        doc.insert("address", Value::Document(address));
        doc.insert("tags", Value::Array(vec![Value::String("x".into()), Value::Int(2)]));
        doc
    }

    #[test]
    fn test_comparisons() {
        let doc = sample();
        assert!(check("age = 36", &doc));
        assert!(check("age >= 36 AND age <= 36", &doc));
        assert!(check("age != 37", &doc));
        assert!(check("score < 3", &doc));
        // Int and Double compare numerically
        assert!(check("age = 36.0", &doc));
        assert!(check("address.city = 'Lisbon'", &doc));
        assert!(check("tags[1] = 2", &doc));
    }

    #[test]
    fn test_missing_fields_are_null_and_filtered_out() {
        let doc = sample();
        assert!(!check("nope = 1", &doc));
        assert!(check("nope = null", &doc));
        // Arithmetic on null stays null, which filters as false
        assert!(!check("nope + 1 = 1", &doc));
    }

    #[test]
    fn test_boolean_connectives_short_circuit() {
        let doc = sample();
        assert!(check("age = 36 OR undefined_thing = 1 / 0", &doc));
        assert!(!check("age = 99 AND 1 / 0 = 1", &doc));
        assert!(check("NOT (age = 99)", &doc));
        // NOT of a missing field treats null as false
        assert!(check("NOT hidden", &doc));
    }

    #[test]
    fn test_arithmetic() {
        let doc = sample();
        assert!(check("age + 4 = 40", &doc));
        assert!(check("age - 6 = 30", &doc));
        assert!(check("age * 2 = 72", &doc));
        assert!(check("age / 8 = 4.5", &doc));
        assert!(check("score * 2 = 5", &doc));
        assert!(check("name + '!' = 'Ada!'", &doc));
        assert!(check("-age = -36", &doc));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let doc = sample();
        let expr = filter_of("SELECT $ FROM t WHERE age / 0 = 1");
        let params = Document::new();
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::Binary };
        assert!(matches!(eval_predicate(&expr, &ctx), Err(VellumError::Eval(_))));
    }

    #[test]
    fn test_like_patterns() {
        let doc = sample();
        assert!(check("name LIKE 'A%'", &doc));
        assert!(check("name LIKE '%da'", &doc));
        assert!(check("name LIKE '_da'", &doc));
        assert!(check("name LIKE 'Ada'", &doc));
        assert!(!check("name LIKE 'a%'", &doc));
        assert!(!check("name LIKE '__'", &doc));
        assert!(check("name LIKE '%'", &doc));
        // Non-string subject is simply no match
        assert!(!check("age LIKE '3%'", &doc));
    }

    #[test]
    fn test_like_honours_collation() {
        let doc = sample();
        let expr = filter_of("SELECT $ FROM t WHERE name LIKE 'a%'");
        let params = Document::new();
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::NoCase };
        assert!(eval_predicate(&expr, &ctx).unwrap());
    }

    #[test]
    fn test_in_membership() {
        let doc = sample();
        assert!(check("age IN [35, 36, 37]", &doc));
        assert!(!check("age IN [1, 2]", &doc));
        assert!(check("name IN ['Ada', 'Grace']", &doc));
        // A path on the right works when it resolves to an array
        assert!(!check("age IN tags", &doc));
        assert!(check("2 IN tags", &doc));

        let expr = filter_of("SELECT $ FROM t WHERE age IN 5");
        let params = Document::new();
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::Binary };
        assert!(matches!(eval_predicate(&expr, &ctx), Err(VellumError::Eval(_))));
    }

    #[test]
    fn test_parameters() {
        let doc = sample();
        let expr = filter_of("SELECT $ FROM t WHERE name = @who");
        let mut params = Document::new();
        params.insert("who", "Ada");
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::Binary };
        assert!(eval_predicate(&expr, &ctx).unwrap());

        let empty = Document::new();
        let ctx = EvalContext { root: &doc, params: &empty, collation: Collation::Binary };
        assert!(matches!(
            eval_predicate(&expr, &ctx),
            Err(VellumError::Parameter(name)) if name == "who"
        ));
    }

    #[test]
    fn test_document_literal_with_nested_parameter() {
        let doc = Document::new();
        let mut params = Document::new();
        params.insert("city", "Porto");
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::Binary };
        let expr = Expr::DocumentLiteral(vec![
            ("name".into(), Expr::Literal(Value::String("Ada".into()))),
            ("city".into(), Expr::Parameter("city".into())),
        ]);
        match eval(&expr, &ctx).unwrap() {
            Value::Document(d) => {
                assert_eq!(d.get("city"), Some(&Value::String("Porto".into())))
            }
            other => panic!("unexpected: {}", other.type_name()),
        }
    }

    #[test]
    fn test_non_boolean_filter_is_an_error() {
        let doc = sample();
        let expr = filter_of("SELECT $ FROM t WHERE age + 1");
        let params = Document::new();
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::Binary };
        assert!(matches!(eval_predicate(&expr, &ctx), Err(VellumError::Eval(_))));
    }

    #[test]
    fn test_root_path_yields_whole_document() {
        let doc = sample();
        let params = Document::new();
        let ctx = EvalContext { root: &doc, params: &params, collation: Collation::Binary };
        let expr = Expr::Path(crate::query::ast::Path::root());
        assert_eq!(eval(&expr, &ctx).unwrap(), Value::Document(doc.clone()));
    }
}
