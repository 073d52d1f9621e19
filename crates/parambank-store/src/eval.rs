//! A small numeric evaluator for dependency equations.

use parambank_core::{
    ArrayValue, Bindings, Dual, Evaluation, Evaluator, Expr, Scalar, StoreError, Value,
};
use parambank_index::linear_index;

/// Substitutes bound names and folds arithmetic.
///
/// Handles `+ - * /`, negation, element indexing, and the unary functions
/// `exp`, `sin`, `cos`, `sqrt`. Arithmetic is elementwise over arrays with
/// scalar broadcasting. Dual operands propagate their partials. Unknown
/// names and unknown functions are left symbolic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticEvaluator;

impl Evaluator for ArithmeticEvaluator {
    fn evaluate(&self, expr: &Expr, bindings: &Bindings) -> Result<Evaluation, StoreError> {
        Ok(match reduce(expr, bindings)? {
            Expr::Literal(value) => Evaluation::Resolved(value),
            symbolic => Evaluation::Symbolic(symbolic),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn eval_error(message: impl Into<String>) -> StoreError {
    StoreError::Evaluation {
        message: message.into(),
    }
}

fn reduce(expr: &Expr, bindings: &Bindings) -> Result<Expr, StoreError> {
    Ok(match expr {
        Expr::Literal(v) => Expr::Literal(v.clone()),
        Expr::Ref(name) => match bindings.get(name) {
            Some(v) => Expr::Literal(v.clone()),
            None => Expr::Ref(name.clone()),
        },
        Expr::Index(inner, subs) => {
            // An element may be bound on its own (`p[2]`) while the array is not.
            if let Expr::Ref(name) = inner.as_ref() {
                if !bindings.contains_key(name) {
                    if let Some(v) = bindings.get(&expr.to_string()) {
                        return Ok(Expr::Literal(v.clone()));
                    }
                }
            }
            match reduce(inner, bindings)? {
                Expr::Literal(value) => Expr::Literal(index_value(&value, subs)?),
                other => Expr::Index(Box::new(other), subs.clone()),
            }
        }
        Expr::Neg(inner) => match reduce(inner, bindings)? {
            Expr::Literal(value) => Expr::Literal(map_value(&value, neg)?),
            other => Expr::Neg(Box::new(other)),
        },
        Expr::Add(a, b) => binary(BinOp::Add, a, b, bindings, Expr::Add)?,
        Expr::Sub(a, b) => binary(BinOp::Sub, a, b, bindings, Expr::Sub)?,
        Expr::Mul(a, b) => binary(BinOp::Mul, a, b, bindings, Expr::Mul)?,
        Expr::Div(a, b) => binary(BinOp::Div, a, b, bindings, Expr::Div)?,
        Expr::Call(function, args) => {
            let args: Vec<Expr> = args
                .iter()
                .map(|a| reduce(a, bindings))
                .collect::<Result<_, _>>()?;
            match (unary_function(function), args.as_slice()) {
                (Some(f), [Expr::Literal(value)]) => Expr::Literal(map_value(value, f)?),
                _ => Expr::Call(function.clone(), args),
            }
        }
    })
}

fn binary(
    op: BinOp,
    a: &Expr,
    b: &Expr,
    bindings: &Bindings,
    rebuild: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Result<Expr, StoreError> {
    let (a, b) = (reduce(a, bindings)?, reduce(b, bindings)?);
    Ok(match (&a, &b) {
        (Expr::Literal(x), Expr::Literal(y)) => Expr::Literal(zip_values(op, x, y)?),
        _ => rebuild(Box::new(a), Box::new(b)),
    })
}

fn index_value(value: &Value, subs: &[usize]) -> Result<Value, StoreError> {
    match value {
        Value::Array(array) => linear_index(&array.shape, subs)
            .and_then(|i| array.data.get(i))
            .cloned()
            .map(Value::Scalar)
            .ok_or_else(|| eval_error(format!("subscript {subs:?} out of range for {value}"))),
        Value::Scalar(_) => Err(eval_error(format!("cannot index scalar {value}"))),
    }
}

fn map_value(
    value: &Value,
    f: impl Fn(&Scalar) -> Result<Scalar, StoreError>,
) -> Result<Value, StoreError> {
    Ok(match value {
        Value::Scalar(s) => Value::Scalar(f(s)?),
        Value::Array(array) => Value::Array(ArrayValue {
            shape: array.shape.clone(),
            data: array.data.iter().map(f).collect::<Result<_, _>>()?,
        }),
    })
}

fn zip_values(op: BinOp, a: &Value, b: &Value) -> Result<Value, StoreError> {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(scalar_binop(op, x, y)?)),
        (Value::Array(_), Value::Scalar(y)) => map_value(a, |x| scalar_binop(op, x, y)),
        (Value::Scalar(x), Value::Array(_)) => map_value(b, |y| scalar_binop(op, x, y)),
        (Value::Array(x), Value::Array(y)) => {
            if x.shape != y.shape {
                return Err(eval_error(format!(
                    "shape mismatch: {:?} vs {:?}",
                    x.shape, y.shape
                )));
            }
            Ok(Value::Array(ArrayValue {
                shape: x.shape.clone(),
                data: x
                    .data
                    .iter()
                    .zip(&y.data)
                    .map(|(p, q)| scalar_binop(op, p, q))
                    .collect::<Result<_, _>>()?,
            }))
        }
    }
}

fn as_dual(s: &Scalar) -> Option<Dual> {
    match s {
        Scalar::Dual(d) => Some(d.clone()),
        other => other.as_f64().map(|v| Dual::constant(v, 0)),
    }
}

fn as_int(s: &Scalar) -> Option<i64> {
    match s {
        Scalar::Bool(b) => Some(i64::from(*b)),
        Scalar::Int(i) => Some(*i),
        _ => None,
    }
}

fn scalar_binop(op: BinOp, a: &Scalar, b: &Scalar) -> Result<Scalar, StoreError> {
    if matches!(a, Scalar::Text(_)) || matches!(b, Scalar::Text(_)) {
        return Err(eval_error(format!("non-numeric operand in {a} {op:?} {b}")));
    }
    if matches!(a, Scalar::Dual(_)) || matches!(b, Scalar::Dual(_)) {
        let (Some(x), Some(y)) = (as_dual(a), as_dual(b)) else {
            return Err(eval_error("dual arithmetic on non-numeric operand"));
        };
        return Ok(Scalar::Dual(match op {
            BinOp::Add => &x + &y,
            BinOp::Sub => &x - &y,
            BinOp::Mul => &x * &y,
            BinOp::Div => &x / &y,
        }));
    }
    if let (Some(x), Some(y)) = (as_int(a), as_int(b)) {
        let exact = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div => None,
        };
        if let Some(i) = exact {
            return Ok(Scalar::Int(i));
        }
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(eval_error("arithmetic on non-numeric operand"));
    };
    Ok(Scalar::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
    }))
}

fn neg(s: &Scalar) -> Result<Scalar, StoreError> {
    Ok(match s {
        Scalar::Bool(b) => Scalar::Int(-i64::from(*b)),
        Scalar::Int(i) => i
            .checked_neg()
            .map_or(Scalar::Float(-(*i as f64)), Scalar::Int),
        Scalar::Float(x) => Scalar::Float(-x),
        Scalar::Dual(d) => Scalar::Dual(-d),
        Scalar::Text(_) => return Err(eval_error(format!("cannot negate {s}"))),
    })
}

type UnaryFn = fn(&Scalar) -> Result<Scalar, StoreError>;

fn unary_function(name: &str) -> Option<UnaryFn> {
    let f: UnaryFn = match name {
        "exp" => |s| real_fn(s, f64::exp, f64::exp),
        "sin" => |s| real_fn(s, f64::sin, f64::cos),
        "cos" => |s| real_fn(s, f64::cos, |x| -x.sin()),
        "sqrt" => |s| real_fn(s, f64::sqrt, |x| 0.5 / x.sqrt()),
        _ => return None,
    };
    Some(f)
}

/// Apply `f` with derivative `df`, carrying partials through duals.
fn real_fn(s: &Scalar, f: fn(f64) -> f64, df: fn(f64) -> f64) -> Result<Scalar, StoreError> {
    match s {
        Scalar::Dual(d) => Ok(Scalar::Dual(d.chain(f(d.value), df(d.value)))),
        other => other
            .as_f64()
            .map(|x| Scalar::Float(f(x)))
            .ok_or_else(|| eval_error(format!("non-numeric argument {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr, bindings: &Bindings) -> Evaluation {
        ArithmeticEvaluator.evaluate(expr, bindings).unwrap()
    }

    #[test]
    fn folds_bound_arithmetic() {
        let mut b = Bindings::new();
        b.insert("k".into(), Value::from(3.0));
        let e = Expr::lit(2.0) * Expr::var("k") - Expr::lit(1i64);
        assert_eq!(eval(&e, &b), Evaluation::Resolved(Value::from(5.0)));
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let e = Expr::lit(2i64) * Expr::lit(3i64);
        assert_eq!(eval(&e, &Bindings::new()), Evaluation::Resolved(Value::from(6i64)));
        let e = Expr::lit(3i64) / Expr::lit(2i64);
        assert_eq!(eval(&e, &Bindings::new()), Evaluation::Resolved(Value::from(1.5)));
    }

    #[test]
    fn unbound_names_stay_symbolic_but_reduce() {
        let e = (Expr::lit(1.0) + Expr::lit(1.0)) * Expr::var("t");
        assert_eq!(
            eval(&e, &Bindings::new()),
            Evaluation::Symbolic(Expr::lit(2.0) * Expr::var("t"))
        );
    }

    #[test]
    fn indexing_and_broadcast() {
        let mut b = Bindings::new();
        b.insert("p".into(), Value::vector([1.0, 2.0, 3.0]));
        let e = Expr::var("p").index(vec![2]);
        assert_eq!(eval(&e, &b), Evaluation::Resolved(Value::from(2.0)));
        let e = Expr::var("p") * Expr::lit(2.0);
        assert_eq!(
            eval(&e, &b),
            Evaluation::Resolved(Value::vector([2.0, 4.0, 6.0]))
        );
    }

    #[test]
    fn element_bound_without_array() {
        let mut b = Bindings::new();
        b.insert("p[2]".into(), Value::from(7.0));
        let e = Expr::var("p").index(vec![2]);
        assert_eq!(eval(&e, &b), Evaluation::Resolved(Value::from(7.0)));
    }

    #[test]
    fn functions_carry_partials() {
        let mut b = Bindings::new();
        b.insert("x".into(), Value::from(Scalar::Dual(Dual::seeded(0.0, vec![1.0]))));
        let e = Expr::call("sin", vec![Expr::var("x")]);
        match eval(&e, &b) {
            Evaluation::Resolved(Value::Scalar(Scalar::Dual(d))) => {
                assert_eq!(d.value, 0.0);
                assert_eq!(d.partials, vec![1.0]);
            }
            other => panic!("expected dual, got {other:?}"),
        }
    }

    #[test]
    fn unknown_function_is_symbolic() {
        let e = Expr::call("gamma", vec![Expr::lit(1.0)]);
        assert!(matches!(eval(&e, &Bindings::new()), Evaluation::Symbolic(_)));
    }

    #[test]
    fn text_arithmetic_is_an_error() {
        let e = Expr::lit("a") + Expr::lit(1.0);
        assert!(matches!(
            ArithmeticEvaluator.evaluate(&e, &Bindings::new()),
            Err(StoreError::Evaluation { .. })
        ));
    }
}
