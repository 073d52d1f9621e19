//! Expressions over universe values and the evaluator seam.
//!
//! The storage layer does not interpret expressions itself. It only drives
//! substitution: an [`Evaluator`] is handed an expression plus the values
//! known so far and either produces a concrete value or a (possibly
//! partially reduced) expression that is still symbolic.

use std::collections::HashMap;
use std::fmt;
use std::ops;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::Value;

/// An expression referencing other values by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Value),
    /// Reference to a value by any of its names.
    Ref(String),
    /// Element of an array expression, 1-based subscripts.
    Index(Box<Expr>, Vec<usize>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// Named function application.
    Call(String, Vec<Expr>),
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn var(name: &str) -> Self {
        Expr::Ref(name.to_string())
    }

    pub fn index(self, subscripts: Vec<usize>) -> Self {
        Expr::Index(Box::new(self), subscripts)
    }

    pub fn call(function: &str, args: Vec<Expr>) -> Self {
        Expr::Call(function.to_string(), args)
    }

    /// Every name referenced, in first-seen order, without duplicates.
    pub fn refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Index(inner, _) | Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.collect_refs(out);
                b.collect_refs(out);
            }
            Expr::Call(_, args) => {
                for arg in args {
                    arg.collect_refs(out);
                }
            }
        }
    }

    /// Rebuild the expression with every `Ref` replaced by `f(name)`.
    pub fn map_refs(&self, f: &impl Fn(&str) -> Expr) -> Expr {
        let bin = |a: &Expr, b: &Expr| (Box::new(a.map_refs(f)), Box::new(b.map_refs(f)));
        match self {
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Ref(name) => f(name),
            Expr::Index(inner, subs) => Expr::Index(Box::new(inner.map_refs(f)), subs.clone()),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.map_refs(f))),
            Expr::Add(a, b) => {
                let (a, b) = bin(a, b);
                Expr::Add(a, b)
            }
            Expr::Sub(a, b) => {
                let (a, b) = bin(a, b);
                Expr::Sub(a, b)
            }
            Expr::Mul(a, b) => {
                let (a, b) = bin(a, b);
                Expr::Mul(a, b)
            }
            Expr::Div(a, b) => {
                let (a, b) = bin(a, b);
                Expr::Div(a, b)
            }
            Expr::Call(name, args) => {
                Expr::Call(name.clone(), args.iter().map(|a| a.map_refs(f)).collect())
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Ref(name) => write!(f, "{name}"),
            Expr::Index(inner, subs) => {
                let subs: Vec<String> = subs.iter().map(|s| s.to_string()).collect();
                write!(f, "{inner}[{}]", subs.join(","))
            }
            Expr::Neg(inner) => write!(f, "-({inner})"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Sub(a, b) => write!(f, "({a} - {b})"),
            Expr::Mul(a, b) => write!(f, "({a} * {b})"),
            Expr::Div(a, b) => write!(f, "({a} / {b})"),
            Expr::Call(name, args) => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{name}({})", args.join(", "))
            }
        }
    }
}

macro_rules! expr_binop {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

expr_binop!(Add, add, Add);
expr_binop!(Sub, sub, Sub);
expr_binop!(Mul, mul, Mul);
expr_binop!(Div, div, Div);

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// What a name is bound to before construction: a value or an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Value(Value),
    Expr(Expr),
}

impl Binding {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            Binding::Expr(_) => None,
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

impl From<Expr> for Binding {
    fn from(e: Expr) -> Self {
        Binding::Expr(e)
    }
}

impl From<f64> for Binding {
    fn from(x: f64) -> Self {
        Binding::Value(Value::from(x))
    }
}

impl From<i64> for Binding {
    fn from(i: i64) -> Self {
        Binding::Value(Value::from(i))
    }
}

/// Concrete values visible to an evaluator, keyed by canonical name.
pub type Bindings = HashMap<String, Value>;

/// Outcome of one evaluation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Resolved(Value),
    /// Still depends on unknown names; carries the reduced expression.
    Symbolic(Expr),
}

/// Substitutes known values into an expression.
///
/// Object-safe so evaluators can be passed as `&dyn Evaluator`.
pub trait Evaluator: fmt::Debug + Send + Sync {
    fn evaluate(&self, expr: &Expr, bindings: &Bindings) -> Result<Evaluation, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_are_deduplicated_in_order() {
        let e = Expr::var("a") * Expr::var("b") + Expr::var("a");
        assert_eq!(e.refs(), vec!["a", "b"]);
    }

    #[test]
    fn map_refs_rewrites_names() {
        let e = Expr::lit(2.0) * Expr::var("gain");
        let mapped = e.map_refs(&|n: &str| if n == "gain" { Expr::var("k") } else { Expr::var(n) });
        assert_eq!(mapped, Expr::lit(2.0) * Expr::var("k"));
    }

    #[test]
    fn display_is_infix() {
        let e = Expr::var("p").index(vec![2]) + Expr::call("sin", vec![Expr::var("t")]);
        assert_eq!(e.to_string(), "(p[2] + sin(t))");
    }

    #[test]
    fn binding_deserializes_value_or_expr() {
        let b: Binding = serde_json::from_str("3.5").unwrap();
        assert_eq!(b, Binding::from(3.5));
        let b: Binding = serde_json::from_str(r#"{"mul":[{"literal":2.0},{"ref":"k"}]}"#).unwrap();
        assert_eq!(b, Binding::Expr(Expr::lit(2.0) * Expr::var("k")));
    }
}
