//! The parambank value universe.
//!
//! Element types form a small lattice used for buffer narrowing:
//! `Bool < Int < Float < Dual` is the numeric chain, `Text` is the only
//! nonnumeric leaf, and `Any` sits above everything. Scalars and shaped
//! values are the runtime counterparts that flow into and out of buffers.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Element type of a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElemType {
    Bool,
    Int,
    Float,
    /// Float carrying directional derivatives.
    Dual,
    Text,
    /// Heterogeneous payloads. Never narrowed further.
    Any,
}

impl ElemType {
    /// Position in the numeric chain, `None` for nonnumeric types.
    fn numeric_rank(self) -> Option<u8> {
        match self {
            ElemType::Bool => Some(0),
            ElemType::Int => Some(1),
            ElemType::Float => Some(2),
            ElemType::Dual => Some(3),
            ElemType::Text | ElemType::Any => None,
        }
    }

    /// Whether values of this type take part in numeric promotion.
    pub fn is_numeric(self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Float-like types: the only ones eligible for the tunable class.
    pub fn is_real(self) -> bool {
        matches!(self, ElemType::Float | ElemType::Dual)
    }

    /// Least upper bound of two element types.
    pub fn join(self, other: ElemType) -> ElemType {
        if self == other {
            return self;
        }
        match (self.numeric_rank(), other.numeric_rank()) {
            (Some(a), Some(b)) => {
                if a >= b {
                    self
                } else {
                    other
                }
            }
            _ => ElemType::Any,
        }
    }

    /// Whether a slot declared with this type accepts a scalar of type `found`.
    ///
    /// `Dual` is accepted wherever `Float` is declared.
    pub fn accepts(self, found: ElemType) -> bool {
        match self {
            ElemType::Any => true,
            ElemType::Text => found == ElemType::Text,
            ElemType::Float | ElemType::Dual => found.is_numeric(),
            ElemType::Int => matches!(found, ElemType::Bool | ElemType::Int),
            ElemType::Bool => found == ElemType::Bool,
        }
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElemType::Bool => "bool",
            ElemType::Int => "int",
            ElemType::Float => "float",
            ElemType::Dual => "dual",
            ElemType::Text => "text",
            ElemType::Any => "any",
        };
        f.write_str(name)
    }
}

/// A forward-mode dual number: a value plus its partial derivatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dual {
    pub value: f64,
    pub partials: Vec<f64>,
}

impl Dual {
    /// A dual with `width` zero partials.
    pub fn constant(value: f64, width: usize) -> Self {
        Self {
            value,
            partials: vec![0.0; width],
        }
    }

    pub fn seeded(value: f64, partials: Vec<f64>) -> Self {
        Self { value, partials }
    }

    pub fn width(&self) -> usize {
        self.partials.len()
    }

    /// Pad the partials with zeros up to `width`.
    pub fn padded(mut self, width: usize) -> Self {
        if self.partials.len() < width {
            self.partials.resize(width, 0.0);
        }
        self
    }

    /// Apply a scalar function with known derivative (chain rule).
    pub fn chain(&self, value: f64, derivative: f64) -> Dual {
        Dual {
            value,
            partials: self.partials.iter().map(|p| p * derivative).collect(),
        }
    }

    fn zip_with(&self, other: &Dual, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        let width = self.width().max(other.width());
        (0..width)
            .map(|i| {
                let a = self.partials.get(i).copied().unwrap_or(0.0);
                let b = other.partials.get(i).copied().unwrap_or(0.0);
                f(a, b)
            })
            .collect()
    }
}

impl Add for &Dual {
    type Output = Dual;

    fn add(self, rhs: &Dual) -> Dual {
        Dual {
            value: self.value + rhs.value,
            partials: self.zip_with(rhs, |a, b| a + b),
        }
    }
}

impl Sub for &Dual {
    type Output = Dual;

    fn sub(self, rhs: &Dual) -> Dual {
        Dual {
            value: self.value - rhs.value,
            partials: self.zip_with(rhs, |a, b| a - b),
        }
    }
}

impl Mul for &Dual {
    type Output = Dual;

    fn mul(self, rhs: &Dual) -> Dual {
        let (u, v) = (self.value, rhs.value);
        Dual {
            value: u * v,
            partials: self.zip_with(rhs, |du, dv| du * v + u * dv),
        }
    }
}

impl Div for &Dual {
    type Output = Dual;

    fn div(self, rhs: &Dual) -> Dual {
        let (u, v) = (self.value, rhs.value);
        Dual {
            value: u / v,
            partials: self.zip_with(rhs, |du, dv| (du * v - u * dv) / (v * v)),
        }
    }
}

impl Neg for &Dual {
    type Output = Dual;

    fn neg(self) -> Dual {
        Dual {
            value: -self.value,
            partials: self.partials.iter().map(|p| -p).collect(),
        }
    }
}

/// A single buffer element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Dual(Dual),
    Text(String),
}

/// 2^63 as an `f64`: the first float above every `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

impl Scalar {
    pub fn elem_type(&self) -> ElemType {
        match self {
            Scalar::Bool(_) => ElemType::Bool,
            Scalar::Int(_) => ElemType::Int,
            Scalar::Float(_) => ElemType::Float,
            Scalar::Dual(_) => ElemType::Dual,
            Scalar::Text(_) => ElemType::Text,
        }
    }

    /// The real part of a numeric scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(x) => Some(*x),
            Scalar::Dual(d) => Some(d.value),
            Scalar::Text(_) => None,
        }
    }

    /// The real part when it is exactly representable as an `f64`. Integers
    /// beyond 2^53 that would round yield `None`.
    fn exact_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => {
                let x = *i as f64;
                (x < I64_BOUND && x as i64 == *i).then_some(x)
            }
            other => other.as_f64(),
        }
    }

    /// Convert to `target` without losing information.
    ///
    /// Widening along the numeric chain always succeeds. Narrowing succeeds
    /// only when the value is exactly representable (`3.0` -> `3`, `1` ->
    /// `true`). A dual never converts back to a plain float, since that
    /// would drop its partials.
    pub fn cast(&self, target: ElemType) -> Option<Scalar> {
        match (target, self) {
            (ElemType::Any, s) => Some(s.clone()),
            (ElemType::Text, Scalar::Text(s)) => Some(Scalar::Text(s.clone())),
            (ElemType::Text, _) => None,

            (ElemType::Bool, Scalar::Bool(b)) => Some(Scalar::Bool(*b)),
            (ElemType::Bool, Scalar::Int(i)) => match i {
                0 => Some(Scalar::Bool(false)),
                1 => Some(Scalar::Bool(true)),
                _ => None,
            },
            (ElemType::Bool, Scalar::Float(x)) => {
                if *x == 0.0 {
                    Some(Scalar::Bool(false))
                } else if *x == 1.0 {
                    Some(Scalar::Bool(true))
                } else {
                    None
                }
            }
            (ElemType::Bool, _) => None,

            (ElemType::Int, Scalar::Bool(b)) => Some(Scalar::Int(i64::from(*b))),
            (ElemType::Int, Scalar::Int(i)) => Some(Scalar::Int(*i)),
            (ElemType::Int, Scalar::Float(x)) => {
                if x.fract() == 0.0 && *x >= -I64_BOUND && *x < I64_BOUND {
                    Some(Scalar::Int(*x as i64))
                } else {
                    None
                }
            }
            (ElemType::Int, _) => None,

            (ElemType::Float, Scalar::Dual(_)) | (ElemType::Float, Scalar::Text(_)) => None,
            (ElemType::Float, s) => s.exact_f64().map(Scalar::Float),

            (ElemType::Dual, Scalar::Dual(d)) => Some(Scalar::Dual(d.clone())),
            (ElemType::Dual, Scalar::Text(_)) => None,
            (ElemType::Dual, s) => s.exact_f64().map(|v| Scalar::Dual(Dual::constant(v, 0))),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x:?}"),
            Scalar::Dual(d) => write!(f, "Dual({:?}; {:?})", d.value, d.partials),
            Scalar::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<Dual> for Scalar {
    fn from(d: Dual) -> Self {
        Scalar::Dual(d)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

/// Declared shape of a universe value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Scalar,
    /// Fixed dimensions, row-major.
    Array(Vec<usize>),
    /// Shape not known at planning time; such values cannot be stored.
    Unknown,
}

impl Shape {
    pub fn vector(len: usize) -> Self {
        Shape::Array(vec![len])
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Shape::Scalar)
    }

    /// Number of buffer slots the shape occupies.
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Shape::Scalar => Some(1),
            Shape::Array(dims) => Some(dims.iter().product()),
            Shape::Unknown => None,
        }
    }

    pub fn dims(&self) -> &[usize] {
        match self {
            Shape::Array(dims) => dims,
            Shape::Scalar | Shape::Unknown => &[],
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Array(dims) => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "[{}]", dims.join(", "))
            }
            Shape::Unknown => write!(f, "unknown"),
        }
    }
}

/// Row-major array payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub shape: Vec<usize>,
    pub data: Vec<Scalar>,
}

/// A concrete value bound to a universe member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    Array(ArrayValue),
}

impl Value {
    /// A one-dimensional array.
    pub fn vector<S: Into<Scalar>>(data: impl IntoIterator<Item = S>) -> Self {
        let data: Vec<Scalar> = data.into_iter().map(Into::into).collect();
        Value::Array(ArrayValue {
            shape: vec![data.len()],
            data,
        })
    }

    /// An array with explicit dimensions. Returns `None` when the element
    /// count does not match the dimensions.
    pub fn array(shape: Vec<usize>, data: Vec<Scalar>) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Value::Array(ArrayValue { shape, data }))
    }

    pub fn shape(&self) -> Shape {
        match self {
            Value::Scalar(_) => Shape::Scalar,
            Value::Array(a) => Shape::Array(a.shape.clone()),
        }
    }

    /// Elements in row-major order (a scalar is a single element).
    pub fn elements(&self) -> &[Scalar] {
        match self {
            Value::Scalar(s) => std::slice::from_ref(s),
            Value::Array(a) => &a.data,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Array(_) => None,
        }
    }

    /// Join of all element types; `None` for an empty array.
    pub fn elem_type(&self) -> Option<ElemType> {
        self.elements()
            .iter()
            .map(Scalar::elem_type)
            .reduce(ElemType::join)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{s}"),
            Value::Array(a) => {
                let items: Vec<String> = a.data.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Scalar(Scalar::Int(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(Scalar::Float(x))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::Text(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_follows_numeric_chain() {
        assert_eq!(ElemType::Bool.join(ElemType::Int), ElemType::Int);
        assert_eq!(ElemType::Int.join(ElemType::Float), ElemType::Float);
        assert_eq!(ElemType::Dual.join(ElemType::Bool), ElemType::Dual);
        assert_eq!(ElemType::Float.join(ElemType::Float), ElemType::Float);
    }

    #[test]
    fn join_of_text_and_number_is_any() {
        assert_eq!(ElemType::Text.join(ElemType::Int), ElemType::Any);
        assert_eq!(ElemType::Any.join(ElemType::Bool), ElemType::Any);
        assert_eq!(ElemType::Text.join(ElemType::Text), ElemType::Text);
    }

    #[test]
    fn declared_float_accepts_dual_and_int() {
        assert!(ElemType::Float.accepts(ElemType::Dual));
        assert!(ElemType::Float.accepts(ElemType::Int));
        assert!(!ElemType::Int.accepts(ElemType::Float));
        assert!(!ElemType::Float.accepts(ElemType::Text));
        assert!(ElemType::Any.accepts(ElemType::Text));
    }

    #[test]
    fn lossless_casts() {
        assert_eq!(Scalar::Float(3.0).cast(ElemType::Int), Some(Scalar::Int(3)));
        assert_eq!(Scalar::Float(3.5).cast(ElemType::Int), None);
        assert_eq!(Scalar::Int(1).cast(ElemType::Bool), Some(Scalar::Bool(true)));
        assert_eq!(Scalar::Int(2).cast(ElemType::Bool), None);
        assert_eq!(Scalar::Int(2).cast(ElemType::Float), Some(Scalar::Float(2.0)));
        assert_eq!(
            Scalar::Dual(Dual::constant(1.0, 1)).cast(ElemType::Float),
            None
        );
        assert_eq!(Scalar::Text("a".into()).cast(ElemType::Int), None);
    }

    #[test]
    fn integer_float_casts_are_exact_at_the_precision_edge() {
        let big = (1i64 << 53) + 1;
        assert_eq!(Scalar::Int(big).cast(ElemType::Float), None);
        assert_eq!(Scalar::Int(big).cast(ElemType::Dual), None);
        assert_eq!(
            Scalar::Int(1 << 53).cast(ElemType::Float),
            Some(Scalar::Float(9_007_199_254_740_992.0))
        );
        assert_eq!(Scalar::Int(i64::MAX).cast(ElemType::Float), None);
        // 2^63 is one past i64::MAX.
        assert_eq!(Scalar::Float(9_223_372_036_854_775_808.0).cast(ElemType::Int), None);
        assert_eq!(
            Scalar::Float(-9_223_372_036_854_775_808.0).cast(ElemType::Int),
            Some(Scalar::Int(i64::MIN))
        );
    }

    #[test]
    fn dual_product_rule() {
        let x = Dual::seeded(3.0, vec![1.0, 0.0]);
        let y = Dual::seeded(2.0, vec![0.0, 1.0]);
        let z = &x * &y;
        assert_eq!(z.value, 6.0);
        assert_eq!(z.partials, vec![2.0, 3.0]);
    }

    #[test]
    fn dual_quotient_pads_narrow_operand() {
        let x = Dual::seeded(4.0, vec![1.0]);
        let c = Dual::constant(2.0, 0);
        let q = &x / &c;
        assert_eq!(q.value, 2.0);
        assert_eq!(q.partials, vec![0.5]);
    }

    #[test]
    fn value_shape_and_type() {
        let v = Value::vector([1.0, 2.0, 3.0]);
        assert_eq!(v.shape(), Shape::vector(3));
        assert_eq!(v.elem_type(), Some(ElemType::Float));
        assert_eq!(Value::from(5i64).shape(), Shape::Scalar);
        assert!(Value::array(vec![2, 2], vec![Scalar::Int(1)]).is_none());
    }

    #[test]
    fn untagged_values_from_json() {
        let v: Value = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, Value::from(2.5));
        let v: Value = serde_json::from_str("5").unwrap();
        assert_eq!(v, Value::from(5i64));
        let v: Value = serde_json::from_str(r#"{"shape":[2],"data":[1.0,2.0]}"#).unwrap();
        assert_eq!(v, Value::vector([1.0, 2.0]));
    }
}
