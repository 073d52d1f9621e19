//! Typed homogeneous buffers and their templates.
//!
//! A `Buffer` stores one element type in a native `Vec` so numeric code never
//! pays for per-element dispatch. Buffers are produced by *narrowing*: the
//! tightest element type covering every scalar actually written is chosen,
//! and later writes widen the buffer in place when they do not fit.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::{Dual, ElemType, Scalar};

/// Element type and length of one buffer, as planned by the layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferTemplate {
    pub elem_type: ElemType,
    pub length: usize,
}

impl BufferTemplate {
    pub fn new(elem_type: ElemType, length: usize) -> Self {
        Self { elem_type, length }
    }
}

/// A contiguous homogeneous buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    /// All duals in one buffer share the same partials width.
    Dual(Vec<Dual>),
    Text(Vec<String>),
    Any(Vec<Scalar>),
}

/// Borrowed, non-copying view into part of a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferSlice<'a> {
    Bool(&'a [bool]),
    Int(&'a [i64]),
    Float(&'a [f64]),
    Dual(&'a [Dual]),
    Text(&'a [String]),
    Any(&'a [Scalar]),
}

/// Join of the element types of `values`; `None` when empty.
pub fn join_type(values: &[Scalar]) -> Option<ElemType> {
    values.iter().map(Scalar::elem_type).reduce(ElemType::join)
}

impl Buffer {
    pub fn empty(elem_type: ElemType) -> Self {
        match elem_type {
            ElemType::Bool => Buffer::Bool(Vec::new()),
            ElemType::Int => Buffer::Int(Vec::new()),
            ElemType::Float => Buffer::Float(Vec::new()),
            ElemType::Dual => Buffer::Dual(Vec::new()),
            ElemType::Text => Buffer::Text(Vec::new()),
            ElemType::Any => Buffer::Any(Vec::new()),
        }
    }

    /// Build a buffer of exactly `elem_type`, converting every scalar
    /// losslessly. Returns `None` if any scalar cannot be represented.
    pub fn from_scalars(elem_type: ElemType, values: &[Scalar]) -> Option<Buffer> {
        let converted: Vec<Scalar> = values
            .iter()
            .map(|s| s.cast(elem_type))
            .collect::<Option<_>>()?;

        let buffer = match elem_type {
            ElemType::Bool => Buffer::Bool(
                converted
                    .into_iter()
                    .filter_map(|s| match s {
                        Scalar::Bool(b) => Some(b),
                        _ => None,
                    })
                    .collect(),
            ),
            ElemType::Int => Buffer::Int(
                converted
                    .into_iter()
                    .filter_map(|s| match s {
                        Scalar::Int(i) => Some(i),
                        _ => None,
                    })
                    .collect(),
            ),
            ElemType::Float => Buffer::Float(
                converted
                    .into_iter()
                    .filter_map(|s| match s {
                        Scalar::Float(x) => Some(x),
                        _ => None,
                    })
                    .collect(),
            ),
            ElemType::Dual => {
                let duals: Vec<Dual> = converted
                    .into_iter()
                    .filter_map(|s| match s {
                        Scalar::Dual(d) => Some(d),
                        _ => None,
                    })
                    .collect();
                let width = duals.iter().map(Dual::width).max().unwrap_or(0);
                Buffer::Dual(duals.into_iter().map(|d| d.padded(width)).collect())
            }
            ElemType::Text => Buffer::Text(
                converted
                    .into_iter()
                    .filter_map(|s| match s {
                        Scalar::Text(t) => Some(t),
                        _ => None,
                    })
                    .collect(),
            ),
            ElemType::Any => Buffer::Any(converted),
        };
        Some(buffer)
    }

    /// Narrow `values` to the tightest type covering all of them, never
    /// going below `floor`. An empty input yields an empty buffer of
    /// `fallback`.
    pub fn narrowed(values: &[Scalar], fallback: ElemType, floor: Option<ElemType>) -> Buffer {
        let Some(joined) = join_type(values) else {
            return Buffer::empty(fallback);
        };
        let target = floor.map_or(joined, |f| joined.join(f));
        // Integers beyond 2^53 have no exact float form; keep them as-is.
        Buffer::from_scalars(target, values).unwrap_or_else(|| Buffer::Any(values.to_vec()))
    }

    pub fn elem_type(&self) -> ElemType {
        match self {
            Buffer::Bool(_) => ElemType::Bool,
            Buffer::Int(_) => ElemType::Int,
            Buffer::Float(_) => ElemType::Float,
            Buffer::Dual(_) => ElemType::Dual,
            Buffer::Text(_) => ElemType::Text,
            Buffer::Any(_) => ElemType::Any,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::Bool(v) => v.len(),
            Buffer::Int(v) => v.len(),
            Buffer::Float(v) => v.len(),
            Buffer::Dual(v) => v.len(),
            Buffer::Text(v) => v.len(),
            Buffer::Any(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn template(&self) -> BufferTemplate {
        BufferTemplate::new(self.elem_type(), self.len())
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        self.as_slice().get(index)
    }

    /// The whole buffer as a borrowed slice.
    pub fn as_slice(&self) -> BufferSlice<'_> {
        match self {
            Buffer::Bool(v) => BufferSlice::Bool(v),
            Buffer::Int(v) => BufferSlice::Int(v),
            Buffer::Float(v) => BufferSlice::Float(v),
            Buffer::Dual(v) => BufferSlice::Dual(v),
            Buffer::Text(v) => BufferSlice::Text(v),
            Buffer::Any(v) => BufferSlice::Any(v),
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Option<BufferSlice<'_>> {
        self.as_slice().sub(range)
    }

    pub fn to_scalars(&self) -> Vec<Scalar> {
        self.as_slice().to_scalars()
    }

    /// Zero-copy access for float buffers.
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Buffer::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Re-encode the buffer as `target`, which must be a supertype.
    /// Returns `false` when some element has no exact `target` form.
    fn widen(&mut self, target: ElemType) -> bool {
        if target == self.elem_type() {
            return true;
        }
        match Buffer::from_scalars(target, &self.to_scalars()) {
            Some(widened) => {
                *self = widened;
                true
            }
            None => false,
        }
    }

    /// Write `value` at `index`, widening the element type if the value does
    /// not fit. Returns `false` when `index` is out of range.
    pub fn set(&mut self, index: usize, value: &Scalar) -> bool {
        if index >= self.len() {
            return false;
        }
        let mut target = self.elem_type().join(value.elem_type());
        let exact = value.cast(target).is_some();
        if !exact || !self.widen(target) {
            target = ElemType::Any;
            self.widen(target);
        }
        let Some(value) = value.cast(target) else {
            return false;
        };
        match (self, value) {
            (Buffer::Bool(v), Scalar::Bool(b)) => v[index] = b,
            (Buffer::Int(v), Scalar::Int(i)) => v[index] = i,
            (Buffer::Float(v), Scalar::Float(x)) => v[index] = x,
            (Buffer::Dual(v), Scalar::Dual(d)) => {
                let width = v.first().map_or(0, Dual::width).max(d.width());
                for existing in v.iter_mut() {
                    if existing.width() < width {
                        existing.partials.resize(width, 0.0);
                    }
                }
                v[index] = d.padded(width);
            }
            (Buffer::Text(v), Scalar::Text(t)) => v[index] = t,
            (Buffer::Any(v), s) => v[index] = s,
            _ => return false,
        }
        true
    }
}

impl<'a> BufferSlice<'a> {
    pub fn len(&self) -> usize {
        match self {
            BufferSlice::Bool(v) => v.len(),
            BufferSlice::Int(v) => v.len(),
            BufferSlice::Float(v) => v.len(),
            BufferSlice::Dual(v) => v.len(),
            BufferSlice::Text(v) => v.len(),
            BufferSlice::Any(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem_type(&self) -> ElemType {
        match self {
            BufferSlice::Bool(_) => ElemType::Bool,
            BufferSlice::Int(_) => ElemType::Int,
            BufferSlice::Float(_) => ElemType::Float,
            BufferSlice::Dual(_) => ElemType::Dual,
            BufferSlice::Text(_) => ElemType::Text,
            BufferSlice::Any(_) => ElemType::Any,
        }
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            BufferSlice::Bool(v) => v.get(index).map(|b| Scalar::Bool(*b)),
            BufferSlice::Int(v) => v.get(index).map(|i| Scalar::Int(*i)),
            BufferSlice::Float(v) => v.get(index).map(|x| Scalar::Float(*x)),
            BufferSlice::Dual(v) => v.get(index).map(|d| Scalar::Dual(d.clone())),
            BufferSlice::Text(v) => v.get(index).map(|t| Scalar::Text(t.clone())),
            BufferSlice::Any(v) => v.get(index).cloned(),
        }
    }

    /// Sub-slice; `None` when the range is out of bounds.
    pub fn sub(&self, range: Range<usize>) -> Option<BufferSlice<'a>> {
        Some(match *self {
            BufferSlice::Bool(v) => BufferSlice::Bool(v.get(range)?),
            BufferSlice::Int(v) => BufferSlice::Int(v.get(range)?),
            BufferSlice::Float(v) => BufferSlice::Float(v.get(range)?),
            BufferSlice::Dual(v) => BufferSlice::Dual(v.get(range)?),
            BufferSlice::Text(v) => BufferSlice::Text(v.get(range)?),
            BufferSlice::Any(v) => BufferSlice::Any(v.get(range)?),
        })
    }

    pub fn to_scalars(&self) -> Vec<Scalar> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Owned copy with the same element type.
    pub fn to_buffer(&self) -> Buffer {
        match *self {
            BufferSlice::Bool(v) => Buffer::Bool(v.to_vec()),
            BufferSlice::Int(v) => Buffer::Int(v.to_vec()),
            BufferSlice::Float(v) => Buffer::Float(v.to_vec()),
            BufferSlice::Dual(v) => Buffer::Dual(v.to_vec()),
            BufferSlice::Text(v) => Buffer::Text(v.to_vec()),
            BufferSlice::Any(v) => Buffer::Any(v.to_vec()),
        }
    }

    pub fn as_f64(&self) -> Option<&'a [f64]> {
        match *self {
            BufferSlice::Float(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_picks_tightest_type() {
        let values = vec![Scalar::Int(1), Scalar::Bool(true)];
        let buf = Buffer::narrowed(&values, ElemType::Float, None);
        assert_eq!(buf, Buffer::Int(vec![1, 1]));

        let values = vec![Scalar::Int(1), Scalar::Float(2.5)];
        let buf = Buffer::narrowed(&values, ElemType::Float, None);
        assert_eq!(buf, Buffer::Float(vec![1.0, 2.5]));
    }

    #[test]
    fn narrowing_respects_floor() {
        let values = vec![Scalar::Int(2)];
        let buf = Buffer::narrowed(&values, ElemType::Float, Some(ElemType::Float));
        assert_eq!(buf, Buffer::Float(vec![2.0]));
    }

    #[test]
    fn empty_input_uses_fallback() {
        let buf = Buffer::narrowed(&[], ElemType::Int, None);
        assert_eq!(buf, Buffer::Int(vec![]));
    }

    #[test]
    fn mixed_text_and_numbers_become_any() {
        let values = vec![Scalar::Text("a".into()), Scalar::Int(3)];
        let buf = Buffer::narrowed(&values, ElemType::Any, None);
        assert_eq!(buf.elem_type(), ElemType::Any);
        assert_eq!(buf.to_scalars(), values);
    }

    #[test]
    fn narrowing_is_lossless_for_uniform_input() {
        let values = vec![Scalar::Float(0.1), Scalar::Float(-3.0)];
        let buf = Buffer::narrowed(&values, ElemType::Any, None);
        assert_eq!(buf.elem_type(), ElemType::Float);
        assert_eq!(buf.to_scalars(), values);
    }

    #[test]
    fn large_integers_never_round_through_float() {
        let big = (1i64 << 53) + 1;
        let values = vec![Scalar::Int(big), Scalar::Float(0.5)];
        let buf = Buffer::narrowed(&values, ElemType::Float, None);
        assert_eq!(buf, Buffer::Any(values.clone()));
        assert_eq!(buf.get(0), Some(Scalar::Int(big)));

        let floored = Buffer::narrowed(&[Scalar::Int(big)], ElemType::Float, Some(ElemType::Float));
        assert_eq!(floored.get(0), Some(Scalar::Int(big)));

        let mut ints = Buffer::Int(vec![big, 2]);
        assert!(ints.set(1, &Scalar::Float(0.5)));
        assert_eq!(ints.elem_type(), ElemType::Any);
        assert_eq!(ints.to_scalars(), values);
    }

    #[test]
    fn set_widens_in_place() {
        let mut buf = Buffer::Int(vec![1, 2]);
        assert!(buf.set(1, &Scalar::Float(2.5)));
        assert_eq!(buf, Buffer::Float(vec![1.0, 2.5]));
        assert!(!buf.set(2, &Scalar::Float(0.0)));
    }

    #[test]
    fn dual_widths_are_unified() {
        let mut buf = Buffer::from_scalars(
            ElemType::Dual,
            &[Scalar::Float(1.0), Scalar::Dual(Dual::seeded(2.0, vec![1.0]))],
        )
        .unwrap();
        assert_eq!(
            buf,
            Buffer::Dual(vec![Dual::constant(1.0, 1), Dual::seeded(2.0, vec![1.0])])
        );
        buf.set(0, &Scalar::Dual(Dual::seeded(5.0, vec![0.0, 1.0])));
        match &buf {
            Buffer::Dual(v) => assert!(v.iter().all(|d| d.width() == 2)),
            other => panic!("expected dual buffer, got {other:?}"),
        }
    }

    #[test]
    fn slices_do_not_copy() {
        let buf = Buffer::Float(vec![1.0, 2.0, 3.0]);
        let slice = buf.slice(1..3).unwrap();
        assert_eq!(slice.as_f64(), Some(&[2.0, 3.0][..]));
        assert!(buf.slice(2..4).is_none());
    }
}
