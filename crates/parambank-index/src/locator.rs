//! Locators: resolved-once addresses into a parameter store.
//!
//! A `ParameterIndex` is independent of any particular store. It is valid
//! for every store built from a layout with the same fingerprint.

use std::ops::Range;

use parambank_core::{ElemType, LayoutFingerprint, ParameterClass, Shape};
use serde::{Deserialize, Serialize};

use crate::universe::ClockId;

/// Address of one buffer: class, group within the class, buffer within the group.
///
/// Tunables live at `(Tunable, 0, 0)`. Discrete groups are clocks and buffers
/// are element types; constant and nonnumeric classes have a single group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferCoord {
    pub class: ParameterClass,
    pub group: usize,
    pub buffer: usize,
}

impl BufferCoord {
    pub fn new(class: ParameterClass, group: usize, buffer: usize) -> Self {
        Self {
            class,
            group,
            buffer,
        }
    }
}

/// Typed locator of one stored value (or one element of an array value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterIndex {
    name: String,
    coord: BufferCoord,
    offset: usize,
    shape: Shape,
    elem_type: ElemType,
    validate_size: bool,
    layout: LayoutFingerprint,
}

impl ParameterIndex {
    pub(crate) fn new(
        name: String,
        coord: BufferCoord,
        offset: usize,
        shape: Shape,
        elem_type: ElemType,
        layout: LayoutFingerprint,
    ) -> Self {
        Self {
            name,
            coord,
            offset,
            shape,
            elem_type,
            validate_size: true,
            layout,
        }
    }

    /// Canonical name of the located value.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ParameterClass {
        self.coord.class
    }

    pub fn coord(&self) -> BufferCoord {
        self.coord
    }

    /// First buffer slot.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Declared element type, used to validate writes.
    pub fn elem_type(&self) -> ElemType {
        self.elem_type
    }

    /// Number of buffer slots covered.
    pub fn len(&self) -> usize {
        self.shape.element_count().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }

    /// Whether writes must match the slot shape exactly. When disabled only
    /// the element count is checked, so a value may be reshaped on write.
    pub fn validate_size(&self) -> bool {
        self.validate_size
    }

    pub fn with_size_validation(mut self, validate: bool) -> Self {
        self.validate_size = validate;
        self
    }

    pub fn layout(&self) -> LayoutFingerprint {
        self.layout
    }

    pub(crate) fn stamp(&mut self, layout: LayoutFingerprint) {
        self.layout = layout;
    }

    /// Locator of a single element of this (array) slot.
    pub(crate) fn element(&self, linear: usize, name: String) -> ParameterIndex {
        ParameterIndex {
            name,
            coord: self.coord,
            offset: self.offset + linear,
            shape: Shape::Scalar,
            elem_type: self.elem_type,
            validate_size: self.validate_size,
            layout: self.layout,
        }
    }
}

/// Locator of a discrete value relative to its clock's timeseries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeseriesIndex {
    /// Position of the clock in the layout (the discrete group).
    pub timeseries: usize,
    pub clock: ClockId,
    pub index: ParameterIndex,
}

/// 1-based row-major subscripts of a linear element position.
pub fn subscripts(dims: &[usize], linear: usize) -> Vec<usize> {
    let mut rest = linear;
    let mut subs = vec![0; dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        let dim = (*dim).max(1);
        subs[i] = rest % dim + 1;
        rest /= dim;
    }
    subs
}

/// Linear row-major position of 1-based subscripts, if in range.
pub fn linear_index(dims: &[usize], subs: &[usize]) -> Option<usize> {
    if dims.len() != subs.len() {
        return None;
    }
    let mut linear = 0;
    for (dim, sub) in dims.iter().zip(subs) {
        if *sub == 0 || sub > dim {
            return None;
        }
        linear = linear * dim + (sub - 1);
    }
    Some(linear)
}

/// Name of one array element, e.g. `p[2]` or `m[1,3]`.
pub fn element_name(base: &str, dims: &[usize], linear: usize) -> String {
    let subs: Vec<String> = subscripts(dims, linear)
        .iter()
        .map(|s| s.to_string())
        .collect();
    format!("{base}[{}]", subs.join(","))
}

/// Split `p[2]` / `m[1, 3]` into the base name and its subscripts.
pub fn split_subscript(name: &str) -> Option<(&str, Vec<usize>)> {
    let body = name.strip_suffix(']')?;
    let open = body.rfind('[')?;
    let base = &body[..open];
    if base.is_empty() {
        return None;
    }
    let subs = body[open + 1..]
        .split(',')
        .map(|s| s.trim().parse::<usize>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some((base, subs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscripts_are_one_based_row_major() {
        assert_eq!(subscripts(&[3], 1), vec![2]);
        assert_eq!(subscripts(&[2, 3], 4), vec![2, 2]);
        assert_eq!(linear_index(&[2, 3], &[2, 2]), Some(4));
        assert_eq!(linear_index(&[3], &[0]), None);
        assert_eq!(linear_index(&[3], &[4]), None);
    }

    #[test]
    fn element_names_round_trip_through_split() {
        let name = element_name("m", &[2, 3], 5);
        assert_eq!(name, "m[2,3]");
        let (base, subs) = split_subscript(&name).unwrap();
        assert_eq!(base, "m");
        assert_eq!(linear_index(&[2, 3], &subs), Some(5));
    }

    #[test]
    fn split_accepts_spaces_and_rejects_garbage() {
        assert_eq!(split_subscript("sys.p[1, 2]"), Some(("sys.p", vec![1, 2])));
        assert_eq!(split_subscript("p"), None);
        assert_eq!(split_subscript("p[x]"), None);
        assert_eq!(split_subscript("[1]"), None);
    }
}
