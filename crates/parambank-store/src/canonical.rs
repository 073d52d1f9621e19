//! Class-wide flat views and replacement.
//!
//! Numeric code sees one class as a single flat buffer. `canonicalize`
//! produces that buffer (borrowed for the tunable class, concatenated
//! otherwise) together with a [`Repacker`] that writes a flat buffer of the
//! same length back into the class's nested buffers.

use std::borrow::Cow;
use std::sync::Arc;

use parambank_core::{Buffer, ElemType, ParameterClass, Scalar, Shape, StoreError};
use tracing::debug;

use crate::store::ParameterStore;

/// A flat view of one class plus the means to write it back.
#[derive(Debug)]
pub struct Canonicalized<'a> {
    pub values: Cow<'a, Buffer>,
    pub repack: Repacker,
    /// True when `values` borrows the store's own buffer.
    pub is_canonical: bool,
}

/// Layout of one class's nested buffers inside its flat view.
#[derive(Debug, Clone, PartialEq)]
pub struct Repacker {
    class: ParameterClass,
    /// Element type and length of each nested buffer, in flat order.
    segments: Vec<(ElemType, usize)>,
    /// Buffer count per discrete group.
    groups: Vec<usize>,
}

fn unhandled(class: ParameterClass, operation: &'static str) -> StoreError {
    StoreError::UnhandledClass { class, operation }
}

impl Repacker {
    /// Repacker for the current layout of `class` in `store`.
    pub fn for_class(store: &ParameterStore, class: ParameterClass) -> Result<Self, StoreError> {
        let (segments, groups): (Vec<(ElemType, usize)>, Vec<usize>) = match class {
            ParameterClass::Tunable => (
                vec![(store.tunable().elem_type(), store.tunable().len())],
                Vec::new(),
            ),
            ParameterClass::Discrete => (
                store
                    .discrete_groups()
                    .iter()
                    .flatten()
                    .map(|b| (b.elem_type(), b.len()))
                    .collect(),
                store.discrete_groups().iter().map(Vec::len).collect(),
            ),
            ParameterClass::Constant => (
                store
                    .constant_buffers()
                    .iter()
                    .map(|b| (b.elem_type(), b.len()))
                    .collect(),
                Vec::new(),
            ),
            ParameterClass::Nonnumeric => (
                store
                    .nonnumeric_buffers()
                    .iter()
                    .map(|b| (b.elem_type(), b.len()))
                    .collect(),
                Vec::new(),
            ),
            ParameterClass::Dependent => return Err(unhandled(class, "repack")),
        };
        Ok(Self {
            class,
            segments,
            groups,
        })
    }

    pub fn class(&self) -> ParameterClass {
        self.class
    }

    /// Total length a flat buffer must have.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|(_, len)| len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split `flat` into nested buffers. Each segment keeps its previous
    /// element type when the conversion is lossless and otherwise takes the
    /// join of its new contents.
    fn split(&self, flat: &Buffer) -> Result<Vec<Buffer>, StoreError> {
        if flat.len() != self.len() {
            return Err(StoreError::SizeMismatch {
                name: self.class.to_string(),
                expected: Shape::vector(self.len()),
                found: Shape::vector(flat.len()),
            });
        }
        let floor = (self.class == ParameterClass::Tunable).then_some(ElemType::Float);
        let mut start = 0;
        let mut out = Vec::with_capacity(self.segments.len());
        for &(previous, len) in &self.segments {
            let slice = flat
                .slice(start..start + len)
                .ok_or_else(|| StoreError::InvalidLocator {
                    reason: format!("flat segment {start}..{} out of range", start + len),
                })?;
            start += len;
            if slice.elem_type() == previous {
                out.push(slice.to_buffer());
                continue;
            }
            let scalars: Vec<Scalar> = slice.to_scalars();
            let buffer = Buffer::from_scalars(previous, &scalars)
                .unwrap_or_else(|| Buffer::narrowed(&scalars, previous, floor));
            out.push(buffer);
        }
        Ok(out)
    }

    /// Write nested buffers into `store`, replacing the class's storage with
    /// a fresh allocation.
    fn install(&self, store: &mut ParameterStore, buffers: Vec<Buffer>) -> Result<(), StoreError> {
        match self.class {
            ParameterClass::Tunable => {
                let buffer = buffers
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| Buffer::empty(ElemType::Float));
                store.tunable = Arc::new(buffer);
            }
            ParameterClass::Discrete => {
                let mut rest = buffers.into_iter();
                let groups: Vec<Vec<Buffer>> = self
                    .groups
                    .iter()
                    .map(|&n| rest.by_ref().take(n).collect())
                    .collect();
                store.discrete = Arc::new(groups);
            }
            ParameterClass::Constant => store.constant = Arc::new(buffers),
            ParameterClass::Nonnumeric => store.nonnumeric = Arc::new(buffers),
            ParameterClass::Dependent => return Err(unhandled(self.class, "replace")),
        }
        Ok(())
    }

    /// A new store with this class replaced by `flat`; every other class
    /// shares storage with `store`.
    pub fn repack(&self, store: &ParameterStore, flat: &Buffer) -> Result<ParameterStore, StoreError> {
        let buffers = self.split(flat)?;
        let mut out = store.clone();
        self.install(&mut out, buffers)?;
        debug!(class = %self.class, len = flat.len(), "replaced class storage");
        Ok(out)
    }

    /// Overwrite this class of `store` with `flat` in place.
    pub fn repack_in_place(&self, store: &mut ParameterStore, flat: &Buffer) -> Result<(), StoreError> {
        let buffers = self.split(flat)?;
        let target: Vec<&mut Buffer> = match self.class {
            ParameterClass::Tunable => vec![Arc::make_mut(&mut store.tunable)],
            ParameterClass::Discrete => Arc::make_mut(&mut store.discrete)
                .iter_mut()
                .flatten()
                .collect(),
            ParameterClass::Constant => Arc::make_mut(&mut store.constant).iter_mut().collect(),
            ParameterClass::Nonnumeric => Arc::make_mut(&mut store.nonnumeric).iter_mut().collect(),
            ParameterClass::Dependent => return Err(unhandled(self.class, "replace_in_place")),
        };
        if target.len() != buffers.len() {
            return Err(StoreError::InvalidLocator {
                reason: format!(
                    "repacker expects {} {} buffers, store has {}",
                    buffers.len(),
                    self.class,
                    target.len()
                ),
            });
        }
        for (slot, buffer) in target.into_iter().zip(buffers) {
            *slot = buffer;
        }
        Ok(())
    }
}

/// Flat view of `class`. Copy-free for the tunable class.
pub fn canonicalize(
    store: &ParameterStore,
    class: ParameterClass,
) -> Result<Canonicalized<'_>, StoreError> {
    let repack = Repacker::for_class(store, class)?;
    let parts: Vec<&Buffer> = match class {
        ParameterClass::Tunable => {
            return Ok(Canonicalized {
                values: Cow::Borrowed(store.tunable()),
                repack,
                is_canonical: true,
            })
        }
        ParameterClass::Discrete => store.discrete_groups().iter().flatten().collect(),
        ParameterClass::Constant => store.constant_buffers().iter().collect(),
        ParameterClass::Nonnumeric => store.nonnumeric_buffers().iter().collect(),
        ParameterClass::Dependent => return Err(unhandled(class, "canonicalize")),
    };

    let fallback = parts.first().map_or(ElemType::Float, |b| b.elem_type());
    let scalars: Vec<Scalar> = parts.iter().flat_map(|b| b.to_scalars()).collect();
    // Join over buffer types, so empty buffers still count.
    let target = parts
        .iter()
        .map(|b| b.elem_type())
        .reduce(ElemType::join)
        .unwrap_or(fallback);
    // No exact common type (e.g. large integers beside floats): keep scalars as-is.
    let values = match Buffer::from_scalars(target, &scalars) {
        Some(values) => values,
        None => Buffer::Any(scalars),
    };
    Ok(Canonicalized {
        values: Cow::Owned(values),
        repack,
        is_canonical: false,
    })
}

/// A new store with `class` replaced by `flat`. Untouched classes are shared.
pub fn replace(
    store: &ParameterStore,
    class: ParameterClass,
    flat: &Buffer,
) -> Result<ParameterStore, StoreError> {
    Repacker::for_class(store, class)?.repack(store, flat)
}

/// Replace `class` in place. `flat` must have exactly the class's total length.
pub fn replace_in_place(
    store: &mut ParameterStore,
    class: ParameterClass,
    flat: &Buffer,
) -> Result<(), StoreError> {
    Repacker::for_class(store, class)?.repack_in_place(store, flat)
}
