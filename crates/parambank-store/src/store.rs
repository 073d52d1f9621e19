//! The runtime parameter container.
//!
//! A `ParameterStore` owns one typed storage tree per class. Each class sits
//! behind its own `Arc`, so `Clone` and class-wide replacement share the
//! classes they do not touch; mutation goes through `Arc::make_mut` and
//! never affects another store.

use std::sync::Arc;

use parambank_core::{
    ArrayValue, Buffer, BufferSlice, Evaluator, LayoutFingerprint, ParameterClass, Scalar,
    StoreError, Value,
};
use parambank_index::{BufferCoord, IndexCache, ParameterIndex, Resolved};
use tracing::debug;

use crate::fixpoint::{pending_dependencies, substitute};
use crate::validate::{check_layout, check_value};

/// Typed buffers of one planned layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    pub(crate) layout: LayoutFingerprint,
    pub(crate) buffer_table: Arc<[BufferCoord]>,
    pub(crate) tunable: Arc<Buffer>,
    /// Clock-major, then element type.
    pub(crate) discrete: Arc<Vec<Vec<Buffer>>>,
    pub(crate) constant: Arc<Vec<Buffer>>,
    pub(crate) nonnumeric: Arc<Vec<Buffer>>,
}

/// Result of a locator read: a scalar, or a borrowed view of an array slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRef<'a> {
    Scalar(Scalar),
    Array {
        shape: &'a [usize],
        data: BufferSlice<'a>,
    },
}

impl ValueRef<'_> {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ValueRef::Scalar(s) => Some(s),
            ValueRef::Array { .. } => None,
        }
    }

    /// Owned copy of the value.
    pub fn to_value(&self) -> Value {
        match self {
            ValueRef::Scalar(s) => Value::Scalar(s.clone()),
            ValueRef::Array { shape, data } => Value::Array(ArrayValue {
                shape: shape.to_vec(),
                data: data.to_scalars(),
            }),
        }
    }
}

impl ParameterStore {
    pub fn layout(&self) -> LayoutFingerprint {
        self.layout
    }

    pub fn tunable(&self) -> &Buffer {
        &self.tunable
    }

    /// Buffers of one clock, one per discrete element type.
    pub fn discrete_group(&self, group: usize) -> Option<&[Buffer]> {
        self.discrete.get(group).map(Vec::as_slice)
    }

    pub fn discrete_groups(&self) -> &[Vec<Buffer>] {
        &self.discrete
    }

    pub fn constant_buffers(&self) -> &[Buffer] {
        &self.constant
    }

    pub fn nonnumeric_buffers(&self) -> &[Buffer] {
        &self.nonnumeric
    }

    fn coord_error(coord: BufferCoord) -> StoreError {
        StoreError::InvalidLocator {
            reason: format!(
                "no {} buffer at group {}, position {}",
                coord.class, coord.group, coord.buffer
            ),
        }
    }

    pub(crate) fn buffer_at(
        &self,
        coord: BufferCoord,
        operation: &'static str,
    ) -> Result<&Buffer, StoreError> {
        let found = match coord.class {
            ParameterClass::Tunable => {
                (coord.group == 0 && coord.buffer == 0).then_some(&*self.tunable)
            }
            ParameterClass::Discrete => self
                .discrete
                .get(coord.group)
                .and_then(|group| group.get(coord.buffer)),
            ParameterClass::Constant => self.constant.get(coord.buffer),
            ParameterClass::Nonnumeric => self.nonnumeric.get(coord.buffer),
            ParameterClass::Dependent => {
                return Err(StoreError::UnhandledClass {
                    class: coord.class,
                    operation,
                })
            }
        };
        found.ok_or_else(|| Self::coord_error(coord))
    }

    pub(crate) fn buffer_at_mut(
        &mut self,
        coord: BufferCoord,
        operation: &'static str,
    ) -> Result<&mut Buffer, StoreError> {
        let found = match coord.class {
            ParameterClass::Tunable if coord.group == 0 && coord.buffer == 0 => {
                Some(Arc::make_mut(&mut self.tunable))
            }
            ParameterClass::Tunable => None,
            ParameterClass::Discrete => Arc::make_mut(&mut self.discrete)
                .get_mut(coord.group)
                .and_then(|group| group.get_mut(coord.buffer)),
            ParameterClass::Constant => Arc::make_mut(&mut self.constant).get_mut(coord.buffer),
            ParameterClass::Nonnumeric => {
                Arc::make_mut(&mut self.nonnumeric).get_mut(coord.buffer)
            }
            ParameterClass::Dependent => {
                return Err(StoreError::UnhandledClass {
                    class: coord.class,
                    operation,
                })
            }
        };
        found.ok_or_else(|| Self::coord_error(coord))
    }

    /// Read the value at a locator. Array slots are returned as a view into
    /// the owning buffer.
    pub fn get<'a>(&'a self, index: &'a ParameterIndex) -> Result<ValueRef<'a>, StoreError> {
        check_layout(index, self.layout)?;
        let buffer = self.buffer_at(index.coord(), "get")?;
        let out_of_range = || StoreError::InvalidLocator {
            reason: format!(
                "slot {:?} of `{}` exceeds buffer length {}",
                index.range(),
                index.name(),
                buffer.len()
            ),
        };
        if index.shape().is_scalar() {
            buffer
                .get(index.offset())
                .map(ValueRef::Scalar)
                .ok_or_else(out_of_range)
        } else {
            let data = buffer.slice(index.range()).ok_or_else(out_of_range)?;
            Ok(ValueRef::Array {
                shape: index.shape().dims(),
                data,
            })
        }
    }

    pub fn get_value(&self, index: &ParameterIndex) -> Result<Value, StoreError> {
        Ok(self.get(index)?.to_value())
    }

    /// Write `value` into the slot at `index`.
    ///
    /// The value is validated against the slot's declared type and shape
    /// before anything is written. A value the narrowed buffer cannot
    /// represent widens that buffer in place.
    pub fn set(&mut self, index: &ParameterIndex, value: &Value) -> Result<(), StoreError> {
        check_layout(index, self.layout)?;
        check_value(index, value)?;
        let buffer = self.buffer_at_mut(index.coord(), "set")?;
        if index.range().end > buffer.len() {
            return Err(StoreError::InvalidLocator {
                reason: format!(
                    "slot {:?} of `{}` exceeds buffer length {}",
                    index.range(),
                    index.name(),
                    buffer.len()
                ),
            });
        }
        for (i, scalar) in value.elements().iter().enumerate() {
            if !buffer.set(index.offset() + i, scalar) {
                return Err(StoreError::InvalidLocator {
                    reason: format!(
                        "could not write element {i} of `{}` at offset {}",
                        index.name(),
                        index.offset() + i
                    ),
                });
            }
        }
        Ok(())
    }

    /// Number of owned buffers in the linear numbering.
    pub fn buffer_count(&self) -> usize {
        self.buffer_table.len()
    }

    /// The `i`-th owned buffer: the tunable buffer (when non-empty), then
    /// every discrete buffer clock by clock, then constant and nonnumeric
    /// buffers.
    pub fn buffer(&self, i: usize) -> Result<&Buffer, StoreError> {
        let coord = self
            .buffer_table
            .get(i)
            .copied()
            .ok_or_else(|| StoreError::InvalidLocator {
                reason: format!(
                    "linear buffer index {i} out of range (store owns {})",
                    self.buffer_table.len()
                ),
            })?;
        self.buffer_at(coord, "buffer")
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> + '_ {
        (0..self.buffer_count()).filter_map(|i| self.buffer(i).ok())
    }

    /// A store with freshly allocated storage for every class.
    pub fn deep_copy(&self) -> ParameterStore {
        ParameterStore {
            layout: self.layout,
            buffer_table: self.buffer_table.clone(),
            tunable: Arc::new((*self.tunable).clone()),
            discrete: Arc::new((*self.discrete).clone()),
            constant: Arc::new((*self.constant).clone()),
            nonnumeric: Arc::new((*self.nonnumeric).clone()),
        }
    }

    /// Whether `self` and `other` share the storage of `class`.
    pub fn shares_storage(
        &self,
        other: &ParameterStore,
        class: ParameterClass,
    ) -> Result<bool, StoreError> {
        Ok(match class {
            ParameterClass::Tunable => Arc::ptr_eq(&self.tunable, &other.tunable),
            ParameterClass::Discrete => Arc::ptr_eq(&self.discrete, &other.discrete),
            ParameterClass::Constant => Arc::ptr_eq(&self.constant, &other.constant),
            ParameterClass::Nonnumeric => Arc::ptr_eq(&self.nonnumeric, &other.nonnumeric),
            ParameterClass::Dependent => {
                return Err(StoreError::UnhandledClass {
                    class,
                    operation: "shares_storage",
                })
            }
        })
    }

    /// Current values of every stored entry, keyed by canonical name.
    pub fn bindings(&self, cache: &IndexCache) -> Result<parambank_core::Bindings, StoreError> {
        let mut bindings = parambank_core::Bindings::new();
        for entry in cache.stored_entries() {
            if let Some(index) = &entry.index {
                bindings.insert(entry.name.clone(), self.get_value(index)?);
            }
        }
        Ok(bindings)
    }

    /// Value of any name, stored or dependency-derived.
    ///
    /// Derived values are computed from the store's current contents by
    /// substituting dependency equations until the requested one resolves.
    pub fn evaluate(
        &self,
        cache: &IndexCache,
        name: &str,
        evaluator: &dyn Evaluator,
    ) -> Result<Value, StoreError> {
        if cache.fingerprint() != self.layout {
            return Err(StoreError::InvalidLocator {
                reason: format!(
                    "index cache layout {} does not match store layout {}",
                    cache.fingerprint().short(),
                    self.layout.short()
                ),
            });
        }
        let resolved = cache.resolve(name).ok_or_else(|| StoreError::UnknownValue {
            name: name.to_string(),
        })?;
        let entry = resolved.entry();
        if !entry.is_derived() {
            let index = resolved.index().ok_or_else(|| StoreError::UnknownValue {
                name: name.to_string(),
            })?;
            return self.get_value(&index);
        }

        let mut bindings = self.bindings(cache)?;
        let pending = substitute(evaluator, &mut bindings, pending_dependencies(cache))?;
        debug!(
            name,
            unresolved = pending.len(),
            "evaluated dependency-derived value"
        );
        let value = bindings
            .remove(&entry.name)
            .ok_or_else(|| StoreError::Unresolved {
                names: vec![entry.name.clone()],
            })?;
        match resolved {
            Resolved::Whole(_) => Ok(value),
            Resolved::Element { linear, .. } => value
                .elements()
                .get(linear)
                .cloned()
                .map(Value::Scalar)
                .ok_or_else(|| StoreError::SizeMismatch {
                    name: resolved.canonical_name(),
                    expected: entry.shape.clone(),
                    found: value.shape(),
                }),
        }
    }
}
