//! Layout planning for parambank parameter buffers.
//!
//! Takes a declared value universe (types, shapes, tunable eligibility, clock
//! membership, aliases, dependency equations) and plans a static buffer
//! layout: every stored value gets exactly one (class, group, buffer, offset)
//! slot, every name it can be referenced by resolves to the same locator, and
//! dependency-derived values are recorded without a slot.

pub mod cache;
pub mod error;
pub mod locator;
pub mod universe;

pub use cache::{IndexCache, Resolved, ValueEntry};
pub use error::LayoutError;
pub use locator::{
    element_name, linear_index, split_subscript, subscripts, BufferCoord, ParameterIndex,
    TimeseriesIndex,
};
pub use universe::{ClockId, Dependency, Universe, ValueDecl};
