//! Core value model for parambank.
//!
//! Defines the element-type lattice used for buffer narrowing, runtime
//! scalars and shaped values (including forward-mode dual numbers), typed
//! buffers and the templates that size them, the mutability classes, the
//! expression/evaluator seam used for dependency resolution, and the store
//! error type shared by the planning and runtime crates.

pub mod buffer;
pub mod class;
pub mod error;
pub mod expr;
pub mod hash;
pub mod types;

pub use buffer::{join_type, Buffer, BufferSlice, BufferTemplate};
pub use class::ParameterClass;
pub use error::StoreError;
pub use expr::{Binding, Bindings, Evaluation, Evaluator, Expr};
pub use hash::LayoutFingerprint;
pub use types::{ArrayValue, Dual, ElemType, Scalar, Shape, Value};
