//! Runtime parameter storage for parambank.
//!
//! A [`ParameterStore`] holds the typed buffers of one planned layout. It is
//! built by [`StoreBuilder`] from an [`parambank_index::IndexCache`] and a set
//! of bindings, read and written through locators, exchanged with numeric
//! code one class at a time through [`canonicalize`] and [`replace`], and
//! patched cheaply with [`ParameterStore::remake`].

pub mod build;
pub mod canonical;
pub mod dual;
pub mod eval;
mod fixpoint;
pub mod remake;
pub mod store;
mod validate;

pub use build::{StoreBuilder, DEFAULT_TIME_NAME};
pub use canonical::{canonicalize, replace, replace_in_place, Canonicalized, Repacker};
pub use dual::{primal, seed_identity, seed_tunables, tunable_partials};
pub use eval::ArithmeticEvaluator;
pub use store::{ParameterStore, ValueRef};
