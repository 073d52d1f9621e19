//! Forward-mode differentiation over the tunable class.
//!
//! A dual store is an ordinary store whose tunable buffer holds duals. It
//! shares every other class with the store it was seeded from and is thrown
//! away once derivatives have been read.

use std::sync::Arc;

use parambank_core::{Buffer, Dual, ParameterClass, Shape, StoreError};

use crate::canonical::{canonicalize, replace};
use crate::store::ParameterStore;

/// Real parts of the tunable buffer.
fn tunable_reals(store: &ParameterStore) -> Result<Vec<f64>, StoreError> {
    let view = canonicalize(store, ParameterClass::Tunable)?;
    view.values
        .to_scalars()
        .iter()
        .map(|s| {
            s.as_f64().ok_or_else(|| StoreError::TypeMismatch {
                name: ParameterClass::Tunable.to_string(),
                expected: "numeric".into(),
                found: s.elem_type().to_string(),
            })
        })
        .collect()
}

/// A store whose tunable element `i` carries partials `seeds[i]`.
pub fn seed_tunables(store: &ParameterStore, seeds: &[Vec<f64>]) -> Result<ParameterStore, StoreError> {
    let reals = tunable_reals(store)?;
    if seeds.len() != reals.len() {
        return Err(StoreError::SizeMismatch {
            name: ParameterClass::Tunable.to_string(),
            expected: Shape::vector(reals.len()),
            found: Shape::vector(seeds.len()),
        });
    }
    let width = seeds.iter().map(Vec::len).max().unwrap_or(0);
    let duals = reals
        .into_iter()
        .zip(seeds)
        .map(|(value, seed)| Dual::seeded(value, seed.clone()).padded(width))
        .collect();
    replace(store, ParameterClass::Tunable, &Buffer::Dual(duals))
}

/// Seed every tunable with its own unit direction, so partial `j` of any
/// derived result is the derivative with respect to tunable `j`.
pub fn seed_identity(store: &ParameterStore) -> Result<ParameterStore, StoreError> {
    let n = store.tunable().len();
    let seeds: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect();
    seed_tunables(store, &seeds)
}

/// Partials of every tunable element; empty rows for non-dual buffers.
pub fn tunable_partials(store: &ParameterStore) -> Vec<Vec<f64>> {
    match store.tunable() {
        Buffer::Dual(duals) => duals.iter().map(|d| d.partials.clone()).collect(),
        other => vec![Vec::new(); other.len()],
    }
}

/// The store with dual tunables replaced by their real parts.
pub fn primal(store: &ParameterStore) -> Result<ParameterStore, StoreError> {
    if !matches!(store.tunable(), Buffer::Dual(_)) {
        return Ok(store.clone());
    }
    let mut out = store.clone();
    out.tunable = Arc::new(Buffer::Float(tunable_reals(store)?));
    Ok(out)
}
