//! Fixpoint substitution of pending expressions.

use indexmap::IndexMap;
use parambank_core::{Bindings, Evaluation, Evaluator, Expr, StoreError};
use parambank_index::IndexCache;
use tracing::trace;

/// Dependency equations of a layout with references canonicalized.
pub(crate) fn pending_dependencies(cache: &IndexCache) -> IndexMap<String, Expr> {
    cache
        .dependencies()
        .map(|(name, rhs)| (name.to_string(), cache.canonicalize_expr(rhs)))
        .collect()
}

/// Repeatedly evaluate `pending` against `resolved`, moving every expression
/// that becomes concrete into `resolved`. Stops when nothing is pending or a
/// pass resolves nothing. Returns the expressions that remain symbolic.
pub(crate) fn substitute(
    evaluator: &dyn Evaluator,
    resolved: &mut Bindings,
    mut pending: IndexMap<String, Expr>,
) -> Result<IndexMap<String, Expr>, StoreError> {
    let mut pass = 0usize;
    while !pending.is_empty() {
        pass += 1;
        let mut progressed = false;
        let mut remaining = IndexMap::with_capacity(pending.len());
        for (name, expr) in pending {
            match evaluator.evaluate(&expr, resolved)? {
                Evaluation::Resolved(value) => {
                    resolved.insert(name, value);
                    progressed = true;
                }
                Evaluation::Symbolic(reduced) => {
                    remaining.insert(name, reduced);
                }
            }
        }
        trace!(pass, remaining = remaining.len(), "substitution pass");
        pending = remaining;
        if !progressed {
            break;
        }
    }
    Ok(pending)
}
