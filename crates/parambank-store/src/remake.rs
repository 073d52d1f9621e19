//! Partial rebuild of a store from value overrides.

use std::collections::HashSet;

use parambank_core::{Buffer, ElemType, ParameterClass, StoreError, Value};
use parambank_index::{BufferCoord, IndexCache};
use tracing::debug;

use crate::store::ParameterStore;

impl ParameterStore {
    /// A copy of this store with `overrides` written in.
    ///
    /// Each override is validated against its slot's declared type and shape,
    /// failing on the first invalid one. Only buffers that received a value
    /// are re-narrowed; every other buffer, and every class without an
    /// override, is shared with `self`. Dependency equations are not
    /// re-evaluated.
    pub fn remake<K: AsRef<str>>(
        &self,
        cache: &IndexCache,
        overrides: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<ParameterStore, StoreError> {
        if cache.fingerprint() != self.layout {
            return Err(StoreError::InvalidLocator {
                reason: format!(
                    "index cache layout {} does not match store layout {}",
                    cache.fingerprint().short(),
                    self.layout.short()
                ),
            });
        }
        let mut overrides = overrides.into_iter().peekable();
        if overrides.peek().is_none() {
            return Ok(self.clone());
        }

        let mut out = self.clone();
        let mut touched: HashSet<BufferCoord> = HashSet::new();
        for (name, value) in overrides {
            let name = name.as_ref();
            let resolved = cache.resolve(name).ok_or_else(|| StoreError::UnknownValue {
                name: name.to_string(),
            })?;
            let Some(index) = resolved.index() else {
                return Err(StoreError::DerivedValue {
                    name: resolved.entry().name.clone(),
                });
            };
            out.set(&index, &value)?;
            touched.insert(index.coord());
        }

        for coord in &touched {
            if coord.class == ParameterClass::Nonnumeric {
                continue;
            }
            let floor = (coord.class == ParameterClass::Tunable).then_some(ElemType::Float);
            let buffer = out.buffer_at_mut(*coord, "remake")?;
            *buffer = Buffer::narrowed(&buffer.to_scalars(), buffer.elem_type(), floor);
        }

        debug!(
            fingerprint = %self.layout.short(),
            buffers = touched.len(),
            "remade parameter store"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use parambank_core::Shape;
    use parambank_index::{Universe, ValueDecl};

    use super::*;
    use crate::build::StoreBuilder;

    fn fixture() -> (IndexCache, ParameterStore) {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::tunable_real("p").with_shape(Shape::vector(2)))
            .with_value(ValueDecl::new("n", ElemType::Float))
            .with_value(ValueDecl::new("m", ElemType::Float))
            .with_value(ValueDecl::new("x", ElemType::Float).on_clock("c1"))
            .with_value(ValueDecl::new("y", ElemType::Float))
            .with_dependency("y", parambank_core::Expr::var("n"));
        let cache = IndexCache::plan(&universe).unwrap();
        let store = StoreBuilder::new(&cache)
            .set("p", Value::vector([1.0, 2.0]))
            .set("n", 1i64)
            .set("m", 2i64)
            .set("x", 0.0)
            .build()
            .unwrap();
        (cache, store)
    }

    #[test]
    fn empty_overrides_return_equal_store() {
        let (cache, store) = fixture();
        let same = store.remake(&cache, Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(same, store);
    }

    #[test]
    fn foreign_cache_is_rejected_even_without_overrides() {
        let (_, store) = fixture();
        let other = Universe::new("other").with_value(ValueDecl::tunable_real("k"));
        let other = IndexCache::plan(&other).unwrap();
        let err = store.remake(&other, Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLocator { .. }));
    }

    #[test]
    fn override_of_wrong_type_is_rejected() {
        let (cache, store) = fixture();
        let err = store.remake(&cache, [("n", Value::from("text"))]).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        let err = store
            .remake(&cache, [("p[1]", Value::vector([1.0, 2.0]))])
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn override_renarrows_touched_buffer_only() {
        let (cache, store) = fixture();
        assert_eq!(store.constant_buffers()[0], Buffer::Int(vec![1, 2]));

        let updated = store.remake(&cache, [("m", Value::from(2.5))]).unwrap();
        assert_eq!(updated.constant_buffers()[0], Buffer::Float(vec![1.0, 2.5]));
        assert!(updated.shares_storage(&store, ParameterClass::Tunable).unwrap());
        assert!(updated.shares_storage(&store, ParameterClass::Discrete).unwrap());
        assert_eq!(store.constant_buffers()[0], Buffer::Int(vec![1, 2]));
    }

    #[test]
    fn dual_override_widens_tunables() {
        let (cache, store) = fixture();
        let dual = parambank_core::Scalar::Dual(parambank_core::Dual::seeded(3.0, vec![1.0]));
        let updated = store.remake(&cache, [("p[2]", Value::from(dual))]).unwrap();
        assert_eq!(updated.tunable().elem_type(), ElemType::Dual);
        assert_eq!(store.tunable().elem_type(), ElemType::Float);
    }

    #[test]
    fn array_and_element_overrides() {
        let (cache, store) = fixture();
        let updated = store
            .remake(
                &cache,
                [
                    ("p", Value::vector([5.0, 6.0])),
                    ("sys.p[1]", Value::from(7.0)),
                ],
            )
            .unwrap();
        assert_eq!(updated.tunable(), &Buffer::Float(vec![7.0, 6.0]));
    }

    #[test]
    fn invalid_override_fails_fast() {
        let (cache, store) = fixture();
        let err = store
            .remake(
                &cache,
                [("p", Value::vector([1.0])), ("m", Value::from(0.0))],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { .. }));

        let err = store.remake(&cache, [("y", Value::from(1.0))]).unwrap_err();
        assert_eq!(err, StoreError::DerivedValue { name: "y".into() });
        let err = store.remake(&cache, [("zz", Value::from(1.0))]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownValue { .. }));
    }
}
