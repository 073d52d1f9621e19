//! Write-time validation of values against their slots.

use parambank_core::{LayoutFingerprint, Scalar, Shape, StoreError, Value};
use parambank_index::ParameterIndex;

/// Reject a locator planned for a different layout.
pub(crate) fn check_layout(
    index: &ParameterIndex,
    layout: LayoutFingerprint,
) -> Result<(), StoreError> {
    if index.layout() != layout {
        return Err(StoreError::InvalidLocator {
            reason: format!(
                "locator for `{}` was planned for layout {}, store has layout {}",
                index.name(),
                index.layout().short(),
                layout.short()
            ),
        });
    }
    Ok(())
}

/// Check shape and element types of `value` against the slot it is written to.
///
/// Array-vs-scalar is a type mismatch. With size validation on, array shapes
/// must match exactly; with it off, only the element count must agree.
pub(crate) fn check_value(index: &ParameterIndex, value: &Value) -> Result<(), StoreError> {
    let expected = index.shape();
    let found = value.shape();

    if expected.is_scalar() != found.is_scalar() {
        return Err(StoreError::TypeMismatch {
            name: index.name().to_string(),
            expected: describe(index, expected),
            found: match value.elem_type() {
                Some(ty) => format!("{ty} {found}"),
                None => format!("empty {found}"),
            },
        });
    }

    let size_ok = if index.validate_size() {
        *expected == found
    } else {
        expected.element_count() == found.element_count()
    };
    if !size_ok {
        return Err(StoreError::SizeMismatch {
            name: index.name().to_string(),
            expected: expected.clone(),
            found,
        });
    }

    for scalar in value.elements() {
        check_scalar(index, scalar)?;
    }
    Ok(())
}

pub(crate) fn check_scalar(index: &ParameterIndex, scalar: &Scalar) -> Result<(), StoreError> {
    if !index.elem_type().accepts(scalar.elem_type()) {
        return Err(StoreError::TypeMismatch {
            name: index.name().to_string(),
            expected: index.elem_type().to_string(),
            found: scalar.elem_type().to_string(),
        });
    }
    Ok(())
}

fn describe(index: &ParameterIndex, shape: &Shape) -> String {
    format!("{} {shape}", index.elem_type())
}

#[cfg(test)]
mod tests {
    use parambank_core::ElemType;
    use parambank_index::{IndexCache, Universe, ValueDecl};

    use super::*;

    fn cache() -> IndexCache {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::tunable_real("p").with_shape(Shape::vector(3)))
            .with_value(ValueDecl::new("n", ElemType::Int));
        IndexCache::plan(&universe).unwrap()
    }

    #[test]
    fn scalar_into_array_slot_is_a_type_error() {
        let p = cache().index("p").unwrap();
        assert!(matches!(
            check_value(&p, &Value::from(1.0)),
            Err(StoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn wrong_length_is_a_size_error() {
        let p = cache().index("p").unwrap();
        let err = check_value(&p, &Value::vector([1.0, 2.0])).unwrap_err();
        assert_eq!(
            err,
            StoreError::SizeMismatch {
                name: "p".into(),
                expected: Shape::vector(3),
                found: Shape::vector(2),
            }
        );
    }

    #[test]
    fn reshape_allowed_without_size_validation() {
        let p = cache().index("p").unwrap();
        let reshaped = Value::array(
            vec![1, 3],
            vec![Scalar::Float(1.0), Scalar::Float(2.0), Scalar::Float(3.0)],
        )
        .unwrap();
        assert!(check_value(&p, &reshaped).is_err());
        assert!(check_value(&p.with_size_validation(false), &reshaped).is_ok());
    }

    #[test]
    fn element_type_must_be_accepted() {
        let n = cache().index("n").unwrap();
        assert!(check_value(&n, &Value::from(true)).is_ok());
        assert!(matches!(
            check_value(&n, &Value::from(1.5)),
            Err(StoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn foreign_layout_is_rejected() {
        let p = cache().index("p").unwrap();
        let other = LayoutFingerprint::of(&"other").unwrap();
        assert!(matches!(
            check_layout(&p, other),
            Err(StoreError::InvalidLocator { .. })
        ));
        assert!(check_layout(&p, p.layout()).is_ok());
    }
}
