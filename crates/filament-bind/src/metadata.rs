#![forbid(unsafe_code)]

//! Property descriptors and the per-type metadata registry.
//!
//! A domain type opts into binding by implementing [`Bindable`], listing its
//! properties as a static descriptor table. The registry memoizes one
//! canonical [`ClassMetadata`] per type, validated once: however many
//! proxies wrap instances of a type, descriptor resolution cost is paid a
//! single time.
//!
//! # Invariants
//!
//! 1. [`ClassMetadata::resolve`] returns the same shared table (pointer
//!    equal) for every call on a given type and thread.
//! 2. A table is cached only after validation succeeds; a failed resolution
//!    is re-attempted on the next call.
//! 3. Descriptor order is declaration order and never changes after
//!    resolution.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::capability::{EditLifecycle, RowValidation};
use crate::error::{BindError, Result};
use crate::value::BoxedValue;

/// A domain type that can be wrapped by an
/// [`ObjectProxy`](crate::ObjectProxy).
pub trait Bindable: Any {
    /// The type's bindable properties, in declaration order.
    fn descriptors() -> Vec<PropertyDescriptor<Self>>
    where
        Self: Sized;

    /// Validation capability hook. Override to forward validation queries.
    fn as_validation(&self) -> Option<&dyn RowValidation> {
        None
    }

    /// Edit-transaction capability hook. Override to forward transaction
    /// calls.
    fn as_editable(&self) -> Option<&dyn EditLifecycle> {
        None
    }
}

/// Metadata for one bindable property: a name and a value accessor.
///
/// The accessor is a plain function pointer so descriptor tables stay
/// `'static` data; reads that should participate in tracking go through
/// [`Tracked`](filament_reactive::Tracked) fields inside the accessor body.
pub struct PropertyDescriptor<T> {
    pub name: &'static str,
    pub get: fn(&T) -> BoxedValue,
}

impl<T> Clone for PropertyDescriptor<T> {
    fn clone(&self) -> Self {
        PropertyDescriptor {
            name: self.name,
            get: self.get,
        }
    }
}

impl<T> std::fmt::Debug for PropertyDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// Stable identity of one descriptor: the owning type plus its position in
/// the table. The lookup key for
/// [`ObjectProxy::lookup_by_descriptor`](crate::ObjectProxy::lookup_by_descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId {
    type_id: TypeId,
    index: usize,
}

impl DescriptorId {
    /// Position of the descriptor in its type's table.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// The canonical, validated descriptor table for one type.
pub struct ClassMetadata<T> {
    descriptors: Rc<[PropertyDescriptor<T>]>,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<TypeId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

impl<T: Bindable> ClassMetadata<T> {
    /// Fetch the canonical table for `T`, building and validating it on
    /// first use.
    ///
    /// Fails with [`BindError::MetadataResolution`] when the type declares
    /// no properties or declares two properties with the same name. Failed
    /// resolutions are not cached.
    pub fn resolve() -> Result<Rc<Self>> {
        let type_id = TypeId::of::<T>();
        let cached = REGISTRY.with(|registry| registry.borrow().get(&type_id).cloned());
        if let Some(cached) = cached {
            let metadata = cached
                .downcast::<ClassMetadata<T>>()
                .map_err(|_| BindError::invariant("metadata registry holds a foreign table"))?;
            return Ok(metadata);
        }

        let metadata = Rc::new(Self::build()?);
        REGISTRY.with(|registry| {
            registry
                .borrow_mut()
                .insert(type_id, Rc::clone(&metadata) as Rc<dyn Any>);
        });
        tracing::debug!(
            ty = std::any::type_name::<T>(),
            properties = metadata.len(),
            "metadata resolved"
        );
        Ok(metadata)
    }

    fn build() -> Result<Self> {
        let type_name = std::any::type_name::<T>();
        let descriptors = T::descriptors();
        if descriptors.is_empty() {
            return Err(BindError::metadata(type_name, "type declares no properties"));
        }
        for (i, d) in descriptors.iter().enumerate() {
            if descriptors[..i].iter().any(|prev| prev.name == d.name) {
                return Err(BindError::metadata(
                    type_name,
                    format!("duplicate property name {:?}", d.name),
                ));
            }
        }
        Ok(ClassMetadata {
            descriptors: descriptors.into(),
        })
    }

    /// The descriptor table, in declaration order.
    #[must_use]
    pub fn descriptors(&self) -> &[PropertyDescriptor<T>] {
        &self.descriptors
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Identity of the descriptor at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds for the table.
    #[must_use]
    pub fn descriptor_id(&self, index: usize) -> DescriptorId {
        assert!(index < self.descriptors.len(), "descriptor index out of bounds");
        DescriptorId {
            type_id: TypeId::of::<T>(),
            index,
        }
    }

    /// All descriptor identities, in table order.
    pub fn descriptor_ids(&self) -> impl Iterator<Item = DescriptorId> + '_ {
        (0..self.descriptors.len()).map(|i| self.descriptor_id(i))
    }
}

impl<T> std::fmt::Debug for ClassMetadata<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("type", &std::any::type_name::<T>())
            .field("properties", &self.descriptors.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::boxed;

    struct Point {
        x: i32,
        y: i32,
    }

    impl Bindable for Point {
        fn descriptors() -> Vec<PropertyDescriptor<Self>> {
            vec![
                PropertyDescriptor {
                    name: "x",
                    get: |p| boxed(p.x),
                },
                PropertyDescriptor {
                    name: "y",
                    get: |p| boxed(p.y),
                },
            ]
        }
    }

    struct Nameless;

    impl Bindable for Nameless {
        fn descriptors() -> Vec<PropertyDescriptor<Self>> {
            Vec::new()
        }
    }

    struct Doubled;

    impl Bindable for Doubled {
        fn descriptors() -> Vec<PropertyDescriptor<Self>> {
            vec![
                PropertyDescriptor {
                    name: "v",
                    get: |_| boxed(0),
                },
                PropertyDescriptor {
                    name: "v",
                    get: |_| boxed(1),
                },
            ]
        }
    }

    #[test]
    fn resolve_is_memoized() {
        let a = ClassMetadata::<Point>::resolve().unwrap();
        let b = ClassMetadata::<Point>::resolve().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 2);
        assert_eq!(a.descriptors()[0].name, "x");
        assert_eq!(a.descriptors()[1].name, "y");
    }

    #[test]
    fn empty_table_fails() {
        let err = ClassMetadata::<Nameless>::resolve().unwrap_err();
        assert!(matches!(err, BindError::MetadataResolution { .. }));
    }

    #[test]
    fn duplicate_names_fail() {
        let err = ClassMetadata::<Doubled>::resolve().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("duplicate"));
    }

    #[test]
    fn descriptor_ids_distinct_per_property() {
        let meta = ClassMetadata::<Point>::resolve().unwrap();
        let ids: Vec<_> = meta.descriptor_ids().collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(ids[0].index(), 0);
        assert_eq!(ids[1].index(), 1);
    }

    #[test]
    fn ids_differ_across_types() {
        struct Other {
            v: u8,
        }
        impl Bindable for Other {
            fn descriptors() -> Vec<PropertyDescriptor<Self>> {
                vec![PropertyDescriptor {
                    name: "v",
                    get: |o| boxed(o.v),
                }]
            }
        }
        let point = ClassMetadata::<Point>::resolve().unwrap();
        let other = ClassMetadata::<Other>::resolve().unwrap();
        assert_ne!(point.descriptor_id(0), other.descriptor_id(0));
    }

    #[test]
    fn accessor_reads_the_instance() {
        let meta = ClassMetadata::<Point>::resolve().unwrap();
        let p = Point { x: 3, y: 4 };
        let v = (meta.descriptors()[1].get)(&p);
        assert_eq!(crate::value::downcast::<i32>(&v), Some(&4));
    }
}
