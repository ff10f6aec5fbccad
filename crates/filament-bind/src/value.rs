#![forbid(unsafe_code)]

//! Dynamic value transport for property wrappers.
//!
//! Descriptor accessors produce a [`BoxedValue`], a shared trait object that
//! any binding layer can inspect without knowing the concrete property type.
//! [`BindValue::eq_value`] gives honest equality across the type boundary so
//! wrappers can suppress no-change notifications; values of different
//! concrete types never compare equal.

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

/// A property value as seen by the binding layer.
pub trait BindValue: Any + Debug {
    /// Upcast for downcasting by consumers.
    fn as_any(&self) -> &dyn Any;

    /// Equality across the trait-object boundary. False whenever the
    /// concrete types differ.
    fn eq_value(&self, other: &dyn BindValue) -> bool;
}

impl<T: Any + Debug + PartialEq> BindValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn BindValue) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| self == o)
    }
}

/// Shared, cheaply cloneable property value.
pub type BoxedValue = Rc<dyn BindValue>;

/// Box a concrete value for transport.
pub fn boxed<T: Any + Debug + PartialEq>(value: T) -> BoxedValue {
    Rc::new(value)
}

/// Borrow the concrete value back out, if the type matches.
#[must_use]
pub fn downcast<T: Any>(value: &BoxedValue) -> Option<&T> {
    value.as_any().downcast_ref::<T>()
}
