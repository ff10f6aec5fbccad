#![forbid(unsafe_code)]

//! Per-property wrappers.
//!
//! One [`PropertyWrapper`] exists per descriptor per proxy, created at proxy
//! construction and owned by the proxy for its whole life. Each wrapper owns
//! a [`DependencyNode`] whose re-run action evaluates the descriptor's
//! accessor against the wrapped object. Whatever tracked state the accessor
//! reads (transitively, through whatever the getter itself touches) becomes
//! the wrapper's dependency set for that run; the set is rebuilt on every
//! re-run, never reused.
//!
//! When a re-run produces a value that differs from the cached one, the new
//! value is stored and a property-changed notification is routed through
//! the tracking context's dispatch shim. The initial evaluation populates
//! the cache silently.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use filament_reactive::DependencyNode;

use crate::context::TrackingContext;
use crate::metadata::{Bindable, DescriptorId, PropertyDescriptor};
use crate::notify::{NotificationHub, PropertyChanged};
use crate::value::BoxedValue;

struct WrapperInner<T: Bindable> {
    descriptor_id: DescriptorId,
    name: &'static str,
    get: fn(&T) -> BoxedValue,
    wrapped: Rc<T>,
    context: Rc<TrackingContext>,
    hub: Rc<NotificationHub>,
    node: DependencyNode,
    cached: RefCell<Option<BoxedValue>>,
    disposed: Cell<bool>,
}

impl<T: Bindable> WrapperInner<T> {
    fn reevaluate(inner: &Rc<WrapperInner<T>>) {
        if inner.disposed.get() {
            return;
        }
        let value = (inner.get)(&inner.wrapped);
        let changed = {
            let mut cached = inner.cached.borrow_mut();
            let changed = cached
                .as_ref()
                .is_some_and(|prev| !prev.eq_value(value.as_ref()));
            *cached = Some(value.clone());
            changed
        };
        if changed {
            tracing::trace!(property = inner.name, "property changed");
            let hub = Rc::clone(&inner.hub);
            let name = inner.name;
            inner.context.defer(move || {
                hub.emit(&PropertyChanged { name, value });
            });
        }
    }
}

/// Tracked surrogate for one property of one wrapped object.
///
/// Cheaply cloneable handle; clones observe the same cache and node.
pub struct PropertyWrapper<T: Bindable> {
    inner: Rc<WrapperInner<T>>,
}

impl<T: Bindable> Clone for PropertyWrapper<T> {
    fn clone(&self) -> Self {
        PropertyWrapper {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Bindable> PropertyWrapper<T> {
    pub(crate) fn new(
        wrapped: Rc<T>,
        context: Rc<TrackingContext>,
        hub: Rc<NotificationHub>,
        descriptor_id: DescriptorId,
        descriptor: &PropertyDescriptor<T>,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<WrapperInner<T>>| {
            let weak = weak.clone();
            let node = DependencyNode::new(move || {
                if let Some(inner) = weak.upgrade() {
                    WrapperInner::reevaluate(&inner);
                }
            });
            WrapperInner {
                descriptor_id,
                name: descriptor.name,
                get: descriptor.get,
                wrapped,
                context,
                hub,
                node,
                cached: RefCell::new(None),
                disposed: Cell::new(false),
            }
        });
        PropertyWrapper { inner }
    }

    /// Identity of the descriptor this wrapper was built from.
    #[must_use]
    pub fn descriptor_id(&self) -> DescriptorId {
        self.inner.descriptor_id
    }

    /// Descriptor name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Re-derive this property's dependency edges against the current
    /// wrapped state, recording the read.
    ///
    /// If nothing changed since the last run this is O(1); otherwise the
    /// accessor re-runs in place and a change notification is queued.
    /// No-op once disposed.
    pub fn refresh(&self) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner.node.record_read();
    }

    /// Force re-evaluation on the next refresh, as if a tracked dependency
    /// had changed.
    ///
    /// Used when the wrapped object changed in ways the graph cannot see
    /// (state mutated off-thread and announced by a remote signal).
    pub fn invalidate(&self) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner.node.mark_stale();
    }

    /// Current cached value, refreshing first. `None` only if the wrapper
    /// was disposed before its first evaluation.
    #[must_use]
    pub fn value(&self) -> Option<BoxedValue> {
        self.refresh();
        self.inner.cached.borrow().clone()
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Release the wrapper's dependency edges. Idempotent; further
    /// `refresh` calls are no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.get() {
            return;
        }
        tracing::trace!(property = self.inner.name, "wrapper disposed");
        self.inner.node.dispose();
        self.inner.disposed.set(true);
    }
}

impl<T: Bindable> std::fmt::Debug for PropertyWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyWrapper")
            .field("name", &self.inner.name)
            .field("cached", &self.inner.cached.borrow())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ClassMetadata;
    use crate::value::{boxed, downcast};
    use filament_reactive::Tracked;

    struct Counter {
        count: Tracked<i64>,
    }

    impl Bindable for Counter {
        fn descriptors() -> Vec<PropertyDescriptor<Self>> {
            vec![PropertyDescriptor {
                name: "count",
                get: |c| boxed(c.count.get()),
            }]
        }
    }

    fn make_wrapper(wrapped: Rc<Counter>) -> (PropertyWrapper<Counter>, Rc<NotificationHub>) {
        let context = TrackingContext::for_tests();
        let hub = NotificationHub::new();
        let metadata = ClassMetadata::<Counter>::resolve().unwrap();
        let wrapper = PropertyWrapper::new(
            wrapped,
            context,
            Rc::clone(&hub),
            metadata.descriptor_id(0),
            &metadata.descriptors()[0],
        );
        (wrapper, hub)
    }

    #[test]
    fn value_tracks_the_wrapped_object() {
        let counter = Rc::new(Counter {
            count: Tracked::new(1),
        });
        let (wrapper, _hub) = make_wrapper(Rc::clone(&counter));

        let v = wrapper.value().unwrap();
        assert_eq!(downcast::<i64>(&v), Some(&1));

        counter.count.set(7);
        let v = wrapper.value().unwrap();
        assert_eq!(downcast::<i64>(&v), Some(&7));
    }

    #[test]
    fn initial_evaluation_is_silent() {
        let counter = Rc::new(Counter {
            count: Tracked::new(1),
        });
        let (wrapper, hub) = make_wrapper(counter);

        let fired = Rc::new(Cell::new(0u32));
        let fired_clone = Rc::clone(&fired);
        let _sub = hub.subscribe(move |_| fired_clone.set(fired_clone.get() + 1));

        wrapper.refresh();
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn change_notifies_with_new_value() {
        let counter = Rc::new(Counter {
            count: Tracked::new(1),
        });
        let (wrapper, hub) = make_wrapper(Rc::clone(&counter));
        wrapper.refresh();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = hub.subscribe(move |change| {
            let v = *downcast::<i64>(&change.value).unwrap();
            seen_clone.borrow_mut().push((change.name, v));
        });

        counter.count.set(2);
        wrapper.refresh();
        assert_eq!(*seen.borrow(), vec![("count", 2)]);
    }

    #[test]
    fn unchanged_reevaluation_stays_silent() {
        // The sentry suppresses equal sets, but even a forced re-run with an
        // equal produced value must not notify.
        let counter = Rc::new(Counter {
            count: Tracked::new(5),
        });
        let (wrapper, hub) = make_wrapper(Rc::clone(&counter));
        wrapper.refresh();

        let fired = Rc::new(Cell::new(0u32));
        let fired_clone = Rc::clone(&fired);
        let _sub = hub.subscribe(move |_| fired_clone.set(fired_clone.get() + 1));

        counter.count.set(6);
        counter.count.set(5);
        wrapper.refresh();
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn disposed_wrapper_is_inert() {
        let counter = Rc::new(Counter {
            count: Tracked::new(1),
        });
        let (wrapper, hub) = make_wrapper(Rc::clone(&counter));
        wrapper.refresh();

        let fired = Rc::new(Cell::new(0u32));
        let fired_clone = Rc::clone(&fired);
        let _sub = hub.subscribe(move |_| fired_clone.set(fired_clone.get() + 1));

        wrapper.dispose();
        assert!(wrapper.is_disposed());

        counter.count.set(9);
        wrapper.refresh();
        assert_eq!(fired.get(), 0);

        // Idempotent.
        wrapper.dispose();
        assert!(wrapper.is_disposed());
    }
}
