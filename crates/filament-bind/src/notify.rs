#![forbid(unsafe_code)]

//! Property-changed notification plumbing.
//!
//! Each proxy owns one [`NotificationHub`]; its property wrappers emit into
//! it (via the dispatch shim, so listeners always run on the owning thread)
//! and binding layers listen through RAII subscriptions.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::value::BoxedValue;

/// One observed property change.
#[derive(Debug, Clone)]
pub struct PropertyChanged {
    /// Descriptor name of the property that changed.
    pub name: &'static str,
    /// The value after the change.
    pub value: BoxedValue,
}

pub(crate) struct NotificationHub {
    listeners: RefCell<Vec<(u64, Rc<dyn Fn(&PropertyChanged)>)>>,
    next_id: Cell<u64>,
}

impl NotificationHub {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(NotificationHub {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        })
    }

    pub(crate) fn subscribe(self: &Rc<Self>, listener: impl Fn(&PropertyChanged) + 'static) -> PropertyChangedSubscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        PropertyChangedSubscription {
            hub: Rc::downgrade(self),
            id,
        }
    }

    /// Deliver `change` to every listener, in registration order.
    ///
    /// Listeners are snapshotted first so a listener may subscribe or drop
    /// subscriptions re-entrantly.
    pub(crate) fn emit(&self, change: &PropertyChanged) {
        let snapshot: Vec<Rc<dyn Fn(&PropertyChanged)>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            listener(change);
        }
    }
}

/// RAII guard for a property-changed listener. Dropping it removes the
/// listener before the next notification cycle.
pub struct PropertyChangedSubscription {
    hub: Weak<NotificationHub>,
    id: u64,
}

impl Drop for PropertyChangedSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for PropertyChangedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyChangedSubscription")
            .field("id", &self.id)
            .finish()
    }
}
