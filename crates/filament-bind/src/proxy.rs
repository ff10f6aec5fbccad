#![forbid(unsafe_code)]

//! The object proxy: a tracked, bindable surrogate for one wrapped domain
//! instance.
//!
//! A proxy composes the per-property wrappers for its wrapped object's
//! descriptor table with one aggregate [`DependencyNode`] whose re-run
//! action refreshes every wrapper in construction order. Reading the proxy
//! (via [`refresh`](ObjectProxy::refresh)) records it as observed; when any
//! wrapped state changes, staleness chains from the mutated sentry through
//! the affected wrapper node to the aggregate node, which defers exactly
//! one refresh onto the owning thread per staleness episode.
//!
//! # Identity
//!
//! Equality, hashing, and display all delegate to the wrapped object, and
//! keep doing so after disposal: stale proxies must still compare correctly
//! against their former wrapped object so tracking collections can evict
//! them. Proxies over different wrapped types are different Rust types and
//! cannot be compared at all, which enforces the concrete-type check by
//! construction.
//!
//! # Disposal
//!
//! [`dispose`](ObjectProxy::dispose) cascades to every wrapper, then the
//! aggregate node, then flips the flag. An already-scheduled refresh that
//! runs after disposal finds the flag set and does nothing. Children's
//! dispose calls are idempotent; the proxy adds no guard beyond the flag.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use filament_reactive::{DependencyNode, InvalidationSignal};

use crate::capability::{EditLifecycle, RowValidation};
use crate::context::TrackingContext;
use crate::dispatch::WakeToken;
use crate::error::{BindError, Result};
use crate::metadata::{Bindable, ClassMetadata, DescriptorId};
use crate::notify::{NotificationHub, PropertyChanged, PropertyChangedSubscription};
use crate::wrapper::PropertyWrapper;

/// Tracked surrogate for one wrapped domain instance within one tracking
/// session.
pub struct ObjectProxy<T: Bindable> {
    id: u64,
    wrapped: Rc<T>,
    context: Rc<TrackingContext>,
    metadata: Rc<ClassMetadata<T>>,
    /// `None` only during construction; fixed afterwards.
    wrappers: RefCell<Option<Rc<[PropertyWrapper<T>]>>>,
    aggregate: DependencyNode,
    hub: Rc<NotificationHub>,
    has_validation: bool,
    has_editable: bool,
    wake_token: Cell<Option<WakeToken>>,
    disposed: Cell<bool>,
}

impl<T: Bindable> ObjectProxy<T> {
    /// Wrap `wrapped` in a new proxy bound to `context`.
    ///
    /// Resolves the type's metadata (cached per type, so reflection-style
    /// cost is paid once no matter how many instances are wrapped), builds
    /// one property wrapper per descriptor, and wires the aggregate node.
    /// No dependency edges are recorded yet; recording happens lazily on
    /// the first [`refresh`](Self::refresh).
    ///
    /// # Errors
    ///
    /// [`BindError::MetadataResolution`] when the type has no usable
    /// descriptor table. No partial proxy is returned.
    pub fn new(wrapped: Rc<T>, context: Rc<TrackingContext>) -> Result<Rc<Self>> {
        let metadata = ClassMetadata::<T>::resolve()?;
        let hub = NotificationHub::new();
        let has_validation = wrapped.as_validation().is_some();
        let has_editable = wrapped.as_editable().is_some();

        let proxy = Rc::new_cyclic(|weak: &Weak<ObjectProxy<T>>| {
            let aggregate = DependencyNode::new({
                let weak = weak.clone();
                move || {
                    if let Some(proxy) = weak.upgrade() {
                        proxy.refresh_wrappers();
                    }
                }
            });
            ObjectProxy {
                id: context.next_proxy_id(),
                wrapped: Rc::clone(&wrapped),
                context: Rc::clone(&context),
                metadata: Rc::clone(&metadata),
                wrappers: RefCell::new(None),
                aggregate,
                hub: Rc::clone(&hub),
                has_validation,
                has_editable,
                wake_token: Cell::new(None),
                disposed: Cell::new(false),
            }
        });

        let built: Vec<PropertyWrapper<T>> = metadata
            .descriptors()
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                PropertyWrapper::new(
                    Rc::clone(&wrapped),
                    Rc::clone(&context),
                    Rc::clone(&hub),
                    metadata.descriptor_id(index),
                    descriptor,
                )
            })
            .collect();
        *proxy.wrappers.borrow_mut() = Some(built.into());

        // One deferred refresh per aggregate staleness episode.
        let hook_weak = Rc::downgrade(&proxy);
        let hook_context = Rc::clone(&context);
        proxy.aggregate.set_invalidation_hook(move || {
            let weak = hook_weak.clone();
            hook_context.defer(move || {
                if let Some(proxy) = weak.upgrade() {
                    if !proxy.is_disposed() {
                        proxy.refresh();
                    }
                }
            });
        });

        tracing::debug!(
            proxy = proxy.id,
            ty = std::any::type_name::<T>(),
            properties = metadata.len(),
            "proxy created"
        );
        Ok(proxy)
    }

    /// Aggregate re-run action: refresh every wrapper in construction
    /// order. Refreshes are independent per property.
    fn refresh_wrappers(&self) {
        if self.disposed.get() {
            return;
        }
        let wrappers = self.wrappers.borrow().clone();
        let Some(wrappers) = wrappers else {
            return;
        };
        for wrapper in wrappers.iter() {
            wrapper.refresh();
        }
    }

    /// Owning-thread half of a remote invalidation: the wrapped object
    /// changed in ways the graph cannot see, so every property must
    /// re-derive. Absorbs the latch silently first so wrapper invalidation
    /// does not queue a second refresh through the aggregate hook.
    fn remote_refresh(&self) {
        if self.disposed.get() {
            return;
        }
        self.aggregate.absorb_remote_stale();
        if let Some(wrappers) = self.wrappers.borrow().clone() {
            for wrapper in wrappers.iter() {
                wrapper.invalidate();
            }
        }
        self.refresh();
    }

    /// Session-unique proxy id (diagnostics only).
    #[must_use]
    pub fn proxy_id(&self) -> u64 {
        self.id
    }

    /// The wrapped domain instance.
    #[must_use]
    pub fn wrapped(&self) -> &Rc<T> {
        &self.wrapped
    }

    /// The enclosing tracking session.
    #[must_use]
    pub fn context(&self) -> &Rc<TrackingContext> {
        &self.context
    }

    /// The wrapped type's descriptor table.
    #[must_use]
    pub fn metadata(&self) -> &Rc<ClassMetadata<T>> {
        &self.metadata
    }

    /// Record the proxy as observed. If the aggregate node is stale, its
    /// re-run action executes synchronously in place before returning.
    pub fn refresh(&self) {
        self.aggregate.record_read();
    }

    /// Find the wrapper built from descriptor `id`.
    ///
    /// Returns `Ok(None)` only while the wrapper collection is not yet
    /// populated (reentrant calls during construction). Otherwise exactly
    /// one wrapper must match.
    ///
    /// # Errors
    ///
    /// [`BindError::InvariantViolation`] when zero or more than one wrapper
    /// matches: metadata and the wrapper collection are expected to be in
    /// 1:1 correspondence, and desynchronization is a programming defect.
    pub fn lookup_by_descriptor(&self, id: DescriptorId) -> Result<Option<PropertyWrapper<T>>> {
        let guard = self.wrappers.borrow();
        let Some(wrappers) = guard.as_ref() else {
            return Ok(None);
        };
        let mut found = None;
        let mut matches = 0usize;
        for wrapper in wrappers.iter() {
            if wrapper.descriptor_id() == id {
                matches += 1;
                if found.is_none() {
                    found = Some(wrapper.clone());
                }
            }
        }
        match matches {
            1 => Ok(found),
            0 => Err(BindError::invariant(format!(
                "no wrapper matches descriptor index {} on {}",
                id.index(),
                std::any::type_name::<T>()
            ))),
            n => Err(BindError::invariant(format!(
                "{n} wrappers match descriptor index {} on {}",
                id.index(),
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Find the first wrapper whose descriptor name is `name`, or `None`.
    ///
    /// The tolerant convenience path for late-bound binding expressions:
    /// a miss is never an error.
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<PropertyWrapper<T>> {
        self.wrappers
            .borrow()
            .as_ref()
            .and_then(|wrappers| wrappers.iter().find(|w| w.name() == name).cloned())
    }

    /// Schedule `action` per the session's dispatch mode: synchronously
    /// under a test harness, otherwise FIFO onto the owning thread.
    pub fn defer(&self, action: impl FnOnce() + 'static) {
        self.context.defer(action);
    }

    /// Listen for property-changed notifications from this proxy's
    /// wrappers. Listeners run on the owning thread.
    pub fn on_property_changed(
        &self,
        listener: impl Fn(&PropertyChanged) + 'static,
    ) -> PropertyChangedSubscription {
        self.hub.subscribe(listener)
    }

    /// Cross-thread invalidation handle for this proxy.
    ///
    /// `signal()` from any thread latches the aggregate node stale and
    /// posts a wake token; the owning thread's dispatch pump absorbs the
    /// latch and runs one refresh. Signals arriving after disposal are
    /// inert, and a handle obtained after disposal registers no waker.
    pub fn remote_signal(self: &Rc<Self>) -> InvalidationSignal {
        if self.disposed.get() {
            return self.aggregate.remote_signal(|| {});
        }
        let token = if let Some(token) = self.wake_token.get() {
            token
        } else {
            let weak = Rc::downgrade(self);
            let token = self.context.dispatch().register_waker(move || {
                if let Some(proxy) = weak.upgrade() {
                    proxy.remote_refresh();
                }
            });
            self.wake_token.set(Some(token));
            token
        };
        let remote = self.context.dispatch().remote_handle();
        self.aggregate.remote_signal(move || remote.post(token))
    }

    /// Whole-object validation error, forwarded verbatim from the wrapped
    /// object's validation capability; `None` unconditionally when the
    /// capability is absent.
    #[must_use]
    pub fn row_error(&self) -> Option<String> {
        if !self.has_validation {
            return None;
        }
        self.wrapped.as_validation().and_then(RowValidation::row_error)
    }

    /// Per-field validation error; same forwarding rules as
    /// [`row_error`](Self::row_error).
    #[must_use]
    pub fn field_error(&self, field: &str) -> Option<String> {
        if !self.has_validation {
            return None;
        }
        self.wrapped
            .as_validation()
            .and_then(|v| v.field_error(field))
    }

    /// Forwarded edit-transaction begin; no-op without the capability.
    pub fn begin_edit(&self) {
        if self.has_editable {
            if let Some(editable) = self.wrapped.as_editable() {
                editable.begin_edit();
            }
        }
    }

    /// Forwarded edit-transaction cancel; no-op without the capability.
    pub fn cancel_edit(&self) {
        if self.has_editable {
            if let Some(editable) = self.wrapped.as_editable() {
                editable.cancel_edit();
            }
        }
    }

    /// Forwarded edit-transaction commit; no-op without the capability.
    pub fn commit_edit(&self) {
        if self.has_editable {
            if let Some(editable) = self.wrapped.as_editable() {
                editable.commit_edit();
            }
        }
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Tear down all derived tracking state.
    ///
    /// Disposes every wrapper in construction order, then the aggregate
    /// node (so an already-scheduled refresh becomes a no-op when it runs),
    /// unregisters the remote waker, and flips the flag. Identity survives:
    /// a disposed proxy still compares and hashes by its wrapped object.
    pub fn dispose(&self) {
        if let Some(wrappers) = self.wrappers.borrow().clone() {
            for wrapper in wrappers.iter() {
                wrapper.dispose();
            }
        }
        self.aggregate.dispose();
        if let Some(token) = self.wake_token.take() {
            self.context.dispatch().unregister_waker(token);
        }
        self.disposed.set(true);
        tracing::debug!(proxy = self.id, "proxy disposed");
    }
}

impl<T: Bindable + PartialEq> PartialEq for ObjectProxy<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.wrapped, &other.wrapped) || *self.wrapped == *other.wrapped
    }
}

impl<T: Bindable + Eq> Eq for ObjectProxy<T> {}

impl<T: Bindable + std::hash::Hash> std::hash::Hash for ObjectProxy<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.wrapped.hash(state);
    }
}

impl<T: Bindable + std::fmt::Display> std::fmt::Display for ObjectProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.wrapped.fmt(f)
    }
}

impl<T: Bindable> std::fmt::Debug for ObjectProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("id", &self.id)
            .field("ty", &std::any::type_name::<T>())
            .field("properties", &self.metadata.len())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
