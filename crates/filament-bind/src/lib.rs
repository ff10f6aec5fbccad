#![forbid(unsafe_code)]

//! Object-proxy binding layer for Filament.
//!
//! Takes a plain domain object and produces a tracked, bindable surrogate:
//! an [`ObjectProxy`] whose properties notify the dependency graph when
//! read, and whose state stays consistent with the wrapped object across
//! reads, lookups, disposal, and deferred notification dispatch.
//!
//! # Pieces
//!
//! - [`Bindable`] + [`PropertyDescriptor`]: a type's registration-time
//!   descriptor table, memoized per type in [`ClassMetadata`].
//! - [`PropertyWrapper`]: per-property tracking and change notification.
//! - [`ObjectProxy`]: the surrogate; composition, lookup, aggregate
//!   refresh, identity, capability passthrough, disposal.
//! - [`DispatchContext`] / [`TrackingContext`]: the explicit execution
//!   context and the shared session handle it rides in.
//! - [`RowValidation`] / [`EditLifecycle`]: optional capabilities of
//!   wrapped objects, forwarded verbatim when present.
//!
//! # Threading
//!
//! Proxies are single-owner: everything that mutates proxy state runs on
//! the constructing thread. Background threads interact only through
//! [`ObjectProxy::remote_signal`] and the dispatch shim's wake tokens.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use filament_bind::{
//!     Bindable, ObjectProxy, PropertyDescriptor, TrackingContext, boxed,
//! };
//! use filament_reactive::Tracked;
//!
//! struct Sensor {
//!     reading: Tracked<f64>,
//! }
//!
//! impl Bindable for Sensor {
//!     fn descriptors() -> Vec<PropertyDescriptor<Self>> {
//!         vec![PropertyDescriptor {
//!             name: "reading",
//!             get: |s| boxed(s.reading.get()),
//!         }]
//!     }
//! }
//!
//! let context = TrackingContext::for_tests();
//! let sensor = Rc::new(Sensor { reading: Tracked::new(0.5) });
//! let proxy = ObjectProxy::new(Rc::clone(&sensor), context).unwrap();
//!
//! proxy.refresh();
//! let wrapper = proxy.lookup_by_name("reading").unwrap();
//! assert!(wrapper.value().is_some());
//! ```

pub mod capability;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod metadata;
pub mod notify;
pub mod proxy;
pub mod value;
pub mod wrapper;

pub use capability::{EditLifecycle, RowValidation};
pub use context::TrackingContext;
pub use dispatch::{DispatchContext, RemoteDispatch, WakeToken};
pub use error::{BindError, Result};
pub use metadata::{Bindable, ClassMetadata, DescriptorId, PropertyDescriptor};
pub use notify::{PropertyChanged, PropertyChangedSubscription};
pub use proxy::ObjectProxy;
pub use value::{BindValue, BoxedValue, boxed, downcast};
pub use wrapper::PropertyWrapper;
