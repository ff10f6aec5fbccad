#![forbid(unsafe_code)]

//! Optional capabilities of wrapped domain objects.
//!
//! A wrapped object may additionally expose row/field validation or an edit
//! transaction lifecycle. The proxy probes for each capability once at
//! construction (via the [`Bindable`](crate::Bindable) hooks) and forwards
//! calls verbatim when present. Absence is a neutral default, never an
//! error: no validation capability means "no error text", no edit
//! capability means every transaction call is a no-op.

/// Row and field validation, forwarded verbatim by the proxy.
pub trait RowValidation {
    /// Error text describing the whole object, or `None` when valid.
    fn row_error(&self) -> Option<String>;

    /// Error text for one named field, or `None` when that field is valid
    /// or unknown.
    fn field_error(&self, field: &str) -> Option<String>;
}

/// Edit-transaction lifecycle, forwarded verbatim by the proxy.
///
/// Implementations own all transaction state; the proxy is a pure
/// passthrough. Methods take `&self` because wrapped objects are shared
/// behind `Rc`; implementors use interior mutability for snapshot state.
pub trait EditLifecycle {
    /// Snapshot current state for a possible rollback.
    fn begin_edit(&self);

    /// Roll back to the last snapshot.
    fn cancel_edit(&self);

    /// Discard the snapshot, keeping current state.
    fn commit_edit(&self);
}
