#![forbid(unsafe_code)]

//! Error taxonomy for the binding layer.
//!
//! Two conditions are errors: a type with no usable descriptor table
//! (fatal to proxy construction) and a descriptor lookup that finds
//! anything other than exactly one wrapper (a programming defect, surfaced
//! hard rather than softened). Capability absence and repeated disposal are
//! deliberately not errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

#[derive(Debug, Error)]
pub enum BindError {
    /// The wrapped type has no resolvable property set. Fatal to proxy
    /// construction; never retried internally, never cached.
    #[error("metadata resolution failed for {type_name}: {reason}")]
    MetadataResolution { type_name: String, reason: String },

    /// Descriptor metadata and the wrapper collection fell out of 1:1
    /// correspondence. Programming defect; surfaced immediately.
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },
}

impl BindError {
    #[must_use]
    pub fn metadata(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetadataResolution {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }
}
