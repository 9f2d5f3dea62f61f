//! Error kinds raised while normalising, featurising and persisting calculation records.
//!
//! All fallible functions in this crate return [`anyhow::Error`]. Failures with a well-defined
//! meaning are raised as an [`XcFeatError`] inside the `anyhow` error so that callers can
//! recover the kind with [`anyhow::Error::downcast_ref`].

use std::fmt;

use itertools::Itertools;

/// Enumerated type for the failure kinds of this crate.
#[derive(Clone, PartialEq)]
pub enum XcFeatError {
    /// The calculation result does not match any of the recognised array layouts, or uses a
    /// configuration that is not supported (*e.g.* symmetry-adapted $`k`$-points).
    UnsupportedLayout(String),

    /// Range-separation parameters were requested on reload that have no precomputed feature
    /// tensor slice in the container.
    MissingPrecomputedFeature {
        /// The range-separation parameters requested by the caller.
        requested: Vec<f64>,

        /// The range-separation parameters stored in the container.
        available: Vec<f64>,
    },

    /// A container group or reaction constituent is not of a recognised record type.
    RecordTypeError(String),

    /// A container group lacks a required field or holds a field of the wrong shape.
    MalformedContainer(String),

    /// A group with the same name already exists in the container.
    DuplicateGroup(String),
}

impl fmt::Display for XcFeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedLayout(msg) => write!(f, "Unsupported calculation layout: {msg}"),
            Self::MissingPrecomputedFeature {
                requested,
                available,
            } => write!(
                f,
                "Feature tensors for omega = [{}] were not all precomputed (available: [{}]).",
                requested.iter().map(|w| format!("{w}")).join(", "),
                available.iter().map(|w| format!("{w}")).join(", "),
            ),
            Self::RecordTypeError(msg) => write!(f, "Unrecognised record type: {msg}"),
            Self::MalformedContainer(msg) => write!(f, "Malformed container: {msg}"),
            Self::DuplicateGroup(name) => {
                write!(f, "Group `{name}` already exists in the container.")
            }
        }
    }
}

impl fmt::Debug for XcFeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XcFeatError({self})")
    }
}

impl std::error::Error for XcFeatError {}
