#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incremental reconciliation of daily incident snapshots.
//!
//! Given the previous authoritative table (the *baseline*) and today's
//! snapshot, a run:
//!
//! 1. partitions today's IDs into new, changed, and unchanged
//!    ([`diff`]);
//! 2. geocodes only the new and changed records, one rate-limited call
//!    each ([`resolve`]);
//! 3. assigns a place to every full-confidence result
//!    (`case_map_spatial::SpatialClassifier`);
//! 4. merges unchanged baseline rows with the accepted results and routes
//!    everything else to a review list ([`merge`]).
//!
//! [`pipeline::reconcile`] runs all four steps. Fatal conditions (provider
//! failure, duplicate IDs, overlapping boundaries) abort before anything is
//! produced, and [`tsv::write_outputs`] only publishes files once both
//! tables have been written in full.

pub mod diff;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod table;
pub mod tsv;

use case_map_geocoder::GeocodeError;
use case_map_incident_models::IncidentId;
use case_map_spatial::SpatialError;

pub use pipeline::{Reconciliation, ReconcileOptions, RunSummary, reconcile};
pub use table::{IncidentTable, VerbatimRow};

/// Errors that abort a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// An `IncidentID` appeared twice in one snapshot.
    #[error("Duplicate IncidentID '{id}' in {table}")]
    DuplicateIncidentId {
        /// Which table held the duplicate (usually its path).
        table: String,
        /// The repeated identifier.
        id: IncidentId,
    },

    /// A row had a blank `IncidentID`.
    #[error("Empty IncidentID in {table} at line {line}")]
    EmptyIncidentId {
        /// Which table held the row.
        table: String,
        /// 1-based line number, counting the header.
        line: usize,
    },

    /// The geocoding provider is unusable.
    #[error("Geocoding provider failed: {0}")]
    Geocode(#[from] GeocodeError),

    /// Boundary lookup failed (overlapping boundaries).
    #[error("Boundary integrity error: {0}")]
    Spatial(#[from] SpatialError),

    /// A delimited file could not be read or written.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path of the file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// File system error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The merged tables broke a partition invariant.
    #[error("Reconciliation invariant violated: {message}")]
    Invariant {
        /// What went wrong.
        message: String,
    },
}
