#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding for case-map incident records.
//!
//! Converts a record's postal fields to coordinates plus a 0-100
//! confidence score through a provider configured via TOML files in
//! `services/` (see [`service_registry`]). Every provider call goes
//! through a [`rate_limit::RateLimitedGeocoder`], which serializes calls
//! and enforces a minimum delay between them to respect the provider's
//! shared quota.
//!
//! Results are split three ways by [`resolve`]:
//!
//! - `Ok(GeocodeOutcome::Confident)`: score of exactly 100.
//! - `Ok(GeocodeOutcome::LowConfidence)` / `Ok(GeocodeOutcome::Failed)`:
//!   per-record problems that only affect that one record.
//! - `Err(GeocodeError)`: the provider itself is unusable (network,
//!   authentication, malformed response). Callers abort the run.

pub mod arcgis;
pub mod rate_limit;
pub mod service_registry;

use async_trait::async_trait;
use case_map_incident_models::{ConfidenceScore, PostalAddress, Resolution};
use thiserror::Error;

/// A candidate returned by a geocoding provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    /// The matched/canonical address returned by the provider.
    pub matched_address: String,
    /// Postal code of the match, if known.
    pub matched_zip: Option<String>,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Provider confidence in the match.
    pub score: ConfidenceScore,
}

impl GeocodedAddress {
    /// Converts this candidate into the record-level [`Resolution`].
    #[must_use]
    pub fn into_resolution(self) -> Resolution {
        Resolution {
            matched_address: self.matched_address,
            matched_zip: self.matched_zip,
            longitude: self.longitude,
            latitude: self.latitude,
            confidence_score: self.score,
        }
    }
}

/// Errors that make the geocoding provider unusable.
///
/// None of these describe a single unmatched address; a miss is
/// `Ok(None)` from [`Geocoder::geocode`].
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The provider answered with an error (bad token, bad request,
    /// server error).
    #[error("Provider error {code}: {message}")]
    Provider {
        /// Provider or HTTP status code.
        code: i64,
        /// Provider-supplied message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// A geocoding provider.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Short provider name used in log messages.
    fn name(&self) -> &str;

    /// Resolves a single-line address query to its best candidate.
    ///
    /// Returns `Ok(None)` when the provider has no candidate for this
    /// address.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the provider itself fails.
    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError>;
}

/// Classification of one provider answer.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    /// Score of exactly 100; eligible for spatial classification.
    Confident(GeocodedAddress),
    /// Resolved below 100; kept for human review only.
    LowConfidence(GeocodedAddress),
    /// No candidate at all.
    Failed,
}

impl GeocodeOutcome {
    /// Classifies a provider candidate by its score.
    #[must_use]
    pub fn from_candidate(candidate: Option<GeocodedAddress>) -> Self {
        match candidate {
            Some(c) if c.score.is_exact() => Self::Confident(c),
            Some(c) => Self::LowConfidence(c),
            None => Self::Failed,
        }
    }

    /// The resolved fields, whatever the confidence.
    #[must_use]
    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            Self::Confident(c) | Self::LowConfidence(c) => Some(c.clone().into_resolution()),
            Self::Failed => None,
        }
    }
}

/// Geocodes one postal address and classifies the answer.
///
/// The query is `"{address}, {city}, {state} {zip}"`. The provider is
/// called exactly once.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the provider fails. Unmatched addresses are
/// reported as [`GeocodeOutcome::Failed`], not as errors.
pub async fn resolve(
    geocoder: &dyn Geocoder,
    address: &PostalAddress,
) -> Result<GeocodeOutcome, GeocodeError> {
    let query = address.lookup_query();
    let candidate = geocoder.geocode(&query).await?;

    match &candidate {
        None => log::debug!("{}: no match for '{query}'", geocoder.name()),
        Some(c) if !c.score.is_exact() => log::debug!(
            "{}: low confidence ({}) for '{query}' -> '{}'",
            geocoder.name(),
            c.score,
            c.matched_address
        ),
        Some(_) => {}
    }

    Ok(GeocodeOutcome::from_candidate(candidate))
}
