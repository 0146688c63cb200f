#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident record types shared across the case-map pipeline.
//!
//! An [`IncidentRecord`] is one row of a daily snapshot: a stable
//! [`IncidentId`], the raw [`PostalAddress`] as reported, and, once the
//! address has been geocoded, a [`Resolution`] and a `Place` label.
//! Records are never mutated in place; resolving or classifying a record
//! produces a new one.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Stable identifier of an incident. Unique within one snapshot and the
/// join key between the baseline and today's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IncidentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Raw postal fields exactly as they appear in a snapshot.
///
/// Nothing here is validated or normalized; change detection compares
/// `address` byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    /// Street address (e.g. "123 Main St").
    pub address: String,
    /// Apartment or unit number, often empty.
    pub apt_no: String,
    /// City name.
    pub city: String,
    /// State abbreviation.
    pub state: String,
    /// ZIP code, kept as text so leading zeros survive.
    pub zip: String,
}

impl PostalAddress {
    /// Builds the single-line geocoder query:
    /// `"{address}, {city}, {state} {zip}"`.
    #[must_use]
    pub fn lookup_query(&self) -> String {
        format!(
            "{}, {}, {} {}",
            self.address, self.city, self.state, self.zip
        )
    }
}

/// Geocoder confidence, an integer from 0 to 100.
///
/// Only [`ConfidenceScore::EXACT`] is accepted automatically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct ConfidenceScore(u8);

impl ConfidenceScore {
    /// The only score that is accepted without review.
    pub const EXACT: Self = Self(100);

    /// Creates a score from an integer value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is greater than 100.
    pub const fn new(value: u8) -> Result<Self, InvalidScoreError> {
        if value > 100 {
            return Err(InvalidScoreError { value });
        }
        Ok(Self(value))
    }

    /// Converts a provider-reported score, which may be fractional.
    ///
    /// Truncates toward zero and clamps to 0-100, so `99.9` becomes `99`
    /// and only a genuine `100` is [`exact`](Self::is_exact). `NaN` maps
    /// to 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_provider(raw: f64) -> Self {
        if raw.is_nan() {
            return Self(0);
        }
        Self(raw.clamp(0.0, 100.0).trunc() as u8)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether this score qualifies for automatic acceptance.
    #[must_use]
    pub const fn is_exact(self) -> bool {
        self.0 == Self::EXACT.0
    }
}

impl TryFrom<u8> for ConfidenceScore {
    type Error = InvalidScoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfidenceScore> for u8 {
    fn from(score: ConfidenceScore) -> Self {
        score.0
    }
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a confidence score is outside 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidScoreError {
    /// The rejected value.
    pub value: u8,
}

impl fmt::Display for InvalidScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid confidence score {}: expected 0-100", self.value)
    }
}

impl std::error::Error for InvalidScoreError {}

/// The geocoded form of an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Canonical address returned by the provider.
    pub matched_address: String,
    /// Postal code of the matched address, when the provider reports one.
    pub matched_zip: Option<String>,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Provider confidence in the match.
    pub confidence_score: ConfidenceScore,
}

/// One incident as it appears in a snapshot or in the authoritative table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Join key.
    pub id: IncidentId,
    /// Raw postal fields.
    pub address: PostalAddress,
    /// Geocoding result, absent for raw snapshot rows.
    pub resolution: Option<Resolution>,
    /// Jurisdiction label. `None` when unresolved or outside every boundary.
    pub place: Option<String>,
}

impl IncidentRecord {
    /// A raw snapshot row with no resolved fields.
    #[must_use]
    pub const fn snapshot(id: IncidentId, address: PostalAddress) -> Self {
        Self {
            id,
            address,
            resolution: None,
            place: None,
        }
    }

    /// A fully resolved row.
    #[must_use]
    pub const fn resolved(
        id: IncidentId,
        address: PostalAddress,
        resolution: Resolution,
        place: Option<String>,
    ) -> Self {
        Self {
            id,
            address,
            resolution: Some(resolution),
            place,
        }
    }

    /// Returns a copy of this record carrying `resolution` and `place`.
    /// Any previous resolution is discarded, not merged.
    #[must_use]
    pub fn with_resolution(&self, resolution: Resolution, place: Option<String>) -> Self {
        Self {
            id: self.id.clone(),
            address: self.address.clone(),
            resolution: Some(resolution),
            place,
        }
    }

    /// Confidence of the current resolution, if any.
    #[must_use]
    pub fn confidence_score(&self) -> Option<ConfidenceScore> {
        self.resolution.as_ref().map(|r| r.confidence_score)
    }
}

/// Whether a record needing resolution is new or had its address change.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ChangeKind {
    /// ID absent from the baseline.
    New,
    /// ID present in the baseline with a different `Address`.
    Changed,
}

/// Final disposition of one record of today's snapshot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ReconciliationOutcome {
    /// Carried forward from the baseline without geocoding.
    Unchanged,
    /// New record accepted at full confidence.
    NewConfident,
    /// Changed record re-resolved at full confidence.
    ChangedConfident,
    /// Resolved below full confidence; routed to review.
    NeedsReview,
    /// Provider returned no candidate; routed to review.
    Failed,
}

impl ReconciliationOutcome {
    /// Outcome of a record accepted into the authoritative table.
    #[must_use]
    pub const fn confident(change: ChangeKind) -> Self {
        match change {
            ChangeKind::New => Self::NewConfident,
            ChangeKind::Changed => Self::ChangedConfident,
        }
    }

    /// Whether this outcome places the record on the review list.
    #[must_use]
    pub const fn needs_review(self) -> bool {
        matches!(self, Self::NeedsReview | Self::Failed)
    }
}
