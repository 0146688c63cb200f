//! Place classification for geocoded records.
//!
//! Containment against the [`BoundarySet`] decides the place, then the
//! configured address overrides are applied on top. An override exists
//! for institutional addresses (e.g. a county jail) that must always be
//! attributed to the institution whatever polygon the point falls in.

use crate::{BoundarySet, SpatialError};

/// Forces `place` for records whose raw address equals `address` exactly
/// (case-sensitive, no normalization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOverride {
    /// Raw street address to match.
    pub address: String,
    /// Label assigned to matching records.
    pub place: String,
}

/// How a record's place was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceSource {
    /// Exactly one boundary contained the point.
    Boundary,
    /// An address override applied.
    Override,
    /// No boundary contained the point; place left unset.
    Unmatched,
}

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Assigned label, `None` when unmatched.
    pub place: Option<String>,
    /// Where the label came from.
    pub source: PlaceSource,
}

/// Assigns places to geocoded points using an explicit boundary set.
pub struct SpatialClassifier<'a> {
    boundaries: &'a BoundarySet,
    overrides: Vec<PlaceOverride>,
}

impl<'a> SpatialClassifier<'a> {
    /// Creates a classifier over `boundaries` with the given overrides.
    #[must_use]
    pub const fn new(boundaries: &'a BoundarySet, overrides: Vec<PlaceOverride>) -> Self {
        Self {
            boundaries,
            overrides,
        }
    }

    /// The configured overrides.
    #[must_use]
    pub fn overrides(&self) -> &[PlaceOverride] {
        &self.overrides
    }

    /// Classifies the point of a record whose raw street address is
    /// `address`.
    ///
    /// Containment is evaluated first; an override then replaces its
    /// result. A point outside every boundary yields an unset place.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Ambiguous`] if the point lies in more than
    /// one boundary, even when an override would apply.
    pub fn classify(
        &self,
        address: &str,
        longitude: f64,
        latitude: f64,
    ) -> Result<Placement, SpatialError> {
        let contained = self.boundaries.locate(longitude, latitude)?;

        if let Some(forced) = self.overrides.iter().find(|o| o.address == address) {
            if contained != Some(forced.place.as_str()) {
                log::debug!(
                    "Override for '{address}': {} instead of {}",
                    forced.place,
                    contained.unwrap_or("no boundary")
                );
            }
            return Ok(Placement {
                place: Some(forced.place.clone()),
                source: PlaceSource::Override,
            });
        }

        Ok(contained.map_or_else(
            || {
                log::warn!("'{address}' ({longitude}, {latitude}) is outside every boundary");
                Placement {
                    place: None,
                    source: PlaceSource::Unmatched,
                }
            },
            |place| Placement {
                place: Some(place.to_string()),
                source: PlaceSource::Boundary,
            },
        ))
    }
}
