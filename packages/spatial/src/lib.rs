#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory boundary set for place attribution.
//!
//! Loads named jurisdiction polygons (WGS84) from a `GeoJSON`
//! `FeatureCollection`, builds an R-tree over their bounding boxes, and
//! answers point-in-polygon queries. The set is immutable once built and
//! is passed explicitly to the [`SpatialClassifier`].
//!
//! Boundaries are expected not to overlap. A point inside more than one
//! polygon is reported as [`SpatialError::Ambiguous`] instead of being
//! resolved by first match.

mod classify;

use std::path::Path;

use geo::{Contains, MultiPolygon};
use geojson::{GeoJson, JsonValue};
use rstar::{AABB, RTree, RTreeObject};

pub use classify::{PlaceOverride, PlaceSource, Placement, SpatialClassifier};

/// Errors from loading or querying boundaries.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The boundary file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the boundary file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The boundary file is not usable `GeoJSON`.
    #[error("Invalid boundary GeoJSON: {message}")]
    GeoJson {
        /// Description of the problem.
        message: String,
    },

    /// A point fell inside more than one boundary polygon.
    #[error(
        "Point ({longitude}, {latitude}) lies within {} boundaries ({}); boundaries must not overlap",
        places.len(),
        places.join(", ")
    )]
    Ambiguous {
        /// Longitude of the point.
        longitude: f64,
        /// Latitude of the point.
        latitude: f64,
        /// Labels of every containing polygon.
        places: Vec<String>,
    },
}

/// A named jurisdiction polygon.
#[derive(Debug, Clone)]
pub struct BoundaryPolygon {
    /// Place label assigned to points inside this polygon.
    pub place: String,
    /// Geometry in WGS84 longitude/latitude degrees.
    pub polygon: MultiPolygon<f64>,
}

impl BoundaryPolygon {
    /// Creates a named polygon.
    #[must_use]
    pub fn new(place: impl Into<String>, polygon: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            place: place.into(),
            polygon: polygon.into(),
        }
    }
}

/// A boundary polygon stored in the R-tree with its envelope.
struct BoundaryEntry {
    place: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Immutable, indexed set of boundary polygons.
pub struct BoundarySet {
    entries: RTree<BoundaryEntry>,
}

impl BoundarySet {
    /// Indexes the given polygons.
    #[must_use]
    pub fn new(polygons: Vec<BoundaryPolygon>) -> Self {
        let entries = polygons
            .into_iter()
            .map(|b| BoundaryEntry {
                envelope: compute_envelope(&b.polygon),
                place: b.place,
                polygon: b.polygon,
            })
            .collect();

        Self {
            entries: RTree::bulk_load(entries),
        }
    }

    /// Reads a `GeoJSON` boundary file. See [`Self::from_geojson_str`].
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read or parsed.
    pub fn load_geojson(path: &Path, place_property: &str) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path).map_err(|e| SpatialError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let set = Self::from_geojson_str(&text, place_property)?;
        log::info!(
            "Loaded {} boundary polygon(s) from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    /// Parses a `GeoJSON` `FeatureCollection` (or single `Feature`) of
    /// `Polygon` / `MultiPolygon` features, labelling each with the value
    /// of its `place_property` property.
    ///
    /// Features without a label or with non-polygon geometry are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::GeoJson`] if the text is not `GeoJSON` or is
    /// a bare geometry.
    pub fn from_geojson_str(text: &str, place_property: &str) -> Result<Self, SpatialError> {
        let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| SpatialError::GeoJson {
            message: e.to_string(),
        })?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(SpatialError::GeoJson {
                    message: "expected a Feature or FeatureCollection, found a bare geometry"
                        .to_string(),
                });
            }
        };

        let mut polygons = Vec::with_capacity(features.len());
        for (idx, feature) in features.into_iter().enumerate() {
            let Some(place) = feature.property(place_property).and_then(place_label) else {
                log::warn!("Skipping boundary feature {idx}: no '{place_property}' property");
                continue;
            };

            let Some(polygon) = feature.geometry.and_then(to_multipolygon) else {
                log::warn!("Skipping boundary '{place}': missing or non-polygon geometry");
                continue;
            };

            polygons.push(BoundaryPolygon::new(place, polygon));
        }

        if polygons.is_empty() {
            log::warn!("Boundary set is empty; every point will be unplaced");
        }

        Ok(Self::new(polygons))
    }

    /// Number of polygons in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    /// Whether the set has no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.size() == 0
    }

    /// Labels of every polygon strictly containing the point. Points on a
    /// polygon's boundary are not contained by it.
    #[must_use]
    pub fn places_containing(&self, lng: f64, lat: f64) -> Vec<&str> {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.entries
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.place.as_str())
            .collect()
    }

    /// Looks up the single place containing the point.
    ///
    /// Returns `Ok(None)` when no polygon contains it.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Ambiguous`] when more than one polygon
    /// contains the point.
    pub fn locate(&self, lng: f64, lat: f64) -> Result<Option<&str>, SpatialError> {
        let mut places = self.places_containing(lng, lat);
        match places.len() {
            0 => Ok(None),
            1 => Ok(places.pop()),
            _ => {
                places.sort_unstable();
                Err(SpatialError::Ambiguous {
                    longitude: lng,
                    latitude: lat,
                    places: places.into_iter().map(String::from).collect(),
                })
            }
        }
    }
}

/// Reads a place label from a `GeoJSON` property value.
fn place_label(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use geo::{Rect, coord};

    use super::*;

    fn square(place: &str, min: (f64, f64), max: (f64, f64)) -> BoundaryPolygon {
        let rect = Rect::new(coord! { x: min.0, y: min.1 }, coord! { x: max.0, y: max.1 });
        BoundaryPolygon::new(place, rect.to_polygon())
    }

    fn two_cities() -> BoundarySet {
        BoundarySet::new(vec![
            square("Hayward", (0.0, 0.0), (1.0, 1.0)),
            square("San Leandro", (1.0, 0.0), (2.0, 1.0)),
        ])
    }

    #[test]
    fn locates_point_inside_single_polygon() {
        let set = two_cities();
        assert_eq!(set.locate(0.5, 0.5).unwrap(), Some("Hayward"));
        assert_eq!(set.locate(1.5, 0.5).unwrap(), Some("San Leandro"));
    }

    #[test]
    fn point_outside_every_polygon_is_unplaced() {
        assert_eq!(two_cities().locate(5.0, 5.0).unwrap(), None);
    }

    #[test]
    fn point_on_shared_edge_is_within_neither() {
        let set = two_cities();
        assert!(set.places_containing(1.0, 0.5).is_empty());
        assert_eq!(set.locate(1.0, 0.5).unwrap(), None);
    }

    #[test]
    fn overlapping_polygons_are_an_error() {
        let set = BoundarySet::new(vec![
            square("Hayward", (0.0, 0.0), (2.0, 2.0)),
            square("Castro Valley", (1.0, 1.0), (3.0, 3.0)),
        ]);
        let err = set.locate(1.5, 1.5).unwrap_err();
        match err {
            SpatialError::Ambiguous { places, .. } => {
                assert_eq!(places, vec!["Castro Valley", "Hayward"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(set.locate(0.5, 0.5).unwrap(), Some("Hayward"));
    }

    #[test]
    fn loads_feature_collection_with_place_property() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "PL2018": "Hayward" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "PL2018": "Unincorporated" },
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[2,0],[3,0],[3,1],[2,1],[2,0]]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "OTHER": "x" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[5,5],[6,5],[6,6],[5,6],[5,5]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "PL2018": "Pointless" },
                    "geometry": { "type": "Point", "coordinates": [9, 9] }
                }
            ]
        }"#;

        let set = BoundarySet::from_geojson_str(text, "PL2018").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.locate(0.5, 0.5).unwrap(), Some("Hayward"));
        assert_eq!(set.locate(2.5, 0.5).unwrap(), Some("Unincorporated"));
        assert_eq!(set.locate(5.5, 5.5).unwrap(), None);
    }

    #[test]
    fn rejects_bare_geometry() {
        let text = r#"{ "type": "Point", "coordinates": [0, 0] }"#;
        assert!(matches!(
            BoundarySet::from_geojson_str(text, "PL2018"),
            Err(SpatialError::GeoJson { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("case_map_spatial_missing.geojson");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            BoundarySet::load_geojson(&path, "PL2018"),
            Err(SpatialError::Io { .. })
        ));
    }
}
