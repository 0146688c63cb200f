//! `ArcGIS` World Geocoding Service client.
//!
//! Uses the `findAddressCandidates` endpoint with a single-line address
//! and asks for the best candidate only. Each candidate carries a 0-100
//! `score`, which becomes the record's confidence score.
//!
//! An API key is optional for single-address lookups. When
//! `ARCGIS_API_KEY` is set it is sent as the `token` parameter.
//!
//! See <https://developers.arcgis.com/rest/geocode/api-reference/geocoding-find-address-candidates.htm>

use async_trait::async_trait;
use case_map_incident_models::ConfidenceScore;

use crate::{GeocodeError, GeocodedAddress, Geocoder};

/// Environment variable holding the optional `ArcGIS` API key.
pub const API_KEY_ENV: &str = "ARCGIS_API_KEY";

/// Reads the `ArcGIS` API key from [`API_KEY_ENV`].
///
/// Returns `None` when unset or empty.
#[must_use]
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Geocoder backed by an `ArcGIS` `GeocodeServer`.
#[derive(Debug, Clone)]
pub struct ArcGisGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ArcGisGeocoder {
    /// Creates a client for the `findAddressCandidates` endpoint at
    /// `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Geocoder for ArcGisGeocoder {
    fn name(&self) -> &'static str {
        "arcgis"
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let mut params = vec![
            ("singleLine", query),
            ("f", "json"),
            ("outFields", "Match_addr,Postal"),
            ("maxLocations", "1"),
        ];
        if let Some(key) = &self.api_key {
            params.push(("token", key.as_str()));
        }

        let resp = self.client.get(&self.base_url).query(&params).send().await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }

        if !resp.status().is_success() {
            return Err(GeocodeError::Provider {
                code: i64::from(resp.status().as_u16()),
                message: format!("ArcGIS returned status {}", resp.status()),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a `findAddressCandidates` JSON response.
///
/// `ArcGIS` reports failures such as invalid tokens with HTTP 200 and an
/// `error` object, so that is checked before the candidates.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    if let Some(error) = body.get("error") {
        return Err(GeocodeError::Provider {
            code: error["code"].as_i64().unwrap_or_default(),
            message: error["message"]
                .as_str()
                .unwrap_or("unknown ArcGIS error")
                .to_string(),
        });
    }

    let candidates = body
        .get("candidates")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "ArcGIS response missing 'candidates' array".to_string(),
        })?;

    let Some(first) = candidates.first() else {
        return Ok(None);
    };

    let x = first
        .pointer("/location/x")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Candidate missing location.x".to_string(),
        })?;
    let y = first
        .pointer("/location/y")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Candidate missing location.y".to_string(),
        })?;
    let score = first["score"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Candidate missing score".to_string(),
        })?;
    let matched_address = first["address"]
        .as_str()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Candidate missing address".to_string(),
        })?
        .to_string();

    let matched_zip = first
        .pointer("/attributes/Postal")
        .and_then(serde_json::Value::as_str)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .or_else(|| postal_code_from_address(&matched_address));

    Ok(Some(GeocodedAddress {
        matched_address,
        matched_zip,
        longitude: x,
        latitude: y,
        score: ConfidenceScore::from_provider(score),
    }))
}

/// Takes the trailing `", "`-separated component of a matched address when
/// it looks like a postal code (e.g. `"..., California, 94568"`).
fn postal_code_from_address(address: &str) -> Option<String> {
    let last = address.rsplit(", ").next()?.trim();
    if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit() || c == '-') {
        Some(last.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_candidate() {
        let body = serde_json::json!({
            "spatialReference": { "wkid": 4326, "latestWkid": 4326 },
            "candidates": [{
                "address": "5325 Broder Blvd, Dublin, California, 94568",
                "location": { "x": -121.8861, "y": 37.7151 },
                "score": 100,
                "attributes": { "Match_addr": "5325 Broder Blvd, Dublin, California, 94568", "Postal": "94568" }
            }]
        });
        let result = parse_response(&body).unwrap().unwrap();
        assert!((result.longitude - -121.8861).abs() < 1e-4);
        assert!((result.latitude - 37.7151).abs() < 1e-4);
        assert!(result.score.is_exact());
        assert_eq!(result.matched_zip.as_deref(), Some("94568"));
        assert_eq!(
            result.matched_address,
            "5325 Broder Blvd, Dublin, California, 94568"
        );
    }

    #[test]
    fn fractional_score_is_not_exact() {
        let body = serde_json::json!({
            "candidates": [{
                "address": "Main St, Hayward, California",
                "location": { "x": -122.08, "y": 37.67 },
                "score": 99.62
            }]
        });
        let result = parse_response(&body).unwrap().unwrap();
        assert_eq!(result.score.value(), 99);
        assert_eq!(result.matched_zip, None);
    }

    #[test]
    fn falls_back_to_zip_in_matched_address() {
        let body = serde_json::json!({
            "candidates": [{
                "address": "123 Main St, Hayward, California, 94541",
                "location": { "x": -122.08, "y": 37.67 },
                "score": 100,
                "attributes": { "Postal": "" }
            }]
        });
        let result = parse_response(&body).unwrap().unwrap();
        assert_eq!(result.matched_zip.as_deref(), Some("94541"));
    }

    #[test]
    fn empty_candidates_is_a_miss() {
        let body = serde_json::json!({ "candidates": [] });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn error_object_is_provider_error() {
        let body = serde_json::json!({
            "error": { "code": 498, "message": "Invalid Token", "details": [] }
        });
        let err = parse_response(&body).unwrap_err();
        assert!(matches!(
            err,
            GeocodeError::Provider { code: 498, ref message } if message == "Invalid Token"
        ));
    }

    #[test]
    fn missing_candidates_is_parse_error() {
        let body = serde_json::json!({ "unexpected": true });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn postal_code_requires_digits() {
        assert_eq!(
            postal_code_from_address("1 A St, Oakland, California, 94612-1234"),
            Some("94612-1234".to_string())
        );
        assert_eq!(postal_code_from_address("Oakland, California"), None);
    }
}
