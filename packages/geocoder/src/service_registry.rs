//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`]. [`build_geocoder`] turns a
//! service definition into a ready, rate-limited client.

use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;
use crate::arcgis::{ArcGisGeocoder, api_key_from_env};
use crate::rate_limit::RateLimitedGeocoder;

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"arcgis"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection order: lower values are preferred.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// `ArcGIS` `GeocodeServer` `findAddressCandidates` endpoint.
    #[serde(rename = "arcgis")]
    ArcGis {
        /// Full endpoint URL.
        base_url: String,
        /// Minimum delay between requests in milliseconds.
        rate_limit_ms: u64,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    30
}

impl GeocodingService {
    /// Returns the provider's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::ArcGis { base_url, .. } => base_url,
        }
    }

    /// Returns the configured minimum delay between requests.
    #[must_use]
    pub const fn rate_limit(&self) -> Duration {
        match &self.provider {
            ProviderConfig::ArcGis { rate_limit_ms, .. } => Duration::from_millis(*rate_limit_ms),
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[("arcgis", include_str!("../services/arcgis.toml"))];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 1;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Looks up an enabled service by id, or the highest-priority enabled
/// service when `id` is `None`.
#[must_use]
pub fn select_service(id: Option<&str>) -> Option<GeocodingService> {
    let services = enabled_services();
    match id {
        Some(id) => services.into_iter().find(|s| s.id == id),
        None => services.into_iter().next(),
    }
}

/// Builds the rate-limited client for `service`.
///
/// `rate_limit_override` replaces the service's configured delay.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP client cannot be built.
pub fn build_geocoder(
    service: &GeocodingService,
    rate_limit_override: Option<Duration>,
) -> Result<RateLimitedGeocoder<ArcGisGeocoder>, GeocodeError> {
    let delay = rate_limit_override.unwrap_or_else(|| service.rate_limit());

    match &service.provider {
        ProviderConfig::ArcGis {
            base_url,
            timeout_secs,
            ..
        } => {
            let client = reqwest::Client::builder()
                .user_agent(concat!("case-map/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(*timeout_secs))
                .build()?;
            let api_key = api_key_from_env();
            log::info!(
                "Using {} ({}) with {}ms between requests{}",
                service.name,
                base_url,
                delay.as_millis(),
                if api_key.is_some() { ", API key set" } else { "" }
            );
            Ok(RateLimitedGeocoder::new(
                ArcGisGeocoder::new(client, base_url.clone(), api_key),
                delay,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_services() {
        let services = all_services();
        assert_eq!(services.len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn service_ids_are_unique() {
        let services = all_services();
        let mut seen = BTreeSet::new();
        for svc in &services {
            assert!(seen.insert(&svc.id), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn all_services_have_required_fields() {
        for svc in &all_services() {
            assert!(!svc.id.is_empty(), "Service has empty id");
            assert!(!svc.name.is_empty(), "Service {} has empty name", svc.id);
            assert!(
                !svc.base_url().is_empty(),
                "Service {} has empty base_url",
                svc.id
            );
        }
    }

    #[test]
    fn arcgis_defaults_to_100ms_between_requests() {
        let svc = select_service(Some("arcgis")).unwrap();
        assert_eq!(svc.rate_limit(), Duration::from_millis(100));
    }

    #[test]
    fn select_without_id_picks_highest_priority() {
        let first = enabled_services().into_iter().next().map(|s| s.id);
        assert_eq!(select_service(None).map(|s| s.id), first);
        assert!(select_service(Some("does-not-exist")).is_none());
    }

    #[test]
    fn override_replaces_configured_delay() {
        let svc = select_service(None).unwrap();
        let geocoder = build_geocoder(&svc, Some(Duration::from_millis(250))).unwrap();
        assert_eq!(geocoder.min_delay(), Duration::from_millis(250));
    }
}
