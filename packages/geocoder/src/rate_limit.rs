//! Minimum-delay rate limiting for geocoding providers.
//!
//! Public geocoders share a quota across all of their callers, so calls
//! are never issued concurrently and consecutive calls start at least
//! `min_delay` apart. The delay is measured start-to-start.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{GeocodeError, GeocodedAddress, Geocoder};

/// Wraps a [`Geocoder`] so that calls are serialized and spaced by at
/// least `min_delay`.
pub struct RateLimitedGeocoder<G> {
    inner: G,
    min_delay: Duration,
    /// Start of the previous call. Held for the duration of a call so a
    /// second caller waits for the first to finish.
    last_call: Mutex<Option<Instant>>,
}

impl<G> RateLimitedGeocoder<G> {
    /// Wraps `inner` with the given minimum inter-call delay.
    #[must_use]
    pub fn new(inner: G, min_delay: Duration) -> Self {
        Self {
            inner,
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    /// The configured minimum delay between consecutive calls.
    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// The wrapped provider.
    #[must_use]
    pub const fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for RateLimitedGeocoder<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        *last_call = Some(Instant::now());
        self.inner.geocode(query).await
    }
}
