//! Reverse geocoding
//!
//! Turns coordinates into a place name for project naming. Only the name
//! generator calls this, and any failure there falls back to a
//! coordinate-derived name, so errors here never fail a request.

use crate::cache::TtlCache;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vane_sdk::types::Coordinates;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Reverse lookup timed out")]
    Timeout,

    #[error("Reverse lookup failed: {0}")]
    Failed(String),
}

/// Coordinates to place name
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// `Ok(None)` means the service answered but knows no place there
    async fn lookup(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
}

impl NominatimResponse {
    fn place_name(self) -> Option<String> {
        if self.error.is_some() {
            return None;
        }

        let address = self.address.unwrap_or_default();
        [
            address.city,
            address.town,
            address.village,
            address.hamlet,
            address.municipality,
            address.county,
            address.state,
            self.name,
        ]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
    }
}

/// Nominatim-compatible reverse lookup over HTTP
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn lookup(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lon.to_string()),
                ("zoom", "10".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout
                } else {
                    GeocodeError::Failed(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(GeocodeError::Failed(format!("HTTP {}", response.status())));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Failed(format!("Failed to parse response: {}", e)))?;

        Ok(body.place_name())
    }
}

/// Reverse geocoder with a time-to-live cache and a hard timeout in front
///
/// Keys are coordinates rounded to three decimals (roughly 100 m), so nearby
/// requests share a lookup. Both hits and "no place here" answers are cached;
/// failures are not.
#[derive(Clone)]
pub struct CachedGeocoder {
    inner: Arc<dyn ReverseGeocoder>,
    cache: TtlCache<(i64, i64), Option<String>>,
    timeout: Duration,
}

impl CachedGeocoder {
    pub fn new(inner: Arc<dyn ReverseGeocoder>, cache_ttl: Duration, timeout: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(cache_ttl),
            timeout,
        }
    }

    fn cache_key(coordinates: Coordinates) -> (i64, i64) {
        (
            (coordinates.lat * 1000.0).round() as i64,
            (coordinates.lon * 1000.0).round() as i64,
        )
    }

    pub async fn lookup(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
        let key = Self::cache_key(coordinates);
        if let Some(cached) = self.cache.get(&key) {
            debug!(%coordinates, "Reverse lookup cache hit");
            return Ok(cached);
        }

        let place = match tokio::time::timeout(self.timeout, self.inner.lookup(coordinates)).await
        {
            Ok(Ok(place)) => place,
            Ok(Err(e)) => {
                warn!(%coordinates, error = %e, "Reverse lookup failed");
                return Err(e);
            }
            Err(_) => {
                warn!(%coordinates, timeout_ms = self.timeout.as_millis() as u64, "Reverse lookup timed out");
                return Err(GeocodeError::Timeout);
            }
        };

        self.cache.insert(key, place.clone());
        Ok(place)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGeocoder {
        calls: AtomicUsize,
        answer: Option<String>,
        delay: Duration,
    }

    #[async_trait]
    impl ReverseGeocoder for CountingGeocoder {
        async fn lookup(&self, _coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.answer.clone())
        }
    }

    fn counting(answer: Option<&str>, delay: Duration) -> Arc<CountingGeocoder> {
        Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            answer: answer.map(str::to_string),
            delay,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_nearby_coordinates_share_cache_entry() {
        let inner = counting(Some("Amarillo"), Duration::ZERO);
        let geocoder = CachedGeocoder::new(
            Arc::clone(&inner) as Arc<dyn ReverseGeocoder>,
            Duration::from_secs(24 * 3600),
            Duration::from_secs(5),
        );

        let first = geocoder.lookup(Coordinates::new(35.0701, -101.4000).unwrap()).await;
        let second = geocoder.lookup(Coordinates::new(35.0704, -101.4003).unwrap()).await;

        assert_eq!(first.unwrap().as_deref(), Some("Amarillo"));
        assert_eq!(second.unwrap().as_deref(), Some("Amarillo"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_cached() {
        let inner = counting(None, Duration::ZERO);
        let geocoder = CachedGeocoder::new(
            Arc::clone(&inner) as Arc<dyn ReverseGeocoder>,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        let coordinates = Coordinates::new(0.0, -140.0).unwrap();

        assert_eq!(geocoder.lookup(coordinates).await.unwrap(), None);
        assert_eq!(geocoder.lookup(coordinates).await.unwrap(), None);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out() {
        let inner = counting(Some("Late"), Duration::from_secs(30));
        let geocoder = CachedGeocoder::new(inner, Duration::from_secs(60), Duration::from_secs(5));

        let result = geocoder.lookup(Coordinates::new(10.0, 10.0).unwrap()).await;
        assert!(matches!(result, Err(GeocodeError::Timeout)));
    }

    #[test]
    fn test_place_name_preference() {
        let body: NominatimResponse = serde_json::from_value(serde_json::json!({
            "name": "Somewhere",
            "address": {"county": "Potter County", "town": "Amarillo", "state": "Texas"}
        }))
        .unwrap();
        assert_eq!(body.place_name().as_deref(), Some("Amarillo"));

        let error: NominatimResponse =
            serde_json::from_value(serde_json::json!({"error": "Unable to geocode"})).unwrap();
        assert_eq!(error.place_name(), None);
    }
}
