use async_trait::async_trait;

use crate::error::GeocodeError;

/// One match returned by a geocoding service.
///
/// `x` is longitude and `y` is latitude (WGS84).
#[derive(Clone, Debug, PartialEq)]
pub struct GeocodeCandidate {
    pub x: f64,
    pub y: f64,
    pub address: Option<String>,
    pub score: Option<f64>,
}

/// External address → coordinate service.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns matches best-first. An empty list means no match.
    async fn geocode(&self, address: &str) -> Result<Vec<GeocodeCandidate>, GeocodeError>;
}
