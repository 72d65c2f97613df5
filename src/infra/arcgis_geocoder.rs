use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::{GeocodeCandidate, Geocoder};
use crate::config::GeocoderConfig;
use crate::error::{GeocodeError, PipelineError};

/// ArcGIS `findAddressCandidates` client. Requests WGS84 output, where x is longitude.
pub struct ArcGisGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct FindAddressResponse {
    #[serde(default)]
    candidates: Vec<ArcGisCandidate>,
    error: Option<ArcGisError>,
}

#[derive(Debug, Deserialize)]
struct ArcGisCandidate {
    address: Option<String>,
    score: Option<f64>,
    location: ArcGisPoint,
}

#[derive(Debug, Deserialize)]
struct ArcGisPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ArcGisError {
    code: Option<i64>,
    message: Option<String>,
}

impl ArcGisGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

fn parse_response(body: &str) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
    let response: FindAddressResponse = serde_json::from_str(body)
        .map_err(|e| GeocodeError::Service(format!("unreadable response: {}", e)))?;

    if let Some(err) = response.error {
        return Err(GeocodeError::Service(format!(
            "code {}: {}",
            err.code.unwrap_or_default(),
            err.message.unwrap_or_default()
        )));
    }

    Ok(response
        .candidates
        .into_iter()
        .map(|c| GeocodeCandidate {
            x: c.location.x,
            y: c.location.y,
            address: c.address,
            score: c.score,
        })
        .collect())
}

#[async_trait]
impl Geocoder for ArcGisGeocoder {
    async fn geocode(&self, address: &str) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
        debug!(address = %address, "Requesting geocode");
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("SingleLine", address),
                ("f", "json"),
                ("outSR", "4326"),
                ("maxLocations", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_response(&body)
    }
}
