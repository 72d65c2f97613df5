use metrics::counter;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::app::ports::Geocoder;
use crate::error::{PipelineError, RecordError, Result};
use crate::pipeline::processing::filters::Filter;
use crate::types::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Composite cache key: address, city, state and zip joined by single spaces.
pub fn address_key(record: &Record) -> String {
    record.values_for(&["address", "city", "state", "zip"]).join(" ")
}

/// Result of looking an address up in the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheLookup {
    Hit(Coordinates),
    /// The geocoder was already asked this run and found nothing.
    KnownMiss,
    Unknown,
}

/// Address → coordinates memo for one run.
///
/// Seeded from the persisted geocache file and extended in memory. Never written back;
/// the persisted file is regenerated from geocoded output instead.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: HashMap<String, Option<Coordinates>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an `address,lat,lon` file. A missing file yields an empty cache.
    /// Rows without usable coordinates are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
            Ok(reader) => reader,
            Err(e) => {
                if let csv::ErrorKind::Io(io_err) = e.kind() {
                    if io_err.kind() == io::ErrorKind::NotFound {
                        warn!("No geocache at {}, starting empty", path.display());
                        return Ok(Self::new());
                    }
                }
                return Err(PipelineError::from_csv_open(path, e));
            }
        };

        let mut cache = Self::new();
        let mut skipped = 0usize;
        for row in reader.records() {
            let row = row?;
            let address = row.get(0).unwrap_or_default();
            let lat = row.get(1).and_then(|s| s.trim().parse::<f64>().ok());
            let lon = row.get(2).and_then(|s| s.trim().parse::<f64>().ok());
            match (lat, lon) {
                (Some(lat), Some(lon)) => cache.insert(address, Coordinates { lat, lon }),
                _ => skipped += 1,
            }
        }

        info!(
            "Loaded {} cached addresses from {} ({} without coordinates)",
            cache.len(),
            path.display(),
            skipped
        );
        Ok(cache)
    }

    pub fn insert(&mut self, address: impl Into<String>, coordinates: Coordinates) {
        self.entries.insert(address.into(), Some(coordinates));
    }

    fn insert_miss(&mut self, address: impl Into<String>) {
        self.entries.insert(address.into(), None);
    }

    pub fn lookup(&self, address: &str) -> CacheLookup {
        match self.entries.get(address) {
            Some(Some(c)) => CacheLookup::Hit(*c),
            Some(None) => CacheLookup::KnownMiss,
            None => CacheLookup::Unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves `lat`/`lon` for a record, asking the geocoder only on a cache miss.
pub struct GeocodeResolver {
    geocoder: Box<dyn Geocoder>,
    cache: GeocodeCache,
    external_calls: usize,
}

impl GeocodeResolver {
    pub fn new(geocoder: Box<dyn Geocoder>, cache: GeocodeCache) -> Self {
        Self {
            geocoder,
            cache,
            external_calls: 0,
        }
    }

    /// Number of geocoder requests issued so far.
    pub fn external_calls(&self) -> usize {
        self.external_calls
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Records that already carry both coordinates pass through untouched.
    /// Geocoder failures and empty results leave the coordinates unset.
    pub async fn resolve(&mut self, mut record: Record) -> Record {
        if !record.is_blank("lat") && !record.is_blank("lon") {
            return record;
        }

        let key = address_key(&record);
        let coordinates = match self.cache.lookup(&key) {
            CacheLookup::Hit(c) => {
                counter!("contrib_geocode_cache_hits_total").increment(1);
                Some(c)
            }
            CacheLookup::KnownMiss => None,
            CacheLookup::Unknown => self.query(&key).await,
        };

        if let Some(c) = coordinates {
            record.set("lat", c.lat);
            record.set("lon", c.lon);
        }
        record
    }

    async fn query(&mut self, address: &str) -> Option<Coordinates> {
        self.external_calls += 1;
        counter!("contrib_geocode_requests_total").increment(1);

        let found = match self.geocoder.geocode(address).await {
            Ok(candidates) => candidates.first().map(|c| Coordinates { lat: c.y, lon: c.x }),
            Err(e) => {
                warn!(address = %address, "Geocoding failed: {}", e);
                counter!("contrib_geocode_failures_total").increment(1);
                None
            }
        };

        match found {
            Some(c) => {
                debug!(address = %address, lat = c.lat, lon = c.lon, "Geocoded");
                self.cache.insert(address, c);
            }
            None => {
                debug!(address = %address, "No geocoding candidates");
                self.cache.insert_miss(address);
            }
        }
        found
    }
}

/// Writes random coordinates inside a bounding box. For dry runs without a geocoder.
pub struct FakeGeocoder {
    top_left: (f64, f64),
    bottom_right: (f64, f64),
}

impl FakeGeocoder {
    /// Corners are `(lat, lon)`.
    pub fn new(top_left: (f64, f64), bottom_right: (f64, f64)) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    fn make_coordinates(&self) -> Coordinates {
        let mut rng = rand::thread_rng();
        let lat_span = self.top_left.0 - self.bottom_right.0;
        let lon_span = self.top_left.1 - self.bottom_right.1;
        Coordinates {
            lat: self.bottom_right.0 + lat_span * rng.gen::<f64>(),
            lon: self.bottom_right.1 + lon_span * rng.gen::<f64>(),
        }
    }
}

impl Filter for FakeGeocoder {
    fn name(&self) -> &'static str {
        "fake_geocoder"
    }

    fn transform(&self, mut record: Record) -> std::result::Result<Record, RecordError> {
        let c = self.make_coordinates();
        record.set("lat", FieldValue::Number(c.lat));
        record.set("lon", FieldValue::Number(c.lon));
        Ok(record)
    }
}
