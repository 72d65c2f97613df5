use std::path::Path;
use tracing::{info, instrument};

use crate::app::ports::Geocoder;
use crate::config::Config;
use crate::constants::{ALL_CONTRIBUTIONS_FILE, FIELDNAMES, GEOCACHE_FIELDNAMES, RAW_FIELD_MAPPING};
use crate::error::{PipelineError, Result};
use crate::infra::arcgis_geocoder::ArcGisGeocoder;
use crate::pipeline::emit::{candidate_path, CandidateEmitter, CountEmitter, CsvEmitter};
use crate::pipeline::processing::candidate::{CandidateAttribution, CommitteeLookup};
use crate::pipeline::processing::filters::{FieldAdder, FieldKeeper, FieldMerger, FieldRenamer};
use crate::pipeline::processing::geocode::{FakeGeocoder, GeocodeCache, GeocodeResolver};
use crate::pipeline::processing::normalize::{CurrencyParser, NameReformatter, StateInference};
use crate::pipeline::processing::quality_gate::{CandidateWhitelist, DateCutoff};
use crate::pipeline::rejections::ErrorStream;
use crate::pipeline::source::CsvSource;
use crate::pipeline::{Pipeline, RunSummary, Stage};
use crate::scrapers::committees::{write_committees, CommitteeScraper};

/// How the geocode step resolves coordinates.
pub enum GeocodeMode {
    /// Cache first, then the given service.
    Service(Box<dyn Geocoder>),
    /// Random coordinates inside the configured box.
    Fake,
}

impl GeocodeMode {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.geocoder.fake {
            Ok(GeocodeMode::Fake)
        } else {
            Ok(GeocodeMode::Service(Box::new(ArcGisGeocoder::new(
                &config.geocoder,
            )?)))
        }
    }
}

/// Cleans the raw export, attributes candidates and geocodes every contribution.
#[instrument(skip_all)]
pub async fn geocode_contributions(
    config: &Config,
    mode: GeocodeMode,
    errors: &mut dyn ErrorStream,
) -> Result<RunSummary> {
    let paths = &config.paths;
    let lookup = CommitteeLookup::load(&paths.committees)?;
    let source = CsvSource::open(&paths.raw_contributions)?;

    let geocode_stage = match mode {
        GeocodeMode::Service(geocoder) => {
            let cache = GeocodeCache::load(&paths.geocache)?;
            Stage::Geocode(GeocodeResolver::new(geocoder, cache))
        }
        GeocodeMode::Fake => Stage::Filter(Box::new(FakeGeocoder::new(
            config.geocoder.fake_top_left,
            config.geocoder.fake_bottom_right,
        ))),
    };

    let output = CsvEmitter::create(&paths.geocoded, &FIELDNAMES)?;

    let mut pipeline = Pipeline::new("geocode")
        .filter(FieldRenamer::new(RAW_FIELD_MAPPING))
        .filter(FieldAdder::new("lat", ""))
        .filter(FieldAdder::new("lon", ""))
        .filter(FieldAdder::new("candidate", ""))
        .filter(CurrencyParser::new("amount"))
        .filter(StateInference)
        .filter(CandidateAttribution::new(lookup))
        .filter(NameReformatter)
        .stage(geocode_stage)
        .emitter(CountEmitter::new("geocode", config.progress.every))
        .emitter(output);
    pipeline.run(source, errors).await
}

/// Keeps special-election contributions and writes one file per candidate plus `all.csv`.
#[instrument(skip_all)]
pub async fn split_by_candidate(config: &Config, errors: &mut dyn ErrorStream) -> Result<RunSummary> {
    let paths = &config.paths;
    let election = &config.election;
    let source = CsvSource::open(&paths.geocoded)?;

    let all_path = paths.special_election_dir.join(ALL_CONTRIBUTIONS_FILE);
    if let Some(candidate) = election
        .candidates
        .iter()
        .find(|c| candidate_path(&paths.special_election_dir, c) == all_path)
    {
        return Err(PipelineError::Config(format!(
            "candidate '{}' would overwrite {}",
            candidate,
            all_path.display()
        )));
    }

    let candidates = CandidateEmitter::open(
        election.candidates.iter().cloned(),
        &paths.special_election_dir,
        &FIELDNAMES,
    )?;
    let all = CsvEmitter::create(all_path, &FIELDNAMES)?;

    let mut pipeline = Pipeline::new("split")
        .gate(CandidateWhitelist::new(election.candidates.iter().cloned()))
        .gate(DateCutoff::new(election.cutoff_date))
        .emitter(candidates)
        .emitter(CountEmitter::new("split", config.progress.every))
        .emitter(all);
    pipeline.run(source, errors).await
}

/// Regenerates the geocache file from a geocoded output file.
#[instrument(skip_all)]
pub async fn extract_geocache(config: &Config, errors: &mut dyn ErrorStream) -> Result<RunSummary> {
    extract_geocache_between(&config.paths.geocoded, &config.paths.geocache, errors).await
}

pub async fn extract_geocache_between(
    geocoded: &Path,
    geocache: &Path,
    errors: &mut dyn ErrorStream,
) -> Result<RunSummary> {
    let source = CsvSource::open(geocoded)?;
    let output = CsvEmitter::create(geocache, &GEOCACHE_FIELDNAMES)?;

    let mut pipeline = Pipeline::new("extract_geocache")
        .filter(FieldMerger::new("address", ["address", "city", "state", "zip"]))
        .filter(FieldKeeper::new(GEOCACHE_FIELDNAMES))
        .emitter(output);
    pipeline.run(source, errors).await
}

/// Scrapes the committee registration search into the committees file.
#[instrument(skip_all)]
pub async fn scrape_committees(config: &Config) -> Result<usize> {
    let scraper = CommitteeScraper::new(&config.scraper)?;
    let rows = scraper.scrape().await?;
    write_committees(&config.paths.committees, &rows)
}

/// geocode → split → extract-geocache
pub async fn run_all(
    config: &Config,
    mode: GeocodeMode,
    errors: &mut dyn ErrorStream,
) -> Result<Vec<RunSummary>> {
    let geocoded = geocode_contributions(config, mode, errors).await?;
    info!("Geocoded {} contributions", geocoded.emitted_records);
    let split = split_by_candidate(config, errors).await?;
    let cache = extract_geocache(config, errors).await?;
    Ok(vec![geocoded, split, cache])
}
