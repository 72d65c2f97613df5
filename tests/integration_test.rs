use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use dc_campaign_finance::app::ports::{GeocodeCandidate, Geocoder};
use dc_campaign_finance::config::Config;
use dc_campaign_finance::error::GeocodeError;
use dc_campaign_finance::pipeline::rejections::{CollectingErrorStream, Rejection};
use dc_campaign_finance::tasks::{self, GeocodeMode};

const RAW_HEADER: &str = "Committee Name,Contributor,Contributor Type,Contribution Type,Address,City,State,Zip,Amount,Date of Receipt";

struct CountingGeocoder {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Geocoder for CountingGeocoder {
    async fn geocode(&self, address: &str) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if address.starts_with("Nowhere") {
            return Ok(Vec::new());
        }
        Ok(vec![GeocodeCandidate {
            x: -77.01,
            y: 38.9,
            address: Some(address.to_string()),
            score: Some(100.0),
        }])
    }
}

fn geocoder() -> (GeocodeMode, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mode = GeocodeMode::Service(Box::new(CountingGeocoder { calls: calls.clone() }));
    (mode, calls)
}

fn setup(raw_rows: &[&str]) -> Result<(TempDir, Config)> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let mut config = Config::default();
    config.paths.committees = root.join("committee-candidate.csv");
    config.paths.raw_contributions = root.join("raw").join("contributions.csv");
    config.paths.geocoded = root.join("raw").join("contributions-geocoded.csv");
    config.paths.geocache = root.join("geocache.csv");
    config.paths.special_election_dir = root.join("special-election");
    config.election.candidates = vec!["John X".to_string()];
    config.election.cutoff_date = NaiveDate::from_ymd_opt(2012, 11, 28).unwrap();

    fs::write(
        &config.paths.committees,
        "committee,candidate\nFriends of X,\"X, John\"\nOther PAC,\"Y, Jane\"\n",
    )?;

    fs::create_dir_all(root.join("raw"))?;
    let mut raw = String::from(RAW_HEADER);
    raw.push('\n');
    for row in raw_rows {
        raw.push_str(row);
        raw.push('\n');
    }
    fs::write(&config.paths.raw_contributions, raw)?;

    Ok((dir, config))
}

fn read_rows(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

const JANE_DOE: &str =
    "Friends of X,\"Doe, Jane\",Individual,Check,1 Main St,Washington,,20001,\"$1,234.56\",11/28/12";

#[tokio::test]
async fn contribution_on_cutoff_reaches_candidate_file() -> Result<()> {
    let (_dir, config) = setup(&[JANE_DOE])?;
    let (mode, calls) = geocoder();
    let mut errors = CollectingErrorStream::default();

    let geocoded = tasks::geocode_contributions(&config, mode, &mut errors).await?;
    assert_eq!(geocoded.emitted_records, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let rows = read_rows(&config.paths.geocoded)?;
    let row = &rows[0];
    assert_eq!(row["contributor"], "Jane Doe");
    assert_eq!(row["state"], "DC");
    assert_eq!(row["candidate"], "John X");
    assert_eq!(row["amount"].parse::<f64>()?, 1234.56);
    assert_eq!(row["lat"], "38.9");
    assert_eq!(row["lon"], "-77.01");

    let split = tasks::split_by_candidate(&config, &mut errors).await?;
    assert_eq!(split.emitted_records, 1);
    assert!(errors.rejections.is_empty());

    let john = read_rows(&config.paths.special_election_dir.join("john-x.csv"))?;
    assert_eq!(john.len(), 1);
    assert_eq!(john[0]["contributor"], "Jane Doe");

    let all = read_rows(&config.paths.special_election_dir.join("all.csv"))?;
    assert_eq!(all.len(), 1);
    Ok(())
}

#[tokio::test]
async fn contribution_before_cutoff_is_skipped_not_failed() -> Result<()> {
    let early = JANE_DOE.replace("11/28/12", "11/27/12");
    let (_dir, config) = setup(&[&early])?;
    let (mode, _) = geocoder();
    let mut errors = CollectingErrorStream::default();

    tasks::geocode_contributions(&config, mode, &mut errors).await?;
    let split = tasks::split_by_candidate(&config, &mut errors).await?;

    assert_eq!(split.emitted_records, 0);
    assert_eq!(split.skipped_records, 1);
    assert_eq!(split.failed_records, 0);
    assert_eq!(errors.rejections.len(), 1);
    match &errors.rejections[0] {
        Rejection::Skipped { stage, record, .. } => {
            assert_eq!(*stage, "date_cutoff");
            assert_eq!(record.text("candidate"), "John X");
        }
        other => panic!("expected a skip, got {:?}", other),
    }

    assert!(read_rows(&config.paths.special_election_dir.join("john-x.csv"))?.is_empty());
    assert!(read_rows(&config.paths.special_election_dir.join("all.csv"))?.is_empty());
    Ok(())
}

#[tokio::test]
async fn bad_amounts_and_unknown_candidates_do_not_stop_the_run() -> Result<()> {
    let (_dir, config) = setup(&[
        "Friends of X,\"Doe, Jane\",Individual,Check,1 Main St,Washington,,20001,free,11/28/12",
        "Other PAC,\"Roe, Rick\",Individual,Check,2 Main St,Washington,DC,20001,$10,12/01/12",
        "Mystery Fund,Acme Inc,Corporation,Check,3 Main St,Washington,DC,20001,$20,12/01/12",
        JANE_DOE,
    ])?;
    let (mode, _) = geocoder();
    let mut errors = CollectingErrorStream::default();

    let geocoded = tasks::geocode_contributions(&config, mode, &mut errors).await?;
    assert_eq!(geocoded.total_records, 4);
    assert_eq!(geocoded.emitted_records, 3);
    assert_eq!(geocoded.failed_records, 1);
    assert!(errors.rejections[0].is_error());
    assert_eq!(errors.rejections[0].stage(), "currency_parser");

    let rows = read_rows(&config.paths.geocoded)?;
    assert_eq!(rows[1]["candidate"], "");

    let split = tasks::split_by_candidate(&config, &mut errors).await?;
    assert_eq!(split.emitted_records, 1);
    assert_eq!(split.skipped_records, 2);

    // Jane Y is attributed but not on the ballot, so no file exists for her
    assert!(!config.paths.special_election_dir.join("jane-y.csv").exists());
    Ok(())
}

#[tokio::test]
async fn geocoder_is_called_once_per_address() -> Result<()> {
    let (_dir, config) = setup(&[
        JANE_DOE,
        JANE_DOE,
        "Friends of X,\"Poe, Al\",Individual,Check,9 Elm St,Washington,,20002,$5,12/01/12",
        "Friends of X,\"Nobody, A\",Individual,Check,Nowhere,Washington,,20002,$5,12/01/12",
        "Friends of X,\"Nobody, B\",Individual,Check,Nowhere,Washington,,20002,$5,12/01/12",
        JANE_DOE,
    ])?;
    let (mode, calls) = geocoder();
    let mut errors = CollectingErrorStream::default();

    let summary = tasks::geocode_contributions(&config, mode, &mut errors).await?;
    assert_eq!(summary.emitted_records, 6);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.geocoder_calls, 3);

    let rows = read_rows(&config.paths.geocoded)?;
    assert_eq!(rows[3]["lat"], "");
    assert_eq!(rows[3]["lon"], "");
    Ok(())
}

#[tokio::test]
async fn extracted_geocache_seeds_the_next_run() -> Result<()> {
    let (_dir, config) = setup(&[JANE_DOE])?;
    let mut errors = CollectingErrorStream::default();

    let (mode, first_calls) = geocoder();
    tasks::geocode_contributions(&config, mode, &mut errors).await?;
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);

    tasks::extract_geocache(&config, &mut errors).await?;
    let cache = fs::read_to_string(&config.paths.geocache)?;
    assert_eq!(cache, "address,lat,lon\n1 Main St Washington DC 20001,38.9,-77.01\n");

    let (mode, second_calls) = geocoder();
    tasks::geocode_contributions(&config, mode, &mut errors).await?;
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);

    let rows = read_rows(&config.paths.geocoded)?;
    assert_eq!(rows[0]["lat"], "38.9");
    Ok(())
}

#[tokio::test]
async fn missing_committee_file_aborts_before_any_output() -> Result<()> {
    let (_dir, mut config) = setup(&[JANE_DOE])?;
    config.paths.committees = config.paths.committees.with_file_name("missing.csv");
    let (mode, calls) = geocoder();
    let mut errors = CollectingErrorStream::default();

    let result = tasks::geocode_contributions(&config, mode, &mut errors).await;
    assert!(matches!(
        result,
        Err(dc_campaign_finance::error::PipelineError::Setup { .. })
    ));
    assert!(!config.paths.geocoded.exists());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn fake_geocoding_needs_no_service() -> Result<()> {
    let (_dir, config) = setup(&[JANE_DOE])?;
    let mut errors = CollectingErrorStream::default();

    tasks::geocode_contributions(&config, GeocodeMode::Fake, &mut errors).await?;

    let rows = read_rows(&config.paths.geocoded)?;
    let lat: f64 = rows[0]["lat"].parse()?;
    let lon: f64 = rows[0]["lon"].parse()?;
    assert!((38.169114..=39.635307).contains(&lat));
    assert!((-77.865601..=-75.9375).contains(&lon));
    Ok(())
}

#[tokio::test]
async fn candidate_named_all_cannot_clobber_the_combined_file() -> Result<()> {
    let (_dir, mut config) = setup(&[JANE_DOE])?;
    let (mode, _) = geocoder();
    let mut errors = CollectingErrorStream::default();
    tasks::geocode_contributions(&config, mode, &mut errors).await?;

    config.election.candidates = vec!["John X".to_string(), "All".to_string()];
    let result = tasks::split_by_candidate(&config, &mut errors).await;

    assert!(matches!(
        result,
        Err(dc_campaign_finance::error::PipelineError::Config(_))
    ));
    assert!(!config.paths.special_election_dir.join("all.csv").exists());
    assert!(!config.paths.special_election_dir.join("john-x.csv").exists());
    Ok(())
}
