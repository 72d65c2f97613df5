use crate::constants::{
    DEFAULT_GEOCODER_ENDPOINT, DEFAULT_SEARCH_URL, DEFAULT_USER_AGENT,
    SPECIAL_ELECTION_CANDIDATES,
};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub election: ElectionConfig,
    pub geocoder: GeocoderConfig,
    pub scraper: ScraperConfig,
    pub progress: ProgressConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub committees: PathBuf,
    pub raw_contributions: PathBuf,
    pub geocoded: PathBuf,
    pub geocache: PathBuf,
    pub special_election_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            committees: PathBuf::from("data/committee-candidate.csv"),
            raw_contributions: PathBuf::from("data/raw/contributions.csv"),
            geocoded: PathBuf::from("data/raw/contributions-geocoded.csv"),
            geocache: PathBuf::from("data/geocache.csv"),
            special_election_dir: PathBuf::from("data/special-election"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    pub candidates: Vec<String>,
    /// Contributions received before this date are dropped.
    pub cutoff_date: NaiveDate,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            candidates: SPECIAL_ELECTION_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cutoff_date: NaiveDate::from_ymd_opt(2012, 11, 28).unwrap_or(NaiveDate::MIN),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
    /// Use random coordinates instead of calling the geocoder.
    pub fake: bool,
    /// (lat, lon)
    pub fake_top_left: (f64, f64),
    /// (lat, lon)
    pub fake_bottom_right: (f64, f64),
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            timeout_seconds: 10,
            fake: false,
            fake_top_left: (39.635307, -77.865601),
            fake_bottom_right: (38.169114, -75.937500),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub url: String,
    pub per_page: usize,
    pub delay_ms: u64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SEARCH_URL.to_string(),
            per_page: 20,
            delay_ms: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub every: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { every: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "dc_campaign_finance.log".to_string(),
            filter: "dc_campaign_finance=info,warn".to_string(),
        }
    }
}

impl Config {
    /// Loads `path`, or `config.toml` when no path is given.
    /// A missing default file yields the built-in configuration; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !explicit && !config_path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.progress.every == 0 {
            return Err(PipelineError::Config("progress.every must be positive".into()));
        }
        if config.scraper.per_page == 0 {
            return Err(PipelineError::Config("scraper.per_page must be positive".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.election.candidates.len(), 7);
        assert_eq!(
            config.election.cutoff_date,
            NaiveDate::from_ymd_opt(2012, 11, 28).unwrap()
        );
        assert_eq!(config.scraper.per_page, 20);
        assert!(!config.geocoder.fake);
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = Config::from_toml(
            r#"
            [election]
            candidates = ["John X"]
            cutoff_date = "2013-01-01"

            [geocoder]
            fake = true
            "#,
        )
        .unwrap();

        assert_eq!(config.election.candidates, vec!["John X".to_string()]);
        assert_eq!(
            config.election.cutoff_date,
            NaiveDate::from_ymd_opt(2013, 1, 1).unwrap()
        );
        assert!(config.geocoder.fake);
        assert_eq!(config.geocoder.timeout_seconds, 10);
    }

    #[test]
    fn zero_progress_interval_is_rejected() {
        let err = Config::from_toml("[progress]\nevery = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
