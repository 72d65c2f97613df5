use std::path::PathBuf;
use thiserror::Error;

/// Run-level failures. Any of these aborts the current recipe.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to open {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scrape error: {0}")]
    Scrape(String),
}

impl PipelineError {
    pub fn setup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Setup {
            path: path.into(),
            source,
        }
    }

    /// Wraps a csv open error, keeping the path when the cause is I/O.
    pub fn from_csv_open(path: impl Into<PathBuf>, err: csv::Error) -> Self {
        let path = path.into();
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(source) => PipelineError::Setup { path, source },
                other => PipelineError::Config(format!("{}: {:?}", path.display(), other)),
            }
        } else {
            PipelineError::Csv(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A single record could not be processed. The record is dropped and the run continues.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid amount in field '{field}': {value:?}")]
    InvalidAmount { field: String, value: String },

    #[error("Invalid date in field '{field}': {value:?} ({source})")]
    InvalidDate {
        field: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Malformed source row: {0}")]
    MalformedRow(String),
}

/// The external geocoder failed. Treated the same as "no candidates".
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Geocoder service error: {0}")]
    Service(String),
}
