use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::types::Record;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z\-]").expect("valid regex"));

/// Lower-cases, turns spaces into hyphens and strips anything that is not `a-z` or `-`.
pub fn slugify(s: &str) -> String {
    let s = s.to_lowercase().replace(' ', "-");
    NON_SLUG.replace_all(&s, "").into_owned()
}

/// `<dir>/<slug>.csv` for a candidate name.
pub fn candidate_path(dir: &Path, candidate: &str) -> PathBuf {
    dir.join(format!("{}.csv", slugify(candidate)))
}

/// A sink for admitted records.
pub trait Emitter: Send {
    fn emit(&mut self, record: &Record) -> Result<()>;

    /// Flushes and releases the destination. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Writes records to one CSV file in a fixed column order.
pub struct CsvEmitter {
    path: PathBuf,
    fieldnames: Vec<String>,
    writer: Option<csv::Writer<File>>,
}

impl CsvEmitter {
    /// Creates (or truncates) the file and writes the header row.
    pub fn create<S: AsRef<str>>(path: impl Into<PathBuf>, fieldnames: &[S]) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| PipelineError::setup(dir, e))?;
        }
        let file = File::create(&path).map_err(|e| PipelineError::setup(&path, e))?;
        let fieldnames: Vec<String> = fieldnames.iter().map(|f| f.as_ref().to_string()).collect();

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&fieldnames)?;
        debug!("Opened {}", path.display());

        Ok(Self {
            path,
            fieldnames,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Emitter for CsvEmitter {
    fn emit(&mut self, record: &Record) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            PipelineError::Config(format!("{} is already closed", self.path.display()))
        })?;
        writer.write_record(record.values_for(&self.fieldnames))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("Closed {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for CsvEmitter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}

/// Logs a progress line every `every` records.
pub struct CountEmitter {
    label: String,
    every: usize,
    count: usize,
    closed: bool,
}

impl CountEmitter {
    pub fn new(label: impl Into<String>, every: usize) -> Self {
        Self {
            label: label.into(),
            every: every.max(1),
            count: 0,
            closed: false,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Emitter for CountEmitter {
    fn emit(&mut self, _record: &Record) -> Result<()> {
        self.count += 1;
        if self.count % self.every == 0 {
            info!("{}: {} records", self.label, self.count);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            info!("{}: {} records total", self.label, self.count);
        }
        Ok(())
    }
}

/// Routes each record to the file of its `candidate`.
///
/// Every destination is opened up front; records for any other candidate are dropped.
/// Destinations are released by [`Emitter::close`] or, failing that, on drop.
pub struct CandidateEmitter {
    emitters: BTreeMap<String, CsvEmitter>,
}

impl CandidateEmitter {
    /// Opens `<dir>/<slug>.csv` for each candidate. Any failure closes what was opened and aborts.
    ///
    /// Two candidates whose names slugify to the same file are rejected before that file is
    /// touched, since their writers would overwrite each other.
    pub fn open<C, S>(candidates: C, dir: &Path, fieldnames: &[S]) -> Result<Self>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        S: AsRef<str>,
    {
        let mut emitters: BTreeMap<String, CsvEmitter> = BTreeMap::new();
        let mut paths = HashSet::new();
        for candidate in candidates {
            let candidate = candidate.into();
            if emitters.contains_key(&candidate) {
                continue;
            }
            let path = candidate_path(dir, &candidate);
            if !paths.insert(path.clone()) {
                // On error the already-opened emitters are dropped, which closes them.
                return Err(PipelineError::Config(format!(
                    "candidate '{}' maps to {}, which another candidate already uses",
                    candidate,
                    path.display()
                )));
            }
            let emitter = CsvEmitter::create(path, fieldnames)?;
            emitters.insert(candidate, emitter);
        }
        info!("Opened {} candidate files in {}", emitters.len(), dir.display());
        Ok(Self { emitters })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.emitters.keys().map(String::as_str)
    }

    pub fn path_for(&self, candidate: &str) -> Option<&Path> {
        self.emitters.get(candidate).map(CsvEmitter::path)
    }
}

impl Emitter for CandidateEmitter {
    fn emit(&mut self, record: &Record) -> Result<()> {
        match self.emitters.get_mut(record.text("candidate")) {
            Some(emitter) => emitter.emit(record),
            None => Ok(()),
        }
    }

    /// Closes every destination, even if some fail. Returns the first failure.
    fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for (candidate, emitter) in self.emitters.iter_mut() {
            if let Err(e) = emitter.close() {
                warn!(candidate = %candidate, "Failed to close candidate file: {}", e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
