use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::NOT_APPLICABLE;
use crate::error::{PipelineError, RecordError, Result};
use crate::pipeline::processing::filters::Filter;
use crate::pipeline::processing::normalize::reorder_name;
use crate::types::{FieldValue, Record};

/// Committee name → candidate name (`"First Last"`). Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct CommitteeLookup {
    committees: HashMap<String, String>,
}

impl CommitteeLookup {
    /// Builds the lookup from `(committee, "Last, First")` rows, skipping `N/A` entries.
    pub fn from_rows<C, N, I>(rows: I) -> Self
    where
        C: Into<String>,
        N: AsRef<str>,
        I: IntoIterator<Item = (C, N)>,
    {
        let mut committees = HashMap::new();
        for (committee, candidate) in rows {
            let committee = committee.into();
            let candidate = candidate.as_ref().trim();
            if committee.trim() == NOT_APPLICABLE || candidate == NOT_APPLICABLE {
                debug!(committee = %committee, "Skipping committee without candidate");
                continue;
            }
            committees.insert(committee, reorder_name(candidate));
        }
        Self { committees }
    }

    /// Reads a `committee,candidate` CSV.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PipelineError::from_csv_open(path, e))?;

        let headers = reader.headers()?.clone();
        let committee_idx = column(&headers, "committee", path)?;
        let candidate_idx = column(&headers, "candidate", path)?;

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            rows.push((
                row.get(committee_idx).unwrap_or_default().to_string(),
                row.get(candidate_idx).unwrap_or_default().to_string(),
            ));
        }

        let lookup = Self::from_rows(rows);
        info!("Loaded {} committees from {}", lookup.len(), path.display());
        Ok(lookup)
    }

    pub fn get(&self, committee: &str) -> Option<&str> {
        self.committees.get(committee).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.committees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committees.is_empty()
    }
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        PipelineError::Config(format!("{} has no '{}' column", path.display(), name))
    })
}

/// Sets `candidate` from the committee that received the contribution.
/// Unknown committees leave the field empty.
pub struct CandidateAttribution {
    lookup: CommitteeLookup,
}

impl CandidateAttribution {
    pub fn new(lookup: CommitteeLookup) -> Self {
        Self { lookup }
    }
}

impl Filter for CandidateAttribution {
    fn name(&self) -> &'static str {
        "candidate_attribution"
    }

    fn transform(&self, mut record: Record) -> std::result::Result<Record, RecordError> {
        let candidate = match self.lookup.get(record.text("committee")) {
            Some(name) => FieldValue::text(name),
            None => FieldValue::Empty,
        };
        record.set("candidate", candidate);
        Ok(record)
    }
}
