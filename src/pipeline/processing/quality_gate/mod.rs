use chrono::NaiveDate;
use std::collections::HashSet;

use crate::error::RecordError;
use crate::pipeline::processing::normalize::parse_date;
use crate::types::{FieldValue, Record};

/// An admission gate. Records that are not admitted are dropped without error.
pub trait ConditionalFilter: Send {
    /// Stage name used in logs and rejection reports.
    fn name(&self) -> &'static str;

    fn admit(&self, record: &Record) -> Result<bool, RecordError>;
}

/// Admits records whose `candidate` is one of a fixed set (exact, case-sensitive).
pub struct CandidateWhitelist {
    candidates: HashSet<String>,
}

impl CandidateWhitelist {
    pub fn new<S: Into<String>>(candidates: impl IntoIterator<Item = S>) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConditionalFilter for CandidateWhitelist {
    fn name(&self) -> &'static str {
        "candidate_whitelist"
    }

    fn admit(&self, record: &Record) -> Result<bool, RecordError> {
        Ok(self.candidates.contains(record.text("candidate")))
    }
}

/// Admits records dated on or after the cutoff.
pub struct DateCutoff {
    field: String,
    cutoff: NaiveDate,
}

impl DateCutoff {
    pub fn new(cutoff: NaiveDate) -> Self {
        Self {
            field: "date".to_string(),
            cutoff,
        }
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

impl ConditionalFilter for DateCutoff {
    fn name(&self) -> &'static str {
        "date_cutoff"
    }

    fn admit(&self, record: &Record) -> Result<bool, RecordError> {
        let date = match record.get(&self.field) {
            Some(FieldValue::Date(d)) => *d,
            _ => {
                let raw = record.text(&self.field);
                parse_date(raw).map_err(|source| RecordError::InvalidDate {
                    field: self.field.clone(),
                    value: raw.to_string(),
                    source,
                })?
            }
        };
        Ok(date >= self.cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2012, 11, 28).unwrap()
    }

    #[test]
    fn whitelist_is_exact_and_case_sensitive() {
        let gate = CandidateWhitelist::new(["John X"]);
        assert!(gate.admit(&Record::from_pairs([("candidate", "John X")])).unwrap());
        assert!(!gate.admit(&Record::from_pairs([("candidate", "john x")])).unwrap());
        assert!(!gate
            .admit(&Record::from_pairs([("candidate", FieldValue::Empty)]))
            .unwrap());
        assert!(!gate.admit(&Record::new()).unwrap());
    }

    #[test]
    fn cutoff_is_inclusive() {
        let gate = DateCutoff::new(cutoff());
        assert!(gate.admit(&Record::from_pairs([("date", "11/28/12")])).unwrap());
        assert!(gate.admit(&Record::from_pairs([("date", "12/01/12")])).unwrap());
        assert!(!gate.admit(&Record::from_pairs([("date", "11/27/12")])).unwrap());
    }

    #[test]
    fn cutoff_accepts_parsed_dates() {
        let gate = DateCutoff::new(cutoff());
        let record = Record::from_pairs([("date", FieldValue::Date(cutoff()))]);
        assert!(gate.admit(&record).unwrap());
    }

    #[test]
    fn cutoff_reports_unparseable_dates() {
        let gate = DateCutoff::new(cutoff());
        let err = gate
            .admit(&Record::from_pairs([("date", "not a date")]))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDate { .. }));
    }
}
