use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{DC_STATE, INDIVIDUAL_CONTRIBUTOR, RECEIPT_DATE_FORMAT, WASHINGTON_CITY};
use crate::error::RecordError;
use crate::pipeline::processing::filters::Filter;
use crate::types::{FieldValue, Record};

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.]").expect("valid regex"));

/// Turns `"Last, First"` into `"First Last"`. Splits on the first comma only.
/// Names without a comma are returned trimmed.
pub fn reorder_name(name: &str) -> String {
    match name.split_once(',') {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim()),
        None => name.trim().to_string(),
    }
}

/// Strips everything but digits and decimal points, then parses what is left.
pub fn parse_currency(s: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(s, "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parses receipt dates such as `11/28/12`.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), RECEIPT_DATE_FORMAT)
}

/// Reformats individual contributor names from `"Last, First"` to `"First Last"`.
pub struct NameReformatter;

impl Filter for NameReformatter {
    fn name(&self) -> &'static str {
        "name_reformatter"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        if record.text("contributor_type") == INDIVIDUAL_CONTRIBUTOR
            && record.text("contributor").contains(',')
        {
            let name = reorder_name(record.text("contributor"));
            record.set("contributor", name);
        }
        Ok(record)
    }
}

/// Fills in `DC` for Washington addresses that have no state.
pub struct StateInference;

impl Filter for StateInference {
    fn name(&self) -> &'static str {
        "state_inference"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        if record.text("city").to_uppercase() == WASHINGTON_CITY && record.is_blank("state") {
            record.set("state", DC_STATE);
        }
        Ok(record)
    }
}

/// Parses a currency-formatted text field into a number.
pub struct CurrencyParser {
    field: String,
}

impl CurrencyParser {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Filter for CurrencyParser {
    fn name(&self) -> &'static str {
        "currency_parser"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        let raw = match record.get(&self.field) {
            Some(FieldValue::Number(_)) => return Ok(record),
            Some(value) => value.to_string(),
            None => String::new(),
        };
        let amount = parse_currency(&raw).ok_or_else(|| RecordError::InvalidAmount {
            field: self.field.clone(),
            value: raw.clone(),
        })?;
        record.set(self.field.clone(), amount);
        Ok(record)
    }
}

/// Parses a `month/day/yy` text field into a date value.
pub struct DateParser {
    field: String,
}

impl DateParser {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Filter for DateParser {
    fn name(&self) -> &'static str {
        "date_parser"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        if let Some(FieldValue::Date(_)) = record.get(&self.field) {
            return Ok(record);
        }
        let raw = record.text(&self.field).to_string();
        let date = parse_date(&raw).map_err(|source| RecordError::InvalidDate {
            field: self.field.clone(),
            value: raw.clone(),
            source,
        })?;
        record.set(self.field.clone(), FieldValue::Date(date));
        Ok(record)
    }
}
