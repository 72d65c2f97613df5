use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, RecordError, Result};
use crate::types::{FieldValue, Record};

/// Reads a headered CSV as a stream of text records, one field per column.
pub struct CsvSource<R: Read> {
    headers: Vec<String>,
    rows: csv::StringRecordsIntoIter<R>,
}

impl CsvSource<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| PipelineError::from_csv_open(path, e))?;
        info!("Reading records from {}", path.display());
        Self::from_csv(reader)
    }
}

impl<R: Read> CsvSource<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::from_csv(csv::ReaderBuilder::new().flexible(true).from_reader(reader))
    }

    fn from_csv(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Self {
            headers,
            rows: reader.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = std::result::Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(
            row.map(|row| {
                // Short rows leave trailing fields empty
                let mut record = Record::new();
                for (i, name) in self.headers.iter().enumerate() {
                    let value = row.get(i).map(FieldValue::text).unwrap_or_default();
                    record.set(name.clone(), value);
                }
                record
            })
            .map_err(|e| RecordError::MalformedRow(e.to_string())),
        )
    }
}
