use crate::error::RecordError;
use crate::types::{FieldValue, Record};

/// A field-level transformation. Must return exactly one record per input record.
pub trait Filter: Send {
    /// Stage name used in logs and rejection reports.
    fn name(&self) -> &'static str;

    fn transform(&self, record: Record) -> Result<Record, RecordError>;
}

/// Renames fields. The mapping is `(new_name, old_name)`.
pub struct FieldRenamer {
    mapping: Vec<(String, String)>,
}

impl FieldRenamer {
    pub fn new<N, O, I>(mapping: I) -> Self
    where
        N: Into<String>,
        O: Into<String>,
        I: IntoIterator<Item = (N, O)>,
    {
        Self {
            mapping: mapping
                .into_iter()
                .map(|(n, o)| (n.into(), o.into()))
                .collect(),
        }
    }
}

impl Filter for FieldRenamer {
    fn name(&self) -> &'static str {
        "field_renamer"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        for (new_name, old_name) in &self.mapping {
            record.rename(old_name, new_name);
        }
        Ok(record)
    }
}

/// Adds a field with a default value when it is not already present.
pub struct FieldAdder {
    field: String,
    default: FieldValue,
}

impl FieldAdder {
    pub fn new(field: impl Into<String>, default: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            default: default.into(),
        }
    }
}

impl Filter for FieldAdder {
    fn name(&self) -> &'static str {
        "field_adder"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        if !record.contains(&self.field) {
            record.set(self.field.clone(), self.default.clone());
        }
        Ok(record)
    }
}

/// Joins several fields into one, removing the merged sources.
pub struct FieldMerger {
    target: String,
    sources: Vec<String>,
    separator: String,
}

impl FieldMerger {
    pub fn new<S: Into<String>>(target: impl Into<String>, sources: impl IntoIterator<Item = S>) -> Self {
        Self {
            target: target.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            separator: " ".to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

impl Filter for FieldMerger {
    fn name(&self) -> &'static str {
        "field_merger"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        let merged = record.values_for(&self.sources).join(&self.separator);
        for source in &self.sources {
            if source != &self.target {
                record.remove(source);
            }
        }
        record.set(self.target.clone(), merged);
        Ok(record)
    }
}

/// Drops every field not in the keep list.
pub struct FieldKeeper {
    fields: Vec<String>,
}

impl FieldKeeper {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for FieldKeeper {
    fn name(&self) -> &'static str {
        "field_keeper"
    }

    fn transform(&self, mut record: Record) -> Result<Record, RecordError> {
        record.retain(|name| self.fields.iter().any(|f| f == name));
        Ok(record)
    }
}
