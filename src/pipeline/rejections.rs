use tracing::{debug, warn};

use crate::error::RecordError;
use crate::types::Record;

/// A record that did not reach the emitters.
#[derive(Debug)]
pub enum Rejection {
    /// Dropped by an admission gate. Not an error.
    Skipped {
        index: usize,
        stage: &'static str,
        record: Record,
    },
    /// A stage failed on this record. `record` is `None` when the source row itself was unreadable.
    Failed {
        index: usize,
        stage: &'static str,
        record: Option<Record>,
        error: RecordError,
    },
}

impl Rejection {
    pub fn is_error(&self) -> bool {
        matches!(self, Rejection::Failed { .. })
    }

    pub fn index(&self) -> usize {
        match self {
            Rejection::Skipped { index, .. } | Rejection::Failed { index, .. } => *index,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Rejection::Skipped { stage, .. } | Rejection::Failed { stage, .. } => stage,
        }
    }
}

/// Side channel for skipped and failed records, kept apart from the emitters.
pub trait ErrorStream {
    fn report(&mut self, rejection: Rejection);
}

/// Logs skips at debug level and failures at warn level.
#[derive(Debug, Default)]
pub struct LogErrorStream {
    skipped: usize,
    failed: usize,
}

impl LogErrorStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}

impl ErrorStream for LogErrorStream {
    fn report(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Skipped { index, stage, .. } => {
                self.skipped += 1;
                debug!(index, stage, "Record skipped");
            }
            Rejection::Failed {
                index,
                stage,
                record,
                error,
            } => {
                self.failed += 1;
                warn!(index, stage, record = ?record, "Record failed: {}", error);
            }
        }
    }
}

/// Keeps every rejection in memory.
#[derive(Debug, Default)]
pub struct CollectingErrorStream {
    pub rejections: Vec<Rejection>,
}

impl ErrorStream for CollectingErrorStream {
    fn report(&mut self, rejection: Rejection) {
        self.rejections.push(rejection);
    }
}
