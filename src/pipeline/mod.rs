// Record pipeline: source, processing stages and emitters

pub mod emit;
pub mod processing;
pub mod rejections;
pub mod source;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::error::{PipelineError, RecordError, Result};
use crate::pipeline::emit::Emitter;
use crate::pipeline::processing::filters::Filter;
use crate::pipeline::processing::geocode::GeocodeResolver;
use crate::pipeline::processing::quality_gate::ConditionalFilter;
use crate::pipeline::rejections::{ErrorStream, Rejection};
use crate::types::Record;

/// One step of the chain.
pub enum Stage {
    Filter(Box<dyn Filter>),
    Gate(Box<dyn ConditionalFilter>),
    Geocode(GeocodeResolver),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter(f) => f.name(),
            Stage::Gate(g) => g.name(),
            Stage::Geocode(_) => "geocode_resolver",
        }
    }
}

/// What happened to one record.
enum Outcome {
    Admitted(Record),
    Skipped {
        stage: &'static str,
        record: Record,
    },
    Failed {
        stage: &'static str,
        record: Record,
        error: RecordError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Done,
}

/// Counts for a complete run
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub total_records: usize,
    pub emitted_records: usize,
    pub skipped_records: usize,
    pub failed_records: usize,
    pub geocoder_calls: usize,
}

/// Threads records through an ordered list of stages into every emitter.
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
    emitters: Vec<Box<dyn Emitter>>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            emitters: Vec::new(),
            state: PipelineState::Running,
        }
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.stages.push(Stage::Filter(Box::new(filter)));
        self
    }

    pub fn gate(mut self, gate: impl ConditionalFilter + 'static) -> Self {
        self.stages.push(Stage::Gate(Box::new(gate)));
        self
    }

    pub fn geocode(mut self, resolver: GeocodeResolver) -> Self {
        self.stages.push(Stage::Geocode(resolver));
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn emitter(mut self, emitter: impl Emitter + 'static) -> Self {
        self.emitters.push(Box::new(emitter));
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs one record through the stages, stopping at the first skip or failure.
    async fn process_record(&mut self, mut record: Record) -> Outcome {
        for stage in self.stages.iter_mut() {
            match stage {
                Stage::Filter(filter) => {
                    // Keep a copy so a failure can be reported with its input
                    let input = record.clone();
                    record = match filter.transform(record) {
                        Ok(next) => next,
                        Err(error) => {
                            return Outcome::Failed {
                                stage: filter.name(),
                                record: input,
                                error,
                            }
                        }
                    };
                }
                Stage::Gate(gate) => match gate.admit(&record) {
                    Ok(true) => {}
                    Ok(false) => {
                        return Outcome::Skipped {
                            stage: gate.name(),
                            record,
                        }
                    }
                    Err(error) => {
                        return Outcome::Failed {
                            stage: gate.name(),
                            record,
                            error,
                        }
                    }
                },
                Stage::Geocode(resolver) => {
                    record = resolver.resolve(record).await;
                }
            }
        }
        Outcome::Admitted(record)
    }

    /// Feeds every record from `source` through the chain.
    ///
    /// Skips and per-record failures go to `errors` and never stop the run. Emitters are
    /// closed before returning on every path; an emitter write failure aborts the run.
    /// A pipeline runs once: afterwards it is [`PipelineState::Done`] and refuses new input.
    #[instrument(skip_all, fields(pipeline = %self.name))]
    pub async fn run<I>(&mut self, source: I, errors: &mut dyn ErrorStream) -> Result<RunSummary>
    where
        I: IntoIterator<Item = std::result::Result<Record, RecordError>>,
    {
        if self.state == PipelineState::Done {
            return Err(PipelineError::Config(format!(
                "pipeline {} has already run",
                self.name
            )));
        }
        info!("Starting pipeline {}", self.name);
        let mut summary = RunSummary {
            name: self.name.clone(),
            ..Default::default()
        };

        let driven = self.drive(source, errors, &mut summary).await;
        let closed = self.close_emitters();
        self.state = PipelineState::Done;

        summary.geocoder_calls = self
            .stages
            .iter()
            .map(|s| match s {
                Stage::Geocode(r) => r.external_calls(),
                _ => 0,
            })
            .sum();

        driven?;
        closed?;

        info!(
            "Pipeline {} finished: {} records, {} emitted, {} skipped, {} failed",
            summary.name,
            summary.total_records,
            summary.emitted_records,
            summary.skipped_records,
            summary.failed_records
        );
        Ok(summary)
    }

    async fn drive<I>(
        &mut self,
        source: I,
        errors: &mut dyn ErrorStream,
        summary: &mut RunSummary,
    ) -> Result<()>
    where
        I: IntoIterator<Item = std::result::Result<Record, RecordError>>,
    {
        for (index, item) in source.into_iter().enumerate() {
            summary.total_records += 1;
            counter!("contrib_records_total", "pipeline" => self.name.clone()).increment(1);

            let record = match item {
                Ok(record) => record,
                Err(error) => {
                    summary.failed_records += 1;
                    errors.report(Rejection::Failed {
                        index,
                        stage: "source",
                        record: None,
                        error,
                    });
                    continue;
                }
            };

            match self.process_record(record).await {
                Outcome::Admitted(record) => {
                    for emitter in self.emitters.iter_mut() {
                        emitter.emit(&record)?;
                    }
                    summary.emitted_records += 1;
                    counter!("contrib_records_emitted_total", "pipeline" => self.name.clone())
                        .increment(1);
                }
                Outcome::Skipped { stage, record } => {
                    summary.skipped_records += 1;
                    counter!("contrib_records_skipped_total", "pipeline" => self.name.clone())
                        .increment(1);
                    errors.report(Rejection::Skipped {
                        index,
                        stage,
                        record,
                    });
                }
                Outcome::Failed {
                    stage,
                    record,
                    error,
                } => {
                    summary.failed_records += 1;
                    counter!("contrib_records_failed_total", "pipeline" => self.name.clone())
                        .increment(1);
                    errors.report(Rejection::Failed {
                        index,
                        stage,
                        record: Some(record),
                        error,
                    });
                }
            }
        }
        Ok(())
    }

    /// Closes every emitter, even if an earlier one fails. Returns the first failure.
    fn close_emitters(&mut self) -> Result<()> {
        let mut first_err = None;
        for emitter in self.emitters.iter_mut() {
            if let Err(e) = emitter.close() {
                error!("Failed to close emitter: {}", e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        debug!("Closed {} emitters", self.emitters.len());
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::normalize::CurrencyParser;
    use crate::pipeline::processing::quality_gate::CandidateWhitelist;
    use crate::pipeline::rejections::CollectingErrorStream;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        records: Arc<Mutex<Vec<Record>>>,
        closes: Arc<Mutex<usize>>,
    }

    impl Emitter for Recorder {
        fn emit(&mut self, record: &Record) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            *self.closes.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct FailingEmitter;

    impl Emitter for FailingEmitter {
        fn emit(&mut self, _record: &Record) -> Result<()> {
            Err(PipelineError::Config("disk full".into()))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn row(candidate: &str, amount: &str) -> std::result::Result<Record, RecordError> {
        Ok(Record::from_pairs([("candidate", candidate), ("amount", amount)]))
    }

    #[tokio::test]
    async fn bad_records_are_reported_and_the_run_continues() {
        let recorder = Recorder::default();
        let mut errors = CollectingErrorStream::default();

        let mut pipeline = Pipeline::new("test")
            .filter(CurrencyParser::new("amount"))
            .gate(CandidateWhitelist::new(["John X"]))
            .emitter(recorder.clone());

        let source = vec![
            row("John X", "$10"),
            row("John X", "none"),
            row("Jane Y", "$5"),
            Err(RecordError::MalformedRow("bad bytes".into())),
            row("John X", "$2.50"),
        ];

        let summary = pipeline.run(source, &mut errors).await.unwrap();

        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.emitted_records, 2);
        assert_eq!(summary.skipped_records, 1);
        assert_eq!(summary.failed_records, 2);
        assert_eq!(recorder.records.lock().unwrap().len(), 2);
        assert_eq!(*recorder.closes.lock().unwrap(), 1);

        let stages: Vec<_> = errors.rejections.iter().map(|r| (r.index(), r.stage(), r.is_error())).collect();
        assert_eq!(
            stages,
            vec![
                (1, "currency_parser", true),
                (2, "candidate_whitelist", false),
                (3, "source", true),
            ]
        );
    }

    #[tokio::test]
    async fn gates_short_circuit_later_stages() {
        let recorder = Recorder::default();
        let mut errors = CollectingErrorStream::default();

        // The parser would fail on this amount, but the gate drops the record first
        let mut pipeline = Pipeline::new("test")
            .gate(CandidateWhitelist::new(["John X"]))
            .filter(CurrencyParser::new("amount"))
            .emitter(recorder.clone());

        let summary = pipeline
            .run(vec![row("Nobody", "garbage")], &mut errors)
            .await
            .unwrap();

        assert_eq!(summary.skipped_records, 1);
        assert_eq!(summary.failed_records, 0);
        assert!(!errors.rejections[0].is_error());
    }

    #[tokio::test]
    async fn emitters_are_closed_when_the_run_aborts() {
        let recorder = Recorder::default();
        let mut errors = CollectingErrorStream::default();

        let mut pipeline = Pipeline::new("test")
            .emitter(FailingEmitter)
            .emitter(recorder.clone());

        let result = pipeline.run(vec![row("John X", "1")], &mut errors).await;

        assert!(result.is_err());
        assert_eq!(*recorder.closes.lock().unwrap(), 1);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn finished_pipeline_refuses_a_second_run() {
        let recorder = Recorder::default();
        let mut errors = CollectingErrorStream::default();
        let mut pipeline = Pipeline::new("test").emitter(recorder.clone());
        assert_eq!(pipeline.state(), PipelineState::Running);

        let summary = pipeline.run(vec![row("John X", "1")], &mut errors).await.unwrap();
        assert_eq!(summary.emitted_records, 1);
        assert_eq!(pipeline.state(), PipelineState::Done);

        let again = pipeline.run(vec![row("John X", "2")], &mut errors).await;
        assert!(matches!(again, Err(PipelineError::Config(_))));
        assert_eq!(recorder.records.lock().unwrap().len(), 1);
        assert_eq!(*recorder.closes.lock().unwrap(), 1);
    }

    #[test]
    fn summary_serializes_as_flat_json() {
        let summary = RunSummary {
            name: "split".into(),
            total_records: 3,
            emitted_records: 2,
            skipped_records: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["name"], "split");
        assert_eq!(json["emitted_records"], 2);
        assert_eq!(json["geocoder_calls"], 0);
    }
}
