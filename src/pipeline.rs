use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::delivery::{DeliveryChannel, Notifier, deliver_all};
use crate::domain::{DEFAULT_CHUNK_SIZE, IdentifierColumn, OfferRecord, chunk_identifiers};
use crate::error::SourcingError;
use crate::lookup::PartLookup;
use crate::sheet;

pub const OUTPUT_SUFFIX: &str = "_response.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Archived,
    Loaded,
    Chunked,
    Queried,
    Aggregated,
    Written,
    Delivered,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Archived => "Archived",
            Phase::Loaded => "Loaded",
            Phase::Chunked => "Chunked",
            Phase::Queried => "Queried",
            Phase::Aggregated => "Aggregated",
            Phase::Written => "Written",
            Phase::Delivered => "Delivered",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub parallelism: usize,
    pub output_dir: Utf8PathBuf,
    pub column: IdentifierColumn,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallelism: 1,
            output_dir: Utf8PathBuf::from("uploads"),
            column: IdentifierColumn::First,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: String,
    pub output: String,
    pub identifiers: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub records: usize,
    pub delivered: Vec<String>,
}

/// Input spreadsheet in, enriched spreadsheet out, then fanned out to every
/// delivery channel.
pub struct Pipeline<L: PartLookup> {
    lookup: L,
    archive: Option<Box<dyn DeliveryChannel>>,
    channels: Vec<Box<dyn DeliveryChannel>>,
    notifier: Option<Box<dyn Notifier>>,
    options: PipelineOptions,
}

impl<L: PartLookup> Pipeline<L> {
    pub fn new(lookup: L, options: PipelineOptions) -> Self {
        Self {
            lookup,
            archive: None,
            channels: Vec::new(),
            notifier: None,
            options,
        }
    }

    pub fn with_channel(mut self, channel: Box<dyn DeliveryChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Copies every input file through `channel` before it is read. A failed
    /// copy aborts the run.
    pub fn with_archive(mut self, channel: Box<dyn DeliveryChannel>) -> Self {
        self.archive = Some(channel);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// `<output_dir>/<input stem>_response.xlsx`
    pub fn output_path(&self, input: &Utf8Path) -> Result<Utf8PathBuf, SourcingError> {
        let stem = input
            .file_stem()
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| SourcingError::MalformedInput(format!("{input} has no file name")))?;
        Ok(self.options.output_dir.join(format!("{stem}{OUTPUT_SUFFIX}")))
    }

    pub fn run(&self, input: &Utf8Path, sink: &dyn ProgressSink) -> Result<RunReport, SourcingError> {
        let result = self.run_inner(input, sink);
        if let Err(err) = &result {
            sink.event(ProgressEvent {
                phase: Phase::Failed,
                message: format!("{input}: {err}"),
            });
        }
        result
    }

    fn run_inner(
        &self,
        input: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, SourcingError> {
        if let Some(archive) = &self.archive {
            if !input.as_std_path().is_file() {
                return Err(SourcingError::InputNotFound(input.to_string()));
            }
            archive.deliver(input)?;
            sink.event(ProgressEvent {
                phase: Phase::Archived,
                message: format!("{input} via {}", archive.name()),
            });
        }

        let batch = sheet::read_identifiers(input, &self.options.column)?;
        sink.event(ProgressEvent {
            phase: Phase::Loaded,
            message: format!("{} identifiers from {input}", batch.len()),
        });

        let chunks = chunk_identifiers(&batch, self.options.chunk_size);
        sink.event(ProgressEvent {
            phase: Phase::Chunked,
            message: format!(
                "{} chunks of up to {}",
                chunks.len(),
                self.options.chunk_size
            ),
        });

        let mut records = Vec::new();
        let mut failed_chunks = 0usize;
        for (index, result) in self.query_chunks(&chunks).into_iter().enumerate() {
            match result {
                Ok(chunk_records) => records.extend(chunk_records),
                Err(err) if err.is_chunk_recoverable() => {
                    failed_chunks += 1;
                    tracing::error!(chunk = index + 1, error = %err, "chunk lookup failed, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        sink.event(ProgressEvent {
            phase: Phase::Queried,
            message: format!(
                "{} records, {failed_chunks} of {} chunks failed",
                records.len(),
                chunks.len()
            ),
        });

        if records.is_empty() {
            return Err(SourcingError::NoData(input.to_string()));
        }
        sink.event(ProgressEvent {
            phase: Phase::Aggregated,
            message: format!("{} offer rows", records.len()),
        });

        let output = self.output_path(input)?;
        sheet::write_offers(&output, &records)?;
        sink.event(ProgressEvent {
            phase: Phase::Written,
            message: output.to_string(),
        });

        let outcome = deliver_all(&self.channels, &output);
        self.notify(&records);
        let delivered = outcome.into_result()?;
        sink.event(ProgressEvent {
            phase: Phase::Delivered,
            message: if delivered.is_empty() {
                "no delivery channels configured".to_string()
            } else {
                delivered.join(", ")
            },
        });

        let report = RunReport {
            input: input.to_string(),
            output: output.to_string(),
            identifiers: batch.len(),
            chunks: chunks.len(),
            failed_chunks,
            records: records.len(),
            delivered,
        };
        sink.event(ProgressEvent {
            phase: Phase::Done,
            message: format!("{} -> {}", report.input, report.output),
        });
        Ok(report)
    }

    fn notify(&self, records: &[OfferRecord]) {
        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify(records) {
                tracing::error!(error = %err, "enterprise notification failed");
            }
        }
    }

    /// Results come back in chunk order whatever the parallelism.
    fn query_chunks(&self, chunks: &[&[String]]) -> Vec<Result<Vec<OfferRecord>, SourcingError>> {
        let workers = self.options.parallelism.min(chunks.len());
        if workers <= 1 {
            return chunks.iter().map(|chunk| self.lookup.lookup(chunk)).collect();
        }

        let next = AtomicUsize::new(0);
        let mut slots: Vec<Option<Result<Vec<OfferRecord>, SourcingError>>> =
            (0..chunks.len()).map(|_| None).collect();
        let finished = thread::scope(|scope| {
            let handles = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(chunk) = chunks.get(index) else {
                                break;
                            };
                            done.push((index, self.lookup.lookup(chunk)));
                        }
                        done
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect::<Vec<_>>()
        });
        for (index, result) in finished {
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(SourcingError::Lookup("chunk worker panicked".to_string())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl PartLookup for Nothing {
        fn lookup(&self, _chunk: &[String]) -> Result<Vec<OfferRecord>, SourcingError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn output_path_from_input_stem() {
        let pipeline = Pipeline::new(
            Nothing,
            PipelineOptions {
                output_dir: Utf8PathBuf::from("out"),
                ..PipelineOptions::default()
            },
        );
        let path = pipeline
            .output_path(Utf8Path::new("/srv/ftp_uploads/bom-2024.xlsx"))
            .unwrap();
        assert_eq!(path, Utf8PathBuf::from("out/bom-2024_response.xlsx"));
    }

    #[test]
    fn phase_names() {
        assert_eq!(Phase::Queried.to_string(), "Queried");
        assert_eq!(Phase::Failed.to_string(), "Failed");
    }
}
