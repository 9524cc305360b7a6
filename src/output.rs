use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{Phase, ProgressEvent, ProgressSink, RunReport};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Reports pipeline phases as log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.phase {
            Phase::Failed => tracing::error!(phase = %event.phase, "{}", event.message),
            _ => tracing::info!(phase = %event.phase, "{}", event.message),
        }
    }
}
