use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BackupManifest, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Non-interactive surface: progress goes to the log, the manifest to stdout.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_manifest(manifest: &BackupManifest) -> io::Result<()> {
        Self::print_json(manifest)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        tracing::info!(
            state = %event.state,
            processed = event.counters.processed,
            succeeded = event.counters.succeeded,
            total = event.counters.total,
            "{}",
            event.message
        );
    }
}
