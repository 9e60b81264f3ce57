use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::auth::Authenticator;
use crate::catalog::{Catalog, CatalogBuilder};
use crate::domain::{BackupMode, RemoteObject, Subject};
use crate::error::BackupError;
use crate::fs_util;
use crate::layout::{BackupLayout, RunStamp};
use crate::materialize::{Materialized, Materializer};
use crate::resolver::PathResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Authenticating,
    Listing,
    Processing,
    Completed,
    Failed,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Authenticating => "Authenticating",
            RunState::Listing => "Listing",
            RunState::Processing => "Processing",
            RunState::Completed => "Completed",
            RunState::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Authenticating)
                | (RunState::Authenticating, RunState::Listing)
                | (RunState::Listing, RunState::Processing)
                | (RunState::Processing, RunState::Completed)
                | (
                    RunState::Authenticating | RunState::Listing | RunState::Processing,
                    RunState::Failed
                )
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub state: RunState,
    pub counters: Counters,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupManifest {
    pub subject: String,
    pub mode: BackupMode,
    pub run_root: String,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub found: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailureRecord>,
    pub tool: String,
}

impl BackupManifest {
    fn new(subject: &Subject, mode: BackupMode, run_root: &Utf8Path) -> Self {
        Self {
            subject: subject.to_string(),
            mode,
            run_root: run_root.to_string(),
            started_at: Local::now(),
            finished_at: None,
            found: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            tool: format!("gdrive-backup/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn record(&mut self, object: &RemoteObject, outcome: &Materialized) {
        match outcome {
            Materialized::Failed { path, reason } => {
                self.record_failure(object, Some(path), reason.clone());
            }
            Materialized::Unsupported { .. } => self.skipped += 1,
            _ => self.succeeded += 1,
        }
    }

    fn record_failure(
        &mut self,
        object: &RemoteObject,
        path: Option<&Utf8PathBuf>,
        reason: String,
    ) {
        self.failed += 1;
        self.failures.push(FailureRecord {
            id: object.id.to_string(),
            name: object.name.clone(),
            path: path.map(|path| path.to_string()),
            reason,
        });
    }
}

/// Tracks run state and counters, and forwards every change to the sink.
struct RunTracker<'s> {
    sink: &'s dyn ProgressSink,
    state: RunState,
    counters: Counters,
    started: Instant,
}

impl<'s> RunTracker<'s> {
    fn new(sink: &'s dyn ProgressSink) -> Self {
        Self {
            sink,
            state: RunState::Idle,
            counters: Counters::default(),
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: RunState, message: impl Into<String>) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid run transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.log(message);
    }

    fn log(&self, message: impl Into<String>) {
        self.sink.event(ProgressEvent {
            timestamp: Local::now(),
            message: message.into(),
            state: self.state,
            counters: self.counters,
            elapsed: Some(self.started.elapsed()),
        });
    }

    fn tick(&mut self, outcome: &Materialized, message: impl Into<String>) {
        self.counters.processed += 1;
        match outcome {
            Materialized::Failed { .. } => self.counters.failed += 1,
            Materialized::Unsupported { .. } => self.counters.skipped += 1,
            _ => self.counters.succeeded += 1,
        }
        self.log(message);
    }

    fn tick_failed(&mut self, message: impl Into<String>) {
        self.counters.processed += 1;
        self.counters.failed += 1;
        self.log(message);
    }

    fn fail(&mut self, err: BackupError) -> BackupError {
        self.transition(RunState::Failed, format!("backup failed: {err}"));
        err
    }
}

#[derive(Clone)]
pub struct App<A: Authenticator> {
    layout: BackupLayout,
    auth: A,
}

impl<A: Authenticator> App<A> {
    pub fn new(layout: BackupLayout, auth: A) -> Self {
        Self { layout, auth }
    }

    pub fn layout(&self) -> &BackupLayout {
        &self.layout
    }

    /// Backs up every object visible to `subject` under a dated run directory.
    pub fn full_backup(
        &self,
        subject: &Subject,
        sink: &dyn ProgressSink,
    ) -> Result<BackupManifest, BackupError> {
        let mut tracker = RunTracker::new(sink);

        tracker.transition(RunState::Authenticating, format!("authenticating as {subject}"));
        let client = self
            .auth
            .authenticate(subject)
            .map_err(|err| tracker.fail(err))?;

        tracker.transition(RunState::Listing, "fetching file list");
        let catalog = CatalogBuilder::new(&client)
            .list_all_with_progress(|count| {
                tracker.log(format!("retrieved {count} objects so far"))
            })
            .map_err(|err| tracker.fail(err))?;

        let run_root = self
            .layout
            .ensure_run_root(subject, RunStamp::today())
            .map_err(|err| tracker.fail(err))?;
        let mut manifest = BackupManifest::new(subject, BackupMode::Full, &run_root);
        manifest.found = catalog.len();
        tracker.counters.total = catalog.len();
        tracker.transition(
            RunState::Processing,
            format!("found {} objects; writing to {run_root}", catalog.len()),
        );

        let materializer = Materializer::new(&client);
        let mut resolver = PathResolver::new();
        for object in catalog.iter() {
            let relative = resolver.resolve(&catalog, &object.id);
            let outcome = materializer.materialize(object, &run_root.join(&relative));
            manifest.record(object, &outcome);
            let message = progress_message(&tracker.counters, &relative, &outcome);
            tracker.tick(&outcome, message);
        }

        Ok(self.complete(&mut tracker, manifest, &run_root))
    }

    /// Backs up every object whose name equals one of `names`, fetching each
    /// match's ancestors on demand so it lands at its full path.
    pub fn targeted_backup(
        &self,
        subject: &Subject,
        names: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<BackupManifest, BackupError> {
        let mut seen = HashSet::new();
        let names = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty() && seen.insert(*name))
            .collect::<Vec<_>>();
        if names.is_empty() {
            return Err(BackupError::EmptyNameList);
        }

        let mut tracker = RunTracker::new(sink);
        tracker.transition(RunState::Authenticating, format!("authenticating as {subject}"));
        let client = self
            .auth
            .authenticate(subject)
            .map_err(|err| tracker.fail(err))?;

        tracker.transition(
            RunState::Listing,
            format!("searching for {} file names", names.len()),
        );
        let builder = CatalogBuilder::new(&client);
        let mut catalog = Catalog::new();
        let mut matches = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let found = builder
                .list_by_name(name)
                .map_err(|err| tracker.fail(err))?;
            if found.is_empty() {
                tracker.log(format!("[{}/{}] no files named {name}", index + 1, names.len()));
                continue;
            }
            tracker.log(format!(
                "[{}/{}] {} files named {name}",
                index + 1,
                names.len(),
                found.len()
            ));
            for object in found {
                if catalog.insert(object.clone()) {
                    matches.push(object);
                }
            }
        }

        let run_root = self
            .layout
            .ensure_run_root(subject, RunStamp::SpecificFiles)
            .map_err(|err| tracker.fail(err))?;
        let mut manifest = BackupManifest::new(subject, BackupMode::Targeted, &run_root);
        manifest.found = matches.len();
        tracker.counters.total = matches.len();
        tracker.transition(
            RunState::Processing,
            format!("found {} matches; writing to {run_root}", matches.len()),
        );

        let materializer = Materializer::new(&client);
        let mut resolver = PathResolver::new();
        for object in &matches {
            if let Err(err) = builder.fetch_ancestors(object, &mut catalog) {
                tracing::warn!(
                    object_id = %object.id,
                    name = %object.name,
                    error = %err,
                    "ancestor lookup failed"
                );
                manifest.record_failure(object, None, format!("ancestor metadata: {err}"));
                let message = format!(
                    "{}/{} failed {}: ancestor metadata: {err}",
                    tracker.counters.processed + 1,
                    tracker.counters.total,
                    object.name
                );
                tracker.tick_failed(message);
                continue;
            }
            let relative = resolver.resolve(&catalog, &object.id);
            let outcome = materializer.materialize(object, &run_root.join(&relative));
            manifest.record(object, &outcome);
            let message = progress_message(&tracker.counters, &relative, &outcome);
            tracker.tick(&outcome, message);
        }

        Ok(self.complete(&mut tracker, manifest, &run_root))
    }

    fn complete(
        &self,
        tracker: &mut RunTracker<'_>,
        mut manifest: BackupManifest,
        run_root: &Utf8Path,
    ) -> BackupManifest {
        manifest.finished_at = Some(Local::now());
        if let Err(err) = write_manifest(run_root, &manifest) {
            tracing::warn!(error = %err, "could not write run manifest");
            tracker.log(format!("could not write manifest: {err}"));
        }
        tracker.transition(
            RunState::Completed,
            format!(
                "backup complete: {} of {} objects saved to {run_root}",
                manifest.succeeded, manifest.found
            ),
        );
        manifest
    }
}

fn progress_message(counters: &Counters, relative: &Utf8Path, outcome: &Materialized) -> String {
    let position = format!("{}/{}", counters.processed + 1, counters.total);
    match outcome {
        Materialized::Directory { .. } => format!("{position} created folder {relative}"),
        Materialized::Downloaded { bytes, .. } => {
            format!("{position} downloaded {relative} ({bytes} bytes)")
        }
        Materialized::Exported { format, bytes, .. } => {
            format!("{position} exported {relative} as {format} ({bytes} bytes)")
        }
        Materialized::Unsupported { mime_type } => {
            format!("{position} skipped {relative}: unsupported type {mime_type}")
        }
        Materialized::Failed { reason, .. } => format!("{position} failed {relative}: {reason}"),
    }
}

fn write_manifest(run_root: &Utf8Path, manifest: &BackupManifest) -> Result<(), BackupError> {
    let content = serde_json::to_vec_pretty(manifest)
        .map_err(|err| BackupError::Filesystem(err.to_string()))?;
    fs_util::write_atomic(&BackupLayout::manifest_path(run_root), &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_transitions() {
        assert!(RunState::Idle.can_advance_to(RunState::Authenticating));
        assert!(RunState::Listing.can_advance_to(RunState::Failed));
        assert!(!RunState::Idle.can_advance_to(RunState::Processing));
        assert!(!RunState::Completed.can_advance_to(RunState::Failed));
        assert!(RunState::Failed.is_terminal());
    }
}
