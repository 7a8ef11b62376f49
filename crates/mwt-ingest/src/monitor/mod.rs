//! Inbox monitoring and the per-file ingestion pipeline
//!
//! Layout under the inbox root:
//!
//! ```text
//! inbox/            raw drop zone
//! inbox/parser/     working area for files being converted
//! inbox/archive/    permanent copies, one per processed file name
//! ```
//!
//! A file moves through `Detected -> Archived -> Transformed -> Loaded ->
//! Aggregated`. The dedup check and the archive write happen under one lock
//! held for the whole pipeline, so two events for the same name can never
//! both pass the check. Errors end the pipeline for that file only; they are
//! logged with the last stage the file completed and the monitor carries on.

pub mod watcher;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::aggregate::Aggregator;
use crate::archive::DedupArchive;
use crate::codec;
use crate::config::InboxConfig;
use crate::error::Result;
use crate::identity::IdentityDeriver;
use crate::record::RecordKind;
use crate::sink::{ensure_table, Sink, Table};
use crate::transform;

pub use watcher::{InboxEvent, InboxEventKind, InboxWatcher};

pub const PARSER_DIR: &str = "parser";
pub const ARCHIVE_DIR: &str = "archive";

/// Events buffered between the watcher and the worker
const EVENT_QUEUE_CAPACITY: usize = 256;

/// The inbox directory triple
#[derive(Debug, Clone)]
pub struct InboxLayout {
    pub root: PathBuf,
    pub parser: PathBuf,
    pub archive: PathBuf,
}

impl InboxLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            parser: root.join(PARSER_DIR),
            archive: root.join(ARCHIVE_DIR),
            root,
        }
    }

    /// Create any missing directory of the layout
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.root, &self.parser, &self.archive] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Where a file is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Detected,
    Archived,
    Transformed,
    Loaded,
    Aggregated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Detected => "detected",
            Stage::Archived => "archived",
            Stage::Transformed => "transformed",
            Stage::Loaded => "loaded",
            Stage::Aggregated => "aggregated",
        };
        f.write_str(name)
    }
}

/// Result of one [`DirectoryMonitor::process_file`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Loaded { table: Table, rows: u64 },
    /// Already archived; the incoming copy was deleted
    Duplicate,
    /// Not a raw export, or gone before it could be picked up
    Ignored,
    /// Archived, but no table takes this kind of export
    Unrecognized,
}

/// Counts from a catch-up pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub loaded: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct DirectoryMonitor {
    layout: InboxLayout,
    raw_extension: String,
    normalized_extension: String,
    poll_interval: Duration,
    /// Per-directory lock around the dedup archive
    archive: Mutex<DedupArchive>,
    sink: Arc<dyn Sink>,
    aggregator: Arc<dyn Aggregator>,
    deriver: IdentityDeriver,
}

impl DirectoryMonitor {
    /// Prepare the inbox layout and open its archive
    pub fn new(
        config: &InboxConfig,
        sink: Arc<dyn Sink>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Result<Self> {
        let layout = InboxLayout::new(&config.root);
        layout.ensure()?;
        let archive = DedupArchive::open(&layout.archive)?;

        Ok(Self {
            layout,
            raw_extension: config.raw_extension.clone(),
            normalized_extension: config.normalized_extension.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            archive: Mutex::new(archive),
            sink,
            aggregator,
            deriver: IdentityDeriver::from_algorithm(config.sid_hash),
        })
    }

    pub fn layout(&self) -> &InboxLayout {
        &self.layout
    }

    /// Make `file_name` eligible for processing again
    pub async fn forget(&self, file_name: &str) -> Result<bool> {
        self.archive.lock().await.forget(file_name)
    }

    fn is_raw_export(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.raw_extension))
    }

    /// Run one inbox file through the pipeline
    ///
    /// Failures are logged here with the last stage the file completed, then
    /// returned.
    pub async fn process_file(&self, path: &Path) -> Result<FileOutcome> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(FileOutcome::Ignored);
        };

        if !self.is_raw_export(path) {
            debug!(file = %file_name, "Not a raw export, ignoring");
            return Ok(FileOutcome::Ignored);
        }

        let archive = self.archive.lock().await;
        let mut reached = Stage::Idle;

        let result = self
            .run_pipeline(&archive, path, file_name, &mut reached)
            .await;

        if let Err(e) = &result {
            error!(file = %file_name, reached = %reached, error = %e, "File processing failed");
        }

        result
    }

    async fn run_pipeline(
        &self,
        archive: &DedupArchive,
        path: &Path,
        file_name: &str,
        stage: &mut Stage,
    ) -> Result<FileOutcome> {
        // Events can trail the file's removal by a previous event
        if !tokio::fs::try_exists(path).await? {
            debug!(file = %file_name, "File no longer in inbox");
            return Ok(FileOutcome::Ignored);
        }
        *stage = Stage::Detected;

        if archive.is_processed(file_name) {
            tokio::fs::remove_file(path).await?;
            info!(file = %file_name, "Duplicate file discarded");
            return Ok(FileOutcome::Duplicate);
        }

        let working = self.layout.parser.join(file_name);
        tokio::fs::rename(path, &working).await?;
        archive.mark_processed(&working, file_name)?;
        *stage = Stage::Archived;

        let kind = RecordKind::from_file_name(file_name);
        let Some(table) = kind.table() else {
            tokio::fs::remove_file(&working).await?;
            warn!(file = %file_name, "Unrecognized export kind, archived without loading");
            return Ok(FileOutcome::Unrecognized);
        };

        let text = tokio::fs::read_to_string(&working).await?;
        let rows = transform::normalize(file_name, &text, &self.deriver)?;
        let normalized = self.layout.parser.join(self.normalized_name(file_name));
        tokio::fs::write(&normalized, codec::encode(&rows)?).await?;
        tokio::fs::remove_file(&working).await?;
        *stage = Stage::Transformed;
        debug!(file = %file_name, kind = %kind, rows = rows.len(), "File transformed");

        let loaded = if rows.is_empty() {
            info!(file = %file_name, "No rows left after filtering, nothing to load");
            0
        } else {
            ensure_table(self.sink.as_ref(), table).await?;
            self.sink.bulk_load(table, &rows).await?
        };
        *stage = Stage::Loaded;

        self.aggregator.aggregate().await?;
        *stage = Stage::Aggregated;

        tokio::fs::remove_file(&normalized).await?;
        info!(file = %file_name, table = %table, rows = loaded, "File ingested");
        *stage = Stage::Idle;

        Ok(FileOutcome::Loaded {
            table,
            rows: loaded,
        })
    }

    fn normalized_name(&self, file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        format!("{}.{}", stem, self.normalized_extension)
    }

    /// Push every file already in the inbox through the pipeline once
    pub async fn process_existing(&self) -> Result<PassSummary> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.layout.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => paths.push(entry.path()),
                Ok(_) => {},
                // Gone between listing and stat
                Err(e) => debug!(file = %entry.path().display(), error = %e, "Skipping inbox entry"),
            }
        }
        paths.sort();

        let mut summary = PassSummary::default();
        for path in paths {
            match self.process_file(&path).await {
                Ok(FileOutcome::Loaded { .. }) => summary.loaded += 1,
                Ok(FileOutcome::Duplicate) => summary.duplicates += 1,
                Ok(FileOutcome::Ignored | FileOutcome::Unrecognized) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }

        info!(
            loaded = summary.loaded,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            failed = summary.failed,
            "Catch-up pass completed"
        );

        Ok(summary)
    }

    /// Process the file behind a watcher event; never fails
    pub async fn handle_event(&self, event: InboxEvent) {
        if let InboxEventKind::Renamed { from } = &event.kind {
            debug!(from = %from.display(), to = %event.path.display(), "File renamed in inbox");
        }

        if let Ok(outcome) = self.process_file(&event.path).await {
            debug!(file = %event.path.display(), outcome = ?outcome, "Event handled");
        }
    }

    /// Catch up on the inbox, then follow it until `shutdown` is signalled
    ///
    /// Events already queued when the signal arrives are still processed.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut watcher = InboxWatcher::new(&self.layout.root, self.poll_interval);
        watcher.seed()?;

        self.process_existing().await?;

        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let watcher_task = tokio::spawn(watcher.run(tx, shutdown));

        info!(inbox = %self.layout.root.display(), "Watching inbox");

        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }

        if let Err(e) = watcher_task.await {
            error!(error = %e, "Inbox watcher task failed");
        }

        info!("Directory monitor stopped");
        Ok(())
    }
}
