//! Processed-file archive
//!
//! Every export the monitor accepts is copied into `archive/` before it is
//! transformed. The copy is the durable "already processed" marker: a file
//! whose name is present there is discarded when it shows up again, even
//! across restarts. Alongside the copies, `archive/.processed.jsonl` keeps
//! one line per archived file with its checksum and size so operators can
//! audit what was ingested and when.
//!
//! Archive copies are never overwritten. [`DedupArchive::forget`] is the only
//! way to make a name eligible for processing again. Nothing about the
//! processed set is held in memory, so a `forget` through another handle (the
//! operator CLI next to a running monitor) takes effect on the next check.
//! The ledger is informational: unreadable lines are skipped with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use mwt_common::checksum::sha256_file;

use crate::error::Result;

/// Ledger file name inside the archive directory
pub const LEDGER_FILE_NAME: &str = ".processed.jsonl";

/// Scratch file the ledger is rewritten into before replacing it
const LEDGER_REWRITE_NAME: &str = ".processed.jsonl.tmp";

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_name: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub archived_at: DateTime<Utc>,
}

/// Archive directory handle
#[derive(Debug)]
pub struct DedupArchive {
    dir: PathBuf,
}

impl DedupArchive {
    /// Open (creating if needed) the archive at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let archive = Self { dir };
        debug!(dir = %archive.dir.display(), entries = archive.entries()?.len(), "Archive opened");

        Ok(archive)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE_NAME)
    }

    fn copy_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Whether `file_name` has been archived before
    ///
    /// Only the archive copy counts. A copy without a ledger line (the ledger
    /// was lost or the copy was placed by hand) is still processed.
    pub fn is_processed(&self, file_name: &str) -> bool {
        self.copy_path(file_name).exists()
    }

    /// Copy `source` into the archive under `file_name` and record it
    ///
    /// Fails with `AlreadyExists` if a copy with that name is already there.
    pub fn mark_processed(&self, source: &Path, file_name: &str) -> Result<ProcessedFile> {
        let target = self.copy_path(file_name);

        let mut input = fs::File::open(source)?;
        let mut output = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;
        let size_bytes = io::copy(&mut input, &mut output)?;
        output.sync_all()?;

        let mut permissions = output.metadata()?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&target, permissions)?;

        let entry = ProcessedFile {
            file_name: file_name.to_string(),
            sha256: sha256_file(&target)?,
            size_bytes,
            archived_at: Utc::now(),
        };

        serde_jsonlines::append_json_lines(self.ledger_path(), [&entry])?;

        info!(file = %file_name, sha256 = %entry.sha256, size = size_bytes, "File archived");

        Ok(entry)
    }

    /// All readable ledger entries, oldest first
    ///
    /// A line that does not parse (for example one torn by a crash during an
    /// append) is logged and skipped.
    pub fn entries(&self) -> Result<Vec<ProcessedFile>> {
        let ledger = self.ledger_path();
        if !ledger.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for (index, entry) in serde_jsonlines::json_lines::<ProcessedFile, _>(&ledger)?.enumerate() {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                    ) =>
                {
                    warn!(ledger = %ledger.display(), line = index + 1, error = %e, "Skipping unreadable ledger line");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(entries)
    }

    /// Drop the archive copy and ledger line for `file_name`
    ///
    /// Returns false when the name was not known to the archive.
    pub fn forget(&self, file_name: &str) -> Result<bool> {
        let mut found = false;

        let entries = self.entries()?;
        let kept: Vec<&ProcessedFile> = entries.iter().filter(|e| e.file_name != file_name).collect();
        if kept.len() != entries.len() {
            let rewrite = self.dir.join(LEDGER_REWRITE_NAME);
            serde_jsonlines::write_json_lines(&rewrite, kept)?;
            fs::rename(&rewrite, self.ledger_path())?;
            found = true;
        }

        let copy = self.copy_path(file_name);
        if copy.exists() {
            let mut permissions = fs::metadata(&copy)?.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(&copy, permissions)?;
            fs::remove_file(&copy)?;
            found = true;
        }

        if found {
            info!(file = %file_name, "Removed from archive, eligible for processing again");
        } else {
            warn!(file = %file_name, "Not found in archive");
        }

        Ok(found)
    }
}
