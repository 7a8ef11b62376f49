//! Polling inbox watcher
//!
//! Scans the inbox at a fixed interval and reports files once their size and
//! modification time have held still across two consecutive scans, so a
//! collector that is still writing never hands over a truncated export.
//! Only regular files directly under the inbox are considered.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxEventKind {
    Created,
    Changed,
    Renamed { from: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEvent {
    pub path: PathBuf,
    pub kind: InboxEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
struct Pending {
    stamp: FileStamp,
    kind: InboxEventKind,
}

pub struct InboxWatcher {
    dir: PathBuf,
    interval: Duration,
    /// Files already reported, with the stamp they were reported at
    settled: HashMap<PathBuf, FileStamp>,
    /// Files seen once and waiting for a second identical scan
    pending: HashMap<PathBuf, Pending>,
}

impl InboxWatcher {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            settled: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Treat every file currently in the inbox as already reported
    ///
    /// Call before the catch-up pass so those files are left to it and only
    /// later arrivals produce events.
    pub fn seed(&mut self) -> io::Result<()> {
        self.settled = scan(&self.dir)?;
        self.pending.clear();
        debug!(dir = %self.dir.display(), files = self.settled.len(), "Watcher seeded");
        Ok(())
    }

    /// One scan of the inbox, returning the events it completes
    pub fn poll(&mut self) -> io::Result<Vec<InboxEvent>> {
        let current = scan(&self.dir)?;

        let vanished: Vec<(PathBuf, FileStamp)> = self
            .settled
            .iter()
            .filter(|(path, _)| !current.contains_key(*path))
            .map(|(path, stamp)| (path.clone(), *stamp))
            .collect();
        for (path, _) in &vanished {
            self.settled.remove(path);
        }
        self.pending.retain(|path, _| current.contains_key(path));

        let mut events = Vec::new();
        let mut paths: Vec<&PathBuf> = current.keys().collect();
        paths.sort();

        for path in paths {
            let stamp = current[path];

            if let Some(previous) = self.settled.get(path) {
                if *previous != stamp {
                    self.settled.remove(path);
                    self.pending.insert(
                        path.clone(),
                        Pending {
                            stamp,
                            kind: InboxEventKind::Changed,
                        },
                    );
                }
                continue;
            }

            if let Some(pending) = self.pending.get_mut(path) {
                if pending.stamp == stamp {
                    let kind = pending.kind.clone();
                    self.pending.remove(path);
                    self.settled.insert(path.clone(), stamp);
                    events.push(InboxEvent {
                        path: path.clone(),
                        kind,
                    });
                } else {
                    pending.stamp = stamp;
                }
                continue;
            }

            // A file that vanished this scan and reappeared under a new name
            // with an identical stamp was renamed, and was complete already.
            if let Some((from, _)) = vanished.iter().find(|(_, old)| *old == stamp) {
                self.settled.insert(path.clone(), stamp);
                events.push(InboxEvent {
                    path: path.clone(),
                    kind: InboxEventKind::Renamed { from: from.clone() },
                });
                continue;
            }

            self.pending.insert(
                path.clone(),
                Pending {
                    stamp,
                    kind: InboxEventKind::Created,
                },
            );
        }

        Ok(events)
    }

    /// Poll until `shutdown` flips to true or the receiver goes away
    pub async fn run(mut self, events: mpsc::Sender<InboxEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(dir = %self.dir.display(), interval_ms = self.interval.as_millis() as u64, "Inbox watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let batch = match self.poll() {
                        Ok(batch) => batch,
                        Err(e) => {
                            warn!(dir = %self.dir.display(), error = %e, "Inbox scan failed");
                            continue;
                        }
                    };

                    for event in batch {
                        debug!(file = %event.path.display(), kind = ?event.kind, "Inbox event");
                        if events.send(event).await.is_err() {
                            info!("Event receiver closed, inbox watcher stopping");
                            return;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Inbox watcher stopped");
                        return;
                    }
                }
            }
        }
    }
}

fn scan(dir: &Path) -> io::Result<HashMap<PathBuf, FileStamp>> {
    let mut files = HashMap::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Files can disappear between listing and stat
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        files.insert(
            entry.path(),
            FileStamp {
                len: metadata.len(),
                modified: metadata.modified().ok(),
            },
        );
    }

    Ok(files)
}
