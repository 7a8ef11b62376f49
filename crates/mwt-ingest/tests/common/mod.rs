//! Shared fixtures for the ingestion integration tests
//!
//! In-memory stand-ins for the PostgreSQL sink and aggregator, plus helpers
//! to lay out an inbox and write export files into it.

#![allow(dead_code)]

use async_trait::async_trait;
use mwt_ingest::aggregate::{AggregateOutcome, Aggregator};
use mwt_ingest::config::InboxConfig;
use mwt_ingest::monitor::DirectoryMonitor;
use mwt_ingest::sink::{Sink, Table, TableSchema};
use mwt_ingest::{IngestError, Record, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const RADIO_LINK_FILE: &str = "RADIO_LINK_POWER_SITE1_20240102_030405.txt";
pub const RF_INPUT_FILE: &str = "SOEM1_TN_RFInputPower_20240102_030405.txt";

pub const RADIO_LINK_HEADER: &str = "NodeName,NeId,Object,Time,Interval,Direction,NeAlias,NeType,Position,\
RxLevelBelowTS1,RxLevelBelowTS2,MinRxLevel,MaxRxLevel,TxLevelAboveTS1,MinTxLevel,MaxTxLevel,\
FailureDescription,IdLogNum";

pub const RF_INPUT_HEADER: &str = "NodeName,NeId,Object,Time,Interval,Direction,NeAlias,NeType,Position,\
RFInputPower,MeanRxLevel1m,TID,FarEndTID,FailureDescription,IdLogNum";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mwt_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// One radio link export line
pub fn radio_link_row(object: &str, failure: &str) -> String {
    format!(
        "N1,101,{object},2024-01-02 03:00:00,15,-,NE-A,TYPE-X,1,0,0,-45.0,-41.5,0,10.0,12.0,{failure},9"
    )
}

/// One RF input export line
pub fn rf_input_row(object: &str, far_end: &str) -> String {
    format!("N1,101,{object},2024-01-02 03:00:00,15,-,NE-A,TYPE-X,1,-40.1,-40.0,T1,{far_end},-,9")
}

pub fn export(header: &str, rows: &[String]) -> String {
    let mut text = String::from(header);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

/// Sink that keeps loaded rows in memory
#[derive(Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<Table, Vec<Record>>>,
    created: Mutex<Vec<Table>>,
    load_calls: AtomicUsize,
    fail_loads: AtomicBool,
}

impl MemorySink {
    pub fn rows(&self, table: Table) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<Table> {
        self.created.lock().unwrap().clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_loads.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn table_exists(&self, table: Table) -> Result<bool> {
        Ok(self.created.lock().unwrap().contains(&table))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        self.created.lock().unwrap().push(schema.table);
        Ok(())
    }

    async fn bulk_load(&self, table: Table, rows: &[Record]) -> Result<u64> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(IngestError::load(table.name(), "connection reset"));
        }

        self.tables
            .lock()
            .unwrap()
            .entry(table)
            .or_default()
            .extend_from_slice(rows);
        Ok(rows.len() as u64)
    }
}

/// Aggregator that only counts how often it was triggered
#[derive(Default)]
pub struct CountingAggregator {
    calls: AtomicUsize,
}

impl CountingAggregator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Aggregator for CountingAggregator {
    async fn aggregate(&self) -> Result<AggregateOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AggregateOutcome::Refreshed)
    }
}

/// A temporary inbox with a monitor wired to in-memory doubles
pub struct TestInbox {
    pub temp: TempDir,
    pub sink: Arc<MemorySink>,
    pub aggregator: Arc<CountingAggregator>,
    pub monitor: DirectoryMonitor,
}

impl TestInbox {
    pub fn new() -> Self {
        Self::with_poll_interval(1000)
    }

    pub fn with_poll_interval(poll_interval_ms: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let config = InboxConfig {
            root: temp.path().join("inbox"),
            poll_interval_ms,
            ..InboxConfig::default()
        };

        let sink = Arc::new(MemorySink::default());
        let aggregator = Arc::new(CountingAggregator::default());
        let monitor = DirectoryMonitor::new(&config, sink.clone(), aggregator.clone()).unwrap();

        Self {
            temp,
            sink,
            aggregator,
            monitor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.monitor.layout().root
    }

    pub fn drop_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn archived(&self, name: &str) -> bool {
        self.monitor.layout().archive.join(name).exists()
    }

    pub fn parser_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.monitor.layout().parser)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Poll `condition` every 20ms until it holds or ten seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    true
}
