//! Directory monitor pipeline tests
//!
//! Each test drives real files through an inbox in a temporary directory,
//! with the sink and aggregator replaced by in-memory doubles.

mod common;

use anyhow::Result;
use common::*;
use mwt_ingest::archive::DedupArchive;
use mwt_ingest::monitor::{FileOutcome, PassSummary};
use mwt_ingest::sink::Table;
use mwt_ingest::IdentityDeriver;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[tokio::test]
async fn test_radio_link_file_is_split_and_loaded() -> Result<()> {
    init_tracing();
    let inbox = TestInbox::new();
    let path = inbox.drop_file(
        RADIO_LINK_FILE,
        &export(RADIO_LINK_HEADER, &[radio_link_row("1+2/3_ABC_NODE1_XYZ_NODE2", "-")]),
    );

    let outcome = inbox.monitor.process_file(&path).await?;
    assert_eq!(
        outcome,
        FileOutcome::Loaded {
            table: Table::RadioLink,
            rows: 2
        }
    );

    let rows = inbox.sink.rows(Table::RadioLink);
    assert_eq!(rows.len(), 2);
    let sid = IdentityDeriver::default()
        .network_sid("NE-A", "TYPE-X")
        .to_string();
    for (row, slot) in rows.iter().zip(["1", "2"]) {
        assert_eq!(row.get("NETWORK_SID"), Some(sid.as_str()));
        assert_eq!(row.get("DATETIME_KEY"), Some("2024-01-02 03:04:05"));
        assert_eq!(row.get("TID"), Some("NODE1"));
        assert_eq!(row.get("FARENDTID"), Some("NODE2"));
        assert_eq!(row.get("SLOT"), Some(slot));
        assert_eq!(row.get("PORT"), Some("3"));
        assert!(!row.contains("NodeName"));
    }

    assert_eq!(inbox.sink.created(), vec![Table::RadioLink]);
    assert_eq!(inbox.aggregator.calls(), 1);
    assert!(inbox.archived(RADIO_LINK_FILE));
    assert!(!path.exists());
    assert!(inbox.parser_files().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_rows_are_dropped_before_load() -> Result<()> {
    let inbox = TestInbox::new();
    let path = inbox.drop_file(
        RADIO_LINK_FILE,
        &export(
            RADIO_LINK_HEADER,
            &[
                radio_link_row("x/4/1_A_T1_B_T2", "link down"),
                radio_link_row("x/5/2_A_T1_B_T2", "-"),
            ],
        ),
    );

    inbox.monitor.process_file(&path).await?;

    let rows = inbox.sink.rows(Table::RadioLink);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("LINK"), Some("5/2"));

    Ok(())
}

#[tokio::test]
async fn test_rf_input_file_is_loaded() -> Result<()> {
    let inbox = TestInbox::new();
    let path = inbox.drop_file(
        RF_INPUT_FILE,
        &export(
            RF_INPUT_HEADER,
            &[rf_input_row("3.1/RX", "T2"), rf_input_row("4.1/RX", "----")],
        ),
    );

    let outcome = inbox.monitor.process_file(&path).await?;
    assert_eq!(
        outcome,
        FileOutcome::Loaded {
            table: Table::RfInput,
            rows: 1
        }
    );

    let rows = inbox.sink.rows(Table::RfInput);
    assert_eq!(rows[0].get("SLOT"), Some("3+"));
    assert_eq!(rows[0].get("PORT"), Some("1"));

    Ok(())
}

#[tokio::test]
async fn test_same_file_twice_loads_once() -> Result<()> {
    init_tracing();
    let inbox = TestInbox::new();
    let contents = export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]);

    let first = inbox.drop_file(RADIO_LINK_FILE, &contents);
    assert!(matches!(
        inbox.monitor.process_file(&first).await?,
        FileOutcome::Loaded { .. }
    ));

    info!("Dropping the same export again");
    let second = inbox.drop_file(RADIO_LINK_FILE, &contents);
    assert_eq!(inbox.monitor.process_file(&second).await?, FileOutcome::Duplicate);

    // the incoming copy is discarded, the archive keeps exactly one marker
    assert!(!second.exists());
    assert_eq!(inbox.sink.load_calls(), 1);
    assert_eq!(inbox.aggregator.calls(), 1);
    let archive = DedupArchive::open(&inbox.monitor.layout().archive)?;
    assert_eq!(archive.entries()?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_events_for_one_file_load_once() -> Result<()> {
    let inbox = TestInbox::new();
    let path = inbox.drop_file(
        RADIO_LINK_FILE,
        &export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]),
    );

    let (a, b) = tokio::join!(
        inbox.monitor.process_file(&path),
        inbox.monitor.process_file(&path)
    );

    let mut outcomes = vec![a?, b?];
    outcomes.sort_by_key(|o| matches!(o, FileOutcome::Loaded { .. }));
    assert_eq!(outcomes[0], FileOutcome::Ignored);
    assert!(matches!(outcomes[1], FileOutcome::Loaded { .. }));
    assert_eq!(inbox.sink.load_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_forget_allows_reprocessing() -> Result<()> {
    let inbox = TestInbox::new();
    let contents = export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]);

    let path = inbox.drop_file(RADIO_LINK_FILE, &contents);
    inbox.monitor.process_file(&path).await?;
    assert!(inbox.monitor.forget(RADIO_LINK_FILE).await?);

    let path = inbox.drop_file(RADIO_LINK_FILE, &contents);
    assert!(matches!(
        inbox.monitor.process_file(&path).await?,
        FileOutcome::Loaded { .. }
    ));
    assert_eq!(inbox.sink.load_calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_forget_from_separate_handle_reaches_running_monitor() -> Result<()> {
    let inbox = TestInbox::new();
    let contents = export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]);

    let path = inbox.drop_file(RADIO_LINK_FILE, &contents);
    inbox.monitor.process_file(&path).await?;

    // what `mwt-ingest forget` does while the watcher keeps running
    assert!(DedupArchive::open(&inbox.monitor.layout().archive)?.forget(RADIO_LINK_FILE)?);

    let path = inbox.drop_file(RADIO_LINK_FILE, &contents);
    assert_eq!(
        inbox.monitor.process_file(&path).await?,
        FileOutcome::Loaded {
            table: Table::RadioLink,
            rows: 1
        }
    );
    assert_eq!(inbox.sink.load_calls(), 2);
    assert!(inbox.archived(RADIO_LINK_FILE));

    Ok(())
}

#[tokio::test]
async fn test_malformed_file_is_archived_but_not_loaded() -> Result<()> {
    let inbox = TestInbox::new();
    let path = inbox.drop_file(
        RADIO_LINK_FILE,
        &export(
            RADIO_LINK_HEADER,
            &[
                radio_link_row("x/4/1_A_T1_B_T2", "-"),
                radio_link_row("nolink_A_T1_B_T2", "-"),
            ],
        ),
    );

    assert!(inbox.monitor.process_file(&path).await.is_err());

    assert_eq!(inbox.sink.load_calls(), 0);
    assert_eq!(inbox.aggregator.calls(), 0);
    // no automatic retry: the name stays marked until an operator forgets it
    assert!(inbox.archived(RADIO_LINK_FILE));
    assert_eq!(inbox.parser_files(), vec![RADIO_LINK_FILE.to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_short_row_is_rejected() -> Result<()> {
    let inbox = TestInbox::new();
    let path = inbox.drop_file(
        RADIO_LINK_FILE,
        &format!("{}\nN1,101,x/4/1_A_T1_B_T2\n", RADIO_LINK_HEADER),
    );

    let err = inbox.monitor.process_file(&path).await.unwrap_err();
    assert!(matches!(err, mwt_ingest::IngestError::MalformedRow { line: 2, .. }));
    assert_eq!(inbox.sink.load_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_load_failure_keeps_normalized_file() -> Result<()> {
    let inbox = TestInbox::new();
    inbox.sink.set_failing(true);
    let path = inbox.drop_file(
        RADIO_LINK_FILE,
        &export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]),
    );

    let err = inbox.monitor.process_file(&path).await.unwrap_err();
    assert!(matches!(err, mwt_ingest::IngestError::Load { .. }));
    assert_eq!(inbox.aggregator.calls(), 0);
    assert_eq!(
        inbox.parser_files(),
        vec!["RADIO_LINK_POWER_SITE1_20240102_030405.csv".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn test_unrecognized_and_foreign_files() -> Result<()> {
    let inbox = TestInbox::new();
    let unknown = inbox.drop_file("ETHERNET_STATS_20240102_030405.txt", "A,B\n1,2\n");
    let foreign = inbox.drop_file("notes.md", "hello");

    assert_eq!(inbox.monitor.process_file(&unknown).await?, FileOutcome::Unrecognized);
    assert_eq!(inbox.monitor.process_file(&foreign).await?, FileOutcome::Ignored);

    assert!(inbox.archived("ETHERNET_STATS_20240102_030405.txt"));
    assert!(foreign.exists());
    assert_eq!(inbox.sink.load_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_catch_up_continues_past_failures() -> Result<()> {
    let inbox = TestInbox::new();
    inbox.drop_file(
        "RADIO_LINK_POWER_BAD.txt",
        &export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]),
    );
    inbox.drop_file(
        RADIO_LINK_FILE,
        &export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]),
    );
    inbox.drop_file(
        RF_INPUT_FILE,
        &export(RF_INPUT_HEADER, &[rf_input_row("3.1/RX", "T2")]),
    );
    inbox.drop_file("readme.md", "not an export");

    let summary = inbox.monitor.process_existing().await?;
    assert_eq!(
        summary,
        PassSummary {
            loaded: 2,
            duplicates: 0,
            skipped: 1,
            failed: 1,
        }
    );
    assert_eq!(inbox.sink.rows(Table::RadioLink).len(), 1);
    assert_eq!(inbox.sink.rows(Table::RfInput).len(), 1);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_catch_up_skips_entries_that_are_not_files() -> Result<()> {
    let inbox = TestInbox::new();
    std::fs::create_dir(inbox.root().join("incoming")).unwrap();
    std::os::unix::fs::symlink(inbox.root().join("gone.txt"), inbox.root().join("dangling.txt")).unwrap();
    inbox.drop_file(
        RF_INPUT_FILE,
        &export(RF_INPUT_HEADER, &[rf_input_row("3.1/RX", "T2")]),
    );

    let summary = inbox.monitor.process_existing().await?;
    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.failed, 0);

    Ok(())
}

#[tokio::test]
async fn test_run_processes_backlog_and_new_files() -> Result<()> {
    init_tracing();
    let inbox = TestInbox::with_poll_interval(20);
    inbox.drop_file(
        RADIO_LINK_FILE,
        &export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]),
    );

    let (stop, shutdown) = watch::channel(false);
    let run = inbox.monitor.run(shutdown);
    let drive = async {
        assert!(wait_until(|| inbox.sink.load_calls() == 1).await);
        inbox.drop_file(
            RF_INPUT_FILE,
            &export(RF_INPUT_HEADER, &[rf_input_row("3.1/RX", "T2")]),
        );

        wait_until(|| !inbox.sink.rows(Table::RfInput).is_empty()).await;
        stop.send(true).unwrap();
    };

    let (result, ()) = tokio::join!(run, drive);
    result?;

    assert_eq!(inbox.sink.rows(Table::RadioLink).len(), 1);
    assert_eq!(inbox.sink.rows(Table::RfInput).len(), 1);
    assert_eq!(inbox.aggregator.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_run_loads_file_renamed_into_place() -> Result<()> {
    init_tracing();
    let inbox = TestInbox::with_poll_interval(20);

    let (stop, shutdown) = watch::channel(false);
    let run = inbox.monitor.run(shutdown);
    let drive = async {
        let upload = inbox.drop_file(
            "upload.tmp",
            &export(RADIO_LINK_HEADER, &[radio_link_row("x/4/1_A_T1_B_T2", "-")]),
        );
        // let the watcher settle on the partial name before the rename
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(upload.exists());
        assert_eq!(inbox.sink.load_calls(), 0);

        std::fs::rename(&upload, inbox.root().join(RADIO_LINK_FILE)).unwrap();

        wait_until(|| !inbox.sink.rows(Table::RadioLink).is_empty()).await;
        stop.send(true).unwrap();
    };

    let (result, ()) = tokio::join!(run, drive);
    result?;

    assert_eq!(inbox.sink.rows(Table::RadioLink).len(), 1);
    assert!(inbox.archived(RADIO_LINK_FILE));
    assert!(!inbox.archived("upload.tmp"));
    assert!(!inbox.root().join(RADIO_LINK_FILE).exists());

    Ok(())
}

#[tokio::test]
async fn test_run_leaves_foreign_files_and_keeps_watching() -> Result<()> {
    let inbox = TestInbox::with_poll_interval(20);

    let (stop, shutdown) = watch::channel(false);
    let run = inbox.monitor.run(shutdown);
    let drive = async {
        let notes = inbox.drop_file("notes.md", "not an export");
        tokio::time::sleep(Duration::from_millis(200)).await;

        inbox.drop_file(
            RF_INPUT_FILE,
            &export(RF_INPUT_HEADER, &[rf_input_row("3.1/RX", "T2")]),
        );
        wait_until(|| !inbox.sink.rows(Table::RfInput).is_empty()).await;
        stop.send(true).unwrap();
        notes
    };

    let (result, notes) = tokio::join!(run, drive);
    result?;

    assert!(notes.exists());
    assert!(!inbox.archived("notes.md"));
    assert_eq!(inbox.sink.rows(Table::RfInput).len(), 1);
    assert_eq!(inbox.sink.load_calls(), 1);

    Ok(())
}
