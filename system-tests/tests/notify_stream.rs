// system-tests/tests/notify_stream.rs
// ============================================================================
// Module: Change Stream Tests
// Description: Validate LISTEN delivery, reconnect, and re-subscription.
// Purpose: Ensure the stream survives a killed connection (S6).
// ============================================================================

//! Change-stream system tests.

mod helpers;

use std::time::Duration;

use trace_ledger_store_postgres::CancelToken;
use trace_ledger_store_postgres::ChangeStream;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::infra::notify_config;
use helpers::seed;

/// Waits up to ~5 seconds for one notification.
fn wait_some(
    stream: &ChangeStream,
) -> Result<Option<trace_ledger_store_postgres::ChangeNotification>, Box<dyn std::error::Error>> {
    for _ in 0..10 {
        if let Some(notification) = stream.wait_for_notification(Duration::from_millis(500))? {
            return Ok(Some(notification));
        }
    }
    Ok(None)
}

/// Kills every backend currently subscribed via LISTEN.
fn kill_listen_backends(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = postgres::Client::connect(url, postgres::NoTls)?;
    client.execute(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE pid <> pg_backend_pid() \
         AND query ILIKE 'LISTEN%'",
        &[],
    )?;
    Ok(())
}

#[test]
fn notifications_reach_subscribers() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let stream = ChangeStream::connect(&notify_config(&fixture.url))?;
    stream.listen("decisions")?;

    let mut publisher = postgres::Client::connect(&fixture.url, postgres::NoTls)?;
    publisher.execute("SELECT pg_notify('decisions', '{\"op\":\"ping\"}')", &[])?;

    let notification = wait_some(&stream)?.ok_or("no notification arrived")?;
    assert_eq!(notification.channel, "decisions");
    assert!(notification.payload.contains("ping"));
    Ok(())
}

#[test]
fn decision_writes_publish_on_the_decisions_channel() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let stream = ChangeStream::connect(&notify_config(&fixture.url))?;
    stream.listen("decisions")?;

    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;
    let decision = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "chose Postgres"),
        None,
    )?;

    let notification = wait_some(&stream)?.ok_or("no notification arrived")?;
    assert_eq!(notification.channel, "decisions");
    assert!(notification.payload.contains(&decision.id.to_string()));
    Ok(())
}

#[test]
fn reconnect_resubscribes_tracked_channels() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let stream = ChangeStream::connect(&notify_config(&fixture.url))?;
    stream.listen("decisions")?;
    stream.listen("conflicts")?;
    let generation_before = stream.generation();

    kill_listen_backends(&fixture.url)?;

    // The waiter observes a retry-signalling error once the connection dies.
    let mut saw_error = false;
    for _ in 0..20 {
        match stream.wait_for_notification(Duration::from_millis(250)) {
            Ok(_) => {}
            Err(_) => {
                saw_error = true;
                break;
            }
        }
    }
    assert!(saw_error, "expected the killed connection to surface an error");

    stream.reconnect(&CancelToken::new())?;
    assert!(stream.generation() > generation_before);
    // A second reconnect observes the repaired stream and is a no-op.
    stream.reconnect(&CancelToken::new())?;

    // Previously tracked channels are LISTEN-ed again.
    let mut publisher = postgres::Client::connect(&fixture.url, postgres::NoTls)?;
    publisher.execute("SELECT pg_notify('conflicts', '{\"op\":\"ping\"}')", &[])?;
    let notification = wait_some(&stream)?.ok_or("no notification after reconnect")?;
    assert_eq!(notification.channel, "conflicts");
    Ok(())
}
