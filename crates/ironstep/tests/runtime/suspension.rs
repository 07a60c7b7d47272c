//! Sleeping, signal waits, cancellation and reloading suspended instances.

use std::time::{Duration, Instant};

use ironstep::{Error, InstanceStatus, RuntimeConfig, Suspension};
use serde_json::json;

use crate::support::helpers::{TestApp, init_test_tracing, test_runtime_config};
use crate::support::schemes::{QUICK, gated, nap_then_gate, sleepy};

fn sleepy_scheme(delay: &str) -> (&'static str, String) {
    ("mem://sleepy", sleepy(delay))
}

// =============================================================================
// Sleep
// =============================================================================

#[tokio::test]
async fn sleeping_instance_does_not_hold_the_worker() -> anyhow::Result<()> {
    init_test_tracing();
    let (uri, content) = sleepy_scheme("00:00:00.3");
    let app = TestApp::builder()
        .scheme((uri, content.as_str()))
        .scheme(QUICK)
        .config(RuntimeConfig {
            worker_count: 1,
            ..test_runtime_config()
        })
        .build_and_run()?;

    let started = Instant::now();
    let sleeper = app.start(uri).await?;
    app.wait_status(sleeper, InstanceStatus::Sleeping).await?;

    let quick = app.start(QUICK.0).await?;
    assert_eq!(app.wait_finished(quick).await?, InstanceStatus::Completed);
    assert_eq!(app.runtime.status(sleeper)?, InstanceStatus::Sleeping);

    assert_eq!(app.wait_finished(sleeper).await?, InstanceStatus::Completed);
    assert!(started.elapsed() >= Duration::from_millis(300));

    // The action ran once; waking navigated with the key it returned.
    assert_eq!(app.journal.count("exec:Nap"), 1);
    assert!(app.journal.position("exec:Quick") < app.journal.position("init:After"));
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn sleeping_state_records_pending_key_and_deadline() -> anyhow::Result<()> {
    let (uri, content) = sleepy_scheme("00:01:00");
    let app = TestApp::builder().scheme((uri, content.as_str())).build_and_run()?;

    let id = app.start(uri).await?;
    app.wait_status(id, InstanceStatus::Sleeping).await?;

    let ctx = app.runtime.context(id).await?;
    assert_eq!(ctx.pending_key().map(|k| k.as_str()), Some("Rested"));
    assert!(matches!(ctx.suspension(), Some(Suspension::Sleeping { .. })));
    assert_eq!(ctx.current_activity(), Some("Nap"));

    app.runtime.cancel(id).await?;
    Ok(())
}

#[tokio::test]
async fn cancel_unwinds_a_sleeping_instance() -> anyhow::Result<()> {
    init_test_tracing();
    let (uri, content) = sleepy_scheme("00:01:00");
    let app = TestApp::builder().scheme((uri, content.as_str())).build_and_run()?;

    let id = app.start(uri).await?;
    app.wait_status(id, InstanceStatus::Sleeping).await?;

    app.runtime.cancel(id).await?;
    assert_eq!(app.runtime.status(id)?, InstanceStatus::Cancelled);
    assert_eq!(
        &app.journal.entries()[3..],
        ["uninit:Nap", "uninit:Main"]
    );
    app.journal.assert_balanced();

    // Idempotent
    app.runtime.cancel(id).await?;
    assert_eq!(app.journal.count("uninit:Nap"), 1);

    let saved = app.store.raw(id).expect("cancelled instance saved");
    assert_eq!(saved["status"], "cancelled");
    Ok(())
}

#[tokio::test]
async fn wait_for_status_times_out() -> anyhow::Result<()> {
    let (uri, content) = sleepy_scheme("00:01:00");
    let app = TestApp::builder().scheme((uri, content.as_str())).build_and_run()?;

    let id = app.start(uri).await?;
    let result = app
        .runtime
        .wait_for_status(id, InstanceStatus::is_finished, Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(Error::Timeout)));

    app.runtime.cancel(id).await?;
    Ok(())
}

// =============================================================================
// Signals
// =============================================================================

#[tokio::test]
async fn all_signals_resume_with_the_pending_key() -> anyhow::Result<()> {
    init_test_tracing();
    let content = gated("00:00:30");
    let app = TestApp::builder()
        .scheme(("mem://gated", content.as_str()))
        .build_and_run()?;

    let id = app.start("mem://gated").await?;
    app.wait_status(id, InstanceStatus::WaitingExternal).await?;

    app.runtime.signal(id, "approved", json!({ "by": "bob" })).await?;
    // Half the signals are not enough
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.runtime.status(id)?, InstanceStatus::WaitingExternal);

    app.runtime.signal(id, "paid", json!(true)).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);

    assert!(app.journal.contains("init:Inspect"));
    assert!(app.journal.contains(r#"signal:approved={"by":"bob"}"#));
    assert!(!app.journal.contains("init:Late"));
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn expired_wait_navigates_with_the_timeout_key() -> anyhow::Result<()> {
    let content = gated("00:00:00.2");
    let app = TestApp::builder()
        .scheme(("mem://gated", content.as_str()))
        .build_and_run()?;

    let id = app.start("mem://gated").await?;
    app.wait_status(id, InstanceStatus::WaitingExternal).await?;
    app.runtime.signal(id, "approved", json!(1)).await?;

    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);
    assert!(app.journal.contains("init:Late"));
    assert!(!app.journal.contains("init:Inspect"));
    Ok(())
}

#[tokio::test]
async fn signal_sent_before_the_wait_is_not_lost() -> anyhow::Result<()> {
    init_test_tracing();
    let content = nap_then_gate("00:00:00.2");
    let app = TestApp::builder()
        .scheme(("mem://nap-then-gate", content.as_str()))
        .build_and_run()?;

    let id = app.start("mem://nap-then-gate").await?;
    app.wait_status(id, InstanceStatus::Sleeping).await?;

    app.runtime.signal(id, "approved", json!({ "by": "carol" })).await?;
    assert_eq!(app.runtime.status(id)?, InstanceStatus::Sleeping);
    let ctx = app.runtime.context(id).await?;
    assert!(ctx.buffered_signals().contains_key("approved"));

    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);
    assert_eq!(app.journal.count("exec:Nap"), 1);
    assert!(app.journal.contains(r#"signal:approved={"by":"carol"}"#));
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn finished_instances_reject_signals() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(QUICK).build_and_run()?;

    let id = app.start(QUICK.0).await?;
    app.wait_finished(id).await?;

    let result = app.runtime.signal(id, "approved", json!(null)).await;
    assert!(matches!(result, Err(Error::InvalidState { .. })));
    Ok(())
}

// =============================================================================
// Unload and reload
// =============================================================================

#[tokio::test]
async fn unloaded_instance_resumes_from_snapshots() -> anyhow::Result<()> {
    init_test_tracing();
    let (uri, content) = sleepy_scheme("00:00:00.3");
    let app = TestApp::builder().scheme((uri, content.as_str())).build_and_run()?;

    let id = app.start(uri).await?;
    app.wait_status(id, InstanceStatus::Sleeping).await?;

    app.runtime.unload(id).await?;
    assert!(app.runtime.instances().is_empty());
    assert!(matches!(
        app.runtime.status(id),
        Err(Error::UnknownInstance(_))
    ));

    // A second runtime over the same store, as after a restart
    let restarted = TestApp::builder()
        .scheme((uri, content.as_str()))
        .store(app.store.clone())
        .journal(app.journal.clone())
        .build_and_run()?;

    assert_eq!(
        restarted.runtime.resume_instance(id).await?,
        InstanceStatus::Sleeping
    );
    assert_eq!(restarted.wait_finished(id).await?, InstanceStatus::Completed);

    assert!(app.journal.contains("restore:Nap"));
    assert_eq!(app.journal.count("init:Nap"), 1);
    assert_eq!(app.journal.count("exec:Nap"), 1);
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn unload_on_suspend_reloads_on_wake() -> anyhow::Result<()> {
    let (uri, content) = sleepy_scheme("00:00:00.1");
    let app = TestApp::builder()
        .scheme((uri, content.as_str()))
        .config(RuntimeConfig {
            unload_on_suspend: true,
            ..test_runtime_config()
        })
        .build_and_run()?;

    let id = app.start(uri).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);

    assert!(app.journal.contains("restore:Nap"));
    assert_eq!(app.journal.count("init:Nap"), 1);
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn shutdown_releases_parked_instances() -> anyhow::Result<()> {
    let (uri, content) = sleepy_scheme("00:01:00");
    let app = TestApp::builder().scheme((uri, content.as_str())).build_and_run()?;

    let id = app.start(uri).await?;
    app.wait_status(id, InstanceStatus::Sleeping).await?;

    tokio::time::timeout(Duration::from_secs(2), app.shutdown())
        .await
        .expect("shutdown should complete within timeout")?;
    Ok(())
}
