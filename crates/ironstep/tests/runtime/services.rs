//! Scheme loading and persistence as seen through the runtime.

use std::time::Duration;

use ironstep::{Error, InstanceStatus, SourceLocation};

use crate::support::helpers::{TestApp, init_test_tracing};
use crate::support::schemes::{LINEAR, MALFORMED, UNKNOWN_KIND, sleepy};

// =============================================================================
// Scheme loading
// =============================================================================

#[tokio::test]
async fn unknown_activity_kind_is_rejected_on_start() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(UNKNOWN_KIND).build_and_run()?;

    let err = app.runtime.start_instance(UNKNOWN_KIND.0, Default::default()).await;
    match err {
        Err(Error::SchemeParse { uri, location, message }) => {
            assert_eq!(uri, UNKNOWN_KIND.0);
            assert_eq!(location, SourceLocation::Activity("Main/Mystery".into()));
            assert!(message.contains("mystery"));
        }
        other => panic!("expected scheme error, got {other:?}"),
    }
    assert!(app.runtime.instances().is_empty());
    assert!(app.store.list_instances().is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_scheme_reports_its_position() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(MALFORMED).build_and_run()?;

    let err = app.runtime.start_instance(MALFORMED.0, Default::default()).await;
    assert!(matches!(
        err,
        Err(Error::SchemeParse {
            location: SourceLocation::Position { line: 4, .. },
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn missing_scheme_file_fails_start() -> anyhow::Result<()> {
    let app = TestApp::builder().build_and_run()?;

    let err = app
        .runtime
        .start_instance("file:///nonexistent/ironstep/scheme.json", Default::default())
        .await;
    assert!(matches!(err, Err(Error::Io(_))));
    Ok(())
}

#[tokio::test]
async fn services_receive_a_runtime_handle() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(LINEAR).build_and_run()?;

    let handle = app.store.runtime().expect("store attached");
    let id = app.start(LINEAR.0).await?;
    app.wait_finished(id).await?;

    assert_eq!(handle.status(id)?, InstanceStatus::Completed);
    handle.set_variable(id, "audited", true).await?;
    let ctx = handle.context(id).await?;
    assert_eq!(ctx.variable("audited"), Some(&serde_json::json!(true)));
    Ok(())
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn storage_failures_leave_the_instance_running() -> anyhow::Result<()> {
    init_test_tracing();
    let app = TestApp::builder().scheme(LINEAR).build_and_run()?;
    app.store.fail_saves(true);

    let id = app.start(LINEAR.0).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);
    assert!(app.store.raw(id).is_none());
    // Unsaved, so still held
    assert_eq!(app.runtime.instances(), [id]);

    assert!(matches!(app.runtime.persist(id).await, Err(Error::Storage { .. })));

    app.store.fail_saves(false);
    app.runtime.persist(id).await?;
    assert_eq!(app.store.raw(id).expect("saved on retry")["status"], "completed");
    assert!(app.runtime.instances().is_empty());
    assert_eq!(app.runtime.status(id)?, InstanceStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn failed_unload_keeps_the_instance_loaded() -> anyhow::Result<()> {
    let content = sleepy("00:01:00");
    let app = TestApp::builder()
        .scheme(("mem://sleepy", content.as_str()))
        .build_and_run()?;

    let id = app.start("mem://sleepy").await?;
    app.wait_status(id, InstanceStatus::Sleeping).await?;

    app.store.fail_saves(true);
    assert!(matches!(app.runtime.unload(id).await, Err(Error::Storage { .. })));
    assert_eq!(app.runtime.status(id)?, InstanceStatus::Sleeping);

    app.store.fail_saves(false);
    app.runtime.unload(id).await?;
    assert!(app.runtime.instances().is_empty());
    Ok(())
}

#[tokio::test]
async fn resuming_an_unknown_instance_is_not_found() -> anyhow::Result<()> {
    let app = TestApp::builder().build_and_run()?;

    let id = ironstep::InstanceId::new();
    assert!(matches!(
        app.runtime.resume_instance(id).await,
        Err(Error::NotFound(missing)) if missing == id
    ));
    let waited = app
        .runtime
        .wait_for_status(id, InstanceStatus::is_finished, Duration::from_millis(10))
        .await;
    assert!(matches!(waited, Err(Error::UnknownInstance(_))));
    Ok(())
}
