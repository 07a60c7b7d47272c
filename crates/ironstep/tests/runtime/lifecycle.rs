//! Instance lifecycle: navigation, nesting, parameters and faults.

use std::collections::BTreeMap;

use ironstep::{Error, InstanceStatus};
use serde_json::json;

use crate::support::helpers::{TestApp, init_test_tracing};
use crate::support::schemes::{
    BINDINGS, BROKEN_BINDING, FAILING, LINEAR, NESTED, UNMAPPED,
};

// =============================================================================
// Completion
// =============================================================================

#[tokio::test]
async fn linear_scheme_balances_initialize_and_uninitialize() -> anyhow::Result<()> {
    init_test_tracing();
    let app = TestApp::builder().scheme(LINEAR).build_and_run()?;

    let id = app.start(LINEAR.0).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);

    assert_eq!(
        app.journal.entries(),
        [
            "init:Main",
            "init:First",
            "exec:First",
            "uninit:First",
            "init:Second",
            "exec:Second",
            "uninit:Second",
            "uninit:Main",
        ]
    );
    app.journal.assert_balanced();

    let ctx = app.runtime.context(id).await?;
    assert_eq!(ctx.status(), InstanceStatus::Completed);
    assert!(ctx.active_path().is_empty());
    assert!(app.runtime.fault(id).is_none());
    Ok(())
}

#[tokio::test]
async fn nested_composite_exits_with_its_default_key() -> anyhow::Result<()> {
    init_test_tracing();
    let app = TestApp::builder().scheme(NESTED).build_and_run()?;

    let id = app.start(NESTED.0).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);

    assert_eq!(
        app.journal.entries(),
        [
            "init:Main",
            "init:Outer",
            "init:Inner1",
            "exec:Inner1",
            "uninit:Inner1",
            "init:Inner2",
            "exec:Inner2",
            "uninit:Inner2",
            "uninit:Outer",
            "init:Final",
            "exec:Final",
            "uninit:Final",
            "uninit:Main",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn completed_state_is_persisted() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(LINEAR).build_and_run()?;

    let id = app.start(LINEAR.0).await?;
    app.wait_finished(id).await?;

    let saved = app.store.raw(id).expect("instance saved");
    assert_eq!(saved["status"], "completed");
    assert_eq!(app.store.list_instances(), [id]);
    Ok(())
}

#[tokio::test]
async fn finished_instances_are_released_from_memory() -> anyhow::Result<()> {
    let app = TestApp::builder()
        .scheme(LINEAR)
        .scheme(FAILING)
        .build_and_run()?;

    let mut completed = Vec::new();
    for _ in 0..20 {
        completed.push(app.start(LINEAR.0).await?);
    }
    let faulted = app.start(FAILING.0).await?;

    for id in &completed {
        assert_eq!(app.wait_finished(*id).await?, InstanceStatus::Completed);
    }
    assert_eq!(app.wait_finished(faulted).await?, InstanceStatus::Faulted);

    assert!(app.runtime.instances().is_empty());
    assert_eq!(app.store.list_instances().len(), 21);

    // The outcome stays available without the context
    assert_eq!(app.runtime.status(completed[0])?, InstanceStatus::Completed);
    assert!(app.runtime.fault(faulted).is_some());
    let ctx = app.runtime.context(completed[0]).await?;
    assert_eq!(ctx.status(), InstanceStatus::Completed);

    // Resuming a finished instance elsewhere does not load it either
    let restarted = TestApp::builder()
        .scheme(LINEAR)
        .store(app.store.clone())
        .build_and_run()?;
    assert_eq!(
        restarted.runtime.resume_instance(completed[0]).await?,
        InstanceStatus::Completed
    );
    assert!(restarted.runtime.instances().is_empty());
    Ok(())
}

// =============================================================================
// Parameters
// =============================================================================

#[tokio::test]
async fn parameters_resolve_root_properties_enums_and_escapes() -> anyhow::Result<()> {
    init_test_tracing();
    let app = TestApp::builder().scheme(BINDINGS).build_and_run()?;

    let id = app
        .start_with(BINDINGS.0, BTreeMap::from([("owner".to_string(), json!("alice"))]))
        .await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Completed);

    assert!(app.journal.contains("note:Check=alice"));
    assert!(app.journal.contains("priority:Check=High"));
    // `@@Checked` is the literal key `@Checked`, mapped to `Limit`
    assert!(app.journal.contains("note:Limit=100"));
    Ok(())
}

// =============================================================================
// Faults
// =============================================================================

#[tokio::test]
async fn unmapped_key_faults_and_unwinds_deepest_first() -> anyhow::Result<()> {
    init_test_tracing();
    let app = TestApp::builder().scheme(UNMAPPED).build_and_run()?;

    let id = app.start(UNMAPPED.0).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Faulted);

    assert_eq!(
        app.journal.entries(),
        [
            "init:Main",
            "init:Decide",
            "exec:Decide",
            "uninit:Decide",
            "uninit:Main",
        ]
    );

    let fault = app.runtime.fault(id).expect("fault kept in memory");
    assert!(
        matches!(&*fault, Error::Navigation { activity, key } if activity == "Decide" && key == "Unmapped")
    );

    let ctx = app.runtime.context(id).await?;
    let info = ctx.fault().expect("fault info saved");
    assert_eq!(info.kind, "navigation");
    assert_eq!(info.activity.as_deref(), Some("Decide"));

    let saved = app.store.raw(id).expect("faulted instance saved");
    assert_eq!(saved["status"], "faulted");
    Ok(())
}

#[tokio::test]
async fn unknown_property_faults_with_binding_error() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(BROKEN_BINDING).build_and_run()?;

    let id = app.start(BROKEN_BINDING.0).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Faulted);

    let fault = app.runtime.fault(id).expect("fault kept in memory");
    assert!(matches!(&*fault, Error::Binding { activity, .. } if activity == "Check"));
    assert!(!app.journal.contains("exec:Check"));
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn action_error_faults_without_navigating() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(FAILING).build_and_run()?;

    let id = app.start(FAILING.0).await?;
    assert_eq!(app.wait_finished(id).await?, InstanceStatus::Faulted);

    let fault = app.runtime.fault(id).expect("fault kept in memory");
    assert!(matches!(&*fault, Error::ActionFault { activity, .. } if activity == "Charge"));
    assert!(fault.to_string().contains("payment gateway unavailable"));
    assert!(!app.journal.contains("init:Receipt"));
    app.journal.assert_balanced();
    Ok(())
}

#[tokio::test]
async fn cancelling_a_finished_instance_changes_nothing() -> anyhow::Result<()> {
    let app = TestApp::builder().scheme(LINEAR).build_and_run()?;

    let id = app.start(LINEAR.0).await?;
    app.wait_finished(id).await?;
    app.runtime.cancel(id).await?;

    assert_eq!(app.runtime.status(id)?, InstanceStatus::Completed);
    Ok(())
}
