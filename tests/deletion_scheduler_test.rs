//! Connector deletion end to end, and the scheduler's per-kind locks and
//! conflict rules

mod common;

use common::{TestHarness, WORKER};
use docsync_orchestrator::campaign::{CampaignKind, FenceValue};
use docsync_orchestrator::constants::{queues, task_names};
use docsync_orchestrator::coordination::BeatLock;
use docsync_orchestrator::orchestration::CampaignScheduler;
use docsync_orchestrator::worker::TaskOutcome;

#[tokio::test]
async fn test_deletion_removes_pair_and_keeps_shared_documents() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.seed_cc_pair(5, &["solo", "shared"]);
    harness.relational.add_document("shared", 6);
    harness.relational.mark_cc_pair_for_deletion(5);

    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.started, 1);
    assert_eq!(pass.work_units, 2);
    let fence = harness.fence(CampaignKind::ConnectorDeletion, 5);
    assert_eq!(fence.read().await?.and_then(|value| value.expected()), Some(2));

    assert_eq!(harness.run_work_units().await?, 2);
    let beat = harness.monitor.beat().await?;
    assert_eq!(beat.finalized, 1);

    assert!(!harness.relational.cc_pair_exists(5));
    assert!(!harness.relational.document_exists("solo"));
    assert_eq!(harness.relational.document_cc_pairs("shared"), vec![6]);
    assert_eq!(harness.index.deleted(), vec!["solo".to_string()]);
    assert_eq!(harness.index.update_count("shared"), 1);
    assert!(fence.read().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_empty_pair_is_deleted_on_next_beat() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_cc_pair(5);
    harness.relational.mark_cc_pair_for_deletion(5);

    harness.scheduler.run_pass().await?;
    let fence = harness.fence(CampaignKind::ConnectorDeletion, 5);
    assert!(fence.read().await?.is_some_and(|value| value.is_armed()));

    harness.monitor.beat().await?;
    assert!(!harness.relational.cc_pair_exists(5));
    Ok(())
}

#[tokio::test]
async fn test_index_outage_retries_then_drains() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.seed_cc_pair(5, &["flaky"]);
    harness.relational.mark_cc_pair_for_deletion(5);
    harness.index.fail_document("flaky");
    harness.scheduler.run_pass().await?;

    let outcomes = harness.drain_queue(queues::CONNECTOR_DELETION).await?;
    assert!(matches!(outcomes.last(), Some(TaskOutcome::Failed { .. })));
    assert!(outcomes[..outcomes.len() - 1]
        .iter()
        .all(|outcome| matches!(outcome, TaskOutcome::Retry { .. })));

    // A unit that gave up still leaves the task set so the campaign can end
    let fence = harness.fence(CampaignKind::ConnectorDeletion, 5);
    assert_eq!(fence.remaining().await?, 0);
    assert_eq!(harness.monitor.beat().await?.finalized, 1);
    Ok(())
}

#[tokio::test]
async fn test_deletion_waits_for_indexing_and_requests_termination() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.seed_cc_pair(5, &["doc-1"]);
    harness.relational.set_due_for_indexing(5, true);
    harness.scheduler.run_pass().await?;

    let driver = harness
        .executor
        .submissions_named(task_names::CONNECTOR_INDEXING_PROXY)
        .pop()
        .expect("indexing driver submitted");
    let indexing = harness.fence(CampaignKind::ConnectorIndexing, 5);
    harness.executor.reserve_next(queues::CONNECTOR_INDEXING, WORKER);
    harness.generator.claim_driver(&indexing, &driver.task_id, Some(0)).await?;

    harness.relational.mark_cc_pair_for_deletion(5);
    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.blocked, 1);
    assert_eq!(pass.started, 0);
    assert!(harness.fence(CampaignKind::ConnectorDeletion, 5).read().await?.is_none());
    assert!(indexing.is_terminating(&driver.task_id).await?);

    // Indexing wound down
    indexing.release().await?;
    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.started, 1);
    Ok(())
}

#[tokio::test]
async fn test_pruning_waits_for_deletion_without_preempting() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.seed_cc_pair(5, &["doc-1"]);
    let deletion = harness.campaign(CampaignKind::ConnectorDeletion);
    harness.generator.try_generate(deletion.as_ref(), 5).await?;

    harness.relational.set_due_for_pruning(5, true);
    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.blocked, 1);
    assert!(harness.fence(CampaignKind::ConnectorPruning, 5).read().await?.is_none());
    assert!(harness
        .executor
        .submissions_named(task_names::CONNECTOR_PRUNING_GENERATOR)
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_held_kind_lock_skips_only_that_kind() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_document("doc-1", 1);
    harness.relational.mark_document_stale("doc-1");
    harness.relational.add_membership(
        docsync_orchestrator::collaborators::MembershipKind::DocumentSet,
        10,
        &[],
    );

    let held = BeatLock::try_acquire(
        harness.store(),
        &CampaignScheduler::lock_name(CampaignKind::ConnectorSync),
        harness.config.scheduling.lock_timeout(),
    )
    .await?
    .expect("lock is free");

    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.kinds_skipped, 1);
    assert_eq!(pass.started, 1, "document set sync still ran");
    assert!(harness.fence(CampaignKind::ConnectorSync, 1).read().await?.is_none());

    held.release().await?;
    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.kinds_skipped, 0);
    assert_eq!(
        harness.fence(CampaignKind::ConnectorSync, 1).read().await?,
        Some(FenceValue::Count(1))
    );
    Ok(())
}

#[tokio::test]
async fn test_running_campaigns_are_reported_not_restarted() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_document("doc-1", 1);
    harness.relational.mark_document_stale("doc-1");

    assert_eq!(harness.scheduler.run_pass().await?.started, 1);
    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.already_running, 1);
    assert_eq!(harness.executor.submissions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_enumeration_failure_is_counted_and_other_kinds_continue() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.fail_on("cc_pairs_with_stale_documents");
    harness.relational.add_membership(
        docsync_orchestrator::collaborators::MembershipKind::UserGroup,
        2,
        &[],
    );

    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.errors, 1);
    assert_eq!(pass.started, 1);
    Ok(())
}
