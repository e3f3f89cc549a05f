//! Generator fan-out and monitor finalization for the count-fenced sync kinds

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::TestHarness;
use docsync_orchestrator::campaign::{
    Campaign, CampaignKind, DrainedCampaign, FenceValue, FinalizeOutcome, ResourceId, WorkItem,
};
use docsync_orchestrator::collaborators::MembershipKind;
use docsync_orchestrator::config::OrchestrationConfig;
use docsync_orchestrator::constants::{locks, queues};
use docsync_orchestrator::coordination::BeatLock;
use docsync_orchestrator::error::OrchestrationResult;
use docsync_orchestrator::orchestration::CampaignCheck;

/// Hands control back to the runtime mid-enumeration so concurrent
/// generators interleave
#[derive(Debug)]
struct YieldingCampaign {
    inner: Arc<dyn Campaign>,
}

#[async_trait]
impl Campaign for YieldingCampaign {
    fn kind(&self) -> CampaignKind {
        self.inner.kind()
    }

    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>> {
        self.inner.resources_due().await
    }

    async fn enumerate_work(&self, resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>> {
        tokio::task::yield_now().await;
        self.inner.enumerate_work(resource_id).await
    }

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome> {
        self.inner.finalize(drained).await
    }

    fn work_args(&self, resource_id: ResourceId, item: &WorkItem) -> serde_json::Value {
        self.inner.work_args(resource_id, item)
    }
}

fn stale_pair(harness: &TestHarness, cc_pair_id: i64, count: usize) -> Vec<String> {
    let ids: Vec<String> = (0..count).map(|n| format!("doc-{cc_pair_id}-{n}")).collect();
    harness.relational.add_cc_pair(cc_pair_id);
    for id in &ids {
        harness.relational.add_document(id, cc_pair_id);
        harness.relational.mark_document_stale(id);
    }
    ids
}

#[tokio::test]
async fn test_stale_documents_sync_and_finalize() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    let documents = stale_pair(&harness, 42, 5);
    let campaign = harness.campaign(CampaignKind::ConnectorSync);
    let fence = harness.fence(CampaignKind::ConnectorSync, 42);

    let emitted = harness.generator.try_generate(campaign.as_ref(), 42).await?;
    assert_eq!(emitted, Some(5));
    assert_eq!(fence.remaining().await?, 5);
    assert_eq!(fence.read().await?, Some(FenceValue::Count(5)));
    assert_eq!(harness.executor.queued_len(queues::DOCUMENT_SYNC), 5);

    assert_eq!(
        harness.monitor.check(campaign.as_ref(), 42).await?,
        CampaignCheck::InFlight {
            remaining: 5,
            expected: 5
        }
    );

    assert_eq!(harness.run_work_units().await?, 5);
    assert_eq!(fence.remaining().await?, 0);

    let report = harness.monitor.beat().await?;
    assert_eq!(report.finalized, 1);
    assert!(fence.read().await?.is_none());
    for id in &documents {
        assert!(!harness.relational.document_needs_sync(id));
        assert_eq!(harness.index.update_count(id), 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_finalization_is_idempotent() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 7, 2);
    let campaign = harness.campaign(CampaignKind::ConnectorSync);

    harness.generator.try_generate(campaign.as_ref(), 7).await?;
    harness.run_work_units().await?;

    assert_eq!(
        harness.monitor.check(campaign.as_ref(), 7).await?,
        CampaignCheck::Finalized { count: 2 }
    );
    assert_eq!(
        harness.monitor.check(campaign.as_ref(), 7).await?,
        CampaignCheck::Absent
    );
    Ok(())
}

#[tokio::test]
async fn test_running_campaign_blocks_second_generation() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 3, 2);
    let campaign = harness.campaign(CampaignKind::ConnectorSync);

    assert_eq!(harness.generator.try_generate(campaign.as_ref(), 3).await?, Some(2));
    assert_eq!(harness.generator.try_generate(campaign.as_ref(), 3).await?, None);
    assert_eq!(harness.executor.queued_len(queues::DOCUMENT_SYNC), 2);
    Ok(())
}

#[tokio::test]
async fn test_crash_before_arming_is_recovered_by_next_pass() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 42, 5);
    let fence = harness.fence(CampaignKind::ConnectorSync, 42);

    // Three ids recorded, then the generator died before arming
    fence
        .add_tasks(&["lost-1".to_string(), "lost-2".to_string(), "lost-3".to_string()])
        .await?;
    assert!(fence.read().await?.is_none());

    let watchdog = harness.watchdog.validate().await?;
    assert_eq!(watchdog.reset, 0, "count fences are not the watchdog's concern");
    let beat = harness.monitor.beat().await?;
    assert_eq!(beat.finalized, 0);

    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.work_units, 5);
    let mut outstanding = fence.outstanding_tasks().await?;
    outstanding.sort();
    assert!(outstanding.iter().all(|id| !id.starts_with("lost-")));
    assert_eq!(fence.remaining().await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_enumeration_failure_leaves_no_fence() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 9, 3);
    harness.relational.fail_on("stale_documents");
    let campaign = harness.campaign(CampaignKind::ConnectorSync);

    assert!(harness.generator.try_generate(campaign.as_ref(), 9).await.is_err());
    assert!(harness.fence(CampaignKind::ConnectorSync, 9).read().await?.is_none());

    harness.relational.clear_failures();
    assert_eq!(harness.generator.try_generate(campaign.as_ref(), 9).await?, Some(3));
    Ok(())
}

#[tokio::test]
async fn test_submission_failure_leaves_no_fence_and_no_task_id() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 9, 3);
    harness.executor.set_reject_submissions(true);
    let campaign = harness.campaign(CampaignKind::ConnectorSync);
    let fence = harness.fence(CampaignKind::ConnectorSync, 9);

    assert!(harness.generator.try_generate(campaign.as_ref(), 9).await.is_err());
    assert!(fence.read().await?.is_none());
    assert_eq!(fence.remaining().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_document_set_is_finalized_next_beat() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_membership(MembershipKind::DocumentSet, 10, &[]);

    let pass = harness.scheduler.run_pass().await?;
    assert_eq!(pass.started, 1);
    let fence = harness.fence(CampaignKind::DocumentSetSync, 10);
    assert_eq!(fence.read().await?, Some(FenceValue::Count(0)));

    let beat = harness.monitor.beat().await?;
    assert_eq!(beat.finalized, 1);
    assert!(harness.relational.membership_synced(MembershipKind::DocumentSet, 10));
    assert!(fence.read().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_connector_sync_with_no_stale_documents_arms_nothing() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_cc_pair(5);
    let campaign = harness.campaign(CampaignKind::ConnectorSync);

    assert_eq!(harness.generator.try_generate(campaign.as_ref(), 5).await?, Some(0));
    assert!(harness.fence(CampaignKind::ConnectorSync, 5).read().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_document_set_membership_reaches_index() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_document("doc-a", 1);
    harness.relational.add_document("doc-b", 1);
    harness
        .relational
        .add_membership(MembershipKind::DocumentSet, 20, &["doc-a", "doc-b"]);

    harness.scheduler.run_pass().await?;
    assert_eq!(harness.run_work_units().await?, 2);
    harness.monitor.beat().await?;

    let fields = harness.index.fields("doc-a").expect("doc-a indexed");
    assert!(fields.document_sets.contains("20"));
    assert!(harness.relational.membership_synced(MembershipKind::DocumentSet, 20));
    Ok(())
}

#[tokio::test]
async fn test_user_group_pending_deletion_is_removed() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    harness.relational.add_document("doc-a", 1);
    harness
        .relational
        .add_membership(MembershipKind::UserGroup, 30, &["doc-a"]);
    harness
        .relational
        .mark_membership_for_deletion(MembershipKind::UserGroup, 30);

    harness.scheduler.run_pass().await?;
    harness.run_work_units().await?;
    harness.monitor.beat().await?;

    assert!(!harness.relational.membership_exists(MembershipKind::UserGroup, 30));
    let fields = harness.index.fields("doc-a").expect("doc-a indexed");
    assert!(!fields.user_groups.contains("30"));
    Ok(())
}

#[tokio::test]
async fn test_finalize_failure_does_not_abort_the_beat() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 1, 1);
    harness.relational.add_membership(MembershipKind::DocumentSet, 10, &[]);
    harness.scheduler.run_pass().await?;
    harness.run_work_units().await?;

    harness.relational.fail_on("mark_membership_synced");
    let beat = harness.monitor.beat().await?;
    assert_eq!(beat.errors, 1);
    assert_eq!(beat.finalized, 1);
    assert!(harness.fence(CampaignKind::DocumentSetSync, 10).read().await?.is_some());

    harness.relational.clear_failures();
    let retry = harness.monitor.beat().await?;
    assert_eq!(retry.finalized, 1);
    assert!(harness.relational.membership_synced(MembershipKind::DocumentSet, 10));
    Ok(())
}

#[tokio::test]
async fn test_beat_is_skipped_while_lock_is_held() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    let held = BeatLock::try_acquire(
        harness.store(),
        locks::MONITOR_BEAT,
        harness.config.monitor.lock_timeout(),
    )
    .await?
    .expect("lock is free");

    let report = harness.monitor.beat().await?;
    assert!(report.skipped);

    held.release().await?;
    assert!(!harness.monitor.beat().await?.skipped);
    Ok(())
}

#[tokio::test]
async fn test_soft_time_limit_ends_scan_gracefully() -> anyhow::Result<()> {
    let mut config = OrchestrationConfig::default();
    config.monitor.soft_time_limit_seconds = 0;
    let harness = TestHarness::with_config(config);
    harness.relational.add_membership(MembershipKind::DocumentSet, 10, &[]);
    harness.scheduler.run_pass().await?;

    let report = harness.monitor.beat().await?;
    assert!(report.soft_limited);
    assert_eq!(report.finalized, 0);
    assert!(harness.fence(CampaignKind::DocumentSetSync, 10).read().await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_generators_have_one_winner() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    stale_pair(&harness, 1, 2);
    let campaign = YieldingCampaign {
        inner: harness.campaign(CampaignKind::ConnectorSync),
    };

    let (a, b) = tokio::join!(
        harness.generator.try_generate(&campaign, 1),
        harness.generator.try_generate(&campaign, 1),
    );
    let mut results = vec![a?, b?];
    results.sort();
    assert_eq!(results, vec![None, Some(2)]);

    let fence = harness.fence(CampaignKind::ConnectorSync, 1);
    assert_eq!(harness.executor.queued_len(queues::DOCUMENT_SYNC), 2);
    assert_eq!(fence.remaining().await?, 2);
    assert_eq!(fence.read().await?, Some(FenceValue::Count(2)));

    // The claim ends with the generation; a later pass is refused by the fence
    assert_eq!(harness.generator.try_generate(&campaign, 1).await?, None);
    assert_eq!(harness.run_work_units().await?, 2);
    assert_eq!(harness.monitor.beat().await?.finalized, 1);
    assert_eq!(harness.generator.try_generate(&campaign, 1).await?, Some(0));
    Ok(())
}
