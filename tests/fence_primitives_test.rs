//! Fence, task set, liveness and beat lock primitives against the in-memory store

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use docsync_orchestrator::campaign::{CampaignFence, CampaignKind, CampaignPayload, FenceValue};
use docsync_orchestrator::coordination::{
    BeatLock, CoordinationStore, InMemoryCoordinationStore, NamespacedStore,
};

fn store() -> Arc<dyn CoordinationStore> {
    Arc::new(InMemoryCoordinationStore::new())
}

#[tokio::test]
async fn test_exactly_one_concurrent_acquire_wins() -> anyhow::Result<()> {
    let store = store();
    let attempts = (0..16).map(|_| {
        let fence = CampaignFence::new(store.clone(), CampaignKind::ConnectorDeletion, 5);
        async move {
            fence
                .acquire(&CampaignPayload::new(), Duration::from_secs(60))
                .await
        }
    });

    let results = join_all(attempts).await;
    let winners = results
        .into_iter()
        .collect::<Result<Vec<bool>, _>>()?
        .into_iter()
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn test_task_set_tracks_outstanding_units() -> anyhow::Result<()> {
    let fence = CampaignFence::new(store(), CampaignKind::DocumentSetSync, 1);
    fence
        .add_tasks(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await?;
    assert_eq!(fence.remaining().await?, 3);

    assert!(fence.complete_task("b").await?);
    assert!(!fence.complete_task("b").await?, "second removal is a no-op");
    assert_eq!(fence.remaining().await?, 2);

    let mut outstanding = fence.outstanding_tasks().await?;
    outstanding.sort();
    assert_eq!(outstanding, vec!["a".to_string(), "c".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_armed_count_fence_is_visible_only_after_arm() -> anyhow::Result<()> {
    let fence = CampaignFence::new(store(), CampaignKind::ConnectorSync, 2);
    fence.add_task("t1").await?;
    assert!(fence.read().await?.is_none());

    fence.arm(&FenceValue::Count(1)).await?;
    assert_eq!(fence.read().await?, Some(FenceValue::Count(1)));
    Ok(())
}

#[tokio::test]
async fn test_release_removes_all_campaign_keys() -> anyhow::Result<()> {
    let memory = Arc::new(InMemoryCoordinationStore::new());
    let fence = CampaignFence::new(memory.clone(), CampaignKind::ConnectorIndexing, 8);
    fence
        .acquire(&CampaignPayload::new(), Duration::from_secs(60))
        .await?;
    fence.add_task("t").await?;
    fence.bump_progress(10).await?;
    fence.set_generator_complete(200).await?;

    assert!(fence.release().await?);
    assert_eq!(memory.key_count(), 0);
    assert!(!fence.release().await?, "releasing twice reports no fence");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_liveness_key_expires() -> anyhow::Result<()> {
    let fence = CampaignFence::new(store(), CampaignKind::ConnectorPruning, 3);
    fence
        .acquire(&CampaignPayload::new(), Duration::from_secs(30))
        .await?;
    assert!(fence.is_active().await?);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!fence.is_active().await?);
    assert!(fence.read().await?.is_some(), "the fence itself has no TTL");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_beat_lock_renewal_and_loss() -> anyhow::Result<()> {
    let store = store();
    let lock = BeatLock::try_acquire(store.clone(), "monitor", Duration::from_secs(10))
        .await?
        .expect("free lock");
    assert!(BeatLock::try_acquire(store.clone(), "monitor", Duration::from_secs(10))
        .await?
        .is_none());

    tokio::time::advance(Duration::from_secs(8)).await;
    lock.reacquire().await?;
    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(lock.owned().await?, "renewal extended the lease");

    tokio::time::advance(Duration::from_secs(11)).await;
    let thief = BeatLock::try_acquire(store.clone(), "monitor", Duration::from_secs(10))
        .await?
        .expect("expired lease is free");
    let lost = lock.reacquire().await.unwrap_err();
    assert!(lost.is_lock_lost());
    assert!(!lock.release().await?, "old holder cannot delete the new holder's lock");
    assert!(thief.release().await?);
    Ok(())
}

#[tokio::test]
async fn test_tenants_do_not_see_each_others_fences() -> anyhow::Result<()> {
    let shared = store();
    let acme: Arc<dyn CoordinationStore> = Arc::new(NamespacedStore::new(shared.clone(), "acme"));
    let globex: Arc<dyn CoordinationStore> = Arc::new(NamespacedStore::new(shared.clone(), "globex"));

    CampaignFence::new(acme.clone(), CampaignKind::ConnectorSync, 1)
        .arm(&FenceValue::Count(3))
        .await?;

    assert_eq!(
        CampaignFence::fenced_resources(&acme, CampaignKind::ConnectorSync).await?,
        vec![1]
    );
    assert!(CampaignFence::fenced_resources(&globex, CampaignKind::ConnectorSync)
        .await?
        .is_empty());
    assert!(shared.exists("acme:connectorsync:fence:1").await?);
    Ok(())
}
