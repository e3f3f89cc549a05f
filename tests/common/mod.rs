//! Shared harness for the integration tests: in-memory store, executor and
//! collaborators wired to the real generator, monitor, watchdog, scheduler and
//! worker dispatcher.

#![allow(dead_code)]

pub mod fake_spawner;
pub mod strategies;

use std::sync::Arc;

use docsync_orchestrator::campaign::{Campaign, CampaignFence, CampaignKind, ResourceId};
use docsync_orchestrator::collaborators::{
    InMemoryDocumentSource, InMemoryRelationalStore, InMemoryVectorIndex,
};
use docsync_orchestrator::config::OrchestrationConfig;
use docsync_orchestrator::constants::queues;
use docsync_orchestrator::coordination::{CoordinationStore, InMemoryCoordinationStore};
use docsync_orchestrator::executor::{InMemoryTaskExecutor, TaskExecutor};
use docsync_orchestrator::indexing::IndexingSupervisor;
use docsync_orchestrator::orchestration::{
    CampaignRegistry, CampaignScheduler, Generator, Monitor, Watchdog,
};
use docsync_orchestrator::worker::{
    DocumentCleanupHandler, DocumentMetadataSyncHandler, IndexingProxyHandler,
    PruningGeneratorHandler, TaskOutcome, WorkUnitDispatcher,
};

pub use fake_spawner::FakeSpawner;

pub const WORKER: &str = "worker-1";

pub struct TestHarness {
    pub config: OrchestrationConfig,
    pub store: Arc<InMemoryCoordinationStore>,
    pub executor: Arc<InMemoryTaskExecutor>,
    pub relational: Arc<InMemoryRelationalStore>,
    pub source: Arc<InMemoryDocumentSource>,
    pub index: Arc<InMemoryVectorIndex>,
    pub spawner: Arc<FakeSpawner>,
    pub registry: Arc<CampaignRegistry>,
    pub generator: Generator,
    pub monitor: Monitor,
    pub watchdog: Watchdog,
    pub scheduler: CampaignScheduler,
    pub supervisor: IndexingSupervisor,
    pub dispatcher: WorkUnitDispatcher,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(OrchestrationConfig::default())
    }

    pub fn with_config(config: OrchestrationConfig) -> Self {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let executor = Arc::new(InMemoryTaskExecutor::new());
        let relational = Arc::new(InMemoryRelationalStore::new());
        let source = Arc::new(InMemoryDocumentSource::new());
        let index = Arc::new(InMemoryVectorIndex::new());
        let spawner = Arc::new(FakeSpawner::new());

        let store_dyn: Arc<dyn CoordinationStore> = store.clone();
        let executor_dyn: Arc<dyn TaskExecutor> = executor.clone();

        let registry = Arc::new(CampaignRegistry::with_default_campaigns(
            relational.clone(),
            source.clone(),
        ));
        let generator = Generator::new(
            store_dyn.clone(),
            executor_dyn.clone(),
            config.watchdog.liveness_ttl(),
        );
        let monitor = Monitor::new(store_dyn.clone(), registry.clone(), config.monitor.clone());
        let watchdog = Watchdog::new(
            store_dyn.clone(),
            executor_dyn.clone(),
            registry.clone(),
            config.watchdog.clone(),
            config.monitor.lock_timeout(),
        );
        let scheduler = CampaignScheduler::new(
            store_dyn.clone(),
            registry.clone(),
            generator.clone(),
            config.scheduling.clone(),
            config.indexing.termination_ttl(),
        );
        let supervisor = IndexingSupervisor::new(
            store_dyn.clone(),
            relational.clone(),
            spawner.clone(),
            generator.clone(),
            config.indexing.clone(),
            config.watchdog.liveness_ttl(),
        );

        let mut dispatcher = WorkUnitDispatcher::new(store_dyn, executor_dyn);
        dispatcher.register(Arc::new(DocumentMetadataSyncHandler::new(
            relational.clone(),
            index.clone(),
        )));
        dispatcher.register(Arc::new(DocumentCleanupHandler::new(
            relational.clone(),
            index.clone(),
        )));
        if let Some(pruning) = registry.get(CampaignKind::ConnectorPruning) {
            dispatcher.register(Arc::new(PruningGeneratorHandler::new(
                generator.clone(),
                pruning,
            )));
        }
        dispatcher.register(Arc::new(IndexingProxyHandler::new(supervisor.clone())));

        Self {
            config,
            store,
            executor,
            relational,
            source,
            index,
            spawner,
            registry,
            generator,
            monitor,
            watchdog,
            scheduler,
            supervisor,
            dispatcher,
        }
    }

    pub fn store(&self) -> Arc<dyn CoordinationStore> {
        self.store.clone()
    }

    pub fn campaign(&self, kind: CampaignKind) -> Arc<dyn Campaign> {
        self.registry
            .get(kind)
            .expect("every kind is registered by default")
    }

    pub fn fence(&self, kind: CampaignKind, resource_id: ResourceId) -> CampaignFence {
        CampaignFence::new(self.store(), kind, resource_id)
    }

    /// Reserve, start, dispatch and finish the next task on `queue`
    pub async fn run_one(&self, queue: &str) -> anyhow::Result<Option<TaskOutcome>> {
        let Some(task) = self.executor.reserve_next(queue, WORKER) else {
            return Ok(None);
        };
        self.executor.start(&task.task_id);
        let outcome = self.dispatcher.dispatch(&task).await?;
        self.executor.finish(&task.task_id);
        Ok(Some(outcome))
    }

    /// Run every task on `queue` (including resubmitted retries) until it is empty
    pub async fn drain_queue(&self, queue: &str) -> anyhow::Result<Vec<TaskOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_one(queue).await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Drain the per-document work queues
    pub async fn run_work_units(&self) -> anyhow::Result<usize> {
        let mut ran = 0;
        for queue in [queues::DOCUMENT_SYNC, queues::CONNECTOR_DELETION] {
            ran += self.drain_queue(queue).await?.len();
        }
        Ok(ran)
    }

    /// Seed a pair with documents that the source also still lists
    pub fn seed_cc_pair(&self, cc_pair_id: i64, document_ids: &[&str]) {
        self.relational.add_cc_pair(cc_pair_id);
        for document_id in document_ids {
            self.relational.add_document(document_id, cc_pair_id);
        }
        self.source.set_documents(cc_pair_id, document_ids);
    }
}
