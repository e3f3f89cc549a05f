//! Scriptable stand-in for the indexing process

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use docsync_orchestrator::error::{OrchestrationError, OrchestrationResult};
use docsync_orchestrator::indexing::{JobExit, JobRequest, JobSpawner, SpawnedJob};

#[derive(Debug, Default)]
pub struct FakeJobState {
    pub exit: Option<JobExit>,
    pub terminated: bool,
}

/// Test-side handle to one spawned fake job
#[derive(Debug, Clone, Default)]
pub struct FakeJobHandle {
    state: Arc<Mutex<FakeJobState>>,
}

impl FakeJobHandle {
    pub fn exit(&self, code: i32) {
        self.state.lock().exit = Some(JobExit { code: Some(code) });
    }

    pub fn terminated(&self) -> bool {
        self.state.lock().terminated
    }

    pub fn exited(&self) -> bool {
        self.state.lock().exit.is_some()
    }
}

#[derive(Debug)]
struct FakeJob {
    state: Arc<Mutex<FakeJobState>>,
}

#[async_trait]
impl SpawnedJob for FakeJob {
    fn try_wait(&mut self) -> OrchestrationResult<Option<JobExit>> {
        Ok(self.state.lock().exit)
    }

    async fn terminate(&mut self) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.terminated = true;
        state.exit.get_or_insert(JobExit { code: None });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeSpawner {
    jobs: Mutex<Vec<(JobRequest, FakeJobHandle)>>,
    fail_spawn: Mutex<bool>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_spawns(&self, fail: bool) {
        *self.fail_spawn.lock() = fail;
    }

    pub fn spawned(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn last_request(&self) -> Option<JobRequest> {
        self.jobs.lock().last().map(|(request, _)| request.clone())
    }

    pub fn last_job(&self) -> Option<FakeJobHandle> {
        self.jobs.lock().last().map(|(_, handle)| handle.clone())
    }
}

#[async_trait]
impl JobSpawner for FakeSpawner {
    async fn spawn(&self, request: &JobRequest) -> OrchestrationResult<Box<dyn SpawnedJob>> {
        if *self.fail_spawn.lock() {
            return Err(OrchestrationError::Spawn("fake spawner refused".to_string()));
        }
        let handle = FakeJobHandle::default();
        let job = FakeJob {
            state: handle.state.clone(),
        };
        self.jobs.lock().push((request.clone(), handle));
        Ok(Box::new(job))
    }
}
