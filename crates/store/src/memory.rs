//! In-memory [`DurableStore`] backing for tests and embedders that do not
//! need durability.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AgentRecord, ExecutionRecord, PipelineRecord, PipelineRunRecord, StepRecord,
};
use crate::{DurableStore, StoreError};

#[derive(Default)]
struct Inner {
    agents: HashMap<Uuid, AgentRecord>,
    pipelines: HashMap<Uuid, PipelineRecord>,
    secrets: HashMap<String, String>,
    executions: HashMap<Uuid, ExecutionRecord>,
    pipeline_runs: HashMap<Uuid, PipelineRunRecord>,
    steps: HashMap<Uuid, StepRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_agent(&self, agent: AgentRecord) {
        self.inner.write().await.agents.insert(agent.id, agent);
    }

    pub async fn add_pipeline(&self, pipeline: PipelineRecord) {
        self.inner
            .write()
            .await
            .pipelines
            .insert(pipeline.id, pipeline);
    }

    pub async fn set_secret(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .write()
            .await
            .secrets
            .insert(key.into(), value.into());
    }

    pub async fn execution(&self, id: Uuid) -> Option<ExecutionRecord> {
        self.inner.read().await.executions.get(&id).cloned()
    }

    pub async fn pipeline_run(&self, id: Uuid) -> Option<PipelineRunRecord> {
        self.inner.read().await.pipeline_runs.get(&id).cloned()
    }

    /// Steps persisted for a run, ordered by step index.
    pub async fn steps_for_run(&self, run_id: Uuid) -> Vec<StepRecord> {
        let inner = self.inner.read().await;
        let mut steps: Vec<StepRecord> = inner
            .steps
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_index);
        steps
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn agent(&self, id: Uuid) -> Result<AgentRecord, StoreError> {
        self.inner
            .read()
            .await
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("agent {id}")))
    }

    async fn pipeline(&self, id: Uuid) -> Result<PipelineRecord, StoreError> {
        self.inner
            .read()
            .await
            .pipelines
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("pipeline {id}")))
    }

    async fn secret_bag(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.inner.read().await.secrets.clone())
    }

    async fn insert_execution(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.executions.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("execution {}", record.id)));
        }
        inner.executions.insert(record.id, record);
        Ok(())
    }

    async fn update_execution(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.executions.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("execution {}", record.id)));
        }
        tracing::debug!(execution_id = %record.id, status = %record.status, "execution updated");
        inner.executions.insert(record.id, record);
        Ok(())
    }

    async fn insert_pipeline_run(&self, record: PipelineRunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.pipeline_runs.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("pipeline run {}", record.id)));
        }
        inner.pipeline_runs.insert(record.id, record);
        Ok(())
    }

    async fn update_pipeline_run(&self, record: PipelineRunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.pipeline_runs.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("pipeline run {}", record.id)));
        }
        tracing::debug!(run_id = %record.id, status = %record.status, "pipeline run updated");
        inner.pipeline_runs.insert(record.id, record);
        Ok(())
    }

    async fn insert_step(&self, record: StepRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.steps.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("step {}", record.id)));
        }
        inner.steps.insert(record.id, record);
        Ok(())
    }

    async fn update_step(&self, record: StepRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.steps.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("step {}", record.id)));
        }
        inner.steps.insert(record.id, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;

    #[tokio::test]
    async fn agent_lookup_round_trip() {
        let store = InMemoryStore::new();
        let agent = AgentRecord::new("writer", "/tmp/agents/writer");
        let id = agent.id;
        store.add_agent(agent).await;

        let found = store.agent(id).await.unwrap();
        assert_eq!(found.name, "writer");
        assert!(store.agent(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn double_insert_is_a_conflict() {
        let store = InMemoryStore::new();
        let record = ExecutionRecord::running(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert_execution(record.clone()).await.unwrap();
        assert!(store.insert_execution(record).await.is_err());
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = InMemoryStore::new();
        let mut record =
            ExecutionRecord::running(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(store.update_execution(record.clone()).await.is_err());

        store.insert_execution(record.clone()).await.unwrap();
        record.status = RecordStatus::Completed;
        store.update_execution(record.clone()).await.unwrap();
        assert_eq!(
            store.execution(record.id).await.unwrap().status,
            RecordStatus::Completed
        );
    }

    #[tokio::test]
    async fn steps_come_back_ordered() {
        let store = InMemoryStore::new();
        let run_id = Uuid::new_v4();
        for index in [2usize, 0, 1] {
            let step = StepRecord::running(run_id, index, Uuid::new_v4(), "agent");
            store.insert_step(step).await.unwrap();
        }
        let steps = store.steps_for_run(run_id).await;
        let indices: Vec<usize> = steps.iter().map(|s| s.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
