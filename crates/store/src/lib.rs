//! External collaborator seams for the execution core.
//!
//! The core never persists anything itself: it reads agent and pipeline
//! definitions through [`DurableStore`] and writes status transitions back
//! through the same trait. [`memory::InMemoryStore`] is the reference
//! implementation used by tests and embedders without a database.

pub mod memory;
pub mod models;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use models::{AgentRecord, ExecutionRecord, PipelineRecord, PipelineRunRecord, StepRecord, StepResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Durable storage seam. Reads feed run setup; writes report every status
/// transition outward so the core itself stays stateless across restarts.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn agent(&self, id: Uuid) -> Result<AgentRecord, StoreError>;
    async fn pipeline(&self, id: Uuid) -> Result<PipelineRecord, StoreError>;
    /// Secret key/value bag merged into every spawned environment.
    async fn secret_bag(&self) -> Result<HashMap<String, String>, StoreError>;

    async fn insert_execution(&self, record: ExecutionRecord) -> Result<(), StoreError>;
    async fn update_execution(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    async fn insert_pipeline_run(&self, record: PipelineRunRecord) -> Result<(), StoreError>;
    async fn update_pipeline_run(&self, record: PipelineRunRecord) -> Result<(), StoreError>;

    async fn insert_step(&self, record: StepRecord) -> Result<(), StoreError>;
    async fn update_step(&self, record: StepRecord) -> Result<(), StoreError>;
}

/// Invoked once per successful pipeline run with the finished record and
/// per-step summaries; returns a reference to the generated artifact.
/// Generation failure must never fail the pipeline that triggered it.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        run: &PipelineRunRecord,
        steps: &[StepResult],
    ) -> anyhow::Result<String>;
}
