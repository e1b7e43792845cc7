//! Direct (non-pipeline) runs: one agent, one prompt, one record.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use engine::{ExecuteRequest, ExecutionEngine, RunEvent};
use store::DurableStore;
use store::models::{ExecutionRecord, RecordStatus};

use crate::agent_config;
use crate::error::PipelineError;

/// Runs a single agent through the engine, forwarding all run events to
/// the caller's sink and keeping the execution record current. The record
/// id is the engine run id.
pub struct ExecutionService {
    engine: ExecutionEngine,
    store: Arc<dyn DurableStore>,
}

impl ExecutionService {
    pub fn new(engine: ExecutionEngine, store: Arc<dyn DurableStore>) -> Self {
        Self { engine, store }
    }

    pub async fn start(
        &self,
        agent_id: Uuid,
        task_id: Uuid,
        prompt: String,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<Uuid, PipelineError> {
        let agent = self.store.agent(agent_id).await?;
        if !agent.is_available() {
            return Err(PipelineError::StepAgentUnavailable { agent_id });
        }
        let secrets = self.store.secret_bag().await?;

        // Events queue on the internal channel until the record exists and
        // the forwarder is running.
        let (tx, rx) = mpsc::channel(256);
        let run_id = self
            .engine
            .execute(
                ExecuteRequest {
                    agent: agent_config(&agent),
                    task_id,
                    prompt,
                    secrets,
                },
                tx,
            )
            .await?;

        let record = ExecutionRecord::running(run_id, agent_id, task_id);
        self.store.insert_execution(record.clone()).await?;

        let store = self.store.clone();
        tokio::spawn(forward(record, store, rx, events));
        Ok(run_id)
    }

    pub async fn cancel(&self, run_id: Uuid) -> bool {
        self.engine.cancel(run_id).await
    }
}

/// Relays run events to the caller and finalizes the execution record on
/// the terminal item.
async fn forward(
    mut record: ExecutionRecord,
    store: Arc<dyn DurableStore>,
    mut rx: mpsc::Receiver<RunEvent>,
    events: mpsc::Sender<RunEvent>,
) {
    while let Some(event) = rx.recv().await {
        match &event {
            RunEvent::Output(_) => {}
            RunEvent::Completed(completion) => {
                record.status = if completion.canceled {
                    RecordStatus::Canceled
                } else {
                    RecordStatus::Completed
                };
                record.result = Some(completion.result.clone());
                if let Some(meta) = &completion.metadata {
                    record.cost_usd = meta.cost_usd;
                    record.num_turns = meta.num_turns;
                    record.duration_ms = meta.duration_ms;
                    record.session_id = meta.session_id.clone();
                }
                record.finished_at = Some(chrono::Utc::now());
                if let Err(err) = store.update_execution(record.clone()).await {
                    warn!(execution_id = %record.id, %err, "failed to finalize execution record");
                }
            }
            RunEvent::Failed(run_err) => {
                record.status = RecordStatus::Error;
                record.error = Some(run_err.to_string());
                record.finished_at = Some(chrono::Utc::now());
                if let Err(err) = store.update_execution(record.clone()).await {
                    warn!(execution_id = %record.id, %err, "failed to finalize execution record");
                }
            }
        }
        let _ = events.send(event).await;
    }
}
