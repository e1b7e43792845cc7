//! Sequential multi-step runs: one engine execution per step, output
//! templated into the next step's input, approval gates between steps,
//! cost aggregation, and cooperative cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use workspace_utils::text::preview;

use engine::{ExecuteRequest, ExecutionEngine, RunCompletion, RunEvent, RunError};
use store::models::{PipelineRecord, PipelineRunRecord, RecordStatus, StepRecord, StepResult};
use store::{DurableStore, ReportGenerator};

use crate::agent_config;
use crate::error::PipelineError;
use crate::events::PipelineEvent;
use crate::template::render;

/// Char cap for previews carried in lifecycle events.
const PREVIEW_MAX_CHARS: usize = 200;

struct PipelineRunState {
    pipeline_id: Uuid,
    started_at: DateTime<Utc>,
    current_step: AtomicUsize,
    cancel: CancellationToken,
    /// At most one pending approval per run; enforced by [`register_gate`].
    approval: Mutex<Option<oneshot::Sender<bool>>>,
    /// Engine run id of the in-flight step, for cancel cascade.
    child: Mutex<Option<Uuid>>,
}

impl PipelineRunState {
    async fn register_gate(&self, sender: oneshot::Sender<bool>) -> Result<(), PipelineError> {
        let mut slot = self.approval.lock().await;
        if slot.is_some() {
            return Err(PipelineError::GateAlreadyPending);
        }
        *slot = Some(sender);
        Ok(())
    }
}

/// Snapshot of one active pipeline run.
#[derive(Debug, Clone)]
pub struct ActivePipeline {
    pub run_id: Uuid,
    pub pipeline_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub current_step: usize,
}

/// Drives pipeline runs through the engine. Clones share the registry.
#[derive(Clone)]
pub struct PipelineService {
    engine: ExecutionEngine,
    store: Arc<dyn DurableStore>,
    reports: Arc<dyn ReportGenerator>,
    active: Arc<RwLock<HashMap<Uuid, Arc<PipelineRunState>>>>,
}

impl PipelineService {
    pub fn new(
        engine: ExecutionEngine,
        store: Arc<dyn DurableStore>,
        reports: Arc<dyn ReportGenerator>,
    ) -> Self {
        Self {
            engine,
            store,
            reports,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Starts a pipeline run. Step 0 receives `initial_input` verbatim and
    /// can never be gated.
    pub async fn start(
        &self,
        pipeline_id: Uuid,
        initial_input: String,
        events: mpsc::Sender<PipelineEvent>,
    ) -> Result<Uuid, PipelineError> {
        let pipeline = self.store.pipeline(pipeline_id).await?;
        if pipeline.steps.is_empty() {
            return Err(PipelineError::PipelineUnavailable(
                "pipeline has no steps".to_string(),
            ));
        }
        if pipeline.steps[0].requires_approval {
            return Err(PipelineError::PipelineUnavailable(
                "first step cannot require approval".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let record = PipelineRunRecord::running(run_id, pipeline.id, pipeline.steps.len());
        self.store.insert_pipeline_run(record.clone()).await?;

        let state = Arc::new(PipelineRunState {
            pipeline_id,
            started_at: record.started_at,
            current_step: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            approval: Mutex::new(None),
            child: Mutex::new(None),
        });
        self.active.write().await.insert(run_id, state.clone());
        info!(%run_id, %pipeline_id, steps = pipeline.steps.len(), "pipeline run started");

        let service = self.clone();
        tokio::spawn(async move {
            service
                .drive(run_id, record, pipeline, initial_input, state, events)
                .await;
            service.active.write().await.remove(&run_id);
        });
        Ok(run_id)
    }

    /// Resolves the pending gate as approved; the gated step starts.
    pub async fn approve(&self, run_id: Uuid) -> Result<(), PipelineError> {
        self.resolve_gate(run_id, true).await
    }

    /// Resolves the pending gate as rejected; the run terminates and the
    /// gated step never starts.
    pub async fn reject(&self, run_id: Uuid) -> Result<(), PipelineError> {
        self.resolve_gate(run_id, false).await
    }

    async fn resolve_gate(&self, run_id: Uuid, approved: bool) -> Result<(), PipelineError> {
        let state = self
            .active
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(PipelineError::UnknownRun)?;
        let sender = state
            .approval
            .lock()
            .await
            .take()
            .ok_or(PipelineError::NoPendingApproval)?;
        info!(%run_id, approved, "approval gate resolved");
        let _ = sender.send(approved);
        Ok(())
    }

    /// Cancels a run, force-terminating the in-flight child. A pending
    /// approval resolves as a non-approval; cancellation takes precedence
    /// over `rejected` as the terminal status.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        let state = self.active.read().await.get(&run_id).cloned();
        let Some(state) = state else {
            return false;
        };
        info!(%run_id, "canceling pipeline run");
        state.cancel.cancel();
        if let Some(child) = *state.child.lock().await {
            self.engine.cancel(child).await;
        }
        true
    }

    pub async fn active_runs(&self) -> Vec<ActivePipeline> {
        let active = self.active.read().await;
        active
            .iter()
            .map(|(run_id, state)| ActivePipeline {
                run_id: *run_id,
                pipeline_id: state.pipeline_id,
                started_at: state.started_at,
                current_step: state.current_step.load(Ordering::Relaxed),
            })
            .collect()
    }

    async fn drive(
        &self,
        run_id: Uuid,
        mut record: PipelineRunRecord,
        pipeline: PipelineRecord,
        initial_input: String,
        state: Arc<PipelineRunState>,
        events: mpsc::Sender<PipelineEvent>,
    ) {
        let total_steps = pipeline.steps.len();
        let mut input = initial_input;
        let mut results: Vec<StepResult> = Vec::new();
        let mut terminal = RecordStatus::Completed;
        let mut failure: Option<String> = None;

        'steps: for (index, step) in pipeline.steps.iter().enumerate() {
            let agent = match self.store.agent(step.agent_id).await {
                Ok(agent) if agent.is_available() => agent,
                _ => {
                    let message = format!("agent {} is missing or inactive", step.agent_id);
                    let _ = events
                        .send(PipelineEvent::Error {
                            step_index: index,
                            message: message.clone(),
                        })
                        .await;
                    terminal = RecordStatus::Error;
                    failure = Some(message);
                    break 'steps;
                }
            };

            if step.requires_approval {
                let (gate_tx, gate_rx) = oneshot::channel();
                if let Err(err) = state.register_gate(gate_tx).await {
                    terminal = RecordStatus::Error;
                    failure = Some(err.to_string());
                    break 'steps;
                }
                state.current_step.store(index, Ordering::Relaxed);
                record.status = RecordStatus::AwaitingApproval;
                record.current_step = index;
                self.persist_run(&record).await;
                let _ = events
                    .send(PipelineEvent::ApprovalRequired {
                        step_index: index,
                        agent_name: agent.name.clone(),
                        output_preview: preview(&input, PREVIEW_MAX_CHARS),
                    })
                    .await;
                info!(%run_id, step = index, "awaiting approval");

                let decision = tokio::select! {
                    _ = state.cancel.cancelled() => None,
                    decision = gate_rx => Some(decision.unwrap_or(false)),
                };
                match decision {
                    None => {
                        terminal = RecordStatus::Canceled;
                        break 'steps;
                    }
                    Some(false) => {
                        let _ = events
                            .send(PipelineEvent::Rejected { step_index: index })
                            .await;
                        terminal = RecordStatus::Rejected;
                        break 'steps;
                    }
                    Some(true) => {}
                }
            }

            state.current_step.store(index, Ordering::Relaxed);
            record.status = RecordStatus::Running;
            record.current_step = index;
            self.persist_run(&record).await;

            let step_input = render(step.input_template.as_deref(), &input);
            let mut step_record = StepRecord::running(run_id, index, agent.id, &agent.name);
            if let Err(err) = self.store.insert_step(step_record.clone()).await {
                warn!(%run_id, step = index, %err, "failed to insert step record");
            }
            let _ = events
                .send(PipelineEvent::StepStart {
                    step_index: index,
                    agent_name: agent.name.clone(),
                    total_steps,
                })
                .await;

            let secrets = self.store.secret_bag().await.unwrap_or_default();
            let (tx, mut rx) = mpsc::channel(256);
            let spawned = self
                .engine
                .execute(
                    ExecuteRequest {
                        agent: agent_config(&agent),
                        task_id: step_record.id,
                        prompt: step_input,
                        secrets,
                    },
                    tx,
                )
                .await;
            let child_id = match spawned {
                Ok(id) => id,
                Err(err) => {
                    let message = err.to_string();
                    step_record.status = RecordStatus::Error;
                    step_record.finished_at = Some(Utc::now());
                    self.persist_step(&step_record).await;
                    let _ = events
                        .send(PipelineEvent::Error {
                            step_index: index,
                            message: message.clone(),
                        })
                        .await;
                    terminal = RecordStatus::Error;
                    failure = Some(message);
                    break 'steps;
                }
            };
            *state.child.lock().await = Some(child_id);

            let mut completion: Option<RunCompletion> = None;
            let mut run_failure: Option<RunError> = None;
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(RunEvent::Output(event)) => {
                            let _ = events
                                .send(PipelineEvent::StepOutput { step_index: index, event })
                                .await;
                        }
                        Some(RunEvent::Completed(c)) => completion = Some(c),
                        Some(RunEvent::Failed(err)) => run_failure = Some(err),
                        None => break,
                    },
                    _ = state.cancel.cancelled() => {
                        self.engine.cancel(child_id).await;
                        // drain until the channel closes so the child is reaped
                        while let Some(event) = rx.recv().await {
                            if let RunEvent::Completed(c) = event {
                                completion = Some(c);
                            }
                        }
                        break;
                    }
                }
            }
            *state.child.lock().await = None;

            let was_canceled = state.cancel.is_cancelled()
                || completion.as_ref().is_some_and(|c| c.canceled);
            if was_canceled {
                // partial output of a canceled step is discarded
                step_record.status = RecordStatus::Canceled;
                step_record.finished_at = Some(Utc::now());
                self.persist_step(&step_record).await;
                terminal = RecordStatus::Canceled;
                break 'steps;
            }

            let completion = match (completion, run_failure) {
                (_, Some(err)) => {
                    let message = err.to_string();
                    step_record.status = RecordStatus::Error;
                    step_record.finished_at = Some(Utc::now());
                    self.persist_step(&step_record).await;
                    let _ = events
                        .send(PipelineEvent::Error {
                            step_index: index,
                            message: message.clone(),
                        })
                        .await;
                    terminal = RecordStatus::Error;
                    failure = Some(message);
                    break 'steps;
                }
                (None, None) => {
                    let message = "run channel closed without a terminal event".to_string();
                    step_record.status = RecordStatus::Error;
                    step_record.finished_at = Some(Utc::now());
                    self.persist_step(&step_record).await;
                    let _ = events
                        .send(PipelineEvent::Error {
                            step_index: index,
                            message: message.clone(),
                        })
                        .await;
                    terminal = RecordStatus::Error;
                    failure = Some(message);
                    break 'steps;
                }
                (Some(completion), None) => completion,
            };

            let (cost_usd, duration_ms, num_turns) = completion
                .metadata
                .as_ref()
                .map(|m| (m.cost_usd, m.duration_ms, m.num_turns))
                .unwrap_or((0.0, 0, 0));

            step_record.status = RecordStatus::Completed;
            step_record.result = Some(completion.result.clone());
            step_record.cost_usd = cost_usd;
            step_record.duration_ms = duration_ms;
            step_record.num_turns = num_turns;
            step_record.finished_at = Some(Utc::now());
            self.persist_step(&step_record).await;

            // totals are written back per step so a crash mid-run loses at
            // most the in-flight step
            record.total_cost_usd += cost_usd;
            record.total_duration_ms += duration_ms;
            self.persist_run(&record).await;

            let _ = events
                .send(PipelineEvent::StepComplete {
                    step_index: index,
                    result_preview: preview(&completion.result, PREVIEW_MAX_CHARS),
                    cost_usd,
                })
                .await;

            results.push(StepResult {
                step_index: index,
                agent_name: agent.name.clone(),
                result: completion.result.clone(),
                cost_usd,
                duration_ms,
                num_turns,
            });
            input = completion.result;
        }

        record.status = terminal;
        record.error = failure;
        record.finished_at = Some(Utc::now());
        self.persist_run(&record).await;
        info!(%run_id, status = %terminal, "pipeline run finished");

        if terminal == RecordStatus::Completed {
            let _ = events
                .send(PipelineEvent::Complete {
                    results: results.clone(),
                    total_cost_usd: record.total_cost_usd,
                })
                .await;
            // report failure never fails the pipeline that triggered it
            match self.reports.generate(&record, &results).await {
                Ok(reference) => {
                    let _ = events
                        .send(PipelineEvent::ReportGenerated { reference })
                        .await;
                }
                Err(err) => warn!(%run_id, %err, "report generation failed"),
            }
        }
    }

    async fn persist_run(&self, record: &PipelineRunRecord) {
        if let Err(err) = self.store.update_pipeline_run(record.clone()).await {
            warn!(run_id = %record.id, %err, "failed to persist pipeline run");
        }
    }

    async fn persist_step(&self, record: &StepRecord) {
        if let Err(err) = self.store.update_step(record.clone()).await {
            warn!(run_id = %record.run_id, step = record.step_index, %err, "failed to persist step");
        }
    }
}
