//! Subprocess lifecycle: admission control, spawn with a sanitized
//! environment, stream classification, timeout escalation, cancellation,
//! and the active-run registry.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use workspace_utils::env::child_env;
use workspace_utils::event_buffer::EventBuffer;

use crate::command::{initial_args, resume_args};
use crate::config::{AgentConfig, EngineConfig, MAX_CONCURRENT, MIN_CONCURRENT};
use crate::error::{EngineError, RunError};
use crate::events::{OutputEvent, RunCompletion, RunEvent};
use crate::stream::StreamParser;

const STDERR_TAIL_BYTES: usize = 1024;

/// Request to start a fresh run.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub agent: AgentConfig,
    pub task_id: Uuid,
    pub prompt: String,
    /// Secret bag merged into the sanitized child environment.
    pub secrets: HashMap<String, String>,
}

/// Request to continue a prior session instead of starting fresh context.
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub agent: AgentConfig,
    pub task_id: Uuid,
    pub session_id: String,
    pub message: String,
    pub secrets: HashMap<String, String>,
}

/// Snapshot of one active run, including its buffered events so a
/// reconnecting subscriber can replay recent history.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: Uuid,
    pub task_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub agent: AgentConfig,
    pub buffered_events: Vec<OutputEvent>,
}

struct ExecutionHandle {
    task_id: Uuid,
    started_at: DateTime<Utc>,
    agent: AgentConfig,
    cancel: CancellationToken,
    buffer: Arc<EventBuffer<OutputEvent>>,
}

/// Owns the admission semaphore and the active-run registry. Clones are
/// cheap and share both.
#[derive(Clone)]
pub struct ExecutionEngine {
    config: Arc<EngineConfig>,
    permits: Arc<Semaphore>,
    active: Arc<RwLock<HashMap<Uuid, Arc<ExecutionHandle>>>>,
}

impl ExecutionEngine {
    pub fn new(mut config: EngineConfig) -> Self {
        // struct literals and deserialized configs bypass the builder
        // clamp, so the ceiling is re-clamped here
        config.max_concurrent = config.max_concurrent.clamp(MIN_CONCURRENT, MAX_CONCURRENT);
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config: Arc::new(config),
            permits,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a fresh run. Rejects synchronously when the admission
    /// ceiling is reached; nothing is spawned in that case.
    pub async fn execute(
        &self,
        req: ExecuteRequest,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<Uuid, EngineError> {
        self.config
            .workdir
            .prepare(&req.agent.working_dir)
            .map_err(|reason| EngineError::DirectoryInvalid {
                path: req.agent.working_dir.clone(),
                reason,
            })?;
        let args = initial_args(&req.agent);
        self.spawn_run(req.agent, req.task_id, req.prompt, req.secrets, args, events)
            .await
    }

    /// Continues a prior session. The working directory was validated when
    /// the session was first created and is not re-checked here.
    pub async fn resume(
        &self,
        req: ResumeRequest,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<Uuid, EngineError> {
        let args = resume_args(&req.agent, &req.session_id);
        self.spawn_run(req.agent, req.task_id, req.message, req.secrets, args, events)
            .await
    }

    async fn spawn_run(
        &self,
        agent: AgentConfig,
        task_id: Uuid,
        prompt: String,
        secrets: HashMap<String, String>,
        args: Vec<String>,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<Uuid, EngineError> {
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            let limit = self.config.max_concurrent;
            warn!(limit, "admission ceiling reached, rejecting run");
            EngineError::AdmissionRejected {
                active: limit,
                limit,
            }
        })?;

        let run_id = Uuid::new_v4();
        let env = child_env(&agent.working_dir, &secrets);

        let mut command = Command::new(&self.config.binary);
        command
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&agent.working_dir)
            .args(&args)
            .env_clear()
            .envs(&env);

        let mut child = command.group_spawn()?;

        // Feed the prompt in, then close the pipe so the engine sees EOF.
        if let Some(mut stdin) = child.inner().stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let cancel = CancellationToken::new();
        let buffer = Arc::new(EventBuffer::new(self.config.event_buffer_capacity));
        let handle = Arc::new(ExecutionHandle {
            task_id,
            started_at: Utc::now(),
            agent: agent.clone(),
            cancel: cancel.clone(),
            buffer: buffer.clone(),
        });
        self.active.write().await.insert(run_id, handle);

        info!(%run_id, %task_id, agent = %agent.name, "spawned engine run");

        let timeout = agent
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.default_timeout());
        let grace = self.config.kill_grace();
        let result_byte_cap = self.config.result_byte_cap;
        let stderr_byte_cap = self.config.stderr_byte_cap;
        let active = self.active.clone();

        tokio::spawn(async move {
            // the permit lives exactly as long as the run
            let _permit = permit;
            drive_run(
                run_id,
                child,
                events,
                cancel,
                buffer,
                result_byte_cap,
                stderr_byte_cap,
                timeout,
                grace,
            )
            .await;
            active.write().await.remove(&run_id);
        });

        Ok(run_id)
    }

    /// Cooperatively cancels a run; its subprocess is force-terminated.
    /// Returns false for unknown or already-finished runs.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        let active = self.active.read().await;
        match active.get(&run_id) {
            Some(handle) => {
                info!(%run_id, "canceling run");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Terminates every active run; used on shutdown.
    pub async fn cancel_all(&self) -> usize {
        let active = self.active.read().await;
        for handle in active.values() {
            handle.cancel.cancel();
        }
        if !active.is_empty() {
            info!(count = active.len(), "canceling all active runs");
        }
        active.len()
    }

    pub async fn active_runs(&self) -> Vec<ActiveRun> {
        let active = self.active.read().await;
        active
            .iter()
            .map(|(run_id, handle)| ActiveRun {
                run_id: *run_id,
                task_id: handle.task_id,
                started_at: handle.started_at,
                agent: handle.agent.clone(),
                buffered_events: handle.buffer.snapshot(),
            })
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_run(
    run_id: Uuid,
    mut child: AsyncGroupChild,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
    buffer: Arc<EventBuffer<OutputEvent>>,
    result_byte_cap: usize,
    stderr_byte_cap: usize,
    timeout: Duration,
    grace: Duration,
) {
    let stdout = child.inner().stdout.take();
    let stderr = child.inner().stderr.take();

    // The parser comes back when the stream ends so the accumulator and
    // the terminal metadata survive the reader task.
    let stdout_task = {
        let events = events.clone();
        let buffer = buffer.clone();
        tokio::spawn(async move {
            let mut parser = StreamParser::new(result_byte_cap);
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    for event in parser.parse_line(&line) {
                        buffer.push(event.clone());
                        let _ = events.send(RunEvent::Output(event)).await;
                    }
                }
            }
            parser
        })
    };

    let stderr_task = {
        let events = events.clone();
        let buffer = buffer.clone();
        tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    append_capped(&mut captured, &line, stderr_byte_cap);
                    let event = OutputEvent::Stderr { line };
                    buffer.push(event.clone());
                    let _ = events.send(RunEvent::Output(event)).await;
                }
            }
            captured
        })
    };

    let mut canceled = false;
    let mut timed_out = false;
    let status = tokio::select! {
        status = child.wait() => status.ok(),
        _ = cancel.cancelled() => {
            canceled = true;
            terminate(run_id, &mut child, grace).await
        }
        _ = tokio::time::sleep(timeout) => {
            warn!(%run_id, timeout_secs = timeout.as_secs(), "run timed out, terminating process group");
            timed_out = true;
            terminate(run_id, &mut child, grace).await
        }
    };

    let parser = match stdout_task.await {
        Ok(parser) => parser,
        Err(_) => StreamParser::new(result_byte_cap),
    };
    let stderr = stderr_task.await.unwrap_or_default();

    let exit_code = status.and_then(|s| s.code());
    let (result, metadata) = parser.finish();

    let failure = match &metadata {
        Some(meta) if meta.is_error && !meta.errors.is_empty() => {
            Some(RunError::ResultError {
                message: meta.errors.join("; "),
            })
        }
        None if !canceled && !timed_out && exit_code != Some(0) => {
            Some(RunError::SubprocessError {
                exit_code,
                stderr_tail: tail(&stderr, STDERR_TAIL_BYTES),
            })
        }
        _ => None,
    };

    let terminal = match failure {
        Some(err) => {
            warn!(%run_id, %err, "run failed");
            RunEvent::Failed(err)
        }
        None => {
            debug!(%run_id, ?exit_code, canceled, timed_out, "run finished");
            RunEvent::Completed(RunCompletion {
                result,
                exit_code,
                stderr,
                canceled,
                timed_out,
                metadata,
            })
        }
    };
    let _ = events.send(terminal).await;
}

/// Graceful stop: terminate signal to the whole process group first,
/// forced kill once the grace window runs out.
async fn terminate(
    run_id: Uuid,
    child: &mut AsyncGroupChild,
    grace: Duration,
) -> Option<std::process::ExitStatus> {
    #[cfg(unix)]
    {
        use command_group::{Signal, UnixChildExt};
        if child.signal(Signal::SIGTERM).is_ok() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => return status.ok(),
                Err(_) => {
                    warn!(%run_id, "process group ignored SIGTERM, escalating to SIGKILL")
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (run_id, grace);
    }
    let _ = child.start_kill();
    child.wait().await.ok()
}

fn append_capped(captured: &mut String, line: &str, cap: usize) {
    let remaining = cap.saturating_sub(captured.len());
    if remaining == 0 {
        return;
    }
    // the trailing newline counts against the cap too
    let mut cut = remaining.saturating_sub(1).min(line.len());
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    captured.push_str(&line[..cut]);
    captured.push('\n');
}

fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.trim_end().to_string();
    }
    let mut start = text.len() - max_bytes;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_stub(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn test_agent(dir: &TempDir) -> AgentConfig {
        init_tracing();
        AgentConfig::new("tester", dir.path().join("work"))
    }

    fn request(dir: &TempDir, prompt: &str) -> ExecuteRequest {
        ExecuteRequest {
            agent: test_agent(dir),
            task_id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            secrets: HashMap::new(),
        }
    }

    /// Drains the run channel, returning collected chunks and the
    /// terminal completion. Panics on a Failed terminal.
    async fn drain(mut rx: mpsc::Receiver<RunEvent>) -> (Vec<String>, RunCompletion) {
        let mut chunks = Vec::new();
        let mut completion = None;
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::Output(OutputEvent::Chunk { text }) => chunks.push(text),
                RunEvent::Output(_) => {}
                RunEvent::Completed(c) => completion = Some(c),
                RunEvent::Failed(err) => panic!("unexpected run failure: {err}"),
            }
        }
        (chunks, completion.expect("run never reached a terminal event"))
    }

    #[tokio::test]
    async fn execute_streams_chunk_and_completes_with_result() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(
            &dir,
            r#"cat >/dev/null
echo '{"type":"system","subtype":"init","session_id":"sess-1"}'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}'
echo '{"type":"result","subtype":"success","is_error":false,"result":"hello","total_cost_usd":0.01,"duration_ms":12,"num_turns":1,"session_id":"sess-1"}'
"#,
        );
        let engine = ExecutionEngine::new(EngineConfig::default().with_binary(&stub));
        let (tx, rx) = mpsc::channel(64);
        engine.execute(request(&dir, "task A"), tx).await.unwrap();

        let (chunks, completion) = drain(rx).await;
        assert_eq!(chunks, vec!["hello"]);
        assert_eq!(completion.result, "hello");
        assert!(!completion.canceled);
        assert!(!completion.timed_out);
        assert_eq!(completion.exit_code, Some(0));

        let meta = completion.metadata.expect("result metadata");
        assert_eq!(meta.cost_usd, 0.01);
        assert_eq!(meta.num_turns, 1);
        assert_eq!(meta.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn construction_clamps_admission_ceiling() {
        let zero = ExecutionEngine::new(EngineConfig {
            max_concurrent: 0,
            ..EngineConfig::default()
        });
        assert_eq!(zero.config().max_concurrent, 1);

        let huge = ExecutionEngine::new(EngineConfig {
            max_concurrent: 1000,
            ..EngineConfig::default()
        });
        assert_eq!(huge.config().max_concurrent, 20);

        // a literal zero-ceiling config still admits a run
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "cat >/dev/null\necho '{\"type\":\"result\"}'\n");
        let engine = ExecutionEngine::new(EngineConfig {
            max_concurrent: 0,
            binary: stub,
            ..EngineConfig::default()
        });
        let (tx, rx) = mpsc::channel(8);
        engine.execute(request(&dir, "go"), tx).await.unwrap();
        let (_, completion) = drain(rx).await;
        assert_eq!(completion.exit_code, Some(0));
    }

    #[tokio::test]
    async fn admission_rejects_above_ceiling_without_spawn() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("spawned");
        // every spawn appends one line to the marker before parking
        let stub = write_stub(&dir, "echo x >> \"$SPAWN_MARKER\"\ncat >/dev/null\nsleep 30\n");
        let engine =
            ExecutionEngine::new(EngineConfig::default().with_max_concurrent(1).with_binary(&stub));

        let mut secrets = HashMap::new();
        secrets.insert("SPAWN_MARKER".to_string(), marker.display().to_string());
        let mut req = request(&dir, "hold the slot");
        req.secrets = secrets.clone();

        let (tx, _rx) = mpsc::channel(64);
        let first = engine.execute(req, tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut second = request(&dir, "should be rejected");
        second.secrets = secrets;
        let (tx2, _rx2) = mpsc::channel(64);
        let err = engine.execute(second, tx2).await.unwrap_err();
        assert!(matches!(err, EngineError::AdmissionRejected { .. }));

        let spawned = std::fs::read_to_string(&marker).unwrap_or_default();
        assert_eq!(spawned.lines().count(), 1, "rejected call must not spawn");

        assert!(engine.cancel(first).await);
    }

    #[tokio::test]
    async fn timeout_force_kills_hung_subprocess() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "cat >/dev/null\nsleep 60\n");
        let engine = ExecutionEngine::new(
            EngineConfig::default()
                .with_binary(&stub)
                .with_kill_grace_ms(200),
        );

        let mut req = request(&dir, "hang forever");
        req.agent.timeout_secs = Some(1);

        let start = std::time::Instant::now();
        let (tx, rx) = mpsc::channel(64);
        engine.execute(req, tx).await.unwrap();

        let (_, completion) = drain(rx).await;
        assert!(completion.timed_out);
        assert!(!completion.canceled);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "kill escalation took too long: {:?}",
            start.elapsed()
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.active_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_terminates_run_and_reports_canceled() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "cat >/dev/null\nsleep 60\n");
        let engine = ExecutionEngine::new(
            EngineConfig::default()
                .with_binary(&stub)
                .with_kill_grace_ms(200),
        );

        let (tx, rx) = mpsc::channel(64);
        let run_id = engine.execute(request(&dir, "work"), tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(engine.cancel(run_id).await);
        let (_, completion) = drain(rx).await;
        assert!(completion.canceled);
        assert!(!completion.timed_out);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!engine.cancel(run_id).await, "finished run is unknown");
    }

    #[tokio::test]
    async fn rejects_working_directory_outside_allowed_roots() {
        let dir = TempDir::new().unwrap();
        let engine = ExecutionEngine::new(EngineConfig::default().with_workdir(
            crate::config::WorkdirPolicy {
                allowed_roots: vec![dir.path().to_path_buf()],
                create_missing: true,
            },
        ));

        let mut req = request(&dir, "nope");
        req.agent.working_dir = "/somewhere/else".into();
        let (tx, _rx) = mpsc::channel(8);
        let err = engine.execute(req, tx).await.unwrap_err();
        assert!(matches!(err, EngineError::DirectoryInvalid { .. }));
        assert_eq!(engine.active_count().await, 0);
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_permit() {
        let dir = TempDir::new().unwrap();
        let engine = ExecutionEngine::new(
            EngineConfig::default()
                .with_max_concurrent(1)
                .with_binary("/nonexistent/engine-binary"),
        );

        // with ceiling 1, a second attempt only gets SpawnFailure (not
        // AdmissionRejected) if the first attempt released its permit
        for _ in 0..2 {
            let (tx, _rx) = mpsc::channel(8);
            let err = engine.execute(request(&dir, "a"), tx).await.unwrap_err();
            assert!(matches!(err, EngineError::SpawnFailure(_)));
        }
        assert_eq!(engine.active_count().await, 0);
    }

    #[test]
    fn stderr_capture_stays_within_its_cap() {
        let mut captured = String::new();
        for _ in 0..10 {
            append_capped(&mut captured, "0123456789", 16);
        }
        assert!(captured.len() <= 16, "capture overran: {}", captured.len());
        assert!(captured.ends_with('\n'));
    }

    #[tokio::test]
    async fn stderr_lines_are_captured_and_streamed() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(
            &dir,
            r#"cat >/dev/null
echo 'oops something' >&2
echo '{"type":"result","subtype":"success","is_error":false,"result":"","total_cost_usd":0.0,"duration_ms":1,"num_turns":0}'
"#,
        );
        let engine = ExecutionEngine::new(EngineConfig::default().with_binary(&stub));
        let (tx, mut rx) = mpsc::channel(64);
        engine.execute(request(&dir, "task"), tx).await.unwrap();

        let mut stderr_lines = Vec::new();
        let mut completion = None;
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::Output(OutputEvent::Stderr { line }) => stderr_lines.push(line),
                RunEvent::Output(_) => {}
                RunEvent::Completed(c) => completion = Some(c),
                RunEvent::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }
        assert_eq!(stderr_lines, vec!["oops something"]);
        assert!(completion.unwrap().stderr.contains("oops something"));
    }

    #[tokio::test]
    async fn abnormal_exit_without_result_reports_subprocess_error() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(&dir, "cat >/dev/null\necho 'boom' >&2\nexit 3\n");
        let engine = ExecutionEngine::new(EngineConfig::default().with_binary(&stub));
        let (tx, mut rx) = mpsc::channel(64);
        engine.execute(request(&dir, "task"), tx).await.unwrap();

        let mut failure = None;
        while let Some(event) = rx.recv().await {
            if let RunEvent::Failed(err) = event {
                failure = Some(err);
            }
        }
        match failure.expect("expected a failure") {
            RunError::SubprocessError {
                exit_code,
                stderr_tail,
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr_tail.contains("boom"));
            }
            other => panic!("expected subprocess error, got {other}"),
        }
    }

    #[tokio::test]
    async fn error_result_record_reports_result_error() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(
            &dir,
            r#"cat >/dev/null
echo '{"type":"result","subtype":"error","is_error":true,"errors":["context limit","tool denied"],"total_cost_usd":0.1,"duration_ms":5,"num_turns":2}'
"#,
        );
        let engine = ExecutionEngine::new(EngineConfig::default().with_binary(&stub));
        let (tx, mut rx) = mpsc::channel(64);
        engine.execute(request(&dir, "task"), tx).await.unwrap();

        let mut failure = None;
        while let Some(event) = rx.recv().await {
            if let RunEvent::Failed(err) = event {
                failure = Some(err);
            }
        }
        match failure.expect("expected a failure") {
            RunError::ResultError { message } => {
                assert_eq!(message, "context limit; tool denied");
            }
            other => panic!("expected result error, got {other}"),
        }
    }

    #[tokio::test]
    async fn active_runs_expose_buffered_events_for_replay() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub(
            &dir,
            r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"working"}]}}'
cat >/dev/null
sleep 30
"#,
        );
        let engine = ExecutionEngine::new(
            EngineConfig::default()
                .with_binary(&stub)
                .with_kill_grace_ms(200),
        );
        let (tx, _rx) = mpsc::channel(64);
        let run_id = engine.execute(request(&dir, "task"), tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let active = engine.active_runs().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].run_id, run_id);
        assert!(active[0].buffered_events.contains(&OutputEvent::Chunk {
            text: "working".to_string()
        }));

        assert_eq!(engine.cancel_all().await, 1);
    }

    #[tokio::test]
    async fn resume_passes_session_to_the_engine() {
        let dir = TempDir::new().unwrap();
        // the stub echoes its last two args back as the result text
        let stub = write_stub(
            &dir,
            r#"cat >/dev/null
for arg in "$@"; do last2="$prev $arg"; prev="$arg"; done
printf '{"type":"result","subtype":"success","is_error":false,"result":"%s","total_cost_usd":0,"duration_ms":1,"num_turns":1}\n' "$last2"
"#,
        );
        // resume skips workdir preparation, so create the directory the
        // original execute would have made
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        let engine = ExecutionEngine::new(EngineConfig::default().with_binary(&stub));
        let (tx, rx) = mpsc::channel(64);
        engine
            .resume(
                ResumeRequest {
                    agent: test_agent(&dir),
                    task_id: Uuid::new_v4(),
                    session_id: "sess-9".to_string(),
                    message: "continue".to_string(),
                    secrets: HashMap::new(),
                },
                tx,
            )
            .await
            .unwrap();
        let (_, completion) = drain(rx).await;
        assert_eq!(completion.result, "--resume sess-9");
    }
}
