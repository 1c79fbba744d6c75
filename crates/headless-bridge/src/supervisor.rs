//! Worker process supervision
//!
//! [`ProcessSupervisor`] owns at most one worker process. It spawns the worker
//! with all three standard streams piped, keeps stdout and stderr drained by
//! background reader tasks, and offers blocking send / receive-with-deadline
//! on top of the line protocol.

use crate::launch::Launcher;
use crate::pipe::{DiagnosticTail, STDERR_TAIL_LINES, pipe_reader_task};
use crate::protocol::{Command, Response, decode, encode, preview};
use headless_rl_core::{BridgeError, Result};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a closed stdout waits for stderr to finish draining
const STDERR_SETTLE: Duration = Duration::from_millis(500);

/// How long `kill` waits for the killed process to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// A live worker and the plumbing around it
struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
    stdin: ChildStdin,
    stdout_rx: mpsc::UnboundedReceiver<String>,
    stderr_tail: DiagnosticTail,
    stop_tx: watch::Sender<bool>,
    stderr_task: Option<JoinHandle<()>>,
}

impl WorkerProcess {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    /// Give the stderr reader a moment to pick up the last lines of a dying worker
    async fn settle_stderr(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_SETTLE, task).await;
        }
    }
}

/// Owner of one worker process at a time
pub struct ProcessSupervisor {
    worker: Option<WorkerProcess>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self { worker: None }
    }

    /// Whether a worker is attached (it may have exited on its own)
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Whether the attached worker process is still alive
    pub fn is_alive(&mut self) -> bool {
        self.worker
            .as_mut()
            .is_some_and(|worker| matches!(worker.child.try_wait(), Ok(None)))
    }

    /// OS process id of the attached worker
    pub fn pid(&self) -> Option<u32> {
        self.worker.as_ref().and_then(|worker| worker.pid)
    }

    /// Most recent stderr lines of the attached worker
    pub fn stderr_tail(&self) -> Vec<String> {
        self.worker
            .as_ref()
            .map(|worker| worker.stderr_tail.lines())
            .unwrap_or_default()
    }

    fn rendered_tail(&self) -> String {
        self.worker
            .as_ref()
            .map(|worker| worker.stderr_tail.render())
            .unwrap_or_default()
    }

    /// Spawn a worker, replacing any attached one.
    ///
    /// Returns as soon as the process exists; readiness is the caller's
    /// handshake.
    pub async fn start(&mut self, launcher: &dyn Launcher) -> Result<()> {
        self.kill().await;

        let spec = launcher.resolve()?;
        let mut child = spec.command().spawn().map_err(|e| {
            BridgeError::SpawnFailed(format!("{}: {}", spec.program.display(), e))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(BridgeError::SpawnFailed("worker streams were not captured".into()));
        };

        let pid = child.id();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (line_tx, stdout_rx) = mpsc::unbounded_channel();
        let stderr_tail = DiagnosticTail::new(STDERR_TAIL_LINES);

        // The stdout task is detached; it ends on EOF or stop
        tokio::spawn(pipe_reader_task(stdout, line_tx, stop_rx.clone(), "stdout"));
        let stderr_task = tokio::spawn(pipe_reader_task(
            stderr,
            stderr_tail.clone(),
            stop_rx,
            "stderr",
        ));

        info!(pid = ?pid, "Spawned worker {:?} {:?}", spec.program, spec.args);

        self.worker = Some(WorkerProcess {
            child,
            pid,
            stdin,
            stdout_rx,
            stderr_tail,
            stop_tx,
            stderr_task: Some(stderr_task),
        });
        Ok(())
    }

    /// Write one command line and flush.
    ///
    /// A failed write means the worker is gone: it is killed and detached.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let line = encode(command)?;
        debug!("[Rust→Worker] len={} json={}", line.len(), preview(&line));

        let worker = self.worker.as_mut().ok_or(BridgeError::NotRunning)?;
        let written = worker.write_line(&line).await;
        if let Err(e) = written {
            warn!("Write to worker failed: {}", e);
            self.kill().await;
            return Err(BridgeError::WriteFailed(e.to_string()));
        }
        Ok(())
    }

    /// Wait up to `timeout` for the next stdout line.
    ///
    /// A worker that closed its stdout will never answer, so that is reported
    /// as a timeout straight away. The worker is left attached either way.
    pub async fn recv_line(&mut self, timeout: Duration) -> Result<String> {
        let started = Instant::now();
        let worker = self.worker.as_mut().ok_or(BridgeError::NotRunning)?;

        let received = tokio::time::timeout(timeout, worker.stdout_rx.recv()).await;
        match received {
            Ok(Some(line)) => {
                debug!("[Worker→Rust] len={} json={}", line.len(), preview(&line));
                Ok(line)
            }
            Ok(None) => {
                warn!(pid = ?worker.pid, "Worker closed its output stream");
                worker.settle_stderr().await;
                Err(BridgeError::Timeout {
                    waited: started.elapsed(),
                    stderr_tail: worker.stderr_tail.render(),
                })
            }
            Err(_) => {
                warn!(pid = ?worker.pid, "No worker response within {:?}", timeout);
                Err(BridgeError::Timeout {
                    waited: timeout,
                    stderr_tail: worker.stderr_tail.render(),
                })
            }
        }
    }

    /// Wait up to `timeout` for the next reply and decode it
    pub async fn receive(&mut self, timeout: Duration) -> Result<Response> {
        let line = self.recv_line(timeout).await?;
        self.decode_line(&line)
    }

    /// Decode a received line, attaching the stderr tail on failure
    pub fn decode_line(&self, line: &str) -> Result<Response> {
        decode(line).map_err(|e| e.with_stderr_tail(self.rendered_tail()))
    }

    /// Terminate the attached worker, if any, and stop its readers.
    ///
    /// Never fails; calling it with no worker attached does nothing.
    pub async fn kill(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        let _ = worker.stop_tx.send(true);
        drop(worker.stdin);

        match worker.child.try_wait() {
            Ok(Some(status)) => debug!(pid = ?worker.pid, "Worker already exited: {}", status),
            _ => {
                if let Err(e) = worker.child.start_kill() {
                    debug!(pid = ?worker.pid, "Kill failed: {}", e);
                }
            }
        }

        if tokio::time::timeout(REAP_TIMEOUT, worker.child.wait())
            .await
            .is_err()
        {
            warn!(pid = ?worker.pid, "Worker was not reaped within {:?}", REAP_TIMEOUT);
        }

        if let Some(task) = worker.stderr_task.take() {
            task.abort();
        }
        info!(pid = ?worker.pid, "Stopped worker");
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::launch::LaunchSpec;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("/bin/sh").arg("-c").arg(script)
    }

    const ECHO_WORKER: &str = r#"while IFS= read -r line; do echo "$line"; done"#;

    #[tokio::test]
    async fn test_send_and_receive_roundtrip() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.start(&sh(ECHO_WORKER)).await.unwrap();
        assert!(supervisor.is_running());
        assert!(supervisor.pid().is_some());

        supervisor.send(&Command::Step { action: 4 }).await.unwrap();
        let line = supervisor.recv_line(Duration::from_secs(5)).await.unwrap();
        assert_eq!(line, r#"{"cmd":"step","action":4}"#);

        // The echoed command has none of the reply fields
        supervisor.send(&Command::Snapshot).await.unwrap();
        match supervisor.receive(Duration::from_secs(5)).await.unwrap() {
            Response::Step(reply) => assert!(!reply.done),
            other => panic!("Expected step reply, got {:?}", other),
        }

        supervisor.kill().await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_operations_without_worker() {
        let mut supervisor = ProcessSupervisor::new();
        assert!(matches!(
            supervisor.send(&Command::Snapshot).await,
            Err(BridgeError::NotRunning)
        ));
        assert!(matches!(
            supervisor.recv_line(Duration::from_millis(10)).await,
            Err(BridgeError::NotRunning)
        ));
        // Idempotent teardown
        supervisor.kill().await;
        supervisor.kill().await;
        assert!(supervisor.stderr_tail().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_reports_stderr_tail() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("echo 'booting' >&2; echo 'stuck on asset load' >&2; exec sleep 30"))
            .await
            .unwrap();

        let err = supervisor
            .recv_line(Duration::from_millis(500))
            .await
            .unwrap_err();
        match &err {
            BridgeError::Timeout { stderr_tail, .. } => {
                assert!(stderr_tail.contains("booting\nstuck on asset load"));
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
        assert!(err.to_string().contains("stuck on asset load"));

        // A timeout leaves the worker running
        assert!(supervisor.is_alive());
        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_crashed_worker_surfaces_as_timeout() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("echo 'fatal: deck missing' >&2; exit 3"))
            .await
            .unwrap();

        let started = Instant::now();
        let err = supervisor.recv_line(Duration::from_secs(30)).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(30));
        match err {
            BridgeError::Timeout { stderr_tail, .. } => {
                assert!(stderr_tail.contains("fatal: deck missing"));
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_malformed_line_is_protocol_error_with_tail() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("echo 'warming up' >&2; read -r line; echo 'ready?'; exec sleep 30"))
            .await
            .unwrap();
        supervisor.send(&Command::Snapshot).await.unwrap();

        match supervisor.receive(Duration::from_secs(5)).await {
            Err(BridgeError::ProtocolError { line, stderr_tail }) => {
                assert_eq!(line, "ready?");
                assert!(stderr_tail.contains("warming up"));
            }
            other => panic!("Expected protocol error, got {:?}", other),
        }
        assert!(supervisor.is_running());
        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_write_to_exited_worker_fails() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.start(&sh("exit 0")).await.unwrap();

        // Wait for the process to go away so the pipe is closed
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.is_alive() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let err = supervisor.send(&Command::Step { action: 0 }).await.unwrap_err();
        assert!(matches!(err, BridgeError::WriteFailed(_)));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_start_replaces_previous_worker() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.start(&sh(ECHO_WORKER)).await.unwrap();
        let first = supervisor.pid();
        supervisor.start(&sh(ECHO_WORKER)).await.unwrap();
        assert_ne!(supervisor.pid(), first);
        supervisor.kill().await;
    }

    #[tokio::test]
    async fn test_unlaunchable_program() {
        let mut supervisor = ProcessSupervisor::new();
        let err = supervisor
            .start(&LaunchSpec::new("/nonexistent/headless-worker"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::SpawnFailed(_)));
        assert!(!supervisor.is_running());
    }
}
