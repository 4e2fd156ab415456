//! A single worker process and its duplex pipe connection to the parent.

use std::process::Stdio;
use std::time::{Duration, Instant};

use forge_protocol::{framing, ParentMessage, WorkerMessage};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use crate::WorkerError;

/// The live duplex pipe to a worker's stdin/stdout.
pub struct WorkerConn {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerConn {
    pub async fn send(&mut self, message: &ParentMessage) -> std::io::Result<()> {
        framing::write_frame(&mut self.stdin, message).await
    }

    pub async fn recv(&mut self) -> std::io::Result<Option<WorkerMessage>> {
        framing::read_frame(&mut self.stdout).await
    }
}

/// A fully initialized worker sitting in the pool's ready queue.
pub struct PooledWorker {
    pub process: Child,
    pub conn: WorkerConn,
    pub spawned_at: Instant,
    pub worker_id: String,
    pub startup: Duration,
}

impl PooledWorker {
    /// Launches `command`, wires up its stdio as a framed duplex pipe, and
    /// blocks (up to `init_timeout`) for the worker's `Init` message.
    /// Cache-protocol messages arriving before init are forwarded to
    /// `on_cache_message`, which returns the reply to send back (if any);
    /// receiving one does not end the wait.
    pub async fn spawn(
        worker_id: String,
        mut command: Command,
        init_timeout: Duration,
        mut on_cache_message: impl FnMut(&WorkerMessage) -> Option<ParentMessage>,
    ) -> Result<Self, WorkerError> {
        let spawned_at = Instant::now();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = command
            .spawn()
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdin not piped".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdout not piped".into()))?;
        let mut conn = WorkerConn {
            stdin,
            stdout: BufReader::new(stdout),
        };

        let deadline = Instant::now() + init_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let _ = process.start_kill();
                return Err(WorkerError::InitTimeout);
            }
            let message = match timeout(remaining, conn.recv()).await {
                Ok(Ok(Some(message))) => message,
                Ok(Ok(None)) => {
                    let _ = process.start_kill();
                    return Err(WorkerError::Spawn("worker exited before init".into()));
                }
                Ok(Err(e)) => {
                    let _ = process.start_kill();
                    return Err(WorkerError::Spawn(e.to_string()));
                }
                Err(_) => {
                    let _ = process.start_kill();
                    return Err(WorkerError::InitTimeout);
                }
            };

            match message {
                WorkerMessage::Init { success: true, .. } => break,
                WorkerMessage::Init {
                    success: false,
                    error,
                } => {
                    let _ = process.start_kill();
                    return Err(WorkerError::InitFailed(
                        error.unwrap_or_else(|| "worker reported init failure".into()),
                    ));
                }
                other => {
                    if let Some(reply) = on_cache_message(&other) {
                        if conn.send(&reply).await.is_err() {
                            let _ = process.start_kill();
                            return Err(WorkerError::Spawn(
                                "failed writing startup-cache reply during init".into(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(Self {
            process,
            conn,
            spawned_at,
            worker_id,
            startup: spawned_at.elapsed(),
        })
    }

    /// True if the OS process has exited since it was put in the ready queue.
    pub fn is_dead(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(Some(_)) | Err(_))
    }

    /// `terminate -> join(1s) -> kill` escalation used on pool shutdown.
    pub async fn terminate(mut self, join_timeout: Duration) {
        let _ = self.conn.send(&ParentMessage::Stop).await;
        if timeout(join_timeout, self.process.wait()).await.is_err() {
            let _ = self.process.start_kill();
            let _ = self.process.wait().await;
        }
    }
}
