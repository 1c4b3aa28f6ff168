//! Hook script execution
//!
//! A matched job is handed to [`ScriptRunner::dispatch`], which runs the
//! script on its own task. The script's stdout and stderr are forwarded to
//! the log line by line while it runs.

use chrono::Utc;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::job::Job;

/// Log target for lines printed by hook scripts
pub const SCRIPT_LOG_TARGET: &str = "hook_script";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// How a script run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// `code` is None when the script was terminated by a signal.
    FailedExit { code: Option<i32> },
    LaunchFailure { reason: String },
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub outcome: JobOutcome,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

impl JobReport {
    fn launch_failure(job_id: Uuid, reason: String) -> Self {
        Self {
            job_id,
            outcome: JobOutcome::LaunchFailure { reason },
            stdout_lines: 0,
            stderr_lines: 0,
        }
    }
}

/// Runs hook scripts, looking them up in `scripts_path` or on `$PATH`.
#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    scripts_path: Option<PathBuf>,
}

impl ScriptRunner {
    pub fn new(scripts_path: Option<PathBuf>) -> Self {
        Self { scripts_path }
    }

    /// Path the script is started from. A bare name is resolved on `$PATH` by the OS.
    pub fn resolve(&self, script: &str) -> PathBuf {
        match &self.scripts_path {
            Some(dir) => dir.join(script),
            None => PathBuf::from(script),
        }
    }

    /// Run `script` for `job` on a new task and return immediately.
    ///
    /// Callers are free to drop the handle; the job runs to completion either way.
    pub fn dispatch(&self, script: &str, job: Job) -> JoinHandle<JobReport> {
        let runner = self.clone();
        let script = script.to_string();
        tokio::spawn(async move { runner.run(&script, job).await })
    }

    /// Run `script` for `job`, forwarding its output to the log until it exits.
    pub async fn run(&self, script: &str, job: Job) -> JobReport {
        let job_id = job.id;
        let script_path = self.resolve(script);
        let args = job.script_args();
        let started_at = Utc::now();

        info!(
            job = %job_id,
            "Executing command repo={} ref={} (queued {} ms)",
            job.repository,
            job.script_value(),
            (started_at - job.created_at).num_milliseconds()
        );
        info!(job = %job_id, "Running {} {}", script_path.display(), args.join(" "));

        let spawned = Command::new(&script_path)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!(
                    job = %job_id,
                    "Failed to start {}: {}",
                    script_path.display(),
                    e
                );
                return JobReport::launch_failure(job_id, e.to_string());
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout_lines, stderr_lines) = tokio::join!(
            async {
                match stdout {
                    Some(out) => forward_output(out, job_id, OutputStream::Stdout).await,
                    None => 0,
                }
            },
            async {
                match stderr {
                    Some(err) => forward_output(err, job_id, OutputStream::Stderr).await,
                    None => 0,
                }
            },
        );

        let status = child.wait().await;
        let elapsed_ms = (Utc::now() - started_at).num_milliseconds();
        let outcome = match status {
            Ok(status) if status.success() => {
                info!(job = %job_id, "Command finished successfully in {} ms", elapsed_ms);
                JobOutcome::Success
            }
            Ok(status) => {
                warn!(
                    job = %job_id,
                    "Command finished with error: {} after {} ms",
                    status,
                    elapsed_ms
                );
                JobOutcome::FailedExit {
                    code: status.code(),
                }
            }
            Err(e) => {
                error!(job = %job_id, "Could not wait for command: {}", e);
                JobOutcome::FailedExit { code: None }
            }
        };

        JobReport {
            job_id,
            outcome,
            stdout_lines,
            stderr_lines,
        }
    }
}

/// Forward each line read from `reader` to the log until EOF.
/// Returns the number of lines forwarded.
pub async fn forward_output<R: AsyncRead + Unpin>(
    reader: R,
    job_id: Uuid,
    stream: OutputStream,
) -> usize {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut lines = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                info!(
                    target: SCRIPT_LOG_TARGET,
                    job = %job_id,
                    stream = stream.as_str(),
                    "{}",
                    line
                );
                lines += 1;
            }
            Err(e) => {
                warn!(job = %job_id, "Stopped reading {}: {}", stream.as_str(), e);
                break;
            }
        }
    }

    lines
}
