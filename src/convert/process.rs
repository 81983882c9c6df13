//! Running external conversion tools under a timeout.

use crate::config::ToolBinary;
use crate::error::{VerifyError, VerifyResult};
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag that asks every running tool and worker to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Text to show the user when the tool failed: stderr, or stdout when
    /// the tool reports errors there (binmerge does).
    pub fn diagnostic(&self) -> Option<String> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .find(|text| !text.trim().is_empty())
            .cloned()
    }
}

#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
    show_output: bool,
    cancel: CancelToken,
}

impl ToolRunner {
    pub fn new(timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            timeout,
            show_output: false,
            cancel,
        }
    }

    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Runs `tool` with `args`, killing it on timeout or cancellation.
    pub fn run<I, S>(&self, tool: &ToolBinary, args: I) -> VerifyResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if self.cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }
        let mut command = Command::new(&tool.command);
        command
            .args(&tool.args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("Running {:?}", command);

        let mut child = command.spawn().map_err(|err| {
            VerifyError::tool(
                format!(
                    "Failed to run \"{}\": {err}. Is it installed and on your PATH?",
                    tool.command
                ),
                None,
            )
        })?;
        let stdout = child.stdout.take().map(spawn_collector);
        let stderr = child.stderr.take().map(spawn_collector);

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    stop(&mut child);
                    return Err(VerifyError::tool(
                        format!("Failed waiting for \"{}\": {err}", tool.command),
                        None,
                    ));
                }
            }
            // Collector threads are left to finish on their own here: a
            // grandchild may still hold the pipes open.
            if self.cancel.is_cancelled() {
                stop(&mut child);
                return Err(VerifyError::Cancelled);
            }
            if started.elapsed() >= self.timeout {
                stop(&mut child);
                return Err(VerifyError::tool(
                    format!(
                        "\"{}\" did not finish within {} seconds and was stopped",
                        tool.command,
                        self.timeout.as_secs()
                    ),
                    None,
                ));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = ToolOutput {
            status,
            stdout: join_collector(stdout),
            stderr: join_collector(stderr),
        };
        if self.show_output {
            for line in output.stdout.lines().chain(output.stderr.lines()) {
                info!("{line}");
            }
        }
        Ok(output)
    }

    /// Like [`ToolRunner::run`], but a non-zero exit becomes a conversion
    /// failure carrying the tool's own diagnostic.
    pub fn run_checked<I, S>(
        &self,
        tool: &ToolBinary,
        args: I,
        failure: &str,
    ) -> VerifyResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(tool, args)?;
        if !output.status.success() {
            return Err(VerifyError::tool(
                format!("{failure} ({})", output.status),
                output.diagnostic(),
            ));
        }
        Ok(output)
    }
}

fn spawn_collector<R>(mut stream: R) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = stream.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn join_collector(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
