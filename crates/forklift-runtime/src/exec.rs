//! Host command execution
//!
//! The runtime's control socket belongs to the host, so every runtime CLI
//! call is made from inside the host's mount/UTS/network/IPC namespaces via
//! `nsenter -t 1`. This requires the pod to run with `hostPID` and privileges.
//!
//! Arguments are passed as separate argv entries, never through a shell.
//! Children are killed when the calling future is dropped, so a cancelled
//! HTTP request or an elapsed timeout never leaves a runtime command behind.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::RuntimeError;

/// Trait for running runtime CLI commands on the host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostExec: Send + Sync {
    /// Run `program` with `args` and return its standard output.
    ///
    /// A non-zero exit status is an error.
    async fn run(&self, program: &str, args: &[String]) -> Result<String, RuntimeError>;
}

/// Runs commands in the host namespaces of PID 1
#[derive(Debug, Clone)]
pub struct NsenterExec {
    prefix: Vec<String>,
    timeout: Option<Duration>,
}

impl NsenterExec {
    /// Create an executor with an optional per-command timeout
    pub fn new(timeout: Option<Duration>) -> Self {
        let prefix = ["nsenter", "-t", "1", "-m", "-u", "-n", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self { prefix, timeout }
    }

    #[cfg(test)]
    fn local(timeout: Option<Duration>) -> Self {
        Self {
            prefix: Vec::new(),
            timeout,
        }
    }

    /// Full argv for a command, including the nsenter prefix
    pub fn argv(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut argv = self.prefix.clone();
        argv.push(program.to_string());
        argv.extend(args.iter().cloned());
        argv
    }
}

#[async_trait]
impl HostExec for NsenterExec {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, RuntimeError> {
        let argv = self.argv(program, args);
        let command_line = argv.join(" ");
        debug!(command = %command_line, "Running host command");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| RuntimeError::Timeout {
                    command: command_line.clone(),
                    timeout,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| RuntimeError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Convert borrowed arguments into the owned form [`HostExec::run`] takes
pub(crate) fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`HostExec`] that records every invocation

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays queued responses in order and records each argv
    #[derive(Default)]
    pub struct ScriptedExec {
        calls: Mutex<Vec<Vec<String>>>,
        responses: Mutex<VecDeque<Result<String, RuntimeError>>>,
    }

    impl ScriptedExec {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a successful response with the given stdout
        pub fn ok(self, stdout: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(stdout.to_string()));
            self
        }

        /// Queue a failed response
        pub fn fail(self, stderr: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(RuntimeError::CommandFailed {
                    command: "scripted".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: stderr.to_string(),
                }));
            self
        }

        /// Every recorded invocation as `program arg…` strings
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|argv| argv.join(" "))
                .collect()
        }
    }

    #[async_trait]
    impl HostExec for ScriptedExec {
        async fn run(&self, program: &str, args: &[String]) -> Result<String, RuntimeError> {
            let mut argv = vec![program.to_string()];
            argv.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(argv);

            // Unscripted calls succeed with no output (e.g., cleanup)
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }
}
