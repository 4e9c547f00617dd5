// SPDX-License-Identifier: MIT OR Apache-2.0
//! External process invocation with captured combined output.
//!
//! The autobuild builder and publisher drive a handful of external tools
//! (`tar`, `patch`, `gzip`/`bunzip2`/`unxz`, `pdebuild`, `reprepro`, `ssh`).
//! This crate provides one spawn primitive that pipes stdin/stdout/stderr,
//! streams stderr into `tracing` as it arrives, and returns the process's
//! exit status together with the combined output captured for error
//! reporting.
#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write stdin for {command}: {source}")]
    Stdin {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read output of {command}: {source}")]
    Output {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<std::path::Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

/// The outcome of a completed invocation: exit status plus the combined
/// stdout+stderr text, in arrival order, for inclusion in error messages
/// and per-build logs.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub combined_log: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Spawn `spec`, optionally feeding `stdin` to the child, and collect its
/// combined stdout+stderr. Stderr lines are also forwarded to `tracing`
/// as they arrive so a hung build is visible before it finishes.
pub async fn run(spec: &CommandSpec, stdin: Option<&[u8]>) -> Result<CommandOutput, ProcessError> {
    let mut cmd = spec.build();
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: spec.describe(),
        source,
    })?;

    if let Some(bytes) = stdin {
        if let Some(mut child_stdin) = child.stdin.take() {
            child_stdin
                .write_all(bytes)
                .await
                .map_err(|source| ProcessError::Stdin {
                    command: spec.describe(),
                    source,
                })?;
            drop(child_stdin);
        }
    }

    collect(spec, child).await
}

/// Spawn `first`, feed its stdout directly into `second`'s stdin, and
/// collect `second`'s combined output. Used for streaming a compressed
/// diff into `patch` without buffering it in memory.
pub async fn run_piped(
    first: &CommandSpec,
    second: &CommandSpec,
) -> Result<CommandOutput, ProcessError> {
    let mut first_cmd = first.build();
    first_cmd.stdin(Stdio::null());
    first_cmd.stdout(Stdio::piped());
    first_cmd.stderr(Stdio::piped());
    let mut first_child = first_cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: first.describe(),
        source,
    })?;
    drain_stderr(first.describe(), first_child.stderr.take());

    let first_stdout = first_child
        .stdout
        .take()
        .expect("stdout was configured as piped");
    let first_stdio: Stdio = first_stdout
        .try_into()
        .map_err(|source| ProcessError::Output {
            command: first.describe(),
            source,
        })?;

    let mut second_cmd = second.build();
    second_cmd.stdin(first_stdio);
    second_cmd.stdout(Stdio::piped());
    second_cmd.stderr(Stdio::piped());
    let second_child = second_cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: second.describe(),
        source,
    })?;

    let second_output = collect(second, second_child).await?;
    let _ = first_child.wait().await;
    Ok(second_output)
}

async fn collect(spec: &CommandSpec, mut child: Child) -> Result<CommandOutput, ProcessError> {
    let stderr = child.stderr.take();
    let stderr_task = drain_stderr(spec.describe(), stderr);

    let mut combined = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = Vec::new();
        stdout
            .read_to_end(&mut buf)
            .await
            .map_err(|source| ProcessError::Output {
                command: spec.describe(),
                source,
            })?;
        combined.push_str(&String::from_utf8_lossy(&buf));
    }

    let status = child.wait().await.map_err(|source| ProcessError::Output {
        command: spec.describe(),
        source,
    })?;

    if let Some(task) = stderr_task {
        if let Ok(stderr_text) = task.await {
            combined.push_str(&stderr_text);
        }
    }

    Ok(CommandOutput {
        status,
        combined_log: combined,
    })
}

fn drain_stderr(
    command: String,
    stderr: Option<tokio::process::ChildStderr>,
) -> Option<tokio::task::JoinHandle<String>> {
    stderr.map(|stderr| {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut captured = String::new();
            let mut line = String::new();
            loop {
                line.clear();
                match tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim_end();
                        if !trimmed.is_empty() {
                            warn!(target: "autobuild_procio.stderr", command = %command, "{trimmed}");
                        }
                        captured.push_str(&line);
                    }
                    Err(_) => break,
                }
            }
            captured
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = run(&spec, None).await.unwrap();
        assert!(output.success());
        assert!(output.combined_log.contains("hello"));
    }

    #[tokio::test]
    async fn feeds_stdin_to_child() {
        let spec = CommandSpec::new("cat");
        let output = run(&spec, Some(b"piped data")).await.unwrap();
        assert!(output.success());
        assert!(output.combined_log.contains("piped data"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_without_erroring() {
        let spec = CommandSpec::new("sh").args(["-c", "exit 3"]);
        let output = run(&spec, None).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn run_piped_streams_between_processes() {
        let first = CommandSpec::new("echo").arg("streamed");
        let second = CommandSpec::new("cat");
        let output = run_piped(&first, &second).await.unwrap();
        assert!(output.success());
        assert!(output.combined_log.contains("streamed"));
    }
}
