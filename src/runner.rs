// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subprocess execution seam.
//!
//! Privileged network tools (`wg`, `wg-quick`, `tailscale`) are always
//! invoked with a discrete argument vector, never through a shell. The trait
//! exists so the interface executor can be driven by a simulated tool in
//! tests.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Best diagnostic text for an error message: stderr, else stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to exit.
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// Whether `program` can be found on this host.
    async fn is_available(&self, program: &str) -> bool;
}

/// Runs real processes via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        tracing::debug!(program, ?args, "Executing external tool");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn is_available(&self, program: &str) -> bool {
        let Some(paths) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
    }
}

/// Run with a hard deadline. The child is killed when the deadline passes.
pub async fn run_with_timeout(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> io::Result<CommandOutput> {
    match tokio::time::timeout(timeout, runner.run(program, args)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{program} did not finish within {}s", timeout.as_secs()),
        )),
    }
}
