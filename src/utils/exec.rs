//! External command execution utilities.
//!
//! Provides a Builder-based API for running external commands with proper
//! output handling.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! // Simple command
//! Cmd::new("git").args(["status", "-s"]).run()?;
//!
//! // With working directory
//! Cmd::new("../tools/run_web_tests.py")
//!     .args(["-t", "Default"])
//!     .cwd(web_tests_root)
//!     .run()?;
//! ```

#![allow(dead_code)]

use crate::log;
use anyhow::{Context, Result};
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::{Command, Output},
};

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for external process execution.
///
/// Provides a fluent API for configuring and running external commands.
#[derive(Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Add a single argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            let arg = arg.as_ref();
            if !arg.is_empty() {
                self.args.push(arg.to_owned());
            }
        }
        self
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Execute the command and return output. Fails with the command's
    /// stderr/stdout attached when it exits nonzero.
    pub fn run(self) -> Result<Output> {
        let name = self.program_name();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute `{name}`"))?;

        log_output(&name, &output)?;
        Ok(output)
    }

    /// Get the program name for error messages.
    fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Log command stderr, returning an error on nonzero exit.
fn log_output(name: &str, output: &Output) -> Result<()> {
    if !output.status.success() {
        anyhow::bail!(format_error(name, output));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        log!(name; "{stderr}");
    }
    Ok(())
}

/// Format error message for failed command.
fn format_error(name: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut msg = format!("Command `{name}` failed with {}\n", output.status);
    let stderr_trimmed = stderr.trim();
    if !stderr_trimmed.is_empty() {
        msg.push_str(stderr_trimmed);
    }

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
