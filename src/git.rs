use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// One git invocation: an argument vector plus the directory it runs in.
///
/// The working directory is always explicit. Nothing in this crate changes
/// the process-wide current directory, so commands can run concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    pub dir: PathBuf,
    pub args: Vec<String>,
}

impl GitCommand {
    pub fn new<I, S>(dir: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dir: dir.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The git subcommand (`status`, `pull`, ...), or an empty string.
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Captured result of a finished git process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was terminated by a signal
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combined, trimmed stdout and stderr for display
    pub fn diagnostic(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }

    /// Turn a non-zero exit into [`SyncError::CommandFailure`]
    pub fn check(self, command: &GitCommand) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let stderr = if self.stderr.trim().is_empty() {
                self.stdout.trim().to_string()
            } else {
                self.stderr.trim().to_string()
            };
            Err(SyncError::CommandFailure {
                command: command.to_string(),
                status: self.status,
                stderr,
            })
        }
    }
}

/// Executes git commands on behalf of the engine.
///
/// Implementations return `Ok` for any process that ran to completion,
/// whatever its exit code; callers decide what a non-zero status means.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, command: GitCommand) -> Result<CommandOutput>;
}

/// [`GitRunner`] backed by the `git` binary on `PATH`
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: String,
    timeout: Duration,
}

impl SystemGit {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Use a different executable, e.g. an absolute path to git
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, command: GitCommand) -> Result<CommandOutput> {
        debug!("git {} (in {})", command, command.dir.display());

        // kill_on_drop makes both the timeout and an outer cancellation
        // terminate the child instead of leaving it running
        let child = AsyncCommand::new(&self.program)
            .args(&command.args)
            .current_dir(&command.dir)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|source| SyncError::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                warn!(
                    "git {} in {} timed out after {}s",
                    command,
                    command.dir.display(),
                    self.timeout.as_secs()
                );
                return Err(SyncError::Timeout {
                    command: command.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}

/// True when `dir` directly contains a `.git` entry (directory or gitfile)
pub fn is_working_copy(dir: &Path) -> bool {
    dir.join(".git").symlink_metadata().is_ok()
}

/// Compare remote URLs across ssh/https spellings
pub fn remote_urls_match(actual: &str, expected: &str) -> bool {
    normalize_remote_url(actual) == normalize_remote_url(expected)
}

fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    // scp-like form: git@host:owner/repo
    let url = match url.split_once('@') {
        Some((user, rest)) if !user.contains('/') && !url.contains("://") => {
            match rest.split_once(':') {
                Some((host, path)) => format!("https://{}/{}", host, path),
                None => url.to_string(),
            }
        }
        _ => url
            .replacen("ssh://git@", "https://", 1)
            .replacen("git://", "https://", 1),
    };

    url.trim_end_matches('/')
        .trim_end_matches(".git")
        .to_lowercase()
}
