//! Local sync executor
//!
//! Applies a rebase pull to working copies classified as clean and reports
//! exactly one [`SyncOutcome`] per target. Per-target errors end up inside the
//! outcome; nothing here aborts a run.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::git::{remote_urls_match, GitCommand, GitRunner};
use crate::state::{Classification, Classifier, RepoState};

/// What happened to one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    AlreadyUpToDate,
    Updated,
    Cloned,
    SkippedDirty,
    SkippedEmpty,
    RemoteMismatch,
    Failed,
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::AlreadyUpToDate => "up-to-date",
            OutcomeKind::Updated => "updated",
            OutcomeKind::Cloned => "cloned",
            OutcomeKind::SkippedDirty => "skipped-dirty",
            OutcomeKind::SkippedEmpty => "skipped-empty",
            OutcomeKind::RemoteMismatch => "remote-mismatch",
            OutcomeKind::Failed => "failed",
        }
    }

    pub const ALL: [OutcomeKind; 7] = [
        OutcomeKind::AlreadyUpToDate,
        OutcomeKind::Updated,
        OutcomeKind::Cloned,
        OutcomeKind::SkippedDirty,
        OutcomeKind::SkippedEmpty,
        OutcomeKind::RemoteMismatch,
        OutcomeKind::Failed,
    ];
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one attempted update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Working copy path or remote entity identifier
    pub target: String,
    pub kind: OutcomeKind,
    /// Classified state, when classification ran
    pub state: Option<RepoState>,
    /// Non-fatal remote warning from classification
    pub warning: Option<String>,
    /// Captured command output or error text
    pub detail: String,
}

impl SyncOutcome {
    pub fn new(target: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            target: target.into(),
            kind,
            state: None,
            warning: None,
            detail: String::new(),
        }
    }

    pub fn failed(target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(target, OutcomeKind::Failed).with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    fn classified(mut self, classification: &Classification) -> Self {
        self.state = Some(classification.state);
        self.warning = classification.remote_warning.clone();
        self
    }

    pub fn is_failure(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }

    /// Single report line: state, outcome, target and a one-line reason
    pub fn summary_line(&self) -> String {
        let state = self
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!("[{:<5}] {:<15} {}", state, self.kind.label(), self.target);

        if let Some(warning) = &self.warning {
            line.push_str(&format!(" (warning: {})", warning));
        }

        // git puts the meaningful part ("fatal: ...") last
        let reason = self.detail.lines().rev().map(str::trim).find(|l| !l.is_empty());
        if let (Some(reason), true) = (
            reason,
            matches!(self.kind, OutcomeKind::Failed | OutcomeKind::RemoteMismatch),
        ) {
            line.push_str(&format!(": {}", reason));
        }

        line
    }

    /// Summary line followed by the indented pull output for updated targets
    pub fn report(&self) -> String {
        let mut report = self.summary_line();
        if self.kind == OutcomeKind::Updated {
            for line in self.detail.lines().filter(|l| !l.trim().is_empty()) {
                report.push_str("\n    ");
                report.push_str(line.trim_end());
            }
        }
        report
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary_line())
    }
}

/// Runs the rebase pull for a clean working copy
#[derive(Clone)]
pub struct SyncExecutor {
    runner: Arc<dyn GitRunner>,
}

impl SyncExecutor {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }

    /// Pull `path` with `--rebase` and report whether `HEAD` moved.
    ///
    /// Failures are reported as-is. There is no retry, reset, stash or
    /// conflict resolution.
    pub async fn pull(&self, target: &str, path: &Path, before: Option<&str>) -> SyncOutcome {
        let pull_cmd = GitCommand::new(path, ["pull", "--rebase"]);
        let output = match self.runner.run(pull_cmd.clone()).await {
            Ok(output) => output,
            Err(e) => return SyncOutcome::failed(target, e.to_string()),
        };
        let diagnostic = output.diagnostic();
        if let Err(e) = output.check(&pull_cmd) {
            error!("{}: {}", target, e);
            return SyncOutcome::failed(target, e.to_string());
        }

        let head_cmd = GitCommand::new(path, ["rev-parse", "HEAD"]);
        let after = match self.runner.run(head_cmd.clone()).await {
            Ok(output) => match output.check(&head_cmd) {
                Ok(output) => output.stdout.trim().to_string(),
                Err(e) => return SyncOutcome::failed(target, e.to_string()),
            },
            Err(e) => return SyncOutcome::failed(target, e.to_string()),
        };

        if before == Some(after.as_str()) {
            debug!("{} already up to date", target);
            SyncOutcome::new(target, OutcomeKind::AlreadyUpToDate)
        } else {
            info!("{} updated to {}", target, after);
            SyncOutcome::new(target, OutcomeKind::Updated).with_detail(diagnostic)
        }
    }
}

/// Classify-then-sync pipeline shared by audit and mirror modes
#[derive(Clone)]
pub struct LocalSync {
    classifier: Classifier,
    executor: SyncExecutor,
}

impl LocalSync {
    pub fn new(runner: Arc<dyn GitRunner>, expected_remote: impl Into<String>) -> Self {
        Self {
            classifier: Classifier::new(runner.clone(), expected_remote),
            executor: SyncExecutor::new(runner),
        }
    }

    /// Classify `path` and pull it when it is clean.
    ///
    /// With `expected_url`, the working copy must have a remote pointing at
    /// that URL; otherwise the outcome is a remote mismatch and no pull runs.
    pub async fn sync(&self, target: &str, path: &Path, expected_url: Option<&str>) -> SyncOutcome {
        let classification = match self.classifier.classify(path).await {
            Ok(c) => c,
            Err(e) => {
                error!("{}: classification failed: {}", target, e);
                return SyncOutcome::failed(target, e.to_string());
            }
        };

        let outcome = match classification.state {
            RepoState::Dirty => SyncOutcome::new(target, OutcomeKind::SkippedDirty),
            RepoState::Empty => SyncOutcome::new(target, OutcomeKind::SkippedEmpty),
            RepoState::Clean => {
                if let Some(mismatch) = self.remote_mismatch(&classification, expected_url) {
                    warn!("{}: {}", target, mismatch);
                    SyncOutcome::new(target, OutcomeKind::RemoteMismatch)
                        .with_detail(mismatch.to_string())
                } else {
                    self.executor
                        .pull(target, path, classification.head.as_deref())
                        .await
                }
            }
        };

        outcome.classified(&classification)
    }

    /// Why a clean copy must not be pulled, if anything.
    ///
    /// Without an expected URL any remote will do. With one, the expected
    /// remote (normally `origin`) must exist and point at that URL. Other
    /// remotes are not consulted.
    fn remote_mismatch(
        &self,
        classification: &Classification,
        expected_url: Option<&str>,
    ) -> Option<SyncError> {
        if classification.remotes.is_empty() {
            return Some(SyncError::RemoteMismatch(
                "no remote to pull from".to_string(),
            ));
        }

        let expected = expected_url?;
        let remote_name = self.classifier.expected_remote();
        match classification.remote(remote_name) {
            Some(remote) if remote_urls_match(&remote.url, expected) => None,
            Some(remote) => Some(SyncError::RemoteMismatch(format!(
                "expected {}={}, found {}",
                remote_name, expected, remote.url
            ))),
            None => Some(SyncError::RemoteMismatch(format!(
                "expected {}={}, but there is no '{}' remote",
                remote_name, expected, remote_name
            ))),
        }
    }
}
