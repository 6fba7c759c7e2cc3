//! Working copy state classification
//!
//! Classification runs three read-only git queries and reduces their
//! structured output to a [`RepoState`]. The reduction is [`classify`], a pure
//! function, so the same query results always produce the same state.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::git::{GitCommand, GitRunner};

/// Local state of a working copy for this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoState {
    /// No uncommitted changes and at least one commit; eligible for update
    Clean,
    /// Modified, staged, unmerged or untracked entries present
    Dirty,
    /// No commits yet
    Empty,
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepoState::Clean => "clean",
            RepoState::Dirty => "dirty",
            RepoState::Empty => "empty",
        };
        f.write_str(label)
    }
}

/// A configured remote and its fetch URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

/// Parsed `git status --porcelain=v2 --branch`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// `# branch.oid (initial)`: the branch has no commits
    pub initial: bool,
    pub branch: Option<String>,
    /// Ordinary and renamed/copied entries
    pub changed: usize,
    pub unmerged: usize,
    pub untracked: usize,
}

impl StatusReport {
    pub fn is_dirty(&self) -> bool {
        self.changed > 0 || self.unmerged > 0 || self.untracked > 0
    }
}

/// Result of classifying one working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state: RepoState,
    pub remotes: Vec<Remote>,
    /// Commit `HEAD` points at, when there is one
    pub head: Option<String>,
    /// Set when no remote carries the expected name
    pub remote_warning: Option<String>,
}

impl Classification {
    pub fn remote(&self, name: &str) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.name == name)
    }
}

/// Parse `git remote -v`, keeping the fetch URL of each remote.
///
/// Lines are `<name>\t<url> (fetch|push)`; the URL may contain spaces.
pub fn parse_remotes(output: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();

    for line in output.lines() {
        let Some((name, rest)) = line.split_once('\t') else {
            continue;
        };
        let rest = rest.trim_end();
        let (url, is_fetch) = if let Some(url) = rest.strip_suffix(" (fetch)") {
            (url, true)
        } else if let Some(url) = rest.strip_suffix(" (push)") {
            (url, false)
        } else {
            (rest, true)
        };
        if name.is_empty() || url.is_empty() {
            continue;
        }

        match remotes.iter_mut().find(|r| r.name == name) {
            Some(existing) if is_fetch => existing.url = url.to_string(),
            Some(_) => {}
            None => remotes.push(Remote {
                name: name.to_string(),
                url: url.to_string(),
            }),
        }
    }

    remotes
}

/// Parse porcelain v2 status output
pub fn parse_status(output: &str) -> StatusReport {
    let mut report = StatusReport::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            if let Some(oid) = header.strip_prefix("branch.oid ") {
                report.initial = oid.trim() == "(initial)";
            } else if let Some(head) = header.strip_prefix("branch.head ") {
                let head = head.trim();
                if head != "(detached)" {
                    report.branch = Some(head.to_string());
                }
            }
            continue;
        }

        match line.as_bytes().first() {
            Some(b'1') | Some(b'2') => report.changed += 1,
            Some(b'u') => report.unmerged += 1,
            Some(b'?') => report.untracked += 1,
            _ => {}
        }
    }

    report
}

/// Derive the state of a working copy from its query results.
///
/// Dirty wins over empty: a fresh repository with staged files has local work
/// that an update must not touch either way.
pub fn classify(
    remotes: Vec<Remote>,
    status: &StatusReport,
    head: Option<String>,
    expected_remote: &str,
) -> Classification {
    let head = head.filter(|h| !h.is_empty());

    let state = if status.is_dirty() {
        RepoState::Dirty
    } else if status.initial || head.is_none() {
        RepoState::Empty
    } else {
        RepoState::Clean
    };

    let remote_warning = if remotes.iter().any(|r| r.name == expected_remote) {
        None
    } else if remotes.is_empty() {
        Some("no remote configured".to_string())
    } else {
        let names: Vec<&str> = remotes.iter().map(|r| r.name.as_str()).collect();
        Some(format!(
            "remote is not '{}' (found: {})",
            expected_remote,
            names.join(", ")
        ))
    };

    Classification {
        state,
        remotes,
        head,
        remote_warning,
    }
}

/// Runs the classification queries against a working copy
#[derive(Clone)]
pub struct Classifier {
    runner: Arc<dyn GitRunner>,
    expected_remote: String,
}

impl Classifier {
    pub fn new(runner: Arc<dyn GitRunner>, expected_remote: impl Into<String>) -> Self {
        Self {
            runner,
            expected_remote: expected_remote.into(),
        }
    }

    pub fn expected_remote(&self) -> &str {
        &self.expected_remote
    }

    /// Classify the working copy at `path`.
    ///
    /// Fails only when a query cannot run or `status` itself fails; a missing
    /// `HEAD` is the normal signal for an empty history.
    pub async fn classify(&self, path: &Path) -> Result<Classification> {
        let remote_cmd = GitCommand::new(path, ["remote", "-v"]);
        let remotes = self.runner.run(remote_cmd.clone()).await?.check(&remote_cmd)?;

        let status_cmd = GitCommand::new(
            path,
            [
                "status",
                "--porcelain=v2",
                "--branch",
                "--untracked-files=normal",
            ],
        );
        let status = self.runner.run(status_cmd.clone()).await?.check(&status_cmd)?;

        let head_cmd = GitCommand::new(path, ["rev-parse", "--verify", "--quiet", "HEAD"]);
        let head_output = self.runner.run(head_cmd).await?;
        let head = head_output
            .success()
            .then(|| head_output.stdout.trim().to_string());

        let classification = classify(
            parse_remotes(&remotes.stdout),
            &parse_status(&status.stdout),
            head,
            &self.expected_remote,
        );

        if let Some(warning) = &classification.remote_warning {
            warn!("{}: {}", path.display(), warning);
        }
        debug!("{} classified as {}", path.display(), classification.state);

        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::git::{CommandOutput, MockGitRunner};
    use quickcheck_macros::quickcheck;

    fn origin() -> Vec<Remote> {
        vec![Remote {
            name: "origin".into(),
            url: "git@github.com:me/repo.git".into(),
        }]
    }

    const HEAD: &str = "3f1c2a9e8b7d6c5f4e3d2c1b0a9f8e7d6c5b4a39";

    #[test]
    fn test_parse_remotes_prefers_fetch_url() {
        let output = "origin\tgit@github.com:me/repo.git (fetch)\n\
                      origin\tgit@github.com:me/repo-push.git (push)\n\
                      upstream\thttps://github.com/them/repo.git (fetch)\n\
                      upstream\thttps://github.com/them/repo.git (push)\n";

        let remotes = parse_remotes(output);
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[0].name, "origin");
        assert_eq!(remotes[0].url, "git@github.com:me/repo.git");
        assert_eq!(remotes[1].name, "upstream");
    }

    #[test]
    fn test_parse_remotes_keeps_spaces_in_url() {
        let output = "origin\t/home/me/My Projects/upstream.git (fetch)\n\
                      origin\t/home/me/My Projects/upstream.git (push)\n";

        let remotes = parse_remotes(output);
        assert_eq!(
            remotes,
            vec![Remote {
                name: "origin".into(),
                url: "/home/me/My Projects/upstream.git".into(),
            }]
        );
    }

    #[test]
    fn test_parse_status_entries() {
        let output = "# branch.oid 3f1c2a9e8b7d6c5f4e3d2c1b0a9f8e7d6c5b4a39\n\
                      # branch.head main\n\
                      # branch.upstream origin/main\n\
                      # branch.ab +0 -2\n\
                      1 .M N... 100644 100644 100644 abc abc src/lib.rs\n\
                      2 R. N... 100644 100644 100644 abc abc R100 new.rs\told.rs\n\
                      u UU N... 100644 100644 100644 100644 a b c conflict.rs\n\
                      ? scratch.txt\n\
                      ! target/\n";

        let report = parse_status(output);
        assert!(!report.initial);
        assert_eq!(report.branch.as_deref(), Some("main"));
        assert_eq!(report.changed, 2);
        assert_eq!(report.unmerged, 1);
        assert_eq!(report.untracked, 1);
        assert!(report.is_dirty());
    }

    #[test]
    fn test_parse_status_initial_branch() {
        let report = parse_status("# branch.oid (initial)\n# branch.head main\n");
        assert!(report.initial);
        assert!(!report.is_dirty());
    }

    #[test]
    fn test_classify_clean() {
        let status = parse_status("# branch.oid abc\n# branch.head main\n");
        let c = classify(origin(), &status, Some(HEAD.into()), "origin");
        assert_eq!(c.state, RepoState::Clean);
        assert_eq!(c.head.as_deref(), Some(HEAD));
        assert!(c.remote_warning.is_none());
    }

    #[test]
    fn test_classify_empty_history() {
        let status = parse_status("# branch.oid (initial)\n# branch.head main\n");
        let c = classify(origin(), &status, None, "origin");
        assert_eq!(c.state, RepoState::Empty);
    }

    #[test]
    fn test_dirty_takes_precedence_over_empty() {
        let status = parse_status("# branch.oid (initial)\n? new-file.txt\n");
        let c = classify(Vec::new(), &status, None, "origin");
        assert_eq!(c.state, RepoState::Dirty);
    }

    #[test]
    fn test_remote_warning_when_origin_missing() {
        let remotes = vec![Remote {
            name: "hub".into(),
            url: "git@github.com:me/repo.git".into(),
        }];
        let status = parse_status("# branch.oid abc\n");
        let c = classify(remotes, &status, Some(HEAD.into()), "origin");

        // The warning never blocks classification
        assert_eq!(c.state, RepoState::Clean);
        let warning = c.remote_warning.expect("expected a remote warning");
        assert!(warning.contains("hub"));
    }

    #[test]
    fn test_remote_warning_when_no_remotes() {
        let status = parse_status("# branch.oid abc\n");
        let c = classify(Vec::new(), &status, Some(HEAD.into()), "origin");
        assert_eq!(c.remote_warning.as_deref(), Some("no remote configured"));
    }

    #[quickcheck]
    fn prop_modified_entry_is_dirty_regardless_of_remote(remote_name: String) -> bool {
        let remotes = if remote_name.trim().is_empty() {
            Vec::new()
        } else {
            vec![Remote {
                name: remote_name.split_whitespace().collect::<Vec<_>>().join("-"),
                url: "https://example.com/r.git".into(),
            }]
        };
        let status = StatusReport {
            changed: 1,
            ..Default::default()
        };
        classify(remotes, &status, Some(HEAD.into()), "origin").state == RepoState::Dirty
    }

    #[quickcheck]
    fn prop_classify_is_deterministic(changed: u8, untracked: u8, initial: bool, has_head: bool) -> bool {
        let status = StatusReport {
            initial,
            branch: Some("main".into()),
            changed: changed as usize,
            unmerged: 0,
            untracked: untracked as usize,
        };
        let head = has_head.then(|| HEAD.to_string());
        let first = classify(origin(), &status, head.clone(), "origin");
        let second = classify(origin(), &status, head, "origin");
        first == second
    }

    #[tokio::test]
    async fn test_classifier_runs_queries_in_given_directory() {
        let mut runner = MockGitRunner::new();
        runner
            .expect_run()
            .withf(|cmd| cmd.dir == Path::new("/ws/project"))
            .times(3)
            .returning(|cmd| {
                let stdout = match cmd.subcommand() {
                    "remote" => "origin\tgit@github.com:me/project.git (fetch)\n",
                    "status" => "# branch.oid abc\n# branch.head main\n",
                    "rev-parse" => "3f1c2a9e8b7d6c5f4e3d2c1b0a9f8e7d6c5b4a39\n",
                    other => panic!("unexpected git {}", other),
                };
                Ok(CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    status: 0,
                })
            });

        let classifier = Classifier::new(Arc::new(runner), "origin");
        let c = classifier.classify(Path::new("/ws/project")).await.unwrap();

        assert_eq!(c.state, RepoState::Clean);
        assert_eq!(c.remote("origin").unwrap().url, "git@github.com:me/project.git");
    }

    #[tokio::test]
    async fn test_classifier_missing_head_means_empty() {
        let mut runner = MockGitRunner::new();
        runner.expect_run().times(3).returning(|cmd| {
            Ok(match cmd.subcommand() {
                "rev-parse" => CommandOutput {
                    status: 1,
                    ..Default::default()
                },
                _ => CommandOutput::default(),
            })
        });

        let classifier = Classifier::new(Arc::new(runner), "origin");
        let c = classifier.classify(Path::new("/ws/fresh")).await.unwrap();
        assert_eq!(c.state, RepoState::Empty);
    }

    #[tokio::test]
    async fn test_classifier_status_failure_is_error() {
        let mut runner = MockGitRunner::new();
        runner.expect_run().returning(|cmd| {
            Ok(match cmd.subcommand() {
                "status" => CommandOutput {
                    stdout: String::new(),
                    stderr: "fatal: not a git repository".into(),
                    status: 128,
                },
                _ => CommandOutput::default(),
            })
        });

        let classifier = Classifier::new(Arc::new(runner), "origin");
        let err = classifier.classify(Path::new("/ws/broken")).await.unwrap_err();
        assert!(matches!(err, SyncError::CommandFailure { status: 128, .. }));
    }
}
