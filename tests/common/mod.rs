//! Common test utilities: throwaway git repositories and an isolated CLI environment
#![allow(dead_code)]

use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Whether a `git` binary is on PATH; tests needing it return early otherwise
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=wsync test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("Failed to execute git");

    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Commit a file with the given content in an existing working copy
pub fn commit_file(repo: &Path, name: &str, content: &str) {
    std::fs::write(repo.join(name), content).expect("Failed to write file");
    git(repo, &["add", name]);
    git(repo, &["commit", "-q", "-m", &format!("update {}", name)]);
}

/// Give a working copy a local identity so rebases never need a global one
pub fn identify(repo: &Path) {
    git(repo, &["config", "user.name", "wsync test"]);
    git(repo, &["config", "user.email", "test@example.com"]);
}

/// Scratch area holding upstream bare repositories and their clones
pub struct GitFixture {
    pub temp_dir: TempDir,
}

impl GitFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        temp_dir.child("upstream").create_dir_all().unwrap();
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create `upstream/<name>.git` holding one commit, returning its path
    pub fn upstream(&self, name: &str) -> PathBuf {
        let seed = self.path().join(format!("seed-{}", name));
        std::fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "-q"]);
        commit_file(&seed, "README.md", &format!("# {}\n", name));

        let bare = self.path().join("upstream").join(format!("{}.git", name));
        git(
            self.path(),
            &[
                "clone",
                "-q",
                "--bare",
                seed.to_str().unwrap(),
                bare.to_str().unwrap(),
            ],
        );
        bare
    }

    /// Clone `upstream` into `dest`, creating parent directories
    pub fn clone_into(&self, upstream: &Path, dest: &Path) {
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        git(
            self.path(),
            &[
                "clone",
                "-q",
                upstream.to_str().unwrap(),
                dest.to_str().unwrap(),
            ],
        );
        identify(dest);
    }

    /// Push one new commit to `upstream` through a scratch clone
    pub fn advance(&self, upstream: &Path, name: &str) {
        let scratch = self.path().join(format!("scratch-{}", name));
        if !scratch.exists() {
            self.clone_into(upstream, &scratch);
        }
        commit_file(&scratch, name, "new content\n");
        git(&scratch, &["push", "-q", "origin", "HEAD"]);
    }
}

/// Run the `wsync` binary with its config directory pointed at `config_home`
pub fn run_wsync(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wsync"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("RUST_LOG")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .output()
        .expect("Failed to execute wsync")
}

/// Assertion helper for command output
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}

/// Report line on stdout for a target path, if any
pub fn line_for<'a>(stdout: &'a str, target: &Path) -> Option<&'a str> {
    let target = target.display().to_string();
    stdout.lines().find(|line| {
        line.split_whitespace()
            .any(|token| token.trim_end_matches(':') == target)
    })
}
