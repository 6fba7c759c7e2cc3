//! Sync Engine - drives audit and mirror passes
//!
//! Audit: discovery -> classification -> pull over a workspace.
//! Mirror: enumeration -> reconciliation over a target directory.
//!
//! Targets run through a bounded, order-preserving fan-out. Every command gets
//! its working directory explicitly, so workers share no mutable state.

use futures::stream::{self, StreamExt};
use path_clean::PathClean;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::discovery::discover_working_copies;
use crate::error::{Result, SyncError};
use crate::executor::{LocalSync, OutcomeKind, SyncOutcome};
use crate::git::{GitRunner, SystemGit};
use crate::github::{RemoteEntity, RemoteSource};
use crate::mirror::MirrorReconciler;

/// Results from a complete pass
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub duration: Duration,
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncSummary {
    pub fn new(outcomes: Vec<SyncOutcome>, duration: Duration) -> Self {
        Self { duration, outcomes }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Non-zero counts keyed by outcome label, in a stable order
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        OutcomeKind::ALL
            .iter()
            .map(|kind| (kind.label(), self.count(*kind)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// One-line totals, e.g. `3 targets: 1 failed, 2 updated (0.42s)`
    pub fn totals_line(&self) -> String {
        let counts: Vec<String> = self
            .counts()
            .into_iter()
            .map(|(label, n)| format!("{} {}", n, label))
            .collect();
        let breakdown = if counts.is_empty() {
            "nothing to do".to_string()
        } else {
            counts.join(", ")
        };
        format!(
            "{} targets: {} ({:.2}s)",
            self.total(),
            breakdown,
            self.duration.as_secs_f64()
        )
    }
}

/// The main engine that orchestrates audit and mirror passes
#[derive(Clone)]
pub struct SyncEngine {
    runner: Arc<dyn GitRunner>,
    local: LocalSync,
    max_parallel: usize,
}

impl SyncEngine {
    /// Create an engine that runs the system `git` with the configured timeout
    pub fn new(config: &Config) -> Self {
        let runner: Arc<dyn GitRunner> = Arc::new(SystemGit::new(config.git_timeout()));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: &Config, runner: Arc<dyn GitRunner>) -> Self {
        Self {
            local: LocalSync::new(runner.clone(), config.sync.expected_remote.clone()),
            runner,
            max_parallel: config.max_parallel(),
        }
    }

    /// Audit every working copy under `root`.
    ///
    /// `report` sees each outcome in discovery order as soon as it is known.
    pub async fn audit<F>(&self, root: &Path, mut report: F) -> Result<SyncSummary>
    where
        F: FnMut(&SyncOutcome),
    {
        let start_time = Instant::now();
        let root = absolute_root(root)?;
        let copies = discover_working_copies(&root)?;

        info!(
            "Auditing {} working copies under {} (max parallel: {})",
            copies.len(),
            root.display(),
            self.max_parallel
        );

        let mut outcomes = Vec::with_capacity(copies.len());
        let mut results = stream::iter(copies)
            .map(|copy| {
                let local = self.local.clone();
                async move {
                    let target = copy.path.display().to_string();
                    local.sync(&target, &copy.path, None).await
                }
            })
            .buffered(self.max_parallel);

        while let Some(outcome) = results.next().await {
            report(&outcome);
            outcomes.push(outcome);
        }

        let summary = SyncSummary::new(outcomes, start_time.elapsed());
        info!("Audit finished: {}", summary.totals_line());
        Ok(summary)
    }

    /// Enumerate the account and reconcile every entity under `root`.
    ///
    /// The root is created when absent. Enumeration errors abort before any
    /// entity is touched; per-entity failures become outcomes.
    pub async fn mirror<S, F>(
        &self,
        root: &Path,
        source: &S,
        include_gists: bool,
        mut report: F,
    ) -> Result<SyncSummary>
    where
        S: RemoteSource + ?Sized,
        F: FnMut(&SyncOutcome),
    {
        let start_time = Instant::now();
        let root = prepare_mirror_root(root)?;

        let mut entities = source.list_repositories().await?;
        info!("Found {} repositories", entities.len());
        if include_gists {
            let gists = source.list_gists().await?;
            info!("Found {} gists", gists.len());
            entities.extend(gists);
        }

        let reconciler = MirrorReconciler::new(self.runner.clone(), self.local.clone(), &root);
        let outcomes = self.reconcile_all(&reconciler, entities, &mut report).await;

        let summary = SyncSummary::new(outcomes, start_time.elapsed());
        info!("Mirror finished: {}", summary.totals_line());
        Ok(summary)
    }

    /// Reconcile entities in order; one failure never stops the rest
    pub async fn reconcile_all<F>(
        &self,
        reconciler: &MirrorReconciler,
        entities: Vec<RemoteEntity>,
        mut report: F,
    ) -> Vec<SyncOutcome>
    where
        F: FnMut(&SyncOutcome),
    {
        let mut outcomes = Vec::with_capacity(entities.len());
        let mut results = stream::iter(entities)
            .map(|entity| {
                let reconciler = reconciler.clone();
                async move { reconciler.reconcile(&entity).await }
            })
            .buffered(self.max_parallel);

        while let Some(outcome) = results.next().await {
            report(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// Resolve `root` against the current directory at call time
fn absolute_root(root: &Path) -> Result<PathBuf> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| SyncError::Io {
                path: root.to_path_buf(),
                source,
            })?
            .join(root)
    };
    Ok(absolute.clean())
}

fn prepare_mirror_root(root: &Path) -> Result<PathBuf> {
    let root = absolute_root(root)?;

    if root.exists() && !root.is_dir() {
        return Err(SyncError::NotFound(root));
    }
    if !root.exists() {
        info!("Creating mirror directory {}", root.display());
        std::fs::create_dir_all(&root).map_err(|e| {
            warn!("Cannot create {}: {}", root.display(), e);
            SyncError::NotFound(root.clone())
        })?;
    }

    Ok(root)
}
