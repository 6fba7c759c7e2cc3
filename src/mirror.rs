//! Mirror reconciliation
//!
//! Ensures each remote entity has an up-to-date local clone at
//! `<root>/<identifier>`: clone when the path is absent, classify and pull when
//! it exists.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::executor::{LocalSync, OutcomeKind, SyncOutcome};
use crate::git::{GitCommand, GitRunner};
use crate::github::RemoteEntity;

/// Reconciles remote entities against clones under one root directory
#[derive(Clone)]
pub struct MirrorReconciler {
    runner: Arc<dyn GitRunner>,
    local: LocalSync,
    root: PathBuf,
}

impl MirrorReconciler {
    pub fn new(runner: Arc<dyn GitRunner>, local: LocalSync, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            local,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bring one entity's clone up to date. Always yields exactly one outcome.
    pub async fn reconcile(&self, entity: &RemoteEntity) -> SyncOutcome {
        let target = format!("{}:{}", entity.kind, entity.identifier);

        if !is_plain_name(&entity.identifier) {
            error!("Refusing unsafe identifier {:?}", entity.identifier);
            return SyncOutcome::failed(
                target,
                format!("identifier {:?} is not a plain directory name", entity.identifier),
            );
        }

        let local_path = entity.local_path(&self.root);
        if local_path.exists() {
            self.local
                .sync(&target, &local_path, Some(&entity.clone_url))
                .await
        } else {
            self.clone_entity(&target, entity).await
        }
    }

    async fn clone_entity(&self, target: &str, entity: &RemoteEntity) -> SyncOutcome {
        info!(
            "Cloning {} -> {}",
            entity.clone_url,
            entity.local_path(&self.root).display()
        );

        // Cloning into an explicit relative name keeps the destination
        // independent of how git derives names from URLs
        let clone_cmd = GitCommand::new(
            &self.root,
            ["clone", entity.clone_url.as_str(), entity.identifier.as_str()],
        );
        let output = match self.runner.run(clone_cmd.clone()).await {
            Ok(output) => output,
            Err(e) => {
                error!("{}: {}", target, e);
                return SyncOutcome::failed(target, e.to_string());
            }
        };

        let diagnostic = output.diagnostic();
        match output.check(&clone_cmd) {
            Ok(_) => SyncOutcome::new(target, OutcomeKind::Cloned).with_detail(diagnostic),
            Err(e) => {
                error!("{}: {}", target, e);
                SyncOutcome::failed(target, e.to_string())
            }
        }
    }
}

/// A single normal path component: no separators, `.` or `..`
fn is_plain_name(identifier: &str) -> bool {
    let mut components = Path::new(identifier).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !identifier.contains(['/', '\\'])
}
