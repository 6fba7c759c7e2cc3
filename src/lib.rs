//! wsync - Workspace Git Synchronization
//!
//! Keeps a directory of git working copies current without risking local work.
//!
//! ## Modes
//!
//! - **Audit**: find working copies up to two levels below a workspace root,
//!   classify each one, and rebase-pull the clean ones.
//! - **Mirror**: enumerate the repositories and gists of a GitHub account and
//!   clone or update each of them under a target directory.
//!
//! ## Modules
//!
//! - [`discovery`]: working copy discovery
//! - [`state`]: clean/dirty/empty classification
//! - [`executor`]: rebase pull and per-target outcomes
//! - [`github`]: repository and gist enumeration
//! - [`mirror`]: clone-or-update reconciliation
//! - [`sync`]: the engine driving both modes

pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod git;
pub mod github;
pub mod mirror;
pub mod state;
pub mod sync;

pub use config::Config;
pub use discovery::{discover_working_copies, WorkingCopy};
pub use error::SyncError;
pub use executor::{LocalSync, OutcomeKind, SyncExecutor, SyncOutcome};
pub use git::{CommandOutput, GitCommand, GitRunner, SystemGit};
pub use github::{EntityKind, GitHubClient, RemoteEntity, RemoteSource};
pub use mirror::MirrorReconciler;
pub use state::{Classification, Classifier, RepoState};
pub use sync::{SyncEngine, SyncSummary};
