//! materializing a [Plan]
//!
//! The engine never touches the filesystem. [converge] walks a plan and asks a
//! [ResourceApplier] to make reality match it:
//!
//! 1. packages and external directories
//! 2. the managed configuration tree (`nginx.conf.d` and one directory per group)
//! 3. plain files and documents
//! 4. purge: anything inside a managed directory that the plan does not mention is removed
//! 5. log rotation and services
//!
//! Changes to the configuration (steps 2 to 4) raise the [ChangeSignal].
mod fs;
mod memory;

pub use fs::{FsApplier, FsError, PendingAction, Platform};
pub use memory::{MemoryApplier, MemoryEntry};

use crate::compose::Plan;
use crate::document::FileContents;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DirectorySpec {
    pub path: PathBuf,
    pub mode: u32,
    pub owner: String,
    pub group: String,
    /// Remove entries the plan does not know about
    pub purge: bool,
    pub recurse: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FileSpec {
    pub path: PathBuf,
    pub contents: FileContents,
    pub mode: u32,
    pub owner: String,
    pub group: String,
    /// Raise the change signal when this file changes
    pub notify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Daily => f.write_str("daily"),
            Period::Weekly => f.write_str("weekly"),
            Period::Monthly => f.write_str("monthly"),
        }
    }
}

/// Log rotation policy for a set of log files
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LogRotation {
    pub tag: String,
    pub glob: String,
    pub period: Period,
    pub count: u32,
    pub delay_compress: bool,
    pub create_mode: u32,
    pub owner: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ServiceSpec {
    /// Logical name, the applier maps it to the platform's service
    pub name: String,
    /// Overrides the platform's reload command
    pub reload_command: Option<String>,
}

/// The collaborator doing the actual work
///
/// All `apply_*` methods return whether something changed.
pub trait ResourceApplier {
    type Error: std::error::Error + Send + Sync + 'static;

    fn apply_directory(&mut self, directory: &DirectorySpec) -> Result<bool, Self::Error>;

    fn apply_file(&mut self, file: &FileSpec) -> Result<bool, Self::Error>;

    fn install_package(&mut self, logical_name: &str) -> Result<bool, Self::Error>;

    fn manage_service(&mut self, service: &ServiceSpec) -> Result<bool, Self::Error>;

    fn rotate_logs(&mut self, policy: &LogRotation) -> Result<bool, Self::Error>;

    /// Direct children of `path`, empty when it does not exist
    fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, Self::Error>;

    /// Remove a file or a directory with everything in it
    fn remove(&mut self, path: &Path) -> Result<(), Self::Error>;
}

/// "nginx must reload"
///
/// Raised at most once per run, no matter how many fragments changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal {
    raised: bool,
}

impl ChangeSignal {
    pub fn raise(&mut self) {
        if !self.raised {
            tracing::debug!("configuration changed");
        }
        self.raised = true;
    }

    /// Raise when `changed`
    pub fn record(&mut self, changed: bool) {
        if changed {
            self.raise();
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }
}

/// Apply `plan` and report whether the configuration changed
#[tracing::instrument(level = "debug", skip_all, fields(conf_dir = %plan.conf_dir.display()))]
pub fn converge<A: ResourceApplier>(plan: &Plan, applier: &mut A) -> Result<ChangeSignal, A::Error> {
    let mut signal = ChangeSignal::default();

    for package in &plan.packages {
        applier.install_package(package)?;
    }

    for directory in &plan.directories {
        applier.apply_directory(directory)?;
    }

    let managed = managed_directories(plan);
    for directory in &managed {
        signal.record(applier.apply_directory(directory)?);
    }

    for file in &plan.files {
        let changed = applier.apply_file(file)?;
        if file.notify {
            signal.record(changed);
        }
    }

    let mut desired: BTreeSet<PathBuf> = managed.iter().map(|d| d.path.clone()).collect();
    desired.extend(plan.files.iter().map(|file| file.path.clone()));
    desired.extend(plan.directories.iter().map(|d| d.path.clone()));

    for document in plan.documents.values() {
        let file = FileSpec {
            path: document.file_path(&plan.conf_dir),
            contents: document.render(),
            mode: 0o644,
            owner: "root".to_string(),
            group: "root".to_string(),
            notify: true,
        };
        signal.record(applier.apply_file(&file)?);
        desired.insert(file.path);
    }

    let purged = managed
        .iter()
        .chain(plan.directories.iter())
        .filter(|directory| directory.purge);
    for directory in purged {
        for entry in applier.list_directory(&directory.path)? {
            if desired.contains(&entry) {
                continue;
            }

            tracing::info!(path = %entry.display(), "purging unmanaged entry");
            applier.remove(&entry)?;
            signal.raise();
        }
    }

    for policy in &plan.log_rotations {
        applier.rotate_logs(policy)?;
    }

    for service in &plan.services {
        applier.manage_service(service)?;
    }

    tracing::info!(changed = signal.is_raised(), "converged");
    Ok(signal)
}

/// `nginx.conf.d`, every group directory and every directory a document lives in
///
/// Sorted so that parents come before their children.
fn managed_directories(plan: &Plan) -> Vec<DirectorySpec> {
    let mut paths = BTreeSet::new();
    paths.insert(plan.conf_dir.clone());

    for group in plan.groups.values() {
        paths.insert(group.directory(&plan.conf_dir));
    }

    for path in plan.documents.keys() {
        let mut ancestor = path.parent();
        while let Some(current) = ancestor {
            paths.insert(plan.conf_dir.join(current.to_relative_path()));
            ancestor = current.parent();
        }
    }

    paths
        .into_iter()
        .map(|path| DirectorySpec::managed(path, true))
        .collect()
}
