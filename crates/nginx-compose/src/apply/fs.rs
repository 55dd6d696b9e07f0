//! applying to the local filesystem
use super::{DirectorySpec, FileSpec, LogRotation, ResourceApplier, ServiceSpec};
use crate::document::FileContents;
use crate::node::MANAGED_HEADER;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// OS family, decides package and service naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Debian,
    RedHat,
}

impl Platform {
    /// Read `/etc/os-release`
    pub fn detect() -> Option<Self> {
        let os_release = std::fs::read_to_string("/etc/os-release").ok()?;
        let platform = Self::from_os_release(&os_release);
        tracing::debug!(?platform, "detected platform");
        platform
    }

    /// Classify by `ID` and `ID_LIKE`
    pub fn from_os_release(os_release: &str) -> Option<Self> {
        let ids: Vec<&str> = os_release
            .lines()
            .filter_map(|line| {
                line.strip_prefix("ID=")
                    .or_else(|| line.strip_prefix("ID_LIKE="))
            })
            .flat_map(|value| value.trim_matches('"').split_whitespace())
            .collect();

        if ids.iter().any(|id| matches!(*id, "debian" | "ubuntu")) {
            return Some(Platform::Debian);
        }
        if ids
            .iter()
            .any(|id| matches!(*id, "rhel" | "centos" | "fedora"))
        {
            return Some(Platform::RedHat);
        }

        None
    }

    /// Distribution package providing `logical_name`
    pub fn package_name(&self, logical_name: &str) -> String {
        match (self, logical_name) {
            (Platform::Debian, "nginx") => "nginx-full".to_string(),
            _ => logical_name.to_string(),
        }
    }

    pub fn reload_command(&self, service: &str) -> String {
        match self {
            Platform::Debian => format!("/usr/sbin/invoke-rc.d {service} reload"),
            Platform::RedHat => format!("/sbin/service {service} reload"),
        }
    }
}

/// Work the filesystem applier leaves to the operator or the caller
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    InstallPackage { package: String },
    Service { service: String, reload_command: String },
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("failed to {action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

trait IoResultExt<T> {
    fn io(self, action: &'static str, path: &Path) -> Result<T, FsError>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io(self, action: &'static str, path: &Path) -> Result<T, FsError> {
        self.map_err(|source| FsError::Io {
            action,
            path: path.to_owned(),
            source,
        })
    }
}

/// Writes files and directories directly, records packages and services as pending
///
/// Modes are enforced, ownership is not: it is only logged.
#[derive(Debug)]
pub struct FsApplier {
    platform: Platform,
    logrotate_dir: PathBuf,
    pending: Vec<PendingAction>,
}

impl FsApplier {
    pub fn new(platform: Platform, logrotate_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            logrotate_dir: logrotate_dir.into(),
            pending: Default::default(),
        }
    }

    pub fn pending(&self) -> &[PendingAction] {
        &self.pending
    }

    /// Write `contents` unless the file already holds exactly these bytes
    fn write_if_changed(&self, path: &Path, contents: &[u8], mode: u32) -> Result<bool, FsError> {
        let changed = match std::fs::read(path) {
            Ok(existing) => existing != contents,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => return Err(err).io("read", path),
        };

        if changed {
            replace_file(path, contents)?;
            tracing::info!(path = %path.display(), "file updated");
        }

        Ok(set_mode(path, mode)? || changed)
    }
}

impl ResourceApplier for FsApplier {
    type Error = FsError;

    fn apply_directory(&mut self, directory: &DirectorySpec) -> Result<bool, Self::Error> {
        let path = &directory.path;
        let created = if path.is_dir() {
            false
        } else {
            std::fs::create_dir_all(path).io("create directory", path)?;
            tracing::info!(path = %path.display(), "directory created");
            true
        };

        tracing::trace!(
            path = %path.display(),
            owner = %directory.owner,
            group = %directory.group,
            "ownership not enforced"
        );
        Ok(set_mode(path, directory.mode)? || created)
    }

    fn apply_file(&mut self, file: &FileSpec) -> Result<bool, Self::Error> {
        let contents = match &file.contents {
            FileContents::Inline(contents) => contents.as_bytes().to_vec(),
            FileContents::Source(source) => std::fs::read(source).io("read source", source)?,
        };

        self.write_if_changed(&file.path, &contents, file.mode)
    }

    fn install_package(&mut self, logical_name: &str) -> Result<bool, Self::Error> {
        let package = self.platform.package_name(logical_name);
        tracing::info!(package = %package, "package installation left to the operator");
        self.pending.push(PendingAction::InstallPackage { package });
        Ok(false)
    }

    fn manage_service(&mut self, service: &ServiceSpec) -> Result<bool, Self::Error> {
        let reload_command = service
            .reload_command
            .clone()
            .unwrap_or_else(|| self.platform.reload_command(&service.name));
        self.pending.push(PendingAction::Service {
            service: service.name.clone(),
            reload_command,
        });
        Ok(false)
    }

    fn rotate_logs(&mut self, policy: &LogRotation) -> Result<bool, Self::Error> {
        if !self.logrotate_dir.is_dir() {
            std::fs::create_dir_all(&self.logrotate_dir)
                .io("create directory", &self.logrotate_dir)?;
        }

        let path = self.logrotate_dir.join(&policy.tag);
        self.write_if_changed(&path, render_logrotate(policy).as_bytes(), 0o644)
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, Self::Error> {
        let read_dir = match std::fs::read_dir(path) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err).io("list", path),
        };

        let mut entries = vec![];
        for dir_entry in read_dir {
            entries.push(dir_entry.io("list", path)?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn remove(&mut self, path: &Path) -> Result<(), Self::Error> {
        let metadata = std::fs::symlink_metadata(path).io("inspect", path)?;
        if metadata.is_dir() {
            std::fs::remove_dir_all(path).io("remove", path)
        } else {
            std::fs::remove_file(path).io("remove", path)
        }
    }
}

/// Write next to `path` and rename, readers never see a partial file
///
/// The staging file is removed again when the rename fails, it must not linger in
/// directories like `/etc/logrotate.d` that include every file.
fn replace_file(path: &Path, contents: &[u8]) -> Result<(), FsError> {
    let staging = path.with_extension("nginx-compose.tmp");
    std::fs::write(&staging, contents).io("write", &staging)?;

    if let Err(err) = std::fs::rename(&staging, path) {
        if let Err(cleanup) = std::fs::remove_file(&staging) {
            tracing::warn!(path = %staging.display(), %cleanup, "staging file left behind");
        }
        return Err(err).io("rename", path);
    }

    Ok(())
}

/// logrotate(8) configuration
pub fn render_logrotate(policy: &LogRotation) -> String {
    let delay_compress = if policy.delay_compress {
        "    delaycompress\n"
    } else {
        ""
    };

    format!(
        "{MANAGED_HEADER}
{glob} {{
    {period}
    rotate {count}
    missingok
    notifempty
    compress
{delay_compress}    create {mode:o} {owner} {group}
    sharedscripts
    postrotate
        [ ! -f /run/nginx.pid ] || kill -USR1 `cat /run/nginx.pid`
    endscript
}}
",
        glob = policy.glob,
        period = policy.period,
        count = policy.count,
        mode = policy.create_mode,
        owner = policy.owner,
        group = policy.group,
    )
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<bool, FsError> {
    use std::os::unix::fs::PermissionsExt;

    let current = std::fs::metadata(path).io("inspect", path)?.permissions();
    if current.mode() & 0o7777 == mode {
        return Ok(false);
    }

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).io("chmod", path)?;
    Ok(true)
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<bool, FsError> {
    Ok(false)
}
