//! in-memory applier
//!
//! Keeps a fake filesystem in a map. Used for dry runs and tests.
use super::{DirectorySpec, FileSpec, LogRotation, ResourceApplier, ServiceSpec};
use crate::document::FileContents;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEntry {
    Directory { mode: u32 },
    File { contents: FileContents, mode: u32 },
}

#[derive(Debug, Default)]
pub struct MemoryApplier {
    pub entries: BTreeMap<PathBuf, MemoryEntry>,
    pub packages: Vec<String>,
    pub services: Vec<ServiceSpec>,
    pub log_rotations: BTreeMap<String, LogRotation>,
}

impl MemoryApplier {
    /// Contents of an inline file
    pub fn read(&self, path: impl AsRef<Path>) -> Option<&str> {
        match self.entries.get(path.as_ref())? {
            MemoryEntry::File {
                contents: FileContents::Inline(contents),
                ..
            } => Some(contents),
            _ => None,
        }
    }

    fn put(&mut self, path: &Path, entry: MemoryEntry) -> bool {
        if self.entries.get(path) == Some(&entry) {
            return false;
        }

        self.entries.insert(path.to_owned(), entry);
        true
    }
}

impl ResourceApplier for MemoryApplier {
    type Error = Infallible;

    fn apply_directory(&mut self, directory: &DirectorySpec) -> Result<bool, Self::Error> {
        let entry = MemoryEntry::Directory {
            mode: directory.mode,
        };
        Ok(self.put(&directory.path, entry))
    }

    fn apply_file(&mut self, file: &FileSpec) -> Result<bool, Self::Error> {
        let entry = MemoryEntry::File {
            contents: file.contents.clone(),
            mode: file.mode,
        };
        Ok(self.put(&file.path, entry))
    }

    fn install_package(&mut self, logical_name: &str) -> Result<bool, Self::Error> {
        if self.packages.iter().any(|package| package == logical_name) {
            return Ok(false);
        }

        self.packages.push(logical_name.to_string());
        Ok(true)
    }

    fn manage_service(&mut self, service: &ServiceSpec) -> Result<bool, Self::Error> {
        if self.services.contains(service) {
            return Ok(false);
        }

        self.services.push(service.clone());
        Ok(true)
    }

    fn rotate_logs(&mut self, policy: &LogRotation) -> Result<bool, Self::Error> {
        let previous = self.log_rotations.insert(policy.tag.clone(), policy.clone());
        Ok(previous.as_ref() != Some(policy))
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, Self::Error> {
        Ok(self
            .entries
            .keys()
            .filter(|entry| entry.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn remove(&mut self, path: &Path) -> Result<(), Self::Error> {
        self.entries.retain(|entry, _| !entry.starts_with(path));
        Ok(())
    }
}
