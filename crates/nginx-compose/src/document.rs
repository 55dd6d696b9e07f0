//! rendering units
//!
//! A [ConfigDocument] is one fragment file. It is either rendered from literal content
//! or copied from an external source, never both.
use crate::entity::EntityRef;
use crate::error::CompositionError;
use crate::node::{GroupNode, ParameterNode, MANAGED_HEADER};
use crate::path::{NamespacePath, FRAGMENT_SUFFIX};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConfigDocument {
    pub path: NamespacePath,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    /// Literal text, gets the managed header on render
    Content(String),
    /// Literal text that already carries the managed header
    Wrapper(String),
    /// Opaque file, copied verbatim at apply time
    Source(PathBuf),
}

/// What ends up on disk
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileContents {
    Inline(String),
    Source(PathBuf),
}

impl ConfigDocument {
    /// Exactly one of `content` or `source` must be given
    pub fn new(
        entity: &EntityRef,
        path: NamespacePath,
        content: Option<String>,
        source: Option<PathBuf>,
    ) -> Result<Self, CompositionError> {
        let body = match (content, source) {
            (Some(content), None) => Body::Content(content),
            (None, Some(source)) => Body::Source(source),
            _ => {
                return Err(CompositionError::MutuallyExclusiveInput {
                    entity: entity.clone(),
                })
            }
        };

        Ok(Self { path, body })
    }

    pub fn from_parameter(parameter: &ParameterNode) -> Self {
        Self {
            path: parameter.path.clone(),
            body: Body::Content(parameter.render()),
        }
    }

    pub fn from_group(group: &GroupNode, conf_dir: &Path) -> Self {
        Self {
            path: group.path.clone(),
            body: Body::Wrapper(group.render(conf_dir)),
        }
    }

    pub fn render(&self) -> FileContents {
        match &self.body {
            Body::Content(content) => FileContents::Inline(format!("{MANAGED_HEADER}\n{content}")),
            Body::Wrapper(rendered) => FileContents::Inline(rendered.clone()),
            Body::Source(source) => FileContents::Source(source.clone()),
        }
    }

    /// Location of the fragment below `conf_dir`, i.e. `<conf_dir>/<path>.conf`
    pub fn file_path(&self, conf_dir: &Path) -> PathBuf {
        document_file(conf_dir, &self.path)
    }
}

pub(crate) fn document_file(conf_dir: &Path, path: &NamespacePath) -> PathBuf {
    let mut file = conf_dir.join(path.to_relative_path());
    file.set_file_name(format!("{}{FRAGMENT_SUFFIX}", path.leaf()));
    file
}
