//! parameters and groups
use crate::path::NamespacePath;
use std::path::Path;

/// Marker that opens every content-rendered fragment
pub const MANAGED_HEADER: &str = "\
# THIS FILE IS AUTOMATICALLY GENERATED BY NGINX-COMPOSE
# Local changes will be overwritten. Edit the declarations instead.
";

/// A single `directive value;` line
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ParameterNode {
    pub path: NamespacePath,
    pub directive: String,
    pub value: String,
}

impl ParameterNode {
    /// The directive defaults to the last segment of `path`
    ///
    /// Overriding it lets several differently named paths render the same directive,
    /// e.g. `http/site_x/listen_ssl` rendering `listen`.
    pub fn new(path: NamespacePath, value: impl Into<String>, directive: Option<String>) -> Self {
        let directive = directive.unwrap_or_else(|| path.leaf().to_string());
        Self {
            path,
            directive,
            value: value.into(),
        }
    }

    /// Values are emitted verbatim, no quoting or escaping happens here.
    pub fn render(&self) -> String {
        format!("    {} {};\n", self.directive, self.value)
    }
}

/// A brace-delimited context (`server { ... }`) that includes everything beneath it
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GroupNode {
    pub path: NamespacePath,
    pub context: String,
}

impl GroupNode {
    pub fn new(path: NamespacePath, context: impl Into<String>) -> Self {
        Self {
            path,
            context: context.into(),
        }
    }

    /// Directory holding the fragments of this group
    pub fn directory(&self, conf_dir: &Path) -> std::path::PathBuf {
        conf_dir.join(self.path.to_relative_path())
    }

    /// Render the wrapper document, managed header included
    pub fn render(&self, conf_dir: &Path) -> String {
        let include = self.directory(conf_dir).join("*.conf");
        format!(
            "{MANAGED_HEADER}\n{} {{\n    include {};\n}}\n",
            self.context,
            include.display()
        )
    }
}
