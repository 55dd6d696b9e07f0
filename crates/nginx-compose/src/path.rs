//! namespace paths
//!
//! Every parameter, group and document lives at a [NamespacePath]. The path mirrors
//! nginx's nested contexts (`http` > `server` > `location`) and doubles as the relative
//! location of the rendered fragment below `nginx.conf.d`.
use crate::error::CompositionError;
use crate::entity::EntityRef;

/// Root segment of every path produced by [resolve]
pub const HTTP: &str = "http";

/// Suffix of every rendered fragment file
pub const FRAGMENT_SUFFIX: &str = ".conf";

/// Name of the notice file at the top of the fragment tree
pub const README: &str = "README";

/// Hierarchical address of a fragment, e.g. `http/site_foo/location_root/gzip`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacePath(Vec<String>);

impl NamespacePath {
    /// Build a path from its segments
    ///
    /// Segments end up as file and directory names, so they must be non-empty and must
    /// not contain `/`, NUL or be `.`/`..`. A segment ending in `.conf` would share its
    /// name with the fragment of its sibling (`x` is written to `x.conf`), and the top
    /// level `README` is taken.
    pub fn new<I, S>(segments: I) -> Result<Self, InvalidSegment>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(InvalidSegment::new(String::new(), "path has no segments"));
        }

        for segment in &segments {
            check_segment(segment)?;
        }

        if segments[0] == README {
            return Err(InvalidSegment::new(README.to_string(), "reserved name"));
        }

        Ok(Self(segments))
    }

    /// Parse a `/` separated key such as `foo/bar/wombat/xyzzy`
    pub fn parse(key: &str) -> Result<Self, InvalidSegment> {
        Self::new(key.split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment
    pub fn leaf(&self) -> &str {
        self.0.last().expect("a namespace path is never empty")
    }

    pub fn parent(&self) -> Option<NamespacePath> {
        if self.0.len() < 2 {
            return None;
        }

        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Append a segment
    pub fn join(&self, segment: impl Into<String>) -> Result<Self, InvalidSegment> {
        let segment = segment.into();
        check_segment(&segment)?;

        let mut segments = self.0.clone();
        segments.push(segment);
        Ok(Self(segments))
    }

    /// Relative filesystem path made of the segments
    pub fn to_relative_path(&self) -> std::path::PathBuf {
        self.0.iter().collect()
    }
}

impl std::fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl serde::Serialize for NamespacePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

fn check_segment(segment: &str) -> Result<(), InvalidSegment> {
    let reason = if segment.is_empty() {
        "empty segment"
    } else if segment == "." || segment == ".." {
        "relative segment"
    } else if segment.contains(['/', '\0']) {
        "segment contains a path separator or NUL"
    } else if segment.ends_with(FRAGMENT_SUFFIX) {
        "segment clashes with a fragment file name"
    } else {
        return Ok(());
    };

    Err(InvalidSegment::new(segment.to_string(), reason))
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, derive_new::new)]
#[error("invalid path segment {segment:?}: {reason}")]
pub struct InvalidSegment {
    pub segment: String,
    pub reason: &'static str,
}

/// Logical position of a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Global,
    Site(&'a str),
    Location { site: &'a str, location: &'a str },
}

impl<'a> Scope<'a> {
    /// Scope from optional `site`/`location` options
    ///
    /// A location is only unique within its site, so a location without a site is
    /// rejected instead of falling back to the global scope.
    pub fn from_options(
        entity: &EntityRef,
        site: Option<&'a str>,
        location: Option<&'a str>,
    ) -> Result<Self, CompositionError> {
        match (site, location) {
            (None, None) => Ok(Scope::Global),
            (Some(site), None) => Ok(Scope::Site(site)),
            (Some(site), Some(location)) => Ok(Scope::Location {
                site,
                location: label_leaf(location),
            }),
            (None, Some(_)) => Err(CompositionError::MissingScope {
                entity: entity.clone(),
            }),
        }
    }
}

/// Compute the canonical path of `leaf` within `scope`
pub fn resolve(scope: Scope<'_>, leaf: &str) -> Result<NamespacePath, InvalidSegment> {
    let mut segments = vec![HTTP.to_string()];
    match scope {
        Scope::Global => {}
        Scope::Site(site) => segments.push(format!("site_{site}")),
        Scope::Location { site, location } => {
            segments.push(format!("site_{site}"));
            segments.push(format!("location_{location}"));
        }
    }
    segments.push(leaf.to_string());

    NamespacePath::new(segments)
}

/// Path of the group that represents `scope` itself
///
/// `site(foo)` is `http/site_foo`, `location(foo, root)` is `http/site_foo/location_root`.
pub fn scope_path(scope: Scope<'_>) -> Result<NamespacePath, InvalidSegment> {
    match scope {
        Scope::Global => NamespacePath::new([HTTP]),
        Scope::Site(site) => NamespacePath::new([HTTP.to_string(), format!("site_{site}")]),
        Scope::Location { site, location } => NamespacePath::new([
            HTTP.to_string(),
            format!("site_{site}"),
            format!("location_{location}"),
        ]),
    }
}

/// Final segment of a compound label
///
/// `some/funny/little/rspec` names the same thing as `rspec`. The other segments carry
/// no meaning.
pub fn label_leaf(label: &str) -> &str {
    label.rsplit('/').next().unwrap_or(label)
}
