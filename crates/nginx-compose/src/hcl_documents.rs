//! declaration files
//!
//! Desired state is spread over any number of `*.nginx.hcl` files. [HclDocuments] keeps
//! the root structures of all of them in load order and remembers which file each one
//! came from, so that issues and relative `source` paths can point back to it.
//!
//! Root attributes are kept as well. They have no meaning, but reporting them is more
//! helpful than silently ignoring a misplaced `base_dir = ...`.
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::path::{Path, PathBuf};

/// Files in a directory with this suffix are loaded
pub const FILE_SUFFIX: &str = ".nginx.hcl";

/// Declaring file, `None` for stdin and inline documents
pub type Source = Option<PathBuf>;
pub type SourceAttribute<'a> = (usize, &'a Source, &'a Attribute);
pub type SourceBlock<'a> = (usize, &'a Source, &'a Block);

#[derive(Debug)]
struct Located<T> {
    source: usize,
    item: T,
}

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<Source>,
    attributes: Vec<Located<Attribute>>,
    blocks: Vec<Located<Block>>,
}

impl HclDocuments {
    /// Add the root structures of `body`
    ///
    /// Indices handed out by [Self::blocks] and [Self::attributes] never change once
    /// assigned.
    pub fn insert(&mut self, body: Body, path: impl Into<Source>) {
        let source = self.sources.len();
        self.sources.push(path.into());

        for structure in body {
            match structure {
                Structure::Block(item) => self.blocks.push(Located { source, item }),
                Structure::Attribute(item) => self.attributes.push(Located { source, item }),
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.attributes
            .iter()
            .enumerate()
            .map(|(index, located)| (index, &self.sources[located.source], &located.item))
    }

    /// Root blocks in load order, one per declared entity
    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, located)| (index, &self.sources[located.source], &located.item))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let path = path.canonicalize().map_err(|source| LoadError::Read {
            path: path.to_owned(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading declarations");

        let contents = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
            path: path.clone(),
            source,
        })?;
        let body = hcl_edit::parser::parse_body(&contents).map_err(|source| LoadError::Parse {
            path: path.clone(),
            source,
        })?;

        self.insert(body, path);
        Ok(())
    }

    /// Load every declaration file of `dir`, in file name order
    ///
    /// Sorting keeps the declaration order, and with it the plan, stable between runs.
    pub fn load_directory(&mut self, dir: &Path) -> Result<(), LoadError> {
        let read_error = |source| LoadError::Read {
            path: dir.to_owned(),
            source,
        };

        let mut files = vec![];
        for entry in std::fs::read_dir(dir).map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            if entry.file_type().map_err(read_error)?.is_file() && is_declaration_file(&entry.path())
            {
                files.push(entry.path());
            }
        }

        if files.is_empty() {
            return Err(LoadError::NoFilesFound {
                dir: dir.to_owned(),
            });
        }

        files.sort();
        files.iter().try_for_each(|file| self.load_file(file))
    }
}

fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(FILE_SUFFIX))
        .unwrap_or(false)
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("no .nginx.hcl files in {}", dir.display())]
    NoFilesFound { dir: PathBuf },
    #[error("unable to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

impl From<Body> for HclDocuments {
    fn from(body: Body) -> Self {
        let mut documents = HclDocuments::default();
        documents.insert(body, None);
        documents
    }
}

/// Build [HclDocuments] from literal hcl, mostly for tests
///
/// A single document has no source file:
/// ```
/// # use nginx_compose::hcl_documents;
/// hcl_documents!("gzip {}");
/// ```
///
/// Several documents need one each:
/// ```
/// # use nginx_compose::hcl_documents;
/// hcl_documents! {
///   "one.nginx.hcl" => "gzip {}",
///   "two.nginx.hcl" => "ssl_hardened {}"
/// };
/// ```
///
/// # Panic
/// Panics when a document does not parse
///
/// ```should_panic
/// # use nginx_compose::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    { $body:expr } => {
        $crate::hcl_documents::HclDocuments::from(
            hcl_edit::parser::parse_body($body).expect("declarations must parse"),
        )
    };
    { $($path:expr => $body:expr),+ } => {{
        let mut documents = $crate::hcl_documents::HclDocuments::default();
        $(
            documents.insert(
                hcl_edit::parser::parse_body($body).expect("declarations must parse"),
                Some(std::path::PathBuf::from($path)),
            );
        )+
        documents
    }};
}
