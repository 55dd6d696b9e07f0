//! turning hcl blocks into [Declaration]s
//!
//! Every root block declares one entity: the block identifier is the entity kind, the
//! (single) label is its title and the attributes are its options.
//!
//! ```hcl
//! site "rspec" {
//!   base_dir    = "/home/rspec/sites/rspec"
//!   server_name = "rspec.example.com"
//!   alt_names   = ["foo.example.com", "bar.example.com"]
//! }
//!
//! location "rspec/root" {
//!   site = "rspec"
//!   path = "/"
//! }
//! ```
//!
//! Attribute expressions are evaluated, so templates (`"${1 + 1}"`) and arithmetic work.
//! Structural problems are collected for all blocks before giving up, so one run reports
//! every typo at once.
use crate::entity::*;
use crate::hcl_documents::{HclDocuments, Source};
use crate::value::Value;
use hcl::eval::Evaluate;
use hcl_edit::structure::{Block, Structure};
use indexmap::IndexMap;
use std::path::PathBuf;

/// Entity kinds that may omit their label
const UNLABELED: [&str; 3] = ["server", "gzip", "ssl_hardened"];

/// Parse all root blocks
pub fn from_documents(documents: &HclDocuments) -> Result<Vec<Declaration>, DeclarationErrors> {
    let mut e = DeclarationErrors::new();
    let mut declarations = vec![];

    for (index, source, _attribute) in documents.attributes() {
        e.log(source, Issue::RootAttribute(index));
    }

    for (index, source, block) in documents.blocks() {
        if let Some(declaration) = declaration(index, source, block, &mut e) {
            tracing::trace!(?declaration, "declaration parsed");
            declarations.push(declaration);
        }
    }

    if !e.issues.is_empty() {
        return Err(e);
    }

    tracing::debug!(count = declarations.len(), "declarations parsed");
    Ok(declarations)
}

fn declaration(
    index: usize,
    source: &Source,
    block: &Block,
    e: &mut DeclarationErrors,
) -> Option<Declaration> {
    let kind = block.ident.value().as_str();

    let title = match block.labels.as_slice() {
        [] if UNLABELED.contains(&kind) => kind.to_string(),
        [] => {
            e.log(source, Issue::LabelMissing(index));
            return None;
        }
        [label] => label.as_str().to_string(),
        _ => {
            e.log(source, Issue::TooManyLabels(index));
            return None;
        }
    };

    let mut values = IndexMap::new();
    for structure in block.body.iter() {
        let attribute = match structure {
            Structure::Attribute(attribute) => attribute,
            Structure::Block(_) => {
                e.log(source, Issue::NestedBlock(index));
                continue;
            }
        };

        let key = attribute.key.value().as_str().to_string();
        let expression: hcl::Expression = attribute.value.clone().into();
        let value = match expression.evaluate(&hcl::eval::Context::new()) {
            Ok(value) => value,
            Err(err) => {
                e.log(
                    source,
                    Issue::Evaluation {
                        block: index,
                        key,
                        message: err.to_string(),
                    },
                );
                continue;
            }
        };

        let value = match Value::try_from(value) {
            Ok(value) => value,
            Err(err) => {
                e.log(
                    source,
                    Issue::Evaluation {
                        block: index,
                        key,
                        message: err.to_string(),
                    },
                );
                continue;
            }
        };

        if values.contains_key(&key) {
            e.log(source, Issue::DuplicateAttribute { block: index, key });
            continue;
        }
        values.insert(key, value);
    }

    let mut r = Reader {
        block: index,
        source,
        values,
        e,
    };

    let entity = match kind {
        "server" => Entity::Server(ServerOptions {
            worker_processes: r.text("worker_processes"),
            worker_connections: r.integer("worker_connections"),
            reload_command: r.text("reload_command"),
        }),
        "site" => Entity::Site(SiteOptions {
            base_dir: r.text("base_dir"),
            server_name: r.text("server_name"),
            alt_names: r.names("alt_names"),
            default: r.boolean("default").unwrap_or(false),
            ssl_cert: r.text("ssl_cert"),
            ssl_key: r.text("ssl_key"),
            ssl_ip: r.text("ssl_ip"),
            ssl_default: r.boolean("ssl_default").unwrap_or(false),
            ssl_redirect: r.boolean("ssl_redirect").unwrap_or(false),
            hsts: r.hsts("hsts"),
            hsts_include_subdomains: r.boolean("hsts_include_subdomains").unwrap_or(true),
            user: r.text("user"),
            group: r.text("group"),
        }),
        "location" => Entity::Location(LocationOptions {
            site: r.text("site"),
            path: r.text("path"),
        }),
        "rewrite" => Entity::Rewrite(RewriteOptions {
            from: r.text("from"),
            to: r.text("to"),
            site: r.text("site"),
            location: r.text("location"),
            permanent: r.boolean("permanent").unwrap_or(false),
            last: r.boolean("last").unwrap_or(false),
        }),
        "fastcgi" => Entity::Fastcgi(FastcgiOptions {
            site: r.text("site"),
            location: r.text("location"),
            target: r.text("target"),
        }),
        "gzip" => Entity::Gzip(ToggleOptions {
            site: r.text("site"),
        }),
        "ssl_hardened" => Entity::SslHardened(ToggleOptions {
            site: r.text("site"),
        }),
        "error_page" => Entity::ErrorPage(ErrorPageOptions {
            code: r.text("code"),
            dest: r.text("dest"),
            site: r.text("site"),
            location: r.text("location"),
        }),
        "parameter" => Entity::Parameter(ParameterOptions {
            value: r.text("value"),
            param: r.text("param"),
        }),
        "group" => Entity::Group(GroupOptions {
            context: r.text("context"),
        }),
        "config" => Entity::Config(ConfigOptions {
            content: r.text("content"),
            source: r.source_path("source"),
        }),
        _ => {
            r.e.log(source, Issue::UnknownBlockType(index));
            return None;
        }
    };

    r.finish();
    Some(Declaration::new(title, entity))
}

/// Typed access to the evaluated attributes of one block
///
/// Every read removes the attribute, whatever is left at the end is unknown.
struct Reader<'a> {
    block: usize,
    source: &'a Source,
    values: IndexMap<String, Value>,
    e: &'a mut DeclarationErrors,
}

impl<'a> Reader<'a> {
    fn unexpected(&mut self, key: &str, expected: &'static str, found: &Value) {
        self.e.log(
            self.source,
            Issue::UnexpectedType {
                block: self.block,
                key: key.to_string(),
                expected,
                found: found.type_name(),
            },
        );
    }

    fn text(&mut self, key: &str) -> Option<String> {
        let value = self.values.shift_remove(key)?;
        let text = value.as_text();
        if text.is_none() {
            self.unexpected(key, "string", &value);
        }
        text
    }

    fn boolean(&mut self, key: &str) -> Option<bool> {
        match self.values.shift_remove(key)? {
            Value::Boolean(value) => Some(value),
            other => {
                self.unexpected(key, "bool", &other);
                None
            }
        }
    }

    fn integer(&mut self, key: &str) -> Option<u64> {
        match self.values.shift_remove(key)? {
            Value::Integer(value) if value >= 0 => Some(value as u64),
            other => {
                self.unexpected(key, "non-negative integer", &other);
                None
            }
        }
    }

    fn names(&mut self, key: &str) -> Option<NameList> {
        match self.values.shift_remove(key)? {
            Value::String(names) => Some(NameList::Joined(names)),
            Value::Array(elements) => {
                let mut names = vec![];
                for element in &elements {
                    match element.as_text() {
                        Some(name) => names.push(name),
                        None => {
                            self.unexpected(key, "array of strings", element);
                            return None;
                        }
                    }
                }
                Some(NameList::List(names))
            }
            other => {
                self.unexpected(key, "string or array of strings", &other);
                None
            }
        }
    }

    fn hsts(&mut self, key: &str) -> Hsts {
        match self.values.shift_remove(key) {
            None | Some(Value::Boolean(false)) => Hsts::Off,
            Some(Value::Boolean(true)) => Hsts::On,
            Some(Value::Integer(max_age)) if max_age >= 0 => Hsts::MaxAge(max_age as u64),
            Some(other) => {
                self.unexpected(key, "bool or non-negative integer", &other);
                Hsts::Off
            }
        }
    }

    /// Relative paths are relative to the declaring file
    fn source_path(&mut self, key: &str) -> Option<PathBuf> {
        let path = PathBuf::from(self.text(key)?);
        if path.is_absolute() {
            return Some(path);
        }

        match self.source.as_ref().and_then(|file| file.parent()) {
            Some(dir) => Some(dir.join(path)),
            None => Some(path),
        }
    }

    fn finish(self) {
        for key in self.values.into_keys() {
            self.e.log(
                self.source,
                Issue::UnknownAttribute {
                    block: self.block,
                    key,
                },
            );
        }
    }
}

#[derive(derive_new::new, Debug)]
pub struct DeclarationErrors {
    #[new(default)]
    issues: Vec<(Source, Issue)>,
}

impl DeclarationErrors {
    pub fn log(&mut self, source: &Source, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push((source.clone(), issue));
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().map(|(_, issue)| issue)
    }
}

impl std::error::Error for DeclarationErrors {}

impl std::fmt::Display for DeclarationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (position, (source, issue)) in self.issues.iter().enumerate() {
            if position > 0 {
                f.write_str("\n")?;
            }
            match source {
                Some(path) => write!(f, "{}: {issue}", path.display())?,
                None => write!(f, "<stdin>: {issue}")?,
            }
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Issue {
    #[error("attributes are only allowed inside blocks (attribute #{0})")]
    RootAttribute(usize),
    #[error("unknown entity kind (block #{0})")]
    UnknownBlockType(usize),
    #[error("block needs a label (block #{0})")]
    LabelMissing(usize),
    #[error("block takes a single label (block #{0})")]
    TooManyLabels(usize),
    #[error("nested blocks are not supported (block #{0})")]
    NestedBlock(usize),
    #[error("attribute {key} is set twice (block #{block})")]
    DuplicateAttribute { block: usize, key: String },
    #[error("unknown attribute {key} (block #{block})")]
    UnknownAttribute { block: usize, key: String },
    #[error("attribute {key} must be {expected}, found {found} (block #{block})")]
    UnexpectedType {
        block: usize,
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unable to evaluate attribute {key} (block #{block}): {message}")]
    Evaluation {
        block: usize,
        key: String,
        message: String,
    },
}
