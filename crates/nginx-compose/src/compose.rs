//! composition of declared entities into a [Plan]
//!
//! Every [Declaration] is validated and expanded on its own into an [Emission]. Only a
//! complete, valid emission is merged into the plan. Merging registers every path in a
//! [Tree] so that two entities claiming the same path are reported instead of one
//! silently replacing the other.
use crate::apply::{DirectorySpec, FileSpec, LogRotation, Period, ServiceSpec};
use crate::document::{ConfigDocument, FileContents};
use crate::entity::*;
use crate::error::{CompositionError, PathResultExt};
use crate::node::{GroupNode, ParameterNode, MANAGED_HEADER};
use crate::path::{label_leaf, resolve, scope_path, NamespacePath, Scope, README};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Root served by the ssl redirect vhost
pub const EMPTY_ROOT: &str = "/usr/share/empty";

const DEFAULT_OWNER: &str = "root";

/// `fastcgi_param`s set for every fastcgi location
///
/// Each becomes its own fragment `fastcgi_param_<NAME>` whose value carries the
/// parameter name as well (`QUERY_STRING $query_string`), so the fragment renders a
/// complete `fastcgi_param QUERY_STRING $query_string;`.
pub const FASTCGI_PARAMS: [(&str, &str); 19] = [
    ("QUERY_STRING", "$query_string"),
    ("REQUEST_METHOD", "$request_method"),
    ("CONTENT_TYPE", "$content_type"),
    ("CONTENT_LENGTH", "$content_length"),
    ("SCRIPT_FILENAME", "$request_filename"),
    ("SCRIPT_NAME", "$fastcgi_script_name"),
    ("REQUEST_URI", "$request_uri"),
    ("DOCUMENT_URI", "$document_uri"),
    ("DOCUMENT_ROOT", "$document_root"),
    ("SERVER_PROTOCOL", "$server_protocol"),
    ("GATEWAY_INTERFACE", "CGI/1.1"),
    ("SERVER_SOFTWARE", "nginx/$nginx_version"),
    ("REMOTE_ADDR", "$remote_addr"),
    ("REMOTE_PORT", "$remote_port"),
    ("SERVER_ADDR", "$server_addr"),
    ("SERVER_PORT", "$server_port"),
    ("SERVER_NAME", "$server_name"),
    ("HTTPS", "$https"),
    ("REDIRECT_STATUS", "200"),
];

/// Where the nginx configuration lives
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Layout {
    #[new(into)]
    pub root: PathBuf,
}

impl Layout {
    /// Directory of all generated fragments
    pub fn conf_dir(&self) -> PathBuf {
        self.root.join("nginx.conf.d")
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new("/etc/nginx")
    }
}

#[derive(Debug, Clone, derive_new::new)]
pub struct Engine {
    layout: Layout,
}

impl Engine {
    /// Expand all declarations into one plan
    ///
    /// Stops at the first invalid declaration.
    #[tracing::instrument(level = "debug", skip_all, fields(declarations = declarations.len()))]
    pub fn compose(&self, declarations: &[Declaration]) -> Result<Plan, CompositionError> {
        let mut plan = Plan::new(self.layout.conf_dir());

        for declaration in declarations {
            let entity = declaration.entity_ref();
            let mut out = Emission::default();
            let title = declaration.title.as_str();

            match &declaration.entity {
                Entity::Server(options) => server(&entity, options, &self.layout, &mut out)?,
                Entity::Site(options) => site(&entity, title, options, &mut out)?,
                Entity::Location(options) => location(&entity, title, options, &mut out)?,
                Entity::Rewrite(options) => rewrite(&entity, title, options, &mut out)?,
                Entity::Fastcgi(options) => fastcgi(&entity, options, &mut out)?,
                Entity::Gzip(options) => toggle(&entity, "gzip", options, &mut out)?,
                Entity::SslHardened(options) => {
                    toggle(&entity, "ssl_prefer_server_ciphers", options, &mut out)?
                }
                Entity::ErrorPage(options) => error_page(&entity, options, &mut out)?,
                Entity::Parameter(options) => parameter(&entity, title, options, &mut out)?,
                Entity::Group(options) => group(&entity, title, options, &mut out)?,
                Entity::Config(options) => config(&entity, title, options, &mut out)?,
            }

            plan.absorb(&entity, out)?;
            tracing::debug!(%entity, "composed");
        }

        tracing::info!(
            groups = plan.groups.len(),
            parameters = plan.parameters.len(),
            documents = plan.documents.len(),
            "composition finished"
        );
        Ok(plan)
    }
}

/// Desired state of one run
#[derive(Debug, serde::Serialize)]
pub struct Plan {
    pub conf_dir: PathBuf,
    pub groups: IndexMap<NamespacePath, GroupNode>,
    pub parameters: IndexMap<NamespacePath, ParameterNode>,
    /// One document per path: parameters, group wrappers and raw documents
    pub documents: IndexMap<NamespacePath, ConfigDocument>,
    pub directories: Vec<DirectorySpec>,
    pub files: Vec<FileSpec>,
    pub log_rotations: Vec<LogRotation>,
    pub packages: Vec<String>,
    pub services: Vec<ServiceSpec>,

    #[serde(skip)]
    tree: Tree,
}

impl Plan {
    fn new(conf_dir: PathBuf) -> Self {
        Self {
            conf_dir,
            groups: Default::default(),
            parameters: Default::default(),
            documents: Default::default(),
            directories: Default::default(),
            files: Default::default(),
            log_rotations: Default::default(),
            packages: Default::default(),
            services: Default::default(),
            tree: Default::default(),
        }
    }

    pub fn parameter(&self, path: &str) -> Option<&ParameterNode> {
        let path = NamespacePath::parse(path).ok()?;
        self.parameters.get(&path)
    }

    pub fn group(&self, path: &str) -> Option<&GroupNode> {
        let path = NamespacePath::parse(path).ok()?;
        self.groups.get(&path)
    }

    pub fn document(&self, path: &str) -> Option<&ConfigDocument> {
        let path = NamespacePath::parse(path).ok()?;
        self.documents.get(&path)
    }

    /// Owner of a path, if anything claimed it
    pub fn declared_by(&self, path: &NamespacePath) -> Option<&EntityRef> {
        self.tree.get(path.segments())
    }

    fn absorb(&mut self, entity: &EntityRef, out: Emission) -> Result<(), CompositionError> {
        for group in out.groups {
            self.claim(entity, &group.path)?;
            let document = ConfigDocument::from_group(&group, &self.conf_dir);
            self.documents.insert(group.path.clone(), document);
            self.groups.insert(group.path.clone(), group);
        }

        for parameter in out.parameters {
            self.claim(entity, &parameter.path)?;
            let document = ConfigDocument::from_parameter(&parameter);
            self.documents.insert(parameter.path.clone(), document);
            self.parameters.insert(parameter.path.clone(), parameter);
        }

        for document in out.documents {
            self.claim(entity, &document.path)?;
            self.documents.insert(document.path.clone(), document);
        }

        self.directories.extend(out.directories);
        self.files.extend(out.files);
        self.log_rotations.extend(out.log_rotations);
        self.packages.extend(out.packages);
        self.services.extend(out.services);

        Ok(())
    }

    fn claim(&mut self, entity: &EntityRef, path: &NamespacePath) -> Result<(), CompositionError> {
        self.tree
            .insert(path.segments(), entity.clone())
            .map_err(|existing| CompositionError::DuplicatePath {
                path: path.clone(),
                existing,
                new: entity.clone(),
            })
    }
}

/// Everything a single entity contributes
#[derive(Debug, Default)]
struct Emission {
    groups: Vec<GroupNode>,
    parameters: Vec<ParameterNode>,
    documents: Vec<ConfigDocument>,
    directories: Vec<DirectorySpec>,
    files: Vec<FileSpec>,
    log_rotations: Vec<LogRotation>,
    packages: Vec<String>,
    services: Vec<ServiceSpec>,
}

impl Emission {
    fn group(&mut self, path: NamespacePath, context: impl Into<String>) {
        self.groups.push(GroupNode::new(path, context));
    }

    fn parameter(&mut self, path: NamespacePath, value: impl Into<String>) {
        self.parameters.push(ParameterNode::new(path, value, None));
    }

    fn directive(&mut self, path: NamespacePath, directive: &str, value: impl Into<String>) {
        self.parameters
            .push(ParameterNode::new(path, value, Some(directive.to_string())));
    }
}

/// Claimed paths
///
/// Only the nodes that were claimed carry an owner, intermediate nodes exist to keep
/// children ordered.
#[derive(Debug, Default)]
struct Tree {
    root: IndexMap<String, Node>,
}

impl Tree {
    fn get(&self, key_path: &[String]) -> Option<&EntityRef> {
        let (first, rest) = key_path.split_first()?;
        self.root.get(first)?.get(rest)
    }

    /// Returns the existing owner on collision
    fn insert(&mut self, key_path: &[String], owner: EntityRef) -> Result<(), EntityRef> {
        let node = self.get_or_insert(key_path);
        if let Some(existing) = &node.owner {
            tracing::debug!(?key_path, %existing, "collision");
            return Err(existing.clone());
        }

        node.owner = Some(owner);
        Ok(())
    }

    fn get_or_insert(&mut self, key_path: &[String]) -> &mut Node {
        let (first, rest) = key_path
            .split_first()
            .expect("namespace paths have at least one segment");

        self.root
            .entry(first.clone())
            .or_default()
            .get_or_insert(rest)
    }
}

#[derive(Debug, Default)]
struct Node {
    owner: Option<EntityRef>,
    children: IndexMap<String, Node>,
}

impl Node {
    fn get(&self, key_path: &[String]) -> Option<&EntityRef> {
        match key_path.split_first() {
            None => self.owner.as_ref(),
            Some((first, rest)) => self.children.get(first)?.get(rest),
        }
    }

    fn get_or_insert(&mut self, key_path: &[String]) -> &mut Node {
        match key_path.split_first() {
            None => self,
            Some((first, rest)) => self
                .children
                .entry(first.clone())
                .or_default()
                .get_or_insert(rest),
        }
    }
}

fn required<'a>(
    entity: &EntityRef,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, CompositionError> {
    value
        .as_deref()
        .ok_or_else(|| CompositionError::MissingRequiredField {
            entity: entity.clone(),
            field,
        })
}

fn server(
    entity: &EntityRef,
    options: &ServerOptions,
    layout: &Layout,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let conf_dir = layout.conf_dir();
    let worker_processes = options.worker_processes.as_deref().unwrap_or("auto");
    let worker_connections = options.worker_connections.unwrap_or(768);

    out.directories.push(DirectorySpec::managed(layout.root.clone(), false));

    let skeleton = format!(
        "{MANAGED_HEADER}
worker_processes {worker_processes};
pid /run/nginx.pid;

events {{
    worker_connections {worker_connections};
}}

include {};
",
        conf_dir.join("*.conf").display()
    );
    out.files
        .push(FileSpec::config(layout.root.join("nginx.conf"), skeleton));
    out.files.push(FileSpec {
        notify: false,
        ..FileSpec::config(conf_dir.join(README), readme())
    });

    let http = scope_path(Scope::Global).for_entity(entity)?;
    out.group(http, "http");
    out.directive(
        resolve(Scope::Global, "include_mime_types").for_entity(entity)?,
        "include",
        layout.root.join("mime.types").display().to_string(),
    );

    out.packages.push("nginx".to_string());
    out.services.push(ServiceSpec {
        name: "nginx".to_string(),
        reload_command: options.reload_command.clone(),
    });

    Ok(())
}

fn readme() -> String {
    format!(
        "{MANAGED_HEADER}
Everything below this directory is generated and owned by nginx-compose.
Files that are not part of the current declarations are deleted on every run.
"
    )
}

fn site(
    entity: &EntityRef,
    name: &str,
    options: &SiteOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let base_dir = required(entity, "base_dir", &options.base_dir)?;
    let server_name = required(entity, "server_name", &options.server_name)?;

    let ssl = match (&options.ssl_cert, &options.ssl_key) {
        (Some(cert), Some(key)) => Some((cert, key)),
        (Some(_), None) | (None, Some(_)) => {
            let field = if options.ssl_cert.is_some() {
                "ssl_cert"
            } else {
                "ssl_key"
            };
            return Err(CompositionError::IncompleteSslConfig {
                entity: entity.clone(),
                field,
            });
        }
        (None, None) => None,
    };

    if ssl.is_none() && options.ssl_ip.is_some() {
        return Err(CompositionError::IncompleteSslConfig {
            entity: entity.clone(),
            field: "ssl_ip",
        });
    }

    if options.ssl_redirect && ssl.is_none() {
        return Err(CompositionError::MissingSslForRedirect {
            entity: entity.clone(),
        });
    }

    let hsts_max_age = options.hsts.max_age();
    if hsts_max_age.is_some() && !options.ssl_redirect {
        return Err(CompositionError::InvalidHstsConfig {
            entity: entity.clone(),
        });
    }

    let scope = Scope::Site(name);
    let at = |leaf: &str| resolve(scope, leaf).for_entity(entity);
    let base_dir = base_dir.trim_end_matches('/');
    let alt_names = options
        .alt_names
        .as_ref()
        .map(NameList::to_value)
        .filter(|names| !names.is_empty());
    let default = if options.default { " default" } else { "" };

    out.group(scope_path(scope).for_entity(entity)?, "server");
    out.parameter(at("server_name")?, server_name);
    if let Some(alt_names) = &alt_names {
        out.directive(at("server_alt_names")?, "server_name", alt_names.clone());
    }
    out.parameter(at("error_log")?, format!("{base_dir}/logs/error.log info"));
    out.parameter(
        at("access_log")?,
        format!("{base_dir}/logs/access.log combined"),
    );
    out.parameter(at("root")?, format!("{base_dir}/htdocs"));

    // port 80 belongs to the redirect vhost then
    if !options.ssl_redirect {
        out.parameter(at("listen")?, format!("80{default}"));
    }

    if let Some((cert, key)) = ssl {
        let ip = options
            .ssl_ip
            .as_deref()
            .map(|ip| format!("{ip}:"))
            .unwrap_or_default();
        let ssl_default = if options.ssl_default { " default" } else { "" };

        out.directive(at("listen_ssl")?, "listen", format!("{ip}443 ssl{ssl_default}"));
        out.parameter(at("ssl_certificate")?, cert.as_str());
        out.parameter(at("ssl_certificate_key")?, key.as_str());
    }

    if options.ssl_redirect {
        let redirect_site = format!("sslredir_{name}");
        let redirect_scope = Scope::Site(&redirect_site);
        let redirect_at = |leaf: &str| resolve(redirect_scope, leaf).for_entity(entity);

        out.group(scope_path(redirect_scope).for_entity(entity)?, "server");
        out.parameter(redirect_at("listen")?, format!("80{default}"));
        out.parameter(redirect_at("server_name")?, server_name);
        if let Some(alt_names) = &alt_names {
            out.directive(redirect_at("server_alt_names")?, "server_name", alt_names.clone());
        }
        out.parameter(redirect_at("root")?, EMPTY_ROOT);

        let redirect = RewriteOptions {
            from: Some("^(.*)$".to_string()),
            to: Some(format!("https://{server_name}$1")),
            site: Some(redirect_site.clone()),
            location: None,
            permanent: true,
            last: false,
        };
        rewrite(entity, "ssl_redirect", &redirect, out)?;
    }

    if let Some(max_age) = hsts_max_age {
        let subdomains = if options.hsts_include_subdomains {
            "; includeSubDomains"
        } else {
            ""
        };
        let content = format!(
            "    add_header Strict-Transport-Security \"max_age={max_age}{subdomains}\";\n"
        );
        out.documents.push(ConfigDocument::new(
            entity,
            at("add_header_hsts")?,
            Some(content),
            None,
        )?);
    }

    let owner = options.user.as_deref().unwrap_or(DEFAULT_OWNER);
    let group = options.group.as_deref().unwrap_or(DEFAULT_OWNER);
    out.directories.push(DirectorySpec {
        path: Path::new(base_dir).join("logs"),
        mode: 0o755,
        owner: owner.to_string(),
        group: group.to_string(),
        purge: false,
        recurse: false,
    });
    out.log_rotations.push(LogRotation {
        tag: format!("nginx-{name}"),
        glob: format!("{base_dir}/logs/*.log"),
        period: Period::Daily,
        count: 90,
        delay_compress: true,
        create_mode: 0o640,
        owner: owner.to_string(),
        group: group.to_string(),
    });

    Ok(())
}

fn location(
    entity: &EntityRef,
    title: &str,
    options: &LocationOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let site = required(entity, "site", &options.site)?;
    let path = required(entity, "path", &options.path)?;

    let scope = Scope::Location {
        site,
        location: label_leaf(title),
    };
    out.group(
        scope_path(scope).for_entity(entity)?,
        format!("location {path}"),
    );
    Ok(())
}

fn rewrite(
    entity: &EntityRef,
    title: &str,
    options: &RewriteOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let from = required(entity, "from", &options.from)?;
    let to = required(entity, "to", &options.to)?;
    let site = required(entity, "site", &options.site)?;

    if options.last && options.permanent {
        return Err(CompositionError::ConflictingModifiers {
            entity: entity.clone(),
            first: "last",
            second: "permanent",
        });
    }

    let scope = Scope::from_options(entity, Some(site), options.location.as_deref())?;
    let modifier = match (options.permanent, options.last) {
        (true, _) => " permanent",
        (_, true) => " last",
        _ => "",
    };

    out.directive(
        resolve(scope, label_leaf(title)).for_entity(entity)?,
        "rewrite",
        format!("{from} {to}{modifier}"),
    );
    Ok(())
}

fn fastcgi(
    entity: &EntityRef,
    options: &FastcgiOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let site = required(entity, "site", &options.site)?;
    let location = required(entity, "location", &options.location)?;
    let target = required(entity, "target", &options.target)?;

    let scope = Scope::Location {
        site,
        location: label_leaf(location),
    };
    for (name, source) in FASTCGI_PARAMS {
        out.directive(
            resolve(scope, &format!("fastcgi_param_{name}")).for_entity(entity)?,
            "fastcgi_param",
            format!("{name} {source}"),
        );
    }
    out.parameter(resolve(scope, "fastcgi_pass").for_entity(entity)?, target);
    Ok(())
}

fn toggle(
    entity: &EntityRef,
    directive: &str,
    options: &ToggleOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let scope = Scope::from_options(entity, options.site.as_deref(), None)?;
    out.parameter(resolve(scope, directive).for_entity(entity)?, "on");
    Ok(())
}

fn error_page(
    entity: &EntityRef,
    options: &ErrorPageOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let code = required(entity, "code", &options.code)?;
    let dest = required(entity, "dest", &options.dest)?;
    let scope = Scope::from_options(entity, options.site.as_deref(), options.location.as_deref())?;

    out.directive(
        resolve(scope, &format!("error_page_{code}")).for_entity(entity)?,
        "error_page",
        format!("{code} {dest}"),
    );
    Ok(())
}

fn parameter(
    entity: &EntityRef,
    key: &str,
    options: &ParameterOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let value = required(entity, "value", &options.value)?;
    let path = NamespacePath::parse(key).for_entity(entity)?;

    out.parameters
        .push(ParameterNode::new(path, value, options.param.clone()));
    Ok(())
}

fn group(
    entity: &EntityRef,
    key: &str,
    options: &GroupOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let context = required(entity, "context", &options.context)?;
    let path = NamespacePath::parse(key).for_entity(entity)?;

    out.group(path, context);
    Ok(())
}

fn config(
    entity: &EntityRef,
    key: &str,
    options: &ConfigOptions,
    out: &mut Emission,
) -> Result<(), CompositionError> {
    let path = NamespacePath::parse(key).for_entity(entity)?;
    out.documents.push(ConfigDocument::new(
        entity,
        path,
        options.content.clone(),
        options.source.clone(),
    )?);
    Ok(())
}

impl FileSpec {
    /// A root owned `0644` file that triggers a reload when it changes
    fn config(path: PathBuf, contents: String) -> Self {
        Self {
            path,
            contents: FileContents::Inline(contents),
            mode: 0o644,
            owner: DEFAULT_OWNER.to_string(),
            group: DEFAULT_OWNER.to_string(),
            notify: true,
        }
    }
}

impl DirectorySpec {
    /// A root owned `0755` directory
    pub(crate) fn managed(path: PathBuf, purge: bool) -> Self {
        Self {
            path,
            mode: 0o755,
            owner: DEFAULT_OWNER.to_string(),
            group: DEFAULT_OWNER.to_string(),
            purge,
            recurse: purge,
        }
    }
}
