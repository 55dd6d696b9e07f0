//! declared entities
//!
//! One options struct per entity kind. Required fields are `Option`s so that the
//! engine can report exactly which one is missing, in a fixed order.

/// Default `max_age` of the HSTS header (366 days)
pub const DEFAULT_HSTS_MAX_AGE: u64 = 31_622_400;

/// Identifies a declaration in error messages, e.g. `site "rspec"`
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct EntityRef {
    pub kind: &'static str,
    #[new(into)]
    pub title: String,
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.kind, self.title)
    }
}

/// A titled entity
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Declaration {
    #[new(into)]
    pub title: String,
    pub entity: Entity,
}

impl Declaration {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity.kind(), self.title.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Server(ServerOptions),
    Site(SiteOptions),
    Location(LocationOptions),
    Rewrite(RewriteOptions),
    Fastcgi(FastcgiOptions),
    Gzip(ToggleOptions),
    SslHardened(ToggleOptions),
    ErrorPage(ErrorPageOptions),
    Parameter(ParameterOptions),
    Group(GroupOptions),
    Config(ConfigOptions),
}

impl Entity {
    /// Kind as written in declaration files
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Server(_) => "server",
            Entity::Site(_) => "site",
            Entity::Location(_) => "location",
            Entity::Rewrite(_) => "rewrite",
            Entity::Fastcgi(_) => "fastcgi",
            Entity::Gzip(_) => "gzip",
            Entity::SslHardened(_) => "ssl_hardened",
            Entity::ErrorPage(_) => "error_page",
            Entity::Parameter(_) => "parameter",
            Entity::Group(_) => "group",
            Entity::Config(_) => "config",
        }
    }
}

/// The nginx installation itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerOptions {
    /// `auto` when unset
    pub worker_processes: Option<String>,
    /// `768` when unset
    pub worker_connections: Option<u64>,
    /// Overrides the platform's reload command
    pub reload_command: Option<String>,
}

/// A virtual host
#[derive(Debug, Clone, PartialEq)]
pub struct SiteOptions {
    pub base_dir: Option<String>,
    pub server_name: Option<String>,
    pub alt_names: Option<NameList>,
    pub default: bool,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub ssl_ip: Option<String>,
    pub ssl_default: bool,
    pub ssl_redirect: bool,
    pub hsts: Hsts,
    pub hsts_include_subdomains: bool,
    /// Owner of the log directory and rotated logs, `root` when unset
    pub user: Option<String>,
    pub group: Option<String>,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            base_dir: None,
            server_name: None,
            alt_names: None,
            default: false,
            ssl_cert: None,
            ssl_key: None,
            ssl_ip: None,
            ssl_default: false,
            ssl_redirect: false,
            hsts: Hsts::Off,
            hsts_include_subdomains: true,
            user: None,
            group: None,
        }
    }
}

/// Server names given either as a list or as one space separated string
#[derive(Debug, Clone, PartialEq)]
pub enum NameList {
    Joined(String),
    List(Vec<String>),
}

impl NameList {
    /// Both forms normalize to single-space separated names
    pub fn to_value(&self) -> String {
        match self {
            NameList::Joined(names) => names.split_whitespace().collect::<Vec<_>>().join(" "),
            NameList::List(names) => names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Strict-Transport-Security setting of a site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Hsts {
    #[default]
    Off,
    On,
    MaxAge(u64),
}

impl Hsts {
    /// `None` when disabled
    pub fn max_age(&self) -> Option<u64> {
        match self {
            Hsts::Off => None,
            Hsts::On => Some(DEFAULT_HSTS_MAX_AGE),
            Hsts::MaxAge(max_age) => Some(*max_age),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationOptions {
    pub site: Option<String>,
    /// Location match, e.g. `~ ^/s3kr1t/(.*)$`
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteOptions {
    pub from: Option<String>,
    pub to: Option<String>,
    pub site: Option<String>,
    pub location: Option<String>,
    pub permanent: bool,
    pub last: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastcgiOptions {
    pub site: Option<String>,
    pub location: Option<String>,
    /// `fastcgi_pass` target, e.g. `unix:/var/run/example.sock`
    pub target: Option<String>,
}

/// Options of simple on/off switches (gzip, ssl hardening)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToggleOptions {
    pub site: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorPageOptions {
    pub code: Option<String>,
    pub dest: Option<String>,
    pub site: Option<String>,
    pub location: Option<String>,
}

/// A raw directive, the title is its full key path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterOptions {
    pub value: Option<String>,
    /// Directive name, defaults to the last segment of the title
    pub param: Option<String>,
}

/// A raw context block, the title is its full path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupOptions {
    pub context: Option<String>,
}

/// A raw document, the title is its full path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOptions {
    pub content: Option<String>,
    pub source: Option<std::path::PathBuf>,
}
