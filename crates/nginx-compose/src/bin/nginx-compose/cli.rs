//! nginx-compose cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; nginx-compose ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose the declarations and print the resulting plan
    ///
    /// Reads HCL from stdin unless any other source is provided (via --input-*)
    Plan(PlanCommand),

    /// Print the rendered fragment at a namespace path
    Render(RenderCommand),

    /// Write the configuration below --root
    ///
    /// Unchanged fragments are left alone, fragments that are no longer declared are
    /// deleted. Reports whether nginx has to reload.
    Apply(ApplyCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct PlanCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub layout: LayoutArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct RenderCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub layout: LayoutArgs,

    /// Namespace path, e.g. http/site_example/listen
    pub path: String,
}

#[derive(Parser, Debug)]
pub struct ApplyCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub layout: LayoutArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Directory for log rotation policies
    #[clap(long, env = "NGINX_COMPOSE_LOGROTATE_DIR", default_value = "/etc/logrotate.d")]
    pub logrotate_dir: PathBuf,

    /// Package and service naming
    #[arg(long, env = "NGINX_COMPOSE_OS_FAMILY", default_value_t)]
    pub os_family: OsFamily,

    /// Run the service reload command when the configuration changed
    #[clap(long)]
    pub reload: bool,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load files from work directory
    #[clap(short = 'w', long = "input-workdir")]
    pub workdir: bool,

    /// Load a file
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Load *.nginx.hcl files from given directory
    #[clap(short = 'd', long = "input-dir")]
    pub directories: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct LayoutArgs {
    /// nginx configuration root, fragments go to <root>/nginx.conf.d
    #[clap(long, env = "NGINX_COMPOSE_ROOT", default_value = "/etc/nginx")]
    pub root: PathBuf,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum OsFamily {
    /// Detect from /etc/os-release
    #[default]
    Auto,
    Debian,
    Redhat,
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Auto => f.write_str("auto"),
            OsFamily::Debian => f.write_str("debian"),
            OsFamily::Redhat => f.write_str("redhat"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    Documents,
    Declarations,
}
