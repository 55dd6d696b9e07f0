mod cli;

use nginx_compose::apply::{FsApplier, PendingAction, Platform};
use nginx_compose::compose::{Engine, Layout, Plan};
use nginx_compose::document::FileContents;
use nginx_compose::path::NamespacePath;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("NGINX_COMPOSE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Plan(plan_cli) => plan(plan_cli),
        cli::Command::Render(render_cli) => render(render_cli),
        cli::Command::Apply(apply_cli) => apply(apply_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn plan(cli: cli::PlanCommand) -> anyhow::Result<()> {
    let plan = compose(&cli.input, &cli.layout)?;
    output(&cli.output, &plan)
}

pub fn render(cli: cli::RenderCommand) -> anyhow::Result<()> {
    let plan = compose(&cli.input, &cli.layout)?;

    let path = NamespacePath::parse(&cli.path)?;
    let Some(document) = plan.documents.get(&path) else {
        anyhow::bail!("Nothing is declared at {path}");
    };
    if let Some(owner) = plan.declared_by(&path) {
        tracing::info!(%path, %owner, "rendering");
    }

    match document.render() {
        FileContents::Inline(contents) => print!("{contents}"),
        FileContents::Source(source) => print!("{}", std::fs::read_to_string(source)?),
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ApplyReport<'a> {
    changed: bool,
    reloaded: bool,
    pending: &'a [PendingAction],
}

pub fn apply(cli: cli::ApplyCommand) -> anyhow::Result<()> {
    let plan = compose(&cli.input, &cli.layout)?;

    let platform = match cli.os_family {
        cli::OsFamily::Debian => Platform::Debian,
        cli::OsFamily::Redhat => Platform::RedHat,
        cli::OsFamily::Auto => Platform::detect().ok_or_else(|| {
            anyhow::anyhow!("Unable to detect the OS family, pass --os-family")
        })?,
    };

    let mut applier = FsApplier::new(platform, &cli.logrotate_dir);
    let signal = nginx_compose::apply::converge(&plan, &mut applier)?;

    let mut reloaded = false;
    if signal.is_raised() && cli.reload {
        for action in applier.pending() {
            if let PendingAction::Service { reload_command, .. } = action {
                run(reload_command)?;
                reloaded = true;
            }
        }
    }

    let report = ApplyReport {
        changed: signal.is_raised(),
        reloaded,
        pending: applier.pending(),
    };
    output(&cli.output, &report)
}

fn run(command: &str) -> anyhow::Result<()> {
    tracing::info!(command, "reloading");
    let status = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .status()?;
    anyhow::ensure!(status.success(), "`{command}` failed with {status}");
    Ok(())
}

fn compose(input: &cli::InputArgs, layout: &cli::LayoutArgs) -> anyhow::Result<Plan> {
    let documents = load(input)?;
    let declarations = nginx_compose::declarations::from_documents(&documents)?;
    let engine = Engine::new(Layout::new(layout.root.clone()));
    let plan = engine.compose(&declarations).map_err(|err| {
        tracing::error!(entity = %err.entity(), "composition failed");
        err
    })?;
    Ok(plan)
}

fn load(input: &cli::InputArgs) -> anyhow::Result<nginx_compose::hcl_documents::HclDocuments> {
    if !input.workdir && input.files.is_empty() && input.directories.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        let body = hcl_edit::parser::parse_body(&stdin)?;
        return Ok(body.into());
    }

    let mut documents = nginx_compose::hcl_documents::HclDocuments::default();

    if input.workdir {
        documents.load_directory(&std::env::current_dir()?)?;
    }

    for file_path in &input.files {
        documents.load_file(file_path)?;
    }

    for dir_path in &input.directories {
        documents.load_directory(dir_path)?;
    }

    anyhow::ensure!(documents.source_count() > 0, "No files loaded");

    Ok(documents)
}

fn output<T: serde::Serialize>(output: &cli::OutputArgs, value: &T) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let documents = load(&cli.input)?;

    match cli.command {
        Documents => println!("{documents:#?}"),
        Declarations => {
            let declarations = nginx_compose::declarations::from_documents(&documents)?;
            println!("{declarations:#?}")
        }
    }

    Ok(())
}
