// ABOUTME: Entry point for the berth CLI application.
// ABOUTME: Parses arguments and dispatches to the check and run handlers.

mod cli;

use berth::config::{OutputSink, Settings};
use berth::error::{Error, Result};
use berth::{Backend, Backends, Container, ContainerSpec, LifecycleState};
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Check { spec } => check(&spec).map(|_| 0),
        Commands::Run {
            spec,
            timeout,
            keep,
            settings,
        } => run_spec(&spec, timeout, keep, settings).await,
    }
}

/// Validate a spec and print what it describes.
fn check(path: &Path) -> Result<()> {
    let spec = ContainerSpec::load(path)?;
    let summary = serde_json::json!({
        "name": spec.name,
        "namespace": spec.namespace,
        "image": spec.image.to_string(),
        "backend": spec.backend,
        "mode": spec.mode,
        "ports": spec.exposed_ports,
        "port_mappings": spec.port_mappings,
        "files": spec.files.keys().collect::<Vec<_>>(),
        "volumes": spec.volumes.len(),
        "ephemeral": spec.ephemeral,
        "max_lifetime": spec.max_lifetime.map(|d| d.as_secs()),
    });
    let pretty = serde_json::to_string_pretty(&summary)
        .map_err(|e| Error::Config(format!("cannot render summary: {e}")))?;
    println!("{pretty}");
    Ok(())
}

/// Start a spec locally, stream its output and mirror its exit code.
async fn run_spec(
    path: &Path,
    timeout: Option<Duration>,
    keep: bool,
    settings: Option<PathBuf>,
) -> Result<i32> {
    let mut spec = ContainerSpec::load(path)?;
    if spec.backend == Backend::Cluster {
        return Err(Error::Config(
            "cluster specs need a cluster client; the CLI only drives the local engine".into(),
        ));
    }
    spec.output = Some(OutputSink::new(|line| {
        if let Some(line) = line {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
        }
    }));
    spec.ephemeral = spec.ephemeral || !keep;

    let settings = match settings {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };
    let backends = Backends::new().in_cluster(false).with_settings(settings);
    let _signals = backends.hooks().listen();

    let container = Container::new(spec, &backends)?;
    eprintln!("Starting {} ({})", container.name(), container.spec().image);
    container.start().await?;

    if !container.wait_for_completion(timeout).await {
        eprintln!("Timed out waiting for {}, killing it", container.name());
        if let Err(e) = container.kill().await {
            tracing::warn!("kill failed: {}", e);
        }
    }

    let code = container.exit_code().unwrap_or(-1);
    let state = container.state();
    eprintln!("{} finished: {} (exit code {})", container.name(), state, code);

    if !keep {
        container.delete(true).await?;
    }

    Ok(match state {
        LifecycleState::Failed if code == 0 => 1,
        _ => i32::try_from(code).unwrap_or(1),
    })
}
