//! procrelay
//!
//! Usage:
//!     procrelay server
//!     procrelay run -- npm test
//!     procrelay publish --source docs

use anyhow::Context;
use clap::{Parser, Subcommand};
use procrelay::settings::{SERVER_PRESET, TEST_SERVER_PRESET};
use procrelay::{
    GitPagesPublisher, LaunchSpec, Launcher, NodeSnapshotCopier, RelayStdErr, RelayStdOut,
    Settings, ShutdownTrigger, SnapshotLoaderLocation, TestBundleConfig, on_compiled,
    publish_and_report, run_scoped,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "procrelay", about = "Run dev servers and publish docs for Fable.SignalR")]
struct Cli {
    /// Settings file (defaults to ./procrelay.toml when present)
    #[arg(long, global = true, env = "PROCRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo server
    Server,
    /// Run the test server
    TestServer,
    /// Run an arbitrary command
    Run {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Publish the docs directory to the pages branch
    Publish {
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        repo: Option<String>,
    },
    /// Copy Jest snapshots into the compiled test bundle
    Snapshots {
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Snapshot loader directory, skips discovery
        #[arg(long)]
        loader: Option<PathBuf>,
        /// Directory holding the snapshots (defaults to the project directory)
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "procrelay=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let launcher = Launcher::new()
        .with_relay_config(settings.relay.clone())
        .context("Invalid relay settings")?;

    match cli.command {
        Command::Server => {
            let spec = settings.preset(SERVER_PRESET)?.clone();
            launch(&launcher, &spec).await
        }
        Command::TestServer => {
            let spec = settings.preset(TEST_SERVER_PRESET)?.clone();
            launch(&launcher, &spec).await
        }
        Command::Run { command, args } => {
            let spec = LaunchSpec::builder()
                .command(command)
                .args(args)
                .build()
                .context("Invalid command")?;
            launch(&launcher, &spec).await
        }
        Command::Publish { source, repo } => {
            let source = source.unwrap_or(settings.publish.source);
            let mut options = settings.publish.options;
            if let Some(repo) = repo {
                options.repository_url = repo;
            }

            let publisher = GitPagesPublisher::new(launcher);
            let result =
                publish_and_report(&publisher, &source, &options, &RelayStdOut::default()).await;
            Ok(if result.is_ok() { 0 } else { 1 })
        }
        Command::Snapshots {
            project_dir,
            loader,
            source_dir,
        } => {
            let mut config = match &project_dir {
                Some(dir) => TestBundleConfig::fable_signalr_tests(dir),
                None => settings.bundle,
            };
            if let Some(path) = loader {
                config.snapshot_loader = SnapshotLoaderLocation::Explicit { path };
            }

            let source_dir = source_dir
                .or(project_dir)
                .or_else(|| config.entry.parent().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("."));

            let copier = NodeSnapshotCopier::new(launcher);
            let loader_dir = on_compiled(&config, &source_dir, &copier).await?;
            tracing::info!("Snapshots copied using {}", loader_dir.display());
            Ok(0)
        }
    }
}

async fn launch(launcher: &Launcher, spec: &LaunchSpec) -> anyhow::Result<u8> {
    let out = RelayStdOut::default();
    out.print("Starting server...\n").await;

    let shutdown = ShutdownTrigger::new();
    let listener = shutdown.listen_for_signals();

    let outcome = run_scoped(launcher, spec, out, RelayStdErr::default(), &shutdown).await;
    listener.abort();

    let outcome = outcome.with_context(|| format!("Failed to run {}", spec.display_line()))?;
    tracing::debug!("{} finished: {:?}", spec.command, outcome);

    Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
}
