use anyhow::Context;
use clap::{Parser, Subcommand};
use lci::config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local code intelligence: incremental index and search daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexing daemon for a project
    Serve {
        /// Project root (defaults to the current directory)
        #[arg(long, env = "LCI_ROOT")]
        root: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        #[arg(long, env = "LCI_ROOT")]
        root: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { root } => serve(root),
        Commands::Config { root } => {
            let settings = load_settings(root)?;
            let rendered =
                toml::to_string_pretty(&settings).context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn serve(root: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = Arc::new(load_settings(root)?);
    lci::logging::init_with_config(&settings.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(lci::daemon::serve(settings))
}

fn load_settings(root: Option<PathBuf>) -> anyhow::Result<Settings> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("project root '{}' not found", root.display()))?;

    let settings = Settings::load(root)?;
    settings.validate()?;
    Ok(settings)
}
