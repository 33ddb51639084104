//! terrahelm CLI - Declarative Helm releases from git, chart repositories and URLs

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod display;
mod error;
mod exit_codes;

use config::{ProviderArgs, ProviderSettings};
use error::Result;

#[derive(Parser)]
#[command(name = "terrahelm")]
#[command(author = "terrahelm Contributors")]
#[command(version)]
#[command(about = "Declarative Helm releases from git, chart repositories and URLs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Provider settings file (YAML)
    #[arg(long, global = true, env = "TERRAHELM_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a release
    Install {
        /// Release document (YAML)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },

    /// Upgrade an existing release
    Upgrade {
        /// Release document (YAML)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },

    /// Show the current state of a release
    Read {
        /// Release name
        name: String,

        /// Release namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Report a missing release instead of failing
        #[arg(long)]
        data_source: bool,
    },

    /// Uninstall a release
    Uninstall {
        /// Release name
        name: String,

        /// Release namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("TERRAHELM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = ProviderSettings::load(cli.config.as_deref(), &cli.provider)?;

    match cli.command {
        Commands::Install { file } => commands::install::run(&settings, &file).await,
        Commands::Upgrade { file } => commands::upgrade::run(&settings, &file).await,
        Commands::Read {
            name,
            namespace,
            data_source,
        } => commands::read::run(&settings, &name, &namespace, data_source).await,
        Commands::Uninstall { name, namespace } => {
            commands::uninstall::run(&settings, &name, &namespace).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
