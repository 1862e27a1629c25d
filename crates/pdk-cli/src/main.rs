//! Local CI/CD pipeline executor CLI.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pdk")]
#[command(about = "Local CI/CD pipeline executor", long_about = None)]
struct Cli {
    /// Path to the system config file (runner defaults, artifact/secret
    /// store locations). Falls back to built-in defaults when absent.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline
    Run {
        /// Path to the resolved pipeline (JSON)
        pipeline_path: String,
        /// Force a runner kind instead of letting the selector decide
        #[arg(long, value_enum)]
        runner: Option<RunnerArg>,
        /// Acknowledge the host-mode warning non-interactively
        #[arg(long)]
        yes_host_mode: bool,
    },
    /// Validate a pipeline without executing it
    Validate {
        /// Path to the resolved pipeline (JSON)
        pipeline_path: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RunnerArg {
    Container,
    Host,
}

impl From<RunnerArg> for pdk_core::runner::RunnerPreference {
    fn from(value: RunnerArg) -> Self {
        match value {
            RunnerArg::Container => pdk_core::runner::RunnerPreference::Container,
            RunnerArg::Host => pdk_core::runner::RunnerPreference::Host,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            pipeline_path,
            runner,
            yes_host_mode,
        } => {
            let preference = runner
                .map(Into::into)
                .unwrap_or(pdk_core::runner::RunnerPreference::Auto);
            commands::run::run(&pipeline_path, cli.config.as_deref(), preference, yes_host_mode).await?
        }
        Commands::Validate { pipeline_path } => commands::validate::validate(&pipeline_path).await?,
    };

    std::process::exit(exit_code);
}
