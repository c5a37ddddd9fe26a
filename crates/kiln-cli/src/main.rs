use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Kiln: persisted build state tooling",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a kiln.toml scaffold
    Init {
        /// Project directory (default: current directory)
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Overwrite an existing kiln.toml
        #[arg(long)]
        force: bool,
    },
    /// Work with the persisted build state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Rehydrate the cache and summarize what it holds.
    ///
    /// Reports whether the snapshot was restored, missing or corrupt, the
    /// node count per node type, and which persisted slices carry data.
    Inspect {
        /// Path to kiln.toml (defaults apply if it does not exist)
        #[arg(short, long, default_value = "kiln.toml")]
        config: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Drop the persisted snapshot so the next build starts cold
    Clean {
        #[arg(short, long, default_value = "kiln.toml")]
        config: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kiln=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => commands::init::init(&path, force),
        Commands::State { action } => match action {
            StateAction::Inspect { config, format } => {
                commands::state::inspect(&config, &format)
            }
            StateAction::Clean { config } => commands::state::clean(&config),
        },
    }
}
