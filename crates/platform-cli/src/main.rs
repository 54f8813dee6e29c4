use clap::{Parser, Subcommand};
use platform_cli::cmd::{self, config::ConfigSubcommand};
use platform_cli::root;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "platform-mcp",
    about = "Platform tool server: guarded remote execution, design-gated tool registration and critical-path planning",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .platform/ or .git/)
    #[arg(long, global = true, env = "PLATFORM_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as an MCP stdio server
    Mcp,

    /// Show or validate .platform/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Print the critical path of a JSON task file
    Analyze {
        /// Path to a JSON array of tasks
        file: PathBuf,

        /// Only consider the chain ending at this task
        #[arg(long)]
        goal: Option<String>,

        /// Task ids to treat as completed (comma-separated)
        #[arg(long, value_delimiter = ',')]
        completed: Vec<String>,
    },

    /// Check a YAML tool proposal against the design rules
    CheckProposal {
        /// Path to the proposal
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Mcp => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Mcp => cmd::mcp::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Analyze {
            file,
            goal,
            completed,
        } => cmd::analyze::run(&file, goal.as_deref(), &completed, cli.json),
        Commands::CheckProposal { file } => cmd::check_proposal::run(&root, &file, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
