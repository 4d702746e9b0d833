use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use veil::config::VeilConfig;
use veil_common::PrivacyLevel;

mod cmd;

#[derive(Parser)]
#[command(name = "veil")]
#[command(
    version,
    about = "Compare revenue tiers with another company without revealing the figures"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never prompt; fail instead when an input is missing
    #[arg(long, global = true)]
    pub yes: bool,

    /// Relay base URL. Overrides veil.toml and VEIL_SERVER_URL
    #[arg(long, global = true)]
    pub server_url: Option<String>,

    /// Directory holding veil.toml, the saved session and logs
    #[arg(long, global = true, env = "VEIL_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Write log files as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Documents and amount for the commit step. Missing values are prompted for.
#[derive(Args, Clone, Debug, Default)]
pub struct CommitArgs {
    /// Bank statement (PDF, PNG or JPEG)
    #[arg(long)]
    pub bank: Option<PathBuf>,

    /// Signed commitment letter (PDF, PNG or JPEG)
    #[arg(long)]
    pub commitment: Option<PathBuf>,

    /// Transaction amount to commit
    #[arg(long)]
    pub amount: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new session and wait for the other company
    Create {
        /// Your company name
        #[arg(long)]
        company: Option<String>,

        /// How much the result discloses: minimal or detailed
        #[arg(long, default_value = "detailed")]
        privacy: PrivacyLevel,

        #[command(flatten)]
        commit: CommitArgs,

        /// Stop after creating; continue later with `veil resume`
        #[arg(long)]
        detach: bool,
    },
    /// Join a session created by the other company
    Join {
        session_id: String,

        /// Your company name
        #[arg(long)]
        company: Option<String>,

        #[command(flatten)]
        commit: CommitArgs,

        /// Stop after joining; continue later with `veil resume`
        #[arg(long)]
        detach: bool,
    },
    /// Continue the saved session
    Resume {
        #[command(flatten)]
        commit: CommitArgs,
    },
    /// Show the saved session and its status on the relay
    Status,
    /// Reveal the result of a session where both companies have committed
    Reveal,
    /// Forget the saved session
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// List the revenue tiers used for comparison
    Levels,
    /// List completed comparisons known to the relay
    History,
    /// Export the relay's record of a session as JSON
    Export {
        session_id: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and report problems
    Validate,
    /// Write a default veil.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = VeilConfig::load(cli.state_dir.clone(), cli.server_url.clone())?
        .with_verbose(cli.verbose)
        .with_yes(cli.yes);

    let _log_guard = match veil::logging::init(&config.log_dir(), cli.verbose, cli.log_json) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {:#}", e);
            None
        }
    };
    tracing::debug!(server = %config.server_url, state_dir = %config.state_dir.display(), "starting");

    // `veil config` runs even when the file is broken.
    if !matches!(cli.command, Commands::Config { .. }) {
        config.ensure_valid()?;
    }

    match &cli.command {
        Commands::Create {
            company,
            privacy,
            commit,
            detach,
        } => cmd::cmd_create(&config, company.clone(), *privacy, commit.clone(), *detach).await?,
        Commands::Join {
            session_id,
            company,
            commit,
            detach,
        } => {
            cmd::cmd_join(&config, session_id, company.clone(), commit.clone(), *detach).await?
        }
        Commands::Resume { commit } => cmd::cmd_resume(&config, commit.clone()).await?,
        Commands::Status => cmd::cmd_status(&config).await?,
        Commands::Reveal => cmd::cmd_reveal(&config).await?,
        Commands::Reset { force } => cmd::cmd_reset(&config, *force)?,
        Commands::Levels => cmd::cmd_levels(&config).await?,
        Commands::History => cmd::cmd_history(&config).await?,
        Commands::Export { session_id, output } => {
            cmd::cmd_export(&config, session_id, output.as_deref()).await?
        }
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
