mod commands;

use anyhow::Result;
use bda_core::config::Settings;
use clap::Parser;
use commands::{Cli, Commands, FeedbackCommand};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings.logging.level);

    match cli.command {
        Commands::InitDb => commands::handle_init_db(&settings)?,
        Commands::Ingest { policy_dir, clear } => {
            commands::handle_ingest(&settings, &policy_dir, clear)?
        }
        Commands::Status { query } => commands::handle_status(&settings, query.as_deref())?,
        Commands::Prompt(args) => commands::handle_prompt(&settings, args)?,
        Commands::Ask { input, json } => commands::handle_ask(&settings, input, json)?,
        Commands::History { limit } => commands::handle_history(&settings, limit)?,
        Commands::Feedback(FeedbackCommand::Add(args)) => {
            commands::handle_feedback_add(&settings, args)?
        }
        Commands::Feedback(FeedbackCommand::List { decision_id }) => {
            commands::handle_feedback_list(&settings, decision_id)?
        }
        Commands::Export { decision_id, out } => {
            commands::handle_export(&settings, decision_id, &out)?
        }
    }

    Ok(())
}
