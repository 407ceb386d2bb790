pub mod ask;
pub mod index;
pub mod records;

pub use ask::{handle_ask, handle_prompt};
pub use index::{handle_ingest, handle_status};
pub use records::{
    handle_export, handle_feedback_add, handle_feedback_list, handle_history, handle_init_db,
};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use bda_ai::embeddings;
use bda_ai::policy::VectorIndex;
use bda_core::config::Settings;
use bda_core::db;
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

#[derive(Parser)]
#[command(name = "bda")]
#[command(about = "Business decision assistant: policy retrieval and four-section answers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations
    InitDb,
    /// Chunk and index policy documents (.txt, .md, .json)
    Ingest {
        #[arg(long, value_name = "DIR")]
        policy_dir: PathBuf,

        /// Drop the existing index first
        #[arg(long)]
        clear: bool,
    },
    /// Show configuration and index status
    Status {
        /// Run a retrieval query against the index
        #[arg(long)]
        query: Option<String>,
    },
    /// Print the prompt a model call would receive
    Prompt(InputArgs),
    /// Answer a question and record the decision
    Ask {
        #[command(flatten)]
        input: InputArgs,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent decisions
    History {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Record or list feedback on a decision
    #[command(subcommand)]
    Feedback(FeedbackCommand),
    /// Write one decision to a JSON file
    Export {
        #[arg(long)]
        decision_id: i64,

        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum FeedbackCommand {
    Add(FeedbackArgs),
    List {
        #[arg(long)]
        decision_id: i64,
    },
}

#[derive(Args)]
pub struct FeedbackArgs {
    #[arg(long)]
    pub decision_id: i64,

    /// 1 to 5
    #[arg(long)]
    pub rating: Option<u8>,

    #[arg(long)]
    pub comment: Option<String>,

    #[arg(long)]
    pub helpful: Option<bool>,

    #[arg(long)]
    pub user_id: Option<String>,
}

#[derive(Args, Clone)]
pub struct InputArgs {
    #[arg(long)]
    pub question: Option<String>,

    /// Computed insights: a JSON object or free text
    #[arg(long, conflicts_with = "insights_file")]
    pub insights: Option<String>,

    #[arg(long, value_name = "FILE")]
    pub insights_file: Option<PathBuf>,

    /// Inline policy text (repeatable)
    #[arg(long)]
    pub policy: Vec<String>,

    /// Policy document (repeatable)
    #[arg(long, value_name = "FILE")]
    pub policy_file: Vec<PathBuf>,

    /// Free-text feedback for context
    #[arg(long)]
    pub feedback: Option<String>,

    /// Include recorded feedback on an earlier decision (repeatable)
    #[arg(long, value_name = "DECISION_ID")]
    pub feedback_from: Vec<i64>,

    #[arg(long)]
    pub user_id: Option<String>,

    #[arg(long)]
    pub session_id: Option<String>,
}

pub(crate) fn open_db(settings: &Settings) -> Result<Connection> {
    Ok(db::open_and_migrate(&settings.paths.db_path())?)
}

pub(crate) fn open_index(settings: &Settings) -> Result<Arc<VectorIndex>> {
    let embedder = embeddings::from_settings(&settings.embeddings)?;
    Ok(Arc::new(VectorIndex::open(
        &settings.paths.vector_store_dir(),
        embedder,
    )?))
}
