//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{Speaker, UserId};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Talkie - parent/child conversation journal with weekly analytics
///
/// Buffers conversation turns, finalizes them into analyzed conversations
/// using a local LLM, and rolls the results up per day and per week.
///
/// Examples:
///   talkie user add --id 1 --name Mina --age 6
///   talkie turn add --user 1 --speaker parent --text "What did you see today?"
///   talkie finalize --user 1
///   talkie weekly --user 1 --start 2024-06-02 --end 2024-06-08
///   talkie init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .talkie.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// JSON file holding users and buffered turns between runs
    #[arg(long, value_name = "FILE", global = true)]
    pub state_file: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Ollama API endpoint URL
    #[arg(long, value_name = "URL", env = "TALKIE_LLM_URL", global = true)]
    pub llm_url: Option<String>,

    /// Ollama model used for the summaries
    #[arg(short, long, env = "TALKIE_MODEL", global = true)]
    pub model: Option<String>,

    /// Content analysis endpoint URL
    #[arg(long, value_name = "URL", env = "TALKIE_ANALYSIS_URL", global = true)]
    pub analysis_url: Option<String>,

    /// Overall analysis budget for one finalize, in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate a default .talkie.toml configuration file
    InitConfig,

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage the question of the day
    #[command(subcommand)]
    Question(QuestionCommand),

    /// Manage buffered conversation turns
    #[command(subcommand)]
    Turn(TurnCommand),

    /// Close the current conversation and analyze it
    Finalize {
        #[arg(long)]
        user: UserId,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,
    },

    /// Weekly conversation statistics
    Weekly {
        #[arg(long)]
        user: UserId,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day of the range (YYYY-MM-DD), same week as --start
        #[arg(long)]
        end: NaiveDate,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Conversations finalized on a day
    Day {
        #[arg(long)]
        user: UserId,

        /// Day to list (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },

    /// Analytics and turns of one conversation
    Detail {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        conversation: u64,
    },

    /// Content summary of one conversation
    Summary {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        conversation: u64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Register a user
    Add {
        #[arg(long)]
        id: UserId,

        #[arg(long)]
        name: String,

        #[arg(long)]
        age: u32,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum QuestionCommand {
    /// Ask a new question; the previous one moves to history
    Create {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        content: String,
    },

    /// Edit the current question
    Update {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        content: String,
    },

    /// Drop the current question
    Delete {
        #[arg(long)]
        user: UserId,
    },

    /// Record that the child replied to the current question
    Answered {
        #[arg(long)]
        user: UserId,
    },

    /// List questions and their answers
    List {
        #[arg(long)]
        user: UserId,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TurnCommand {
    /// Append a turn to the user's buffer
    Add {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        speaker: SpeakerArg,

        #[arg(long)]
        text: String,
    },
}

/// Output format for reports and finalize results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SpeakerArg {
    Parent,
    Child,
}

impl From<SpeakerArg> for Speaker {
    fn from(arg: SpeakerArg) -> Self {
        match arg {
            SpeakerArg::Parent => Speaker::Parent,
            SpeakerArg::Child => Speaker::Child,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for url in [&self.llm_url, &self.analysis_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match &self.command {
            Command::User(UserCommand::Add { name, .. }) if name.trim().is_empty() => {
                Err("User name must not be empty".to_string())
            }
            Command::Question(
                QuestionCommand::Create { content, .. } | QuestionCommand::Update { content, .. },
            ) if content.trim().is_empty() => Err("Question must not be empty".to_string()),
            _ => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
