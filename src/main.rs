//! Talkie - parent/child conversation journal
//!
//! A CLI that buffers conversation turns, finalizes them into analyzed
//! conversations using Ollama, and answers daily and weekly queries over
//! the results.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime or validation error (unknown user, misaligned range, etc.)
//!   3 - Nothing recorded yet for the requested period

mod analysis;
mod calendar;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod session;
mod store;

use analysis::{HttpAnalysisClient, TemporalAggregator};
use anyhow::{bail, Context, Result};
use cli::{Args, Command, OutputFormat, QuestionCommand, TurnCommand, UserCommand};
use config::Config;
use error::TalkieError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{Turn, User};
use session::{
    ConversationHistory, FinalizeOutcome, NoOpReason, QuestionService, SessionFinalizer, UserLocks,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{MemoryTurnStore, MemoryUserStore, Snapshot, TurnStore, UserStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit code for a valid query with nothing recorded yet.
const EXIT_NO_CONTENT: i32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, config.general.verbose);

    info!("Talkie v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            match e.downcast_ref::<TalkieError>() {
                Some(err) if err.is_no_content() => {
                    println!("{}", err);
                    std::process::exit(EXIT_NO_CONTENT);
                }
                Some(err) if err.is_client_error() => warn!("Request rejected: {}", err),
                _ => error!("Command failed: {}", e),
            }
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .talkie.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".talkie.toml");

    if path.exists() {
        eprintln!("⚠️  .talkie.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .talkie.toml")?;

    println!("✅ Created .talkie.toml with default settings.");
    println!("   Edit it to customize the model, endpoints, and calendar.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `verbose` in the config file raises the level unless `--quiet` is given.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = if config_verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Shared state for one invocation.
struct App {
    config: Config,
    state_file: PathBuf,
    users: Arc<MemoryUserStore>,
    turns: Arc<MemoryTurnStore>,
    locks: UserLocks,
}

impl App {
    fn user_store(&self) -> Arc<dyn UserStore> {
        self.users.clone()
    }

    fn turn_store(&self) -> Arc<dyn TurnStore> {
        self.turns.clone()
    }

    /// Write the stores back to the state file.
    async fn persist(&self) -> Result<()> {
        let snapshot = Snapshot::capture(&self.users, &self.turns).await;
        snapshot.save(&self.state_file)?;
        debug!("State saved to {}", self.state_file.display());
        Ok(())
    }
}

/// Load state, dispatch the subcommand, save state after mutations.
async fn run(args: Args, config: Config) -> Result<()> {
    let state_file = PathBuf::from(&config.general.state_file);
    let (users, turns) = Snapshot::load(&state_file)?.into_stores();

    let app = App {
        config,
        state_file,
        users: Arc::new(users),
        turns: Arc::new(turns),
        locks: UserLocks::new(),
    };

    match args.command {
        Command::InitConfig => handle_init_config(),
        Command::User(command) => handle_user(&app, command).await,
        Command::Question(command) => handle_question(&app, command).await,
        Command::Turn(command) => handle_turn(&app, command).await,
        Command::Finalize { user, format } => {
            handle_finalize(&app, user, format, args.quiet).await
        }
        Command::Weekly {
            user,
            start,
            end,
            format,
            output,
        } => {
            let calendar = app.config.to_calendar()?;
            let weekly = TemporalAggregator::new(app.user_store(), calendar)
                .weekly_conversation(user, start, end)
                .await?;
            let name = app.users.find_user(user).await?.name;

            let rendered = match format {
                OutputFormat::Json => report::generate_json_report(&weekly)?,
                OutputFormat::Markdown => report::generate_markdown_report(&weekly, &name),
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered)
                        .with_context(|| format!("Failed to write report to {}", path.display()))?;
                    println!("✅ Weekly report saved to: {}", path.display());
                }
                None => println!("{}", rendered),
            }
            Ok(())
        }
        Command::Day { user, date } => {
            let history = ConversationHistory::new(app.user_store(), app.config.to_calendar()?);
            let items = history.list(user, date).await?;

            if items.is_empty() {
                println!("No conversations on {}.", date);
            }
            for item in items {
                println!(
                    "{:>2}. [#{}] {} ({})",
                    item.order,
                    item.conversation_id,
                    item.title.as_deref().unwrap_or("(untitled)"),
                    item.created_at.format("%H:%M")
                );
            }
            Ok(())
        }
        Command::Detail { user, conversation } => {
            let history = ConversationHistory::new(app.user_store(), app.config.to_calendar()?);
            let detail = history.detail(user, conversation).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Command::Summary { user, conversation } => {
            let history = ConversationHistory::new(app.user_store(), app.config.to_calendar()?);
            match history.summary(user, conversation).await? {
                Some(summary) => println!("{}", summary),
                None => println!("No summary was produced for this conversation."),
            }
            Ok(())
        }
    }
}

async fn handle_user(app: &App, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add { id, name, age } => {
            match app.users.find_user(id).await {
                Ok(_) => bail!("User {} already exists", id),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
            app.users.save_user(&User::new(id, name.trim(), age)).await?;
            app.persist().await?;
            println!("✅ Added user {}", id);
        }
    }
    Ok(())
}

async fn handle_question(app: &App, command: QuestionCommand) -> Result<()> {
    let service = QuestionService::new(app.user_store(), app.locks.clone());

    match command {
        QuestionCommand::Create { user, content } => service.create(user, content.trim()).await?,
        QuestionCommand::Update { user, content } => service.update(user, content.trim()).await?,
        QuestionCommand::Delete { user } => service.delete(user).await?,
        QuestionCommand::Answered { user } => service.mark_answered(user).await?,
        QuestionCommand::List { user } => {
            let questions = service.list(user).await?;
            println!("{}", serde_json::to_string_pretty(&questions)?);
            return Ok(());
        }
    }

    app.persist().await?;
    println!("✅ Question updated");
    Ok(())
}

async fn handle_turn(app: &App, command: TurnCommand) -> Result<()> {
    match command {
        TurnCommand::Add {
            user,
            speaker,
            text,
        } => {
            // Fail fast for unknown users instead of buffering orphan turns
            app.users.find_user(user).await?;

            let sequence_index = app.turns.len(user).await as u32;
            app.turns
                .append(user, Turn::new(sequence_index, speaker.into(), text))
                .await?;
            app.persist().await?;
            println!("✅ Turn {} buffered", sequence_index);
        }
    }
    Ok(())
}

async fn handle_finalize(
    app: &App,
    user: models::UserId,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let gateway = HttpAnalysisClient::new(app.config.to_client_config())?;

    let finalizer = SessionFinalizer::new(
        app.user_store(),
        app.turn_store(),
        Arc::new(gateway),
        app.locks.clone(),
    )
    .with_parser(app.config.to_parser())
    .with_calendar(app.config.to_calendar()?)
    .with_analysis_timeout(app.config.finalize_timeout());

    let spinner = (!quiet && format == OutputFormat::Markdown).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Analyzing conversation...");
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    });

    let outcome = finalizer.finalize_session(user).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    // Revert and commit both change durable state
    app.persist().await?;
    let outcome = outcome?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        FinalizeOutcome::NoOp { reason } => {
            let message = match reason {
                NoOpReason::EmptyBuffer => "No buffered turns to finalize.",
                NoOpReason::AnswerReverted => {
                    "The session held no reply; the question is unanswered again."
                }
                NoOpReason::TooShort => "A single turn is too short to finalize.",
            };
            println!("{}", message);
        }
        FinalizeOutcome::Committed(report) => {
            println!("\n📝 Conversation #{} saved", report.conversation_id);
            println!(
                "   Title: {}",
                report.analytics.title.as_deref().unwrap_or("(untitled)")
            );
            println!("   Turns: {}", report.turn_count);
            if report.answer_committed {
                println!("   Answer recorded for the current question");
            }
            if report.is_degraded() {
                let steps: Vec<String> =
                    report.failed_steps.iter().map(|s| s.to_string()).collect();
                warn!("Analysis incomplete: {}", steps.join(", "));
                println!("   ⚠️  Incomplete analysis: {}", steps.join(", "));
            }
        }
    }

    if finalizer.reverted_answers() > 0 {
        debug!(reverted = finalizer.reverted_answers(), "Answer flags reverted");
    }

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .talkie.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
