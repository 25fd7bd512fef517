//! Chat Conductor CLI
//!
//! Terminal front-end for the conductor. Answers stream to stdout as they
//! arrive; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # One question, grounded in web search
//! chat-conductor ask --search "What changed in Rust 1.80?"
//!
//! # Interactive session (history carries across turns)
//! chat-conductor chat --search
//!
//! # Search only, JSON output
//! chat-conductor search --sources wikipedia --json "borrow checker"
//!
//! # Verbose logging
//! RUST_LOG=chat_conductor=debug chat-conductor ask "hi"
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): stop the current generation, keeping the partial answer

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chat_conductor::{
    load_config_from_path, Attachment, Conductor, ConductorConfig, ConductorEvent,
    ConfigOverrides, GenerationOutcome, GenerationRequest, SourceResult,
};

/// Chat Conductor - streamed answers from an OpenAI-compatible endpoint
#[derive(Parser, Debug)]
#[command(name = "chat-conductor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONDUCTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Completion endpoint URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Default model identifier
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Prior messages sent along with each query
    #[arg(long, value_name = "N")]
    history_window: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAT_CONDUCTOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question and stream the answer
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        #[command(flatten)]
        options: TurnOptions,

        /// Attach a text file to the question
        #[arg(short = 'a', long, value_name = "FILE")]
        attach: Option<PathBuf>,
    },

    /// Interactive session; one question per line
    Chat {
        #[command(flatten)]
        options: TurnOptions,
    },

    /// Run a search without generating an answer
    Search {
        /// Search query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Comma-separated source tags (default: configured sources)
        #[arg(short = 's', long, value_delimiter = ',')]
        sources: Option<Vec<String>>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Per-turn switches shared by `ask` and `chat`
#[derive(ClapArgs, Debug, Clone)]
struct TurnOptions {
    /// Search the web before answering
    #[arg(long)]
    search: bool,

    /// Answer in tutoring style
    #[arg(long)]
    study: bool,
}

impl TurnOptions {
    fn request(&self, query: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(query)
            .with_search(self.search)
            .with_study_mode(self.study)
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "chat_conductor={level},chat_conductor_cli={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load(args: &Args) -> Result<ConductorConfig> {
    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.api_url {
        overrides = overrides.with_api_url(url.clone());
    }
    if let Some(ref model) = args.model {
        overrides = overrides.with_default_model(model.clone());
    }
    if let Some(window) = args.history_window {
        overrides = overrides.with_history_window(window);
    }
    overrides.apply(&mut config);

    info!(source = %config.source(), "Configuration loaded");
    Ok(config)
}

async fn read_attachment(path: &Path) -> Attachment {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    match tokio::fs::read_to_string(path).await {
        Ok(text) => Attachment::new(name, text),
        Err(e) => {
            warn!(error = %e, path = ?path, "Failed to read attachment");
            Attachment::unreadable(name)
        }
    }
}

/// Stop the active generation on every Ctrl-C
fn spawn_interrupt_handler(conductor: Conductor) {
    tokio::spawn(async move {
        while signal::ctrl_c().await.is_ok() {
            if conductor.stop_current_generation() {
                debug!("Generation stopped by user");
            }
        }
    });
}

fn print_sources(sources: &[SourceResult]) {
    println!("\nSources:");
    for (i, source) in sources.iter().enumerate() {
        println!("  [{}] {} ({}) <{}>", i + 1, source.title, source.source, source.url);
    }
}

/// Print one event; returns true when the event settles a request
fn render(event: &ConductorEvent, pending_sources: &mut Vec<SourceResult>) -> bool {
    match event {
        ConductorEvent::Queued { position, .. } => {
            eprintln!("(queued at position {position})");
            false
        }
        ConductorEvent::Started { request_id } => {
            debug!(request_id = %request_id, "Generation started");
            false
        }
        ConductorEvent::Sources { sources, .. } => {
            pending_sources.clone_from(sources);
            false
        }
        ConductorEvent::Token { fragment, .. } => {
            print!("{fragment}");
            // Fragments are shown as they arrive
            let _ = std::io::stdout().flush();
            false
        }
        ConductorEvent::Settled { outcome, .. } => {
            println!();
            match outcome {
                GenerationOutcome::Completed { .. } => {}
                GenerationOutcome::Stopped { .. } => eprintln!("(stopped)"),
                GenerationOutcome::Failed { error, .. } => eprintln!("error: {error}"),
            }
            if !pending_sources.is_empty() {
                print_sources(pending_sources);
                pending_sources.clear();
            }
            true
        }
    }
}

async fn ask(
    config: &ConductorConfig,
    query: String,
    options: TurnOptions,
    attach: Option<PathBuf>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(config.session.event_buffer);
    let conductor = Conductor::from_config(config, tx)?;
    spawn_interrupt_handler(conductor.clone());

    let mut request = options.request(query);
    if let Some(path) = attach {
        request = request.with_attachment(read_attachment(&path).await);
    }
    conductor.submit_generation(request);

    let mut sources = Vec::new();
    let mut failed = false;
    while let Some(event) = rx.recv().await {
        if let ConductorEvent::Settled { ref outcome, .. } = event {
            failed = outcome.is_failure();
        }
        if render(&event, &mut sources) {
            break;
        }
    }

    if failed {
        anyhow::bail!("Generation failed");
    }
    Ok(())
}

async fn chat(config: &ConductorConfig, options: TurnOptions) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(config.session.event_buffer);
    let conductor = Conductor::from_config(config, tx)?;
    spawn_interrupt_handler(conductor.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sources = Vec::new();
    let mut stdin_open = true;
    let mut outstanding = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        conductor.submit_generation(options.request(line));
                        outstanding += 1;
                    }
                    None => stdin_open = false,
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if render(&event, &mut sources) {
                    outstanding = outstanding.saturating_sub(1);
                }
            }
        }

        if !stdin_open && outstanding == 0 {
            break;
        }
    }

    if let Some(title) = conductor.transcript().title() {
        info!(title = %title, "Session ended");
    }
    Ok(())
}

async fn search(
    config: &ConductorConfig,
    query: &str,
    sources: Option<Vec<String>>,
    json: bool,
) -> Result<()> {
    let (tx, _rx) = mpsc::channel(1);
    let conductor = Conductor::from_config(config, tx)?;
    let sources = sources.unwrap_or_else(|| config.search.default_sources.clone());

    let results = conductor.aggregate_search(query, &sources).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        eprintln!("No results");
    } else {
        print_sources(&results);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = load(&args)?;

    match args.command {
        Command::Ask {
            query,
            options,
            attach,
        } => ask(&config, query.join(" "), options, attach).await,
        Command::Chat { options } => chat(&config, options).await,
        Command::Search {
            query,
            sources,
            json,
        } => search(&config, &query.join(" "), sources, json).await,
    }
}
