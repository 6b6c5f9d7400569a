use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use slidewright_core::{
    ChatCompletionsClient, DeckId, DeckOutcome, DeckStore, FsDeckStore, GenerationClient,
    Pipeline, PipelineConfig, PipelineEvent, Provider, RawInput, StoreError, Subject, Tone,
    auto_chunk_mode, default_config_path, default_store_dir, events, format_deck_readable,
    format_scripts_readable,
};
use tokio::io::AsyncReadExt;
use tracing::debug;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, ValueEnum)]
enum CliProvider {
    Groq,
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Groq => Provider::Groq,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Parser)]
#[command(name = "slidewright")]
#[command(about = "Turn long-form text into slide decks and timed speaker scripts")]
struct Cli {
    /// Log pipeline progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding saved decks
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a slide deck from a text file
    Generate {
        /// Input text file, or "-" for stdin
        #[arg(short, long)]
        input: PathBuf,

        /// Presentation topic
        #[arg(short, long)]
        topic: String,

        /// Target audience
        #[arg(short, long, default_value = "General audience")]
        audience: String,

        /// professional, casual, academic or persuasive
        #[arg(long, default_value = "professional")]
        tone: Tone,

        /// general, english, urdu, science, biology, physics, medical, it or engineering
        #[arg(long, default_value = "general")]
        subject: Subject,

        /// Desired number of slides (3-100)
        #[arg(short, long)]
        slides: Option<u32>,

        /// Skip icon, emoji and image suggestions
        #[arg(long)]
        no_visuals: bool,

        /// Split the input into chunks even when it is short
        #[arg(long)]
        chunking: bool,

        /// AI provider (overrides config)
        #[arg(short, long)]
        provider: Option<CliProvider>,

        /// Print the client-facing JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },

    /// Generate timed speaker scripts for a saved deck
    Script {
        deck_id: DeckId,

        /// Total presentation length in minutes
        #[arg(short, long)]
        minutes: f64,

        /// Script the deck in slide groups
        #[arg(long, conflicts_with = "single")]
        chunked: bool,

        /// Script the whole deck in one call
        #[arg(long)]
        single: bool,

        /// AI provider (overrides config)
        #[arg(short, long)]
        provider: Option<CliProvider>,

        #[arg(long)]
        json: bool,
    },

    /// Show a saved deck and its scripts
    Show {
        deck_id: DeckId,

        #[arg(long)]
        json: bool,
    },

    /// List saved decks
    List,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "slidewright=debug,slidewright_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Mirror pipeline events onto the spinner until the pipeline is dropped.
async fn render_progress(mut events: events::EventReceiver, spinner: ProgressBar) {
    let mut finished = 0;
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::ChunksPlanned { total, words, .. } => spinner.set_message(format!(
                "Generating slides: {} words in {} chunk(s)...",
                words, total
            )),
            PipelineEvent::ChunkStarted {
                index,
                total,
                attempt,
            } if attempt > 1 => spinner.set_message(format!(
                "Retrying chunk {}/{} (attempt {})...",
                index + 1,
                total,
                attempt
            )),
            PipelineEvent::ChunkSucceeded { total, .. } => {
                finished += 1;
                spinner.set_message(format!("Generating slides: {}/{} chunks done...", finished, total));
            }
            PipelineEvent::ChunkFailed {
                index,
                total,
                reason,
            } => {
                finished += 1;
                spinner.println(format!(
                    "{} Chunk {}/{} failed: {}",
                    style("!").yellow().bold(),
                    index + 1,
                    total,
                    reason
                ));
            }
            PipelineEvent::ScriptGroupsPlanned { groups, slides } => spinner.set_message(format!(
                "Writing scripts: {} slides in {} group(s)...",
                slides, groups
            )),
            PipelineEvent::ScriptGroupCompleted {
                group,
                total,
                fallback,
            } => {
                finished += 1;
                if fallback {
                    spinner.println(format!(
                        "{} Script group {}/{} used fallback scripts",
                        style("!").yellow().bold(),
                        group + 1,
                        total
                    ));
                }
                spinner.set_message(format!("Writing scripts: {}/{} groups done...", finished, total));
            }
            PipelineEvent::ChunkStarted { .. } | PipelineEvent::DeckAssembled { .. } => {}
        }
    }
}

fn load_config(cli_config: Option<PathBuf>, provider: Option<CliProvider>) -> Result<PipelineConfig> {
    let path = cli_config.unwrap_or_else(default_config_path);
    let mut config = PipelineConfig::load_or_default(&path)?.with_env_overrides()?;
    if let Some(provider) = provider {
        config.generation.provider = provider.into();
    }
    debug!(path = %path.display(), provider = %config.generation.provider, "configuration loaded");
    Ok(config)
}

fn build_pipeline(config: PipelineConfig) -> Pipeline {
    let provider = config.generation.provider;

    // Validate API key early
    let backend = match ChatCompletionsClient::new(&config.generation) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("{} {} ({})", style("Error:").red().bold(), e, provider.name());
            std::process::exit(1);
        }
    };
    let client = GenerationClient::new(Arc::new(backend), config.generation.clone());
    Pipeline::new(client, config)
}

async fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut body = String::new();
        tokio::io::stdin().read_to_string(&mut body).await?;
        Ok(body)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("{} {}", style("!").yellow().bold(), warning);
    }
}

fn print_banner(subtitle: &str) {
    println!(
        "\n{}  {}\n",
        style("slidewright").cyan().bold(),
        style(subtitle).dim()
    );
}

async fn run_generate(
    store: &FsDeckStore,
    config: PipelineConfig,
    input: RawInput,
    json: bool,
) -> Result<()> {
    let provider = config.generation.provider;
    let (sender, receiver) = events::channel();
    let pipeline = build_pipeline(config).with_events(sender);

    if !json {
        print_banner("Slide Deck Generator");
    }
    let start = Instant::now();
    let spinner = create_spinner(&format!("Generating slides with {}...", provider.name()));
    let progress = tokio::spawn(render_progress(receiver, spinner.clone()));

    let result = pipeline.generate_deck(&input).await;
    drop(pipeline);
    let _ = progress.await;

    let outcome: DeckOutcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };
    let id = store.save_deck(&outcome.deck).await?;

    spinner.finish_with_message(format!(
        "{} Generated {} slides ({}) {}",
        style("✓").green().bold(),
        outcome.deck.len(),
        provider.name(),
        style(format!("[{}]", format_duration(start.elapsed()))).dim()
    ));

    if json {
        let mut value = serde_json::to_value(outcome.response())?;
        value["id"] = serde_json::Value::String(id.to_string());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("\n{} {}\n", style("Deck id:").dim(), style(id).cyan().bold());
    println!("{}", style("─".repeat(60)).dim());
    println!("{}", format_deck_readable(&outcome.deck));

    for degraded in &outcome.degraded {
        println!("{} {}", style("!").yellow().bold(), degraded);
    }
    print_warnings(&outcome.warnings);
    Ok(())
}

async fn run_script(
    store: &FsDeckStore,
    config: PipelineConfig,
    deck_id: DeckId,
    minutes: f64,
    chunk_mode: Option<bool>,
    json: bool,
) -> Result<()> {
    let deck = store.load_deck(&deck_id).await?;
    let chunk_mode = chunk_mode.unwrap_or_else(|| auto_chunk_mode(&deck, &config.scripts));
    let provider = config.generation.provider;
    let (sender, receiver) = events::channel();
    let pipeline = build_pipeline(config).with_events(sender);

    if !json {
        print_banner("Speaker Script Writer");
    }
    let start = Instant::now();
    let spinner = create_spinner(&format!(
        "Writing scripts for {} slides with {}...",
        deck.len(),
        provider.name()
    ));
    let progress = tokio::spawn(render_progress(receiver, spinner.clone()));

    let result = pipeline.generate_scripts(&deck, minutes, chunk_mode).await;
    drop(pipeline);
    let _ = progress.await;

    let scripts = match result {
        Ok(scripts) => scripts,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };
    store.save_scripts(&deck_id, &scripts).await?;

    spinner.finish_with_message(format!(
        "{} Scripts written for {} slides {}",
        style("✓").green().bold(),
        scripts.scripts.len(),
        style(format!("[{}]", format_duration(start.elapsed()))).dim()
    ));

    if json {
        println!("{}", serde_json::to_string_pretty(&scripts)?);
        return Ok(());
    }

    println!("{}", style("─".repeat(60)).dim());
    println!("{}", format_scripts_readable(&deck, &scripts));
    print_warnings(&scripts.warnings);
    Ok(())
}

async fn run_show(store: &FsDeckStore, deck_id: DeckId, json: bool) -> Result<()> {
    let deck = store.load_deck(&deck_id).await?;
    let scripts = match store.load_scripts(&deck_id).await {
        Ok(scripts) => Some(scripts),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    if json {
        let value = serde_json::json!({
            "id": deck_id.to_string(),
            "deck": deck,
            "scripts": scripts,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", format_deck_readable(&deck));
    if let Some(scripts) = scripts {
        println!("{}", style("─".repeat(60)).dim());
        println!("{}", format_scripts_readable(&deck, &scripts));
    }
    Ok(())
}

async fn run_list(store: &FsDeckStore) -> Result<()> {
    let decks = store.list_decks().await?;
    if decks.is_empty() {
        println!(
            "{} No saved decks in {}",
            style("·").dim(),
            style(store.root().display()).cyan()
        );
        return Ok(());
    }

    for deck in decks {
        let scripts = if deck.has_scripts {
            style("scripts").green()
        } else {
            style("no scripts").dim()
        };
        println!(
            "{}  {} {} {}",
            style(deck.id).cyan(),
            deck.title,
            style(format!("({} slides)", deck.slides)).dim(),
            scripts
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = FsDeckStore::new(cli.data_dir.clone().unwrap_or_else(default_store_dir));

    match cli.command {
        Command::Generate {
            input,
            topic,
            audience,
            tone,
            subject,
            slides,
            no_visuals,
            chunking,
            provider,
            json,
        } => {
            let config = load_config(cli.config, provider)?;
            let body = read_input(&input).await?;
            let raw = RawInput {
                topic,
                body,
                audience,
                tone,
                subject,
                slide_target: slides,
                visuals: !no_visuals,
                chunking,
            };
            run_generate(&store, config, raw, json).await
        }
        Command::Script {
            deck_id,
            minutes,
            chunked,
            single,
            provider,
            json,
        } => {
            let config = load_config(cli.config, provider)?;
            let chunk_mode = match (chunked, single) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            run_script(&store, config, deck_id, minutes, chunk_mode, json).await
        }
        Command::Show { deck_id, json } => run_show(&store, deck_id, json).await,
        Command::List => run_list(&store).await,
    }
}
