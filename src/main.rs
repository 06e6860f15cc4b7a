//! Vocabulary Builder
//!
//! Builds an English vocabulary dataset translated into a target language,
//! enriched with dictionary details, and serves it over a CLI and a JSON API
//! with Anki flashcard export.

mod config;
mod dataset;
mod dictionary;
mod error;
mod events;
mod export;
mod pipeline;
mod pos;
mod query;
mod retry;
mod source;
mod translator;
mod web;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use dataset::{DatasetStore, WordRecord};
use events::PipelineEvent;
use pipeline::{Pipeline, RunRequest, RunStatus};
use query::{QueryService, WordQuery, DEFAULT_PER_PAGE};
use std::path::PathBuf;
use terminal_size::{terminal_size, Width};
use tokio::sync::{broadcast, watch};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "vocab-builder", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Download, translate and enrich the word list, then save the dataset
    Run {
        /// Target language code (defaults to TARGET_LANGUAGE)
        #[arg(long)]
        language: Option<String>,
        /// Skip dictionary enrichment; store only word and translation
        #[arg(long)]
        no_details: bool,
        /// Cap on distinct words (0 = unbounded)
        #[arg(long)]
        max_words: Option<usize>,
        /// Keep the stored dataset if it is already translated
        #[arg(long)]
        reuse_existing: bool,
    },
    /// Serve the JSON API
    Serve,
    /// Show dataset totals
    Stats,
    /// List words with optional search and type filter
    Words {
        #[arg(long)]
        search: Option<String>,
        #[arg(long = "type")]
        word_type: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Show one word
    Word { word: String },
    /// Random words for today's review
    Daily {
        #[arg(long, default_value_t = 50)]
        count: usize,
    },
    /// Export the dataset as an Anki package
    Export {
        #[arg(long, default_value = export::DEFAULT_DECK_NAME)]
        deck_name: String,
        #[arg(long, default_value = "vocab_deck.apkg")]
        output: PathBuf,
    },
    /// Export the dataset as a {"words": [...]} JSON document
    ExportJson {
        /// Defaults to <data dir>/words_translated.json
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List supported target languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging - use RUST_LOG env var, defaulting to info level
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vocab_builder=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    let store = DatasetStore::new(&config.vocab_file);

    match cli.cmd {
        Cmd::Run {
            language,
            no_details,
            max_words,
            reuse_existing,
        } => {
            let request = RunRequest {
                target_language: language.unwrap_or_else(|| config.target_language.clone()),
                include_details: !no_details,
                max_words,
                existing: None,
            };
            run_pipeline(&config, &store, request, reuse_existing).await?
        }
        Cmd::Serve => {
            print_banner("Vocabulary Builder", "JSON API server");
            let shutdown = shutdown_on_ctrl_c();
            let pipeline = Pipeline::from_config(&config)?.with_shutdown(shutdown.clone());
            web::run_server(&config, pipeline, shutdown).await?
        }
        Cmd::Stats => {
            let stats = QueryService::new(store).stats()?;
            println!("{} {}", "Total words:".bright_yellow(), stats.total_words);
            println!("{} {}", "Translated:".bright_yellow(), stats.translated_words);
            if !stats.vocab_file_exists {
                println!(
                    "{}",
                    "No dataset yet. Run `vocab-builder run` first.".bright_red()
                );
            }
        }
        Cmd::Words {
            search,
            word_type,
            page,
            per_page,
        } => {
            let result = QueryService::new(store).words(&WordQuery {
                search,
                word_type,
                page,
                per_page,
            })?;
            for record in &result.words {
                print_record_line(record);
            }
            println!(
                "\n{}",
                format!(
                    "Page {}/{} ({} matching words)",
                    result.page, result.total_pages, result.total
                )
                .bright_black()
            );
        }
        Cmd::Word { word } => {
            let record = QueryService::new(store).word(&word)?;
            print_record_details(&record);
        }
        Cmd::Daily { count } => {
            let words = QueryService::new(store).daily(count)?;
            println!(
                "{} {}\n",
                "Daily words for".bright_yellow(),
                chrono::Local::now().format("%Y-%m-%d").to_string().bright_green()
            );
            for record in &words {
                print_record_line(record);
            }
        }
        Cmd::Export { deck_name, output } => {
            let dataset = store.load()?;
            let cards = export::export_deck(&dataset, &deck_name, &output)?;
            println!(
                "{} {} ({} cards)",
                "Anki deck created:".bright_green().bold(),
                output.display(),
                cards
            );
            println!("Import {} in Anki to start studying.", output.display());
        }
        Cmd::ExportJson { output } => {
            let output = output.unwrap_or_else(|| config.data_dir.join("words_translated.json"));
            let count = store.export_json(&output)?;
            println!(
                "{} {} ({} words)",
                "JSON written:".bright_green().bold(),
                output.display(),
                count
            );
        }
        Cmd::Languages => {
            for (code, name) in translator::SUPPORTED_LANGUAGES {
                println!("{:<4} {}", code.bright_magenta().bold(), name);
            }
        }
    }

    Ok(())
}

/// Runs the pipeline with live progress output and saves the result.
async fn run_pipeline(
    config: &Config,
    store: &DatasetStore,
    mut request: RunRequest,
    reuse_existing: bool,
) -> Result<()> {
    print_banner(
        "Vocabulary Builder",
        "Translating and enriching English vocabulary",
    );

    if reuse_existing && store.exists() {
        request.existing = Some(store.load()?);
    }

    println!(
        "{} {}",
        "Word source:".bright_yellow(),
        config.word_source.describe().bright_green()
    );
    println!(
        "{} {}\n",
        "Output:".bright_yellow(),
        store.path().display().to_string().bright_green()
    );

    let (event_tx, event_rx) = broadcast::channel(256);
    let printer = tokio::spawn(print_progress(event_rx));

    let pipeline = Pipeline::from_config(config)?
        .with_events(event_tx)
        .with_shutdown(shutdown_on_ctrl_c());

    let result = pipeline.run_and_store(store, request).await;

    // Closing the channel lets the printer drain and exit.
    drop(pipeline);
    let _ = printer.await;

    let report = result?;
    match report.status {
        RunStatus::Skipped => println!(
            "{} {} words already translated, nothing to do",
            "Skipped:".bright_yellow().bold(),
            report.translated
        ),
        RunStatus::Completed => println!(
            "\n{} {}/{} words translated, saved to {}",
            "Done:".bright_green().bold(),
            report.translated,
            report.total,
            store.path().display()
        ),
        RunStatus::Partial if report.saved => println!(
            "\n{} {} of {} words processed, {} translated and saved",
            "Interrupted:".bright_yellow().bold(),
            report.processed,
            report.total,
            report.translated
        ),
        RunStatus::Partial => println!(
            "\n{} no words translated, nothing saved",
            "Interrupted:".bright_red().bold()
        ),
    }

    Ok(())
}

/// Prints pipeline events as they arrive until the channel closes.
async fn print_progress(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::Started(e)) => println!(
                "{} {} words to {}\n",
                "Translating".bright_yellow(),
                e.total,
                e.target_language.to_uppercase().bright_magenta().bold()
            ),
            Ok(PipelineEvent::Progress(e)) => {
                let translation = if e.translation.is_empty() {
                    "(no translation)".bright_red()
                } else {
                    e.translation.bright_green()
                };
                println!(
                    "{} {} {} {}",
                    format!("[{:>5.1}%]", e.percent()).bright_black(),
                    e.word.bright_white().bold(),
                    "→".bright_black(),
                    translation
                );
            }
            Ok(PipelineEvent::BatchPause(e)) => println!(
                "{}",
                format!("  pausing {}ms after {} words", e.pause_ms, e.processed).bright_black()
            ),
            Ok(PipelineEvent::Finished(e)) => info!(
                "Finished: {}/{} processed, {} translated",
                e.processed, e.total, e.translated
            ),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Flips the returned flag to `true` on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, stopping after the current word");
            let _ = tx.send(true);
        }
    });
    rx
}

fn print_record_line(record: &WordRecord) {
    let word_type = if record.word_type.is_empty() {
        String::new()
    } else {
        format!("({})", record.word_type)
    };
    println!(
        "{:<20} {:<24} {}",
        record.word.bright_white().bold(),
        record.translation.bright_green(),
        word_type.bright_black()
    );
}

fn print_record_details(record: &WordRecord) {
    println!("{}", record.word.bright_cyan().bold());
    if !record.pronunciation.is_empty() {
        println!("  {}", record.pronunciation);
    }
    if !record.word_type.is_empty() {
        println!("  {}", record.word_type.italic());
    }
    println!("  {} {}", "Translation:".bright_yellow(), record.translation.bright_green());
    if !record.definition.is_empty() {
        println!("  {} {}", "Definition:".bright_yellow(), record.definition);
    }
    for example in &record.examples {
        println!("  {} {}", "•".bright_black(), example);
    }
}

/// Prints a header box that fits the terminal width.
fn print_banner(title: &str, subtitle: &str) {
    let term_width = terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(80)
        .saturating_sub(1);
    let inner_width = term_width.saturating_sub(2); // Account for box borders

    let top_border = format!("╔{}╗", "═".repeat(inner_width));
    let bottom_border = format!("╚{}╝", "═".repeat(inner_width));

    println!("\n{}", top_border.bright_cyan().bold());
    for text in [title, subtitle] {
        println!("{}", centered_line(text, inner_width).bright_cyan().bold());
    }
    println!("{}\n", bottom_border.bright_cyan().bold());
}

fn centered_line(text: &str, inner_width: usize) -> String {
    let len = text.chars().count();
    let padding = inner_width.saturating_sub(len) / 2;
    format!(
        "║{}{}{: <width$}║",
        " ".repeat(padding),
        text,
        "",
        width = inner_width.saturating_sub(padding + len)
    )
}
