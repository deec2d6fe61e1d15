use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use client::{AnalysisApi, HttpApi};
use pipeline::{PipelineRunner, RunOutcome};

mod chat;
mod client;
mod config;
mod flight;
mod logging;
mod overall;
mod pipeline;
mod report;
mod reqwest_simd_json;
#[cfg(test)]
mod testing;
mod tui;
mod types;
mod urls;
mod utils;

#[derive(Parser)]
#[command(name = "vocscope")]
#[command(version)]
#[command(about = "Terminal client for the voice-of-customer sentiment service")]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Base URL of the analysis API (/overall, /chat, /urls)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Base URL of the ingestion pipeline API
    #[arg(long, global = true)]
    pipeline_url: Option<String>,

    /// Locale for number formatting (en, de, fr, es, it, ja, ko, zh)
    #[arg(long, global = true)]
    locale: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the overall report and print it
    Report(ReportArgs),
    /// Send one message to the analysis agent
    Chat(ChatArgs),
    /// Submit URLs for sentiment analysis
    Submit(SubmitArgs),
    /// Run scrape, index creation and ingestion in order
    Pipeline,
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// Print the raw report as JSON instead of formatted sections
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct ChatArgs {
    /// Message text
    message: String,

    /// Continue an existing thread
    #[arg(long)]
    thread: Option<String>,
}

#[derive(Args)]
struct SubmitArgs {
    /// URLs to submit
    #[arg(required = true)]
    urls: Vec<String>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key (api-url, pipeline-url, research-url, timeout-seconds, settle-delay-ms, max-input-rows, number-comma, locale)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init() {
        eprintln!("Error setting up logging: {e:#}");
        std::process::exit(1);
    }

    // Load config file to get defaults, then apply CLI overrides
    let mut config = load_config();
    if let Some(url) = cli.api_url {
        config.server.api_url = url;
    }
    if let Some(url) = cli.pipeline_url {
        config.server.pipeline_url = url;
    }
    if let Some(locale) = cli.locale {
        config.formatting.locale = locale;
    }

    if let Err(e) = run_command(&config, cli.command).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// A broken config file is reported, not fatal.
fn load_config() -> config::Config {
    match config::Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("{e:#}; using default settings");
            config::Config::default()
        }
    }
}

async fn run_command(config: &config::Config, command: Option<Commands>) -> Result<()> {
    match command {
        None => tui::run(connect(config)?, config)
            .await
            .context("Error displaying TUI"),
        Some(Commands::Report(args)) => run_report(connect(config)?, config, args).await,
        Some(Commands::Chat(args)) => run_chat(connect(config)?, args).await,
        Some(Commands::Submit(args)) => run_submit(connect(config)?, args).await,
        Some(Commands::Pipeline) => run_pipeline(connect(config)?).await,
        Some(Commands::Config(config_args)) => {
            handle_config_subcommand(config_args);
            Ok(())
        }
    }
}

fn connect(config: &config::Config) -> Result<Arc<dyn AnalysisApi>> {
    Ok(Arc::new(HttpApi::new(config)?))
}

fn terminal_width() -> u16 {
    crossterm::terminal::size().map(|(w, _)| w).unwrap_or(80)
}

async fn run_report(api: Arc<dyn AnalysisApi>, config: &config::Config, args: ReportArgs) -> Result<()> {
    let overall = overall::OverallController::new(api);
    overall.fetch(true).await;

    let state = overall.state();
    if let Some(error) = &state.error {
        bail!("Failed to fetch report: {error}");
    }
    let Some(data) = &state.report else {
        bail!("No report returned");
    };

    if args.json {
        let json = simd_json::to_string_pretty(data)?;
        println!("{json}");
        return Ok(());
    }

    let sections = state.sections(&config.number_format());
    if sections.is_empty() {
        println!("No report data.");
        return Ok(());
    }
    let lines = report::render::sections_to_lines(&sections, terminal_width());
    let styled = std::io::stdout().is_terminal();
    let mut out = std::io::stdout().lock();
    report::render::write_lines(&mut out, &lines, styled)?;
    out.flush()?;
    Ok(())
}

async fn run_chat(api: Arc<dyn AnalysisApi>, args: ChatArgs) -> Result<()> {
    let controller = chat::ChatController::new(api);
    controller.state().thread_id = args.thread;
    if controller.send(&args.message).await.is_none() {
        bail!("Nothing to send");
    }

    let state = controller.state();
    let styled = std::io::stdout().is_terminal();
    let mut out = std::io::stdout().lock();
    report::render::write_lines(&mut out, &tui::chat_lines(&state), styled)?;
    if state.thread_id.is_some() {
        writeln!(out, "{}", state.thread_label())?;
    }
    out.flush()?;

    if state.last_error.is_some() {
        bail!("Chat request failed");
    }
    Ok(())
}

async fn run_submit(api: Arc<dyn AnalysisApi>, args: SubmitArgs) -> Result<()> {
    let controller = urls::UrlController::new(api);
    controller.state().set_input(args.urls.join("\n"));
    let submitted = urls::parse_urls(&controller.state().input);

    if controller.submit().await.is_none() {
        bail!("No URLs to submit");
    }

    let state = controller.state();
    match &state.status {
        urls::SubmitStatus::Submitted(message) => {
            for url in &submitted {
                println!("  • {}", urls::short_url(url));
            }
            println!("{message}");
            Ok(())
        }
        urls::SubmitStatus::Failed(message) => Err(anyhow!("Submit failed: {message}")),
        urls::SubmitStatus::Idle => Err(anyhow!("Submit did not complete")),
    }
}

async fn run_pipeline(api: Arc<dyn AnalysisApi>) -> Result<()> {
    // Nothing to navigate to outside the TUI, so no settling delay.
    let runner = PipelineRunner::new(api, Duration::ZERO);
    let outcome = runner
        .run(
            |stage| {
                if let Some(status) = stage.status_text() {
                    println!("[{:>3}%] {status}", stage.progress_percent());
                }
            },
            |_| {},
        )
        .await;

    match outcome {
        Some(RunOutcome::Completed) => Ok(()),
        Some(RunOutcome::Failed { stage, message }) => {
            Err(anyhow!("{} stage failed: {message}", stage.step_label()))
        }
        Some(RunOutcome::Cancelled) => Err(anyhow!("Pipeline run was cancelled")),
        None => Err(anyhow!("A pipeline run is already in progress")),
    }
}

fn handle_config_subcommand(config_args: ConfigArgs) {
    match config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => {
            if let Err(e) = config::create_default_config(overwrite) {
                eprintln!("Error creating config: {e}");
                std::process::exit(1);
            }
        }
        ConfigSubcommands::Show => {
            if let Err(e) = config::show_config() {
                eprintln!("Error showing config: {e}");
                std::process::exit(1);
            }
        }
        ConfigSubcommands::Set { key, value } => {
            if let Err(e) = config::set_config_value(&key, &value) {
                eprintln!("Error setting config: {e}");
                std::process::exit(1);
            }
        }
    }
}
