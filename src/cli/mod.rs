//! Command-line interface for promptchain.
//!
//! Provides commands for scheduling events from text, asking the other
//! assistant modes, and inspecting the resolved configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{
    ActionBackend, CompletionProvider, DryRunBackend, GoogleCalendarBackend, KnowledgeBase,
    OpenAiProvider, OpenMeteoClient,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    Assistant, AssistantError, KnowledgeBaseTool, Mode, Orchestrator, Tool, ToolAgent,
    ToolRegistry, WeatherTool,
};
use crate::domain::PipelineOutcome;

/// promptchain - Gated LLM prompt chain for calendar scheduling
#[derive(Parser, Debug)]
#[command(name = "promptchain")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .promptchain/config.yaml discovery)
    #[arg(short, long, global = true, env = "PROMPTCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn a text request into a calendar event
    Schedule {
        /// Request text (reads from stdin if not provided)
        text: Option<String>,

        /// Read input from stdin
        #[arg(long)]
        stdin: bool,

        /// Reference date for relative dates (YYYY-MM-DD, default: today)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Do not contact the calendar
        #[arg(long)]
        dry_run: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question in one of the assistant modes
    Ask {
        /// Mode (qa, data-analysis, calendar, weather, kb)
        #[arg(short, long, default_value = "qa")]
        mode: Mode,

        /// Prompt text (reads from stdin if not provided)
        prompt: Option<String>,

        /// Read input from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// List available modes
    Modes,

    /// Show resolved configuration
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        match self.command {
            Commands::Modes => {
                list_modes();
                Ok(ExitCode::SUCCESS)
            }
            Commands::Config => {
                let cfg = config::load_config_from(self.config.as_deref())?;
                println!("{}", cfg.describe());
                Ok(ExitCode::SUCCESS)
            }
            Commands::Schedule {
                text,
                stdin,
                today,
                dry_run,
                json,
            } => {
                let cfg = config::load_config_from(self.config.as_deref())?;
                let input = read_input(text, stdin)?;
                schedule(&cfg, &input, today, dry_run, json).await
            }
            Commands::Ask {
                mode,
                prompt,
                stdin,
            } => {
                let cfg = config::load_config_from(self.config.as_deref())?;
                let input = read_input(prompt, stdin)?;
                ask(&cfg, mode, &input).await
            }
        }
    }
}

/// Exit status reported for each outcome
pub fn exit_code(outcome: &PipelineOutcome) -> u8 {
    match outcome {
        PipelineOutcome::Confirmed(_) => 0,
        PipelineOutcome::NotAnEvent => 2,
        PipelineOutcome::ActionFailed { .. } => 3,
        PipelineOutcome::Indeterminate { .. } => 4,
    }
}

fn read_input(arg: Option<String>, use_stdin: bool) -> Result<String> {
    if let Some(text) = arg {
        if !use_stdin {
            return Ok(text);
        }
    }

    if use_stdin || !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        return Ok(buffer);
    }

    anyhow::bail!("No input provided. Pass the text as an argument or pipe it to stdin");
}

fn build_provider(cfg: &ResolvedConfig) -> Result<Arc<dyn CompletionProvider>> {
    if cfg.llm.api_key.is_empty() {
        warn!("No LLM API key configured (set LLM_API_KEY)");
    }
    let provider = OpenAiProvider::new(cfg.llm.clone())?;
    Ok(Arc::new(provider))
}

fn build_orchestrator(
    cfg: &ResolvedConfig,
    provider: Arc<dyn CompletionProvider>,
    dry_run: bool,
) -> Result<Orchestrator> {
    let backend: Arc<dyn ActionBackend> = if dry_run {
        info!("Dry run: the calendar will not be contacted");
        Arc::new(DryRunBackend)
    } else {
        Arc::new(GoogleCalendarBackend::new(cfg.calendar.clone())?)
    };

    Orchestrator::new(provider, backend, cfg.pipeline.clone())
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });
}

async fn schedule(
    cfg: &ResolvedConfig,
    input: &str,
    today: Option<NaiveDate>,
    dry_run: bool,
    json: bool,
) -> Result<ExitCode> {
    let provider = build_provider(cfg)?;
    let orchestrator = build_orchestrator(cfg, provider, dry_run)?;
    let today = today.unwrap_or_else(|| orchestrator.today());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match orchestrator.run_with_cancel(input, today, &cancel).await {
        Ok(run) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&run.outcome)?);
            } else {
                println!("{}", run.outcome.user_message());
                if let PipelineOutcome::Confirmed(ref confirmation) = run.outcome {
                    if let Some(ref link) = confirmation.reference_link {
                        println!("{}", link);
                    }
                }
            }
            eprintln!("\n[Run {} finished: {}]", run.trace.run_id, run.outcome.label());
            Ok(ExitCode::from(exit_code(&run.outcome)))
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            eprintln!("\n[Run failed: {}]", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn build_assistant(cfg: &ResolvedConfig, mode: Mode) -> Result<Assistant> {
    let provider = build_provider(cfg)?;
    let limits = cfg.pipeline.safety_limits.clone();
    let model = cfg.pipeline.model.clone();

    let mut assistant = Assistant::new(provider.clone(), model.clone(), limits.clone());

    match mode {
        Mode::Calendar => {
            assistant = assistant.with_calendar(build_orchestrator(cfg, provider, false)?);
        }
        Mode::Weather => {
            let client = OpenMeteoClient::new(cfg.weather.clone())?;
            let registry = ToolRegistry::new().with(Tool::Weather(WeatherTool::new(client)));
            assistant =
                assistant.with_weather(ToolAgent::new(provider, registry, model, &limits));
        }
        Mode::KnowledgeBase => {
            let path = cfg
                .knowledge_base
                .as_ref()
                .context("No knowledge_base file configured")?;
            let kb = KnowledgeBase::load(path).await?;
            let registry = ToolRegistry::new()
                .with(Tool::KnowledgeBase(KnowledgeBaseTool::new(Arc::new(kb))));
            assistant =
                assistant.with_knowledge_base(ToolAgent::new(provider, registry, model, &limits));
        }
        Mode::Qa | Mode::DataAnalysis => {}
    }

    Ok(assistant)
}

async fn ask(cfg: &ResolvedConfig, mode: Mode, prompt: &str) -> Result<ExitCode> {
    let assistant = build_assistant(cfg, mode).await?;

    match assistant.ask(mode, prompt).await {
        Ok(reply) => {
            println!("{}", reply.message());
            Ok(ExitCode::SUCCESS)
        }
        Err(AssistantError::Pipeline(e)) => {
            eprintln!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn list_modes() {
    println!("{:<16} NAME", "ID");
    for mode in Mode::ALL {
        println!("{:<16} {}", mode.id(), mode.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventConfirmation;

    #[test]
    fn test_exit_codes_are_distinct() {
        let outcomes = [
            PipelineOutcome::Confirmed(EventConfirmation {
                message: "ok".to_string(),
                reference_link: None,
            }),
            PipelineOutcome::NotAnEvent,
            PipelineOutcome::ActionFailed {
                reason: "403".to_string(),
            },
            PipelineOutcome::Indeterminate {
                reason: "timeout".to_string(),
            },
        ];

        let codes: Vec<u8> = outcomes.iter().map(exit_code).collect();
        assert_eq!(codes, vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "promptchain",
            "schedule",
            "Lunch with bob@example.com tomorrow",
            "--today",
            "2025-07-03",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Schedule {
                text,
                today,
                dry_run,
                ..
            } => {
                assert_eq!(text.as_deref(), Some("Lunch with bob@example.com tomorrow"));
                assert_eq!(today, NaiveDate::from_ymd_opt(2025, 7, 3));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_mode_parsing() {
        let cli = Cli::try_parse_from(["promptchain", "ask", "--mode", "Data Analysis", "x"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ask {
                mode: Mode::DataAnalysis,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["promptchain", "ask", "--mode", "poetry", "x"]).is_err());
    }
}
