//! Thin CLI front-end for `media_engine`: parses flags into a `RunConfig`,
//! wires a terminal `PromptResponder`, prints the typed event stream, and
//! reports the final `RunSummary`. All conversion logic lives in the core;
//! this binary only translates between the terminal and that API, the way
//! the teacher's per-format binaries translated flags into `ConversionConfig`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::Level;

use media_engine::config::RunConfig;
use media_engine::events::{EngineEvent, EventSink, NonInteractiveResponder, PipelinePhase, PromptResponder};
use media_engine::types::RunMode;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::modern_ui::{format_size, print_error, print_info, print_result_box, print_stage, print_success, print_warning};

#[derive(Parser)]
#[command(name = "mfb")]
#[command(version, about = "Batch JPEG XL / AVIF / MOV conversion engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory and convert every eligible file in place (or into
    /// a mirrored output tree).
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "auto-plus")]
        mode: ModeArg,

        #[arg(long, default_value_t = true)]
        in_place: bool,

        #[arg(short, long)]
        interactive: bool,

        #[arg(short, long)]
        concurrency: Option<usize>,

        #[arg(long)]
        skip_existing: bool,

        #[arg(long)]
        dry_run: bool,

        #[arg(long, default_value_t = 2)]
        retries: u32,

        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long)]
        keep_backups: bool,

        #[arg(long)]
        checkpoint_path: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Probe external tools (ffmpeg/ffprobe/cjxl/djxl/avifenc) and report
    /// what's available without converting anything.
    Doctor,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    #[value(name = "auto-plus")]
    AutoPlus,
    Quality,
    Emoji,
}

impl From<ModeArg> for RunMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::AutoPlus => RunMode::AutoPlus,
            ModeArg::Quality => RunMode::Quality,
            ModeArg::Emoji => RunMode::Emoji,
        }
    }
}

/// Answers `UserPrompt` events on the real terminal: print the question,
/// read a line, fall back to the default if stdin is closed or empty.
struct TerminalResponder;

impl PromptResponder for TerminalResponder {
    fn respond(&self, choices: &[String], default_choice: &str, _countdown: Duration) -> String {
        eprintln!("choices: {} (default: {default_choice})", choices.join(", "));
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(n) if n > 0 => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    default_choice.to_string()
                } else {
                    trimmed.to_string()
                }
            }
            _ => default_choice.to_string(),
        }
    }
}

fn phase_label(phase: &PipelinePhase) -> &'static str {
    match phase {
        PipelinePhase::Classify => "classify",
        PipelinePhase::Extract => "extract",
        PipelinePhase::Plan => "plan",
        PipelinePhase::Execute => "execute",
        PipelinePhase::Validate => "validate",
        PipelinePhase::Migrate => "migrate",
        PipelinePhase::Replace => "replace",
    }
}

/// Drains the engine's event channel on its own thread and renders each
/// event with the teacher's terminal color helpers.
fn spawn_event_printer(rx: std::sync::mpsc::Receiver<EngineEvent>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            match event {
                EngineEvent::FileStart { path } => {
                    print_info(&format!("{}", path.display()));
                }
                EngineEvent::FileComplete { path, original_size, new_size } => {
                    print_success(&format!(
                        "{} ({} -> {})",
                        path.display(),
                        format_size(original_size),
                        format_size(new_size)
                    ));
                }
                EngineEvent::FileFailed { path, reason, attempts } => {
                    print_error(&format!("{} failed after {attempts} attempt(s): {reason}", path.display()));
                }
                EngineEvent::FileSkipped { path, reason } => {
                    print_warning(&format!("{} skipped: {reason}", path.display()));
                }
                EngineEvent::PhaseChange { path, phase } => {
                    print_stage(phase_label(&phase), &format!("{}: {}", phase_label(&phase), path.display()));
                }
                EngineEvent::UserPrompt { .. } => {
                    // the gate/supervisor answer this directly via the
                    // PromptResponder passed to `run`; nothing to render here.
                }
                EngineEvent::MemoryPressure { level, worker_count } => {
                    print_warning(&format!("memory pressure {level}, worker target now {worker_count}"));
                }
                EngineEvent::ProcessHung { path, command } => {
                    print_error(&format!("{} hung running `{command}`", path.display()));
                }
            }
        }
    })
}

fn run_command(args: Commands) -> anyhow::Result<()> {
    match args {
        Commands::Doctor => {
            let probe = media_engine::tool_probe::probe(&HashMap::new())?;
            for (name, info) in &probe.tools {
                if info.available {
                    print_success(&format!(
                        "{name}: {} {}",
                        info.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
                        if info.capabilities.is_empty() { String::new() } else { format!("[{}]", info.capabilities.join(", ")) }
                    ));
                } else {
                    print_warning(&format!("{name}: not found"));
                }
            }
            Ok(())
        }
        Commands::Run {
            input,
            output,
            mode,
            in_place,
            interactive,
            concurrency,
            skip_existing,
            dry_run,
            retries,
            timeout,
            keep_backups,
            checkpoint_path,
            verbose: _,
        } => {
            let target_dir = input.canonicalize().unwrap_or(input);
            let config = RunConfig {
                target_dir,
                output_dir: output,
                mode: mode.into(),
                in_place,
                interactive,
                concurrency_override: concurrency,
                skip_existing,
                dry_run,
                retries,
                timeout_override: timeout,
                format_overrides: HashMap::new(),
                tool_paths: HashMap::new(),
                keep_backups,
                checkpoint_path: checkpoint_path.unwrap_or_else(default_checkpoint_path),
                flush_every_n: 10,
            };
            config.validate()?;

            let responder: Box<dyn PromptResponder> = if interactive {
                Box::new(TerminalResponder)
            } else {
                Box::new(NonInteractiveResponder)
            };

            print_stage("run", &format!("scanning {}", config.target_dir.display()));
            let (sink, rx) = EventSink::new();
            let printer = spawn_event_printer(rx);
            let summary = media_engine::run(config, responder.as_ref(), sink)?;
            // every sender clone lives inside `run`; once it returns they're
            // all dropped, `rx.recv()` starts failing, and the thread exits.
            let _ = printer.join();

            print_result_box(
                "run summary",
                &[
                    &format!("session:   {}", summary.session_id),
                    &format!("total:     {}", summary.total),
                    &format!("succeeded: {}", summary.succeeded),
                    &format!("failed:    {}", summary.failed),
                    &format!("skipped:   {}", summary.skipped),
                    &format!(
                        "bytes:     {} -> {}",
                        format_size(summary.bytes_before),
                        format_size(summary.bytes_after)
                    ),
                ],
            );
            Ok(())
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".modern_format_boost")
        .join("sessions.db")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        log_dir: std::env::temp_dir(),
        level: Level::INFO,
        ..LogConfig::default()
    };
    if let Err(e) = init_logging("mfb", log_config) {
        eprintln!("warning: failed to initialize file logging: {e}");
    }

    run_command(cli.command)
}
