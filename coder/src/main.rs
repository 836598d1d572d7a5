//! Self-correcting code generation CLI.
//!
//! `coder run <TASK>` drives one generate → verify → review → execute cycle
//! against the configured model and prints the resulting artifact.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use coder::cancel::CancelSignal;
use coder::cycle::{CycleController, CycleRequest};
use coder::exit_codes;
use coder::io::completion::OllamaClient;
use coder::io::config::{CoderConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use coder::io::sandbox::InterpreterSandbox;
use coder::report::Report;

#[derive(Parser)]
#[command(
    name = "coder",
    version,
    about = "Generate, verify, review and execute code until it runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cycle for one task and print the final artifact.
    Run {
        /// Natural-language description of the program to write.
        task: String,
        /// Config file (missing file means defaults).
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Override `max_cycles` from the config.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_cycles: Option<u32>,
        /// Print the full report as JSON instead of the bare artifact.
        #[arg(long)]
        json: bool,
    },
    /// Write a default config file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    coder::logging::init();
    let cli = Cli::parse();
    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run {
            task,
            config,
            max_cycles,
            json,
        } => cmd_run(&task, &config, max_cycles, json),
        Command::Init { config, force } => {
            cmd_init(&config, force)?;
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_run(task: &str, config_path: &Path, max_cycles: Option<u32>, json: bool) -> Result<i32> {
    let mut config = load_config(config_path)?;
    if let Some(max_cycles) = max_cycles {
        config.max_cycles = max_cycles;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let report = runtime.block_on(run_task(task, &config))?;

    if json {
        let payload = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{payload}");
    } else {
        if let Some(artifact) = &report.artifact {
            println!("{artifact}");
        }
        eprintln!("{}", report.summary());
    }
    Ok(report.exit_code())
}

async fn run_task(task: &str, config: &CoderConfig) -> Result<Report> {
    let completion = OllamaClient::new(&config.completion)?;
    let sandbox = InterpreterSandbox::from_config(&config.sandbox);
    let controller = CycleController::from_config(completion, sandbox, config);

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, cancelling run");
                on_interrupt.cancel();
            }
            Err(err) => warn!(err = %err, "failed to listen for ctrl-c"),
        }
    });

    info!(
        model = %config.completion.model,
        max_cycles = config.max_cycles,
        "running task"
    );
    let result = controller.run(&CycleRequest::new(task), &cancel).await;
    Ok(Report::from_run(result))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &CoderConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_defaults() {
        let cli = Cli::parse_from(["coder", "run", "print the first ten primes"]);
        match cli.command {
            Command::Run {
                task,
                config,
                max_cycles,
                json,
            } => {
                assert_eq!(task, "print the first ten primes");
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_PATH));
                assert_eq!(max_cycles, None);
                assert!(!json);
            }
            Command::Init { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "coder",
            "run",
            "fizzbuzz",
            "--config",
            "other.toml",
            "--max-cycles",
            "5",
            "--json",
        ]);
        assert!(matches!(
            cli.command,
            Command::Run {
                max_cycles: Some(5),
                json: true,
                ..
            }
        ));
    }

    #[test]
    fn zero_max_cycles_is_rejected() {
        let result = Cli::try_parse_from(["coder", "run", "fizzbuzz", "--max-cycles", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["coder", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("coder.toml");
        cmd_init(&path, false).expect("first init");
        assert!(cmd_init(&path, false).is_err());
        cmd_init(&path, true).expect("forced init");
        assert_eq!(
            load_config(&path).expect("load").max_cycles,
            CoderConfig::default().max_cycles
        );
    }
}
