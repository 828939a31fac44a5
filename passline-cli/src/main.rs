//! Passline CLI - Command line interface
//!
//! Resolves the codegen pipeline of a target for one configuration and
//! prints it. Options come from an optional JSON file, command line flags
//! override it.

use clap::{ArgAction, Parser, ValueEnum};
use passline_config::{OptLevel, PipelineConfig};
use passline_core::{build_pipeline, target, ConfigurationError, Pipeline, TargetKind};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, error, info, Level};

mod config;
mod logging;

use crate::config::LogConfig;
use crate::logging::LogFormat;

/// Output format of the resolved pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "passline",
    about = "Print the resolved codegen pass pipeline of a target",
    version
)]
struct Cli {
    /// Target whose pipeline is resolved
    #[arg(short, long, default_value = "amdgpu")]
    target: TargetKind,

    /// Optimization level: 0-3, O0-O3 or none/less/default/aggressive
    #[arg(short = 'O', long = "opt-level", value_name = "LEVEL")]
    opt_level: Option<OptLevel>,

    /// JSON file with a pipeline configuration
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Extra stage to mask, may be repeated
    #[arg(long = "disable", value_name = "STAGE")]
    disable: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also explain every candidate stage that was left out
    #[arg(long)]
    explain: bool,

    /// List the target's stage catalogue instead of building
    #[arg(long)]
    list_stages: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log level of the pipeline builder
    #[arg(long, value_name = "LEVEL")]
    log_builder: Option<Level>,

    /// Log level of policy decisions
    #[arg(long, value_name = "LEVEL")]
    log_policy: Option<Level>,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        LogConfig {
            builder: self.log_builder,
            policy: self.log_policy,
            ..LogConfig::from_verbosity(self.verbose)
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("cannot serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_file = cli.log_file.as_deref();
    if let Err(e) = logging::init_with_file(&cli.log_config(), cli.log_format, log_file) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "passline::cli", error = %e, "failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let mut out = io::stdout().lock();

    if cli.list_stages {
        return list_stages(cli, &mut out);
    }

    let config = load_config(cli)?;
    info!(
        target: "passline::cli",
        target_name = %cli.target,
        level = %config.opt_level,
        "building pipeline"
    );
    let pipeline = build_pipeline(cli.target, &config)?;

    match cli.format {
        OutputFormat::Text => {
            write!(out, "{pipeline}")?;
            if cli.explain {
                explain(&pipeline, &mut out)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &pipeline)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Read the options file if any, then apply command line overrides
fn load_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    let mut config = match &cli.options {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(level) = cli.opt_level {
        config.opt_level = level;
    }
    config.disabled.extend(cli.disable.iter().cloned());
    debug!(target: "passline::cli", ?config, "configuration loaded");
    Ok(config)
}

fn read_config(path: &Path) -> Result<PipelineConfig, CliError> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn explain(pipeline: &Pipeline, out: &mut impl Write) -> io::Result<()> {
    if pipeline.skipped().is_empty() {
        return Ok(());
    }
    writeln!(out, "skipped:")?;
    for skip in pipeline.skipped() {
        writeln!(out, "  {} ({}): {}", skip.stage, skip.phase, skip.reason)?;
    }
    Ok(())
}

fn list_stages(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    let target = target(cli.target)?;

    match cli.format {
        OutputFormat::Text => {
            for info in target.registry.iter() {
                let masked = if target.disabled.contains(info.id) {
                    " [disabled]"
                } else {
                    ""
                };
                writeln!(
                    out,
                    "{:<36} {:<8} {:<9} {}{masked}",
                    info.id.name(),
                    info.granularity.to_string(),
                    info.kind.to_string(),
                    info.description
                )?;
            }
        }
        OutputFormat::Json => {
            let stages: Vec<_> = target.registry.iter().collect();
            serde_json::to_writer_pretty(&mut *out, &stages)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
