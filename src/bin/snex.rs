// src/bin/snex.rs

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::FormatTime;

use snex::cli::{Cli, Commands};
use snex::commands::check::check_files;
use snex::commands::common::CommandOptions;
use snex::commands::eval::eval_expression;
use snex::commands::inspect::inspect_file;
use snex::commands::run::run_file;

/// A timer that outputs nothing but still enables span timing calculation
struct NoTimestamp;

impl FormatTime for NoTimestamp {
    fn format_time(&self, _w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        Ok(())
    }
}

fn main() -> ExitCode {
    // Initialize tracing if SNEX_LOG is set
    // SNEX_LOG_STYLE: "compact" (default) or "full" (with timestamps)
    if let Ok(filter) = EnvFilter::try_from_env("SNEX_LOG") {
        let style = std::env::var("SNEX_LOG_STYLE").unwrap_or_default();
        if style == "full" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_timer(NoTimestamp)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .init();
        }
        tracing::debug!("tracing initialized");
    }

    let cli = Cli::parse();
    let options = CommandOptions {
        opt: cli.opt,
        release: cli.release,
        color: cli.color,
    };

    match cli.command {
        Commands::Check { files } => check_files(&files, &options),
        Commands::Run {
            file,
            frames,
            channels,
            mode,
        } => run_file(&file, frames, channels, mode, &options),
        Commands::Eval { expression, input } => eval_expression(&expression, input, &options),
        Commands::Inspect { inspect_type, file } => inspect_file(&file, inspect_type, &options),
    }
}
