// src/cli/args.rs

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use snex_sema::OptimizationLevel;

/// Color output mode
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect based on terminal
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Optimization level
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OptLevel {
    /// Only high-level inliners
    None,
    /// Inliners plus constant folding
    Folding,
    /// All optimizations, including loop unrolling
    #[default]
    Full,
}

impl From<OptLevel> for OptimizationLevel {
    fn from(level: OptLevel) -> Self {
        match level {
            OptLevel::None => OptimizationLevel::None,
            OptLevel::Folding => OptimizationLevel::ConstantFolding,
            OptLevel::Full => OptimizationLevel::Full,
        }
    }
}

/// How `run` drives the program
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum RunMode {
    /// Frame-rate processing (prefers processFrame)
    #[default]
    Frame,
    /// Block-rate processing (prefers processChannel)
    Block,
}

/// What to inspect
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum InspectType {
    /// Parsed syntax tree
    Ast,
    /// Resolved root data layout and functions
    Types,
}

/// SNEX DSP language compiler and JIT
#[derive(Parser)]
#[command(name = "snex")]
#[command(version)]
#[command(about = "SNEX DSP language compiler", long_about = None)]
pub struct Cli {
    /// Color output: auto, always, never
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Optimization level
    #[arg(long, global = true, value_enum, default_value_t = OptLevel::Full)]
    pub opt: OptLevel,

    /// Disable the code verifier
    #[arg(long, global = true)]
    pub release: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile SNEX source files and report errors
    #[command(visible_alias = "c")]
    Check {
        /// Source files to check
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
    },
    /// Compile a program and run its processing callback over an impulse
    #[command(visible_alias = "r")]
    Run {
        /// Path to the source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Number of frames to process
        #[arg(long, default_value_t = 16)]
        frames: usize,

        /// Number of interleaved channels
        #[arg(long, default_value_t = 1)]
        channels: usize,

        /// Processing mode used to pick the callback
        #[arg(long, value_enum, default_value_t = RunMode::Frame)]
        mode: RunMode,
    },
    /// Evaluate an expression over `input`
    #[command(visible_alias = "e")]
    Eval {
        /// Expression, e.g. "Math.sin(input) * 0.5"
        #[arg(value_name = "EXPR")]
        expression: String,

        /// Value bound to `input`
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        input: f64,
    },
    /// Inspect compilation output
    #[command(visible_alias = "i")]
    Inspect {
        /// What to inspect: ast, types
        #[arg(value_name = "TYPE")]
        inspect_type: InspectType,

        /// Path to the source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
