// src/commands/common.rs
//! Shared utilities for CLI commands.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::Path;

use snex_codegen::JitOptions;

use crate::cli::{ColorMode, OptLevel};
use crate::config::CompileConfig;
use crate::diagnostics::CompileError;

/// Settings every command derives its compile configuration from.
#[derive(Clone, Copy, Debug)]
pub struct CommandOptions {
    pub opt: OptLevel,
    pub release: bool,
    pub color: ColorMode,
}

impl CommandOptions {
    pub fn config(&self) -> CompileConfig {
        let jit = if self.release {
            JitOptions::release()
        } else {
            JitOptions::debug()
        };
        CompileConfig::default().with_optimization(self.opt.into()).with_jit(jit)
    }

    pub fn use_color(&self) -> bool {
        match self.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => io::stderr().is_terminal(),
        }
    }
}

/// Read a source file, printing an error on failure.
pub fn read_source(path: &Path) -> Result<String, ()> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("error: could not read '{}': {}", path.display(), e);
    })
}

/// Render a compile error to stderr with source context.
pub fn render_error(err: &CompileError, file_path: &str, source: &str, options: &CommandOptions) {
    let mut stderr = io::stderr();
    if err.render(file_path, source, &mut stderr, options.use_color()).is_err() {
        eprintln!("error: {err}");
    }
}
