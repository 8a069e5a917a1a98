// src/commands/check.rs

use std::path::PathBuf;
use std::process::ExitCode;

use super::common::{CommandOptions, read_source, render_error};
use crate::compile::compile;

/// Compile each file and report its diagnostics.
pub fn check_files(files: &[PathBuf], options: &CommandOptions) -> ExitCode {
    let config = options.config();
    let mut had_error = false;

    for path in files {
        let Ok(source) = read_source(path) else {
            had_error = true;
            continue;
        };
        let file_path = path.to_string_lossy();
        let result = compile(&source, &config);
        match (&result.object, &result.error) {
            (Some(object), _) => {
                tracing::debug!(file = %file_path, functions = object.functions().len(), "check passed");
            }
            (None, Some(err)) => {
                render_error(err, &file_path, &source, options);
                had_error = true;
            }
            (None, None) => had_error = true,
        }
    }

    if had_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
