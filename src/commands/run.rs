// src/commands/run.rs

use std::path::Path;
use std::process::ExitCode;

use super::common::{CommandOptions, read_source, render_error};
use crate::callbacks::{CallbackCollection, CallbackKind, ProcessMode};
use crate::cli::RunMode;
use crate::compile::compile_object;

const SAMPLE_RATE: f64 = 44100.0;

/// Compile a program, prepare it and feed an impulse through its best
/// callback for `mode`, printing one line per frame.
pub fn run_file(path: &Path, frames: usize, channels: usize, mode: RunMode, options: &CommandOptions) -> ExitCode {
    let Ok(source) = read_source(path) else {
        return ExitCode::FAILURE;
    };
    let file_path = path.to_string_lossy();

    let object = {
        let _span = tracing::info_span!("compile").entered();
        match compile_object(&source, &options.config()) {
            Ok(object) => object,
            Err(e) => {
                render_error(&e, &file_path, &source, options);
                return ExitCode::FAILURE;
            }
        }
    };

    let mode = match mode {
        RunMode::Frame => ProcessMode::Frame,
        RunMode::Block => ProcessMode::Block,
    };
    let callbacks = CallbackCollection::new(object);
    if callbacks.best_callback(mode) == CallbackKind::Inactive {
        eprintln!("error: '{}' defines no processing callback", file_path);
        eprintln!("hint: define processSample, processFrame or processChannel");
        return ExitCode::FAILURE;
    }

    let channels = channels.max(1);
    let block_size = i32::try_from(frames).unwrap_or(i32::MAX);
    callbacks.prepare(SAMPLE_RATE, block_size, channels as i32);

    let mut data = vec![0.0f32; frames * channels];
    for s in data.iter_mut().take(channels) {
        *s = 1.0;
    }
    let used = {
        let _span = tracing::info_span!("execute").entered();
        callbacks.process(mode, &mut data, channels)
    };

    eprintln!("// callback: {}", used.name());
    for frame in data.chunks(channels) {
        let line: Vec<String> = frame.iter().map(|s| format!("{s:.6}")).collect();
        println!("{}", line.join("\t"));
    }
    ExitCode::SUCCESS
}
