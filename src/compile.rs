// src/compile.rs
//
// The compile entry point: parse, resolve, optimize and generate in one
// synchronous call. Any error ends the unit; nothing partially built
// escapes.

use snex_codegen::CompiledObject;
use snex_frontend::Parser;
use snex_sema::Compilation;

use crate::config::CompileConfig;
use crate::diagnostics::{CompileError, Diagnostic};

/// Outcome of [`compile`].
#[derive(Debug)]
pub struct CompileResult {
    pub diagnostics: Vec<Diagnostic>,
    /// The stage error behind the diagnostics, for rich rendering.
    pub error: Option<CompileError>,
    pub object: Option<CompiledObject>,
}

impl CompileResult {
    pub fn was_ok(&self) -> bool {
        self.object.is_some()
    }

    /// First error, if the compile failed.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics.first()
    }

    pub fn into_object(self) -> Result<CompiledObject, CompileError> {
        match (self.object, self.error) {
            (Some(object), _) => Ok(object),
            (None, Some(error)) => Err(error),
            (None, None) => Err(CompileError::Codegen(snex_codegen::CodegenError::internal(
                "compile produced neither an object nor an error",
            ))),
        }
    }
}

/// Compile `source` into executable code.
pub fn compile(source: &str, config: &CompileConfig) -> CompileResult {
    match compile_object(source, config) {
        Ok(object) => CompileResult {
            diagnostics: Vec::new(),
            error: None,
            object: Some(object),
        },
        Err(error) => {
            let diagnostic = Diagnostic::from(&error);
            tracing::debug!(line = diagnostic.line, column = diagnostic.column, kind = ?diagnostic.kind, "compile failed");
            CompileResult {
                diagnostics: vec![diagnostic],
                error: Some(error),
                object: None,
            }
        }
    }
}

/// [`compile`] with `Result` plumbing.
pub fn compile_object(source: &str, config: &CompileConfig) -> Result<CompiledObject, CompileError> {
    let _span = tracing::info_span!("compile").entered();
    let unit = analyze(source, config)?;
    let object = snex_codegen::generate(unit, &config.jit)?;
    tracing::debug!(functions = object.functions().len(), data_size = object.data_size(), "compiled");
    Ok(object)
}

/// Run the front end and semantic passes without generating code.
pub fn analyze(source: &str, config: &CompileConfig) -> Result<Compilation, CompileError> {
    let options = config.sema_options();
    let parsed = Parser::new(source).parse_program()?;
    let mut unit = Compilation::new(parsed, &config.externals, options);
    unit.run()?;
    Ok(unit)
}
