// src/diagnostics.rs
//! Host-facing error reporting.
//!
//! Every stage keeps its own miette-enabled error type. [`CompileError`]
//! collects them, and [`Diagnostic`] flattens one into the location and
//! category an editor needs to underline the offending token.

use std::io::Write;

use miette::{GraphicalReportHandler, GraphicalTheme, NamedSource};
use thiserror::Error;

use snex_codegen::{CodegenError, CodegenErrorKind};
use snex_frontend::ParseError;
use snex_identity::Span;
use snex_sema::{SemaError, SemaErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Error category of a failed compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    TypeResolution,
    CompileTimeEvaluation,
    CodeGen,
    Timeout,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::TypeResolution => "type error",
            ErrorKind::CompileTimeEvaluation => "compile-time evaluation error",
            ErrorKind::CodeGen => "code generation error",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// The error that ended a compile, from whichever stage raised it.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("{}", .0.error)]
    Parse(ParseError),
    #[error("{}", .0.error)]
    Sema(SemaError),
    #[error(transparent)]
    Codegen(CodegenError),
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<SemaError> for CompileError {
    fn from(e: SemaError) -> Self {
        CompileError::Sema(e)
    }
}

impl From<CodegenError> for CompileError {
    fn from(e: CodegenError) -> Self {
        CompileError::Codegen(e)
    }
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Parse(_) => ErrorKind::Syntax,
            CompileError::Sema(e) => match e.kind() {
                SemaErrorKind::TypeResolution => ErrorKind::TypeResolution,
                SemaErrorKind::CompileTimeEvaluation => ErrorKind::CompileTimeEvaluation,
                SemaErrorKind::Timeout => ErrorKind::Timeout,
            },
            CompileError::Codegen(e) => match e.kind {
                CodegenErrorKind::Aborted => ErrorKind::Timeout,
                _ => ErrorKind::CodeGen,
            },
        }
    }

    /// Location of the offending token, if the stage recorded one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Parse(e) => Some(e.span),
            CompileError::Sema(e) => Some(e.span),
            CompileError::Codegen(e) => e.span,
        }
    }

    /// Stable diagnostic code such as `E1005`.
    pub fn code(&self) -> Option<String> {
        let code = match self {
            CompileError::Parse(e) => miette::Diagnostic::code(&e.error),
            CompileError::Sema(e) => miette::Diagnostic::code(&e.error),
            CompileError::Codegen(e) => miette::Diagnostic::code(e),
        };
        code.map(|c| c.to_string())
    }

    /// A miette report carrying `source` so labels render with context.
    pub fn to_report(&self, file_name: &str, source: &str) -> miette::Report {
        let report = match self {
            CompileError::Parse(e) => miette::Report::new(e.error.clone()),
            CompileError::Sema(e) => miette::Report::new(e.error.clone()),
            CompileError::Codegen(e) => miette::Report::new(e.clone()),
        };
        report.with_source_code(NamedSource::new(file_name, source.to_string()))
    }

    /// Render to `w` the way the command line tool prints errors.
    pub fn render(&self, file_name: &str, source: &str, w: &mut dyn Write, color: bool) -> std::io::Result<()> {
        let theme = if color {
            GraphicalTheme::unicode()
        } else {
            GraphicalTheme::unicode_nocolor()
        };
        let report = self.to_report(file_name, source);
        let mut out = String::new();
        let handler = GraphicalReportHandler::new_themed(theme);
        if handler.render_report(&mut out, report.as_ref()).is_err() {
            // Fall back to the plain message
            return writeln!(w, "error: {self}");
        }
        write!(w, "{out}")
    }
}

/// One located message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line of the offending token.
    pub line: u32,
    /// 1-based column of the offending token.
    pub column: u32,
    pub severity: Severity,
    pub message: String,
    pub kind: ErrorKind,
    pub code: Option<String>,
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        // Errors without a location point at the start of the source
        let (line, column) = e.span().map_or((1, 1), |s| (s.line.max(1), s.column.max(1)));
        Diagnostic {
            line,
            column,
            severity: Severity::Error,
            message: e.to_string(),
            kind: e.kind(),
            code: e.code(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}:{}: {}", self.line, self.column, severity)?;
        if let Some(code) = &self.code {
            write!(f, "[{code}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codegen_abort_is_a_timeout() {
        let err = CompileError::from(CodegenError::aborted());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let diag = Diagnostic::from(&err);
        assert_eq!((diag.line, diag.column), (1, 1));
    }

    #[test]
    fn display_includes_location_and_code() {
        let diag = Diagnostic {
            line: 3,
            column: 14,
            severity: Severity::Error,
            message: "expected ';'".to_string(),
            kind: ErrorKind::Syntax,
            code: Some("E1005".to_string()),
        };
        assert_eq!(diag.to_string(), "3:14: error[E1005]: expected ';'");
    }
}
