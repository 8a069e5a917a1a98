// src/errors.rs
//! Code generation errors (E3xxx).
//!
//! Most of these indicate a construct the resolver accepted but the backend
//! cannot lower, or an internal invariant violation. `RegisterExhausted` is
//! the one resource error a user program can trigger: a function whose
//! live temporaries need more spill space than the configured limit.

use miette::{Diagnostic, LabeledSpan};
use snex_identity::Span;
use std::fmt;
use thiserror::Error;

/// The kind of code generation error.
#[derive(Debug, Clone)]
pub enum CodegenErrorKind {
    /// Construct the backend cannot lower
    UnsupportedFeature {
        feature: &'static str,
        context: Option<String>,
    },

    /// Type mismatch in codegen (should have been caught by sema)
    TypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    /// Function, variable, or type not found
    NotFound { kind: &'static str, name: String },

    /// Internal invariant violation (compiler bug)
    InternalError {
        message: &'static str,
        context: Option<String>,
    },

    /// Live values need more spill space than the frame allows
    RegisterExhausted { needed: u32, limit: u32 },

    /// Host asked for a function with a different signature
    SignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// The abort token fired between functions
    Aborted,
}

/// Code generation error with optional source span for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct CodegenError {
    pub kind: CodegenErrorKind,
    pub span: Option<Span>,
}

pub type CodegenResult<T> = Result<T, CodegenError>;

impl CodegenError {
    pub fn unsupported(feature: &'static str) -> Self {
        CodegenErrorKind::UnsupportedFeature {
            feature,
            context: None,
        }
        .into()
    }

    pub fn unsupported_with_context(feature: &'static str, context: impl Into<String>) -> Self {
        CodegenErrorKind::UnsupportedFeature {
            feature,
            context: Some(context.into()),
        }
        .into()
    }

    pub fn type_mismatch(
        context: &'static str,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        CodegenErrorKind::TypeMismatch {
            context,
            expected: expected.into(),
            found: found.into(),
        }
        .into()
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        CodegenErrorKind::NotFound {
            kind,
            name: name.into(),
        }
        .into()
    }

    pub fn internal(message: &'static str) -> Self {
        CodegenErrorKind::InternalError {
            message,
            context: None,
        }
        .into()
    }

    pub fn internal_with_context(message: &'static str, context: impl Into<String>) -> Self {
        CodegenErrorKind::InternalError {
            message,
            context: Some(context.into()),
        }
        .into()
    }

    /// Wrap a Cranelift module error
    pub fn cranelift(e: impl fmt::Display) -> Self {
        CodegenErrorKind::InternalError {
            message: "cranelift error",
            context: Some(e.to_string()),
        }
        .into()
    }

    pub fn register_exhausted(needed: u32, limit: u32) -> Self {
        CodegenErrorKind::RegisterExhausted { needed, limit }.into()
    }

    pub fn signature_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        CodegenErrorKind::SignatureMismatch {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
        }
        .into()
    }

    pub fn aborted() -> Self {
        CodegenErrorKind::Aborted.into()
    }

    /// Attach a source span unless one is already set.
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

impl From<CodegenErrorKind> for CodegenError {
    fn from(kind: CodegenErrorKind) -> Self {
        CodegenError { kind, span: None }
    }
}

impl Diagnostic for CodegenError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code: &'static str = match &self.kind {
            CodegenErrorKind::UnsupportedFeature { .. } => "E3001",
            CodegenErrorKind::TypeMismatch { .. } => "E3002",
            CodegenErrorKind::NotFound { .. } => "E3003",
            CodegenErrorKind::InternalError { .. } => "E3004",
            CodegenErrorKind::RegisterExhausted { .. } => "E3005",
            CodegenErrorKind::SignatureMismatch { .. } => "E3006",
            CodegenErrorKind::Aborted => "E3007",
        };
        Some(Box::new(code))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        let len = span.end.saturating_sub(span.start);
        let label = match &self.kind {
            CodegenErrorKind::UnsupportedFeature { feature, .. } => {
                format!("{} is not supported", feature)
            }
            CodegenErrorKind::TypeMismatch {
                expected, found, ..
            } => {
                format!("expected {}, found {}", expected, found)
            }
            CodegenErrorKind::NotFound { kind, .. } => format!("{} not found", kind),
            CodegenErrorKind::InternalError { message, .. } => message.to_string(),
            CodegenErrorKind::RegisterExhausted { .. } => "too many live values here".to_string(),
            CodegenErrorKind::SignatureMismatch { expected, .. } => {
                format!("expected {}", expected)
            }
            CodegenErrorKind::Aborted => "compilation aborted here".to_string(),
        };
        let labeled = LabeledSpan::new(Some(label), span.start, len);
        Some(Box::new(std::iter::once(labeled)))
    }
}

impl fmt::Display for CodegenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenErrorKind::UnsupportedFeature { feature, context } => {
                write!(f, "unsupported feature: {}", feature)?;
                if let Some(ctx) = context {
                    write!(f, " ({})", ctx)?;
                }
                Ok(())
            }
            CodegenErrorKind::TypeMismatch {
                context,
                expected,
                found,
            } => {
                write!(f, "{}: expected {}, found {}", context, expected, found)
            }
            CodegenErrorKind::NotFound { kind, name } => {
                write!(f, "{} not found: {}", kind, name)
            }
            CodegenErrorKind::InternalError { message, context } => {
                write!(f, "internal error: {}", message)?;
                if let Some(ctx) = context {
                    write!(f, " ({})", ctx)?;
                }
                Ok(())
            }
            CodegenErrorKind::RegisterExhausted { needed, limit } => {
                write!(
                    f,
                    "register allocation exhausted: {} spill bytes needed, limit is {}",
                    needed, limit
                )
            }
            CodegenErrorKind::SignatureMismatch {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "function '{}' has signature {}, expected {}",
                    name, found, expected
                )
            }
            CodegenErrorKind::Aborted => write!(f, "code generation aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_is_kept_once_set() {
        let first = Span::new(4, 6, 2, 1);
        let err = CodegenError::unsupported("switch on float")
            .with_span(first)
            .with_span(Span::new(0, 1, 1, 1));
        assert_eq!(err.span, Some(first));
        assert_eq!(
            err.to_string(),
            "unsupported feature: switch on float"
        );
    }

    #[test]
    fn exhausted_registers_have_their_own_code() {
        let err = CodegenError::register_exhausted(96, 64);
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("E3005"));
        assert!(err.to_string().contains("96 spill bytes"));
    }
}
