// src/errors.rs
//! Semantic errors (E2xxx).

#![allow(unused_assignments)] // False positives from thiserror derive

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use snex_identity::Span;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SemanticError {
    #[error("unknown identifier '{name}'")]
    #[diagnostic(code(E2001))]
    UnknownIdentifier {
        name: String,
        #[label("not found in scope")]
        span: SourceSpan,
    },

    #[error("unknown type '{name}'")]
    #[diagnostic(code(E2002))]
    UnknownType {
        name: String,
        #[label("not a type")]
        span: SourceSpan,
    },

    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(E2003))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label("type mismatch")]
        span: SourceSpan,
    },

    #[error("template argument for '{param}': {reason}")]
    #[diagnostic(code(E2004))]
    TemplateArgument {
        param: String,
        reason: String,
        #[label("template argument mismatch")]
        span: SourceSpan,
    },

    #[error("no overload of '{name}' accepts ({args})")]
    #[diagnostic(code(E2005))]
    NoMatchingOverload {
        name: String,
        args: String,
        #[label("no matching function")]
        span: SourceSpan,
    },

    #[error("call to '{name}' is ambiguous between {first} and {second}")]
    #[diagnostic(
        code(E2006),
        help("add a cast so that exactly one overload matches without conversions")
    )]
    AmbiguousCall {
        name: String,
        first: String,
        second: String,
        #[label("ambiguous call")]
        span: SourceSpan,
    },

    #[error("'{name}' is already declared in this scope")]
    #[diagnostic(code(E2007))]
    DuplicateSymbol {
        name: String,
        #[label("redeclared here")]
        span: SourceSpan,
    },

    #[error("'{keyword}' outside of loop")]
    #[diagnostic(code(E2008))]
    ControlOutsideLoop {
        keyword: String,
        #[label("not inside a loop")]
        span: SourceSpan,
    },

    #[error("cannot assign to const '{name}'")]
    #[diagnostic(code(E2009))]
    ConstAssignment {
        name: String,
        #[label("cannot assign")]
        span: SourceSpan,
    },

    #[error("index {index} is out of bounds for span of size {size}")]
    #[diagnostic(code(E2010))]
    IndexOutOfBounds {
        index: i64,
        size: u32,
        #[label("out of bounds")]
        span: SourceSpan,
    },

    #[error("operator '{op}' cannot be applied to {ty}")]
    #[diagnostic(code(E2011))]
    InvalidOperand {
        op: String,
        ty: String,
        #[label("invalid operand")]
        span: SourceSpan,
    },

    #[error("expression is not addressable")]
    #[diagnostic(code(E2012), help("bind a variable first"))]
    NotAddressable {
        #[label("needs a variable, member or element")]
        span: SourceSpan,
    },

    #[error("type {ty} has no member '{name}'")]
    #[diagnostic(code(E2013))]
    UnknownMember {
        ty: String,
        name: String,
        #[label("unknown member")]
        span: SourceSpan,
    },

    #[error("invalid declaration: {reason}")]
    #[diagnostic(code(E2014))]
    InvalidDeclaration {
        reason: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unsupported: {what}")]
    #[diagnostic(code(E2015))]
    Unsupported {
        what: String,
        #[label("not supported")]
        span: SourceSpan,
    },

    #[error("{what} is not a compile-time constant")]
    #[diagnostic(code(E2020))]
    NotConstant {
        what: String,
        #[label("needs a constant")]
        span: SourceSpan,
    },

    #[error("division by constant zero")]
    #[diagnostic(code(E2021))]
    DivisionByZero {
        #[label("divisor is zero")]
        span: SourceSpan,
    },

    #[error("optimizer did not reach a fixed point after {rewrites} rewrites")]
    #[diagnostic(code(E2022))]
    RewriteLimit {
        rewrites: usize,
        #[label("rewritten too often")]
        span: SourceSpan,
    },

    #[error("template instantiation nested deeper than {depth}")]
    #[diagnostic(code(E2023))]
    InstantiationDepth {
        depth: usize,
        #[label("while instantiating")]
        span: SourceSpan,
    },

    #[error("compilation timed out")]
    #[diagnostic(code(E2030), help("raise the time budget or simplify the source"))]
    Timeout {
        #[label("aborted here")]
        span: SourceSpan,
    },
}

/// Error category reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaErrorKind {
    TypeResolution,
    CompileTimeEvaluation,
    Timeout,
}

impl SemanticError {
    pub fn kind(&self) -> SemaErrorKind {
        match self {
            SemanticError::NotConstant { .. }
            | SemanticError::DivisionByZero { .. }
            | SemanticError::RewriteLimit { .. }
            | SemanticError::InstantiationDepth { .. } => SemaErrorKind::CompileTimeEvaluation,
            SemanticError::Timeout { .. } => SemaErrorKind::Timeout,
            _ => SemaErrorKind::TypeResolution,
        }
    }
}

/// A semantic error paired with the span used for line/column reporting.
#[derive(Debug, Clone)]
pub struct SemaError {
    pub error: SemanticError,
    pub span: Span,
}

impl SemaError {
    pub fn new(error: SemanticError, span: Span) -> Self {
        Self { error, span }
    }

    pub fn kind(&self) -> SemaErrorKind {
        self.error.kind()
    }
}

impl std::fmt::Display for SemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for SemaError {}

/// Build a `SemaError` from a variant whose only label is `span`. Fields
/// accept the struct shorthand (`name` for `name: name`).
#[macro_export]
macro_rules! sema_err {
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }, $span:expr) => {{
        let span: $crate::Span = $span;
        $crate::errors::SemaError::new(
            $crate::errors::SemanticError::$variant {
                $($field $(: $value)?,)*
                span: span.into(),
            },
            span,
        )
    }};
}
