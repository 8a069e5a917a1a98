// src/errors/parser.rs
//! Parser errors (E1xxx).

#![allow(unused_assignments)] // False positives from thiserror derive

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use super::LexerError;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexer(#[from] LexerError),

    #[error("expected expression, found '{found}'")]
    #[diagnostic(code(E1001))]
    ExpectedExpression {
        found: String,
        #[label("expected expression")]
        span: SourceSpan,
    },

    #[error("expected '{expected}', found '{found}'")]
    #[diagnostic(code(E1002))]
    ExpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token")]
        span: SourceSpan,
    },

    #[error("unexpected token '{token}'")]
    #[diagnostic(code(E1003))]
    UnexpectedToken {
        token: String,
        #[label("unexpected")]
        span: SourceSpan,
    },

    #[error("expected type")]
    #[diagnostic(code(E1004))]
    ExpectedType {
        #[label("expected type")]
        span: SourceSpan,
    },

    #[error("missing ';' after statement")]
    #[diagnostic(code(E1005), help("terminate the statement with ';'"))]
    MissingSemicolon {
        #[label("statement starts here")]
        span: SourceSpan,
    },

    #[error("expected identifier")]
    #[diagnostic(code(E1006))]
    ExpectedIdentifier {
        #[label("expected identifier")]
        span: SourceSpan,
    },

    #[error("expected block")]
    #[diagnostic(code(E1007), help("blocks start with '{{'"))]
    ExpectedBlock {
        #[label("expected block here")]
        span: SourceSpan,
    },

    #[error("integer literal out of range")]
    #[diagnostic(code(E1008), help("integers are 32 bit"))]
    IntegerOutOfRange {
        #[label("does not fit in int")]
        span: SourceSpan,
    },

    #[error("invalid assignment target")]
    #[diagnostic(code(E1009))]
    InvalidAssignTarget {
        #[label("cannot assign to this expression")]
        span: SourceSpan,
    },

    #[error("'{keyword}' is not allowed here")]
    #[diagnostic(code(E1010))]
    MisplacedKeyword {
        keyword: String,
        #[label("not allowed here")]
        span: SourceSpan,
    },

    #[error("duplicate 'default' label in switch")]
    #[diagnostic(code(E1011))]
    DuplicateDefault {
        #[label("second default")]
        span: SourceSpan,
    },

    #[error("expression or statement nested deeper than {limit} levels")]
    #[diagnostic(code(E1012), help("split it up with local variables"))]
    NestingTooDeep {
        limit: u32,
        #[label("too deep")]
        span: SourceSpan,
    },
}
