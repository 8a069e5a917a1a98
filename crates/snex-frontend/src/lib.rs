//! SNEX frontend: lexer, arena AST, and parser.

pub mod ast;
pub mod ast_display;
pub mod errors;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    Ast, BinaryOp, Callee, ForEach, FunctionDef, Literal, Node, NodeId, NodeKind, Param,
    StructDef, SwitchCase, TemplateArgExpr, TemplateParam, TypeExpr, TypeName, UnaryOp, VarDecl,
};
pub use ast_display::AstPrinter;
pub use errors::{LexerError, ParserError};
pub use lexer::Lexer;
pub use parser::{ParseError, ParsedUnit, Parser};
pub use snex_identity::{Interner, NamespacedIdentifier, Symbol};
pub use token::{Span, Token, TokenType};
