// src/parser/types.rs
//
// Type expressions and template argument lists.

use super::{ParseError, Parser};
use crate::ast::*;
use crate::errors::ParserError;
use crate::token::TEMPLATE_ARG_PRECEDENCE;
use crate::{Span, Token, TokenType};

impl<'src> Parser<'src> {
    /// Parse `[static] [const] base [<args>] [&]`.
    ///
    /// In `strict` mode a named type must already be known to the parser;
    /// casts use this to stay apart from parenthesized expressions.
    pub(crate) fn type_expr(&mut self, strict: bool) -> Result<TypeExpr, ParseError> {
        let start = self.current.span;
        let mut is_static = false;
        let mut is_const = false;
        loop {
            if self.match_token(TokenType::KwStatic) {
                is_static = true;
            } else if self.match_token(TokenType::KwConst) {
                is_const = true;
            } else {
                break;
            }
        }

        let name = match self.current.ty {
            TokenType::KwInt => TypeName::Int,
            TokenType::KwFloat => TypeName::Float,
            TokenType::KwDouble => TypeName::Double,
            TokenType::KwBool => TypeName::Bool,
            TokenType::KwVoid => TypeName::Void,
            TokenType::KwAuto => TypeName::Auto,
            TokenType::KwBlock => TypeName::Block,
            TokenType::KwSpan => TypeName::Span,
            TokenType::KwDyn => TypeName::Dyn,
            TokenType::Identifier => {
                let path = self.type_path(strict)?;
                TypeName::Named(path)
            }
            _ => {
                return Err(self.lexer_error_or(ParserError::ExpectedType {
                    span: self.current.span.into(),
                }));
            }
        };
        if !matches!(name, TypeName::Named(_)) {
            self.advance();
        }

        let args = if matches!(name, TypeName::Span | TypeName::Dyn) {
            self.template_args()?
        } else if matches!(name, TypeName::Named(_)) && self.check(TokenType::Lt) {
            self.template_args()?
        } else {
            Vec::new()
        };

        // Trailing `const` is accepted as well (`float const&`)
        if self.match_token(TokenType::KwConst) {
            is_const = true;
        }
        let is_ref = self.match_token(TokenType::Ampersand);

        Ok(TypeExpr {
            name,
            args,
            is_const,
            is_ref,
            is_static,
            span: start.merge(self.previous.span),
        })
    }

    fn type_path(&mut self, strict: bool) -> Result<NamespacedIdentifier, ParseError> {
        let start = self.current.span;
        let (first, _) = self.identifier()?;
        let mut segments = vec![first];
        while self.check(TokenType::ColonColon) {
            self.advance();
            segments.push(self.identifier()?.0);
        }
        let last = *segments.last().unwrap_or(&first);
        if strict && !self.known_types.contains(&last) {
            return Err(ParseError::new(
                ParserError::ExpectedType { span: start.into() },
                start,
            ));
        }
        Ok(NamespacedIdentifier::from_segments(segments))
    }

    /// `< arg, arg >` where each argument is a type or an integer expression.
    pub(crate) fn template_args(&mut self) -> Result<Vec<TemplateArgExpr>, ParseError> {
        self.consume(TokenType::Lt)?;
        let mut args = Vec::new();
        if self.check(TokenType::Gt) || self.check(TokenType::GreaterGreater) {
            self.close_template()?;
            return Ok(args);
        }
        loop {
            if self.starts_type_argument() {
                args.push(TemplateArgExpr::Type(self.nested(|p| p.type_expr(false))?));
            } else {
                args.push(TemplateArgExpr::Const(self.template_const_arg()?));
            }
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        self.close_template()?;
        Ok(args)
    }

    pub(crate) fn template_const_arg(&mut self) -> Result<NodeId, ParseError> {
        self.binary(TEMPLATE_ARG_PRECEDENCE)
    }

    fn starts_type_argument(&self) -> bool {
        match self.current.ty {
            ty if ty.is_type_keyword() => true,
            TokenType::KwConst => true,
            TokenType::Identifier => {
                let last = self.interner.lookup(self.current.lexeme);
                last.is_some_and(|sym| self.known_types.contains(&sym))
            }
            _ => false,
        }
    }

    /// Consume a closing `>`, splitting `>>` when nested lists close together.
    pub(crate) fn close_template(&mut self) -> Result<(), ParseError> {
        match self.current.ty {
            TokenType::Gt => {
                self.advance();
                Ok(())
            }
            TokenType::GreaterGreater => {
                let span = self.current.span;
                let rest = Span::new(span.start + 1, span.end, span.line, span.column + 1);
                self.current = Token::new(TokenType::Gt, &self.current.lexeme[1..], rest);
                Ok(())
            }
            _ => Err(self.expected(">")),
        }
    }

    /// Speculatively parse a type followed by an identifier (the start of a
    /// declaration). Restores the cursor and returns `None` otherwise.
    ///
    /// A statement that starts with a type keyword, `const` or `static` can
    /// only be a declaration, so failures there are reported directly.
    pub(crate) fn try_declaration_type(&mut self) -> Result<Option<TypeExpr>, ParseError> {
        let committed = match self.current.ty {
            ty if ty.is_type_keyword() => true,
            TokenType::KwConst | TokenType::KwStatic => true,
            TokenType::Identifier => false,
            _ => return Ok(None),
        };
        let checkpoint = self.checkpoint();
        match self.type_expr(false) {
            Ok(ty) if self.check(TokenType::Identifier) => Ok(Some(ty)),
            Ok(_) if committed => Err(self.lexer_error_or(ParserError::ExpectedIdentifier {
                span: self.current.span.into(),
            })),
            Err(e) if committed => Err(e),
            _ => {
                self.restore(checkpoint);
                Ok(None)
            }
        }
    }
}
