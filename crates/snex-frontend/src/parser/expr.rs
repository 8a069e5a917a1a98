// src/parser/expr.rs
//
// Expression grammar: assignment, ternary, precedence climbing for binary
// operators, unary/cast, postfix and primary expressions.

use super::{MAX_OPERATOR_CHAIN, ParseError, Parser};
use crate::ast::*;
use crate::errors::ParserError;
use crate::TokenType;

impl<'src> Parser<'src> {
    pub(crate) fn expression(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<NodeId, ParseError> {
        let target = self.ternary()?;
        let op = match self.current.ty {
            TokenType::Eq => None,
            TokenType::PlusEq => Some(BinaryOp::Add),
            TokenType::MinusEq => Some(BinaryOp::Sub),
            TokenType::StarEq => Some(BinaryOp::Mul),
            TokenType::SlashEq => Some(BinaryOp::Div),
            TokenType::PercentEq => Some(BinaryOp::Mod),
            TokenType::AmpEq => Some(BinaryOp::BitAnd),
            TokenType::PipeEq => Some(BinaryOp::BitOr),
            TokenType::CaretEq => Some(BinaryOp::BitXor),
            _ => return Ok(target),
        };
        let target_span = self.ast.span(target);
        if !matches!(
            self.ast.kind(target),
            NodeKind::Identifier(_) | NodeKind::Member { .. } | NodeKind::Subscript { .. }
        ) {
            return Err(ParseError::new(
                ParserError::InvalidAssignTarget {
                    span: target_span.into(),
                },
                target_span,
            ));
        }
        self.advance();
        // Right associative: `a = b = c`
        let value = if self.check(TokenType::LBrace) {
            self.init_list()?
        } else {
            self.nested(Self::assignment)?
        };
        let span = target_span.merge(self.ast.span(value));
        Ok(self.ast.push(NodeKind::Assign { op, target, value }, span))
    }

    fn ternary(&mut self) -> Result<NodeId, ParseError> {
        let cond = self.binary(0)?;
        if !self.match_token(TokenType::Question) {
            return Ok(cond);
        }
        let then_expr = self.expression()?;
        self.consume(TokenType::Colon)?;
        let else_expr = self.nested(Self::ternary)?;
        let span = self.ast.span(cond).merge(self.ast.span(else_expr));
        Ok(self.ast.push(
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            },
            span,
        ))
    }

    /// Precedence climbing over the binary operator table.
    pub(crate) fn binary(&mut self, min_prec: u8) -> Result<NodeId, ParseError> {
        let mut lhs = self.unary()?;
        let mut chain = 0;
        loop {
            let prec = self.current.ty.precedence();
            if prec <= min_prec {
                break;
            }
            // Each operator nests the expression so far one level deeper
            chain += 1;
            if chain > MAX_OPERATOR_CHAIN {
                return Err(self.too_deep(MAX_OPERATOR_CHAIN));
            }
            let op = match self.current.ty {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                TokenType::Percent => BinaryOp::Mod,
                TokenType::EqEq => BinaryOp::Eq,
                TokenType::BangEq => BinaryOp::Ne,
                TokenType::Lt => BinaryOp::Lt,
                TokenType::LtEq => BinaryOp::Le,
                TokenType::Gt => BinaryOp::Gt,
                TokenType::GtEq => BinaryOp::Ge,
                TokenType::AmpAmp => BinaryOp::And,
                TokenType::PipePipe => BinaryOp::Or,
                TokenType::Ampersand => BinaryOp::BitAnd,
                TokenType::Pipe => BinaryOp::BitOr,
                TokenType::Caret => BinaryOp::BitXor,
                TokenType::LessLess => BinaryOp::Shl,
                TokenType::GreaterGreater => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.binary(prec)?;
            let span = self.ast.span(lhs).merge(self.ast.span(rhs));
            lhs = self.ast.push(NodeKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<NodeId, ParseError> {
        let start = self.current.span;
        let op = match self.current.ty {
            TokenType::Minus => Some(UnaryOp::Neg),
            TokenType::Bang => Some(UnaryOp::Not),
            TokenType::Tilde => Some(UnaryOp::BitNot),
            TokenType::Plus => {
                self.advance();
                return self.nested(Self::unary);
            }
            TokenType::PlusPlus | TokenType::MinusMinus => {
                let increment = self.check(TokenType::PlusPlus);
                self.advance();
                let target = self.nested(Self::unary)?;
                let span = start.merge(self.ast.span(target));
                return Ok(self.ast.push(
                    NodeKind::IncDec {
                        increment,
                        prefix: true,
                        target,
                    },
                    span,
                ));
            }
            TokenType::LParen => {
                if let Some(cast) = self.try_cast()? {
                    return Ok(cast);
                }
                None
            }
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::unary)?;
            let span = start.merge(self.ast.span(operand));
            return Ok(self.ast.push(NodeKind::Unary { op, operand }, span));
        }
        self.postfix()
    }

    /// `(type) unary`. Only attempted when the parenthesized tokens form a
    /// known type.
    fn try_cast(&mut self) -> Result<Option<NodeId>, ParseError> {
        let start = self.current.span;
        let checkpoint = self.checkpoint();
        self.advance();
        let ty = match self.type_expr(true) {
            Ok(ty) if self.check(TokenType::RParen) => ty,
            _ => {
                self.restore(checkpoint);
                return Ok(None);
            }
        };
        self.advance();
        let expr = self.nested(Self::unary)?;
        let span = start.merge(self.ast.span(expr));
        Ok(Some(self.ast.push(NodeKind::Cast { ty, expr }, span)))
    }

    fn postfix(&mut self) -> Result<NodeId, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.current.ty {
                TokenType::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    let end = self.consume(TokenType::RBracket)?;
                    let span = self.ast.span(expr).merge(end);
                    expr = self
                        .ast
                        .push(NodeKind::Subscript { base: expr, index }, span);
                }
                TokenType::Dot => {
                    self.advance();
                    let (field, field_span) = self.identifier()?;
                    if self.check(TokenType::LParen) {
                        let args = self.call_args()?;
                        let span = self.ast.span(expr).merge(self.previous.span);
                        expr = self.ast.push(
                            NodeKind::Call {
                                callee: Callee::Method {
                                    receiver: expr,
                                    name: field,
                                },
                                args,
                            },
                            span,
                        );
                    } else {
                        let span = self.ast.span(expr).merge(field_span);
                        expr = self.ast.push(NodeKind::Member { base: expr, field }, span);
                    }
                }
                TokenType::PlusPlus | TokenType::MinusMinus => {
                    let increment = self.check(TokenType::PlusPlus);
                    let end = self.current.span;
                    self.advance();
                    let span = self.ast.span(expr).merge(end);
                    expr = self.ast.push(
                        NodeKind::IncDec {
                            increment,
                            prefix: false,
                            target: expr,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<NodeId>, ParseError> {
        self.consume(TokenType::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<NodeId, ParseError> {
        let span = self.current.span;
        match self.current.ty {
            TokenType::IntLiteral => {
                let value = self.int_literal()?;
                self.advance();
                Ok(self.ast.push(NodeKind::Literal(Literal::Int(value)), span))
            }
            TokenType::FloatLiteral => {
                let text = self.current.lexeme.trim_end_matches(['f', 'F']);
                let value: f32 = text.parse().map_err(|_| self.invalid_number())?;
                self.advance();
                Ok(self.ast.push(NodeKind::Literal(Literal::Float(value)), span))
            }
            TokenType::DoubleLiteral => {
                let value: f64 = self
                    .current
                    .lexeme
                    .parse()
                    .map_err(|_| self.invalid_number())?;
                self.advance();
                Ok(self.ast.push(NodeKind::Literal(Literal::Double(value)), span))
            }
            TokenType::KwTrue | TokenType::KwFalse => {
                let value = self.check(TokenType::KwTrue);
                self.advance();
                Ok(self.ast.push(NodeKind::Literal(Literal::Bool(value)), span))
            }
            TokenType::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.consume(TokenType::RParen)?;
                Ok(inner)
            }
            TokenType::LBrace => self.init_list(),
            TokenType::Identifier => self.path_expression(),
            _ => Err(self.lexer_error_or(ParserError::ExpectedExpression {
                found: self.current.lexeme.to_string(),
                span: span.into(),
            })),
        }
    }

    /// Identifier, qualified path, or a call through a path, with optional
    /// explicit template arguments (`f<int>(x)`).
    fn path_expression(&mut self) -> Result<NodeId, ParseError> {
        let start = self.current.span;
        let (first, _) = self.identifier()?;
        let mut segments = vec![first];
        while self.check(TokenType::ColonColon) {
            self.advance();
            segments.push(self.identifier()?.0);
        }
        let path = NamespacedIdentifier::from_segments(segments);

        if self.check(TokenType::Lt) {
            let checkpoint = self.checkpoint();
            match self.template_args() {
                Ok(template_args) if self.check(TokenType::LParen) => {
                    let args = self.call_args()?;
                    return Ok(self.ast.push(
                        NodeKind::Call {
                            callee: Callee::Path {
                                path,
                                template_args,
                            },
                            args,
                        },
                        start.merge(self.previous.span),
                    ));
                }
                _ => self.restore(checkpoint),
            }
        }

        if self.check(TokenType::LParen) {
            let args = self.call_args()?;
            return Ok(self.ast.push(
                NodeKind::Call {
                    callee: Callee::Path {
                        path,
                        template_args: Vec::new(),
                    },
                    args,
                },
                start.merge(self.previous.span),
            ));
        }

        Ok(self
            .ast
            .push(NodeKind::Identifier(path), start.merge(self.previous.span)))
    }

    fn int_literal(&mut self) -> Result<i32, ParseError> {
        let text = self.current.lexeme;
        let parsed = if let Some(hex) = text.strip_prefix("0x").or(text.strip_prefix("0X")) {
            // Hex literals may spell out the full 32 bit pattern
            u32::from_str_radix(hex, 16).ok().map(|v| v as i32)
        } else {
            text.parse::<i64>()
                .ok()
                .and_then(|v| i32::try_from(v).ok())
        };
        parsed.ok_or_else(|| {
            ParseError::new(
                ParserError::IntegerOutOfRange {
                    span: self.current.span.into(),
                },
                self.current.span,
            )
        })
    }

    fn invalid_number(&self) -> ParseError {
        ParseError::new(
            ParserError::Lexer(crate::errors::LexerError::InvalidNumber {
                span: self.current.span.into(),
            }),
            self.current.span,
        )
    }
}
