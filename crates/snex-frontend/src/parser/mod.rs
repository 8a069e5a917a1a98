// src/parser/mod.rs
//
// Recursive-descent parser producing an arena AST. Statements and
// declarations live here; expressions and type expressions are split into
// sibling modules as extra `impl Parser` blocks.

mod expr;
mod types;

#[cfg(test)]
mod tests;

use rustc_hash::FxHashSet;

use crate::ast::*;
use crate::errors::ParserError;
use crate::{Interner, Lexer, Span, Token, TokenType};

pub struct Parser<'src> {
    pub(crate) lexer: Lexer<'src>,
    pub(crate) current: Token<'src>,
    pub(crate) previous: Token<'src>,
    pub(crate) interner: Interner,
    pub(crate) ast: Ast,
    /// Identifiers declared as types so far (structs, aliases, template
    /// type parameters). Used to tell casts and declarations apart from
    /// expressions.
    pub(crate) known_types: FxHashSet<Symbol>,
    /// Current nesting of statements, expressions and type arguments.
    depth: u32,
}

/// Deepest nesting of statements, parenthesized expressions, operands and
/// template arguments.
pub const MAX_NESTING_DEPTH: u32 = 64;
/// Most binary operators chained in one expression without parentheses.
pub const MAX_OPERATOR_CHAIN: u32 = 256;

/// A parse error wrapping a miette-enabled ParserError
#[derive(Debug, Clone)]
pub struct ParseError {
    pub error: ParserError,
    pub span: Span,
}

impl ParseError {
    pub fn new(error: ParserError, span: Span) -> Self {
        Self { error, span }
    }
}

/// Saved cursor for speculative parsing.
pub(crate) struct Checkpoint<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    ast_len: usize,
}

/// Result of a successful parse: the arena plus the interner that owns the
/// identifier strings.
pub struct ParsedUnit {
    pub ast: Ast,
    pub interner: Interner,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut interner = Interner::new();
        interner.seed_builtin_symbols();
        Self::with_interner(source, interner)
    }

    /// Parse with a caller-provided interner, e.g. one already holding host
    /// function names.
    pub fn with_interner(source: &'src str, interner: Interner) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            previous: current.clone(),
            current,
            interner,
            ast: Ast::new(),
            known_types: FxHashSet::default(),
            depth: 0,
        }
    }

    /// Parse a whole translation unit.
    pub fn parse_program(mut self) -> Result<ParsedUnit, ParseError> {
        let start = self.current.span;
        let mut items = Vec::new();
        while !self.check(TokenType::Eof) {
            self.item(&mut items)?;
        }
        let span = start.merge(self.current.span);
        let root = self.ast.push(NodeKind::Program(items), span);
        self.ast.set_root(root);
        tracing::debug!(nodes = self.ast.len(), "parsed program");
        Ok(ParsedUnit {
            ast: self.ast,
            interner: self.interner,
        })
    }

    /// Parse a single expression as a whole program, e.g. for expression
    /// evaluators. Returns the unit and the expression node.
    pub fn parse_standalone_expression(mut self) -> Result<(ParsedUnit, NodeId), ParseError> {
        let expr = self.expression()?;
        if !self.check(TokenType::Eof) {
            return Err(self.unexpected());
        }
        let span = self.ast.span(expr);
        let root = self.ast.push(NodeKind::Program(Vec::new()), span);
        self.ast.set_root(root);
        Ok((
            ParsedUnit {
                ast: self.ast,
                interner: self.interner,
            },
            expr,
        ))
    }

    // ---------------------------------------------------------------------
    // Token helpers

    pub(crate) fn advance(&mut self) {
        let next = self.lexer.next_token();
        self.previous = std::mem::replace(&mut self.current, next);
    }

    pub(crate) fn check(&self, ty: TokenType) -> bool {
        self.current.ty == ty
    }

    pub(crate) fn match_token(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Require a token of the given type, or return an error
    pub(crate) fn consume(&mut self, ty: TokenType) -> Result<Span, ParseError> {
        if self.check(ty) {
            let span = self.current.span;
            self.advance();
            Ok(span)
        } else {
            Err(self.expected(ty.as_str()))
        }
    }

    pub(crate) fn identifier(&mut self) -> Result<(Symbol, Span), ParseError> {
        if self.check(TokenType::Identifier) {
            let span = self.current.span;
            let sym = self.interner.intern(self.current.lexeme);
            self.advance();
            Ok((sym, span))
        } else {
            Err(self.lexer_error_or(ParserError::ExpectedIdentifier {
                span: self.current.span.into(),
            }))
        }
    }

    /// Statement terminator. A missing `;` is reported at the start of the
    /// statement that lacks it.
    pub(crate) fn expect_semicolon(&mut self, stmt_start: Span) -> Result<(), ParseError> {
        if self.match_token(TokenType::Semicolon) {
            return Ok(());
        }
        if self.check(TokenType::Error) {
            return Err(self.unexpected());
        }
        Err(ParseError::new(
            ParserError::MissingSemicolon {
                span: stmt_start.into(),
            },
            stmt_start,
        ))
    }

    /// Run `parse` one nesting level deeper. Past `MAX_NESTING_DEPTH` this
    /// fails at the current token instead of recursing further.
    pub(crate) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.too_deep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn too_deep(&self, limit: u32) -> ParseError {
        let span = self.current.span;
        ParseError::new(
            ParserError::NestingTooDeep {
                limit,
                span: span.into(),
            },
            span,
        )
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint<'src> {
        Checkpoint {
            lexer: self.lexer.clone(),
            current: self.current.clone(),
            previous: self.previous.clone(),
            ast_len: self.ast.len(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint<'src>) {
        self.lexer = checkpoint.lexer;
        self.current = checkpoint.current;
        self.previous = checkpoint.previous;
        self.ast.truncate(checkpoint.ast_len);
    }

    /// If the lexer produced an error token, report that instead of `error`.
    pub(crate) fn lexer_error_or(&mut self, error: ParserError) -> ParseError {
        let span = self.current.span;
        if self.check(TokenType::Error)
            && let Some(lex) = self.lexer.take_errors().into_iter().next()
        {
            return ParseError::new(ParserError::Lexer(lex), span);
        }
        ParseError::new(error, span)
    }

    pub(crate) fn expected(&mut self, what: &str) -> ParseError {
        self.lexer_error_or(ParserError::ExpectedToken {
            expected: what.to_string(),
            found: self.current.lexeme.to_string(),
            span: self.current.span.into(),
        })
    }

    pub(crate) fn unexpected(&mut self) -> ParseError {
        let token = if self.check(TokenType::Eof) {
            TokenType::Eof.as_str().to_string()
        } else {
            self.current.lexeme.to_string()
        };
        self.lexer_error_or(ParserError::UnexpectedToken {
            token,
            span: self.current.span.into(),
        })
    }

    // ---------------------------------------------------------------------
    // Items (program and namespace level)

    fn item(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        match self.current.ty {
            TokenType::KwStruct => {
                let def = self.struct_def(Vec::new())?;
                out.push(def);
            }
            TokenType::KwTemplate => {
                let def = self.template_decl()?;
                out.push(def);
            }
            TokenType::KwUsing => {
                let alias = self.using_decl()?;
                out.push(alias);
            }
            TokenType::KwNamespace => {
                let ns = self.namespace()?;
                out.push(ns);
            }
            TokenType::Semicolon => self.advance(),
            _ => {
                let start = self.current.span;
                let Some(ty) = self.try_declaration_type()? else {
                    return Err(self.unexpected());
                };
                self.declaration(ty, start, true, out)?;
            }
        }
        Ok(())
    }

    fn namespace(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwNamespace)?;
        let (name, _) = self.identifier()?;
        self.consume(TokenType::LBrace)?;
        let mut items = Vec::new();
        while !self.check(TokenType::RBrace) && !self.check(TokenType::Eof) {
            self.item(&mut items)?;
        }
        let end = self.consume(TokenType::RBrace)?;
        Ok(self
            .ast
            .push(NodeKind::Namespace { name, items }, start.merge(end)))
    }

    fn using_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwUsing)?;
        let (name, _) = self.identifier()?;
        self.consume(TokenType::Eq)?;
        let ty = self.type_expr(false)?;
        self.expect_semicolon(start)?;
        self.known_types.insert(name);
        Ok(self
            .ast
            .push(NodeKind::Using { name, ty }, start.merge(self.previous.span)))
    }

    fn template_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwTemplate)?;
        let params = self.template_params()?;
        match self.current.ty {
            TokenType::KwStruct => self.struct_def(params),
            _ => {
                let ty = self.type_expr(false)?;
                let (name, _) = self.identifier()?;
                if !self.check(TokenType::LParen) {
                    return Err(self.expected("("));
                }
                self.function_def(ty, name, params, start)
            }
        }
    }

    fn template_params(&mut self) -> Result<Vec<TemplateParam>, ParseError> {
        self.consume(TokenType::Lt)?;
        let mut params = Vec::new();
        loop {
            match self.current.ty {
                TokenType::KwTypename => {
                    self.advance();
                    let (name, _) = self.identifier()?;
                    self.known_types.insert(name);
                    let default = if self.match_token(TokenType::Eq) {
                        Some(self.type_expr(false)?)
                    } else {
                        None
                    };
                    params.push(TemplateParam::Type { name, default });
                }
                TokenType::KwInt => {
                    self.advance();
                    let (name, _) = self.identifier()?;
                    let default = if self.match_token(TokenType::Eq) {
                        Some(self.template_const_arg()?)
                    } else {
                        None
                    };
                    params.push(TemplateParam::Int { name, default });
                }
                _ => return Err(self.expected("typename or int")),
            }
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        self.close_template()?;
        Ok(params)
    }

    fn struct_def(&mut self, template_params: Vec<TemplateParam>) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwStruct)?;
        let (name, _) = self.identifier()?;
        // Register before the body so members may refer to the struct
        self.known_types.insert(name);
        self.consume(TokenType::LBrace)?;

        let mut members = Vec::new();
        while !self.check(TokenType::RBrace) && !self.check(TokenType::Eof) {
            self.struct_member(name, &mut members)?;
        }
        let mut end = self.consume(TokenType::RBrace)?;
        if self.check(TokenType::Semicolon) {
            end = self.current.span;
            self.advance();
        }
        Ok(self.ast.push(
            NodeKind::StructDef(Box::new(StructDef {
                name,
                members,
                template_params,
            })),
            start.merge(end),
        ))
    }

    fn struct_member(&mut self, owner: Symbol, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        let start = self.current.span;
        match self.current.ty {
            TokenType::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenType::Tilde => {
                self.advance();
                let (name, name_span) = self.identifier()?;
                if name != owner {
                    return Err(ParseError::new(
                        ParserError::UnexpectedToken {
                            token: self.interner.resolve(name).to_string(),
                            span: name_span.into(),
                        },
                        name_span,
                    ));
                }
                self.consume(TokenType::LParen)?;
                self.consume(TokenType::RParen)?;
                let body = self.block()?;
                let ret = TypeExpr::simple(TypeName::Void, start);
                let def = self.ast.push(
                    NodeKind::FunctionDef(Box::new(FunctionDef {
                        ret,
                        name,
                        params: Vec::new(),
                        body,
                        template_params: Vec::new(),
                        is_destructor: true,
                    })),
                    start.merge(self.previous.span),
                );
                out.push(def);
                Ok(())
            }
            TokenType::KwTemplate => {
                let def = self.template_decl()?;
                out.push(def);
                Ok(())
            }
            TokenType::KwUsing => {
                let alias = self.using_decl()?;
                out.push(alias);
                Ok(())
            }
            _ => {
                let Some(ty) = self.try_declaration_type()? else {
                    return Err(self.unexpected());
                };
                self.declaration(ty, start, true, out)
            }
        }
    }

    /// After a type and before the first declarator name: parses either a
    /// function definition or a comma-separated list of variables.
    fn declaration(
        &mut self,
        ty: TypeExpr,
        start: Span,
        allow_functions: bool,
        out: &mut Vec<NodeId>,
    ) -> Result<(), ParseError> {
        let (name, _) = self.identifier()?;
        if self.check(TokenType::LParen) {
            if !allow_functions {
                return Err(self.unexpected());
            }
            let def = self.function_def(ty, name, Vec::new(), start)?;
            out.push(def);
            return Ok(());
        }

        let mut name = name;
        loop {
            let decl_start = self.previous.span;
            let init = if self.match_token(TokenType::Eq) {
                Some(self.initializer()?)
            } else if self.check(TokenType::LBrace) {
                Some(self.init_list()?)
            } else {
                None
            };
            let span = decl_start.merge(self.previous.span);
            out.push(self.ast.push(
                NodeKind::VarDecl(Box::new(VarDecl {
                    ty: ty.clone(),
                    name,
                    init,
                })),
                span,
            ));
            if !self.match_token(TokenType::Comma) {
                break;
            }
            name = self.identifier()?.0;
        }
        self.expect_semicolon(start)
    }

    fn initializer(&mut self) -> Result<NodeId, ParseError> {
        if self.check(TokenType::LBrace) {
            self.nested(Self::init_list)
        } else {
            self.expression()
        }
    }

    pub(crate) fn init_list(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::LBrace)?;
        let mut items = Vec::new();
        while !self.check(TokenType::RBrace) {
            items.push(self.initializer()?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        let end = self.consume(TokenType::RBrace)?;
        Ok(self.ast.push(NodeKind::InitList(items), start.merge(end)))
    }

    fn function_def(
        &mut self,
        ret: TypeExpr,
        name: Symbol,
        template_params: Vec<TemplateParam>,
        start: Span,
    ) -> Result<NodeId, ParseError> {
        self.consume(TokenType::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                let param_start = self.current.span;
                if self.check(TokenType::KwVoid) && !params.is_empty() {
                    return Err(self.unexpected());
                }
                let ty = self.type_expr(false)?;
                if matches!(ty.name, TypeName::Void) && self.check(TokenType::RParen) {
                    // `f(void)`
                    break;
                }
                let (pname, _) = self.identifier()?;
                let default = if self.match_token(TokenType::Eq) {
                    Some(self.expression()?)
                } else {
                    None
                };
                params.push(Param {
                    ty,
                    name: pname,
                    default,
                    span: param_start.merge(self.previous.span),
                });
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RParen)?;
        let body = self.block()?;
        Ok(self.ast.push(
            NodeKind::FunctionDef(Box::new(FunctionDef {
                ret,
                name,
                params,
                body,
                template_params,
                is_destructor: false,
            })),
            start.merge(self.previous.span),
        ))
    }

    // ---------------------------------------------------------------------
    // Statements

    pub(crate) fn block(&mut self) -> Result<NodeId, ParseError> {
        if !self.check(TokenType::LBrace) {
            return Err(self.lexer_error_or(ParserError::ExpectedBlock {
                span: self.current.span.into(),
            }));
        }
        let start = self.current.span;
        self.advance();
        let mut stmts = Vec::new();
        while !self.check(TokenType::RBrace) && !self.check(TokenType::Eof) {
            self.statement(&mut stmts)?;
        }
        let end = self.consume(TokenType::RBrace)?;
        Ok(self.ast.push(NodeKind::Block(stmts), start.merge(end)))
    }

    /// Parse one statement. Declarations with several declarators push one
    /// node each, so the result goes into the enclosing list.
    pub(crate) fn statement(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        self.nested(|p| p.statement_into(out))
    }

    fn statement_into(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        let start = self.current.span;
        let node = match self.current.ty {
            TokenType::LBrace => self.block()?,
            TokenType::KwIf => self.if_stmt()?,
            TokenType::KwWhile => self.while_stmt()?,
            TokenType::KwDo => self.do_while_stmt()?,
            TokenType::KwFor => self.for_stmt()?,
            TokenType::KwSwitch => self.switch_stmt()?,
            TokenType::KwUsing => self.using_decl()?,
            TokenType::KwReturn => {
                self.advance();
                let value = if self.check(TokenType::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_semicolon(start)?;
                self.ast
                    .push(NodeKind::Return(value), start.merge(self.previous.span))
            }
            TokenType::KwBreak => {
                self.advance();
                self.expect_semicolon(start)?;
                self.ast.push(NodeKind::Break, start.merge(self.previous.span))
            }
            TokenType::KwContinue => {
                self.advance();
                self.expect_semicolon(start)?;
                self.ast
                    .push(NodeKind::Continue, start.merge(self.previous.span))
            }
            TokenType::Semicolon => {
                self.advance();
                self.ast.push(NodeKind::Empty, start)
            }
            TokenType::KwStruct | TokenType::KwTemplate | TokenType::KwNamespace => {
                return Err(self.lexer_error_or(ParserError::MisplacedKeyword {
                    keyword: self.current.lexeme.to_string(),
                    span: start.into(),
                }));
            }
            TokenType::KwCase | TokenType::KwDefault | TokenType::KwElse => {
                return Err(self.unexpected());
            }
            _ => {
                if let Some(ty) = self.try_declaration_type()? {
                    return self.declaration(ty, start, false, out);
                }
                let expr = self.expression()?;
                self.expect_semicolon(start)?;
                self.ast
                    .push(NodeKind::ExprStmt(expr), start.merge(self.previous.span))
            }
        };
        out.push(node);
        Ok(())
    }

    /// Parse a statement that must produce exactly one node (loop and branch
    /// bodies). Multi-declarator declarations get wrapped in a block.
    fn single_statement(&mut self) -> Result<NodeId, ParseError> {
        let start = self.current.span;
        let mut nodes = Vec::new();
        self.statement(&mut nodes)?;
        if nodes.len() == 1 {
            Ok(nodes[0])
        } else {
            Ok(self
                .ast
                .push(NodeKind::Block(nodes), start.merge(self.previous.span)))
        }
    }

    fn paren_condition(&mut self) -> Result<NodeId, ParseError> {
        self.consume(TokenType::LParen)?;
        let cond = self.expression()?;
        self.consume(TokenType::RParen)?;
        Ok(cond)
    }

    fn if_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwIf)?;
        let cond = self.paren_condition()?;
        let then_branch = self.single_statement()?;
        // Dangling else binds to the nearest if
        let else_branch = if self.match_token(TokenType::KwElse) {
            Some(self.single_statement()?)
        } else {
            None
        };
        Ok(self.ast.push(
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            },
            start.merge(self.previous.span),
        ))
    }

    fn while_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwWhile)?;
        let cond = self.paren_condition()?;
        let body = self.single_statement()?;
        Ok(self.ast.push(
            NodeKind::While { cond, body },
            start.merge(self.previous.span),
        ))
    }

    fn do_while_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwDo)?;
        let body = self.single_statement()?;
        self.consume(TokenType::KwWhile)?;
        let cond = self.paren_condition()?;
        self.expect_semicolon(start)?;
        Ok(self.ast.push(
            NodeKind::DoWhile { body, cond },
            start.merge(self.previous.span),
        ))
    }

    fn for_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwFor)?;
        self.consume(TokenType::LParen)?;

        // Range-based form: `for (auto& s : data)`
        let checkpoint = self.checkpoint();
        if let Ok(var_ty) = self.type_expr(false)
            && self.check(TokenType::Identifier)
        {
            let (var, _) = self.identifier()?;
            if self.match_token(TokenType::Colon) {
                let iterable = self.expression()?;
                self.consume(TokenType::RParen)?;
                let body = self.single_statement()?;
                return Ok(self.ast.push(
                    NodeKind::ForEach(Box::new(ForEach {
                        var_ty,
                        var,
                        iterable,
                        body,
                    })),
                    start.merge(self.previous.span),
                ));
            }
        }
        self.restore(checkpoint);

        let init = if self.check(TokenType::Semicolon) {
            self.advance();
            None
        } else {
            let mut nodes = Vec::new();
            self.statement(&mut nodes)?;
            match nodes.len() {
                0 => None,
                1 => Some(nodes[0]),
                _ => Some(self.ast.push(NodeKind::Block(nodes), start)),
            }
        };
        let cond = if self.check(TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon)?;
        let step = if self.check(TokenType::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::RParen)?;
        let body = self.single_statement()?;
        Ok(self.ast.push(
            NodeKind::For {
                init,
                cond,
                step,
                body,
            },
            start.merge(self.previous.span),
        ))
    }

    fn switch_stmt(&mut self) -> Result<NodeId, ParseError> {
        let start = self.consume(TokenType::KwSwitch)?;
        let scrutinee = self.paren_condition()?;
        self.consume(TokenType::LBrace)?;

        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.check(TokenType::RBrace) && !self.check(TokenType::Eof) {
            let case_start = self.current.span;
            let value = match self.current.ty {
                TokenType::KwCase => {
                    self.advance();
                    Some(self.expression()?)
                }
                TokenType::KwDefault => {
                    if cases.iter().any(|c| c.value.is_none()) {
                        return Err(ParseError::new(
                            ParserError::DuplicateDefault {
                                span: case_start.into(),
                            },
                            case_start,
                        ));
                    }
                    self.advance();
                    None
                }
                _ => return Err(self.expected("case")),
            };
            self.consume(TokenType::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.current.ty,
                TokenType::KwCase | TokenType::KwDefault | TokenType::RBrace | TokenType::Eof
            ) {
                self.statement(&mut body)?;
            }
            cases.push(SwitchCase {
                value,
                body,
                span: case_start.merge(self.previous.span),
            });
        }
        let end = self.consume(TokenType::RBrace)?;
        Ok(self
            .ast
            .push(NodeKind::Switch { scrutinee, cases }, start.merge(end)))
    }
}
