// src/lexer/mod.rs

mod numbers;

use crate::errors::LexerError;
use crate::{Span, Token, TokenType};

/// Smallest byte value that starts a multi-byte UTF-8 sequence (non-ASCII).
const UTF8_MULTIBYTE: u8 = 0x80;

/// On-demand tokenizer. Cloning the lexer saves a cursor the parser can
/// restore when a speculative parse fails.
#[derive(Clone)]
pub struct Lexer<'src> {
    pub(crate) source: &'src str,
    pub(crate) bytes: &'src [u8],
    pub(crate) current: usize,
    pub(crate) start: usize,
    pub(crate) line: u32,
    pub(crate) column: u32,
    pub(crate) start_column: u32,
    pub(crate) start_line: u32,
    pub(crate) errors: Vec<LexerError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_column: 1,
            start_line: 1,
            errors: Vec::new(),
        }
    }

    /// Take all collected errors, leaving the internal list empty.
    pub fn take_errors(&mut self) -> Vec<LexerError> {
        std::mem::take(&mut self.errors)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Get the next token from the source
    pub fn next_token(&mut self) -> Token<'src> {
        if let Some(error) = self.skip_trivia() {
            return error;
        }

        self.start = self.current;
        self.start_column = self.column;
        self.start_line = self.line;

        let Some(c) = self.advance() else {
            return self.make_token(TokenType::Eof);
        };

        match c {
            '(' => self.make_token(TokenType::LParen),
            ')' => self.make_token(TokenType::RParen),
            '{' => self.make_token(TokenType::LBrace),
            '}' => self.make_token(TokenType::RBrace),
            '[' => self.make_token(TokenType::LBracket),
            ']' => self.make_token(TokenType::RBracket),
            ',' => self.make_token(TokenType::Comma),
            ';' => self.make_token(TokenType::Semicolon),
            '?' => self.make_token(TokenType::Question),
            '~' => self.make_token(TokenType::Tilde),
            ':' => {
                if self.match_byte(b':') {
                    self.make_token(TokenType::ColonColon)
                } else {
                    self.make_token(TokenType::Colon)
                }
            }
            '+' => {
                if self.match_byte(b'+') {
                    self.make_token(TokenType::PlusPlus)
                } else if self.match_byte(b'=') {
                    self.make_token(TokenType::PlusEq)
                } else {
                    self.make_token(TokenType::Plus)
                }
            }
            '-' => {
                if self.match_byte(b'-') {
                    self.make_token(TokenType::MinusMinus)
                } else if self.match_byte(b'=') {
                    self.make_token(TokenType::MinusEq)
                } else {
                    self.make_token(TokenType::Minus)
                }
            }
            '*' => self.with_eq(TokenType::Star, TokenType::StarEq),
            '/' => self.with_eq(TokenType::Slash, TokenType::SlashEq),
            '%' => self.with_eq(TokenType::Percent, TokenType::PercentEq),
            '=' => self.with_eq(TokenType::Eq, TokenType::EqEq),
            '!' => self.with_eq(TokenType::Bang, TokenType::BangEq),
            '^' => self.with_eq(TokenType::Caret, TokenType::CaretEq),
            '&' => {
                if self.match_byte(b'&') {
                    self.make_token(TokenType::AmpAmp)
                } else if self.match_byte(b'=') {
                    self.make_token(TokenType::AmpEq)
                } else {
                    self.make_token(TokenType::Ampersand)
                }
            }
            '|' => {
                if self.match_byte(b'|') {
                    self.make_token(TokenType::PipePipe)
                } else if self.match_byte(b'=') {
                    self.make_token(TokenType::PipeEq)
                } else {
                    self.make_token(TokenType::Pipe)
                }
            }
            '<' => {
                if self.match_byte(b'<') {
                    self.make_token(TokenType::LessLess)
                } else if self.match_byte(b'=') {
                    self.make_token(TokenType::LtEq)
                } else {
                    self.make_token(TokenType::Lt)
                }
            }
            '>' => {
                if self.match_byte(b'>') {
                    self.make_token(TokenType::GreaterGreater)
                } else if self.match_byte(b'=') {
                    self.make_token(TokenType::GtEq)
                } else {
                    self.make_token(TokenType::Gt)
                }
            }
            '.' => {
                if self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                    self.fraction()
                } else {
                    self.make_token(TokenType::Dot)
                }
            }

            c if c.is_ascii_digit() => self.number(),

            c if c == '_' || unicode_ident::is_xid_start(c) => self.identifier(),

            _ => self.error_unexpected_char(c),
        }
    }

    /// Skip whitespace and comments. Returns an error token for an
    /// unterminated block comment.
    fn skip_trivia(&mut self) -> Option<Token<'src>> {
        while self.current < self.bytes.len() {
            match self.bytes[self.current] {
                b' ' | b'\t' | b'\r' => {
                    self.current += 1;
                    self.column += 1;
                }
                b'\n' => {
                    self.current += 1;
                    self.line += 1;
                    self.column = 1;
                }
                b'/' if self.bytes.get(self.current + 1) == Some(&b'/') => {
                    self.skip_line_comment();
                }
                b'/' if self.bytes.get(self.current + 1) == Some(&b'*') => {
                    if let Some(error) = self.skip_block_comment() {
                        return Some(error);
                    }
                }
                _ => break,
            }
        }
        None
    }

    fn skip_line_comment(&mut self) {
        while self.current < self.bytes.len() && self.bytes[self.current] != b'\n' {
            self.current += 1;
            self.column += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Option<Token<'src>> {
        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.column;
        self.current += 2;
        self.column += 2;

        while self.current < self.bytes.len() {
            if self.bytes[self.current] == b'*' && self.bytes.get(self.current + 1) == Some(&b'/')
            {
                self.current += 2;
                self.column += 2;
                return None;
            }
            if self.bytes[self.current] == b'\n' {
                self.line += 1;
                self.column = 1;
                self.current += 1;
            } else {
                self.advance();
            }
        }

        let span = self.current_span();
        tracing::debug!(line = self.start_line, col = self.start_column, "lexer error: unterminated comment");
        self.errors.push(LexerError::UnterminatedComment { span: span.into() });
        Some(Token::new(TokenType::Error, &self.source[self.start..self.current], span))
    }

    /// Advance to the next character and return it.
    #[inline]
    pub(crate) fn advance(&mut self) -> Option<char> {
        let b = *self.bytes.get(self.current)?;
        if b < UTF8_MULTIBYTE {
            self.current += 1;
            self.column += 1;
            Some(b as char)
        } else {
            let c = self.source[self.current..].chars().next()?;
            self.current += c.len_utf8();
            self.column += 1;
            Some(c)
        }
    }

    #[inline]
    pub(crate) fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.current).copied()
    }

    #[inline]
    pub(crate) fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.current + offset).copied()
    }

    /// Consume the next byte if it matches (ASCII only).
    #[inline]
    fn match_byte(&mut self, expected: u8) -> bool {
        debug_assert!(expected < UTF8_MULTIBYTE, "match_byte only works for ASCII");
        if self.peek_byte() == Some(expected) {
            self.current += 1;
            self.column += 1;
            true
        } else {
            false
        }
    }

    fn with_eq(&mut self, plain: TokenType, with_eq: TokenType) -> Token<'src> {
        if self.match_byte(b'=') {
            self.make_token(with_eq)
        } else {
            self.make_token(plain)
        }
    }

    fn current_span(&self) -> Span {
        Span::new_with_end(
            self.start,
            self.current,
            self.start_line,
            self.start_column,
            self.line,
            self.column,
        )
    }

    /// Create a token from start to current position
    pub(crate) fn make_token(&self, ty: TokenType) -> Token<'src> {
        Token::new(ty, &self.source[self.start..self.current], self.current_span())
    }

    fn error_unexpected_char(&mut self, c: char) -> Token<'src> {
        let span = self.current_span();
        tracing::debug!(char = %c, line = self.start_line, col = self.start_column, "lexer error: unexpected character");
        self.errors.push(LexerError::UnexpectedCharacter {
            ch: c,
            span: span.into(),
        });
        self.make_token(TokenType::Error)
    }

    pub(crate) fn error_invalid_number(&mut self) -> Token<'src> {
        let span = self.current_span();
        self.errors.push(LexerError::InvalidNumber { span: span.into() });
        self.make_token(TokenType::Error)
    }

    /// Scan an identifier or keyword.
    fn identifier(&mut self) -> Token<'src> {
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.current += 1;
                self.column += 1;
            } else if b >= UTF8_MULTIBYTE {
                match self.source[self.current..].chars().next() {
                    Some(c) if unicode_ident::is_xid_continue(c) => {
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        let text = &self.source[self.start..self.current];
        let ty = TokenType::keyword_type(text).unwrap_or(TokenType::Identifier);
        self.make_token(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = matches!(token.ty, TokenType::Eof | TokenType::Error);
            out.push(token.ty);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn declaration_tokens() {
        assert_eq!(
            kinds("span<float, 4> data;"),
            vec![
                TokenType::KwSpan,
                TokenType::Lt,
                TokenType::KwFloat,
                TokenType::Comma,
                TokenType::IntLiteral,
                TokenType::Gt,
                TokenType::Identifier,
                TokenType::Semicolon,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn operators_are_maximal_munch() {
        assert_eq!(
            kinds("a += b++ >> 2 && c::d"),
            vec![
                TokenType::Identifier,
                TokenType::PlusEq,
                TokenType::Identifier,
                TokenType::PlusPlus,
                TokenType::GreaterGreater,
                TokenType::IntLiteral,
                TokenType::AmpAmp,
                TokenType::Identifier,
                TokenType::ColonColon,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_lines_tracked() {
        let mut lexer = Lexer::new("// header\n/* multi\nline */ x");
        let token = lexer.next_token();
        assert_eq!(token.ty, TokenType::Identifier);
        assert_eq!(token.lexeme, "x");
        assert_eq!(token.span.line, 3);
        assert_eq!(token.span.column, 9);
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let mut lexer = Lexer::new("int x; /* never closed");
        let mut last = lexer.next_token();
        while !matches!(last.ty, TokenType::Eof | TokenType::Error) {
            last = lexer.next_token();
        }
        assert_eq!(last.ty, TokenType::Error);
        assert_eq!(last.span.column, 8);
        assert!(matches!(
            lexer.take_errors().as_slice(),
            [LexerError::UnterminatedComment { .. }]
        ));
    }

    #[test]
    fn invalid_character_reports_location() {
        let mut lexer = Lexer::new("int x = 1;\nx = $;");
        let mut token = lexer.next_token();
        while token.ty != TokenType::Error {
            token = lexer.next_token();
        }
        assert_eq!((token.span.line, token.span.column), (2, 5));
        assert!(lexer.has_errors());
    }

    #[test]
    fn saved_cursor_restarts() {
        let mut lexer = Lexer::new("a b c");
        lexer.next_token();
        let saved = lexer.clone();
        assert_eq!(lexer.next_token().lexeme, "b");
        let mut restored = saved;
        assert_eq!(restored.next_token().lexeme, "b");
    }
}
