// src/lexer/numbers.rs
//
// Number literal lexing: decimal and hex integers, doubles, and `f`-suffixed
// floats with optional exponents.

use crate::{Token, TokenType};

use super::Lexer;

impl<'src> Lexer<'src> {
    /// Scan a number whose first digit was already consumed.
    pub(super) fn number(&mut self) -> Token<'src> {
        let first = self.bytes[self.start];
        if first == b'0' && matches!(self.peek_byte(), Some(b'x' | b'X')) {
            return self.hex_number();
        }

        self.consume_digits();

        match self.peek_byte() {
            Some(b'.') => {
                // A dot after a digit run always continues the literal (`2.`, `2.f`).
                self.current += 1;
                self.column += 1;
                self.fraction_tail()
            }
            Some(b'e' | b'E') if self.exponent_ahead() => {
                self.consume_exponent();
                self.float_suffix()
            }
            Some(b'f' | b'F') => {
                self.current += 1;
                self.column += 1;
                self.make_token(TokenType::FloatLiteral)
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                self.consume_identifier_tail();
                self.error_invalid_number()
            }
            _ => self.make_token(TokenType::IntLiteral),
        }
    }

    /// Scan a number that started with `.` (e.g. `.5f`); the dot was consumed.
    pub(super) fn fraction(&mut self) -> Token<'src> {
        self.fraction_tail()
    }

    fn fraction_tail(&mut self) -> Token<'src> {
        self.consume_digits();
        if matches!(self.peek_byte(), Some(b'e' | b'E')) && self.exponent_ahead() {
            self.consume_exponent();
        }
        self.float_suffix()
    }

    fn float_suffix(&mut self) -> Token<'src> {
        if matches!(self.peek_byte(), Some(b'f' | b'F')) {
            self.current += 1;
            self.column += 1;
            return self.make_token(TokenType::FloatLiteral);
        }
        if self
            .peek_byte()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.consume_identifier_tail();
            return self.error_invalid_number();
        }
        self.make_token(TokenType::DoubleLiteral)
    }

    fn hex_number(&mut self) -> Token<'src> {
        // Consume the 'x'
        self.current += 1;
        self.column += 1;
        let digits_start = self.current;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_hexdigit() {
                self.current += 1;
                self.column += 1;
            } else {
                break;
            }
        }
        if self.current == digits_start {
            return self.error_invalid_number();
        }
        self.make_token(TokenType::IntLiteral)
    }

    fn consume_digits(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_digit() {
                self.current += 1;
                self.column += 1;
            } else {
                break;
            }
        }
    }

    /// True if an `e` at the cursor starts a well-formed exponent.
    fn exponent_ahead(&self) -> bool {
        match self.peek_byte_at(1) {
            Some(b'+' | b'-') => self.peek_byte_at(2).is_some_and(|b| b.is_ascii_digit()),
            Some(b) => b.is_ascii_digit(),
            None => false,
        }
    }

    fn consume_exponent(&mut self) {
        self.current += 1;
        self.column += 1;
        if matches!(self.peek_byte(), Some(b'+' | b'-')) {
            self.current += 1;
            self.column += 1;
        }
        self.consume_digits();
    }

    fn consume_identifier_tail(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.current += 1;
                self.column += 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Lexer, TokenType};

    fn single(source: &str) -> (TokenType, String) {
        let mut lexer = Lexer::new(source);
        let token = lexer.next_token();
        (token.ty, token.lexeme.to_string())
    }

    #[test]
    fn literal_kinds() {
        assert_eq!(single("42").0, TokenType::IntLiteral);
        assert_eq!(single("0x1F").0, TokenType::IntLiteral);
        assert_eq!(single("1.5").0, TokenType::DoubleLiteral);
        assert_eq!(single("1.5f").0, TokenType::FloatLiteral);
        assert_eq!(single("2.f").0, TokenType::FloatLiteral);
        assert_eq!(single(".25f").0, TokenType::FloatLiteral);
        assert_eq!(single("1e3").0, TokenType::DoubleLiteral);
        assert_eq!(single("3f").0, TokenType::FloatLiteral);
        assert_eq!(single("2.5e-2f"), (TokenType::FloatLiteral, "2.5e-2f".to_string()));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        assert_eq!(single("12abc").0, TokenType::Error);
        assert_eq!(single("0x").0, TokenType::Error);
        assert_eq!(single("1.5q").0, TokenType::Error);
    }
}
