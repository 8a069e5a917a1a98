// src/token.rs

/// Single source of truth for keyword-to-token mapping.
///
/// Each entry `"text" => Variant` generates a match arm in both
/// `TokenType::keyword_type` and `TokenType::as_str`.
macro_rules! define_keywords {
    ( $( $text:literal => $variant:ident ),+ $(,)? ) => {
        impl TokenType {
            /// Check if a string is a keyword and return its token type.
            pub fn keyword_type(text: &str) -> Option<TokenType> {
                match text {
                    $( $text => Some(TokenType::$variant), )+
                    _ => None,
                }
            }

            fn keyword_as_str(&self) -> Option<&'static str> {
                match self {
                    $( Self::$variant => Some($text), )+
                    _ => None,
                }
            }
        }
    };
}

define_keywords! {
    // Statements and declarations
    "if"        => KwIf,
    "else"      => KwElse,
    "for"       => KwFor,
    "while"     => KwWhile,
    "do"        => KwDo,
    "switch"    => KwSwitch,
    "case"      => KwCase,
    "default"   => KwDefault,
    "return"    => KwReturn,
    "break"     => KwBreak,
    "continue"  => KwContinue,
    "struct"    => KwStruct,
    "template"  => KwTemplate,
    "typename"  => KwTypename,
    "using"     => KwUsing,
    "namespace" => KwNamespace,
    "const"     => KwConst,
    "static"    => KwStatic,
    "true"      => KwTrue,
    "false"     => KwFalse,
    // Type keywords
    "int"       => KwInt,
    "float"     => KwFloat,
    "double"    => KwDouble,
    "bool"      => KwBool,
    "void"      => KwVoid,
    "auto"      => KwAuto,
    "block"     => KwBlock,
    "span"      => KwSpan,
    "dyn"       => KwDyn,
}

/// All token types in the SNEX language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Literals
    IntLiteral,
    FloatLiteral,  // 1.0f
    DoubleLiteral, // 1.0
    Identifier,

    KwIf,
    KwElse,
    KwFor,
    KwWhile,
    KwDo,
    KwSwitch,
    KwCase,
    KwDefault,
    KwReturn,
    KwBreak,
    KwContinue,
    KwStruct,
    KwTemplate,
    KwTypename,
    KwUsing,
    KwNamespace,
    KwConst,
    KwStatic,
    KwTrue,
    KwFalse,

    KwInt,
    KwFloat,
    KwDouble,
    KwBool,
    KwVoid,
    KwAuto,
    KwBlock,
    KwSpan,
    KwDyn,

    // Operators
    Plus,
    PlusPlus,
    PlusEq,
    Minus,
    MinusMinus,
    MinusEq,
    Star,
    StarEq,
    Slash,
    SlashEq,
    Percent,
    PercentEq,
    Eq,
    EqEq,
    Bang,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LessLess,       // <<
    GreaterGreater, // >>
    Ampersand,
    AmpAmp,
    AmpEq,
    Pipe,
    PipePipe,
    PipeEq,
    Caret,
    CaretEq,
    Tilde,
    Question,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    ColonColon,
    Dot,

    // Special
    Eof,
    Error,
}

impl TokenType {
    /// Get string representation for error messages
    pub fn as_str(&self) -> &'static str {
        if let Some(s) = self.keyword_as_str() {
            return s;
        }
        match self {
            Self::IntLiteral => "integer",
            Self::FloatLiteral => "float",
            Self::DoubleLiteral => "double",
            Self::Identifier => "identifier",
            Self::Plus => "+",
            Self::PlusPlus => "++",
            Self::PlusEq => "+=",
            Self::Minus => "-",
            Self::MinusMinus => "--",
            Self::MinusEq => "-=",
            Self::Star => "*",
            Self::StarEq => "*=",
            Self::Slash => "/",
            Self::SlashEq => "/=",
            Self::Percent => "%",
            Self::PercentEq => "%=",
            Self::Eq => "=",
            Self::EqEq => "==",
            Self::Bang => "!",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::LessLess => "<<",
            Self::GreaterGreater => ">>",
            Self::Ampersand => "&",
            Self::AmpAmp => "&&",
            Self::AmpEq => "&=",
            Self::Pipe => "|",
            Self::PipePipe => "||",
            Self::PipeEq => "|=",
            Self::Caret => "^",
            Self::CaretEq => "^=",
            Self::Tilde => "~",
            Self::Question => "?",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::ColonColon => "::",
            Self::Dot => ".",
            Self::Eof => "end of file",
            Self::Error => "error",
            // All keyword variants are handled by `keyword_as_str()` above.
            _ => unreachable!("keyword variant not covered by define_keywords! macro"),
        }
    }

    /// Get precedence for binary operators (precedence climbing).
    ///
    /// Assignment and the ternary operator are handled outside the table.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::PipePipe => 3,
            Self::AmpAmp => 4,
            Self::Pipe => 5,
            Self::Caret => 6,
            Self::Ampersand => 7,
            Self::EqEq | Self::BangEq => 8,
            Self::Lt | Self::Gt | Self::LtEq | Self::GtEq => 9,
            Self::LessLess | Self::GreaterGreater => 10,
            Self::Plus | Self::Minus => 11,
            Self::Star | Self::Slash | Self::Percent => 12,
            _ => 0,
        }
    }

    /// Keywords that start a type expression.
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            Self::KwInt
                | Self::KwFloat
                | Self::KwDouble
                | Self::KwBool
                | Self::KwVoid
                | Self::KwAuto
                | Self::KwBlock
                | Self::KwSpan
                | Self::KwDyn
        )
    }
}

/// Precedence floor used for template const arguments so `<`, `>` and `>>`
/// close the argument list instead of being parsed as operators.
pub const TEMPLATE_ARG_PRECEDENCE: u8 = 10;

pub use snex_identity::Span;

/// A token with its location in source code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub ty: TokenType,
    pub lexeme: &'src str,
    pub span: Span,
}

impl<'src> Token<'src> {
    pub fn new(ty: TokenType, lexeme: &'src str, span: Span) -> Self {
        Self { ty, lexeme, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip() {
        for text in ["struct", "template", "span", "dyn", "block", "namespace"] {
            let ty = TokenType::keyword_type(text).unwrap();
            assert_eq!(ty.as_str(), text);
        }
        assert_eq!(TokenType::keyword_type("processFrame"), None);
    }

    #[test]
    fn product_binds_tighter_than_sum() {
        assert!(TokenType::Star.precedence() > TokenType::Plus.precedence());
        assert!(TokenType::Plus.precedence() > TokenType::Lt.precedence());
        assert!(TokenType::Lt.precedence() > TokenType::AmpAmp.precedence());
        assert!(TokenType::AmpAmp.precedence() > TokenType::PipePipe.precedence());
        assert_eq!(TokenType::Eq.precedence(), 0);
    }
}
