//! Expression errors

/// Failure to tokenize or parse a logic expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Nothing to parse
    #[error("empty expression")]
    Empty,

    /// Character outside the grammar
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar {
        /// Offending character
        ch: char,
        /// Character offset
        offset: usize,
    },

    /// String literal without closing quote
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString {
        /// Offset of the opening quote
        offset: usize,
    },

    /// `@name` without closing `@`
    #[error("unterminated @reference@ starting at offset {offset}")]
    UnterminatedReference {
        /// Offset of the opening `@`
        offset: usize,
    },

    /// Token the parser did not expect
    #[error("unexpected {found} at token {index}")]
    UnexpectedToken {
        /// Description of the token found
        found: String,
        /// Token index
        index: usize,
    },

    /// Parentheses or negations nested past the parser's limit
    #[error("expression nested deeper than {limit} levels")]
    TooDeep {
        /// Maximum nesting depth
        limit: usize,
    },

    /// Dotted path or call not in the supported set
    #[error("unsupported reference '{path}'")]
    UnsupportedReference {
        /// Path as written
        path: String,
    },
}

/// Result type alias for parsing
pub type ParseResult<T> = Result<T, ParseError>;
