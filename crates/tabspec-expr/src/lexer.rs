//! Tokenizer for logic expressions

use crate::error::{ParseError, ParseResult};
use std::fmt;

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier (`context`, `OB`, `true`)
    Ident(String),
    /// `@name@` field reference
    Ref(String),
    /// Quoted string, quotes stripped
    Str(String),
    /// Numeric literal
    Number(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    /// `!`, unary not or legacy not-equals depending on position
    Bang,
    /// `=`, `==`, `===`
    Eq,
    /// `!=`, `!==`
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `&`, `&&`
    And,
    /// `|`, `||`
    Or,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Ref(s) => write!(f, "reference '@{s}@'"),
            Self::Str(s) => write!(f, "string '{s}'"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
            Self::Bang => f.write_str("'!'"),
            Self::Eq => f.write_str("'='"),
            Self::Ne => f.write_str("'!='"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::And => f.write_str("'&'"),
            Self::Or => f.write_str("'|'"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#')
}

/// Split an expression into tokens; the result always ends with [`Token::Eof`]
///
/// # Errors
/// Unterminated strings or references, and characters outside the grammar
pub fn tokenize(src: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        match c {
            '\'' | '"' => {
                let start = pos;
                pos += 1;
                let mut s = String::new();
                loop {
                    match chars.get(pos) {
                        None => return Err(ParseError::UnterminatedString { offset: start }),
                        Some(&q) if q == c => {
                            pos += 1;
                            break;
                        }
                        Some('\\') => {
                            if let Some(&escaped) = chars.get(pos + 1) {
                                s.push(escaped);
                            }
                            pos += 2;
                        }
                        Some(&other) => {
                            s.push(other);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '@' => {
                let start = pos;
                pos += 1;
                let mut name = String::new();
                loop {
                    match chars.get(pos) {
                        None => return Err(ParseError::UnterminatedReference { offset: start }),
                        Some('@') => {
                            pos += 1;
                            break;
                        }
                        Some(&other) => {
                            name.push(other);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token::Ref(name.trim().to_string()));
            }
            '(' | ')' | '[' | ']' | ',' | '.' => {
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    _ => Token::Dot,
                });
                pos += 1;
            }
            '=' => {
                let mut len = 1;
                while len < 3 && chars.get(pos + len) == Some(&'=') {
                    len += 1;
                }
                tokens.push(Token::Eq);
                pos += len;
            }
            '!' => {
                if next == Some('=') {
                    pos += if chars.get(pos + 2) == Some(&'=') { 3 } else { 2 };
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Bang);
                    pos += 1;
                }
            }
            '<' | '>' => {
                let or_equal = next == Some('=');
                tokens.push(match (c, or_equal) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::Le,
                    (_, false) => Token::Gt,
                    (_, true) => Token::Ge,
                });
                pos += if or_equal { 2 } else { 1 };
            }
            '&' | '|' => {
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                pos += if next == Some(c) { 2 } else { 1 };
            }
            '-' | '0'..='9' if c.is_ascii_digit() || next.is_some_and(|n| n.is_ascii_digit()) => {
                let start = pos;
                pos += 1;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                let text: String = chars[start..pos].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::UnexpectedChar { ch: c, offset: start })?;
                tokens.push(Token::Number(value));
            }
            _ if is_ident_char(c) => {
                let start = pos;
                while pos < chars.len() && is_ident_char(chars[pos]) {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }
            _ => return Err(ParseError::UnexpectedChar { ch: c, offset: pos }),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_legacy_syntax() {
        let tokens = tokenize("@IsSOTrx@='Y' & @DocStatus@!'VO'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ref("IsSOTrx".into()),
                Token::Eq,
                Token::Str("Y".into()),
                Token::And,
                Token::Ref("DocStatus".into()),
                Token::Bang,
                Token::Str("VO".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_js_syntax() {
        let tokens = tokenize("context.qty >= 10 || !x").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("context".into()),
                Token::Dot,
                Token::Ident("qty".into()),
                Token::Ge,
                Token::Number(10.0),
                Token::Or,
                Token::Bang,
                Token::Ident("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strict_operators_collapse() {
        assert_eq!(tokenize("a===b").unwrap()[1], Token::Eq);
        assert_eq!(tokenize("a!==b").unwrap()[1], Token::Ne);
    }

    #[test]
    fn reports_unterminated_input() {
        assert_eq!(
            tokenize("@name").unwrap_err(),
            ParseError::UnterminatedReference { offset: 0 }
        );
        assert_eq!(
            tokenize("'abc").unwrap_err(),
            ParseError::UnterminatedString { offset: 0 }
        );
        assert!(matches!(
            tokenize("a ~ b").unwrap_err(),
            ParseError::UnexpectedChar { ch: '~', .. }
        ));
    }
}
