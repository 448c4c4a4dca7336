//! Recursive-descent parser
//!
//! ```text
//! expr    := or
//! or      := and (('|' | '||') and)*
//! and     := unary (('&' | '&&') unary)*
//! unary   := '!' unary | cmp
//! cmp     := operand (op operand)?
//! operand := literal | ref | '(' expr ')'
//! ```
//!
//! A `!` directly after an operand is the legacy not-equals operator
//! (`@DocStatus@!'VO'`).

use crate::ast::{CompareOp, Expr, Literal};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Token};

/// Record-scope prefixes: `context.x`, `currentValues['x']`
const SCOPE_OBJECTS: [&str; 4] = ["context", "currentValues", "values", "record"];

/// Deepest nesting of parentheses, negations and call arguments
pub const MAX_DEPTH: usize = 64;

/// Parse an expression
///
/// # Errors
/// Any lexical or syntax error, or a reference form outside the grammar
pub fn parse(src: &str) -> ParseResult<Expr> {
    if src.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    parser.expect(&Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedToken {
            found: self.peek().to_string(),
            index: self.pos,
        }
    }

    fn nested<T>(&mut self, step: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Bang) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_operand()?;
        let op = match self.peek() {
            Token::Eq => CompareOp::Eq,
            Token::Ne | Token::Bang => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_operand()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_operand(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Ref(name) => Ok(Expr::Ref(name)),
            Token::LParen => {
                let inner = self.nested(Self::parse_or)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Literal::Null)),
                _ => self.parse_path(word),
            },
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    /// Dotted/bracketed path, optionally called: `OB.Utilities.getValue(obj, 'x')`
    fn parse_path(&mut self, first: String) -> ParseResult<Expr> {
        let mut path = vec![first];
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Token::Ident(segment) => path.push(segment),
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.unexpected());
                    }
                }
            } else if self.eat(&Token::LBracket) {
                match self.advance() {
                    Token::Str(segment) => path.push(segment),
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.unexpected());
                    }
                }
                self.expect(&Token::RBracket)?;
            } else {
                break;
            }
        }

        if self.eat(&Token::LParen) {
            let mut args = Vec::new();
            if !self.eat(&Token::RParen) {
                loop {
                    args.push(self.nested(Self::parse_or)?);
                    if self.eat(&Token::RParen) {
                        break;
                    }
                    self.expect(&Token::Comma)?;
                }
            }
            return resolve_call(&path, &args);
        }

        match path.as_slice() {
            [name] => Ok(Expr::Ref(name.clone())),
            [scope, name] if SCOPE_OBJECTS.contains(&scope.as_str()) => Ok(Expr::Ref(name.clone())),
            _ => Err(ParseError::UnsupportedReference {
                path: path.join("."),
            }),
        }
    }
}

fn resolve_call(path: &[String], args: &[Expr]) -> ParseResult<Expr> {
    let joined = path.join(".");
    let name_arg = match joined.as_str() {
        "OB.Utilities.getValue" => args.get(1),
        "OB.PropertyStore.get" => args.first(),
        _ => None,
    };
    match name_arg {
        Some(Expr::Literal(Literal::Str(name))) => Ok(Expr::Ref(name.clone())),
        _ => Err(ParseError::UnsupportedReference {
            path: format!("{joined}(..)"),
        }),
    }
}
