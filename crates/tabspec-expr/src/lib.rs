//! Tabspec Expr - display and read-only logic
//!
//! A small expression language for `displayLogic`, `readOnlyIf` and the
//! `*_display_logic` / `*_readonly_logic` fields:
//! - [`lexer`] and [`parser`] build an [`Expr`] tree
//! - [`scope`] layers record, parent and session values
//! - [`ExpressionEvaluator`] caches parses and evaluates to `bool`
//!
//! # Example
//!
//! ```rust,ignore
//! use tabspec_expr::{EvalScope, ExpressionEvaluator, FieldValues};
//!
//! let mut values = FieldValues::new();
//! values.insert("isSOTrx", serde_json::json!(true));
//! let visible = ExpressionEvaluator::new().evaluate("@isSOTrx@='Y'", &EvalScope::new(&values), &diagnostics);
//! ```

#![warn(unreachable_pub)]

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod scope;

pub use ast::{CompareOp, Expr, Literal};
pub use error::{ParseError, ParseResult};
pub use eval::{eval_bool, ExpressionEvaluator};
pub use parser::parse;
pub use scope::{snake_case_alias, EvalScope, FieldValues};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
