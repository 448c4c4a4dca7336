//! Expression evaluation
//!
//! [`ExpressionEvaluator::evaluate`] never fails: an expression that does not
//! parse evaluates to `false` and leaves an `ExpressionEvaluation`
//! diagnostic. Parsed trees are cached per expression text.
//!
//! # Semantics
//!
//! - Booleans read from the scope compare as `"Y"` / `"N"`.
//! - A missing reference is `null`; `null` equals the empty string.
//! - Equality is loose: `'10' = 10` holds.
//! - Ordering compares numerically when both sides are numbers, otherwise
//!   as strings; any `null` operand makes an ordering false.

use crate::ast::{CompareOp, Expr, Literal};
use crate::error::ParseError;
use crate::parser::parse;
use crate::scope::EvalScope;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tabspec_model::{DiagnosticKind, Diagnostics};

#[derive(Debug)]
struct CachedParse {
    parsed: Result<Arc<Expr>, ParseError>,
    /// Set once the parse failure has been reported
    reported: AtomicBool,
}

/// Evaluates display / read-only logic
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    cache: RwLock<HashMap<String, Arc<CachedParse>>>,
}

impl ExpressionEvaluator {
    /// Create evaluator with an empty parse cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse (or fetch from cache) an expression
    ///
    /// # Errors
    /// The parse error, also cached
    pub fn parse(&self, text: &str) -> Result<Arc<Expr>, ParseError> {
        self.cached_parse(text).parsed.clone()
    }

    fn cached_parse(&self, text: &str) -> Arc<CachedParse> {
        if let Some(cached) = self.cache.read().get(text) {
            return Arc::clone(cached);
        }
        let entry = Arc::new(CachedParse {
            parsed: parse(text).map(Arc::new),
            reported: AtomicBool::new(false),
        });
        Arc::clone(self.cache.write().entry(text.to_string()).or_insert(entry))
    }

    /// Names an expression references; empty when it does not parse
    #[must_use]
    pub fn references(&self, text: &str) -> Vec<String> {
        self.parse(text)
            .map(|expr| expr.references().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Evaluate an expression to a boolean
    ///
    /// Parse failures yield `false` and a diagnostic, reported once per
    /// expression text.
    pub fn evaluate(&self, text: &str, scope: &EvalScope<'_>, diagnostics: &Diagnostics) -> bool {
        let cached = self.cached_parse(text);
        match &cached.parsed {
            Ok(expr) => {
                let result = eval_bool(expr, scope);
                tracing::trace!(expression = text, result, "evaluated logic");
                result
            }
            Err(err) => {
                if !cached.reported.swap(true, AtomicOrdering::Relaxed) {
                    diagnostics.report(
                        DiagnosticKind::ExpressionEvaluation,
                        text,
                        err.to_string(),
                    );
                }
                false
            }
        }
    }

    /// Evaluate an optional expression, using `default` when there is none
    pub fn evaluate_or(
        &self,
        text: Option<&str>,
        default: bool,
        scope: &EvalScope<'_>,
        diagnostics: &Diagnostics,
    ) -> bool {
        match text.map(str::trim) {
            Some(text) if !text.is_empty() => self.evaluate(text, scope, diagnostics),
            _ => default,
        }
    }

    /// Number of cached expression texts
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

/// Evaluate an already parsed expression
#[must_use]
pub fn eval_bool(expr: &Expr, scope: &EvalScope<'_>) -> bool {
    match expr {
        Expr::Or(lhs, rhs) => eval_bool(lhs, scope) || eval_bool(rhs, scope),
        Expr::And(lhs, rhs) => eval_bool(lhs, scope) && eval_bool(rhs, scope),
        Expr::Not(inner) => !eval_bool(inner, scope),
        Expr::Compare { op, lhs, rhs } => compare(*op, &operand(lhs, scope), &operand(rhs, scope)),
        Expr::Literal(_) | Expr::Ref(_) => truthy(&operand(expr, scope)),
    }
}

fn operand(expr: &Expr, scope: &EvalScope<'_>) -> Value {
    match expr {
        Expr::Literal(Literal::Bool(b)) => Value::Bool(*b),
        Expr::Literal(Literal::Null) => Value::Null,
        Expr::Literal(Literal::Number(n)) => {
            serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
        }
        Expr::Literal(Literal::Str(s)) => Value::String(s.clone()),
        Expr::Ref(name) => scope.lookup(name).map_or(Value::Null, normalize),
        other => Value::Bool(eval_bool(other, scope)),
    }
}

/// Scope booleans compare as `Y` / `N`
fn normalize(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::String((if *b { "Y" } else { "N" }).to_string()),
        other => other.clone(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "N" | "false"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => (if *b { "Y" } else { "N" }).to_string(),
        other => other.to_string(),
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(lhs), as_number(rhs)) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => as_text(lhs) == as_text(rhs),
        },
        _ => as_text(lhs) == as_text(rhs),
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if lhs.is_null() || rhs.is_null() {
        return None;
    }
    match (as_number(lhs), as_number(rhs)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(as_text(lhs).cmp(&as_text(rhs))),
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_eq(lhs, rhs),
        CompareOp::Ne => !loose_eq(lhs, rhs),
        CompareOp::Lt => ordering(lhs, rhs) == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering(lhs, rhs), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering(lhs, rhs) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            ordering(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}
