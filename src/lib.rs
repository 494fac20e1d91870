//! SchemeXP - tree-walking evaluator for a small Scheme dialect
//!
//! This crate turns a generic parenthesized syntax tree into an executable
//! expression tree and evaluates it against lexically scoped environments.
//! It implements the dialect's binding forms, closures, an exact rational
//! numeric tower, short-circuit logic, mutable pairs and special-form dispatch.
//!
//! ```scheme
//! (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
//! (fact 5)               ; 120
//! (+ 1/2 1/3)            ; 5/6
//! (let ((p (cons 1 2)))
//!   (set-car! p 9)
//!   p)                   ; (9 . 2)
//! '(1 2 . 3)             ; (1 2 . 3)
//! ```
//!
//! ## Pipeline
//!
//! Text is turned into a [`ast::Syntax`] tree by an external reader (the
//! optional [`reader`] module provides one). [`parser::parse`] resolves that
//! tree against the current environment into an [`expr::Expr`], and
//! [`evaluator::eval`] evaluates it. Values are themselves `Expr`s and print
//! through their `Display` implementation.
//!
//! ## Strictness
//!
//! - Integer arithmetic detects overflow instead of wrapping
//! - Arity is checked for every operator, special form and procedure call
//! - Rationals are always kept in lowest terms and collapse to integers
//!
//! ## Modules
//!
//! - `ast`: the generic syntax tree consumed by the parser
//! - `number`: rational/integer normalization and arithmetic
//! - `expr`: the expression model and canonical value printing
//! - `builtinops`: primitive and special-form registry
//! - `environment`: chained lexical frames
//! - `parser`: syntax tree to expression conversion, including quoting
//! - `evaluator`: the recursive `eval`
//! - `reader`: S-expression text reader (feature `reader`)

use std::fmt;

use thiserror::Error;

use crate::builtinops::Arity;

/// Maximum reader nesting depth.
/// Limits deeply nested lists and quote shorthands in source text.
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum evaluation depth.
/// Each nested `eval` call (sub-expression, procedure body) counts one level.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with a context snippet taken from `input` around `error_offset`
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        // Keep the snippet on one line
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// Every error aborts the current `parse`/`eval` call chain; callers such as
/// a REPL decide whether to report and continue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(ParseError),

    #[error("UnboundVariable: {0}")]
    UnboundVariable(String),

    #[error("UnboundAssignment: cannot set! undefined variable {0}")]
    UnboundAssignment(String),

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("ArityError: {form}: expected {expected} arguments, got {got}")]
    ArityError {
        form: String,
        expected: Arity,
        got: usize,
    },

    #[error("DivisionByZero: division by zero")]
    DivisionByZero,

    #[error("Overflow: integer overflow in {0}")]
    Overflow(String),

    #[error("UndefinedOperation: {0}")]
    UndefinedOperation(String),

    #[error("MalformedForm: {0}")]
    MalformedForm(String),

    #[error("InvalidVariableName: {0:?} is not a valid variable name")]
    InvalidVariableName(String),

    #[error("NotAProcedure: attempt to apply a non-procedure: {0}")]
    NotAProcedure(String),

    #[error("EvalDepthExceeded: evaluation depth limit exceeded (max: {0})")]
    EvalDepthExceeded(usize),
}

impl Error {
    /// Create an ArityError for the named operator, form or procedure
    pub fn arity_error(form: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityError {
            form: form.into(),
            expected,
            got,
        }
    }

    pub(crate) fn type_error(operator: &str, expected: &str, got: &impl fmt::Display) -> Self {
        Error::TypeError(format!("{operator} expected {expected}, got {got}"))
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedForm(message.into())
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod expr;
pub mod number;
pub mod parser;

#[cfg(feature = "reader")]
pub mod reader;

pub use environment::Environment;
pub use evaluator::eval;
pub use expr::Expr;
pub use parser::parse;
