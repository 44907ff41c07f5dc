//! Crono - a tree-walking evaluator for a small homoiconic Lisp
//!
//! Code and data share one cell structure ([`ast::Value`]); programs are evaluated
//! directly against it. Functions are first-class and curry automatically when
//! called with fewer arguments than they declare:
//!
//! ```scheme
//! (define add1 (\ (n) (+ n 1)))   ; closure over n
//! (add1 5)                         ; => 6
//! (+ 1)                            ; => (\ (%1) (+ 1 %1))
//! ((+ 1) 2)                        ; => 3
//! ```
//!
//! ## Evaluation levels
//!
//! Every dispatch step runs at one of three levels (see [`function::EvalLevel`]):
//! `Full` reduces eagerly and fails on unbound names, `Partial` reduces what it can and
//! carries free names forward (this is how closures curry), and `None` returns its
//! input unchanged (quoting, and the operands of special forms).
//!
//! ## Types
//!
//! Arguments are checked against nominal [`types::TypeTag`]s that form a single
//! inheritance hierarchy rooted at `:any`. Structs mint their own tags, so an instance
//! of a derived struct is accepted wherever its parent is.
//!
//! ## Modules
//!
//! - `ast`: the value model
//! - `types`: type tags and the base hierarchy
//! - `environment`: value/type/struct namespaces
//! - `function`: native functions, closures and the callable view
//! - `structs`: struct templates and instances
//! - `evaluator`: the dispatch algorithm
//! - `builtinops`: native function and special form registry
//! - `package`: extension packages
//! - `reader`: S-expression text reader (feature `reader`)

use std::fmt;
use thiserror::Error;

/// Maximum nesting accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum evaluator nesting before evaluation is abandoned with [`Error::DepthExceeded`]
///
/// Each closure call costs a handful of dispatch steps, so this allows recursion a few
/// thousand calls deep. The host stack grows on demand underneath.
pub const MAX_EVAL_DEPTH: usize = 20_000;

/// Categorizes the different kinds of parsing errors.
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
    /// Valid syntax that this reader does not support
    Unsupported,
    /// Implementation-imposed limit exceeded (integer overflow and the like)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
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

        // Newlines would break single-line error reports
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while reading or evaluating Crono code
///
/// None of these are retried internally; the evaluator restores its level, scoping and
/// environment stack before handing one back to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// A symbol had no binding while evaluating at the full level
    #[error("UnboundSymbolError: {0}")]
    UnboundSymbol(String),

    /// A type reference named no registered type
    #[error("UnboundTypeError: {0}")]
    UnboundType(String),

    /// Too many arguments to a non-variadic function, or too few with nothing to curry
    #[error("ArityError: {function} expected {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    /// The argument at `position` (zero based) failed its declared type
    #[error(
        "TypeMismatchError: {function} expected ({}), got ({}) at position {position}",
        .expected.join(" "),
        .actual.join(" ")
    )]
    TypeMismatch {
        function: String,
        position: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The head of an application evaluated to something that cannot be applied
    #[error("NotCallableError: {0} is not a function")]
    NotCallable(String),

    /// A special form received operands of the wrong shape
    #[error("MalformedFormError: {form}: {message}")]
    MalformedForm { form: String, message: String },

    /// A proper list was required but the chain ended in a non-nil tail
    #[error("MalformedListError: {0} is not a proper list")]
    MalformedList(String),

    #[error("DepthExceededError: evaluation nested deeper than {0} steps")]
    DepthExceeded(usize),

    /// Runtime failure raised by a native function
    #[error("EvaluationError: {0}")]
    EvalError(String),
}

impl Error {
    pub fn arity_error(function: impl Into<String>, expected: usize, got: usize) -> Self {
        Error::Arity {
            function: function.into(),
            expected,
            got,
        }
    }

    pub fn malformed(form: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedForm {
            form: form.into(),
            message: message.into(),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod function;
pub mod options;
pub mod package;
pub(crate) mod stack;
pub mod structs;
pub mod types;

#[cfg(feature = "reader")]
pub mod reader;

pub use ast::Value;
pub use environment::Environment;
pub use evaluator::{Evaluator, default_environment, eval};
pub use function::EvalLevel;
pub use options::{EvalOptions, ScopingMode};
pub use types::{BaseType, TypeTag};
