//! Evaluator configuration.
//!
//! Options belong to one [`Evaluator`](crate::evaluator::Evaluator); two evaluators
//! never see each other's settings. The reporting toggles only produce `tracing` events
//! and never change what an expression evaluates to.

use crate::Error;
use crate::MAX_EVAL_DEPTH;

/// Where a closure's free names are looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopingMode {
    /// In the environment captured when the closure was created
    #[default]
    Lexical,
    /// In the caller's environment at the time of the call
    Dynamic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    pub scoping: ScopingMode,
    /// Report each dispatch step and its result (target `crono::trace`)
    pub trace: bool,
    /// Report the kind of each node visited (target `crono::ast`)
    pub print_ast: bool,
    /// Report the active environment after each step (target `crono::env`)
    pub show_env: bool,
    /// Include native functions when reporting environments
    pub show_builtins: bool,
    /// Include type tags when reporting environments
    pub show_types: bool,
    pub max_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            scoping: ScopingMode::Lexical,
            trace: false,
            print_ast: false,
            show_env: false,
            show_builtins: false,
            show_types: false,
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

impl EvalOptions {
    pub fn with_scoping(mut self, scoping: ScopingMode) -> Self {
        self.scoping = scoping;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Names accepted by [`EvalOptions::set`]
    pub const NAMES: [&'static str; 6] = [
        "dynamic",
        "trace",
        "print-ast",
        "show-env",
        "show-builtins",
        "show-types",
    ];

    /// Set a toggle by its source-level name, as `(set-option dynamic t)` does
    pub fn set(&mut self, name: &str, enabled: bool) -> Result<(), Error> {
        match name {
            "dynamic" => {
                self.scoping = if enabled {
                    ScopingMode::Dynamic
                } else {
                    ScopingMode::Lexical
                }
            }
            "trace" => self.trace = enabled,
            "print-ast" => self.print_ast = enabled,
            "show-env" => self.show_env = enabled,
            "show-builtins" => self.show_builtins = enabled,
            "show-types" => self.show_types = enabled,
            _ => {
                return Err(Error::malformed(
                    "set-option",
                    format!("unknown option {name}, expected one of {}", Self::NAMES.join(", ")),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn reports(&self) -> bool {
        self.trace || self.print_ast || self.show_env
    }
}
