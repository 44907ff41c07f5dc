//! RAII scope guard for the evaluator's environment stack.
//!
//! [`Evaluator::scoped`] pushes an environment and returns a guard that pops it when
//! dropped, whether the body returned normally, returned an error through `?`, or
//! panicked. Pushing any other way risks leaving a stale frame behind for the next
//! top-level evaluation.
//!
//! ```text
//! evaluator.with_scope(frame, |scoped| scoped.eval_body(body))
//! ```

use super::Evaluator;
use crate::environment::Environment;
use std::ops::{Deref, DerefMut};

/// Guard holding one pushed environment; derefs to the evaluator
pub(crate) struct ScopedEvaluator<'a> {
    evaluator: &'a mut Evaluator,
}

impl Drop for ScopedEvaluator<'_> {
    fn drop(&mut self) {
        self.evaluator.pop_env();
    }
}

impl Deref for ScopedEvaluator<'_> {
    type Target = Evaluator;

    fn deref(&self) -> &Self::Target {
        self.evaluator
    }
}

impl DerefMut for ScopedEvaluator<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.evaluator
    }
}

impl Evaluator {
    /// Push `env` as the active environment until the guard is dropped
    pub(crate) fn scoped(&mut self, env: Environment) -> ScopedEvaluator<'_> {
        self.push_env(env);
        ScopedEvaluator { evaluator: self }
    }

    /// Run `f` with `env` pushed; the environment is popped on every exit path
    pub(crate) fn with_scope<T, F>(&mut self, env: Environment, f: F) -> T
    where
        F: FnOnce(&mut Evaluator) -> T,
    {
        let mut scoped = self.scoped(env);
        f(&mut scoped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::ast::val;

    #[test]
    fn test_scope_popped_on_success_and_error() {
        let mut evaluator = Evaluator::new();
        assert_eq!(evaluator.scope_depth(), 0);

        let mut frame = Environment::new();
        frame.put("x", val(1));
        let seen = evaluator.with_scope(frame, |ev| {
            assert_eq!(ev.scope_depth(), 1);
            ev.env().get("x").cloned()
        });
        assert_eq!(seen, Some(val(1)));
        assert_eq!(evaluator.scope_depth(), 0);

        let failed: Result<(), Error> = evaluator.with_scope(Environment::new(), |ev| {
            ev.with_scope(Environment::new(), |_| Err(Error::EvalError("boom".into())))
        });
        assert!(failed.is_err());
        assert_eq!(evaluator.scope_depth(), 0);
    }
}
