//! Stack growth for deep recursion.
//!
//! The evaluator recurses once per dispatch step. Each step runs under
//! [`ensure_sufficient_stack`], which grows the host stack on demand so that
//! [`MAX_EVAL_DEPTH`](crate::MAX_EVAL_DEPTH) is what bounds recursion, not the thread's
//! stack size.

/// Grow the stack when less than this remains (100KB)
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment (1MB)
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack
#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
