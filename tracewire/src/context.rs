//! Thread-local ambient span context.
//!
//! Each thread carries a stack of active [`SpanContext`]s. Pushing is done
//! through [`attach`], which returns a [`ContextGuard`]; popping happens when
//! the guard drops. Spans started without an explicit parent adopt the top of
//! the stack on the starting thread. The ambient state never crosses threads
//! on its own; hand a `SpanContext` over explicitly when spawning work.
//!
//! ```
//! use tracewire::context;
//! use tracewire::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
//!
//! let cx = SpanContext::new(
//!     TraceId::from(1u128),
//!     SpanId::from(1u64),
//!     TraceFlags::SAMPLED,
//!     false,
//!     TraceState::NONE,
//! );
//! let guard = context::attach(cx.clone());
//! assert_eq!(context::current(), Some(cx));
//! drop(guard);
//! assert_eq!(context::current(), None);
//! ```

use crate::trace::SpanContext;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE_SPANS: RefCell<Vec<SpanContext>> = const { RefCell::new(Vec::new()) };
}

/// Returns the currently active span context on this thread, if any.
pub fn current() -> Option<SpanContext> {
    ACTIVE_SPANS.with(|stack| stack.borrow().last().cloned())
}

/// Pushes `cx` onto this thread's active stack.
///
/// The context stays active until the returned guard is dropped. Guards
/// restore the stack to its depth at attach time, so dropping them out of
/// order discards any contexts attached above.
pub fn attach(cx: SpanContext) -> ContextGuard {
    let depth = ACTIVE_SPANS.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(cx);
        stack.len() - 1
    });
    ContextGuard {
        depth,
        _not_send: PhantomData,
    }
}

/// Resets the active stack when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    depth: usize,
    // Pinned to the thread whose stack it manipulates.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ACTIVE_SPANS.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}
