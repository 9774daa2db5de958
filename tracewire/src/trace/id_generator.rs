//! Trace and span id generation.

use crate::trace::{SpanId, TraceId};
use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Interface for generating ids.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates trace and span ids from a per-thread random number generator
/// seeded from the operating system.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| TraceId::from(rng.borrow_mut().random::<u128>()))
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| SpanId::from(rng.borrow_mut().random::<u64>()))
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

/// [`IdGenerator`] that hands out consecutive ids starting at 1.
///
/// Useful in tests that need predictable ids.
#[derive(Clone, Debug)]
pub struct SequentialIdGenerator(Arc<AtomicU64>);

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        SequentialIdGenerator(Arc::new(AtomicU64::new(1)))
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(self.0.fetch_add(1, Ordering::SeqCst) as u128)
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator::default();
        let a = generator.new_trace_id();
        let b = generator.new_trace_id();
        assert_ne!(a, b);
        assert_ne!(a, TraceId::INVALID);
        assert_ne!(generator.new_span_id(), SpanId::INVALID);
    }

    #[test]
    fn sequential_ids_increment() {
        let generator = SequentialIdGenerator::default();
        assert_eq!(generator.new_trace_id(), TraceId::from(1u128));
        assert_eq!(generator.new_span_id(), SpanId::from(2u64));
        assert_eq!(generator.new_trace_id(), TraceId::from(3u128));
    }
}
