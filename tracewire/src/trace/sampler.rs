//! Sampling decides, once per span at creation, whether a span is recorded
//! and whether it is exported.

use crate::trace::{SpanContext, SpanKind, TraceId, TraceState};
use crate::{ConfigError, KeyValue};
use std::fmt;

/// The decision a sampler returns for a span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span records nothing and is never exported.
    Drop,
    /// The span records locally but the `sampled` flag stays clear, so it is
    /// never exported.
    RecordOnly,
    /// The span records and the `sampled` flag is set; it reaches exporters.
    RecordAndSample,
}

/// The output of a sampling decision.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// Whether the span should record and/or be exported.
    pub decision: SamplingDecision,
    /// The trace state the new span's context should carry.
    pub trace_state: TraceState,
}

/// The interface for deciding whether a span is sampled.
///
/// Implementations must be pure functions of their inputs: the same inputs
/// always yield the same result, and no ambient state is consulted.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Decide whether the span described by the arguments should be sampled.
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult;
}

/// Object-safe cloning support for boxed samplers.
pub trait CloneShouldSample {
    /// Box-clone this sampler.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// The built-in samplers.
#[derive(Clone, Debug)]
pub enum Sampler {
    /// Always sample every span.
    AlwaysOn,
    /// Never sample any span.
    AlwaysOff,
    /// Respect the parent span's sampling decision when there is one,
    /// otherwise delegate to the wrapped sampler.
    ParentBased(Box<dyn ShouldSample>),
    /// Sample a deterministic fraction of traces based on the trace id.
    ///
    /// The same trace id always yields the same decision, so every span of a
    /// trace falls on the same side of the cut even when decided
    /// independently. Build through [`Sampler::trace_id_ratio`] to get range
    /// validation.
    TraceIdRatio(f64),
}

impl Sampler {
    /// A [`Sampler::TraceIdRatio`] validated to lie in `[0.0, 1.0]`.
    pub fn trace_id_ratio(ratio: f64) -> Result<Sampler, ConfigError> {
        if (0.0..=1.0).contains(&ratio) {
            Ok(Sampler::TraceIdRatio(ratio))
        } else {
            Err(ConfigError::InvalidSamplingRatio(ratio))
        }
    }

    /// A [`Sampler::ParentBased`] wrapping the given root sampler.
    pub fn parent_based(delegate: impl ShouldSample + 'static) -> Sampler {
        Sampler::ParentBased(Box::new(delegate))
    }
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => match parent.filter(|cx| cx.is_valid()) {
                Some(parent) => {
                    if parent.is_sampled() {
                        SamplingDecision::RecordAndSample
                    } else {
                        SamplingDecision::Drop
                    }
                }
                None => {
                    return delegate.should_sample(parent, trace_id, name, span_kind, attributes)
                }
            },
            Sampler::TraceIdRatio(prob) => sample_based_on_probability(*prob, trace_id),
        };

        SamplingResult {
            decision,
            // inherit the parent trace state so vendor entries survive local
            // sampling decisions
            trace_state: parent
                .map(|cx| cx.trace_state().clone())
                .unwrap_or_default(),
        }
    }
}

fn sample_based_on_probability(prob: f64, trace_id: TraceId) -> SamplingDecision {
    if prob >= 1.0 {
        return SamplingDecision::RecordAndSample;
    }
    if prob <= 0.0 {
        return SamplingDecision::Drop;
    }
    let prob_upper_bound = (prob.max(0.0) * (1u64 << 63) as f64) as u64;
    // the lower 64 bits of the trace id, shifted into 63-bit space to match
    // the bound above
    let rnd_from_trace_id = (trace_id.to_u128() as u64) >> 1;

    if rnd_from_trace_id < prob_upper_bound {
        SamplingDecision::RecordAndSample
    } else {
        SamplingDecision::Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{IdGenerator, RandomIdGenerator, SpanId, TraceFlags};

    fn sampled_parent(sampled: bool) -> SpanContext {
        SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::default().with_sampled(sampled),
            true,
            TraceState::NONE,
        )
    }

    fn decide(sampler: &Sampler, parent: Option<&SpanContext>) -> SamplingDecision {
        sampler
            .should_sample(
                parent,
                TraceId::from(42u128),
                "op",
                &SpanKind::Internal,
                &[],
            )
            .decision
    }

    #[test]
    fn always_on_and_off() {
        assert_eq!(
            decide(&Sampler::AlwaysOn, None),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&Sampler::AlwaysOff, None), SamplingDecision::Drop);
    }

    #[test]
    fn parent_based_follows_parent() {
        let sampler = Sampler::parent_based(Sampler::AlwaysOff);
        assert_eq!(
            decide(&sampler, Some(&sampled_parent(true))),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decide(&sampler, Some(&sampled_parent(false))),
            SamplingDecision::Drop
        );
        // no valid parent: delegate decides
        assert_eq!(decide(&sampler, None), SamplingDecision::Drop);
        assert_eq!(
            decide(&sampler, Some(&SpanContext::NONE)),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn ratio_is_deterministic_per_trace_id() {
        let sampler = Sampler::trace_id_ratio(0.5).unwrap();
        let generator = RandomIdGenerator::default();
        for _ in 0..64 {
            let trace_id = generator.new_trace_id();
            let first = sampler.should_sample(None, trace_id, "op", &SpanKind::Internal, &[]);
            let second = sampler.should_sample(None, trace_id, "op", &SpanKind::Internal, &[]);
            assert_eq!(first.decision, second.decision);
        }
    }

    #[test]
    fn ratio_bounds() {
        assert_eq!(
            decide(&Sampler::TraceIdRatio(1.0), None),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decide(&Sampler::TraceIdRatio(0.0), None),
            SamplingDecision::Drop
        );
        assert!(matches!(
            Sampler::trace_id_ratio(1.1),
            Err(ConfigError::InvalidSamplingRatio(_))
        ));
        assert!(matches!(
            Sampler::trace_id_ratio(-0.5),
            Err(ConfigError::InvalidSamplingRatio(_))
        ));
    }

    #[test]
    fn ratio_converges_to_probability() {
        // z value corresponding to a one-in-ten-million failure probability
        const Z: f64 = 4.75342;
        let generator = RandomIdGenerator::default();
        for prob in [0.25, 0.5, 0.9] {
            let sampler = Sampler::trace_id_ratio(prob).unwrap();
            let total = 10_000;
            let sampled = (0..total)
                .filter(|_| {
                    sampler
                        .should_sample(
                            None,
                            generator.new_trace_id(),
                            "op",
                            &SpanKind::Internal,
                            &[],
                        )
                        .decision
                        == SamplingDecision::RecordAndSample
                })
                .count();
            let observed = sampled as f64 / total as f64;
            let tolerance = Z * (prob * (1.0 - prob) / total as f64).sqrt();
            assert!(
                (observed - prob).abs() <= tolerance,
                "observed {} outside tolerance {} of {}",
                observed,
                tolerance,
                prob
            );
        }
    }

    #[test]
    fn sampler_preserves_parent_trace_state() {
        let state = TraceState::from_key_value(vec![("vendor", "x")]).unwrap();
        let parent = SpanContext::new(
            TraceId::from(9u128),
            SpanId::from(9u64),
            TraceFlags::SAMPLED,
            true,
            state.clone(),
        );
        let result =
            Sampler::AlwaysOn.should_sample(Some(&parent), TraceId::from(9u128), "op", &SpanKind::Internal, &[]);
        assert_eq!(result.trace_state, state);
    }
}
