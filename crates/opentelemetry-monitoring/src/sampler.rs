//! Sampling policy selection.

use opentelemetry_sdk::trace::Sampler;

/// Which traces the tracer records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerPolicy {
    /// Record nothing.
    Never,
    /// Record everything.
    Always,
    /// Record a fraction of traces, decided from the trace ID.
    Probabilistic(f64),
}

/// Maps a sample ratio onto a policy.
///
/// Out-of-range ratios clamp to the nearest extreme instead of failing, so a
/// misconfigured ratio never blocks startup. `NaN` selects [`SamplerPolicy::Never`].
///
/// # Examples
///
/// ```
/// use opentelemetry_monitoring::{SamplerPolicy, select_sampler};
///
/// assert_eq!(select_sampler(0.0), SamplerPolicy::Never);
/// assert_eq!(select_sampler(42.0), SamplerPolicy::Always);
/// assert_eq!(select_sampler(0.3), SamplerPolicy::Probabilistic(0.3));
/// ```
pub fn select_sampler(ratio: f64) -> SamplerPolicy {
    if ratio.is_nan() || ratio <= 0.0 {
        SamplerPolicy::Never
    } else if ratio >= 1.0 {
        SamplerPolicy::Always
    } else {
        SamplerPolicy::Probabilistic(ratio)
    }
}

impl From<SamplerPolicy> for Sampler {
    fn from(policy: SamplerPolicy) -> Self {
        match policy {
            SamplerPolicy::Never => Sampler::AlwaysOff,
            SamplerPolicy::Always => Sampler::AlwaysOn,
            SamplerPolicy::Probabilistic(ratio) => Sampler::TraceIdRatioBased(ratio),
        }
    }
}
