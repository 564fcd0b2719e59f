mod tracer;

pub use tracer::{TracerEngine, TracerError, TracerOptions};

pub type Real = f64;

/// Times are expressed in milliseconds throughout the toolkit.
pub type Millis = f64;
pub type SampleRate = f64;
pub type ChannelId = String;

pub const DEFAULT_CHANNEL: &str = "chan0";
pub const MILLIS_PER_SECOND: Real = 1000.0;

/// Converts a sample index into a time in milliseconds.
pub fn sample_to_millis(index: usize, sample_rate: SampleRate) -> Millis {
    index as Real * MILLIS_PER_SECOND / sample_rate
}

/// Duration in milliseconds of a trace holding `num_samples` samples.
pub fn trace_duration(num_samples: usize, sample_rate: SampleRate) -> Millis {
    num_samples as Real * MILLIS_PER_SECOND / sample_rate
}
