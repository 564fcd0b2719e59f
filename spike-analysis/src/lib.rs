//! Offline analysis of cell-attached recordings.
//!
//! A [Recording] passes through a waterfall of stages, each of which returns a
//! copy of its input with one more derived field:
//! ```ignore
//! let recording = detect_spikes(&recording, &DetectOptions::new(-40.0))?;
//! let recording = extract_spikes(&recording, &ExtractOptions::default())?;
//! let recording = make_spike_histogram(&recording, &HistogramOptions::default())?;
//! let recording = make_spike_density(&recording, &DensityOptions::default())?;
//! ```
//! Single-trial and batch recordings run through the same stages, batch
//! trials are processed independently and kept in their original order.

mod density;
mod detection;
mod error;
mod extraction;
mod histogram;
mod recording;
mod threshold;
mod trials;

pub use density::{DensityOptions, gaussian_kernel, make_spike_density};
pub use detection::{DetectOptions, Edge, detect_spikes};
pub use error::{
    ArgumentMismatch, DerivedField, ErrorKind, RecordingError, SpikeAnalysisError,
    SpikeAnalysisResult, Stage,
};
pub use extraction::{EXTRACTION_SAMPLES_PER_MILLI, ExtractOptions, extract_spikes};
pub use histogram::{HistogramOptions, make_spike_histogram};
pub use recording::{
    RasterExtent, Recording, SampleRates, SpikeDensity, SpikeHistogram, SpikeTimes,
};
pub use threshold::{FilterTrace, Threshold, TrialThreshold};
pub use trials::{TrialArray, Trials};
