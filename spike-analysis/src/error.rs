use ephys_common::{ChannelId, Millis, SampleRate};
use thiserror::Error;

pub type SpikeAnalysisResult<T> = Result<T, SpikeAnalysisError>;

/// Broad classes of failure a pipeline stage can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    #[strum(to_string = "invalid argument")]
    InvalidArgument,
    #[strum(to_string = "missing precondition")]
    MissingPrecondition,
    #[strum(to_string = "invalid configuration")]
    InvalidConfiguration,
    #[strum(to_string = "out of range")]
    OutOfRange,
}

/// Derived fields that later stages read from a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DerivedField {
    #[strum(to_string = "spikeTimes")]
    SpikeTimes,
    #[strum(to_string = "spikeHist")]
    SpikeHist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
    #[strum(to_string = "extract_spikes")]
    ExtractSpikes,
    #[strum(to_string = "make_spike_histogram")]
    MakeSpikeHistogram,
    #[strum(to_string = "make_spike_density")]
    MakeSpikeDensity,
    #[strum(to_string = "raster_extent")]
    RasterExtent,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentMismatch {
    #[error("Per-trial {0} given for a single-trial recording")]
    PerTrialOnSingleTrial(&'static str),
    #[error("Expected one {param} per trial ({expected}), got {found}")]
    TrialCount {
        param: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Threshold wave for trial {trial} has {found} samples, the trace has {expected}")]
    WaveLength {
        trial: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordingError {
    #[error("Sample rate {0} Hz is not finite and positive")]
    InvalidSampleRate(SampleRate),
    #[error("Batch recording has no sample rates")]
    EmptySampleRates,
    #[error("Channel '{0}' is single-trial but the recording is a batch")]
    ExpectedBatch(ChannelId),
    #[error("Channel '{0}' is a batch but the recording is single-trial")]
    ExpectedSingleTrial(ChannelId),
    #[error("Channel '{0}' holds no trials")]
    NoTrials(ChannelId),
    #[error("Channel '{channel}' has {found} samples per trial, expected {expected}")]
    SampleCount {
        channel: ChannelId,
        expected: usize,
        found: usize,
    },
    #[error("Channel '{channel}' has {found} trials, expected {expected}")]
    TrialCount {
        channel: ChannelId,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum SpikeAnalysisError {
    #[error("Invalid Edge Polarity '{0}', expected 'rising' or 'falling'")]
    InvalidEdge(String),
    #[error("Argument Mismatch: {0}")]
    ArgumentMismatch(#[from] ArgumentMismatch),
    #[error("Invalid Bin Size {0} ms, must be finite and positive")]
    InvalidBinSize(Millis),
    #[error("Bin size {bin_size} ms is finer than the sample period {sample_period} ms")]
    BinSizeBelowSamplePeriod { bin_size: Millis, sample_period: Millis },
    #[error("Invalid Recording: {0}")]
    InvalidRecording(#[from] RecordingError),
    #[error("Missing {0} at {1}")]
    MissingField(DerivedField, Stage),
    #[error("Channel '{0}' not found in recording")]
    MissingChannel(ChannelId),
    #[error("{field} holds {found} trials, but the trace has {expected} at {stage}")]
    TrialCountMismatch {
        field: DerivedField,
        stage: Stage,
        expected: usize,
        found: usize,
    },
    #[error("Sigma {sigma} ms is smaller than the histogram bin size {bin_size} ms")]
    SigmaBelowBinSize { sigma: Millis, bin_size: Millis },
    #[error("Invalid Sigma {0} ms, must be finite")]
    InvalidSigma(Millis),
    #[error(
        "Spike at {time} ms in trial {trial} needs samples {start}..{end}, but the trace has {len}"
    )]
    WindowOutOfRange {
        trial: usize,
        time: Millis,
        start: i64,
        end: i64,
        len: usize,
    },
    #[error("Array Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl SpikeAnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEdge(_)
            | Self::ArgumentMismatch(_)
            | Self::InvalidBinSize(_)
            | Self::BinSizeBelowSamplePeriod { .. }
            | Self::InvalidRecording(_)
            | Self::Shape(_) => ErrorKind::InvalidArgument,
            Self::MissingField(..) | Self::MissingChannel(_) | Self::TrialCountMismatch { .. } => {
                ErrorKind::MissingPrecondition
            }
            Self::SigmaBelowBinSize { .. } | Self::InvalidSigma(_) => {
                ErrorKind::InvalidConfiguration
            }
            Self::WindowOutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }
}
