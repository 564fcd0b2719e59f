use crate::{
    error::{ArgumentMismatch, SpikeAnalysisError, SpikeAnalysisResult},
    recording::{Recording, SpikeTimes},
    threshold::{FilterTrace, Threshold},
};
use ephys_common::{ChannelId, DEFAULT_CHANNEL, Millis, Real, SampleRate, sample_to_millis};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use std::str::FromStr;
use tracing::{Span, instrument, trace};

/// Direction of a threshold crossing.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Edge {
    Rising,
    #[default]
    Falling,
}

impl Edge {
    /// Tests a pair of adjacent `(value, threshold)` samples for a crossing.
    fn crosses(self, previous: (Real, Real), current: (Real, Real)) -> bool {
        match self {
            Self::Rising => previous.0 < previous.1 && current.0 > current.1,
            Self::Falling => previous.0 > previous.1 && current.0 < current.1,
        }
    }
}

impl FromStr for Edge {
    type Err = SpikeAnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(Self::Rising),
            "falling" => Ok(Self::Falling),
            other => Err(SpikeAnalysisError::InvalidEdge(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectOptions {
    pub channel: ChannelId,
    pub edge: Edge,
    pub threshold: Threshold,
    /// Reserved for pre-filtering the traces, currently has no effect.
    pub filter_trace: FilterTrace,
}

impl DetectOptions {
    pub fn new(threshold: impl Into<Threshold>) -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_owned(),
            edge: Edge::default(),
            threshold: threshold.into(),
            filter_trace: FilterTrace::default(),
        }
    }

    pub fn with_channel(self, channel: impl Into<ChannelId>) -> Self {
        Self {
            channel: channel.into(),
            ..self
        }
    }

    pub fn with_edge(self, edge: Edge) -> Self {
        Self { edge, ..self }
    }

    pub fn with_filter_trace(self, filter_trace: impl Into<FilterTrace>) -> Self {
        Self {
            filter_trace: filter_trace.into(),
            ..self
        }
    }
}

/// Hook for pre-filtering a trace before detection, currently a pass-through.
fn prefilter(trace: ArrayView1<'_, Real>, enabled: bool) -> ArrayView1<'_, Real> {
    if enabled {
        trace!("Trace filtering requested, passing trace through unfiltered");
    }
    trace
}

/// Indices `i` where samples `i` and `i + 1` cross `levels` in the direction of `edge`.
pub(crate) fn find_crossings(
    trace: ArrayView1<'_, Real>,
    levels: ArrayView1<'_, Real>,
    edge: Edge,
) -> Vec<usize> {
    trace
        .iter()
        .copied()
        .zip(levels.iter().copied())
        .enumerate()
        .tuple_windows()
        .filter_map(|((index, previous), (_, current))| {
            edge.crosses(previous, current).then_some(index)
        })
        .collect()
}

pub(crate) fn detect_trial(
    trace: ArrayView1<'_, Real>,
    levels: ArrayView1<'_, Real>,
    edge: Edge,
    sample_rate: SampleRate,
) -> Array1<Millis> {
    find_crossings(trace, levels, edge)
        .into_iter()
        .map(|index| sample_to_millis(index, sample_rate))
        .collect()
}

/// Detects threshold crossings on one channel of `recording`.
///
/// Returns a copy of `recording` holding the spike times in milliseconds,
/// one sequence per trial for a batch.
#[instrument(skip_all, fields(
    channel = %options.channel,
    edge = %options.edge,
    batch = recording.is_batch(),
    num_spikes
))]
pub fn detect_spikes(
    recording: &Recording,
    options: &DetectOptions,
) -> SpikeAnalysisResult<Recording> {
    let traces = recording.channel(&options.channel)?;
    let sample_rate = recording.sample_rate();
    let is_batch = recording.is_batch();
    let num_trials = traces.num_trials();

    let levels = options
        .threshold
        .resolve(is_batch, num_trials, traces.len_of_time())?;
    let filters = options.filter_trace.resolve(is_batch, num_trials)?;
    let trials = traces.trials();

    let settings = levels.zip(&filters).ok_or(ArgumentMismatch::TrialCount {
        param: "filter flag",
        expected: levels.len(),
        found: filters.len(),
    })?;
    let inputs = trials.zip(&settings).ok_or(ArgumentMismatch::TrialCount {
        param: "threshold",
        expected: trials.len(),
        found: settings.len(),
    })?;

    let times = inputs.par_map(|trial, (trace, (levels, filter))| {
        let trace = prefilter(trace.view(), **filter);
        let times = detect_trial(trace, levels.view(), options.edge, sample_rate);
        trace!(trial, num_spikes = times.len(), "Detected spikes in trial");
        times
    });

    let spike_times = SpikeTimes {
        channel: options.channel.clone(),
        times,
    };
    Span::current().record("num_spikes", spike_times.total());
    Ok(recording.with_spike_times(spike_times))
}
