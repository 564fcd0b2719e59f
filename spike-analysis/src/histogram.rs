use crate::{
    error::{SpikeAnalysisError, SpikeAnalysisResult, Stage},
    recording::{Recording, SpikeHistogram},
    trials::TrialArray,
};
use ephys_common::{MILLIS_PER_SECOND, Millis, Real};
use ndarray::{Array1, array};
use ndarray_stats::histogram::{Bins, Edges, Grid, Histogram};
use noisy_float::types::N64;
use tracing::{Span, instrument, trace};

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramOptions {
    /// Width of each bin in milliseconds.
    pub bin_size: Millis,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self { bin_size: 1.0 }
    }
}

/// Bin edges `0, width, 2 * width, ...` of `num_bins` whole bins.
pub(crate) fn make_bin_edges(num_bins: usize, width: Millis) -> Vec<Millis> {
    (0..=num_bins).map(|i| i as Real * width).collect()
}

fn bin_centers(edges: &[Millis]) -> Vec<Millis> {
    edges
        .windows(2)
        .map(|pair| 0.5 * (pair[0] + pair[1]))
        .collect()
}

/// Bin layout shared by every trial of one histogram.
pub(crate) struct BinGrid {
    grid: Grid<N64>,
    /// Upper edge of the last bin, which that bin also takes.
    closing_edge: Option<N64>,
}

impl BinGrid {
    pub(crate) fn new(edges: &[Millis]) -> Self {
        let edges = edges
            .iter()
            .copied()
            .filter_map(N64::try_new)
            .collect::<Vec<_>>();
        let closing_edge = edges.last().copied();
        Self {
            grid: Grid::from(vec![Bins::new(Edges::from(edges))]),
            closing_edge,
        }
    }

    /// Counts `times` into the bins.
    /// Bins are half-open `[lower, upper)` except the last, which also takes
    /// its upper edge. Times outside the edges are not counted.
    pub(crate) fn count(&self, times: &Array1<Millis>) -> Array1<u64> {
        let mut histogram = Histogram::new(self.grid.clone());
        let mut closing = 0;
        for time in times.iter().copied().filter_map(N64::try_new) {
            if Some(time) == self.closing_edge {
                closing += 1;
            } else if histogram.add_observation(&array![time]).is_err() {
                trace!(time = time.raw(), "Spike time outside the histogram");
            }
        }
        let mut counts = histogram
            .counts()
            .iter()
            .map(|&count| count as u64)
            .collect::<Array1<u64>>();
        if let Some(last) = counts.iter_mut().last() {
            *last += closing;
        }
        counts
    }
}

/// Bins the detected spike times of `recording` into fixed width bins.
///
/// The bins span the duration of the channel the spikes were detected on.
/// Returns a copy of `recording` holding the bin edges, bin centers,
/// counts and rates in events per second, each as (bin, trial) columns for a batch.
#[instrument(skip_all, fields(bin_size = options.bin_size, num_bins))]
pub fn make_spike_histogram(
    recording: &Recording,
    options: &HistogramOptions,
) -> SpikeAnalysisResult<Recording> {
    let bin_size = options.bin_size;
    if !(bin_size.is_finite() && bin_size > 0.0) {
        return Err(SpikeAnalysisError::InvalidBinSize(bin_size));
    }
    let spike_times = recording.require_spike_times(Stage::MakeSpikeHistogram)?;
    let num_samples = recording.channel(&spike_times.channel)?.len_of_time();
    let duration = recording.duration(&spike_times.channel)?;

    // No finer than one bin per sample.
    let num_bins = (duration / bin_size).floor();
    if num_bins > num_samples as Real {
        return Err(SpikeAnalysisError::BinSizeBelowSamplePeriod {
            bin_size,
            sample_period: MILLIS_PER_SECOND / recording.sample_rate(),
        });
    }

    let edges = make_bin_edges(num_bins as usize, bin_size);
    let grid = BinGrid::new(&edges);
    let counts = spike_times.times.par_map(|_, times| grid.count(times));
    let centers = Array1::from(bin_centers(&edges));
    let edges = Array1::from(edges);

    let counts = TrialArray::from_trials(counts)?;
    let rates = counts.mapv(|count| count as Real * MILLIS_PER_SECOND / bin_size);
    let spike_hist = SpikeHistogram {
        bin_centers: TrialArray::from_trials(spike_times.times.map(|_| centers.clone()))?,
        bin_edges: TrialArray::from_trials(spike_times.times.map(|_| edges.clone()))?,
        counts,
        rates,
        bin_size,
    };
    Span::current().record("num_bins", centers.len());
    Ok(recording.with_spike_hist(spike_hist))
}
