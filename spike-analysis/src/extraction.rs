use crate::{
    error::{DerivedField, SpikeAnalysisError, SpikeAnalysisResult, Stage},
    recording::Recording,
};
use ephys_common::{ChannelId, Millis, Real};
use ndarray::{Array1, Array2, ArrayView1, s};
use tracing::{Span, debug, instrument};

/// Samples per millisecond assumed when converting spike times back to
/// sample indices. This is fixed at 10 kHz and does not follow the sample
/// rate of the recording.
pub const EXTRACTION_SAMPLES_PER_MILLI: Real = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Window size in samples.
    pub width: usize,
    /// Scale each window to unit energy.
    pub energy: bool,
    /// Channel to cut windows from, defaults to the channel the spikes were detected on.
    pub channel: Option<ChannelId>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            width: 100,
            energy: false,
            channel: None,
        }
    }
}

pub(crate) fn spike_sample(time: Millis) -> i64 {
    (time * EXTRACTION_SAMPLES_PER_MILLI).round() as i64
}

/// Cuts a `width` sample window around each spike of one trial, one column per spike.
pub(crate) fn extract_trial(
    trial: usize,
    trace: ArrayView1<'_, Real>,
    times: &Array1<Millis>,
    width: usize,
    energy: bool,
) -> SpikeAnalysisResult<Array2<Real>> {
    let half_width = (width / 2) as i64;
    let mut extracted = Array2::zeros((width, times.len()));

    for (mut column, &time) in extracted.columns_mut().into_iter().zip(times) {
        let start = spike_sample(time) - half_width;
        let end = start + width as i64;
        if start < 0 || end > trace.len() as i64 {
            return Err(SpikeAnalysisError::WindowOutOfRange {
                trial,
                time,
                start,
                end,
                len: trace.len(),
            });
        }
        let window = trace.slice(s![start as usize..end as usize]);
        column.assign(&window);

        if energy {
            let norm = window.dot(&window).sqrt();
            // An all-zero window has no energy to normalise by.
            if norm > 0.0 {
                column.mapv_inplace(|v| v / norm);
            }
        }
    }
    Ok(extracted)
}

/// Cuts fixed width waveforms out of the raw trace around each detected spike.
///
/// Requires spike times, see [crate::detect_spikes]. Returns a copy of
/// `recording` holding a (window sample, spike) array per trial.
/// A window reaching past either end of the trace fails the whole stage.
#[instrument(skip_all, fields(width = options.width, energy = options.energy, num_spikes))]
pub fn extract_spikes(
    recording: &Recording,
    options: &ExtractOptions,
) -> SpikeAnalysisResult<Recording> {
    let spike_times = recording.require_spike_times(Stage::ExtractSpikes)?;
    let channel = options.channel.as_ref().unwrap_or(&spike_times.channel);
    let trials = recording.channel(channel)?.trials();

    let inputs = trials
        .zip(&spike_times.times)
        .ok_or(SpikeAnalysisError::TrialCountMismatch {
            field: DerivedField::SpikeTimes,
            stage: Stage::ExtractSpikes,
            expected: trials.len(),
            found: spike_times.times.len(),
        })?;

    let extracted = inputs.par_try_map(|trial, (trace, times)| {
        extract_trial(trial, trace.view(), times, options.width, options.energy)
    })?;

    let num_spikes = extracted.iter().map(Array2::ncols).sum::<usize>();
    debug!(channel = %channel, "Extracted spike windows");
    Span::current().record("num_spikes", num_spikes);
    Ok(recording.with_extracted_spikes(extracted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detection::{DetectOptions, Edge, detect_spikes},
        error::ErrorKind,
        recording::SpikeTimes,
        trials::Trials,
    };
    use assert_approx_eq::assert_approx_eq;
    use ephys_common::DEFAULT_CHANNEL;
    use ndarray::{Array2, array};

    fn ramp(len: usize) -> Array1<Real> {
        Array1::from_iter((0..len).map(|i| i as Real))
    }

    fn with_spikes(trace: Array1<Real>, times: Array1<Millis>) -> Recording {
        Recording::single_trial(10_000.0)
            .unwrap()
            .with_channel(DEFAULT_CHANNEL, trace)
            .unwrap()
            .with_spike_times(SpikeTimes {
                channel: DEFAULT_CHANNEL.to_owned(),
                times: Trials::Single(times),
            })
    }

    fn extracted(recording: &Recording) -> &Array2<Real> {
        recording.extracted_spikes().unwrap().get(0).unwrap()
    }

    #[test]
    fn window_around_crossing() {
        let recording = with_spikes(ramp(40), array![2.0, 3.0]);
        let options = ExtractOptions {
            width: 4,
            ..Default::default()
        };
        let result = extract_spikes(&recording, &options).unwrap();
        let windows = extracted(&result);
        assert_eq!(windows.shape(), &[4, 2]);
        assert_eq!(windows.column(0), array![18.0, 19.0, 20.0, 21.0]);
        assert_eq!(windows.column(1), array![28.0, 29.0, 30.0, 31.0]);
    }

    #[test]
    fn odd_width_keeps_every_row() {
        let recording = with_spikes(ramp(40), array![2.0]);
        let options = ExtractOptions {
            width: 5,
            ..Default::default()
        };
        let result = extract_spikes(&recording, &options).unwrap();
        assert_eq!(extracted(&result).column(0), array![18.0, 19.0, 20.0, 21.0, 22.0]);
    }

    #[test]
    fn spike_times_round_to_nearest_sample() {
        assert_eq!(spike_sample(1.04), 10);
        assert_eq!(spike_sample(1.06), 11);
        assert_eq!(spike_sample(0.0), 0);
    }

    #[test]
    fn energy_normalised_columns() {
        let recording = with_spikes(ramp(200), array![5.0, 10.0, 15.0]);
        let options = ExtractOptions {
            width: 20,
            energy: true,
            ..Default::default()
        };
        let result = extract_spikes(&recording, &options).unwrap();
        for column in extracted(&result).columns() {
            assert_approx_eq!(column.dot(&column).sqrt(), 1.0, 1e-12);
        }
    }

    #[test]
    fn zero_window_stays_zero() {
        let recording = with_spikes(Array1::zeros(50), array![2.0]);
        let options = ExtractOptions {
            width: 10,
            energy: true,
            ..Default::default()
        };
        let result = extract_spikes(&recording, &options).unwrap();
        assert!(extracted(&result).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn window_past_trace_edges() {
        let options = ExtractOptions {
            width: 10,
            ..Default::default()
        };
        let early = with_spikes(ramp(100), array![0.2]);
        let error = extract_spikes(&early, &options).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::OutOfRange);
        assert!(matches!(
            error,
            SpikeAnalysisError::WindowOutOfRange {
                trial: 0,
                start: -3,
                end: 7,
                len: 100,
                ..
            }
        ));

        let late = with_spikes(ramp(100), array![9.8]);
        let error = extract_spikes(&late, &options).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn no_spikes_no_columns() {
        let recording = with_spikes(ramp(20), Array1::zeros(0));
        let result = extract_spikes(&recording, &ExtractOptions::default()).unwrap();
        assert_eq!(extracted(&result).shape(), &[100, 0]);
    }

    #[test]
    fn needs_spike_times() {
        let recording = Recording::single_trial(10_000.0)
            .unwrap()
            .with_channel(DEFAULT_CHANNEL, ramp(20))
            .unwrap();
        let error = extract_spikes(&recording, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::MissingField(DerivedField::SpikeTimes, Stage::ExtractSpikes)
        ));
    }

    #[test]
    fn batch_uses_each_trials_own_spikes() {
        let mut traces = Array2::<Real>::zeros((60, 2));
        traces[[20, 0]] = 5.0;
        traces[[40, 1]] = 5.0;
        let recording = Recording::batch(vec![10_000.0, 10_000.0])
            .unwrap()
            .with_channel(DEFAULT_CHANNEL, traces)
            .unwrap();
        let detected =
            detect_spikes(&recording, &DetectOptions::new(1.0).with_edge(Edge::Rising)).unwrap();
        let options = ExtractOptions {
            width: 6,
            ..Default::default()
        };
        let result = extract_spikes(&detected, &options).unwrap();
        let windows = result.extracted_spikes().unwrap();

        assert!(windows.is_batch());
        assert_eq!(windows.len(), 2);
        for trial in windows.iter() {
            assert_eq!(trial.shape(), &[6, 1]);
            assert_eq!(trial.column(0), array![0.0, 0.0, 0.0, 0.0, 5.0, 0.0]);
        }
        assert!(recording.extracted_spikes().is_none());
    }

    #[test]
    fn spike_times_for_fewer_trials_than_the_trace() {
        let recording = Recording::batch(vec![10_000.0, 10_000.0])
            .unwrap()
            .with_channel(DEFAULT_CHANNEL, Array2::<Real>::zeros((60, 2)))
            .unwrap()
            .with_spike_times(SpikeTimes {
                channel: DEFAULT_CHANNEL.to_owned(),
                times: Trials::Batch(vec![array![2.0]]),
            });
        let error = extract_spikes(&recording, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::TrialCountMismatch {
                field: DerivedField::SpikeTimes,
                stage: Stage::ExtractSpikes,
                expected: 2,
                found: 1,
            }
        ));
        assert_eq!(error.kind(), ErrorKind::MissingPrecondition);
    }
}
