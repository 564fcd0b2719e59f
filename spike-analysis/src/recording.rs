use crate::{
    error::{DerivedField, RecordingError, SpikeAnalysisError, SpikeAnalysisResult, Stage},
    trials::{TrialArray, Trials},
};
use ephys_common::{ChannelId, Millis, Real, SampleRate, trace_duration};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SampleRates {
    Single(SampleRate),
    /// One entry per trial, by convention all equal.
    PerTrial(Vec<SampleRate>),
}

/// Spike times in milliseconds, together with the channel they were detected on.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeTimes {
    pub channel: ChannelId,
    pub times: Trials<Array1<Millis>>,
}

impl SpikeTimes {
    pub fn total(&self) -> usize {
        self.times.iter().map(Array1::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeHistogram {
    pub bin_centers: TrialArray<Millis>,
    pub bin_edges: TrialArray<Millis>,
    pub counts: TrialArray<u64>,
    /// Events per second in each bin.
    pub rates: TrialArray<Real>,
    pub bin_size: Millis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeDensity {
    pub bin_centers: TrialArray<Millis>,
    pub kernel: Array1<Real>,
    pub sigma: Millis,
    pub rates: TrialArray<Real>,
}

/// Time span and row count of a spike raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterExtent {
    pub duration: Millis,
    pub rows: usize,
}

/// One experiment session: raw channel traces, the sample rate, and any
/// fields derived from them by the pipeline stages.
///
/// Whether the recording is a batch is fixed by its constructor, every
/// channel and derived field follows the same single-trial / batch layout.
/// Stages never modify a recording, they return a copy with one more field.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    channels: BTreeMap<ChannelId, TrialArray<Real>>,
    sample_rates: SampleRates,
    /// The rate used for every time conversion, the first of `sample_rates`.
    sample_rate: SampleRate,
    spike_times: Option<SpikeTimes>,
    extracted_spikes: Option<Trials<Array2<Real>>>,
    spike_hist: Option<SpikeHistogram>,
    spike_density: Option<SpikeDensity>,
}

fn validate_sample_rate(rate: SampleRate) -> Result<SampleRate, RecordingError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(RecordingError::InvalidSampleRate(rate))
    }
}

impl Recording {
    fn new(sample_rates: SampleRates, sample_rate: SampleRate) -> Self {
        Self {
            channels: Default::default(),
            sample_rates,
            sample_rate,
            spike_times: None,
            extracted_spikes: None,
            spike_hist: None,
            spike_density: None,
        }
    }

    pub fn single_trial(sample_rate: SampleRate) -> SpikeAnalysisResult<Self> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        Ok(Self::new(SampleRates::Single(sample_rate), sample_rate))
    }

    /// Creates a batch recording, `sample_rates` holds one entry per trial
    /// or a single entry shared by all of them.
    pub fn batch(sample_rates: Vec<SampleRate>) -> SpikeAnalysisResult<Self> {
        let Some(&first) = sample_rates.first() else {
            return Err(RecordingError::EmptySampleRates.into());
        };
        for &rate in &sample_rates {
            validate_sample_rate(rate)?;
        }
        Ok(Self::new(SampleRates::PerTrial(sample_rates), first))
    }

    /// Adds a channel, a single-trial recording takes a 1D trace and a batch
    /// takes a (samples, trials) array.
    pub fn with_channel(
        mut self,
        channel: impl Into<ChannelId>,
        traces: impl Into<TrialArray<Real>>,
    ) -> SpikeAnalysisResult<Self> {
        let channel = channel.into();
        let traces = traces.into();

        match (self.is_batch(), traces.is_batch()) {
            (true, false) => return Err(RecordingError::ExpectedBatch(channel).into()),
            (false, true) => return Err(RecordingError::ExpectedSingleTrial(channel).into()),
            _ => {}
        }
        if traces.num_trials() == 0 {
            return Err(RecordingError::NoTrials(channel).into());
        }
        if let SampleRates::PerTrial(rates) = &self.sample_rates {
            if rates.len() > 1 && rates.len() != traces.num_trials() {
                return Err(RecordingError::TrialCount {
                    channel,
                    expected: rates.len(),
                    found: traces.num_trials(),
                }
                .into());
            }
        }
        if let Some(existing) = self.channels.values().next() {
            if existing.len_of_time() != traces.len_of_time() {
                return Err(RecordingError::SampleCount {
                    channel,
                    expected: existing.len_of_time(),
                    found: traces.len_of_time(),
                }
                .into());
            }
            if existing.num_trials() != traces.num_trials() {
                return Err(RecordingError::TrialCount {
                    channel,
                    expected: existing.num_trials(),
                    found: traces.num_trials(),
                }
                .into());
            }
        }

        self.channels.insert(channel, traces);
        Ok(self)
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.sample_rates, SampleRates::PerTrial(_))
    }

    pub fn sample_rates(&self) -> &SampleRates {
        &self.sample_rates
    }

    /// The sample rate shared by all trials, for a batch this is the first entry.
    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    pub fn channel(&self, channel: &str) -> SpikeAnalysisResult<&TrialArray<Real>> {
        self.channels
            .get(channel)
            .ok_or_else(|| SpikeAnalysisError::MissingChannel(channel.to_owned()))
    }

    pub fn spike_times(&self) -> Option<&SpikeTimes> {
        self.spike_times.as_ref()
    }

    pub fn extracted_spikes(&self) -> Option<&Trials<Array2<Real>>> {
        self.extracted_spikes.as_ref()
    }

    pub fn spike_hist(&self) -> Option<&SpikeHistogram> {
        self.spike_hist.as_ref()
    }

    pub fn spike_density(&self) -> Option<&SpikeDensity> {
        self.spike_density.as_ref()
    }

    pub(crate) fn require_spike_times(&self, stage: Stage) -> SpikeAnalysisResult<&SpikeTimes> {
        self.spike_times
            .as_ref()
            .ok_or(SpikeAnalysisError::MissingField(
                DerivedField::SpikeTimes,
                stage,
            ))
    }

    pub(crate) fn require_spike_hist(&self, stage: Stage) -> SpikeAnalysisResult<&SpikeHistogram> {
        self.spike_hist
            .as_ref()
            .ok_or(SpikeAnalysisError::MissingField(DerivedField::SpikeHist, stage))
    }

    pub(crate) fn with_spike_times(&self, spike_times: SpikeTimes) -> Self {
        Self {
            spike_times: Some(spike_times),
            ..self.clone()
        }
    }

    pub(crate) fn with_extracted_spikes(&self, extracted: Trials<Array2<Real>>) -> Self {
        Self {
            extracted_spikes: Some(extracted),
            ..self.clone()
        }
    }

    pub(crate) fn with_spike_hist(&self, spike_hist: SpikeHistogram) -> Self {
        Self {
            spike_hist: Some(spike_hist),
            ..self.clone()
        }
    }

    pub(crate) fn with_spike_density(&self, spike_density: SpikeDensity) -> Self {
        Self {
            spike_density: Some(spike_density),
            ..self.clone()
        }
    }

    /// Duration in milliseconds of the traces on `channel`.
    pub fn duration(&self, channel: &str) -> SpikeAnalysisResult<Millis> {
        let traces = self.channel(channel)?;
        Ok(trace_duration(traces.len_of_time(), self.sample_rate()))
    }

    /// The span and number of rows needed to draw the detected spikes as a raster.
    pub fn raster_extent(&self) -> SpikeAnalysisResult<RasterExtent> {
        let spike_times = self.require_spike_times(Stage::RasterExtent)?;
        Ok(RasterExtent {
            duration: self.duration(&spike_times.channel)?,
            rows: spike_times.times.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ndarray::{Array2, array};

    #[test]
    fn single_trial_channel() {
        let recording = Recording::single_trial(1000.0)
            .unwrap()
            .with_channel("chan0", array![0.0, 1.0, 2.0])
            .unwrap();
        assert!(!recording.is_batch());
        assert_eq!(recording.sample_rate(), 1000.0);
        assert_eq!(recording.channel("chan0").unwrap().len_of_time(), 3);
        assert_eq!(recording.duration("chan0").unwrap(), 3.0);
    }

    #[test]
    fn batch_uses_first_sample_rate() {
        let recording = Recording::batch(vec![2000.0, 2000.0])
            .unwrap()
            .with_channel("chan0", Array2::<Real>::zeros((4, 2)))
            .unwrap();
        assert!(recording.is_batch());
        assert_eq!(
            recording.sample_rates(),
            &SampleRates::PerTrial(vec![2000.0, 2000.0])
        );
        assert_eq!(recording.sample_rate(), 2000.0);
        assert_eq!(recording.duration("chan0").unwrap(), 2.0);
    }

    #[test]
    fn batch_time_base_is_the_first_rate() {
        let recording = Recording::batch(vec![4000.0, 2000.0])
            .unwrap()
            .with_channel("chan0", Array2::<Real>::zeros((8, 2)))
            .unwrap();
        assert_eq!(recording.sample_rate(), 4000.0);
        assert_eq!(recording.duration("chan0").unwrap(), 2.0);
        assert!(matches!(
            Recording::batch(vec![]),
            Err(SpikeAnalysisError::InvalidRecording(RecordingError::EmptySampleRates))
        ));
    }

    #[test]
    fn channel_layout_must_match_recording() {
        let error = Recording::single_trial(1000.0)
            .unwrap()
            .with_channel("chan0", Array2::<Real>::zeros((4, 2)))
            .unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::InvalidRecording(RecordingError::ExpectedSingleTrial(_))
        ));

        let error = Recording::batch(vec![1000.0])
            .unwrap()
            .with_channel("chan0", array![0.0, 1.0])
            .unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::InvalidRecording(RecordingError::ExpectedBatch(_))
        ));
    }

    #[test]
    fn channels_share_shape() {
        let recording = Recording::batch(vec![1000.0])
            .unwrap()
            .with_channel("chan0", Array2::<Real>::zeros((4, 2)))
            .unwrap();
        let error = recording
            .clone()
            .with_channel("chan1", Array2::<Real>::zeros((5, 2)))
            .unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::InvalidRecording(RecordingError::SampleCount { .. })
        ));
        let error = recording
            .with_channel("chan1", Array2::<Real>::zeros((4, 3)))
            .unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::InvalidRecording(RecordingError::TrialCount { .. })
        ));
    }

    #[test]
    fn sample_rates_per_trial_must_match_trials() {
        let error = Recording::batch(vec![1000.0, 1000.0, 1000.0])
            .unwrap()
            .with_channel("chan0", Array2::<Real>::zeros((4, 2)))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn invalid_sample_rates() {
        assert!(Recording::single_trial(0.0).is_err());
        assert!(Recording::single_trial(Real::NAN).is_err());
        assert!(Recording::batch(vec![]).is_err());
        assert!(Recording::batch(vec![1000.0, -1.0]).is_err());
    }

    #[test]
    fn missing_channel() {
        let recording = Recording::single_trial(1000.0).unwrap();
        assert!(matches!(
            recording.channel("chan3"),
            Err(SpikeAnalysisError::MissingChannel(channel)) if channel == "chan3"
        ));
    }

    #[test]
    fn raster_needs_spike_times() {
        let recording = Recording::single_trial(1000.0)
            .unwrap()
            .with_channel("chan0", array![0.0, 1.0])
            .unwrap();
        assert!(matches!(
            recording.raster_extent(),
            Err(SpikeAnalysisError::MissingField(DerivedField::SpikeTimes, Stage::RasterExtent))
        ));
    }
}
