use anyhow::{Context, Result, bail};
use ephys_common::{ChannelId, Real, SampleRate};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use spike_analysis::Recording;
use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SampleRateEntry {
    Single(SampleRate),
    PerTrial(Vec<SampleRate>),
}

/// A channel is either one trace, or a list of traces, one per trial.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelEntry {
    Trace(Vec<Real>),
    Trials(Vec<Vec<Real>>),
}

///
/// A recording as stored on disk, for example
/// ```json
/// { "merged": true, "sampleRate": 10000, "channels": { "chan0": [[...], [...]] } }
/// ```
///
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecordingFile {
    #[serde(default)]
    merged: bool,
    sample_rate: SampleRateEntry,
    channels: BTreeMap<ChannelId, ChannelEntry>,
}

/// Lays trial-major traces out as a (samples, trials) array.
fn stack_trials(channel: &str, trials: Vec<Vec<Real>>) -> Result<Array2<Real>> {
    let num_trials = trials.len();
    let num_samples = trials.first().map(Vec::len).unwrap_or_default();
    if let Some(ragged) = trials.iter().position(|trial| trial.len() != num_samples) {
        bail!("Channel {channel}: trial {ragged} does not have {num_samples} samples");
    }
    let flat = trials.into_iter().flatten().collect();
    let traces = Array2::from_shape_vec((num_trials, num_samples), flat)?;
    Ok(traces.reversed_axes())
}

impl RecordingFile {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let recording = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Cannot parse {}", path.display()))?;
        debug!("Loaded recording file");
        Ok(recording)
    }

    pub(crate) fn into_recording(self) -> Result<Recording> {
        let mut recording = match (self.merged, self.sample_rate) {
            (false, SampleRateEntry::Single(rate)) => Recording::single_trial(rate)?,
            (false, SampleRateEntry::PerTrial(_)) => {
                bail!("A single-trial recording takes one sample rate")
            }
            (true, SampleRateEntry::Single(rate)) => Recording::batch(vec![rate])?,
            (true, SampleRateEntry::PerTrial(rates)) => Recording::batch(rates)?,
        };

        for (channel, entry) in self.channels {
            recording = match (self.merged, entry) {
                (false, ChannelEntry::Trace(trace)) => {
                    recording.with_channel(channel, Array1::from(trace))?
                }
                (true, ChannelEntry::Trials(trials)) => {
                    let traces = stack_trials(&channel, trials)?;
                    recording.with_channel(channel, traces)?
                }
                (true, ChannelEntry::Trace(_)) => {
                    bail!("Channel {channel}: a merged recording lists one trace per trial")
                }
                (false, ChannelEntry::Trials(_)) => {
                    bail!("Channel {channel}: a single-trial recording holds one trace")
                }
            };
        }
        Ok(recording)
    }
}
