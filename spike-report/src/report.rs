use anyhow::{Context, Result};
use ephys_common::{ChannelId, Millis, Real};
use serde::Serialize;
use spike_analysis::{Recording, SpikeDensity, SpikeHistogram, TrialArray};
use std::{fs::File, io::BufWriter, path::Path};

fn per_trial<A: Clone>(array: &TrialArray<A>) -> Vec<Vec<A>> {
    array.trials().iter().map(|trial| trial.to_vec()).collect()
}

fn shared<A: Clone>(array: &TrialArray<A>) -> Vec<A> {
    array.trial(0).map(|trial| trial.to_vec()).unwrap_or_default()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistogramReport {
    bin_size: Millis,
    bin_edges: Vec<Millis>,
    bin_centers: Vec<Millis>,
    counts: Vec<Vec<u64>>,
    rates: Vec<Vec<Real>>,
}

impl From<&SpikeHistogram> for HistogramReport {
    fn from(hist: &SpikeHistogram) -> Self {
        Self {
            bin_size: hist.bin_size,
            bin_edges: shared(&hist.bin_edges),
            bin_centers: shared(&hist.bin_centers),
            counts: per_trial(&hist.counts),
            rates: per_trial(&hist.rates),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DensityReport {
    sigma: Millis,
    kernel: Vec<Real>,
    rates: Vec<Vec<Real>>,
}

impl From<&SpikeDensity> for DensityReport {
    fn from(density: &SpikeDensity) -> Self {
        Self {
            sigma: density.sigma,
            kernel: density.kernel.to_vec(),
            rates: per_trial(&density.rates),
        }
    }
}

/// Everything the pipeline derived from a recording, listed trial by trial.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Report {
    merged: bool,
    sample_rate: Real,
    channel: Option<ChannelId>,
    spike_times: Option<Vec<Vec<Millis>>>,
    /// Per trial, per spike, the window samples.
    extracted_spikes: Option<Vec<Vec<Vec<Real>>>>,
    spike_hist: Option<HistogramReport>,
    spike_density: Option<DensityReport>,
}

impl Report {
    pub(crate) fn new(recording: &Recording) -> Self {
        let spike_times = recording.spike_times();
        Self {
            merged: recording.is_batch(),
            sample_rate: recording.sample_rate(),
            channel: spike_times.map(|spikes| spikes.channel.clone()),
            spike_times: spike_times
                .map(|spikes| spikes.times.iter().map(|times| times.to_vec()).collect()),
            extracted_spikes: recording.extracted_spikes().map(|extracted| {
                extracted
                    .iter()
                    .map(|windows| windows.columns().into_iter().map(|w| w.to_vec()).collect())
                    .collect()
            }),
            spike_hist: recording.spike_hist().map(HistogramReport::from),
            spike_density: recording.spike_density().map(DensityReport::from),
        }
    }

    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
