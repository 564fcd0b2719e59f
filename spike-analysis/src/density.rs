use crate::{
    error::{SpikeAnalysisError, SpikeAnalysisResult, Stage},
    recording::{Recording, SpikeDensity},
    trials::TrialArray,
};
use ephys_common::{Millis, Real};
use ndarray::{Array1, ArrayView1};
use std::f64::consts::TAU;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq)]
pub struct DensityOptions {
    /// Standard deviation of the Gaussian kernel in milliseconds.
    pub sigma: Millis,
}

impl Default for DensityOptions {
    fn default() -> Self {
        Self { sigma: 100.0 }
    }
}

fn normal_pdf(x: Real, sigma: Real) -> Real {
    (-0.5 * (x / sigma).powi(2)).exp() / (sigma * TAU.sqrt())
}

/// Gaussian weights sampled every `bin_size` from `-3 * sigma` to `3 * sigma`.
///
/// Each weight is scaled by `bin_size` so the kernel sums to roughly one.
/// The kernel has an odd length and is centred on its middle element, with
/// at most `max_half_len` weights either side of the centre.
pub fn gaussian_kernel(sigma: Millis, bin_size: Millis, max_half_len: usize) -> Array1<Real> {
    let max_half_len = max_half_len.min(usize::MAX / 2);
    let reach = (3.0 * sigma / bin_size).floor();
    let half_len = if reach < max_half_len as Real {
        reach as usize
    } else {
        max_half_len
    };
    (0..=2 * half_len)
        .map(|i| {
            let offset = i as Real - half_len as Real;
            normal_pdf(offset * bin_size, sigma) * bin_size
        })
        .collect()
}

/// Centred linear convolution, the output has the length of `signal`.
/// Samples beyond either end of `signal` count as zero.
pub(crate) fn convolve_same(
    signal: ArrayView1<'_, Real>,
    kernel: ArrayView1<'_, Real>,
) -> Array1<Real> {
    let centre = kernel.len() / 2;
    Array1::from_shape_fn(signal.len(), |i| {
        kernel
            .iter()
            .enumerate()
            .filter_map(|(j, &weight)| {
                (i + centre)
                    .checked_sub(j)
                    .and_then(|k| signal.get(k))
                    .map(|&value| weight * value)
            })
            .sum()
    })
}

/// Smooths the histogram rates of `recording` with a Gaussian kernel.
///
/// Requires a histogram, see [crate::make_spike_histogram], whose bin size is
/// no larger than `sigma`. Each trial is smoothed independently with the
/// same kernel.
#[instrument(skip_all, fields(sigma = options.sigma))]
pub fn make_spike_density(
    recording: &Recording,
    options: &DensityOptions,
) -> SpikeAnalysisResult<Recording> {
    let sigma = options.sigma;
    if !sigma.is_finite() {
        return Err(SpikeAnalysisError::InvalidSigma(sigma));
    }
    let spike_hist = recording.require_spike_hist(Stage::MakeSpikeDensity)?;
    if sigma < spike_hist.bin_size {
        return Err(SpikeAnalysisError::SigmaBelowBinSize {
            sigma,
            bin_size: spike_hist.bin_size,
        });
    }

    // Weights further out than the histogram is long never reach a bin.
    let num_bins = spike_hist.rates.len_of_time();
    let kernel = gaussian_kernel(sigma, spike_hist.bin_size, num_bins);
    debug!(kernel_len = kernel.len(), "Built smoothing kernel");

    let rates = spike_hist
        .rates
        .trials()
        .par_map(|_, rates| convolve_same(rates.view(), kernel.view()));

    let spike_density = SpikeDensity {
        bin_centers: spike_hist.bin_centers.clone(),
        rates: TrialArray::from_trials(rates)?,
        kernel,
        sigma,
    };
    Ok(recording.with_spike_density(spike_density))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{DerivedField, ErrorKind},
        histogram::{HistogramOptions, make_spike_histogram},
        recording::SpikeTimes,
        trials::Trials,
    };
    use assert_approx_eq::assert_approx_eq;
    use ephys_common::DEFAULT_CHANNEL;
    use ndarray::{Array2, array};

    const PDF_0: Real = 0.398_942_280_401_432_7;
    const PDF_1: Real = 0.241_970_724_519_143_37;
    const PDF_2: Real = 0.053_990_966_513_188_06;
    const PDF_3: Real = 0.004_431_848_411_938_008;

    fn histogram(
        num_samples: usize,
        times: Trials<Array1<Millis>>,
        bin_size: Millis,
    ) -> Recording {
        let recording = if times.is_batch() {
            Recording::batch(vec![1000.0])
                .unwrap()
                .with_channel(DEFAULT_CHANNEL, Array2::<Real>::zeros((num_samples, times.len())))
                .unwrap()
        } else {
            Recording::single_trial(1000.0)
                .unwrap()
                .with_channel(DEFAULT_CHANNEL, Array1::<Real>::zeros(num_samples))
                .unwrap()
        };
        let recording = recording.with_spike_times(SpikeTimes {
            channel: DEFAULT_CHANNEL.to_owned(),
            times,
        });
        make_spike_histogram(&recording, &HistogramOptions { bin_size }).unwrap()
    }

    #[test]
    fn kernel_values() {
        let kernel = gaussian_kernel(1.0, 1.0, usize::MAX);
        assert_eq!(kernel.len(), 7);
        let expected = [PDF_3, PDF_2, PDF_1, PDF_0, PDF_1, PDF_2, PDF_3];
        for (&value, expected) in kernel.iter().zip(expected) {
            assert_approx_eq!(value, expected, 1e-12);
        }
    }

    #[test]
    fn kernel_scaled_by_bin_size() {
        let kernel = gaussian_kernel(100.0, 1.0, usize::MAX);
        assert_eq!(kernel.len(), 601);
        assert_approx_eq!(kernel.sum(), 1.0, 5e-3);
        let coarse = gaussian_kernel(100.0, 10.0, usize::MAX);
        assert_eq!(coarse.len(), 61);
        assert_approx_eq!(coarse.sum(), 1.0, 5e-3);
    }

    #[test]
    fn kernel_reach_is_capped() {
        let kernel = gaussian_kernel(1e300, 1.0, 5);
        assert_eq!(kernel.len(), 11);
        assert!(kernel.iter().all(|&weight| weight > 0.0 && weight.is_finite()));
        assert_eq!(gaussian_kernel(1.0, 1.0, 2).len(), 5);
        assert_eq!(gaussian_kernel(1.0, 1e-300, 0).len(), 1);
    }

    #[test]
    fn impulse_reproduces_kernel() {
        let kernel = gaussian_kernel(1.0, 1.0, usize::MAX);
        let mut signal = Array1::zeros(11);
        signal[5] = 1.0;
        let smoothed = convolve_same(signal.view(), kernel.view());
        for (i, &value) in smoothed.iter().enumerate() {
            let expected = if (2..=8).contains(&i) { kernel[i - 2] } else { 0.0 };
            assert_approx_eq!(value, expected, 1e-15);
        }
    }

    #[test]
    fn constant_signal_is_attenuated_at_the_edges() {
        let kernel = gaussian_kernel(1.0, 1.0, usize::MAX);
        let smoothed = convolve_same(Array1::ones(9).view(), kernel.view());
        let edge = PDF_0 + PDF_1 + PDF_2 + PDF_3;
        let next = edge + PDF_1;
        let full = PDF_0 + 2.0 * (PDF_1 + PDF_2 + PDF_3);
        let expected = [edge, next, next + PDF_2, full, full, full, next + PDF_2, next, edge];
        assert_eq!(smoothed.len(), 9);
        for (&value, expected) in smoothed.iter().zip(expected) {
            assert_approx_eq!(value, expected, 1e-12);
        }
    }

    #[test]
    fn smoothed_rates_keep_their_shape() {
        let recording = histogram(
            50,
            Trials::Batch(vec![array![10.0, 11.0, 12.0], array![40.0], Array1::zeros(0)]),
            1.0,
        );
        let result = make_spike_density(&recording, &DensityOptions { sigma: 2.0 }).unwrap();
        let hist = result.spike_hist().unwrap();
        let density = result.spike_density().unwrap();

        assert_eq!(density.rates.shape(), hist.rates.shape());
        assert_eq!(density.rates.shape(), &[50, 3]);
        assert_eq!(density.bin_centers, hist.bin_centers);
        assert_eq!(density.sigma, 2.0);
        assert_eq!(density.kernel, gaussian_kernel(2.0, 1.0, 50));
        assert!(density.rates.trial(2).unwrap().iter().all(|&rate| rate == 0.0));

        let peak = density.rates.trial(0).unwrap()[11];
        assert!(peak > 0.0 && peak < 3000.0);
    }

    #[test]
    fn single_trial_density() {
        let recording = histogram(20, Trials::Single(array![10.0]), 1.0);
        let result = make_spike_density(&recording, &DensityOptions { sigma: 1.0 }).unwrap();
        let density = result.spike_density().unwrap();
        let TrialArray::Single(rates) = &density.rates else {
            unreachable!("single-trial histogram gives single-trial density");
        };
        assert_eq!(rates.len(), 20);
        assert_approx_eq!(rates[10], 1000.0 * PDF_0, 1e-9);
        assert_approx_eq!(rates[9], 1000.0 * PDF_1, 1e-9);
        assert_approx_eq!(rates[13], 1000.0 * PDF_3, 1e-9);
        assert_eq!(rates[14], 0.0);
    }

    #[test]
    fn wide_sigma_on_a_short_histogram() {
        let recording = histogram(20, Trials::Single(array![10.0]), 1.0);
        let result = make_spike_density(&recording, &DensityOptions { sigma: 1e300 }).unwrap();
        let density = result.spike_density().unwrap();
        assert_eq!(density.kernel.len(), 41);
        assert_eq!(density.rates.shape(), &[20]);
        assert!(density.rates.trial(0).unwrap().iter().all(|rate| rate.is_finite()));
    }

    #[test]
    fn sigma_below_bin_size() {
        let recording = histogram(20, Trials::Single(array![10.0]), 5.0);
        let error = make_spike_density(&recording, &DensityOptions { sigma: 4.0 }).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidConfiguration);
        assert!(make_spike_density(&recording, &DensityOptions { sigma: 5.0 }).is_ok());
    }

    #[test]
    fn needs_histogram() {
        let recording = Recording::single_trial(1000.0).unwrap();
        let error = make_spike_density(&recording, &DensityOptions::default()).unwrap_err();
        assert!(matches!(
            error,
            SpikeAnalysisError::MissingField(DerivedField::SpikeHist, Stage::MakeSpikeDensity)
        ));
    }
}
