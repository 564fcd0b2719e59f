use crate::{error::ArgumentMismatch, trials::Trials};
use ephys_common::Real;
use ndarray::Array1;

/// Threshold for a single trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialThreshold {
    /// One level for every sample.
    Scalar(Real),
    /// A time-varying level, one value per sample.
    Wave(Array1<Real>),
}

impl TrialThreshold {
    fn resolve(&self, trial: usize, num_samples: usize) -> Result<Array1<Real>, ArgumentMismatch> {
        match self {
            Self::Scalar(level) => Ok(Array1::from_elem(num_samples, *level)),
            Self::Wave(wave) if wave.len() == num_samples => Ok(wave.clone()),
            Self::Wave(wave) => Err(ArgumentMismatch::WaveLength {
                trial,
                expected: num_samples,
                found: wave.len(),
            }),
        }
    }
}

/// Threshold given to spike detection.
///
/// [Threshold::Scalar] and [Threshold::Wave] apply to every trial,
/// [Threshold::PerTrial] gives each trial of a batch its own threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    Scalar(Real),
    Wave(Array1<Real>),
    PerTrial(Vec<TrialThreshold>),
}

impl Threshold {
    /// Expands the threshold into one full-length level array per trial.
    pub(crate) fn resolve(
        &self,
        is_batch: bool,
        num_trials: usize,
        num_samples: usize,
    ) -> Result<Trials<Array1<Real>>, ArgumentMismatch> {
        let per_trial = match self {
            Self::Scalar(level) => vec![TrialThreshold::Scalar(*level); num_trials],
            Self::Wave(wave) => vec![TrialThreshold::Wave(wave.clone()); num_trials],
            Self::PerTrial(_) if !is_batch => {
                return Err(ArgumentMismatch::PerTrialOnSingleTrial("threshold"));
            }
            Self::PerTrial(thresholds) if thresholds.len() != num_trials => {
                return Err(ArgumentMismatch::TrialCount {
                    param: "threshold",
                    expected: num_trials,
                    found: thresholds.len(),
                });
            }
            Self::PerTrial(thresholds) => thresholds.clone(),
        };
        let levels = per_trial
            .iter()
            .enumerate()
            .map(|(trial, threshold)| threshold.resolve(trial, num_samples))
            .collect::<Result<Vec<_>, _>>()?;

        if is_batch {
            Ok(Trials::Batch(levels))
        } else {
            levels
                .into_iter()
                .next()
                .map(Trials::Single)
                .ok_or(ArgumentMismatch::TrialCount {
                    param: "threshold",
                    expected: 1,
                    found: 0,
                })
        }
    }
}

impl From<Real> for Threshold {
    fn from(level: Real) -> Self {
        Self::Scalar(level)
    }
}

impl From<Array1<Real>> for Threshold {
    fn from(wave: Array1<Real>) -> Self {
        Self::Wave(wave)
    }
}

impl From<Vec<TrialThreshold>> for Threshold {
    fn from(thresholds: Vec<TrialThreshold>) -> Self {
        Self::PerTrial(thresholds)
    }
}

impl From<Real> for TrialThreshold {
    fn from(level: Real) -> Self {
        Self::Scalar(level)
    }
}

impl From<Array1<Real>> for TrialThreshold {
    fn from(wave: Array1<Real>) -> Self {
        Self::Wave(wave)
    }
}

/// Pre-filter switch for detection, either shared by all trials or given per trial.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTrace {
    All(bool),
    PerTrial(Vec<bool>),
}

impl Default for FilterTrace {
    fn default() -> Self {
        Self::All(false)
    }
}

impl From<bool> for FilterTrace {
    fn from(enabled: bool) -> Self {
        Self::All(enabled)
    }
}

impl FilterTrace {
    pub(crate) fn resolve(
        &self,
        is_batch: bool,
        num_trials: usize,
    ) -> Result<Trials<bool>, ArgumentMismatch> {
        match self {
            Self::All(enabled) if is_batch => Ok(Trials::Batch(vec![*enabled; num_trials])),
            Self::All(enabled) => Ok(Trials::Single(*enabled)),
            Self::PerTrial(_) if !is_batch => {
                Err(ArgumentMismatch::PerTrialOnSingleTrial("filter flag"))
            }
            Self::PerTrial(flags) if flags.len() != num_trials => {
                Err(ArgumentMismatch::TrialCount {
                    param: "filter flag",
                    expected: num_trials,
                    found: flags.len(),
                })
            }
            Self::PerTrial(flags) => Ok(Trials::Batch(flags.clone())),
        }
    }
}
