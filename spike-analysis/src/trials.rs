//! Containers that follow the single-trial / batch split of a recording.
//!
//! [Trials] holds one value per trial, for results whose size differs from
//! trial to trial (spike times, extracted waveforms). [TrialArray] holds
//! fixed-length series, as a 1D array for a single trial or as a
//! (time, trial) 2D array for a batch.
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Trials<T> {
    Single(T),
    Batch(Vec<T>),
}

impl<T> Trials<T> {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Number of trials, a single-trial value counts as one.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Batch(values) => values.as_slice(),
        }
    }

    pub fn get(&self, trial: usize) -> Option<&T> {
        self.as_slice().get(trial)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> Trials<U> {
        match self {
            Self::Single(value) => Trials::Single(f(value)),
            Self::Batch(values) => Trials::Batch(values.iter().map(f).collect()),
        }
    }

    /// Pairs up the trials of two containers with the same layout.
    /// Returns `None` if one is a batch and the other is not, or if the
    /// batches hold different numbers of trials.
    pub fn zip<'a, U>(&'a self, other: &'a Trials<U>) -> Option<Trials<(&'a T, &'a U)>> {
        match (self, other) {
            (Self::Single(a), Trials::Single(b)) => Some(Trials::Single((a, b))),
            (Self::Batch(a), Trials::Batch(b)) if a.len() == b.len() => {
                Some(Trials::Batch(a.iter().zip(b).collect()))
            }
            _ => None,
        }
    }
}

impl<T: Sync> Trials<T> {
    /// Applies `f` to every trial in parallel, the output keeps the trial order.
    pub fn par_map<U, F>(&self, f: F) -> Trials<U>
    where
        U: Send,
        F: Fn(usize, &T) -> U + Sync + Send,
    {
        match self {
            Self::Single(value) => Trials::Single(f(0, value)),
            Self::Batch(values) => Trials::Batch(
                values
                    .par_iter()
                    .enumerate()
                    .map(|(trial, value)| f(trial, value))
                    .collect(),
            ),
        }
    }

    /// As [Trials::par_map], failing as a whole if any trial fails.
    pub fn par_try_map<U, E, F>(&self, f: F) -> Result<Trials<U>, E>
    where
        U: Send,
        E: Send,
        F: Fn(usize, &T) -> Result<U, E> + Sync + Send,
    {
        match self {
            Self::Single(value) => f(0, value).map(Trials::Single),
            Self::Batch(values) => values
                .par_iter()
                .enumerate()
                .map(|(trial, value)| f(trial, value))
                .collect::<Result<Vec<_>, E>>()
                .map(Trials::Batch),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialArray<A> {
    Single(Array1<A>),
    /// Oriented (time, trial): each column is one trial.
    Batch(Array2<A>),
}

impl<A> TrialArray<A> {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Single(array) => array.shape(),
            Self::Batch(array) => array.shape(),
        }
    }

    /// Length along the time axis.
    pub fn len_of_time(&self) -> usize {
        match self {
            Self::Single(array) => array.len(),
            Self::Batch(array) => array.len_of(Axis(0)),
        }
    }

    pub fn num_trials(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(array) => array.len_of(Axis(1)),
        }
    }

    pub fn trial(&self, trial: usize) -> Option<ArrayView1<'_, A>> {
        match self {
            Self::Single(array) => (trial == 0).then(|| array.view()),
            Self::Batch(array) => {
                (trial < array.len_of(Axis(1))).then(|| array.index_axis(Axis(1), trial))
            }
        }
    }

    /// Views of each trial's series, in trial order.
    pub fn trials(&self) -> Trials<ArrayView1<'_, A>> {
        match self {
            Self::Single(array) => Trials::Single(array.view()),
            Self::Batch(array) => Trials::Batch(array.columns().into_iter().collect()),
        }
    }

    pub fn mapv<B, F: FnMut(A) -> B>(&self, f: F) -> TrialArray<B>
    where
        A: Clone,
    {
        match self {
            Self::Single(array) => TrialArray::Single(array.mapv(f)),
            Self::Batch(array) => TrialArray::Batch(array.mapv(f)),
        }
    }
}

impl<A: Clone> TrialArray<A> {
    /// Assembles per-trial series into a single array, a batch becomes the
    /// columns of a (time, trial) array.
    pub fn from_trials(trials: Trials<Array1<A>>) -> Result<Self, ndarray::ShapeError> {
        match trials {
            Trials::Single(array) => Ok(Self::Single(array)),
            Trials::Batch(arrays) => {
                let views = arrays.iter().map(Array1::view).collect::<Vec<_>>();
                ndarray::stack(Axis(1), &views).map(Self::Batch)
            }
        }
    }
}

impl<A> From<Array1<A>> for TrialArray<A> {
    fn from(array: Array1<A>) -> Self {
        Self::Single(array)
    }
}

impl<A> From<Array2<A>> for TrialArray<A> {
    fn from(array: Array2<A>) -> Self {
        Self::Batch(array)
    }
}
