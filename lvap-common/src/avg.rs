use std::collections::VecDeque;

/// Exponentially weighted moving average.
///
/// `weight` is the share given to the newest sample (`0.0 < weight <= 1.0`).
/// The first sample initializes the average. NaN and infinite samples are
/// ignored so a single bad reading cannot poison the series.
#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    value: f64,
    weight: f64,
    initialized: bool,
}

impl Ewma {
    /// Creates an empty average.
    pub const fn new(weight: f64) -> Self {
        Self { value: 0.0, weight, initialized: false }
    }

    /// Folds in `sample`.
    pub fn update(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }
        if self.initialized {
            self.value = self.value * (1.0 - self.weight) + sample * self.weight;
        } else {
            self.value = sample;
            self.initialized = true;
        }
    }

    /// Current average, zero before the first sample.
    #[inline]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Whether a sample was folded in.
    #[inline]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Simple moving average over the last `window` samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: VecDeque<f64>,
    window: usize,
    sum: f64,
}

impl MovingAverage {
    /// Creates an empty average. A zero window is treated as a window of one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self { samples: VecDeque::with_capacity(window), window, sum: 0.0 }
    }

    /// Adds `sample`, evicting the oldest one when the window is full.
    pub fn update(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    /// Returns the mean of the samples in the window, or `None` if there are none.
    pub fn value(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as f64)
        }
    }

    /// Number of samples in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
