//! Monte-Carlo uncertainty engine
//!
//! Repeats the probability computation over resampled expressions. Each
//! trial draws a fresh trial identifier, invalidating the per-trial cache
//! of shared sub-expressions, recomputes every basic-event probability,
//! and records the resulting top-event probability. The driver polls a
//! caller-provided cancellation flag between trials and returns partial
//! results. A trial whose sampling fails is discarded with a warning, not
//! fatal to the run. Trials are independent, so they can optionally be
//! dispatched to parallel worker contexts, each with its own trial
//! identifier and pseudo-random source.

use crate::product::ProductContainer;
use crate::settings::{Approximation, Settings};
use prax_mef::{Diagnostic, EventKind, Model, SampleSpace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Monte-Carlo driver over a frozen model and its products.
#[derive(Debug, Clone)]
pub struct UncertaintyAnalysis {
    trials: usize,
    bins: usize,
    seed: u64,
    parallel: bool,
    approximation: Approximation,
    num_sums: usize,
    cut_off: f64,
}

/// One bar of the reported histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Summary of the Monte-Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyResult {
    pub mean: f64,
    pub std_dev: f64,
    /// 5th percentile of the sampled top-event probability.
    pub p05: f64,
    /// 95th percentile of the sampled top-event probability.
    pub p95: f64,
    pub histogram: Vec<HistogramBin>,
    /// Trials that produced a sample.
    pub trials_completed: usize,
    /// Trials discarded because sampling failed.
    pub trials_discarded: usize,
    /// Whether the run stopped early on the cancellation flag.
    pub cancelled: bool,
    pub warnings: Vec<String>,
}

impl UncertaintyAnalysis {
    pub fn new(settings: &Settings) -> Self {
        Self {
            trials: settings.trials,
            bins: settings.bins,
            seed: settings.seed,
            parallel: settings.parallel,
            approximation: settings.approximation,
            num_sums: settings.num_sums,
            cut_off: settings.cut_off,
        }
    }

    /// Run the trials; partial results are returned on cancellation.
    pub fn analyze(
        &self,
        model: &Model,
        products: &ProductContainer,
        cancel: &AtomicBool,
    ) -> UncertaintyResult {
        let outcomes: Vec<Option<Result<f64, Diagnostic>>> = if self.parallel {
            (0..self.trials as u64)
                .into_par_iter()
                .map(|trial| {
                    if cancel.load(Ordering::Relaxed) {
                        None
                    } else {
                        Some(self.run_trial(model, products, trial))
                    }
                })
                .collect()
        } else {
            let mut outcomes = Vec::with_capacity(self.trials);
            for trial in 0..self.trials as u64 {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                outcomes.push(Some(self.run_trial(model, products, trial)));
            }
            outcomes
        };

        let cancelled = outcomes.len() < self.trials || outcomes.iter().any(Option::is_none);
        let mut warnings = Vec::new();
        let mut samples = Vec::with_capacity(outcomes.len());
        let mut discarded = 0usize;
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(sample) => samples.push(sample),
                Err(diagnostic) => {
                    discarded += 1;
                    warn!(%diagnostic, "trial discarded");
                }
            }
        }
        if discarded > 0 {
            warnings.push(format!("{} trials discarded due to sampling failures", discarded));
        }
        if cancelled {
            warnings.push(format!(
                "uncertainty analysis cancelled after {} trials",
                samples.len() + discarded
            ));
        }
        debug!(
            completed = samples.len(),
            discarded, cancelled, "uncertainty analysis finished"
        );
        summarize(&samples, self.bins, discarded, cancelled, warnings)
    }

    /// One trial: fresh trial identifier, resampled probabilities, one
    /// probability-engine run.
    fn run_trial(
        &self,
        model: &Model,
        products: &ProductContainer,
        trial: u64,
    ) -> Result<f64, Diagnostic> {
        let mut space = SampleSpace::for_trial(self.seed, trial, model.exprs.len());
        let mut probabilities = vec![0.0; model.events.len()];
        for event in model.basic_event_iter() {
            if let EventKind::Basic {
                expression: Some(expression),
                ..
            } = &event.kind
            {
                let sample = model
                    .exprs
                    .sample(*expression, &mut space)
                    .map_err(|diagnostic| diagnostic.with_id(event.name.orig_name.clone()))?;
                probabilities[event.id.0] = sample.clamp(0.0, 1.0);
            }
        }
        let mut warnings = Vec::new();
        Ok(crate::probability::approximate(
            products,
            &probabilities,
            self.approximation,
            self.num_sums,
            self.cut_off,
            &mut warnings,
        ))
    }
}

/// Sample statistics in the shape report writers consume.
fn summarize(
    samples: &[f64],
    bins: usize,
    discarded: usize,
    cancelled: bool,
    warnings: Vec<String>,
) -> UncertaintyResult {
    let n = samples.len();
    if n == 0 {
        return UncertaintyResult {
            mean: 0.0,
            std_dev: 0.0,
            p05: 0.0,
            p95: 0.0,
            histogram: Vec::new(),
            trials_completed: 0,
            trials_discarded: discarded,
            cancelled,
            warnings,
        };
    }

    let mean = samples.iter().sum::<f64>() / n as f64;
    let std_dev = if n > 1 {
        (samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let lower_idx = ((0.05 * n as f64).floor() as usize).min(n - 1);
    let upper_idx = ((0.95 * n as f64).ceil() as usize).saturating_sub(1).min(n - 1);
    let p05 = sorted[lower_idx];
    let p95 = sorted[upper_idx];

    let lo = sorted[0];
    let hi = sorted[n - 1];
    let histogram = build_histogram(&sorted, lo, hi, bins);

    UncertaintyResult {
        mean,
        std_dev,
        p05,
        p95,
        histogram,
        trials_completed: n,
        trials_discarded: discarded,
        cancelled,
        warnings,
    }
}

fn build_histogram(sorted: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<HistogramBin> {
    let width = (hi - lo) / bins as f64;
    if width <= 0.0 {
        // Degenerate sample set: everything in one bar.
        return vec![HistogramBin {
            lower: lo,
            upper: hi,
            count: sorted.len(),
        }];
    }
    let mut histogram: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lo + i as f64 * width,
            upper: lo + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for &sample in sorted {
        let index = (((sample - lo) / width) as usize).min(bins - 1);
        histogram[index].count += 1;
    }
    histogram
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_statistics() {
        let samples: Vec<f64> = (1..=100).map(|i| i as f64 / 100.0).collect();
        let result = summarize(&samples, 10, 0, false, Vec::new());
        assert!((result.mean - 0.505).abs() < 1e-9);
        assert!(result.std_dev > 0.0);
        assert!(result.p05 <= 0.1);
        assert!(result.p95 >= 0.9);
        assert_eq!(result.trials_completed, 100);
        let total: usize = result.histogram.iter().map(|bin| bin.count).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_summarize_degenerate_samples() {
        let samples = vec![0.25; 50];
        let result = summarize(&samples, 10, 0, false, Vec::new());
        assert_eq!(result.mean, 0.25);
        assert_eq!(result.std_dev, 0.0);
        assert_eq!(result.histogram.len(), 1);
        assert_eq!(result.histogram[0].count, 50);
    }

    #[test]
    fn test_summarize_empty() {
        let result = summarize(&[], 10, 3, true, vec!["cancelled".to_string()]);
        assert_eq!(result.trials_completed, 0);
        assert_eq!(result.trials_discarded, 3);
        assert!(result.cancelled);
    }
}
