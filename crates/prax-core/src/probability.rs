//! Probability engine
//!
//! Turns a product container and per-event probabilities into a top-event
//! probability using one of three approximations:
//! - rare-event: the sum of product probabilities (default),
//! - min-cut upper bound: `1 - prod(1 - p_i)`,
//! - inclusion-exclusion series truncated at a chosen depth with a cutoff
//!   on individual intersection mass.
//!
//! A rare-event sum above 1 clamps to 1 and is reported as a warning.
//! Importance measures per basic event come along with the result.

use crate::product::{Product, ProductContainer};
use crate::settings::{Approximation, Settings};
use indexmap::IndexMap;
use prax_mef::{Diagnostic, EventKind, Model};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Analytic probability computation over a product container.
#[derive(Debug, Clone)]
pub struct ProbabilityAnalysis {
    approximation: Approximation,
    num_sums: usize,
    cut_off: f64,
}

/// Importance measures for one basic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceMeasures {
    pub event_name: String,
    /// Fraction of the top-event probability carried by products
    /// containing the event.
    pub fussell_vesely: f64,
    /// Sensitivity of the top event to the event probability.
    pub birnbaum: f64,
    /// Risk achievement worth: risk increase if the event always fails.
    pub risk_achievement: f64,
    /// Risk reduction worth: risk decrease if the event never fails.
    pub risk_reduction: f64,
    pub criticality: f64,
}

/// Result of the analytic probability computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityResult {
    pub probability: f64,
    pub approximation: Approximation,
    pub warnings: Vec<String>,
    /// Importance measures keyed by event display name.
    pub importance: IndexMap<String, ImportanceMeasures>,
}

impl ProbabilityAnalysis {
    pub fn new(settings: &Settings) -> Self {
        Self {
            approximation: settings.approximation,
            num_sums: settings.num_sums,
            cut_off: settings.cut_off,
        }
    }

    /// Compute the top-event probability from expression means.
    pub fn analyze(
        &self,
        model: &Model,
        products: &ProductContainer,
    ) -> Result<ProbabilityResult, Diagnostic> {
        let probabilities = event_probabilities(model)?;
        let mut warnings = Vec::new();
        let probability = approximate(
            products,
            &probabilities,
            self.approximation,
            self.num_sums,
            self.cut_off,
            &mut warnings,
        );
        let importance = importance_measures(model, products, &probabilities, probability);
        debug!(probability, approximation = ?self.approximation, "probability analysis complete");
        Ok(ProbabilityResult {
            probability,
            approximation: self.approximation,
            warnings,
            importance,
        })
    }
}

/// Mean probability of every basic event, indexed by event id.
///
/// Values are clamped into [0, 1]; validation has already rejected
/// expressions whose domain cannot reach the unit interval.
pub fn event_probabilities(model: &Model) -> Result<Vec<f64>, Diagnostic> {
    let mut probabilities = vec![0.0; model.events.len()];
    for event in model.basic_event_iter() {
        if let EventKind::Basic {
            expression: Some(expression),
            ..
        } = &event.kind
        {
            let mean = model
                .exprs
                .mean(*expression)
                .map_err(|diagnostic| diagnostic.with_id(event.name.orig_name.clone()))?;
            probabilities[event.id.0] = mean.clamp(0.0, 1.0);
        }
    }
    Ok(probabilities)
}

/// Apply the chosen approximation to a product container.
pub fn approximate(
    products: &ProductContainer,
    probabilities: &[f64],
    approximation: Approximation,
    num_sums: usize,
    cut_off: f64,
    warnings: &mut Vec<String>,
) -> f64 {
    if products.is_null() {
        return 0.0;
    }
    if products.is_unity() {
        return 1.0;
    }
    match approximation {
        Approximation::RareEvent => {
            let sum: f64 = products
                .iter()
                .map(|product| product.probability(probabilities))
                .sum();
            if sum > 1.0 {
                warn!(sum, "rare-event sum exceeds 1; clamping");
                warnings.push(format!(
                    "The rare-event sum {:.6} exceeds 1 and was clamped.",
                    sum
                ));
                1.0
            } else {
                sum
            }
        }
        Approximation::Mcub => {
            let mut complement = 1.0;
            for product in products.iter() {
                complement *= 1.0 - product.probability(probabilities);
            }
            1.0 - complement
        }
        Approximation::Series => {
            let all: Vec<&Product> = products.iter().collect();
            let mut total = 0.0;
            series_terms(
                &all,
                probabilities,
                0,
                &Product::unity(),
                0,
                num_sums,
                cut_off,
                &mut total,
            );
            total.clamp(0.0, 1.0)
        }
    }
}

/// Truncated inclusion-exclusion: alternating sums over intersections of
/// up to `max_depth` products, skipping intersections whose mass falls
/// below the cutoff.
#[allow(clippy::too_many_arguments)]
fn series_terms(
    products: &[&Product],
    probabilities: &[f64],
    start: usize,
    current: &Product,
    depth: usize,
    max_depth: usize,
    cut_off: f64,
    total: &mut f64,
) {
    for index in start..products.len() {
        let intersection = match current.union(products[index]) {
            Some(intersection) => intersection,
            None => continue, // Contradictory intersection has zero mass.
        };
        let mass = intersection.probability(probabilities);
        if mass < cut_off {
            continue;
        }
        // Odd intersection counts add, even counts subtract.
        if depth % 2 == 0 {
            *total += mass;
        } else {
            *total -= mass;
        }
        if depth + 1 < max_depth {
            series_terms(
                products,
                probabilities,
                index + 1,
                &intersection,
                depth + 1,
                max_depth,
                cut_off,
                total,
            );
        }
    }
}

/// Importance measures for every basic event occurring in the products.
fn importance_measures(
    model: &Model,
    products: &ProductContainer,
    probabilities: &[f64],
    top_probability: f64,
) -> IndexMap<String, ImportanceMeasures> {
    let mut measures = IndexMap::new();
    if products.is_null() || products.is_unity() {
        return measures;
    }

    let mut occurring: Vec<prax_mef::EventId> = Vec::new();
    for product in products.iter() {
        for literal in product.literals() {
            if !occurring.contains(&literal.event) {
                occurring.push(literal.event);
            }
        }
    }

    for event in occurring {
        // Mass of products containing the event in positive phase.
        let contribution: f64 = products
            .iter()
            .filter(|product| {
                product
                    .literals()
                    .iter()
                    .any(|literal| literal.event == event && !literal.complement)
            })
            .map(|product| product.probability(probabilities))
            .sum();

        let q = probabilities[event.0];
        let fussell_vesely = if top_probability > 0.0 {
            contribution / top_probability
        } else {
            0.0
        };
        let birnbaum = if q > 0.0 { contribution / q } else { 0.0 };
        let risk_achievement = if top_probability > 0.0 {
            (top_probability + contribution).min(1.0) / top_probability
        } else {
            1.0
        };
        let without = top_probability - contribution;
        let risk_reduction = if without > 0.0 {
            top_probability / without
        } else {
            f64::INFINITY
        };
        let criticality = fussell_vesely * q;

        measures.insert(
            model.event_name(event).to_string(),
            ImportanceMeasures {
                event_name: model.event_name(event).to_string(),
                fussell_vesely,
                birnbaum,
                risk_achievement,
                risk_reduction,
                criticality,
            },
        );
    }
    measures
}
