//! Minimal cut set engine
//!
//! Bottom-up product propagation over the normalized DAG. Every node gets
//! the set of minimal products equivalent to it, up to the order limit:
//! a literal is a singleton set, OR unions child sets, AND combines them
//! pairwise, discarding impossible (complement-pair) and over-limit
//! products. Minimalization runs after every combine. Scratch sets are
//! released as soon as the last parent has consumed them, driven by
//! reference counts over the DAG.

use crate::normalize::{normalize, NormalOp, NormalRef, Pdag};
use crate::product::{minimalize, Literal, Product, ProductContainer};
use crate::settings::Settings;
use prax_mef::{Diagnostic, ErrorKind, EventId, EventKind, Model};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Cut-set generation for one fault tree.
#[derive(Debug, Clone)]
pub struct FaultTreeAnalysis {
    limit_order: usize,
    cut_off: f64,
}

/// Outcome of cut-set generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtaResult {
    pub products: ProductContainer,
    pub warnings: Vec<String>,
    /// Wall-clock duration of the analysis in seconds.
    pub analysis_time: f64,
}

impl FaultTreeAnalysis {
    pub fn new(settings: &Settings) -> Self {
        Self {
            limit_order: settings.limit_order,
            cut_off: settings.cut_off,
        }
    }

    /// Generate the minimal cut sets of the tree rooted at `top`.
    pub fn analyze(&self, model: &Model, top: EventId) -> Result<FtaResult, Diagnostic> {
        let start = Instant::now();
        let pdag = normalize(model, top)?;
        debug!(nodes = pdag.nodes.len(), "normalized fault tree");

        let max_prob = event_max_probabilities(model);
        let mut engine = ProductEngine {
            limit_order: self.limit_order,
            cut_off: self.cut_off,
            max_prob,
            largest_mass: 0.0,
            truncated: false,
        };
        let products = engine.propagate(&pdag);

        let mut warnings = Vec::new();
        let container = ProductContainer::new(products);
        if container.is_null() {
            if engine.truncated {
                return Err(Diagnostic::new(
                    ErrorKind::AnalysisLimit,
                    format!(
                        "no products found within the order limit {}",
                        self.limit_order
                    ),
                ));
            }
            warn!("top event is NULL");
            warnings.push("The top event is NULL. Success is guaranteed.".to_string());
        } else if container.is_unity() {
            warn!("top event is UNITY");
            warnings.push("The top event is UNITY. Failure is guaranteed.".to_string());
        }

        debug!(
            products = container.len(),
            max_order = container.max_order(),
            "cut-set generation complete"
        );
        Ok(FtaResult {
            products: container,
            warnings,
            analysis_time: start.elapsed().as_secs_f64(),
        })
    }
}

/// Upper bounds of every basic event probability, indexed by event id.
///
/// Events without probability data get 1.0 so pruning never drops them.
fn event_max_probabilities(model: &Model) -> Vec<f64> {
    let mut bounds = vec![1.0; model.events.len()];
    for event in &model.events {
        if let EventKind::Basic {
            expression: Some(expression),
            ..
        } = &event.kind
        {
            if let Ok((_, hi)) = model.exprs.interval(*expression) {
                bounds[event.id.0] = hi.clamp(0.0, 1.0);
            }
        }
    }
    bounds
}

struct ProductEngine {
    limit_order: usize,
    cut_off: f64,
    max_prob: Vec<f64>,
    /// Largest product mass seen so far, for relative pruning.
    largest_mass: f64,
    /// Whether any product was dropped by the order limit.
    truncated: bool,
}

impl ProductEngine {
    fn propagate(&mut self, pdag: &Pdag) -> Vec<Product> {
        let mut counts = pdag.reference_counts();
        let mut scratch: Vec<Option<Vec<Product>>> = vec![None; pdag.nodes.len()];

        // Children precede parents in the node ordering.
        for index in 0..pdag.nodes.len() {
            let node = &pdag.nodes[index];
            let mut products = match node.op {
                NormalOp::Or => {
                    let mut union = Vec::new();
                    for arg in &node.args {
                        union.extend(self.consume(arg, &mut counts, &mut scratch));
                    }
                    union
                }
                NormalOp::And => {
                    let mut combined = vec![Product::unity()];
                    for arg in &node.args {
                        let child = self.consume(arg, &mut counts, &mut scratch);
                        combined = self.combine(combined, &child);
                    }
                    combined
                }
            };
            minimalize(&mut products);
            self.prune(&mut products);
            scratch[index] = Some(products);
        }

        match pdag.root {
            NormalRef::Constant(false) => Vec::new(),
            NormalRef::Constant(true) => vec![Product::unity()],
            NormalRef::Literal(literal) => vec![Product::singleton(literal)],
            NormalRef::Node(index) => scratch[index].take().unwrap_or_default(),
        }
    }

    /// Product set of an argument; node sets are released once their last
    /// parent has taken them.
    fn consume(
        &mut self,
        arg: &NormalRef,
        counts: &mut [usize],
        scratch: &mut [Option<Vec<Product>>],
    ) -> Vec<Product> {
        match arg {
            NormalRef::Literal(literal) => vec![Product::singleton(*literal)],
            // Normalization folds constants out of node arguments.
            NormalRef::Constant(_) => Vec::new(),
            NormalRef::Node(index) => {
                counts[*index] -= 1;
                if counts[*index] == 0 {
                    scratch[*index].take().unwrap_or_default()
                } else {
                    scratch[*index].clone().unwrap_or_default()
                }
            }
        }
    }

    /// Pairwise conjunction of two product sets.
    fn combine(&mut self, left: Vec<Product>, right: &[Product]) -> Vec<Product> {
        let mut out = Vec::with_capacity(left.len().max(right.len()));
        for a in &left {
            for b in right {
                match a.union(b) {
                    Some(product) if product.order() <= self.limit_order => out.push(product),
                    Some(_) => self.truncated = true,
                    // An event and its complement: impossible product.
                    None => {}
                }
            }
        }
        minimalize(&mut out);
        out
    }

    /// Relative probability pruning; inactive while `cut_off` is 0.
    fn prune(&mut self, products: &mut Vec<Product>) {
        if self.cut_off <= 0.0 {
            return;
        }
        for product in products.iter() {
            let mass = self.mass(product);
            if mass > self.largest_mass {
                self.largest_mass = mass;
            }
        }
        let threshold = self.cut_off * self.largest_mass;
        products.retain(|product| self.mass(product) >= threshold);
    }

    fn mass(&self, product: &Product) -> f64 {
        let mut mass = 1.0;
        for literal in product.literals() {
            let p = self.max_prob[literal.event.0];
            mass *= if literal.complement { 1.0 - p } else { p };
        }
        mass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Literal;

    fn singleton(id: usize) -> Product {
        Product::singleton(Literal::positive(EventId(id)))
    }

    #[test]
    fn test_combine_discards_over_limit() {
        let mut engine = ProductEngine {
            limit_order: 1,
            cut_off: 0.0,
            max_prob: vec![1.0; 4],
            largest_mass: 0.0,
            truncated: false,
        };
        let combined = engine.combine(vec![singleton(0)], &[singleton(1)]);
        assert!(combined.is_empty());
        assert!(engine.truncated);
    }

    #[test]
    fn test_combine_discards_contradictions() {
        let mut engine = ProductEngine {
            limit_order: 5,
            cut_off: 0.0,
            max_prob: vec![1.0; 4],
            largest_mass: 0.0,
            truncated: false,
        };
        let a = Product::singleton(Literal::positive(EventId(0)));
        let not_a = Product::singleton(Literal::negative(EventId(0)));
        let combined = engine.combine(vec![a], &[not_a]);
        assert!(combined.is_empty());
        assert!(!engine.truncated);
    }

    #[test]
    fn test_prune_keeps_dominant_products() {
        let mut engine = ProductEngine {
            limit_order: 5,
            cut_off: 0.1,
            max_prob: vec![0.5, 1e-6],
            largest_mass: 0.0,
            truncated: false,
        };
        let mut products = vec![singleton(0), singleton(1)];
        engine.prune(&mut products);
        assert_eq!(products, vec![singleton(0)]);
    }
}
