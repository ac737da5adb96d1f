//! Risk analysis driver
//!
//! Owns a frozen model and the settings of one run. For every fault tree
//! it generates the minimal cut sets, then, when the input carried
//! probability data, runs the analytic probability engine or the
//! Monte-Carlo uncertainty engine depending on the analysis mode. The
//! mission-time cell is set once before any evaluation; everything else
//! is read-only during analysis.

use crate::mcs::{FaultTreeAnalysis, FtaResult};
use crate::probability::{ProbabilityAnalysis, ProbabilityResult};
use crate::settings::{AnalysisMode, Settings};
use crate::uncertainty::{UncertaintyAnalysis, UncertaintyResult};
use prax_mef::{Diagnostic, Model};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use tracing::info;

/// Per-fault-tree analysis outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeResult {
    /// Display name of the fault tree.
    pub tree: String,
    pub fta: FtaResult,
    pub probability: Option<ProbabilityResult>,
    pub uncertainty: Option<UncertaintyResult>,
}

/// One risk analysis run over a validated model.
#[derive(Debug)]
pub struct RiskAnalysis {
    model: Model,
    settings: Settings,
    results: Vec<TreeResult>,
}

impl RiskAnalysis {
    /// Wrap a frozen model; the settings are range-checked here.
    pub fn new(model: Model, settings: Settings) -> Result<Self, Diagnostic> {
        settings.validate()?;
        Ok(Self {
            model,
            settings,
            results: Vec::new(),
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Results per fault tree, in declaration order.
    pub fn results(&self) -> &[TreeResult] {
        &self.results
    }

    /// Run without external cancellation.
    pub fn analyze(&mut self) -> Result<(), Diagnostic> {
        let cancel = AtomicBool::new(false);
        self.analyze_with_cancel(&cancel)
    }

    /// Run all analyses, polling `cancel` inside the uncertainty engine.
    pub fn analyze_with_cancel(&mut self, cancel: &AtomicBool) -> Result<(), Diagnostic> {
        self.model.exprs.set_mission_time(self.settings.mission_time);
        self.results.clear();

        let fta = FaultTreeAnalysis::new(&self.settings);
        let trees: Vec<(String, prax_mef::EventId)> = self
            .model
            .fault_trees
            .values()
            .filter_map(|tree| {
                tree.top_event
                    .map(|top| (tree.name.orig_name.clone(), top))
            })
            .collect();

        for (name, top) in trees {
            info!(tree = %name, "analyzing fault tree");
            let fta_result = fta.analyze(&self.model, top)?;

            let mut probability = None;
            let mut uncertainty = None;
            if self.model.prob_requested {
                match self.settings.mode {
                    AnalysisMode::Default => {
                        probability = Some(
                            ProbabilityAnalysis::new(&self.settings)
                                .analyze(&self.model, &fta_result.products)?,
                        );
                    }
                    AnalysisMode::MonteCarlo => {
                        uncertainty = Some(UncertaintyAnalysis::new(&self.settings).analyze(
                            &self.model,
                            &fta_result.products,
                            cancel,
                        ));
                    }
                }
            }

            self.results.push(TreeResult {
                tree: name,
                fta: fta_result,
                probability,
                uncertainty,
            });
        }
        Ok(())
    }
}

/// Format a plain-text summary of the analysis results.
pub fn format_analysis_report(analysis: &RiskAnalysis) -> String {
    let mut output = String::new();
    output.push_str("=== Risk Analysis Report ===\n\n");

    for warning in &analysis.model().warnings {
        output.push_str(&format!("warning: {}\n", warning));
    }

    for result in analysis.results() {
        output.push_str(&format!("--- Fault Tree: {} ---\n", result.tree));
        for warning in &result.fta.warnings {
            output.push_str(&format!("warning: {}\n", warning));
        }
        output.push_str(&format!(
            "Minimal cut sets: {}\n",
            result.fta.products.len()
        ));
        for (order, count) in result.fta.products.distribution() {
            output.push_str(&format!("  Order {}: {} products\n", order, count));
        }
        for row in result.fta.products.report(analysis.model()) {
            output.push_str(&format!("  {{ {} }}\n", row.join(" ")));
        }

        if let Some(probability) = &result.probability {
            output.push_str(&format!(
                "Top event probability: {:.6e} ({:?})\n",
                probability.probability, probability.approximation
            ));
            for warning in &probability.warnings {
                output.push_str(&format!("warning: {}\n", warning));
            }
            if !probability.importance.is_empty() {
                output.push_str(&format!(
                    "{:<24} {:>10} {:>10} {:>12}\n",
                    "Event", "F-V", "Birnbaum", "Criticality"
                ));
                for measures in probability.importance.values() {
                    output.push_str(&format!(
                        "{:<24} {:>10.4} {:>10.4} {:>12.4e}\n",
                        measures.event_name,
                        measures.fussell_vesely,
                        measures.birnbaum,
                        measures.criticality
                    ));
                }
            }
        }

        if let Some(uncertainty) = &result.uncertainty {
            output.push_str(&format!(
                "Monte-Carlo mean: {:.6e} (sd {:.3e}, {} trials)\n",
                uncertainty.mean, uncertainty.std_dev, uncertainty.trials_completed
            ));
            output.push_str(&format!(
                "5-95 percentile band: [{:.6e}, {:.6e}]\n",
                uncertainty.p05, uncertainty.p95
            ));
            for warning in &uncertainty.warnings {
                output.push_str(&format!("warning: {}\n", warning));
            }
        }
        output.push('\n');
    }
    output
}
