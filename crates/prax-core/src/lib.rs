#![allow(dead_code, unused_variables, unused_imports)]
//! prax-core - Fault-tree analysis core
//!
//! This crate handles:
//! - Boolean normalization of gate logic into a shared AND/OR/literal DAG
//! - Minimal cut set generation up to a configurable order
//! - Analytic top-event probability (rare-event, MCUB, truncated series)
//! - Monte-Carlo uncertainty over resampled expressions
//! - The `RiskAnalysis` driver tying the engines together

pub mod analysis;
pub mod mcs;
pub mod normalize;
pub mod probability;
pub mod product;
pub mod settings;
pub mod uncertainty;

// Re-export main types
pub use analysis::{format_analysis_report, RiskAnalysis, TreeResult};
pub use mcs::{FaultTreeAnalysis, FtaResult};
pub use normalize::{normalize, NormalNode, NormalOp, NormalRef, Pdag};
pub use probability::{
    approximate, event_probabilities, ImportanceMeasures, ProbabilityAnalysis, ProbabilityResult,
};
pub use product::{minimalize, Literal, Product, ProductContainer};
pub use settings::{AnalysisMode, Approximation, Settings};
pub use uncertainty::{HistogramBin, UncertaintyAnalysis, UncertaintyResult};
