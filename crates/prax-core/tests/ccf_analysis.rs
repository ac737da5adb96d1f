//! Cut-set and probability analysis over expanded CCF groups,
//! and cancellation behavior of the uncertainty engine

use prax_core::{AnalysisMode, RiskAnalysis, Settings, UncertaintyAnalysis};
use prax_mef::{
    build_model, BasicEventDef, CcfGroupDef, CcfModelKind, Connective, Definition, EventRef,
    ExprDef, FactorDef, FaultTreeDef, FormulaDef, GateDef, Meta, SourceRef, TreeElement,
};
use std::sync::atomic::{AtomicBool, Ordering};

fn gate(name: &str, op: Connective, args: &[&str]) -> TreeElement {
    TreeElement::Gate(GateDef {
        name: name.to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        formula: FormulaDef {
            op,
            vote_number: None,
            args: args.iter().map(|arg| EventRef::any(arg)).collect(),
        },
    })
}

fn pumps_with_ccf() -> Vec<Definition> {
    vec![
        Definition::FaultTree(FaultTreeDef {
            name: "plant".to_string(),
            meta: Meta::default(),
            source: SourceRef::unknown(),
            elements: vec![gate("top", Connective::And, &["pump-a", "pump-b"])],
        }),
        Definition::CcfGroup(CcfGroupDef {
            name: "pumps".to_string(),
            meta: Meta::default(),
            source: SourceRef::unknown(),
            model: CcfModelKind::BetaFactor,
            members: vec![EventRef::any("pump-a"), EventRef::any("pump-b")],
            distribution: Some(ExprDef::Float(0.01)),
            factors: vec![FactorDef {
                level: 2,
                expression: ExprDef::Float(0.1),
                source: SourceRef::unknown(),
            }],
        }),
    ]
}

#[test]
fn common_cause_dominates_redundant_pair() {
    let model = build_model(&pumps_with_ccf()).unwrap();
    let mut analysis = RiskAnalysis::new(model, Settings::default()).unwrap();
    analysis.analyze().unwrap();

    let result = &analysis.results()[0];
    let report = result.fta.products.report(analysis.model());
    // The shared-cause event alone fails both pumps, so it is a
    // first-order product; the independent pair is second order.
    assert_eq!(
        report,
        vec![
            vec!["[pump-a pump-b]".to_string()],
            vec!["[pump-a]".to_string(), "[pump-b]".to_string()],
        ]
    );

    let probability = result.probability.as_ref().unwrap();
    let expected = 0.001 + 0.009 * 0.009;
    assert!((probability.probability - expected).abs() < 1e-12);

    // The common-cause event carries almost all of the risk.
    let shared = &probability.importance["[pump-a pump-b]"];
    assert!(shared.fussell_vesely > 0.9);
}

#[test]
fn cancellation_returns_partial_results() {
    let model = build_model(&pumps_with_ccf()).unwrap();
    let mut analysis = RiskAnalysis::new(
        model,
        Settings::default()
            .with_mode(AnalysisMode::MonteCarlo)
            .with_trials(10_000),
    )
    .unwrap();

    // A flag raised before the run cancels at the first trial boundary.
    let cancel = AtomicBool::new(true);
    analysis.analyze_with_cancel(&cancel).unwrap();
    let uncertainty = analysis.results()[0].uncertainty.as_ref().unwrap();
    assert!(uncertainty.cancelled);
    assert_eq!(uncertainty.trials_completed, 0);
    assert!(uncertainty
        .warnings
        .iter()
        .any(|warning| warning.contains("cancelled")));
}

#[test]
fn uncertainty_engine_runs_standalone_over_products() {
    let model = build_model(&pumps_with_ccf()).unwrap();
    let mut analysis = RiskAnalysis::new(model, Settings::default()).unwrap();
    analysis.analyze().unwrap();
    let products = analysis.results()[0].fta.products.clone();

    let cancel = AtomicBool::new(false);
    let engine = UncertaintyAnalysis::new(&Settings::default().with_trials(128).with_seed(5));
    let result = engine.analyze(analysis.model(), &products, &cancel);
    assert_eq!(result.trials_completed, 128);
    assert!(!cancel.load(Ordering::Relaxed));
    // Constant distribution and factors: zero variance across trials.
    assert_eq!(result.std_dev, 0.0);
    let expected = 0.001 + 0.009 * 0.009;
    assert!((result.mean - expected).abs() < 1e-12);
}
