//! Integration tests for model construction and CCF expansion

use prax_mef::{
    build_model, BasicEventDef, CcfGroupDef, CcfModelKind, Connective, Definition, EventKind,
    EventRef, ExprDef, FactorDef, FaultTreeDef, FormulaDef, GateDef, Meta, Model, ModelDataDef,
    ParameterDef, SourceRef, TreeElement,
};

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

fn basic(name: &str, expression: ExprDef) -> TreeElement {
    TreeElement::BasicEvent(BasicEventDef {
        name: name.to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        expression: Some(expression),
    })
}

fn fault_tree(name: &str, elements: Vec<TreeElement>) -> Definition {
    Definition::FaultTree(FaultTreeDef {
        name: name.to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        elements,
    })
}

fn ccf_group(
    name: &str,
    model: CcfModelKind,
    members: &[&str],
    q: f64,
    factors: &[(u32, f64)],
) -> Definition {
    Definition::CcfGroup(CcfGroupDef {
        name: name.to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        model,
        members: members.iter().map(|member| EventRef::any(member)).collect(),
        distribution: Some(ExprDef::Float(q)),
        factors: factors
            .iter()
            .map(|&(level, value)| FactorDef {
                level,
                expression: ExprDef::Float(value),
                source: SourceRef::unknown(),
            })
            .collect(),
    })
}

/// Probability of every basic event keyed by display name.
fn event_probabilities(model: &Model) -> Vec<(String, f64)> {
    model
        .basic_event_iter()
        .map(|event| {
            let expression = match &event.kind {
                EventKind::Basic {
                    expression: Some(expression),
                    ..
                } => *expression,
                _ => panic!("basic event without expression"),
            };
            (
                event.name.orig_name.clone(),
                model.exprs.mean(expression).unwrap(),
            )
        })
        .collect()
}

#[test]
fn definitions_split_across_tree_and_model_data() {
    let model = build_model(&[
        fault_tree(
            "plant",
            vec![gate("top", Connective::And, &["valve", "pump"])],
        ),
        Definition::ModelData(ModelDataDef {
            source: SourceRef::unknown(),
            elements: vec![
                basic("valve", ExprDef::Float(0.01)),
                basic(
                    "pump",
                    ExprDef::Exponential {
                        lambda: Box::new(ExprDef::Parameter("pump-rate".to_string())),
                        time: Box::new(ExprDef::MissionTime),
                    },
                ),
                TreeElement::Parameter(ParameterDef {
                    name: "pump-rate".to_string(),
                    meta: Meta::default(),
                    source: SourceRef::unknown(),
                    unit: None,
                    expression: ExprDef::Float(1e-4),
                }),
            ],
        }),
    ])
    .unwrap();

    assert!(model.prob_requested);
    assert_eq!(model.basic_event_count(), 2);
    let top = model.fault_trees["plant"].top_event.unwrap();
    assert_eq!(model.children(top).len(), 2);
}

#[test]
fn parameter_names_are_case_sensitive() {
    // Distinct parameters that differ only by case must both resolve.
    let model = build_model(&[fault_tree(
        "plant",
        vec![
            gate("top", Connective::And, &["a", "b"]),
            basic("a", ExprDef::Parameter("Rate".to_string())),
            basic("b", ExprDef::Parameter("rate".to_string())),
            TreeElement::Parameter(ParameterDef {
                name: "Rate".to_string(),
                meta: Meta::default(),
                source: SourceRef::unknown(),
                unit: None,
                expression: ExprDef::Float(0.1),
            }),
            TreeElement::Parameter(ParameterDef {
                name: "rate".to_string(),
                meta: Meta::default(),
                source: SourceRef::unknown(),
                unit: None,
                expression: ExprDef::Float(0.2),
            }),
        ],
    )])
    .unwrap();

    let probabilities = event_probabilities(&model);
    assert!(probabilities.contains(&("a".to_string(), 0.1)));
    assert!(probabilities.contains(&("b".to_string(), 0.2)));
}

#[test]
fn event_names_fold_case_for_uniqueness() {
    let model = build_model(&[fault_tree(
        "plant",
        vec![
            gate("top", Connective::And, &["PumpFailure", "b"]),
            basic("pumpfailure", ExprDef::Float(0.1)),
            basic("b", ExprDef::Float(0.2)),
        ],
    )])
    .unwrap();
    // The reference and the definition met despite the case difference,
    // and the display name keeps the definition spelling.
    let top = model.fault_trees["plant"].top_event.unwrap();
    let names: Vec<&str> = model
        .children(top)
        .iter()
        .map(|&child| model.event_name(child))
        .collect();
    assert!(names.contains(&"pumpfailure"));
}

#[test]
fn beta_factor_expansion_splits_independent_and_common_mass() {
    let model = build_model(&[
        fault_tree(
            "plant",
            vec![gate("top", Connective::Or, &["pump-a", "pump-b"])],
        ),
        ccf_group(
            "pumps",
            CcfModelKind::BetaFactor,
            &["pump-a", "pump-b"],
            0.01,
            &[(2, 0.1)],
        ),
    ])
    .unwrap();

    let probabilities = event_probabilities(&model);
    assert_eq!(probabilities.len(), 3);
    let lookup = |name: &str| {
        probabilities
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, p)| p)
            .unwrap_or_else(|| panic!("missing CCF event {}", name))
    };
    assert!((lookup("[pump-a]") - 0.009).abs() < 1e-12);
    assert!((lookup("[pump-b]") - 0.009).abs() < 1e-12);
    assert!((lookup("[pump-a pump-b]") - 0.001).abs() < 1e-12);

    // The members were replaced in the gate by OR gates over the
    // combined events.
    let top = model.fault_trees["plant"].top_event.unwrap();
    for &child in model.children(top) {
        let replacement = model.event(child);
        assert!(replacement.is_gate(), "member should be replaced by a gate");
        assert_eq!(model.children(child).len(), 2);
    }
}

#[test]
fn mgl_expansion_conserves_member_probability() {
    let q = 0.02;
    let g2 = 0.25;
    let model = build_model(&[
        fault_tree(
            "plant",
            vec![gate("top", Connective::Or, &["m1", "m2", "m3"])],
        ),
        ccf_group(
            "triple",
            CcfModelKind::Mgl,
            &["m1", "m2", "m3"],
            q,
            &[(2, g2)],
        ),
    ])
    .unwrap();

    let probabilities = event_probabilities(&model);
    // Singles carry (1 - g2) Q, pairs g2 Q / 2; no triple without g3.
    let singles: Vec<f64> = probabilities
        .iter()
        .filter(|(name, _)| name.matches(' ').count() == 0)
        .map(|&(_, p)| p)
        .collect();
    let pairs: Vec<f64> = probabilities
        .iter()
        .filter(|(name, _)| name.matches(' ').count() == 1)
        .map(|&(_, p)| p)
        .collect();
    assert_eq!(singles.len(), 3);
    assert_eq!(pairs.len(), 3);
    for p in &singles {
        assert!((p - (1.0 - g2) * q).abs() < 1e-12);
    }
    for p in &pairs {
        assert!((p - g2 * q / 2.0).abs() < 1e-12);
    }
    // Each member participates in one single and two pairs; the total
    // mass per member equals the group distribution.
    let per_member = singles[0] + 2.0 * pairs[0];
    assert!((per_member - q).abs() < 1e-12);
}

#[test]
fn alpha_factor_expansion_weights_levels() {
    let q = 0.01;
    let model = build_model(&[
        fault_tree(
            "plant",
            vec![gate("top", Connective::Or, &["m1", "m2"])],
        ),
        ccf_group(
            "pair",
            CcfModelKind::AlphaFactor,
            &["m1", "m2"],
            q,
            &[(1, 0.95), (2, 0.05)],
        ),
    ])
    .unwrap();

    let probabilities = event_probabilities(&model);
    let denominator = 1.0 * 0.95 + 2.0 * 0.05;
    let expected_single = 0.95 * q / denominator;
    let expected_pair = 2.0 * 0.05 * q / denominator;
    let lookup = |name: &str| {
        probabilities
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, p)| p)
            .unwrap()
    };
    assert!((lookup("[m1]") - expected_single).abs() < 1e-12);
    assert!((lookup("[m1 m2]") - expected_pair).abs() < 1e-12);
}

#[test]
fn phi_factor_requires_unit_sum() {
    let err = build_model(&[
        fault_tree(
            "plant",
            vec![gate("top", Connective::Or, &["m1", "m2"])],
        ),
        ccf_group(
            "pair",
            CcfModelKind::PhiFactor,
            &["m1", "m2"],
            0.01,
            &[(1, 0.6), (2, 0.6)],
        ),
    ])
    .unwrap_err();
    assert!(err
        .iter()
        .any(|d| d.message.contains("sum to 1")), "got {:?}", err);
}

#[test]
fn ccf_member_cannot_join_two_groups() {
    let err = build_model(&[
        fault_tree(
            "plant",
            vec![gate("top", Connective::Or, &["m1", "m2", "m3"])],
        ),
        ccf_group(
            "first",
            CcfModelKind::BetaFactor,
            &["m1", "m2"],
            0.01,
            &[(2, 0.1)],
        ),
        ccf_group(
            "second",
            CcfModelKind::BetaFactor,
            &["m1", "m3"],
            0.01,
            &[(2, 0.1)],
        ),
    ])
    .unwrap_err();
    assert!(!err.is_empty());
}

#[test]
fn model_serializes_for_external_writers() {
    let model = build_model(&[fault_tree(
        "plant",
        vec![
            gate("top", Connective::And, &["a", "b"]),
            basic("a", ExprDef::Float(0.1)),
            basic("b", ExprDef::Float(0.2)),
        ],
    )])
    .unwrap();
    let json = serde_json::to_string(&model).unwrap();
    let round_tripped: Model = serde_json::from_str(&json).unwrap();
    assert_eq!(model, round_tripped);
}
