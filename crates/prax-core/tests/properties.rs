//! Structural properties: bound bracketing against brute force,
//! declaration-order insensitivity, normalization idempotence, pruning

use prax_core::{normalize, Approximation, RiskAnalysis, Settings};
use prax_mef::{
    build_model, BasicEventDef, Connective, Definition, EventId, EventKind, EventRef, ExprDef,
    FaultTreeDef, FormulaDef, GateDef, GateOp, Meta, Model, SourceRef, TreeElement,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn gate(name: &str, op: Connective, args: &[&str]) -> TreeElement {
    vote_gate(name, op, None, args)
}

fn vote_gate(name: &str, op: Connective, vote_number: Option<u32>, args: &[&str]) -> TreeElement {
    TreeElement::Gate(GateDef {
        name: name.to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        formula: FormulaDef {
            op,
            vote_number,
            args: args.iter().map(|arg| EventRef::any(arg)).collect(),
        },
    })
}

fn basic(name: &str, p: f64) -> TreeElement {
    TreeElement::BasicEvent(BasicEventDef {
        name: name.to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        expression: Some(ExprDef::Float(p)),
    })
}

fn fault_tree(elements: Vec<TreeElement>) -> Vec<Definition> {
    vec![Definition::FaultTree(FaultTreeDef {
        name: "system".to_string(),
        meta: Meta::default(),
        source: SourceRef::unknown(),
        elements,
    })]
}

fn run(definitions: &[Definition], settings: Settings) -> RiskAnalysis {
    let model = build_model(definitions).expect("model must validate");
    let mut analysis = RiskAnalysis::new(model, settings).expect("settings must validate");
    analysis.analyze().expect("analysis must succeed");
    analysis
}

// ============================================================================
// Brute-force oracle
// ============================================================================

/// Evaluate the gate logic under one Boolean assignment of basic events.
fn eval_event(model: &Model, id: EventId, truth: &[bool]) -> bool {
    match &model.event(id).kind {
        EventKind::Basic { .. } => truth[id.0],
        EventKind::House { state } => *state,
        EventKind::Gate {
            op,
            vote_number,
            children,
        } => {
            let child = |&c: &EventId| eval_event(model, c, truth);
            match op {
                GateOp::And | GateOp::Inhibit => children.iter().all(child),
                GateOp::Or => children.iter().any(child),
                GateOp::Nand => !children.iter().all(child),
                GateOp::Nor => !children.iter().any(child),
                GateOp::Not => !eval_event(model, children[0], truth),
                GateOp::Null => eval_event(model, children[0], truth),
                GateOp::Xor => {
                    eval_event(model, children[0], truth) != eval_event(model, children[1], truth)
                }
                GateOp::AtLeast => {
                    let vote = vote_number.expect("validated gate") as usize;
                    children.iter().filter(|c| child(*c)).count() >= vote
                }
            }
        }
    }
}

/// Exact top-event probability by full enumeration; only for small trees.
fn exact_probability(model: &Model, top: EventId, probabilities: &[(EventId, f64)]) -> f64 {
    let n = probabilities.len();
    assert!(n <= 20, "brute force only works for small trees");
    let mut total = 0.0;
    for mask in 0u32..(1 << n) {
        let mut truth = vec![false; model.events.len()];
        let mut weight = 1.0;
        for (bit, &(event, p)) in probabilities.iter().enumerate() {
            let up = mask & (1 << bit) != 0;
            truth[event.0] = up;
            weight *= if up { p } else { 1.0 - p };
        }
        if eval_event(model, top, &truth) {
            total += weight;
        }
    }
    total
}

fn bracket_check(elements: Vec<TreeElement>) {
    let definitions = fault_tree(elements);
    let model = build_model(&definitions).unwrap();
    let top = model.fault_trees["system"].top_event.unwrap();

    let probabilities: Vec<(EventId, f64)> = model
        .basic_event_iter()
        .map(|event| {
            let expression = match &event.kind {
                EventKind::Basic {
                    expression: Some(expression),
                    ..
                } => *expression,
                _ => panic!("basic event without expression"),
            };
            (event.id, model.exprs.mean(expression).unwrap())
        })
        .collect();
    let exact = exact_probability(&model, top, &probabilities);

    let rare = run(&definitions, Settings::default());
    let rare_p = rare.results()[0].probability.as_ref().unwrap().probability;
    let mcub = run(
        &definitions,
        Settings::default().with_approximation(Approximation::Mcub),
    );
    let mcub_p = mcub.results()[0].probability.as_ref().unwrap().probability;

    // Both approximations bound the exact value from above for a
    // coherent tree, with MCUB the tighter of the two.
    assert!(exact <= mcub_p + 1e-9, "exact {} > mcub {}", exact, mcub_p);
    assert!(mcub_p <= rare_p + 1e-9, "mcub {} > rare {}", mcub_p, rare_p);
}

#[test]
fn bounds_bracket_brute_force_on_overlapping_products() {
    bracket_check(vec![
        gate("top", Connective::Or, &["p1", "p2", "p3"]),
        gate("p1", Connective::And, &["a", "b"]),
        gate("p2", Connective::And, &["c", "d"]),
        gate("p3", Connective::And, &["a", "d"]),
        basic("a", 0.3),
        basic("b", 0.4),
        basic("c", 0.2),
        basic("d", 0.35),
    ]);
}

#[test]
fn bounds_bracket_brute_force_on_voting_logic() {
    bracket_check(vec![
        vote_gate("top", Connective::AtLeast, Some(2), &["a", "b", "g"]),
        gate("g", Connective::Or, &["c", "d"]),
        basic("a", 0.15),
        basic("b", 0.25),
        basic("c", 0.1),
        basic("d", 0.2),
    ]);
}

#[test]
fn series_approximation_converges_to_exact() {
    let definitions = fault_tree(vec![
        gate("top", Connective::Or, &["p1", "p2", "p3"]),
        gate("p1", Connective::And, &["a", "b"]),
        gate("p2", Connective::And, &["c", "d"]),
        gate("p3", Connective::And, &["a", "d"]),
        basic("a", 0.3),
        basic("b", 0.4),
        basic("c", 0.2),
        basic("d", 0.35),
    ]);
    let model = build_model(&definitions).unwrap();
    let top = model.fault_trees["system"].top_event.unwrap();
    let probabilities: Vec<(EventId, f64)> = model
        .basic_event_iter()
        .map(|event| {
            let expression = match &event.kind {
                EventKind::Basic {
                    expression: Some(expression),
                    ..
                } => *expression,
                _ => unreachable!(),
            };
            (event.id, model.exprs.mean(expression).unwrap())
        })
        .collect();
    let exact = exact_probability(&model, top, &probabilities);

    // With the series depth equal to the product count the truncated
    // inclusion-exclusion is the full expansion.
    let full = run(
        &definitions,
        Settings::default()
            .with_approximation(Approximation::Series)
            .with_num_sums(3),
    );
    let p = full.results()[0].probability.as_ref().unwrap().probability;
    assert!((p - exact).abs() < 1e-9, "series {} vs exact {}", p, exact);
}

// ============================================================================
// Declaration order
// ============================================================================

#[test]
fn products_are_insensitive_to_declaration_order() {
    let elements = vec![
        gate("top", Connective::Or, &["g1", "g2"]),
        gate("g1", Connective::And, &["a", "b"]),
        gate("g2", Connective::And, &["b", "c"]),
        basic("a", 0.1),
        basic("b", 0.2),
        basic("c", 0.3),
    ];
    let baseline = run(&fault_tree(elements.clone()), Settings::default());
    let expected = baseline.results()[0]
        .fta
        .products
        .report(baseline.model());
    let expected_p = baseline.results()[0]
        .probability
        .as_ref()
        .unwrap()
        .probability;

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..8 {
        let mut shuffled = elements.clone();
        shuffled.shuffle(&mut rng);
        let analysis = run(&fault_tree(shuffled), Settings::default());
        assert_eq!(
            analysis.results()[0].fta.products.report(analysis.model()),
            expected
        );
        let p = analysis.results()[0].probability.as_ref().unwrap().probability;
        assert!((p - expected_p).abs() < 1e-12);
    }
}

// ============================================================================
// Normalization round trip
// ============================================================================

#[test]
fn normalization_is_idempotent_on_real_trees() {
    let trees = vec![
        vec![
            gate("top", Connective::Xor, &["a", "b"]),
            basic("a", 0.5),
            basic("b", 0.5),
        ],
        vec![
            vote_gate("top", Connective::AtLeast, Some(2), &["a", "b", "c"]),
            basic("a", 0.1),
            basic("b", 0.1),
            basic("c", 0.1),
        ],
        vec![
            gate("top", Connective::Nand, &["g", "c"]),
            gate("g", Connective::Nor, &["a", "b"]),
            basic("a", 0.2),
            basic("b", 0.2),
            basic("c", 0.2),
        ],
    ];
    for elements in trees {
        let model = build_model(&fault_tree(elements)).unwrap();
        let top = model.fault_trees["system"].top_event.unwrap();
        let pdag = normalize(&model, top).unwrap();
        assert_eq!(pdag.renormalize(), pdag);
    }
}

// ============================================================================
// Pruning and serialization surfaces
// ============================================================================

#[test]
fn cutoff_pruning_keeps_dominant_products() {
    let elements = vec![
        gate("top", Connective::Or, &["g1", "g2"]),
        gate("g1", Connective::And, &["a", "b"]),
        gate("g2", Connective::And, &["c", "d"]),
        basic("a", 0.2),
        basic("b", 0.2),
        basic("c", 1e-7),
        basic("d", 1e-7),
    ];
    let unpruned = run(&fault_tree(elements.clone()), Settings::default());
    assert_eq!(unpruned.results()[0].fta.products.len(), 2);

    let pruned = run(
        &fault_tree(elements),
        Settings::default().with_cut_off(1e-6),
    );
    let report = pruned.results()[0].fta.products.report(pruned.model());
    assert_eq!(report, vec![vec!["a".to_string(), "b".to_string()]]);
}

#[test]
fn results_serialize_for_report_writers() {
    let analysis = run(
        &fault_tree(vec![
            gate("top", Connective::And, &["a", "b"]),
            basic("a", 0.1),
            basic("b", 0.2),
        ]),
        Settings::default(),
    );
    let result = &analysis.results()[0];
    let json = serde_json::to_string(result).expect("results must serialize");
    assert!(json.contains("\"probability\""));
    assert!(json.contains("\"products\""));
}
