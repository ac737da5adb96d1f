//! Fault-tree model builder
//!
//! Accepts declarative elements in any order and resolves forward
//! references with a placeholder-then-promote scheme. The builder keeps
//! four families of index maps: defined entities by kind, to-be-defined
//! entities whose kind is already known, untyped references whose kind is
//! still open (with the gates that requested them), and the original
//! spellings of pending ids for diagnostics.
//!
//! Validation happens in two layers. The first layer sums every
//! structural diagnostic (undefined gates, arity violations, missing
//! definitions, parameter cycles, expression domains) before failing so
//! the caller sees the complete list. The second layer runs per fault
//! tree and per CCF group, failing fast within one but continuing across
//! independent ones.

use crate::ccf::{apply_ccf_groups, CcfGroup};
use crate::diagnostic::{Diagnostic, ErrorKind, SourceRef};
use crate::element::{Id, Meta, Units};
use crate::event::{Event, EventFlavor, EventId, EventKind, FaultTree, GateOp, Model};
use crate::expression::{Expr, ExprArena, ExprId};
use crate::input::{
    BasicEventDef, CcfGroupDef, Connective, Definition, EventRef, ExprDef, FaultTreeDef, GateDef,
    HouseEventDef, ParameterDef, RefHint, TreeElement,
};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, warn};

/// Incremental model builder; see the module docs for the resolution
/// scheme.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    events: Vec<Event>,
    exprs: ExprArena,
    fault_trees: IndexMap<String, FaultTree>,

    // Defined entities by kind.
    gates: IndexMap<String, EventId>,
    basic_events: IndexMap<String, EventId>,
    house_events: IndexMap<String, EventId>,
    parameters: IndexMap<String, ExprId>,

    // To-be-defined entities whose kind is known.
    tbd_gates: IndexMap<String, EventId>,
    tbd_basics: IndexMap<String, EventId>,
    tbd_houses: IndexMap<String, EventId>,
    tbd_params: IndexMap<String, ExprId>,

    // Untyped references: id -> gates waiting for the event.
    tbd_any: IndexMap<String, Vec<EventId>>,
    tbd_orig: IndexMap<String, String>,

    ccf_groups: IndexMap<String, CcfGroup>,

    /// Defined basic events carrying expressions, in definition order.
    basic_order: Vec<EventId>,
    /// Every expression built from input, with its source for diagnostics.
    expr_registry: Vec<(ExprId, SourceRef)>,
    /// Shared `system-mission-time` node, created on first use.
    mission_time_expr: Option<ExprId>,

    prob_requested: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Build a frozen model from a complete sequence of definitions.
pub fn build_model(definitions: &[Definition]) -> Result<Model, Vec<Diagnostic>> {
    let mut builder = ModelBuilder::new();
    for definition in definitions {
        builder.add_definition(definition);
    }
    builder.build()
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any probability data has been seen so far.
    pub fn prob_requested(&self) -> bool {
        self.prob_requested
    }

    /// Process one top-level declarative element.
    pub fn add_definition(&mut self, definition: &Definition) {
        match definition {
            Definition::FaultTree(tree) => self.define_fault_tree(tree),
            Definition::ModelData(data) => {
                self.prob_requested = true;
                for element in &data.elements {
                    match element {
                        TreeElement::BasicEvent(def) => self.define_basic_event(def),
                        TreeElement::HouseEvent(def) => self.define_house_event(def),
                        TreeElement::Parameter(def) => self.define_parameter(def),
                        TreeElement::Gate(def) => self.report(
                            Diagnostic::new(
                                ErrorKind::InvalidFormat,
                                "gate definitions are not allowed in model data",
                            )
                            .with_id(def.name.clone())
                            .with_source(def.source),
                        ),
                        TreeElement::CcfGroup(def) => self.report(
                            Diagnostic::new(
                                ErrorKind::InvalidFormat,
                                "CCF groups are not allowed in model data",
                            )
                            .with_id(def.name.clone())
                            .with_source(def.source),
                        ),
                    }
                }
            }
            Definition::CcfGroup(group) => self.define_ccf_group(group),
        }
    }

    /// Finalize: resolve leftovers, validate both layers, expand CCF
    /// groups, and freeze the model.
    pub fn build(mut self) -> Result<Model, Vec<Diagnostic>> {
        if !self.prob_requested {
            // Cut-set-only analysis: pending events become primary events.
            let pending_houses: Vec<(String, EventId)> = self.tbd_houses.drain(..).collect();
            for (id, event) in pending_houses {
                self.house_events.insert(id, event);
            }
            let pending_basics: Vec<(String, EventId)> = self.tbd_basics.drain(..).collect();
            for (id, event) in pending_basics {
                self.basic_events.insert(id, event);
            }
            let pending: Vec<(String, Vec<EventId>)> = self.tbd_any.drain(..).collect();
            for (id, requesters) in pending {
                let orig = self.tbd_orig.shift_remove(&id).unwrap_or_else(|| id.clone());
                let event = self.new_event(
                    &orig,
                    EventKind::Basic {
                        expression: None,
                        flavor: EventFlavor::Plain,
                        ccf_group: None,
                    },
                    Meta::default(),
                    SourceRef::unknown(),
                );
                for gate in requesters {
                    self.attach_child(gate, event);
                }
                self.basic_events.insert(id, event);
            }
        }

        self.check_first_layer();
        if !self.diagnostics.is_empty() {
            return Err(self.diagnostics);
        }

        let mut model = Model {
            events: self.events,
            exprs: self.exprs,
            fault_trees: self.fault_trees,
            parameters: self.parameters,
            ccf_groups: self.ccf_groups,
            basic_events: self.basic_order,
            prob_requested: self.prob_requested,
            warnings: Vec::new(),
        };

        let second_layer = check_second_layer(&mut model);
        if !second_layer.is_empty() {
            return Err(second_layer);
        }

        gather_orphans(&mut model);
        if let Err(diagnostic) = apply_ccf_groups(&mut model) {
            return Err(vec![diagnostic]);
        }

        info!(
            gates = model.gate_count(),
            basic_events = model.basic_event_count(),
            fault_trees = model.fault_trees.len(),
            "model construction complete"
        );
        Ok(model)
    }

    // ========================================================================
    // Definition handlers
    // ========================================================================

    fn define_fault_tree(&mut self, def: &FaultTreeDef) {
        let id = Id::new(&def.name);
        if self.fault_trees.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::DuplicateDefinition, "fault tree is already defined")
                    .with_id(&id.orig_name)
                    .with_source(def.source),
            );
            return;
        }
        let key = id.name.clone();
        self.fault_trees.insert(
            key.clone(),
            FaultTree {
                name: id,
                meta: def.meta.clone(),
                source: def.source,
                gates: Vec::new(),
                top_event: None,
            },
        );

        for element in &def.elements {
            if matches!(
                element,
                TreeElement::BasicEvent(_) | TreeElement::HouseEvent(_) | TreeElement::CcfGroup(_)
            ) {
                self.prob_requested = true;
            }
            match element {
                TreeElement::Gate(gate) => self.define_gate(gate, &key),
                TreeElement::BasicEvent(def) => self.define_basic_event(def),
                TreeElement::HouseEvent(def) => self.define_house_event(def),
                TreeElement::Parameter(def) => self.define_parameter(def),
                TreeElement::CcfGroup(def) => self.define_ccf_group(def),
            }
        }
    }

    fn define_gate(&mut self, def: &GateDef, tree_key: &str) {
        let id = Id::new(&def.name);

        if self.is_primary_or_pending_primary(&id.name) {
            self.report(
                Diagnostic::new(
                    ErrorKind::IdentifierConflict,
                    "the id is already assigned to a primary event",
                )
                .with_id(&id.orig_name)
                .with_source(def.source),
            );
            return;
        }
        if self.gates.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::DuplicateDefinition, "gate is doubly defined")
                    .with_id(&id.orig_name)
                    .with_source(def.source),
            );
            return;
        }

        let mut op = match def.formula.op {
            Connective::And => GateOp::And,
            Connective::Or => GateOp::Or,
            Connective::Not => GateOp::Not,
            Connective::Nand => GateOp::Nand,
            Connective::Nor => GateOp::Nor,
            Connective::Xor => GateOp::Xor,
            Connective::Null => GateOp::Null,
            Connective::Inhibit => GateOp::Inhibit,
            Connective::AtLeast => GateOp::AtLeast,
        };
        // The flavor attribute turns a plain AND gate into INHIBIT.
        if op == GateOp::And && def.meta.has_flavor("inhibit") {
            op = GateOp::Inhibit;
        }

        let gate = match self.tbd_gates.shift_remove(&id.name) {
            Some(placeholder) => placeholder,
            None => {
                let event = self.new_event(
                    &id.orig_name,
                    EventKind::Gate {
                        op,
                        vote_number: def.formula.vote_number,
                        children: Vec::new(),
                    },
                    Meta::default(),
                    def.source,
                );
                self.resolve_pending_any(&id.name, event);
                event
            }
        };
        {
            let event = &mut self.events[gate.0];
            event.meta = def.meta.clone();
            event.source = def.source;
            if let EventKind::Gate {
                op: op_slot,
                vote_number: vote_slot,
                ..
            } = &mut event.kind
            {
                *op_slot = op;
                *vote_slot = def.formula.vote_number;
            }
        }
        self.gates.insert(id.name.clone(), gate);
        if let Some(tree) = self.fault_trees.get_mut(tree_key) {
            tree.gates.push(gate);
        }

        self.process_formula(gate, &id.orig_name, &def.formula.args);
    }

    fn process_formula(&mut self, gate: EventId, gate_name: &str, args: &[EventRef]) {
        let mut seen: Vec<String> = Vec::new();
        for arg in args {
            let child_id = Id::new(&arg.name);
            if seen.contains(&child_id.name) {
                self.report(
                    Diagnostic::new(
                        ErrorKind::GateStructure,
                        format!("detected a repeated child '{}'", child_id.orig_name),
                    )
                    .with_id(gate_name)
                    .with_source(arg.source),
                );
                continue;
            }
            seen.push(child_id.name.clone());

            let child = match arg.hint {
                RefHint::Any => self.resolve_any_ref(gate, &child_id),
                RefHint::Gate => self.resolve_gate_ref(&child_id, arg.source),
                RefHint::Basic => self.resolve_basic_ref(&child_id, arg.source),
                RefHint::House => self.resolve_house_ref(&child_id, arg.source),
            };
            if let Some(child) = child {
                self.attach_child(gate, child);
            }
        }
    }

    /// Untyped reference: use any known entity, otherwise park the gate in
    /// the untyped-reference queue until a definition shows up.
    fn resolve_any_ref(&mut self, gate: EventId, id: &Id) -> Option<EventId> {
        if let Some(&event) = self
            .basic_events
            .get(&id.name)
            .or_else(|| self.house_events.get(&id.name))
            .or_else(|| self.gates.get(&id.name))
            .or_else(|| self.tbd_gates.get(&id.name))
            .or_else(|| self.tbd_basics.get(&id.name))
            .or_else(|| self.tbd_houses.get(&id.name))
        {
            return Some(event);
        }
        self.tbd_any.entry(id.name.clone()).or_default().push(gate);
        self.tbd_orig
            .entry(id.name.clone())
            .or_insert_with(|| id.orig_name.clone());
        None
    }

    fn resolve_gate_ref(&mut self, id: &Id, source: SourceRef) -> Option<EventId> {
        if self.is_primary_or_pending_primary(&id.name) {
            self.report(
                Diagnostic::new(
                    ErrorKind::IdentifierConflict,
                    "the id is already assigned to a primary event",
                )
                .with_id(&id.orig_name)
                .with_source(source),
            );
            return None;
        }
        if let Some(&gate) = self.gates.get(&id.name).or_else(|| self.tbd_gates.get(&id.name)) {
            return Some(gate);
        }
        let event = self.new_event(
            &id.orig_name,
            EventKind::Gate {
                op: GateOp::Null,
                vote_number: None,
                children: Vec::new(),
            },
            Meta::default(),
            source,
        );
        self.tbd_gates.insert(id.name.clone(), event);
        self.resolve_pending_any(&id.name, event);
        Some(event)
    }

    fn resolve_basic_ref(&mut self, id: &Id, source: SourceRef) -> Option<EventId> {
        if self.gates.contains_key(&id.name) || self.tbd_gates.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::IdentifierConflict, "the id is already assigned to a gate")
                    .with_id(&id.orig_name)
                    .with_source(source),
            );
            return None;
        }
        if self.house_events.contains_key(&id.name) || self.tbd_houses.contains_key(&id.name) {
            self.report(
                Diagnostic::new(
                    ErrorKind::IdentifierConflict,
                    "the id is already used by a house event",
                )
                .with_id(&id.orig_name)
                .with_source(source),
            );
            return None;
        }
        if let Some(&event) = self
            .basic_events
            .get(&id.name)
            .or_else(|| self.tbd_basics.get(&id.name))
        {
            return Some(event);
        }
        let event = self.new_event(
            &id.orig_name,
            EventKind::Basic {
                expression: None,
                flavor: EventFlavor::Plain,
                ccf_group: None,
            },
            Meta::default(),
            source,
        );
        self.tbd_basics.insert(id.name.clone(), event);
        self.resolve_pending_any(&id.name, event);
        Some(event)
    }

    fn resolve_house_ref(&mut self, id: &Id, source: SourceRef) -> Option<EventId> {
        if self.gates.contains_key(&id.name) || self.tbd_gates.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::IdentifierConflict, "the id is already assigned to a gate")
                    .with_id(&id.orig_name)
                    .with_source(source),
            );
            return None;
        }
        if self.basic_events.contains_key(&id.name) || self.tbd_basics.contains_key(&id.name) {
            self.report(
                Diagnostic::new(
                    ErrorKind::IdentifierConflict,
                    "the id is already used by a basic event",
                )
                .with_id(&id.orig_name)
                .with_source(source),
            );
            return None;
        }
        if let Some(&event) = self
            .house_events
            .get(&id.name)
            .or_else(|| self.tbd_houses.get(&id.name))
        {
            return Some(event);
        }
        let event = self.new_event(
            &id.orig_name,
            EventKind::House { state: false },
            Meta::default(),
            source,
        );
        self.tbd_houses.insert(id.name.clone(), event);
        self.resolve_pending_any(&id.name, event);
        Some(event)
    }

    fn define_basic_event(&mut self, def: &BasicEventDef) {
        let id = Id::new(&def.name);
        let event = match self.claim_basic_event(&id, def.source) {
            Some(event) => event,
            None => return,
        };

        let flavor = if def.meta.has_flavor("conditional") {
            EventFlavor::Conditional
        } else if def.meta.has_flavor("undeveloped") {
            EventFlavor::Undeveloped
        } else {
            EventFlavor::Plain
        };

        let expression = match &def.expression {
            Some(expr) => Some(self.build_expression(expr, def.source)),
            None => {
                self.report(
                    Diagnostic::new(
                        ErrorKind::InvalidFormat,
                        "basic event does not have an expression",
                    )
                    .with_id(&id.orig_name)
                    .with_source(def.source),
                );
                None
            }
        };

        let entry = &mut self.events[event.0];
        entry.meta = def.meta.clone();
        entry.source = def.source;
        entry.kind = EventKind::Basic {
            expression,
            flavor,
            ccf_group: match &entry.kind {
                EventKind::Basic { ccf_group, .. } => ccf_group.clone(),
                _ => None,
            },
        };
        if expression.is_some() {
            self.basic_order.push(event);
        }
    }

    /// Shared claim path for `define-basic-event` and CCF members: conflict
    /// checks, promotion from the pending map, and registration as defined.
    fn claim_basic_event(&mut self, id: &Id, source: SourceRef) -> Option<EventId> {
        if self.gates.contains_key(&id.name) || self.tbd_gates.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::IdentifierConflict, "the id is already assigned to a gate")
                    .with_id(&id.orig_name)
                    .with_source(source),
            );
            return None;
        }
        if self.basic_events.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::DuplicateDefinition, "basic event is doubly defined")
                    .with_id(&id.orig_name)
                    .with_source(source),
            );
            return None;
        }
        if self.house_events.contains_key(&id.name) || self.tbd_houses.contains_key(&id.name) {
            self.report(
                Diagnostic::new(
                    ErrorKind::IdentifierConflict,
                    "the id is already used by a house event",
                )
                .with_id(&id.orig_name)
                .with_source(source),
            );
            return None;
        }

        let event = match self.tbd_basics.shift_remove(&id.name) {
            Some(placeholder) => placeholder,
            None => {
                let event = self.new_event(
                    &id.orig_name,
                    EventKind::Basic {
                        expression: None,
                        flavor: EventFlavor::Plain,
                        ccf_group: None,
                    },
                    Meta::default(),
                    source,
                );
                self.resolve_pending_any(&id.name, event);
                event
            }
        };
        self.basic_events.insert(id.name.clone(), event);
        Some(event)
    }

    fn define_house_event(&mut self, def: &HouseEventDef) {
        let id = Id::new(&def.name);
        if self.gates.contains_key(&id.name) || self.tbd_gates.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::IdentifierConflict, "the id is already assigned to a gate")
                    .with_id(&id.orig_name)
                    .with_source(def.source),
            );
            return;
        }
        if self.house_events.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::DuplicateDefinition, "house event is doubly defined")
                    .with_id(&id.orig_name)
                    .with_source(def.source),
            );
            return;
        }
        if self.basic_events.contains_key(&id.name) || self.tbd_basics.contains_key(&id.name) {
            self.report(
                Diagnostic::new(
                    ErrorKind::IdentifierConflict,
                    "the id is already used by a basic event",
                )
                .with_id(&id.orig_name)
                .with_source(def.source),
            );
            return;
        }

        let event = match self.tbd_houses.shift_remove(&id.name) {
            Some(placeholder) => placeholder,
            None => {
                let event = self.new_event(
                    &id.orig_name,
                    EventKind::House { state: def.state },
                    Meta::default(),
                    def.source,
                );
                self.resolve_pending_any(&id.name, event);
                event
            }
        };
        let entry = &mut self.events[event.0];
        entry.meta = def.meta.clone();
        entry.source = def.source;
        entry.kind = EventKind::House { state: def.state };
        self.house_events.insert(id.name.clone(), event);
    }

    fn define_parameter(&mut self, def: &ParameterDef) {
        // Parameter names are case-sensitive.
        let name = def.name.trim().to_string();
        if self.parameters.contains_key(&name) {
            self.report(
                Diagnostic::new(ErrorKind::DuplicateDefinition, "parameter is doubly defined")
                    .with_id(&name)
                    .with_source(def.source),
            );
            return;
        }
        let unit = def.unit.unwrap_or(Units::Unitless);
        let value = self.build_expression(&def.expression, def.source);

        let parameter = match self.tbd_params.shift_remove(&name) {
            Some(placeholder) => placeholder,
            None => self.exprs.push(Expr::Parameter {
                name: name.clone(),
                unit,
                value: None,
            }),
        };
        if let Expr::Parameter {
            value: slot,
            unit: unit_slot,
            ..
        } = self.exprs.get_mut(parameter)
        {
            *slot = Some(value);
            *unit_slot = unit;
        }
        self.parameters.insert(name, parameter);
    }

    fn define_ccf_group(&mut self, def: &CcfGroupDef) {
        self.prob_requested = true;
        let id = Id::new(&def.name);
        if self.ccf_groups.contains_key(&id.name) {
            self.report(
                Diagnostic::new(ErrorKind::DuplicateDefinition, "CCF group is already defined")
                    .with_id(&id.orig_name)
                    .with_source(def.source),
            );
            return;
        }

        let mut members = Vec::new();
        for member in &def.members {
            let member_id = Id::new(&member.name);
            // An id already defined (including membership in another
            // group) fails the claim with a diagnostic.
            let event = match self.claim_basic_event(&member_id, member.source) {
                Some(event) => event,
                None => continue,
            };
            if let EventKind::Basic { ccf_group, .. } = &mut self.events[event.0].kind {
                *ccf_group = Some(id.name.clone());
            }
            members.push(event);
        }

        let distribution = def
            .distribution
            .as_ref()
            .map(|expr| self.build_expression(expr, def.source));
        let mut factors = Vec::new();
        for factor in &def.factors {
            let expression = self.build_expression(&factor.expression, factor.source);
            factors.push((factor.level, expression));
        }

        self.ccf_groups.insert(
            id.name.clone(),
            CcfGroup {
                name: id,
                meta: def.meta.clone(),
                source: def.source,
                model: def.model,
                members,
                distribution,
                factors,
            },
        );
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn build_expression(&mut self, def: &ExprDef, source: SourceRef) -> ExprId {
        let id = match def {
            ExprDef::Float(value) => self.exprs.push(Expr::Constant(*value)),
            ExprDef::Int(value) => self.exprs.push(Expr::Constant(*value as f64)),
            ExprDef::Bool(state) => self
                .exprs
                .push(Expr::Constant(if *state { 1.0 } else { 0.0 })),
            ExprDef::Parameter(name) => return self.parameter_reference(name),
            ExprDef::MissionTime => {
                return match self.mission_time_expr {
                    Some(id) => id,
                    None => {
                        let id = self.exprs.push(Expr::MissionTime);
                        self.mission_time_expr = Some(id);
                        id
                    }
                }
            }
            ExprDef::Neg(arg) => {
                let arg = self.build_expression(arg, source);
                self.exprs.push(Expr::Neg(arg))
            }
            ExprDef::Add(args) => {
                let args = self.build_expressions(args, source);
                self.exprs.push(Expr::Add(args))
            }
            ExprDef::Sub(args) => {
                let args = self.build_expressions(args, source);
                self.exprs.push(Expr::Sub(args))
            }
            ExprDef::Mul(args) => {
                let args = self.build_expressions(args, source);
                self.exprs.push(Expr::Mul(args))
            }
            ExprDef::Div(args) => {
                let args = self.build_expressions(args, source);
                self.exprs.push(Expr::Div(args))
            }
            ExprDef::Uniform { min, max } => {
                let min = self.build_expression(min, source);
                let max = self.build_expression(max, source);
                self.exprs.push(Expr::Uniform { min, max })
            }
            ExprDef::Normal { mean, sigma } => {
                let mean = self.build_expression(mean, source);
                let sigma = self.build_expression(sigma, source);
                self.exprs.push(Expr::Normal { mean, sigma })
            }
            ExprDef::Lognormal { mean, ef, level } => {
                let mean = self.build_expression(mean, source);
                let ef = self.build_expression(ef, source);
                let level = self.build_expression(level, source);
                self.exprs.push(Expr::Lognormal { mean, ef, level })
            }
            ExprDef::Gamma { shape, scale } => {
                let shape = self.build_expression(shape, source);
                let scale = self.build_expression(scale, source);
                self.exprs.push(Expr::Gamma { shape, scale })
            }
            ExprDef::Beta { alpha, beta } => {
                let alpha = self.build_expression(alpha, source);
                let beta = self.build_expression(beta, source);
                self.exprs.push(Expr::Beta { alpha, beta })
            }
            ExprDef::Histogram(bins) => {
                let mut boundaries = Vec::with_capacity(bins.len());
                let mut weights = Vec::with_capacity(bins.len());
                for (boundary, weight) in bins {
                    boundaries.push(self.build_expression(boundary, source));
                    weights.push(self.build_expression(weight, source));
                }
                self.exprs.push(Expr::Histogram {
                    boundaries,
                    weights,
                })
            }
            ExprDef::Exponential { lambda, time } => {
                let lambda = self.build_expression(lambda, source);
                let time = self.build_expression(time, source);
                self.exprs.push(Expr::Exponential { lambda, time })
            }
            ExprDef::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                let gamma = self.build_expression(gamma, source);
                let lambda = self.build_expression(lambda, source);
                let mu = self.build_expression(mu, source);
                let time = self.build_expression(time, source);
                self.exprs.push(Expr::Glm {
                    gamma,
                    lambda,
                    mu,
                    time,
                })
            }
            ExprDef::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => {
                let alpha = self.build_expression(alpha, source);
                let beta = self.build_expression(beta, source);
                let t0 = self.build_expression(t0, source);
                let time = self.build_expression(time, source);
                self.exprs.push(Expr::Weibull {
                    alpha,
                    beta,
                    t0,
                    time,
                })
            }
        };
        self.expr_registry.push((id, source));
        id
    }

    fn build_expressions(&mut self, defs: &[ExprDef], source: SourceRef) -> Vec<ExprId> {
        defs.iter()
            .map(|def| self.build_expression(def, source))
            .collect()
    }

    fn parameter_reference(&mut self, name: &str) -> ExprId {
        let name = name.trim().to_string();
        if let Some(&id) = self
            .parameters
            .get(&name)
            .or_else(|| self.tbd_params.get(&name))
        {
            return id;
        }
        let id = self.exprs.push(Expr::Parameter {
            name: name.clone(),
            unit: Units::Unitless,
            value: None,
        });
        self.tbd_params.insert(name, id);
        id
    }

    // ========================================================================
    // First-layer validation
    // ========================================================================

    fn check_first_layer(&mut self) {
        debug!("running first-layer validation");

        let pending_gates: Vec<String> = self
            .tbd_gates
            .values()
            .map(|&event| self.events[event.0].name.orig_name.clone())
            .collect();
        for orig in pending_gates {
            self.report(
                Diagnostic::new(ErrorKind::MissingDefinition, "gate is not defined").with_id(orig),
            );
        }

        let gate_ids: Vec<EventId> = self.gates.values().copied().collect();
        for gate in gate_ids {
            self.check_gate(gate);
        }

        if self.prob_requested {
            self.check_missing_events();
            self.check_missing_parameters();
        }

        // Unresolved references or parameter cycles make expression
        // evaluation unsound, so the domain checks run only on a fully
        // resolved, acyclic dependency graph.
        if self.tbd_params.is_empty() && self.check_parameter_cycles() {
            self.check_expressions();
        }
    }

    fn check_gate(&mut self, gate: EventId) {
        let (op, vote_number, children) = match &self.events[gate.0].kind {
            EventKind::Gate {
                op,
                vote_number,
                children,
            } => (*op, *vote_number, children.clone()),
            _ => return,
        };
        let name = self.events[gate.0].name.orig_name.clone();
        let source = self.events[gate.0].source;
        let size = children.len();
        let mut structural = |message: String| {
            self.diagnostics.push(
                Diagnostic::new(ErrorKind::GateStructure, message)
                    .with_id(&name)
                    .with_source(source),
            );
        };

        if size == 0 {
            structural("no children detected".to_string());
            return;
        }
        match op {
            GateOp::And | GateOp::Or | GateOp::Nand | GateOp::Nor => {
                if size < 2 {
                    structural(format!("{} gate must have 2 or more children", op.as_str()));
                }
            }
            GateOp::Not | GateOp::Null => {
                if size != 1 {
                    structural(format!("{} gate must have exactly one child", op.as_str()));
                }
            }
            GateOp::Xor => {
                if size != 2 {
                    structural("XOR gate must have exactly 2 children".to_string());
                }
            }
            GateOp::AtLeast => match vote_number {
                None => structural("ATLEAST gate is missing its vote number".to_string()),
                Some(vote) if vote < 2 => {
                    structural("ATLEAST gate requires a vote number of at least 2".to_string())
                }
                Some(vote) if size <= vote as usize => structural(format!(
                    "ATLEAST gate must have more children than its vote number {}",
                    vote
                )),
                Some(_) => {}
            },
            GateOp::Inhibit => {
                if size != 2 {
                    structural("INHIBIT gate must have exactly 2 children".to_string());
                } else {
                    let conditionals = children
                        .iter()
                        .filter(|&&child| self.events[child.0].is_conditional())
                        .count();
                    if conditionals != 1 {
                        structural(
                            "INHIBIT gate must have exactly one conditional event".to_string(),
                        );
                    }
                }
            }
        }
    }

    fn check_missing_events(&mut self) {
        let mut missing: Vec<String> = Vec::new();
        for &event in self.tbd_houses.values() {
            missing.push(self.events[event.0].name.orig_name.clone());
        }
        for &event in self.tbd_basics.values() {
            missing.push(self.events[event.0].name.orig_name.clone());
        }
        for id in self.tbd_any.keys() {
            missing.push(self.tbd_orig.get(id).cloned().unwrap_or_else(|| id.clone()));
        }
        for orig in missing {
            self.report(
                Diagnostic::new(ErrorKind::MissingDefinition, "event is referenced but never defined")
                    .with_id(orig),
            );
        }
    }

    fn check_missing_parameters(&mut self) {
        let missing: Vec<String> = self.tbd_params.keys().cloned().collect();
        for name in missing {
            self.report(
                Diagnostic::new(
                    ErrorKind::MissingDefinition,
                    "parameter is referenced but never defined",
                )
                .with_id(name),
            );
        }
    }

    /// Returns true when the parameter dependency graph is acyclic.
    fn check_parameter_cycles(&mut self) -> bool {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices: IndexMap<ExprId, NodeIndex> = IndexMap::new();
        for (name, &id) in &self.parameters {
            let index = graph.add_node(name.clone());
            indices.insert(id, index);
        }
        for &id in self.parameters.values() {
            let value = match self.exprs.get(id) {
                Expr::Parameter { value, .. } => *value,
                _ => None,
            };
            if let Some(value) = value {
                let mut refs = Vec::new();
                collect_parameter_refs(&self.exprs, value, &mut refs);
                for reference in refs {
                    if let (Some(&from), Some(&to)) = (indices.get(&id), indices.get(&reference)) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }
        match toposort(&graph, None) {
            Ok(_) => true,
            Err(cycle) => {
                let name = graph[cycle.node_id()].clone();
                self.report(
                    Diagnostic::new(
                        ErrorKind::CyclicReference,
                        "parameter references form a cycle",
                    )
                    .with_id(name),
                );
                false
            }
        }
    }

    fn check_expressions(&mut self) {
        let registry = std::mem::take(&mut self.expr_registry);
        for &(id, source) in &registry {
            if let Err(diagnostic) = self.exprs.validate(id) {
                self.report(diagnostic.with_source(source));
            }
        }
        self.expr_registry = registry;

        if !self.prob_requested {
            return;
        }
        // Probability domain of every defined basic event.
        let checks: Vec<(EventId, Option<ExprId>)> = self
            .basic_order
            .iter()
            .map(|&event| {
                let expression = match &self.events[event.0].kind {
                    EventKind::Basic { expression, .. } => *expression,
                    _ => None,
                };
                (event, expression)
            })
            .collect();
        for (event, expression) in checks {
            let Some(expression) = expression else { continue };
            let name = self.events[event.0].name.orig_name.clone();
            let source = self.events[event.0].source;
            match self.exprs.interval(expression) {
                Ok((lo, hi)) => {
                    if hi < 0.0 || lo > 1.0 {
                        self.report(
                            Diagnostic::new(
                                ErrorKind::ExpressionDomain,
                                "the probability expression cannot reach [0, 1]",
                            )
                            .with_id(name)
                            .with_source(source),
                        );
                    }
                }
                Err(diagnostic) => self.report(diagnostic.with_id(name).with_source(source)),
            }
        }
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    fn new_event(&mut self, orig_name: &str, kind: EventKind, meta: Meta, source: SourceRef) -> EventId {
        let id = EventId(self.events.len());
        self.events.push(Event {
            id,
            name: Id::new(orig_name),
            meta,
            source,
            kind,
            parents: Vec::new(),
        });
        id
    }

    fn attach_child(&mut self, gate: EventId, child: EventId) {
        if let EventKind::Gate { children, .. } = &mut self.events[gate.0].kind {
            children.push(child);
        }
        self.events[child.0].parents.push(gate);
    }

    /// Wire a freshly known event to every gate that referenced it before
    /// its kind was known.
    fn resolve_pending_any(&mut self, key: &str, event: EventId) {
        if let Some(requesters) = self.tbd_any.shift_remove(key) {
            for gate in requesters {
                self.attach_child(gate, event);
            }
            self.tbd_orig.shift_remove(key);
        }
    }

    fn is_primary_or_pending_primary(&self, key: &str) -> bool {
        self.basic_events.contains_key(key)
            || self.house_events.contains_key(key)
            || self.tbd_basics.contains_key(key)
            || self.tbd_houses.contains_key(key)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Direct parameter references of an expression subtree, without
/// following into the referenced parameters' own values.
fn collect_parameter_refs(arena: &ExprArena, id: ExprId, out: &mut Vec<ExprId>) {
    match arena.get(id) {
        Expr::Constant(_) | Expr::MissionTime => {}
        Expr::Parameter { .. } => out.push(id),
        Expr::Neg(arg) => collect_parameter_refs(arena, *arg, out),
        Expr::Add(args) | Expr::Sub(args) | Expr::Mul(args) | Expr::Div(args) => {
            for &arg in args {
                collect_parameter_refs(arena, arg, out);
            }
        }
        Expr::Uniform { min, max } => {
            collect_parameter_refs(arena, *min, out);
            collect_parameter_refs(arena, *max, out);
        }
        Expr::Normal { mean, sigma } => {
            collect_parameter_refs(arena, *mean, out);
            collect_parameter_refs(arena, *sigma, out);
        }
        Expr::Lognormal { mean, ef, level } => {
            collect_parameter_refs(arena, *mean, out);
            collect_parameter_refs(arena, *ef, out);
            collect_parameter_refs(arena, *level, out);
        }
        Expr::Gamma { shape, scale } => {
            collect_parameter_refs(arena, *shape, out);
            collect_parameter_refs(arena, *scale, out);
        }
        Expr::Beta { alpha, beta } => {
            collect_parameter_refs(arena, *alpha, out);
            collect_parameter_refs(arena, *beta, out);
        }
        Expr::Histogram {
            boundaries,
            weights,
        } => {
            for &bound in boundaries {
                collect_parameter_refs(arena, bound, out);
            }
            for &weight in weights {
                collect_parameter_refs(arena, weight, out);
            }
        }
        Expr::Exponential { lambda, time } => {
            collect_parameter_refs(arena, *lambda, out);
            collect_parameter_refs(arena, *time, out);
        }
        Expr::Glm {
            gamma,
            lambda,
            mu,
            time,
        } => {
            for &arg in &[*gamma, *lambda, *mu, *time] {
                collect_parameter_refs(arena, arg, out);
            }
        }
        Expr::Weibull {
            alpha,
            beta,
            t0,
            time,
        } => {
            for &arg in &[*alpha, *beta, *t0, *time] {
                collect_parameter_refs(arena, arg, out);
            }
        }
    }
}

// ============================================================================
// Second-layer validation
// ============================================================================

/// Per-tree and per-group validation: fail fast within one fault tree or
/// CCF group, but keep going across independent ones.
fn check_second_layer(model: &mut Model) -> Vec<Diagnostic> {
    debug!("running second-layer validation");
    let mut diagnostics = Vec::new();

    let tree_keys: Vec<String> = model.fault_trees.keys().cloned().collect();
    for key in tree_keys {
        if let Err(diagnostic) = validate_fault_tree(model, &key) {
            diagnostics.push(diagnostic);
        }
    }
    for group in model.ccf_groups.values() {
        if let Err(diagnostic) = group.validate(model) {
            diagnostics.push(diagnostic);
        }
    }
    diagnostics
}

fn validate_fault_tree(model: &mut Model, key: &str) -> Result<(), Diagnostic> {
    let tree = &model.fault_trees[key];
    let tree_name = tree.name.orig_name.clone();
    let tree_source = tree.source;

    // The top event is the unique gate of the tree without a parent gate.
    let roots: Vec<EventId> = tree
        .gates
        .iter()
        .copied()
        .filter(|&gate| {
            !model.event(gate).parents.iter().any(|&parent| model.event(parent).is_gate())
        })
        .collect();
    let top = match roots.as_slice() {
        [top] => *top,
        [] if tree.gates.is_empty() => {
            return Err(Diagnostic::new(
                ErrorKind::GateStructure,
                "fault tree does not have a top event",
            )
            .with_id(tree_name)
            .with_source(tree_source));
        }
        // Every gate having a gate parent means the graph loops back on
        // itself somewhere.
        [] => {
            return Err(Diagnostic::new(
                ErrorKind::CyclicReference,
                "gate children form a cycle",
            )
            .with_id(tree_name)
            .with_source(tree_source));
        }
        _ => {
            let names: Vec<&str> = roots.iter().map(|&gate| model.event_name(gate)).collect();
            return Err(Diagnostic::new(
                ErrorKind::GateStructure,
                format!("fault tree has multiple top events: {}", names.join(", ")),
            )
            .with_id(tree_name)
            .with_source(tree_source));
        }
    };

    // Depth-first three-coloring over the gate DAG.
    let mut colors: IndexMap<EventId, Color> = IndexMap::new();
    detect_cycle(model, top, &mut colors).map_err(|gate| {
        Diagnostic::new(ErrorKind::CyclicReference, "gate children form a cycle")
            .with_id(model.event_name(gate).to_string())
            .with_source(model.event(gate).source)
    })?;

    model.fault_trees[key].top_event = Some(top);
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    Gray,
    Black,
}

fn detect_cycle(
    model: &Model,
    gate: EventId,
    colors: &mut IndexMap<EventId, Color>,
) -> Result<(), EventId> {
    match colors.get(&gate) {
        Some(Color::Black) => return Ok(()),
        Some(Color::Gray) => return Err(gate),
        None => {}
    }
    colors.insert(gate, Color::Gray);
    for &child in model.children(gate) {
        if model.event(child).is_gate() {
            detect_cycle(model, child, colors)?;
        }
    }
    colors.insert(gate, Color::Black);
    Ok(())
}

/// Primary events with no parent gate are reported as warnings.
fn gather_orphans(model: &mut Model) {
    let mut orphans = Vec::new();
    for event in &model.events {
        if event.is_gate() || !event.parents.is_empty() {
            continue;
        }
        orphans.push(event.name.orig_name.clone());
    }
    for orphan in orphans {
        warn!(event = %orphan, "orphan primary event");
        model
            .warnings
            .push(format!("orphan primary event: {}", orphan));
    }
}
