//! Event model: basic, house, and gate entities in an arena
//!
//! Events live in a single arena owned by `Model` and are addressed by
//! `EventId`. Parent links are relation-only back-references; ownership
//! stays with the arena, so shared subtrees need no reference counting.

use crate::ccf::CcfGroup;
use crate::diagnostic::SourceRef;
use crate::element::{Id, Meta};
use crate::expression::{ExprArena, ExprId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Handle into the event arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub usize);

/// Gate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateOp {
    And,
    Or,
    Not,
    Nand,
    Nor,
    Xor,
    Null,
    /// K-of-N voting; the vote number lives on the gate.
    AtLeast,
    /// AND of a condition and an enabling event.
    Inhibit,
}

impl GateOp {
    /// Upper-case name for diagnostics and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOp::And => "AND",
            GateOp::Or => "OR",
            GateOp::Not => "NOT",
            GateOp::Nand => "NAND",
            GateOp::Nor => "NOR",
            GateOp::Xor => "XOR",
            GateOp::Null => "NULL",
            GateOp::AtLeast => "ATLEAST",
            GateOp::Inhibit => "INHIBIT",
        }
    }
}

/// Flavor of a basic event, carried through the `flavor` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFlavor {
    #[default]
    Plain,
    /// Legal only as one child of an INHIBIT gate.
    Conditional,
    /// Not developed further; analyzed as an ordinary basic event.
    Undeveloped,
}

/// The variant payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Gate {
        op: GateOp,
        /// Vote number; meaningful only for ATLEAST.
        vote_number: Option<u32>,
        /// Children in declaration order.
        children: Vec<EventId>,
    },
    Basic {
        /// Probability expression; `None` until defined.
        expression: Option<ExprId>,
        flavor: EventFlavor,
        /// Name of the CCF group this event belongs to, if any.
        ccf_group: Option<String>,
    },
    House { state: bool },
}

/// A named event in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: Id,
    pub meta: Meta,
    pub source: SourceRef,
    pub kind: EventKind,
    /// Gates this event is a child of. Relation only; no ownership.
    pub parents: Vec<EventId>,
}

impl Event {
    pub fn is_gate(&self) -> bool {
        matches!(self.kind, EventKind::Gate { .. })
    }

    pub fn is_basic(&self) -> bool {
        matches!(self.kind, EventKind::Basic { .. })
    }

    pub fn is_house(&self) -> bool {
        matches!(self.kind, EventKind::House { .. })
    }

    /// Whether the event is flavored conditional.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Basic {
                flavor: EventFlavor::Conditional,
                ..
            }
        )
    }
}

/// One fault tree: the gates declared inside a `define-fault-tree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultTree {
    pub name: Id,
    pub meta: Meta,
    pub source: SourceRef,
    /// Gates declared in this tree, in declaration order.
    pub gates: Vec<EventId>,
    /// The root gate; detected during validation as the unique gate
    /// without a parent gate.
    pub top_event: Option<EventId>,
}

/// A frozen, validated model ready for analysis.
///
/// All construction goes through the builder; after validation the model
/// is only read. The mission-time cell inside the expression arena is the
/// single exception, set once per analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Event arena.
    pub events: Vec<Event>,
    /// Expression arena.
    pub exprs: ExprArena,
    /// Fault trees keyed by folded name.
    pub fault_trees: IndexMap<String, FaultTree>,
    /// Defined parameters keyed by case-sensitive name.
    pub parameters: IndexMap<String, ExprId>,
    /// CCF groups keyed by folded name.
    pub ccf_groups: IndexMap<String, CcfGroup>,
    /// Basic events that carry probabilities, in definition order.
    pub basic_events: Vec<EventId>,
    /// Whether any probability data was supplied.
    pub prob_requested: bool,
    /// Warnings gathered during construction (orphans and the like).
    pub warnings: Vec<String>,
}

impl Model {
    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id.0]
    }

    pub fn event_mut(&mut self, id: EventId) -> &mut Event {
        &mut self.events[id.0]
    }

    /// Display name of an event.
    pub fn event_name(&self, id: EventId) -> &str {
        &self.events[id.0].name.orig_name
    }

    /// Children of a gate; empty for non-gates.
    pub fn children(&self, id: EventId) -> &[EventId] {
        match &self.events[id.0].kind {
            EventKind::Gate { children, .. } => children,
            _ => &[],
        }
    }

    pub fn gate_count(&self) -> usize {
        self.events.iter().filter(|event| event.is_gate()).count()
    }

    pub fn basic_event_count(&self) -> usize {
        self.basic_events.len()
    }

    /// Iterator over basic events carrying probability data.
    pub fn basic_event_iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.basic_events.iter().map(move |&id| self.event(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_event(model: &mut Model, name: &str, kind: EventKind) -> EventId {
        let id = EventId(model.events.len());
        model.events.push(Event {
            id,
            name: Id::new(name),
            meta: Meta::default(),
            source: SourceRef::unknown(),
            kind,
            parents: Vec::new(),
        });
        id
    }

    #[test]
    fn test_event_kind_predicates() {
        let mut model = Model::default();
        let basic = push_event(
            &mut model,
            "pump",
            EventKind::Basic {
                expression: None,
                flavor: EventFlavor::Conditional,
                ccf_group: None,
            },
        );
        let house = push_event(&mut model, "maintenance", EventKind::House { state: true });
        let gate = push_event(
            &mut model,
            "top",
            EventKind::Gate {
                op: GateOp::And,
                vote_number: None,
                children: vec![basic, house],
            },
        );

        assert!(model.event(basic).is_basic());
        assert!(model.event(basic).is_conditional());
        assert!(model.event(house).is_house());
        assert!(model.event(gate).is_gate());
        assert_eq!(model.children(gate), &[basic, house]);
        assert_eq!(model.children(basic), &[] as &[EventId]);
    }

    #[test]
    fn test_event_display_name() {
        let mut model = Model::default();
        let id = push_event(
            &mut model,
            "CoolantLoss",
            EventKind::Basic {
                expression: None,
                flavor: EventFlavor::Plain,
                ccf_group: None,
            },
        );
        assert_eq!(model.event_name(id), "CoolantLoss");
        assert_eq!(model.event(id).name.name, "coolantloss");
    }
}
