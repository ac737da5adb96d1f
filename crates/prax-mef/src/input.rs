//! Parsed declarative input elements
//!
//! The XML front end is an external collaborator; it hands the core a
//! sequence of these elements in document order. Every element carries its
//! source line so diagnostics can point back into the document. Elements
//! may arrive in any order; the builder resolves forward references.

use crate::diagnostic::SourceRef;
use crate::element::{Meta, Units};
use serde::{Deserialize, Serialize};

/// A top-level declarative element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Definition {
    /// `define-fault-tree` with its nested definitions.
    FaultTree(FaultTreeDef),
    /// `model-data` with basic events, house events, and parameters.
    ModelData(ModelDataDef),
    /// Top-level `define-CCF-group`.
    CcfGroup(CcfGroupDef),
}

/// `define-fault-tree` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultTreeDef {
    pub name: String,
    pub meta: Meta,
    pub source: SourceRef,
    pub elements: Vec<TreeElement>,
}

/// `model-data` element. Only event and parameter definitions are legal
/// inside; seeing one latches the probability-requested state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDataDef {
    pub source: SourceRef,
    pub elements: Vec<TreeElement>,
}

/// A definition nested inside a fault tree or model data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeElement {
    Gate(GateDef),
    BasicEvent(BasicEventDef),
    HouseEvent(HouseEventDef),
    Parameter(ParameterDef),
    CcfGroup(CcfGroupDef),
}

/// Gate operator vocabulary of the input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
    Not,
    Nand,
    Nor,
    Xor,
    Null,
    Inhibit,
    AtLeast,
}

impl Connective {
    /// Parse the operator vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "and" => Some(Connective::And),
            "or" => Some(Connective::Or),
            "not" => Some(Connective::Not),
            "nand" => Some(Connective::Nand),
            "nor" => Some(Connective::Nor),
            "xor" => Some(Connective::Xor),
            "null" => Some(Connective::Null),
            "inhibit" => Some(Connective::Inhibit),
            "atleast" => Some(Connective::AtLeast),
            _ => None,
        }
    }

    /// Upper-case name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Not => "NOT",
            Connective::Nand => "NAND",
            Connective::Nor => "NOR",
            Connective::Xor => "XOR",
            Connective::Null => "NULL",
            Connective::Inhibit => "INHIBIT",
            Connective::AtLeast => "ATLEAST",
        }
    }
}

/// `define-gate` element: a name bound to a single formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDef {
    pub name: String,
    pub meta: Meta,
    pub source: SourceRef,
    pub formula: FormulaDef,
}

/// Gate formula: an operator applied to event references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDef {
    pub op: Connective,
    /// Vote number, present only for `atleast` (the `min` attribute).
    pub vote_number: Option<u32>,
    pub args: Vec<EventRef>,
}

/// Kind hint carried by a formula argument.
///
/// `<event name=".."/>` leaves the kind open; `<gate/>`, `<basic-event/>`,
/// and `<house-event/>` (or a `type` attribute) fix it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefHint {
    Any,
    Gate,
    Basic,
    House,
}

/// Reference to an event inside a gate formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    pub name: String,
    pub hint: RefHint,
    pub source: SourceRef,
}

impl EventRef {
    /// Untyped reference.
    pub fn any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hint: RefHint::Any,
            source: SourceRef::unknown(),
        }
    }

    /// Reference with a fixed kind.
    pub fn hinted(name: &str, hint: RefHint) -> Self {
        Self {
            name: name.to_string(),
            hint,
            source: SourceRef::unknown(),
        }
    }
}

/// `define-basic-event` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicEventDef {
    pub name: String,
    pub meta: Meta,
    pub source: SourceRef,
    /// Probability expression; required for a complete definition.
    pub expression: Option<ExprDef>,
}

/// `define-house-event` element with its Boolean constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseEventDef {
    pub name: String,
    pub meta: Meta,
    pub source: SourceRef,
    pub state: bool,
}

/// `define-parameter` element. Parameter names are case-sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub meta: Meta,
    pub source: SourceRef,
    pub unit: Option<Units>,
    pub expression: ExprDef,
}

/// Expression tree of the input vocabulary. Operand order is positional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprDef {
    /// `float` / `int` constants collapse to one numeric constant.
    Float(f64),
    Int(i64),
    Bool(bool),
    /// `parameter name=...` reference (case-sensitive).
    Parameter(String),
    /// `system-mission-time` reference.
    MissionTime,
    Neg(Box<ExprDef>),
    Add(Vec<ExprDef>),
    Sub(Vec<ExprDef>),
    Mul(Vec<ExprDef>),
    Div(Vec<ExprDef>),
    /// `uniform-deviate(min, max)`.
    Uniform { min: Box<ExprDef>, max: Box<ExprDef> },
    /// `normal-deviate(mean, sigma)`.
    Normal { mean: Box<ExprDef>, sigma: Box<ExprDef> },
    /// `lognormal-deviate(mean, ef, level)`.
    Lognormal {
        mean: Box<ExprDef>,
        ef: Box<ExprDef>,
        level: Box<ExprDef>,
    },
    /// `gamma-deviate(k, theta)`.
    Gamma { shape: Box<ExprDef>, scale: Box<ExprDef> },
    /// `beta-deviate(alpha, beta)`.
    Beta { alpha: Box<ExprDef>, beta: Box<ExprDef> },
    /// `histogram` with `(boundary, weight)` bins.
    Histogram(Vec<(ExprDef, ExprDef)>),
    /// `exponential(lambda, time)`.
    Exponential { lambda: Box<ExprDef>, time: Box<ExprDef> },
    /// `GLM(gamma, lambda, mu, time)`.
    Glm {
        gamma: Box<ExprDef>,
        lambda: Box<ExprDef>,
        mu: Box<ExprDef>,
        time: Box<ExprDef>,
    },
    /// `Weibull(alpha, beta, t0, time)`.
    Weibull {
        alpha: Box<ExprDef>,
        beta: Box<ExprDef>,
        t0: Box<ExprDef>,
        time: Box<ExprDef>,
    },
}

/// CCF model vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CcfModelKind {
    BetaFactor,
    Mgl,
    AlphaFactor,
    PhiFactor,
}

impl CcfModelKind {
    /// Parse the model vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "beta-factor" => Some(CcfModelKind::BetaFactor),
            "MGL" => Some(CcfModelKind::Mgl),
            "alpha-factor" => Some(CcfModelKind::AlphaFactor),
            "phi-factor" => Some(CcfModelKind::PhiFactor),
            _ => None,
        }
    }

    /// Name matching the input vocabulary.
    pub fn as_str(&self) -> &'static str {
        match self {
            CcfModelKind::BetaFactor => "beta-factor",
            CcfModelKind::Mgl => "MGL",
            CcfModelKind::AlphaFactor => "alpha-factor",
            CcfModelKind::PhiFactor => "phi-factor",
        }
    }
}

/// One `factor` entry of a CCF group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDef {
    /// Multiplicity level the factor applies to.
    pub level: u32,
    pub expression: ExprDef,
    pub source: SourceRef,
}

/// `define-CCF-group` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcfGroupDef {
    pub name: String,
    pub meta: Meta,
    pub source: SourceRef,
    pub model: CcfModelKind,
    /// Member basic events in declaration order.
    pub members: Vec<EventRef>,
    /// The shared failure distribution of the group.
    pub distribution: Option<ExprDef>,
    pub factors: Vec<FactorDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connective_vocabulary() {
        for name in ["and", "or", "not", "nor", "nand", "xor", "null", "inhibit", "atleast"] {
            assert!(Connective::parse(name).is_some(), "{} must parse", name);
        }
        assert!(Connective::parse("pand").is_none());
    }

    #[test]
    fn test_ccf_model_vocabulary() {
        assert_eq!(CcfModelKind::parse("MGL"), Some(CcfModelKind::Mgl));
        assert_eq!(CcfModelKind::parse("beta-factor"), Some(CcfModelKind::BetaFactor));
        assert!(CcfModelKind::parse("mgl").is_none());
    }

    #[test]
    fn test_event_ref_constructors() {
        let any = EventRef::any("valve");
        assert_eq!(any.hint, RefHint::Any);
        let gate = EventRef::hinted("top", RefHint::Gate);
        assert_eq!(gate.hint, RefHint::Gate);
    }
}
