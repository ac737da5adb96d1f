#![allow(dead_code, unused_variables, unused_imports)]
//! prax-mef - Model exchange layer for probabilistic risk analysis
//!
//! This crate handles:
//! - Declarative input elements of the OpenPSA model exchange vocabulary
//! - Event, expression, and parameter arenas with integer handles
//! - Forward-reference resolution through a placeholder-then-promote builder
//! - Two-layer validation with structured diagnostics
//! - Common-cause failure groups and their expansion

pub mod builder;
pub mod ccf;
pub mod diagnostic;
pub mod element;
pub mod event;
pub mod expression;
pub mod input;

// Re-export main types
pub use builder::{build_model, ModelBuilder};
pub use ccf::CcfGroup;
pub use diagnostic::{format_diagnostics, Diagnostic, ErrorKind, SourceRef};
pub use element::{Attribute, Id, Meta, Units};
pub use event::{Event, EventFlavor, EventId, EventKind, FaultTree, GateOp, Model};
pub use expression::{normal_quantile, Expr, ExprArena, ExprId, SampleSpace};
pub use input::{
    BasicEventDef, CcfGroupDef, CcfModelKind, Connective, Definition, EventRef, ExprDef,
    FactorDef, FaultTreeDef, FormulaDef, GateDef, HouseEventDef, ModelDataDef, ParameterDef,
    RefHint, TreeElement,
};
