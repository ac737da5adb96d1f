//! Common-cause failure groups and their expansion
//!
//! A CCF group ties a set of member basic events to a shared failure
//! distribution and a factor model (beta-factor, MGL, alpha-factor, or
//! phi-factor). After validation the group is expanded: for every subset
//! of members at a multiplicity level with non-zero mass, a combined
//! basic event is created whose probability expression derives from the
//! group distribution and the level factor. Each member occurring in gate
//! children is then replaced by the disjunction of all combined events
//! that contain it. The expansion is deterministic and order-independent.

use crate::diagnostic::{Diagnostic, ErrorKind, SourceRef};
use crate::element::{Id, Meta};
use crate::event::{Event, EventFlavor, EventId, EventKind, GateOp, Model};
use crate::expression::{Expr, ExprId};
use crate::input::CcfModelKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A validated CCF group inside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcfGroup {
    pub name: Id,
    pub meta: Meta,
    pub source: SourceRef,
    pub model: CcfModelKind,
    /// Member basic events in declaration order.
    pub members: Vec<EventId>,
    /// The shared failure distribution of the group.
    pub distribution: Option<ExprId>,
    /// `(level, factor expression)` pairs in declaration order.
    pub factors: Vec<(u32, ExprId)>,
}

impl CcfGroup {
    /// Factor expression for a multiplicity level, if declared.
    fn factor(&self, level: u32) -> Option<ExprId> {
        self.factors
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, expr)| *expr)
    }

    /// Second-layer validation of the group definition.
    pub fn validate(&self, model: &Model) -> Result<(), Diagnostic> {
        let n = self.members.len();
        let fail = |message: String| {
            Err(Diagnostic::new(ErrorKind::ExpressionDomain, message)
                .with_id(self.name.orig_name.clone())
                .with_source(self.source))
        };

        if n < 2 {
            return Err(Diagnostic::new(
                ErrorKind::InvalidFormat,
                "CCF group must have at least 2 members",
            )
            .with_id(self.name.orig_name.clone())
            .with_source(self.source));
        }
        let distribution = match self.distribution {
            Some(distribution) => distribution,
            None => {
                return Err(Diagnostic::new(
                    ErrorKind::InvalidFormat,
                    "CCF group does not have a distribution",
                )
                .with_id(self.name.orig_name.clone())
                .with_source(self.source));
            }
        };

        let (lo, hi) = model.exprs.interval(distribution)?;
        if hi < 0.0 || lo > 1.0 {
            return fail("the group distribution is outside [0, 1]".to_string());
        }

        let levels: Vec<u32> = self.factors.iter().map(|(level, _)| *level).collect();
        match self.model {
            CcfModelKind::BetaFactor => {
                if levels.len() != 1 || levels[0] != n as u32 {
                    return fail(format!(
                        "beta-factor expects a single factor at level {}",
                        n
                    ));
                }
                let beta = model.exprs.mean(self.factors[0].1)?;
                if !(0.0..=1.0).contains(&beta) {
                    return fail("beta factor must be within [0, 1]".to_string());
                }
            }
            CcfModelKind::Mgl => {
                for (index, &level) in levels.iter().enumerate() {
                    if level != index as u32 + 2 {
                        return fail("MGL factors must cover consecutive levels from 2".to_string());
                    }
                }
                if levels.len() > n - 1 {
                    return fail("MGL factor level exceeds the group size".to_string());
                }
                for &(_, factor) in &self.factors {
                    let g = model.exprs.mean(factor)?;
                    if !(0.0..=1.0).contains(&g) {
                        return fail("MGL factors must be within [0, 1]".to_string());
                    }
                }
            }
            CcfModelKind::AlphaFactor | CcfModelKind::PhiFactor => {
                for (index, &level) in levels.iter().enumerate() {
                    if level != index as u32 + 1 {
                        return fail("factors must cover consecutive levels from 1".to_string());
                    }
                }
                if levels.len() != n {
                    return fail(format!("expected factors for all levels up to {}", n));
                }
                let mut sum = 0.0;
                for &(_, factor) in &self.factors {
                    let value = model.exprs.mean(factor)?;
                    if value < 0.0 {
                        return fail("factors must be non-negative".to_string());
                    }
                    sum += value;
                }
                if self.model == CcfModelKind::PhiFactor && (sum - 1.0).abs() > 1e-4 {
                    return fail(format!("phi factors must sum to 1, got {}", sum));
                }
            }
        }
        Ok(())
    }
}

/// Expand every CCF group of the model in place.
///
/// Runs after validation and before normalization. Post-expansion events
/// are independent basic events as far as cut-set analysis is concerned.
pub fn apply_ccf_groups(model: &mut Model) -> Result<(), Diagnostic> {
    let group_names: Vec<String> = model.ccf_groups.keys().cloned().collect();
    for name in group_names {
        let group = model.ccf_groups[&name].clone();
        expand_group(model, &group)?;
    }
    Ok(())
}

fn expand_group(model: &mut Model, group: &CcfGroup) -> Result<(), Diagnostic> {
    let n = group.members.len();
    let q = group.distribution.ok_or_else(|| {
        Diagnostic::new(ErrorKind::Logic, "CCF group expanded without a distribution")
            .with_id(group.name.orig_name.clone())
    })?;

    // Combined events per level, each entry (member subset, event id).
    let mut combined: Vec<(Vec<EventId>, EventId)> = Vec::new();
    for level in 1..=n {
        let fraction = match level_fraction(model, group, level, q)? {
            Some(expr) => expr,
            None => continue,
        };
        for subset in combinations(n, level) {
            let members: Vec<EventId> = subset.iter().map(|&i| group.members[i]).collect();
            let event = new_ccf_event(model, group, &members, fraction);
            combined.push((members, event));
        }
    }

    debug!(
        group = %group.name.orig_name,
        events = combined.len(),
        "expanded CCF group"
    );

    // Replace each member in its parent gates with the disjunction of all
    // combined events containing it.
    for &member in &group.members {
        let containing: Vec<EventId> = combined
            .iter()
            .filter(|(members, _)| members.contains(&member))
            .map(|(_, event)| *event)
            .collect();
        let parents = model.event(member).parents.clone();
        if parents.is_empty() {
            continue;
        }

        let gate_id = EventId(model.events.len());
        let member_name = model.event(member).name.clone();
        let member_source = model.event(member).source;
        model.events.push(Event {
            id: gate_id,
            name: member_name,
            meta: Meta::default(),
            source: member_source,
            kind: EventKind::Gate {
                op: GateOp::Or,
                vote_number: None,
                children: containing.clone(),
            },
            parents: parents.clone(),
        });
        for &event in &containing {
            model.event_mut(event).parents.push(gate_id);
        }
        for parent in parents {
            if let EventKind::Gate { children, .. } = &mut model.event_mut(parent).kind {
                for child in children.iter_mut() {
                    if *child == member {
                        *child = gate_id;
                    }
                }
            }
        }
        model.event_mut(member).parents.clear();
    }

    // The members hand their probability role over to the combined events.
    model
        .basic_events
        .retain(|id| !group.members.contains(id));
    model
        .basic_events
        .extend(combined.iter().map(|(_, event)| *event));
    Ok(())
}

/// Probability expression for one specific subset of the given size, or
/// `None` when the model assigns the level zero mass.
fn level_fraction(
    model: &mut Model,
    group: &CcfGroup,
    level: usize,
    q: ExprId,
) -> Result<Option<ExprId>, Diagnostic> {
    let n = group.members.len();
    let k = level as u32;
    let expr = match group.model {
        CcfModelKind::BetaFactor => {
            let beta = group.factors[0].1;
            if level == 1 {
                let one = model.exprs.push(Expr::Constant(1.0));
                let independent = model.exprs.push(Expr::Sub(vec![one, beta]));
                Some(model.exprs.push(Expr::Mul(vec![independent, q])))
            } else if level == n {
                Some(model.exprs.push(Expr::Mul(vec![beta, q])))
            } else {
                None
            }
        }
        CcfModelKind::Mgl => {
            // Q_k = (g_2 .. g_k) * (1 - g_{k+1}) * Q / C(n-1, k-1)
            let mut terms = Vec::new();
            let scale = 1.0 / binomial(n - 1, level - 1);
            terms.push(model.exprs.push(Expr::Constant(scale)));
            for i in 2..=k {
                match group.factor(i) {
                    Some(g) => terms.push(g),
                    None => return Ok(None), // Level beyond the declared factors.
                }
            }
            if let Some(next) = group.factor(k + 1) {
                let one = model.exprs.push(Expr::Constant(1.0));
                terms.push(model.exprs.push(Expr::Sub(vec![one, next])));
            }
            terms.push(q);
            Some(model.exprs.push(Expr::Mul(terms)))
        }
        CcfModelKind::AlphaFactor => {
            // Q_k = k * alpha_k * Q / (C(n-1, k-1) * sum_j j * alpha_j)
            let alpha_k = group.factor(k).ok_or_else(|| {
                Diagnostic::new(ErrorKind::Logic, "alpha factor missing after validation")
            })?;
            let mut weighted = Vec::new();
            for (j, alpha_j) in group.factors.clone() {
                let weight = model.exprs.push(Expr::Constant(f64::from(j)));
                weighted.push(model.exprs.push(Expr::Mul(vec![weight, alpha_j])));
            }
            let denominator = model.exprs.push(Expr::Add(weighted));
            let scale = model
                .exprs
                .push(Expr::Constant(f64::from(k) / binomial(n - 1, level - 1)));
            let numerator = model.exprs.push(Expr::Mul(vec![scale, alpha_k, q]));
            Some(model.exprs.push(Expr::Div(vec![numerator, denominator])))
        }
        CcfModelKind::PhiFactor => {
            // Q_k = phi_k * Q / C(n, k); the level mass splits evenly
            // over the k-subsets.
            let phi_k = group.factor(k).ok_or_else(|| {
                Diagnostic::new(ErrorKind::Logic, "phi factor missing after validation")
            })?;
            let scale = model.exprs.push(Expr::Constant(1.0 / binomial(n, level)));
            Some(model.exprs.push(Expr::Mul(vec![scale, phi_k, q])))
        }
    };
    Ok(expr)
}

fn new_ccf_event(
    model: &mut Model,
    group: &CcfGroup,
    members: &[EventId],
    expression: ExprId,
) -> EventId {
    let display = members
        .iter()
        .map(|&id| model.event_name(id))
        .collect::<Vec<_>>()
        .join(" ");
    let id = EventId(model.events.len());
    model.events.push(Event {
        id,
        name: Id::new(&format!("[{}]", display)),
        meta: Meta::default(),
        source: group.source,
        kind: EventKind::Basic {
            expression: Some(expression),
            flavor: EventFlavor::Plain,
            ccf_group: Some(group.name.name.clone()),
        },
        parents: Vec::new(),
    });
    id
}

/// All k-subsets of `0..n` in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn recurse(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            recurse(i + 1, n, k, current, out);
            current.pop();
        }
    }
    recurse(0, n, k, &mut current, &mut out);
    out
}

fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(3, 2), vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
        assert_eq!(combinations(4, 4), vec![vec![0, 1, 2, 3]]);
        assert_eq!(combinations(3, 1).len(), 3);
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(4, 2), 6.0);
        assert_eq!(binomial(5, 0), 1.0);
        assert_eq!(binomial(3, 5), 0.0);
        assert_eq!(binomial(10, 3), 120.0);
    }
}
