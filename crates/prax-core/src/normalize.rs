//! Boolean normalizer
//!
//! Lowers the full gate vocabulary into a DAG over {AND, OR} with
//! negation pushed down to literals. House events fold into constants and
//! constants propagate upward, so a normalized graph contains no Boolean
//! state. Sharing is preserved: a gate referenced twice lowers once per
//! polarity and the result is shared.
//!
//! Rewrites: NAND(x..) = NOT(AND(x..)), NOR = NOT(OR), NULL(x) = x,
//! XOR(a, b) = OR(AND(a, !b), AND(!a, b)), INHIBIT(c, g) = AND(c, g),
//! ATLEAST(k; x1..xn) = OR over all k-subsets of AND. The complement of
//! ATLEAST(k) is ATLEAST(n - k + 1) over complemented children. The
//! k-subset expansion is combinatorial in the worst case.

use crate::product::Literal;
use indexmap::IndexMap;
use prax_mef::{Diagnostic, ErrorKind, EventId, EventKind, GateOp, Model};
use serde::{Deserialize, Serialize};

/// Operator of a normalized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NormalOp {
    And,
    Or,
}

/// Argument of a normalized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NormalRef {
    /// A basic event occurrence.
    Literal(Literal),
    /// An internal node by index.
    Node(usize),
    /// A folded Boolean constant.
    Constant(bool),
}

/// An internal node of the normalized DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalNode {
    pub op: NormalOp,
    /// Arguments in canonical (sorted, deduplicated) order.
    pub args: Vec<NormalRef>,
}

/// The normalized form of one fault tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pdag {
    /// Nodes in bottom-up creation order: children precede parents.
    pub nodes: Vec<NormalNode>,
    pub root: NormalRef,
}

impl Pdag {
    /// How many times each node is consumed by parents or the root.
    ///
    /// The cut-set engine uses these counts to release scratch product
    /// sets as soon as the last parent has taken them.
    pub fn reference_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for arg in &node.args {
                if let NormalRef::Node(index) = arg {
                    counts[*index] += 1;
                }
            }
        }
        if let NormalRef::Node(index) = self.root {
            counts[index] += 1;
        }
        counts
    }

    /// Re-run the structural simplifications bottom-up.
    ///
    /// Normalization is idempotent: the result is structurally equal to
    /// the input for any graph this module produced.
    pub fn renormalize(&self) -> Pdag {
        let mut builder = PdagBuilder::new();
        let mut mapped: Vec<NormalRef> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let args = node
                .args
                .iter()
                .map(|arg| match arg {
                    NormalRef::Node(index) => mapped[*index],
                    other => *other,
                })
                .collect();
            mapped.push(builder.make_node(node.op, args));
        }
        let root = match self.root {
            NormalRef::Node(index) => mapped[index],
            other => other,
        };
        Pdag {
            nodes: builder.nodes,
            root,
        }
    }
}

/// Lower the fault tree rooted at `top` into its normal form.
pub fn normalize(model: &Model, top: EventId) -> Result<Pdag, Diagnostic> {
    let mut builder = PdagBuilder::new();
    let mut memo: IndexMap<(EventId, bool), NormalRef> = IndexMap::new();
    let root = lower_event(model, top, false, &mut builder, &mut memo)?;
    Ok(Pdag {
        nodes: builder.nodes,
        root,
    })
}

struct PdagBuilder {
    nodes: Vec<NormalNode>,
    /// Hash-consing table so identical nodes share one index.
    interned: IndexMap<(NormalOp, Vec<NormalRef>), usize>,
}

impl PdagBuilder {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            interned: IndexMap::new(),
        }
    }

    /// Create a node with constant folding, deduplication, complement
    /// annihilation, and unit collapsing applied.
    fn make_node(&mut self, op: NormalOp, args: Vec<NormalRef>) -> NormalRef {
        let (unit, absorbing) = match op {
            NormalOp::And => (true, false),
            NormalOp::Or => (false, true),
        };

        let mut flat: Vec<NormalRef> = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                NormalRef::Constant(value) if value == unit => {}
                NormalRef::Constant(_) => return NormalRef::Constant(absorbing),
                other => flat.push(other),
            }
        }
        flat.sort_unstable();
        flat.dedup();

        // A literal next to its complement annihilates the node.
        for pair in flat.windows(2) {
            if let [NormalRef::Literal(a), NormalRef::Literal(b)] = pair {
                if a.event == b.event && a.complement != b.complement {
                    return NormalRef::Constant(absorbing);
                }
            }
        }

        match flat.len() {
            0 => NormalRef::Constant(unit),
            1 => flat[0],
            _ => {
                let key = (op, flat.clone());
                if let Some(&index) = self.interned.get(&key) {
                    return NormalRef::Node(index);
                }
                let index = self.nodes.len();
                self.nodes.push(NormalNode { op, args: flat });
                self.interned.insert(key, index);
                NormalRef::Node(index)
            }
        }
    }
}

fn lower_event(
    model: &Model,
    event: EventId,
    negated: bool,
    builder: &mut PdagBuilder,
    memo: &mut IndexMap<(EventId, bool), NormalRef>,
) -> Result<NormalRef, Diagnostic> {
    if let Some(&reference) = memo.get(&(event, negated)) {
        return Ok(reference);
    }
    let reference = match &model.event(event).kind {
        EventKind::Basic { .. } => NormalRef::Literal(Literal {
            event,
            complement: negated,
        }),
        EventKind::House { state } => NormalRef::Constant(*state != negated),
        EventKind::Gate {
            op,
            vote_number,
            children,
        } => match op {
            GateOp::And | GateOp::Inhibit => lower_nary(model, NormalOp::And, children, negated, builder, memo)?,
            GateOp::Or => lower_nary(model, NormalOp::Or, children, negated, builder, memo)?,
            GateOp::Nand => lower_nary(model, NormalOp::And, children, !negated, builder, memo)?,
            GateOp::Nor => lower_nary(model, NormalOp::Or, children, !negated, builder, memo)?,
            GateOp::Not => lower_event(model, children[0], !negated, builder, memo)?,
            GateOp::Null => lower_event(model, children[0], negated, builder, memo)?,
            GateOp::Xor => {
                let (a, b) = (children[0], children[1]);
                // XOR(a, b) and its complement both expand to an OR of
                // two conjunctions over signed children.
                let polarities: [(bool, bool); 2] = if negated {
                    [(false, false), (true, true)]
                } else {
                    [(false, true), (true, false)]
                };
                let mut terms = Vec::with_capacity(2);
                for (neg_a, neg_b) in polarities {
                    let left = lower_event(model, a, neg_a, builder, memo)?;
                    let right = lower_event(model, b, neg_b, builder, memo)?;
                    terms.push(builder.make_node(NormalOp::And, vec![left, right]));
                }
                builder.make_node(NormalOp::Or, terms)
            }
            GateOp::AtLeast => {
                let n = children.len();
                let vote = vote_number.ok_or_else(|| {
                    Diagnostic::new(ErrorKind::Logic, "ATLEAST gate without a vote number")
                        .with_id(model.event_name(event).to_string())
                })? as usize;
                // NOT(ATLEAST(k of n)) = ATLEAST(n - k + 1) over complements.
                let (k, child_negated) = if negated { (n - vote + 1, true) } else { (vote, false) };
                let lowered: Vec<NormalRef> = children
                    .iter()
                    .map(|&child| lower_event(model, child, child_negated, builder, memo))
                    .collect::<Result<_, _>>()?;
                let mut terms = Vec::new();
                for subset in k_subsets(n, k) {
                    let args = subset.iter().map(|&i| lowered[i]).collect();
                    terms.push(builder.make_node(NormalOp::And, args));
                }
                builder.make_node(NormalOp::Or, terms)
            }
        },
    };
    memo.insert((event, negated), reference);
    Ok(reference)
}

fn lower_nary(
    model: &Model,
    op: NormalOp,
    children: &[EventId],
    negated: bool,
    builder: &mut PdagBuilder,
    memo: &mut IndexMap<(EventId, bool), NormalRef>,
) -> Result<NormalRef, Diagnostic> {
    // De Morgan: negation flips the operator and signs the children.
    let op = if negated {
        match op {
            NormalOp::And => NormalOp::Or,
            NormalOp::Or => NormalOp::And,
        }
    } else {
        op
    };
    let args: Vec<NormalRef> = children
        .iter()
        .map(|&child| lower_event(model, child, negated, builder, memo))
        .collect::<Result<_, _>>()?;
    Ok(builder.make_node(op, args))
}

/// All k-subsets of `0..n` in lexicographic order.
fn k_subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        out.push(indices.clone());
        // Advance the rightmost index that still has room.
        let mut i = k;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if indices[i] != i + n - k {
                break;
            }
        }
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_subsets() {
        assert_eq!(k_subsets(3, 2), vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
        assert_eq!(k_subsets(3, 3), vec![vec![0, 1, 2]]);
        assert_eq!(k_subsets(2, 3), Vec::<Vec<usize>>::new());
        assert_eq!(k_subsets(4, 1).len(), 4);
    }

    fn literal(id: usize) -> NormalRef {
        NormalRef::Literal(Literal {
            event: EventId(id),
            complement: false,
        })
    }

    #[test]
    fn test_make_node_constant_folding() {
        let mut builder = PdagBuilder::new();
        // AND with false collapses; OR with true collapses.
        assert_eq!(
            builder.make_node(NormalOp::And, vec![literal(0), NormalRef::Constant(false)]),
            NormalRef::Constant(false)
        );
        assert_eq!(
            builder.make_node(NormalOp::Or, vec![literal(0), NormalRef::Constant(true)]),
            NormalRef::Constant(true)
        );
        // Units disappear.
        assert_eq!(
            builder.make_node(NormalOp::And, vec![literal(0), NormalRef::Constant(true)]),
            literal(0)
        );
    }

    #[test]
    fn test_make_node_complement_annihilation() {
        let mut builder = PdagBuilder::new();
        let a = Literal {
            event: EventId(0),
            complement: false,
        };
        let not_a = a.complemented();
        assert_eq!(
            builder.make_node(
                NormalOp::And,
                vec![NormalRef::Literal(a), NormalRef::Literal(not_a)]
            ),
            NormalRef::Constant(false)
        );
        assert_eq!(
            builder.make_node(
                NormalOp::Or,
                vec![NormalRef::Literal(a), NormalRef::Literal(not_a)]
            ),
            NormalRef::Constant(true)
        );
    }

    #[test]
    fn test_make_node_interning_shares_structure() {
        let mut builder = PdagBuilder::new();
        let first = builder.make_node(NormalOp::And, vec![literal(0), literal(1)]);
        let second = builder.make_node(NormalOp::And, vec![literal(1), literal(0)]);
        assert_eq!(first, second);
        assert_eq!(builder.nodes.len(), 1);
    }

    #[test]
    fn test_renormalize_is_idempotent_on_plain_graphs() {
        let mut builder = PdagBuilder::new();
        let ab = builder.make_node(NormalOp::And, vec![literal(0), literal(1)]);
        let cd = builder.make_node(NormalOp::And, vec![literal(2), literal(3)]);
        let root = builder.make_node(NormalOp::Or, vec![ab, cd]);
        let pdag = Pdag {
            nodes: builder.nodes,
            root,
        };
        let once = pdag.renormalize();
        let twice = once.renormalize();
        assert_eq!(once, twice);
        assert_eq!(once, pdag);
    }

    #[test]
    fn test_reference_counts() {
        let mut builder = PdagBuilder::new();
        let shared = builder.make_node(NormalOp::And, vec![literal(0), literal(1)]);
        let left = builder.make_node(NormalOp::Or, vec![shared, literal(2)]);
        let right = builder.make_node(NormalOp::Or, vec![shared, literal(3)]);
        let root = builder.make_node(NormalOp::And, vec![left, right]);
        let pdag = Pdag {
            nodes: builder.nodes,
            root,
        };
        let counts = pdag.reference_counts();
        if let NormalRef::Node(shared_index) = shared {
            assert_eq!(counts[shared_index], 2);
        } else {
            panic!("shared node folded unexpectedly");
        }
        if let NormalRef::Node(root_index) = root {
            assert_eq!(counts[root_index], 1);
        }
    }
}
