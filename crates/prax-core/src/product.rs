//! Products and the product container
//!
//! A product is a set of literals (event plus complement flag) standing
//! for one minimal cut set. The container keeps the family minimal: no
//! product is a superset of another, no literal repeats inside a product.
//! The empty product is UNITY (guaranteed failure); an empty container is
//! NULL (guaranteed success).

use indexmap::IndexMap;
use prax_mef::{EventId, Model};
use serde::{Deserialize, Serialize};

/// An event occurrence inside a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub event: EventId,
    pub complement: bool,
}

impl Literal {
    pub fn positive(event: EventId) -> Self {
        Self {
            event,
            complement: false,
        }
    }

    pub fn negative(event: EventId) -> Self {
        Self {
            event,
            complement: true,
        }
    }

    /// The opposite occurrence of the same event.
    pub fn complemented(&self) -> Self {
        Self {
            event: self.event,
            complement: !self.complement,
        }
    }
}

/// A set of literals, kept sorted for cheap subset checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    literals: Vec<Literal>,
}

impl Product {
    /// The empty product: UNITY.
    pub fn unity() -> Self {
        Self {
            literals: Vec::new(),
        }
    }

    /// Product of a single literal.
    pub fn singleton(literal: Literal) -> Self {
        Self {
            literals: vec![literal],
        }
    }

    /// Build from literals; duplicates collapse.
    pub fn from_literals(mut literals: Vec<Literal>) -> Self {
        literals.sort_unstable();
        literals.dedup();
        Self { literals }
    }

    /// Number of literals.
    pub fn order(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn contains(&self, literal: Literal) -> bool {
        self.literals.binary_search(&literal).is_ok()
    }

    /// Merge two products into their conjunction.
    ///
    /// Returns `None` when the result would contain an event and its
    /// complement, which makes the product impossible.
    pub fn union(&self, other: &Product) -> Option<Product> {
        let mut merged = Vec::with_capacity(self.literals.len() + other.literals.len());
        let mut left = self.literals.iter().peekable();
        let mut right = other.literals.iter().peekable();
        loop {
            let next = match (left.peek(), right.peek()) {
                (Some(&&a), Some(&&b)) => {
                    if a == b {
                        right.next();
                        left.next();
                        a
                    } else if a < b {
                        left.next();
                        a
                    } else {
                        right.next();
                        b
                    }
                }
                (Some(&&a), None) => {
                    left.next();
                    a
                }
                (None, Some(&&b)) => {
                    right.next();
                    b
                }
                (None, None) => break,
            };
            if let Some(&last) = merged.last() {
                if next == last {
                    continue;
                }
                if next == last.complemented() {
                    return None;
                }
            }
            merged.push(next);
        }
        Some(Product { literals: merged })
    }

    /// Whether every literal of `self` occurs in `other`.
    pub fn is_subset_of(&self, other: &Product) -> bool {
        if self.literals.len() > other.literals.len() {
            return false;
        }
        let mut other_iter = other.literals.iter();
        'outer: for literal in &self.literals {
            for candidate in other_iter.by_ref() {
                if candidate == literal {
                    continue 'outer;
                }
                if candidate > literal {
                    return false;
                }
            }
            return false;
        }
        true
    }

    /// Probability of the product from per-event probabilities.
    pub fn probability(&self, probabilities: &[f64]) -> f64 {
        let mut p = 1.0;
        for literal in &self.literals {
            let event_p = probabilities[literal.event.0];
            p *= if literal.complement { 1.0 - event_p } else { event_p };
        }
        p
    }
}

/// Remove non-minimal products in place.
///
/// Processes small products first; with the ascending order a candidate
/// can only be absorbed by an already kept product, never the other way
/// around.
pub fn minimalize(products: &mut Vec<Product>) {
    products.sort_by_key(|product| product.order());
    let mut minimal: Vec<Product> = Vec::with_capacity(products.len());
    for product in products.drain(..) {
        let absorbed = minimal.iter().any(|kept| kept.is_subset_of(&product));
        if !absorbed {
            minimal.push(product);
        }
    }
    *products = minimal;
}

/// The minimal products of one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductContainer {
    products: Vec<Product>,
}

impl ProductContainer {
    pub fn new(mut products: Vec<Product>) -> Self {
        minimalize(&mut products);
        Self { products }
    }

    /// NULL: the top event can never happen.
    pub fn is_null(&self) -> bool {
        self.products.is_empty()
    }

    /// UNITY: the top event is guaranteed.
    pub fn is_unity(&self) -> bool {
        self.products.len() == 1 && self.products[0].is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.iter()
    }

    /// Largest product order in the container.
    pub fn max_order(&self) -> usize {
        self.products
            .iter()
            .map(|product| product.order())
            .max()
            .unwrap_or(0)
    }

    /// Product counts keyed by order, ascending.
    pub fn distribution(&self) -> IndexMap<usize, usize> {
        let mut counts: Vec<(usize, usize)> = Vec::new();
        for product in &self.products {
            match counts.iter_mut().find(|(order, _)| *order == product.order()) {
                Some((_, count)) => *count += 1,
                None => counts.push((product.order(), 1)),
            }
        }
        counts.sort_by_key(|&(order, _)| order);
        counts.into_iter().collect()
    }

    /// Canonical report form: literal names per product, complements
    /// prefixed with `~`, products ordered by size then lexicographically.
    pub fn report(&self, model: &Model) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = self
            .products
            .iter()
            .map(|product| {
                let mut names: Vec<String> = product
                    .literals()
                    .iter()
                    .map(|literal| {
                        let name = model.event_name(literal.event);
                        if literal.complement {
                            format!("~{}", name)
                        } else {
                            name.to_string()
                        }
                    })
                    .collect();
                names.sort();
                names
            })
            .collect();
        rows.sort_by(|lhs, rhs| lhs.len().cmp(&rhs.len()).then_with(|| lhs.cmp(rhs)));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(ids: &[(usize, bool)]) -> Product {
        Product::from_literals(
            ids.iter()
                .map(|&(id, complement)| Literal {
                    event: EventId(id),
                    complement,
                })
                .collect(),
        )
    }

    #[test]
    fn test_union_merges_and_dedups() {
        let ab = product(&[(0, false), (1, false)]);
        let bc = product(&[(1, false), (2, false)]);
        let merged = ab.union(&bc).unwrap();
        assert_eq!(merged.order(), 3);
    }

    #[test]
    fn test_union_rejects_complement_pairs() {
        let a = product(&[(0, false)]);
        let not_a = product(&[(0, true)]);
        assert!(a.union(&not_a).is_none());
    }

    #[test]
    fn test_subset_checks() {
        let a = product(&[(0, false)]);
        let ab = product(&[(0, false), (1, false)]);
        let ac = product(&[(0, false), (2, false)]);
        assert!(a.is_subset_of(&ab));
        assert!(!ab.is_subset_of(&a));
        assert!(!ab.is_subset_of(&ac));
        assert!(ab.is_subset_of(&ab));
    }

    #[test]
    fn test_minimalize_absorbs_supersets() {
        let mut products = vec![
            product(&[(0, false), (1, false)]),
            product(&[(0, false)]),
            product(&[(0, false), (2, false)]),
            product(&[(1, false), (2, false)]),
        ];
        minimalize(&mut products);
        assert_eq!(products.len(), 2);
        assert!(products.contains(&product(&[(0, false)])));
        assert!(products.contains(&product(&[(1, false), (2, false)])));
    }

    #[test]
    fn test_minimalize_is_idempotent() {
        let mut products = vec![
            product(&[(0, false)]),
            product(&[(1, false), (2, false)]),
        ];
        minimalize(&mut products);
        let once = products.clone();
        minimalize(&mut products);
        assert_eq!(once, products);
    }

    #[test]
    fn test_container_special_cases() {
        let null = ProductContainer::new(vec![]);
        assert!(null.is_null());
        assert!(!null.is_unity());

        let unity = ProductContainer::new(vec![Product::unity()]);
        assert!(unity.is_unity());
        assert_eq!(unity.len(), 1);

        // UNITY absorbs everything else.
        let mixed = ProductContainer::new(vec![Product::unity(), product(&[(0, false)])]);
        assert!(mixed.is_unity());
    }

    #[test]
    fn test_probability_of_product() {
        let probabilities = vec![0.1, 0.2, 0.5];
        let ab = product(&[(0, false), (1, false)]);
        assert!((ab.probability(&probabilities) - 0.02).abs() < 1e-12);
        let a_not_c = product(&[(0, false), (2, true)]);
        assert!((a_not_c.probability(&probabilities) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_distribution_by_order() {
        let container = ProductContainer::new(vec![
            product(&[(0, false)]),
            product(&[(1, false), (2, false)]),
            product(&[(3, false), (4, false)]),
        ]);
        let distribution = container.distribution();
        assert_eq!(distribution[&1], 1);
        assert_eq!(distribution[&2], 2);
    }
}
