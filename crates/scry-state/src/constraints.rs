// SPDX-License-Identifier: AGPL-3.0

//! Append-only path condition

use scry_smt::Constraint;

/// Ordered set of predicates accumulated along one path.
///
/// There is no removal: a child path starts from a copy of its parent's
/// constraints and can only add to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    items: Vec<Constraint>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate. Literal `true` and exact duplicates are not stored.
    pub fn append(&mut self, constraint: Constraint) {
        if constraint.as_bool() == Some(true) || self.items.contains(&constraint) {
            return;
        }
        self.items.push(constraint);
    }

    pub fn extend<I: IntoIterator<Item = Constraint>>(&mut self, constraints: I) {
        for constraint in constraints {
            self.append(constraint);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Constraint] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.items.iter()
    }

    /// False once a literal `false` has been appended.
    pub fn is_possible(&self) -> bool {
        !self.items.iter().any(|c| c.as_bool() == Some(false))
    }

    /// Whether `self` extends `other` (`other` is a prefix of `self`).
    pub fn extends(&self, other: &Constraints) -> bool {
        self.items.len() >= other.items.len() && self.items[..other.items.len()] == other.items[..]
    }

    /// A copy with `extra` appended, for one-off solver queries.
    pub fn with(&self, extra: impl IntoIterator<Item = Constraint>) -> Vec<Constraint> {
        let mut query = self.clone();
        query.extend(extra);
        query.items
    }
}
