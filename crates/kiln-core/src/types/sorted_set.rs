//! Sorted set container: dual-indexed by score and member.
//!
//! Members are binary-safe and unique; each carries an `f64` score.
//! Iteration order is (score, member), ties in score breaking on the
//! member bytes. A `BTreeMap<(OrderedFloat<f64>, Bytes), ()>` provides
//! the ordering and a member -> score map provides O(1) lookups.

use std::collections::BTreeMap;

use ahash::RandomState;
use bytes::Bytes;
use ordered_float::OrderedFloat;

type Score = OrderedFloat<f64>;

/// A sorted set of unique binary members with floating-point scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    /// Score -> member index for ordered iteration.
    tree: BTreeMap<(Score, Bytes), ()>,
    /// Member -> score index for O(1) lookups.
    scores: std::collections::HashMap<Bytes, Score, RandomState>,
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member or updates its score. Returns `true` if the member
    /// was newly added, `false` if an existing score was replaced.
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        let score = OrderedFloat(score);
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                if old != score {
                    self.tree.remove(&(old, member.clone()));
                    self.tree.insert((score, member), ());
                }
                false
            }
            None => {
                self.tree.insert((score, member), ());
                true
            }
        }
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.tree.remove(&(score, member));
                true
            }
            None => false,
        }
    }

    /// Returns the score for a member, or `None` if not present.
    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    /// Returns `true` if the member is present.
    pub fn contains(&self, member: &[u8]) -> bool {
        self.scores.contains_key(member)
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` if the sorted set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Iterates (member, score) pairs in (score, member) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        self.tree.keys().map(|(score, member)| (member, score.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_score() {
        let mut ss = SortedSet::new();
        assert!(ss.add(Bytes::from("alice"), 100.0));
        assert_eq!(ss.score(b"alice"), Some(100.0));
        assert_eq!(ss.len(), 1);
    }

    #[test]
    fn update_existing_score() {
        let mut ss = SortedSet::new();
        ss.add(Bytes::from("alice"), 100.0);
        assert!(!ss.add(Bytes::from("alice"), 200.0));
        assert_eq!(ss.score(b"alice"), Some(200.0));
        assert_eq!(ss.len(), 1);
    }

    #[test]
    fn remove_existing() {
        let mut ss = SortedSet::new();
        ss.add(Bytes::from("alice"), 100.0);
        assert!(ss.remove(b"alice"));
        assert!(ss.is_empty());
        assert_eq!(ss.score(b"alice"), None);
    }

    #[test]
    fn remove_nonexistent() {
        let mut ss = SortedSet::new();
        assert!(!ss.remove(b"nobody"));
    }

    #[test]
    fn iter_is_score_ordered() {
        let mut ss = SortedSet::new();
        ss.add(Bytes::from("c"), 3.0);
        ss.add(Bytes::from("a"), 1.0);
        ss.add(Bytes::from("b"), 2.0);

        let members: Vec<_> = ss.iter().map(|(m, s)| (m.as_ref(), s)).collect();
        assert_eq!(
            members,
            vec![(b"a".as_ref(), 1.0), (b"b".as_ref(), 2.0), (b"c".as_ref(), 3.0)]
        );
    }

    #[test]
    fn equal_scores_break_ties_on_member() {
        let mut ss = SortedSet::new();
        ss.add(Bytes::from("charlie"), 10.0);
        ss.add(Bytes::from("alice"), 10.0);
        ss.add(Bytes::from("bob"), 10.0);

        let members: Vec<_> = ss.iter().map(|(m, _)| m.as_ref()).collect();
        assert_eq!(members, vec![b"alice".as_ref(), b"bob".as_ref(), b"charlie".as_ref()]);
    }

    #[test]
    fn rescore_moves_position() {
        let mut ss = SortedSet::new();
        ss.add(Bytes::from("a"), 1.0);
        ss.add(Bytes::from("b"), 2.0);

        ss.add(Bytes::from("a"), 3.0);
        let members: Vec<_> = ss.iter().map(|(m, _)| m.as_ref()).collect();
        assert_eq!(members, vec![b"b".as_ref(), b"a".as_ref()]);
        // the old tree position must not linger
        assert_eq!(ss.iter().count(), 2);
    }

    #[test]
    fn infinities_sort_at_the_edges() {
        let mut ss = SortedSet::new();
        ss.add(Bytes::from("mid"), 0.0);
        ss.add(Bytes::from("hi"), f64::INFINITY);
        ss.add(Bytes::from("lo"), f64::NEG_INFINITY);

        let members: Vec<_> = ss.iter().map(|(m, _)| m.as_ref()).collect();
        assert_eq!(members, vec![b"lo".as_ref(), b"mid".as_ref(), b"hi".as_ref()]);
    }
}
