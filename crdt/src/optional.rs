use crate::error::CrdtError;
use crate::tree::{Op, VersionTree};
use glyphstore_codec::ObjectHash;
use std::cmp::Ordering;

/// `initialDiff(v) = [set]` if defined, else `[]` (§4.2 OptionalValue).
pub fn initial_diff(defined: bool) -> Vec<Op> {
    if defined {
        vec![Op::Set(ObjectHash::of(b"optional-value-present"))]
    } else {
        Vec::new()
    }
}

/// `diff(a, b)`: `[set]` if `a` undefined and `b` defined; `[delete]` if `a`
/// defined and `b` undefined; else `[]` (§4.2 OptionalValue).
pub fn diff(a_defined: bool, b_defined: bool) -> Vec<Op> {
    match (a_defined, b_defined) {
        (false, true) => vec![Op::Set(ObjectHash::of(b"optional-value-present"))],
        (true, false) => vec![Op::Delete],
        _ => Vec::new(),
    }
}

/// Outcome of merging two branches of an OptionalValue CRDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No branch retains a value: the merged result is deleted/absent.
    Delete,
    /// At least one top-level predecessor still carries `set`; those nodes
    /// become the new common-history for a nested merge the caller drives.
    Iterate(Vec<ObjectHash>),
}

/// A node eligible to win the set-vs-delete tie-break, together with the
/// comparison key (mirrors `register::Candidate`).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    has_op: bool,
    creation_time: u64,
    hash: ObjectHash,
    op: Option<Op>,
}

impl Candidate {
    fn key(&self) -> (bool, u64, ObjectHash) {
        (self.has_op, self.creation_time, self.hash)
    }
}

/// Finds the nearest ancestor of `start` (inclusive) that carries a `Set`
/// or `Delete` op, per the tie-break's "maximum ancestor that has an op" rule.
fn nearest_with_op(tree: &VersionTree, start: ObjectHash) -> Result<Candidate, CrdtError> {
    for hash in tree.ancestors(start)? {
        let node = tree.get(hash).ok_or(CrdtError::NotFound(hash))?;
        if let Some(op) = node.predecessor_diff.iter().find(|op| matches!(op, Op::Set(_) | Op::Delete)) {
            return Ok(Candidate {
                has_op: true,
                creation_time: node.creation_time,
                hash: node.hash,
                op: Some(*op),
            });
        }
    }
    let node = tree.get(start).ok_or(CrdtError::NotFound(start))?;
    Ok(Candidate {
        has_op: false,
        creation_time: node.creation_time,
        hash: node.hash,
        op: None,
    })
}

/// Merges two branches per §4.2/§8: the set-vs-delete tie-break is the same
/// (has-op, creationTime, hash) comparison `register::merge` uses. If the
/// winning candidate carries `delete` (or neither side ever set), the
/// result is `Delete`; otherwise this collects the top-level predecessors
/// that carry `set` and requests iteration into them as the new
/// common-history.
pub fn merge(tree: &VersionTree, first: ObjectHash, second: ObjectHash) -> Result<MergeOutcome, CrdtError> {
    let a = nearest_with_op(tree, first)?;
    let b = nearest_with_op(tree, second)?;
    let winner = match a.key().cmp(&b.key()) {
        Ordering::Less => b,
        _ => a,
    };

    match winner.op {
        None | Some(Op::Delete) => Ok(MergeOutcome::Delete),
        Some(Op::Set(_)) => {
            let mut set_nodes = Vec::new();
            for start in [first, second] {
                let node = tree.get(start).ok_or(CrdtError::NotFound(start))?;
                if node.predecessor_diff.iter().any(|op| matches!(op, Op::Set(_))) {
                    set_nodes.push(node.hash);
                }
            }
            set_nodes.sort();
            set_nodes.dedup();
            Ok(MergeOutcome::Iterate(set_nodes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::VersionNode;

    fn node(tree: &mut VersionTree, tag: &str, creation_time: u64, ops: Vec<Op>) -> ObjectHash {
        let hash = ObjectHash::of(tag.as_bytes());
        tree.insert(VersionNode {
            hash,
            creation_time,
            obj: hash,
            predecessor_diff: ops,
            previous: vec![],
        })
        .unwrap();
        hash
    }

    #[test]
    fn both_delete_yields_delete() {
        let mut tree = VersionTree::new();
        let a = node(&mut tree, "a", 0, vec![Op::Delete]);
        let b = node(&mut tree, "b", 0, vec![Op::Delete]);
        assert_eq!(merge(&tree, a, b).unwrap(), MergeOutcome::Delete);
    }

    #[test]
    fn set_with_later_creation_time_beats_delete() {
        let mut tree = VersionTree::new();
        let a = node(&mut tree, "a", 5, vec![Op::Set(ObjectHash::of(b"v"))]);
        let b = node(&mut tree, "b", 1, vec![Op::Delete]);
        assert_eq!(merge(&tree, a, b).unwrap(), MergeOutcome::Iterate(vec![a]));
        assert_eq!(merge(&tree, b, a).unwrap(), MergeOutcome::Iterate(vec![a]));
    }

    #[test]
    fn delete_with_later_creation_time_beats_set() {
        let mut tree = VersionTree::new();
        let a = node(&mut tree, "a", 1, vec![Op::Set(ObjectHash::of(b"v"))]);
        let b = node(&mut tree, "b", 5, vec![Op::Delete]);
        assert_eq!(merge(&tree, a, b).unwrap(), MergeOutcome::Delete);
        assert_eq!(merge(&tree, b, a).unwrap(), MergeOutcome::Delete);
    }

    #[test]
    fn set_vs_delete_tie_break_falls_back_to_hash() {
        let mut tree = VersionTree::new();
        let a = node(&mut tree, "a", 5, vec![Op::Set(ObjectHash::of(b"v"))]);
        let b = node(&mut tree, "b", 5, vec![Op::Delete]);
        let set_wins = a > b;
        let expected = if set_wins { MergeOutcome::Iterate(vec![a]) } else { MergeOutcome::Delete };
        assert_eq!(merge(&tree, a, b).unwrap(), expected.clone());
        assert_eq!(merge(&tree, b, a).unwrap(), expected);
    }

    #[test]
    fn both_set_requests_iteration_over_both() {
        let mut tree = VersionTree::new();
        let a = node(&mut tree, "a", 0, vec![Op::Set(ObjectHash::of(b"va"))]);
        let b = node(&mut tree, "b", 0, vec![Op::Set(ObjectHash::of(b"vb"))]);
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(merge(&tree, a, b).unwrap(), MergeOutcome::Iterate(expected));
    }
}
