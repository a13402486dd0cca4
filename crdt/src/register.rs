use crate::error::CrdtError;
use crate::tree::{Op, VersionTree};
use glyphstore_codec::ObjectHash;
use std::cmp::Ordering;

/// `initialDiff(obj) = [set(canonical(obj))]` (§4.2 Register).
pub fn initial_diff(value: ObjectHash) -> Vec<Op> {
    vec![Op::Set(value)]
}

/// `diff(a, b) = []` if canonical equal, else `[set(canonical(b))]` (§4.2 Register).
pub fn diff(a: ObjectHash, b: ObjectHash) -> Vec<Op> {
    if a == b {
        Vec::new()
    } else {
        vec![Op::Set(b)]
    }
}

/// A node eligible to win the tie-break, together with the comparison key.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    has_op: bool,
    creation_time: u64,
    hash: ObjectHash,
    value: Option<ObjectHash>,
}

impl Candidate {
    fn key(&self) -> (bool, u64, ObjectHash) {
        (self.has_op, self.creation_time, self.hash)
    }
}

/// Finds the nearest ancestor of `start` (inclusive) that carries a `Set`
/// op, per the tie-break's "maximum ancestor that has a set op" rule.
fn nearest_with_set(tree: &VersionTree, start: ObjectHash) -> Result<Candidate, CrdtError> {
    for hash in tree.ancestors(start)? {
        let node = tree.get(hash).ok_or(CrdtError::NotFound(hash))?;
        if let Some(Op::Set(value)) = node.predecessor_diff.iter().find(|op| matches!(op, Op::Set(_))) {
            return Ok(Candidate {
                has_op: true,
                creation_time: node.creation_time,
                hash: node.hash,
                value: Some(*value),
            });
        }
    }
    let node = tree.get(start).ok_or(CrdtError::NotFound(start))?;
    Ok(Candidate {
        has_op: false,
        creation_time: node.creation_time,
        hash: node.hash,
        value: None,
    })
}

/// Merges two branches of a Register CRDT, returning the winning value's
/// hash (if either branch ever set one) per the §4.2 tie-break: (1) has-op
/// over no-op, (2) greater creationTime, (3) greater hash.
pub fn merge(tree: &VersionTree, first: ObjectHash, second: ObjectHash) -> Result<Option<ObjectHash>, CrdtError> {
    let a = nearest_with_set(tree, first)?;
    let b = nearest_with_set(tree, second)?;
    let winner = match a.key().cmp(&b.key()) {
        Ordering::Less => b,
        _ => a,
    };
    Ok(winner.value)
}
