use crate::error::CrdtError;
use glyphstore_codec::ObjectHash;
use std::collections::{HashMap, HashSet};

/// One step of a CRDT's diff, attached to the version node it produced
/// (§4.2). `Set` carries the hash of the value it installs; `Delete` carries
/// none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set(ObjectHash),
    Delete,
}

/// A node of the version tree: `{hash, creationTime, obj, predecessorDiff, previous*}` (§4.2).
#[derive(Debug, Clone)]
pub struct VersionNode {
    pub hash: ObjectHash,
    pub creation_time: u64,
    pub obj: ObjectHash,
    pub predecessor_diff: Vec<Op>,
    pub previous: Vec<ObjectHash>,
}

/// An in-memory DAG of [`VersionNode`]s rooted at some ID-hash (§3, §4.2).
#[derive(Debug, Default)]
pub struct VersionTree {
    nodes: HashMap<ObjectHash, VersionNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl VersionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, checking that its `previous` links do not already
    /// form a cycle reachable from this insertion.
    pub fn insert(&mut self, node: VersionNode) -> Result<(), CrdtError> {
        for p in &node.previous {
            self.assert_acyclic_from(*p)?;
        }
        self.nodes.insert(node.hash, node);
        Ok(())
    }

    pub fn get(&self, hash: ObjectHash) -> Option<&VersionNode> {
        self.nodes.get(&hash)
    }

    fn assert_acyclic_from(&self, start: ObjectHash) -> Result<(), CrdtError> {
        let mut marks: HashMap<ObjectHash, Mark> = HashMap::new();
        let mut stack = vec![(start, false)];
        while let Some((hash, processed)) = stack.pop() {
            if processed {
                marks.insert(hash, Mark::Done);
                continue;
            }
            match marks.get(&hash) {
                Some(Mark::Visiting) => return Err(CrdtError::CycleDetected(hash)),
                Some(Mark::Done) => continue,
                None => {}
            }
            marks.insert(hash, Mark::Visiting);
            stack.push((hash, true));
            if let Some(node) = self.nodes.get(&hash) {
                for p in &node.previous {
                    stack.push((*p, false));
                }
            }
        }
        Ok(())
    }

    /// All ancestors of `start` (inclusive), in a deterministic BFS order.
    /// Errors if a cycle is encountered during traversal.
    pub fn ancestors(&self, start: ObjectHash) -> Result<Vec<ObjectHash>, CrdtError> {
        let mut seen: HashSet<ObjectHash> = HashSet::new();
        let mut order = Vec::new();
        let mut queue = vec![start];
        let mut budget = self.nodes.len() + 1;
        while let Some(hash) = queue.pop() {
            if !seen.insert(hash) {
                continue;
            }
            order.push(hash);
            budget = budget.checked_sub(1).ok_or(CrdtError::CycleDetected(start))?;
            if let Some(node) = self.nodes.get(&hash) {
                for p in &node.previous {
                    queue.push(*p);
                }
            }
        }
        Ok(order)
    }
}
