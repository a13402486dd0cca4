use crate::error::AccessError;
use glyphstore_codec::ObjectHash;
use std::collections::BTreeSet;

pub type PersonId = ObjectHash;
pub type GroupId = ObjectHash;

/// Write mode for [`Access`]/[`IdAccess`] (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Merge person/group sets with the previous version (deduplicated).
    Add,
    /// Ignore the previous sets entirely.
    Replace,
}

/// Grants a set of persons and groups read access to one **unversioned**
/// target (§3 Access).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub target: ObjectHash,
    pub persons: BTreeSet<PersonId>,
    pub groups: BTreeSet<GroupId>,
}

/// Grants access over **all versions** of an ID-object (§3 IdAccess).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAccess {
    pub target_id: ObjectHash,
    pub persons: BTreeSet<PersonId>,
    pub groups: BTreeSet<GroupId>,
}

/// Computes the next grant given the previous one (if any), the new write's
/// persons/groups, and the mode (§4.8). `mode=add` merges with the previous
/// sets; `mode=replace` ignores them. Monotonicity under `add` is
/// guaranteed by construction (union is always a superset), so this never
/// fails for `add` and exists mainly as a verification hook for callers
/// that want to assert an invariant on an externally-supplied set.
pub fn next_grant(
    previous: Option<(&BTreeSet<PersonId>, &BTreeSet<GroupId>)>,
    new_persons: &BTreeSet<PersonId>,
    new_groups: &BTreeSet<GroupId>,
    mode: Mode,
) -> (BTreeSet<PersonId>, BTreeSet<GroupId>) {
    match (mode, previous) {
        (Mode::Replace, _) | (Mode::Add, None) => (new_persons.clone(), new_groups.clone()),
        (Mode::Add, Some((prev_persons, prev_groups))) => (
            prev_persons.union(new_persons).cloned().collect(),
            prev_groups.union(new_groups).cloned().collect(),
        ),
    }
}

/// Verifies the monotonicity invariant for a `mode=add` write: the new
/// grant's sets must be supersets of the previous version's (§3 invariant).
pub fn assert_monotonic(
    previous_persons: &BTreeSet<PersonId>,
    previous_groups: &BTreeSet<GroupId>,
    new_persons: &BTreeSet<PersonId>,
    new_groups: &BTreeSet<GroupId>,
) -> Result<(), AccessError> {
    if previous_persons.is_subset(new_persons) && previous_groups.is_subset(new_groups) {
        Ok(())
    } else {
        Err(AccessError::NotMonotonic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(tag: &str) -> ObjectHash {
        ObjectHash::of(tag.as_bytes())
    }

    #[test]
    fn add_mode_merges_and_dedupes() {
        let prev_persons: BTreeSet<_> = [hash("q")].into_iter().collect();
        let prev_groups = BTreeSet::new();
        let new_persons: BTreeSet<_> = [hash("p"), hash("q")].into_iter().collect();
        let (persons, _) = next_grant(
            Some((&prev_persons, &prev_groups)),
            &new_persons,
            &BTreeSet::new(),
            Mode::Add,
        );
        let expected: BTreeSet<_> = [hash("p"), hash("q")].into_iter().collect();
        assert_eq!(persons, expected);
        assert_monotonic(&prev_persons, &prev_groups, &persons, &BTreeSet::new()).unwrap();
    }

    #[test]
    fn replace_mode_ignores_previous() {
        let prev_persons: BTreeSet<_> = [hash("q")].into_iter().collect();
        let new_persons: BTreeSet<_> = [hash("p")].into_iter().collect();
        let (persons, _) = next_grant(
            Some((&prev_persons, &BTreeSet::new())),
            &new_persons,
            &BTreeSet::new(),
            Mode::Replace,
        );
        assert_eq!(persons, new_persons);
    }

    #[test]
    fn non_monotonic_add_is_rejected() {
        let prev_persons: BTreeSet<_> = [hash("p"), hash("q")].into_iter().collect();
        let shrunk: BTreeSet<_> = [hash("p")].into_iter().collect();
        assert!(assert_monotonic(&prev_persons, &BTreeSet::new(), &shrunk, &BTreeSet::new()).is_err());
    }
}
