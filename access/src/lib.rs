//! Access and IdAccess policy objects (§3, §4.8).

mod codec;
mod error;
mod policy;

pub use codec::{access_from_object, access_recipe, access_to_object, id_access_from_object, id_access_recipe, id_access_to_object};
pub use error::AccessError;
pub use policy::{assert_monotonic, next_grant, Access, GroupId, IdAccess, Mode, PersonId};

/// True iff `grant` authorizes `person`, directly or through any group in
/// `person_groups` (§4.7 exporter "a root is accessible iff an
/// Access/IdAccess grants the remote person or any group containing them").
pub fn grants_access(persons: &std::collections::BTreeSet<PersonId>, groups: &std::collections::BTreeSet<GroupId>, person: PersonId, person_groups: &[GroupId]) -> bool {
    persons.contains(&person) || person_groups.iter().any(|g| groups.contains(g))
}
