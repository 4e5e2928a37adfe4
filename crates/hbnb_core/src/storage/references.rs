//! Reference checks and delete cascades over an in-memory entity map.
//!
//! Mirrors the relational schema's deferred foreign keys so that both
//! backends reject and cascade the same changes.

use crate::model::entity::{EntityMap, IdentityKey, OnDelete};

/// Returns a description of the first dangling reference, if any.
pub(crate) fn find_dangling(objects: &EntityMap) -> Option<String> {
    for (key, entity) in objects {
        for reference in entity.references() {
            let target = IdentityKey::new(reference.target, reference.id);
            if !objects.contains_key(&target) {
                return Some(format!(
                    "{key}.{} references missing {target}",
                    reference.field
                ));
            }
        }
    }
    None
}

/// Removes `root` and everything that cascades from it.
///
/// Returns the removed keys; empty when `root` was not present.
pub(crate) fn cascade_delete(objects: &mut EntityMap, root: IdentityKey) -> Vec<IdentityKey> {
    let mut removed = Vec::new();
    let mut queue = vec![root];

    while let Some(key) = queue.pop() {
        let Some(entity) = objects.remove(&key) else {
            continue;
        };
        let (kind, id) = (entity.kind(), entity.id().to_string());

        let mut unlink = Vec::new();
        for (dependent_key, dependent) in objects.iter() {
            for reference in dependent.references() {
                if reference.target != kind || reference.id != id {
                    continue;
                }
                match reference.on_delete {
                    OnDelete::Cascade => queue.push(dependent_key.clone()),
                    OnDelete::Unlink => unlink.push(dependent_key.clone()),
                }
            }
        }

        for dependent_key in unlink {
            if let Some(dependent) = objects.get_mut(&dependent_key) {
                dependent.unlink(kind, &id);
            }
        }
        removed.push(key);
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::{cascade_delete, find_dangling};
    use crate::model::entity::{
        Amenity, City, Entity, EntityMap, IdentityKey, Model, Place, State, User,
    };
    use crate::model::registry::EntityKind;

    fn map_of(entities: Vec<Entity>) -> EntityMap {
        entities
            .into_iter()
            .map(|entity| (entity.identity_key(), entity))
            .collect()
    }

    fn sample_graph() -> EntityMap {
        let mut place = Place::new("c1", "u1", "Loft").with_id("p1");
        place.amenity_ids = vec!["a1".to_string()];
        map_of(vec![
            State::new("CA").with_id("s1").into(),
            City::new("s1", "SF").with_id("c1").into(),
            User::new("a@b.c", "pwd").with_id("u1").into(),
            Amenity::new("Wifi").with_id("a1").into(),
            place.into(),
        ])
    }

    #[test]
    fn dangling_reference_is_reported_with_field() {
        let city = City::new("missing-state", "Nowhere").with_id("c1");
        let objects = map_of(vec![city.into()]);

        let message = find_dangling(&objects).unwrap();
        assert_eq!(
            message,
            "City.c1.state_id references missing State.missing-state"
        );
    }

    #[test]
    fn consistent_graph_has_no_dangling_reference() {
        assert!(find_dangling(&sample_graph()).is_none());
    }

    #[test]
    fn deleting_state_cascades_through_city_to_place() {
        let mut objects = sample_graph();

        let removed = cascade_delete(&mut objects, IdentityKey::new(EntityKind::State, "s1"));

        assert_eq!(removed.len(), 3);
        assert_eq!(objects.len(), 2);
        assert!(find_dangling(&objects).is_none());
    }

    #[test]
    fn deleting_amenity_only_unlinks_it_from_places() {
        let mut objects = sample_graph();

        let removed = cascade_delete(&mut objects, IdentityKey::new(EntityKind::Amenity, "a1"));

        assert_eq!(removed, vec![IdentityKey::new(EntityKind::Amenity, "a1")]);
        let place = objects.values().find_map(Entity::as_place).unwrap();
        assert!(place.amenity_ids.is_empty());
    }

    #[test]
    fn deleting_unknown_key_is_a_noop() {
        let mut objects = sample_graph();

        let removed = cascade_delete(&mut objects, IdentityKey::new(EntityKind::User, "nobody"));

        assert!(removed.is_empty());
        assert_eq!(objects.len(), 5);
    }
}
