//! Ordered record of a session's uncommitted changes.
//!
//! The log survives a failed `save()` so the caller can retry; only
//! `reload()`/`close()` or a successful commit clear it.

use super::references::cascade_delete;
use crate::model::entity::{Entity, EntityMap, IdentityKey};
use crate::model::registry::EntityKind;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Change {
    Upsert(Entity),
    Delete { kind: EntityKind, id: String },
}

#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    changes: Vec<Change>,
}

impl ChangeLog {
    pub(crate) fn record_upsert(&mut self, entity: Entity) {
        self.changes.push(Change::Upsert(entity));
    }

    pub(crate) fn record_delete(&mut self, entity: &Entity) {
        self.changes.push(Change::Delete {
            kind: entity.kind(),
            id: entity.id().to_string(),
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Replays the log in order on top of `objects`; deletes cascade.
    pub(crate) fn apply_to(&self, objects: &mut EntityMap) {
        for change in &self.changes {
            match change {
                Change::Upsert(entity) => {
                    objects.insert(entity.identity_key(), entity.clone());
                }
                Change::Delete { kind, id } => {
                    cascade_delete(objects, IdentityKey::new(*kind, id));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ChangeLog;
    use crate::model::entity::{City, Entity, EntityMap, IdentityKey, Model, State};
    use crate::model::registry::EntityKind;

    fn committed() -> EntityMap {
        let entities: Vec<Entity> = vec![
            State::new("CA").with_id("s1").into(),
            City::new("s1", "SF").with_id("c1").into(),
        ];
        entities
            .into_iter()
            .map(|entity| (entity.identity_key(), entity))
            .collect()
    }

    #[test]
    fn replay_applies_upserts_and_cascading_deletes_in_order() {
        let state: Entity = State::new("CA").with_id("s1").into();
        let mut log = ChangeLog::default();
        log.record_delete(&state);
        log.record_upsert(State::new("NV").with_id("s2").into());

        let mut objects = committed();
        log.apply_to(&mut objects);

        let keys: Vec<String> = objects.into_keys().map(String::from).collect();
        assert_eq!(keys, vec!["State.s2"]);
    }

    #[test]
    fn upsert_after_delete_restores_entity() {
        let state: Entity = State::new("Golden").with_id("s1").into();
        let mut log = ChangeLog::default();
        log.record_delete(&state);
        log.record_upsert(state.clone());

        let mut objects = committed();
        log.apply_to(&mut objects);

        assert_eq!(
            objects.get(&IdentityKey::new(EntityKind::State, "s1")),
            Some(&state)
        );
        assert!(!objects.contains_key(&IdentityKey::new(EntityKind::City, "c1")));
        assert_eq!(log.len(), 2);
    }
}
