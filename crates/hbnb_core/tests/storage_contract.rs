use hbnb_core::config::{
    ENV_DB_HOST, ENV_DB_NAME, ENV_DB_PWD, ENV_DB_USER, ENV_FILE_PATH, ENV_MODE, ENV_TYPE_STORAGE,
};
use hbnb_core::{
    init_storage, open_storage, Amenity, City, Entity, EntityKind, IdentityKey, Model, Place,
    Review, State, Storage, StorageConfig, StorageError, TypeFilter, User,
};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
enum Backend {
    Db,
    File,
}

const BACKENDS: [Backend; 2] = [Backend::Db, Backend::File];

fn config(backend: Backend, dir: &Path, mode: Option<&str>) -> StorageConfig {
    let mut vars: HashMap<&str, String> = HashMap::new();
    match backend {
        Backend::Db => {
            vars.insert(ENV_TYPE_STORAGE, "db".to_string());
            vars.insert(ENV_DB_USER, "hbnb_test".to_string());
            vars.insert(ENV_DB_PWD, "hbnb_test_pwd".to_string());
            vars.insert(ENV_DB_HOST, dir.to_str().unwrap().to_string());
            vars.insert(ENV_DB_NAME, "hbnb_test_db".to_string());
        }
        Backend::File => {
            vars.insert(ENV_TYPE_STORAGE, "file".to_string());
            vars.insert(
                ENV_FILE_PATH,
                dir.join("file.json").to_str().unwrap().to_string(),
            );
        }
    }
    if let Some(mode) = mode {
        vars.insert(ENV_MODE, mode.to_string());
    }
    StorageConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

fn engine(backend: Backend, dir: &Path) -> Box<dyn Storage> {
    init_storage(&config(backend, dir, None)).unwrap()
}

fn keys(storage: &mut dyn Storage, filter: TypeFilter) -> Vec<String> {
    storage
        .all(filter)
        .unwrap()
        .into_keys()
        .map(String::from)
        .collect()
}

/// State s1 <- City c1 <- Place p1 (amenity a1) <- Review r1, plus User u1.
fn seed_graph(storage: &mut dyn Storage) {
    let mut place = Place::new("c1", "u1", "Loft").with_id("p1");
    place.amenity_ids = vec!["a1".to_string()];
    let entities: Vec<Entity> = vec![
        State::new("California").with_id("s1").into(),
        City::new("s1", "San Francisco").with_id("c1").into(),
        User::new("u1@example.com", "pwd").with_id("u1").into(),
        Amenity::new("Wifi").with_id("a1").into(),
        place.into(),
        Review::new("p1", "u1", "Great").with_id("r1").into(),
    ];
    for entity in entities {
        storage.new(entity).unwrap();
    }
    storage.save().unwrap();
}

#[test]
fn test_mode_starts_from_an_empty_store() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut previous = engine(backend, dir.path());
        seed_graph(previous.as_mut());
        previous.close();
        drop(previous);

        let mut storage = init_storage(&config(backend, dir.path(), Some("test"))).unwrap();
        assert!(storage.all(TypeFilter::All).unwrap().is_empty(), "{backend:?}");

        let user = User::new("u1@example.com", "pwd").with_id("u1");
        storage.new(user.clone().into()).unwrap();
        storage.save().unwrap();
        let users = storage.all(TypeFilter::Only(EntityKind::User)).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(
            users.get(&IdentityKey::new(EntityKind::User, "u1")),
            Some(&Entity::User(user))
        );

        // Reset happens at construction only.
        storage.reload().unwrap();
        assert_eq!(keys(storage.as_mut(), TypeFilter::All), vec!["User.u1"]);
    }
}

#[test]
fn non_test_modes_keep_existing_data() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut first = engine(backend, dir.path());
        seed_graph(first.as_mut());
        first.close();
        drop(first);

        let mut dev = init_storage(&config(backend, dir.path(), Some("dev"))).unwrap();
        assert_eq!(dev.count(TypeFilter::All).unwrap(), 6, "{backend:?}");
    }
}

#[test]
fn saved_entities_survive_a_fresh_engine() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = engine(backend, dir.path());
        seed_graph(writer.as_mut());
        writer.close();

        let mut reader = engine(backend, dir.path());
        let objects = reader.all(TypeFilter::All).unwrap();
        assert_eq!(objects.len(), 6, "{backend:?}");

        let place = objects
            .get(&IdentityKey::new(EntityKind::Place, "p1"))
            .and_then(Entity::as_place)
            .unwrap();
        assert_eq!(place.amenity_ids, vec!["a1".to_string()]);
        assert_eq!(place.city_id, "c1");
    }
}

#[test]
fn type_filter_narrows_results_and_unknown_names_return_everything() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        assert_eq!(
            keys(storage.as_mut(), TypeFilter::Only(EntityKind::City)),
            vec!["City.c1"]
        );
        assert_eq!(
            keys(storage.as_mut(), TypeFilter::from_name("Review")),
            vec!["Review.r1"]
        );
        let unknown = storage.all(TypeFilter::from_name("NoSuchType")).unwrap();
        let everything = storage.all(TypeFilter::All).unwrap();
        assert_eq!(unknown.len(), 6, "{backend:?}");
        assert_eq!(unknown, everything, "{backend:?}");
    }
}

#[test]
fn pending_changes_are_visible_until_reload() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());

        storage
            .new(State::new("Nevada").with_id("s2").into())
            .unwrap();
        assert_eq!(keys(storage.as_mut(), TypeFilter::All), vec!["State.s2"]);

        storage.reload().unwrap();
        assert!(storage.all(TypeFilter::All).unwrap().is_empty(), "{backend:?}");
    }
}

#[test]
fn close_discards_pending_and_is_idempotent() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        storage
            .new(State::new("Nevada").with_id("s2").into())
            .unwrap();

        storage.close();
        storage.close();

        // Operations after close open a fresh session.
        assert!(storage.all(TypeFilter::All).unwrap().is_empty(), "{backend:?}");
        storage.reload().unwrap();
        assert!(storage.all(TypeFilter::All).unwrap().is_empty());
    }
}

#[test]
fn new_replaces_entity_with_same_identity() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        let mut renamed = State::new("Golden State").with_id("s1");
        renamed.base.updated_at += 1;
        storage.new(renamed.into()).unwrap();
        storage.save().unwrap();
        storage.reload().unwrap();

        let state = storage.get(EntityKind::State, "s1").unwrap().unwrap();
        assert_eq!(state.as_state().unwrap().name, "Golden State", "{backend:?}");
        // Replacing a state must not cascade to its cities.
        assert!(storage.get(EntityKind::City, "c1").unwrap().is_some());
    }
}

#[test]
fn delete_cascades_through_dependents() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        let state = storage.get(EntityKind::State, "s1").unwrap();
        storage.delete(state.as_ref()).unwrap();
        storage.save().unwrap();
        storage.reload().unwrap();

        assert_eq!(
            keys(storage.as_mut(), TypeFilter::All),
            vec!["Amenity.a1", "User.u1"],
            "{backend:?}"
        );
    }
}

#[test]
fn deleting_an_amenity_only_unlinks_it_from_places() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        let amenity = storage.get(EntityKind::Amenity, "a1").unwrap();
        storage.delete(amenity.as_ref()).unwrap();
        storage.save().unwrap();
        storage.reload().unwrap();

        let place = storage.get(EntityKind::Place, "p1").unwrap().unwrap();
        assert!(place.as_place().unwrap().amenity_ids.is_empty(), "{backend:?}");
        assert_eq!(storage.count(TypeFilter::All).unwrap(), 5);
    }
}

#[test]
fn delete_of_none_or_unknown_entity_is_a_no_op() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        storage.delete(None).unwrap();
        let never_saved: Entity = State::new("Oregon").into();
        storage.delete(Some(&never_saved)).unwrap();
        storage.save().unwrap();

        assert_eq!(storage.count(TypeFilter::All).unwrap(), 6, "{backend:?}");
    }
}

#[test]
fn deleting_a_pending_entity_before_save_leaves_nothing_behind() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());

        let state: Entity = State::new("Utah").into();
        storage.new(state.clone()).unwrap();
        storage.delete(Some(&state)).unwrap();
        storage.save().unwrap();
        storage.reload().unwrap();

        assert!(storage.all(TypeFilter::All).unwrap().is_empty(), "{backend:?}");
    }
}

fn stage_dangling_city(storage: &mut dyn Storage) {
    storage
        .new(State::new("Texas").with_id("s2").into())
        .unwrap();
    storage
        .new(City::new("missing-state", "Nowhere").with_id("c2").into())
        .unwrap();
}

#[test]
fn failed_save_keeps_pending_changes_for_retry() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());
        stage_dangling_city(storage.as_mut());

        let err = storage.save().unwrap_err();
        assert!(matches!(err, StorageError::Commit(_)), "{backend:?}: {err}");
        assert!(err.is_constraint_violation(), "{backend:?}: {err}");

        // Still pending in this session, so a retry fails the same way.
        assert_eq!(storage.count(TypeFilter::All).unwrap(), 8, "{backend:?}");
        assert!(storage.get(EntityKind::State, "s2").unwrap().is_some());
        let retry = storage.save().unwrap_err();
        assert!(retry.is_constraint_violation(), "{backend:?}: {retry}");

        storage
            .new(State::new("Found").with_id("missing-state").into())
            .unwrap();
        storage.save().unwrap();
        storage.close();

        let mut fresh = engine(backend, dir.path());
        assert_eq!(fresh.count(TypeFilter::All).unwrap(), 9, "{backend:?}");
        assert!(fresh.get(EntityKind::City, "c2").unwrap().is_some());
    }
}

#[test]
fn failed_save_then_reload_leaves_store_unchanged() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());
        stage_dangling_city(storage.as_mut());

        assert!(storage.save().is_err(), "{backend:?}");
        storage.reload().unwrap();

        // The whole batch was discarded, including the valid state.
        assert_eq!(storage.count(TypeFilter::All).unwrap(), 6, "{backend:?}");
        assert!(storage.get(EntityKind::State, "s2").unwrap().is_none());
        storage.save().unwrap();

        let mut fresh = engine(backend, dir.path());
        assert_eq!(fresh.count(TypeFilter::All).unwrap(), 6);
        fresh.close();

        storage
            .new(Amenity::new("Pool").with_id("a2").into())
            .unwrap();
        storage.save().unwrap();
        assert_eq!(storage.count(TypeFilter::All).unwrap(), 7);
    }
}

#[test]
fn engines_sharing_a_store_keep_each_others_commits() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut first = engine(backend, dir.path());
        assert!(first.all(TypeFilter::All).unwrap().is_empty());

        let mut second = engine(backend, dir.path());
        second
            .new(State::new("Idaho").with_id("sb").into())
            .unwrap();
        second.save().unwrap();
        second.close();

        assert!(
            first.get(EntityKind::State, "sb").unwrap().is_some(),
            "{backend:?}"
        );
        first
            .new(State::new("Maine").with_id("sa").into())
            .unwrap();
        first.save().unwrap();
        first.close();

        let mut reader = engine(backend, dir.path());
        assert_eq!(
            keys(reader.as_mut(), TypeFilter::All),
            vec!["State.sa", "State.sb"],
            "{backend:?}"
        );
    }
}

#[test]
fn save_without_pending_changes_is_a_no_op() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = open_storage(&config(backend, dir.path(), None)).unwrap();
        storage.save().unwrap();

        storage.reload().unwrap();
        storage.save().unwrap();
        storage.save().unwrap();
        assert_eq!(storage.count(TypeFilter::All).unwrap(), 0, "{backend:?}");
    }
}

#[test]
fn get_returns_entity_by_kind_and_id() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        let user = storage.get(EntityKind::User, "u1").unwrap().unwrap();
        assert_eq!(user.as_user().unwrap().email, "u1@example.com", "{backend:?}");
        assert!(storage.get(EntityKind::State, "u1").unwrap().is_none());
        assert!(storage.get(EntityKind::User, "nobody").unwrap().is_none());
    }
}

#[test]
fn optional_fields_round_trip_through_each_backend() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = engine(backend, dir.path());
        seed_graph(storage.as_mut());

        let mut user = User::new("ada@example.com", "pwd").with_id("u2");
        user.first_name = Some("Ada".to_string());
        let mut place = Place::new("c1", "u2", "Cabin").with_id("p2");
        place.description = Some("Quiet".to_string());
        place.number_rooms = 3;
        place.price_by_night = 120;
        place.latitude = Some(37.77);
        place.amenity_ids = vec!["a1".to_string(), "a1".to_string()];
        storage.new(user.clone().into()).unwrap();
        storage.new(place.into()).unwrap();
        storage.save().unwrap();
        storage.close();

        let mut reader = engine(backend, dir.path());
        let stored_user = reader.get(EntityKind::User, "u2").unwrap().unwrap();
        assert_eq!(stored_user, Entity::User(user), "{backend:?}");

        let stored_place = reader.get(EntityKind::Place, "p2").unwrap().unwrap();
        let stored_place = stored_place.as_place().unwrap();
        assert_eq!(stored_place.description.as_deref(), Some("Quiet"));
        assert_eq!(stored_place.number_rooms, 3);
        assert_eq!(stored_place.price_by_night, 120);
        assert_eq!(stored_place.latitude, Some(37.77));
        assert_eq!(stored_place.longitude, None);
        assert_eq!(stored_place.amenity_ids, vec!["a1".to_string()]);
    }
}

#[test]
fn wrong_db_credential_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    drop(engine(Backend::Db, dir.path()));

    let mut vars: HashMap<&str, String> = HashMap::new();
    vars.insert(ENV_TYPE_STORAGE, "db".to_string());
    vars.insert(ENV_DB_USER, "hbnb_test".to_string());
    vars.insert(ENV_DB_PWD, "not-the-password".to_string());
    vars.insert(ENV_DB_HOST, dir.path().to_str().unwrap().to_string());
    vars.insert(ENV_DB_NAME, "hbnb_test_db".to_string());
    let config = StorageConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();

    let err = init_storage(&config).err().unwrap();
    assert!(matches!(err, StorageError::Connection { .. }), "{err}");
    assert!(err.to_string().contains("sqlite://hbnb_test@"));
    assert!(!err.to_string().contains("not-the-password"));
}

#[test]
fn missing_storage_location_is_a_connection_error() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");

        let err = init_storage(&config(backend, &missing, None)).err().unwrap();
        assert!(
            matches!(err, StorageError::Connection { .. }),
            "{backend:?}: {err}"
        );
    }
}
