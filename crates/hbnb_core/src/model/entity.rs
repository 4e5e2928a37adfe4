//! Entity records, the tagged `Entity` union and identity keys.
//!
//! # Responsibility
//! - Define the canonical shape of every registered entity.
//! - Derive identity keys and expose cross-entity references.
//!
//! # Invariants
//! - `id` is assigned at construction and never changes afterwards.
//! - Serialized entities carry their type name under `__class__`.
//! - Type names never contain `.`, so an identity key splits back into
//!   exactly one `(kind, id)` pair.

use crate::model::registry::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Result of materializing entities, keyed by identity.
pub type EntityMap = BTreeMap<IdentityKey, Entity>;

/// Canonical `<TypeName>.<id>` lookup key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(kind: EntityKind, id: &str) -> Self {
        Self(format!("{}.{id}", kind.name()))
    }

    /// Splits the key back into its registered kind and id.
    ///
    /// Returns `None` when the prefix is not a registered type name.
    pub fn split(&self) -> Option<(EntityKind, &str)> {
        let (name, id) = self.0.split_once('.')?;
        EntityKind::from_name(name).map(|kind| (kind, id))
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IdentityKey> for String {
    fn from(value: IdentityKey) -> Self {
        value.0
    }
}

/// Fields shared by every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseFields {
    pub id: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl BaseFields {
    /// Fresh fields with a generated v4 UUID id.
    pub fn generate() -> Self {
        let now = now_epoch_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Accessors shared by the concrete entity records.
pub trait Model: Into<Entity> {
    const KIND: EntityKind;

    fn base(&self) -> &BaseFields;
    fn base_mut(&mut self) -> &mut BaseFields;

    fn id(&self) -> &str {
        &self.base().id
    }

    fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(Self::KIND, self.id())
    }

    /// Replaces the generated id, for callers that own identity externally.
    fn with_id(mut self, id: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.base_mut().id = id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(flatten)]
    pub base: BaseFields,
    pub name: String,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseFields::generate(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(flatten)]
    pub base: BaseFields,
    pub state_id: String,
    pub name: String,
}

impl City {
    pub fn new(state_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base: BaseFields::generate(),
            state_id: state_id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub base: BaseFields,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base: BaseFields::generate(),
            email: email.into(),
            password: password.into(),
            first_name: None,
            last_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amenity {
    #[serde(flatten)]
    pub base: BaseFields,
    pub name: String,
}

impl Amenity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseFields::generate(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(flatten)]
    pub base: BaseFields,
    pub city_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub number_rooms: i64,
    #[serde(default)]
    pub number_bathrooms: i64,
    #[serde(default)]
    pub max_guest: i64,
    #[serde(default)]
    pub price_by_night: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Linked amenities; kept sorted and deduplicated by the backends.
    #[serde(default)]
    pub amenity_ids: Vec<String>,
}

impl Place {
    pub fn new(
        city_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            base: BaseFields::generate(),
            city_id: city_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            number_rooms: 0,
            number_bathrooms: 0,
            max_guest: 0,
            price_by_night: 0,
            latitude: None,
            longitude: None,
            amenity_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(flatten)]
    pub base: BaseFields,
    pub place_id: String,
    pub user_id: String,
    pub text: String,
}

impl Review {
    pub fn new(
        place_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            base: BaseFields::generate(),
            place_id: place_id.into(),
            user_id: user_id.into(),
            text: text.into(),
        }
    }
}

/// Any registered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__class__")]
pub enum Entity {
    State(State),
    City(City),
    User(User),
    Amenity(Amenity),
    Place(Place),
    Review(Review),
}

/// What happens to the referencing entity when its target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// The referencing entity is deleted as well.
    Cascade,
    /// Only the link is dropped; the referencing entity survives.
    Unlink,
}

/// One outgoing reference from an entity to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub field: &'static str,
    pub target: EntityKind,
    pub id: &'a str,
    pub on_delete: OnDelete,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::State(_) => EntityKind::State,
            Self::City(_) => EntityKind::City,
            Self::User(_) => EntityKind::User,
            Self::Amenity(_) => EntityKind::Amenity,
            Self::Place(_) => EntityKind::Place,
            Self::Review(_) => EntityKind::Review,
        }
    }

    pub fn base(&self) -> &BaseFields {
        match self {
            Self::State(value) => &value.base,
            Self::City(value) => &value.base,
            Self::User(value) => &value.base,
            Self::Amenity(value) => &value.base,
            Self::Place(value) => &value.base,
            Self::Review(value) => &value.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.kind(), self.id())
    }

    /// Outgoing references in field order.
    pub fn references(&self) -> Vec<Reference<'_>> {
        match self {
            Self::State(_) | Self::User(_) | Self::Amenity(_) => Vec::new(),
            Self::City(city) => vec![cascade("state_id", EntityKind::State, &city.state_id)],
            Self::Place(place) => {
                let mut refs = vec![
                    cascade("city_id", EntityKind::City, &place.city_id),
                    cascade("user_id", EntityKind::User, &place.user_id),
                ];
                refs.extend(place.amenity_ids.iter().map(|id| Reference {
                    field: "amenity_ids",
                    target: EntityKind::Amenity,
                    id,
                    on_delete: OnDelete::Unlink,
                }));
                refs
            }
            Self::Review(review) => vec![
                cascade("place_id", EntityKind::Place, &review.place_id),
                cascade("user_id", EntityKind::User, &review.user_id),
            ],
        }
    }

    /// Brings collection fields into the canonical shape the backends return.
    pub(crate) fn normalize(&mut self) {
        if let Self::Place(place) = self {
            place.amenity_ids.sort();
            place.amenity_ids.dedup();
        }
    }

    /// Drops an `OnDelete::Unlink` reference to `(target, id)`.
    pub(crate) fn unlink(&mut self, target: EntityKind, id: &str) {
        if let (Self::Place(place), EntityKind::Amenity) = (self, target) {
            place.amenity_ids.retain(|amenity_id| amenity_id != id);
        }
    }

    pub fn as_state(&self) -> Option<&State> {
        match self {
            Self::State(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_city(&self) -> Option<&City> {
        match self {
            Self::City(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_place(&self) -> Option<&Place> {
        match self {
            Self::Place(value) => Some(value),
            _ => None,
        }
    }
}

impl From<State> for Entity {
    fn from(value: State) -> Self {
        Self::State(value)
    }
}

impl From<City> for Entity {
    fn from(value: City) -> Self {
        Self::City(value)
    }
}

impl From<User> for Entity {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}

impl From<Amenity> for Entity {
    fn from(value: Amenity) -> Self {
        Self::Amenity(value)
    }
}

impl From<Place> for Entity {
    fn from(value: Place) -> Self {
        Self::Place(value)
    }
}

impl From<Review> for Entity {
    fn from(value: Review) -> Self {
        Self::Review(value)
    }
}

impl Model for State {
    const KIND: EntityKind = EntityKind::State;

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl Model for City {
    const KIND: EntityKind = EntityKind::City;

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl Model for User {
    const KIND: EntityKind = EntityKind::User;

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl Model for Amenity {
    const KIND: EntityKind = EntityKind::Amenity;

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl Model for Place {
    const KIND: EntityKind = EntityKind::Place;

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl Model for Review {
    const KIND: EntityKind = EntityKind::Review;

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

fn cascade<'a>(field: &'static str, target: EntityKind, id: &'a str) -> Reference<'a> {
    Reference {
        field,
        target,
        id,
        on_delete: OnDelete::Cascade,
    }
}

/// Current time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
