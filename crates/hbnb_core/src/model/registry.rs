//! Static entity registry and typed type filter.
//!
//! # Responsibility
//! - Map every registered entity kind to its public name and table.
//! - Resolve the "name or type" argument of `Storage::all`.
//!
//! # Invariants
//! - `REGISTRY` lists kinds in dependency order: a kind never references a
//!   kind that appears after it. Schema drops walk the list in reverse.
//! - Unknown names resolve to `TypeFilter::All`, never to an error.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Closed set of entity types known to the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    State,
    City,
    User,
    Amenity,
    Place,
    Review,
}

/// Registry entry for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Public type name, used as the identity-key prefix.
    pub name: &'static str,
    /// Relational table backing this kind.
    pub table: &'static str,
}

pub const REGISTRY: [EntityDescriptor; 6] = [
    EntityDescriptor {
        kind: EntityKind::State,
        name: "State",
        table: "states",
    },
    EntityDescriptor {
        kind: EntityKind::City,
        name: "City",
        table: "cities",
    },
    EntityDescriptor {
        kind: EntityKind::User,
        name: "User",
        table: "users",
    },
    EntityDescriptor {
        kind: EntityKind::Amenity,
        name: "Amenity",
        table: "amenities",
    },
    EntityDescriptor {
        kind: EntityKind::Place,
        name: "Place",
        table: "places",
    },
    EntityDescriptor {
        kind: EntityKind::Review,
        name: "Review",
        table: "reviews",
    },
];

impl EntityKind {
    /// All registered kinds in registry order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::State,
        EntityKind::City,
        EntityKind::User,
        EntityKind::Amenity,
        EntityKind::Place,
        EntityKind::Review,
    ];

    pub fn descriptor(self) -> &'static EntityDescriptor {
        let index = match self {
            Self::State => 0,
            Self::City => 1,
            Self::User => 2,
            Self::Amenity => 3,
            Self::Place => 4,
            Self::Review => 5,
        };
        &REGISTRY[index]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn table(self) -> &'static str {
        self.descriptor().table
    }

    /// Looks up a kind by its exact registered name.
    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|descriptor| descriptor.name == name)
            .map(|descriptor| descriptor.kind)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Type argument accepted by `Storage::all`.
///
/// `All` is the explicit "every registered type" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Only(EntityKind),
}

impl TypeFilter {
    /// Resolves a type name; names outside the registry fall back to `All`.
    pub fn from_name(name: &str) -> Self {
        EntityKind::from_name(name).map_or(Self::All, Self::Only)
    }

    pub fn matches(self, kind: EntityKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == kind,
        }
    }

    /// Target kinds in registry order.
    pub fn kinds(self) -> impl Iterator<Item = EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(move |kind| self.matches(*kind))
    }
}

impl From<EntityKind> for TypeFilter {
    fn from(value: EntityKind) -> Self {
        Self::Only(value)
    }
}
