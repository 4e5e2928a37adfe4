//! Domain entities and the closed entity registry.
//!
//! # Responsibility
//! - Define the six HBnB entity records and the tagged `Entity` union.
//! - Own identity-key derivation and the static type registry.
//!
//! # Invariants
//! - Every entity carries a stable `id` assigned at construction.
//! - `IdentityKey` is `<TypeName>.<id>` and is unique per `(type, id)`.
//! - The registry is closed; new types are added here, never discovered.

pub mod entity;
pub mod registry;
