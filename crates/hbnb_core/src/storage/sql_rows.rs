//! Row mapping between entity records and their SQLite tables.
//!
//! # Invariants
//! - Writes are upserts keyed by `id`; an upsert never fires delete cascades.
//! - Place amenity links are replaced as a whole on every place upsert.
//! - Reads return amenity ids sorted, matching `Entity::normalize`.

use crate::db::migrations::PLACE_AMENITY_TABLE;
use crate::model::entity::{
    Amenity, BaseFields, City, Entity, Place, Review, State, User,
};
use crate::model::registry::EntityKind;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;

/// Loads every row of `kind`'s table.
pub(crate) fn select_all(conn: &Connection, kind: EntityKind) -> rusqlite::Result<Vec<Entity>> {
    let amenity_links = if kind == EntityKind::Place {
        load_amenity_links(conn)?
    } else {
        BTreeMap::new()
    };

    let mut stmt = conn.prepare(&format!("SELECT * FROM {};", kind.table()))?;
    let mut rows = stmt.query([])?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        let entity = match kind {
            EntityKind::State => Entity::State(State {
                base: parse_base(row)?,
                name: row.get("name")?,
            }),
            EntityKind::City => Entity::City(City {
                base: parse_base(row)?,
                state_id: row.get("state_id")?,
                name: row.get("name")?,
            }),
            EntityKind::User => Entity::User(User {
                base: parse_base(row)?,
                email: row.get("email")?,
                password: row.get("password")?,
                first_name: row.get("first_name")?,
                last_name: row.get("last_name")?,
            }),
            EntityKind::Amenity => Entity::Amenity(Amenity {
                base: parse_base(row)?,
                name: row.get("name")?,
            }),
            EntityKind::Place => {
                let base = parse_base(row)?;
                let amenity_ids = amenity_links.get(&base.id).cloned().unwrap_or_default();
                Entity::Place(Place {
                    base,
                    city_id: row.get("city_id")?,
                    user_id: row.get("user_id")?,
                    name: row.get("name")?,
                    description: row.get("description")?,
                    number_rooms: row.get("number_rooms")?,
                    number_bathrooms: row.get("number_bathrooms")?,
                    max_guest: row.get("max_guest")?,
                    price_by_night: row.get("price_by_night")?,
                    latitude: row.get("latitude")?,
                    longitude: row.get("longitude")?,
                    amenity_ids,
                })
            }
            EntityKind::Review => Entity::Review(Review {
                base: parse_base(row)?,
                place_id: row.get("place_id")?,
                user_id: row.get("user_id")?,
                text: row.get("text")?,
            }),
        };
        entities.push(entity);
    }

    Ok(entities)
}

/// Inserts or updates one entity row.
pub(crate) fn upsert(conn: &Connection, entity: &Entity) -> rusqlite::Result<()> {
    match entity {
        Entity::State(state) => {
            conn.execute(
                "INSERT INTO states (id, created_at, updated_at, name)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    name = excluded.name;",
                params![
                    state.base.id,
                    state.base.created_at,
                    state.base.updated_at,
                    state.name,
                ],
            )?;
        }
        Entity::City(city) => {
            conn.execute(
                "INSERT INTO cities (id, created_at, updated_at, state_id, name)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (id) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    state_id = excluded.state_id,
                    name = excluded.name;",
                params![
                    city.base.id,
                    city.base.created_at,
                    city.base.updated_at,
                    city.state_id,
                    city.name,
                ],
            )?;
        }
        Entity::User(user) => {
            conn.execute(
                "INSERT INTO users (
                    id, created_at, updated_at, email, password, first_name, last_name
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (id) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    email = excluded.email,
                    password = excluded.password,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name;",
                params![
                    user.base.id,
                    user.base.created_at,
                    user.base.updated_at,
                    user.email,
                    user.password,
                    user.first_name,
                    user.last_name,
                ],
            )?;
        }
        Entity::Amenity(amenity) => {
            conn.execute(
                "INSERT INTO amenities (id, created_at, updated_at, name)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    name = excluded.name;",
                params![
                    amenity.base.id,
                    amenity.base.created_at,
                    amenity.base.updated_at,
                    amenity.name,
                ],
            )?;
        }
        Entity::Place(place) => {
            conn.execute(
                "INSERT INTO places (
                    id, created_at, updated_at, city_id, user_id, name, description,
                    number_rooms, number_bathrooms, max_guest, price_by_night,
                    latitude, longitude
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT (id) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    city_id = excluded.city_id,
                    user_id = excluded.user_id,
                    name = excluded.name,
                    description = excluded.description,
                    number_rooms = excluded.number_rooms,
                    number_bathrooms = excluded.number_bathrooms,
                    max_guest = excluded.max_guest,
                    price_by_night = excluded.price_by_night,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude;",
                params![
                    place.base.id,
                    place.base.created_at,
                    place.base.updated_at,
                    place.city_id,
                    place.user_id,
                    place.name,
                    place.description,
                    place.number_rooms,
                    place.number_bathrooms,
                    place.max_guest,
                    place.price_by_night,
                    place.latitude,
                    place.longitude,
                ],
            )?;
            replace_amenity_links(conn, place)?;
        }
        Entity::Review(review) => {
            conn.execute(
                "INSERT INTO reviews (id, created_at, updated_at, place_id, user_id, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    place_id = excluded.place_id,
                    user_id = excluded.user_id,
                    text = excluded.text;",
                params![
                    review.base.id,
                    review.base.created_at,
                    review.base.updated_at,
                    review.place_id,
                    review.user_id,
                    review.text,
                ],
            )?;
        }
    }
    Ok(())
}

/// Deletes one entity row; returns the number of rows removed (0 or 1).
pub(crate) fn delete(conn: &Connection, kind: EntityKind, id: &str) -> rusqlite::Result<usize> {
    conn.execute(&format!("DELETE FROM {} WHERE id = ?1;", kind.table()), [id])
}

fn parse_base(row: &Row<'_>) -> rusqlite::Result<BaseFields> {
    Ok(BaseFields {
        id: row.get("id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn replace_amenity_links(conn: &Connection, place: &Place) -> rusqlite::Result<()> {
    conn.execute(
        &format!("DELETE FROM {PLACE_AMENITY_TABLE} WHERE place_id = ?1;"),
        [place.base.id.as_str()],
    )?;
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {PLACE_AMENITY_TABLE} (place_id, amenity_id) VALUES (?1, ?2);"
    ))?;
    for amenity_id in &place.amenity_ids {
        stmt.execute([place.base.id.as_str(), amenity_id.as_str()])?;
    }
    Ok(())
}

fn load_amenity_links(conn: &Connection) -> rusqlite::Result<BTreeMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT place_id, amenity_id
         FROM {PLACE_AMENITY_TABLE}
         ORDER BY place_id ASC, amenity_id ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut links: BTreeMap<String, Vec<String>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let place_id: String = row.get(0)?;
        let amenity_id: String = row.get(1)?;
        links.entry(place_id).or_default().push(amenity_id);
    }
    Ok(links)
}
