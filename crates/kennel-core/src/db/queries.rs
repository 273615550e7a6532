use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Row, Transaction};

use crate::error::{KennelError, Result};
use crate::models::pet::{format_intake_date, parse_intake_date};
use crate::models::Pet;

const PET_SELECT_SQL: &str =
    "SELECT id, name, species, breed, age, weight, intake_date, notes FROM pets";

/// Run `f` inside a transaction. Commits on success; on failure the transaction is
/// rolled back before the error is returned.
fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction()?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("Rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Insert a pet. `intake_date` defaults to now. Returns the pet with its new id.
pub fn insert_pet(conn: &mut Connection, pet: &Pet) -> Result<Pet> {
    let intake_date = pet.intake_date_or_now();
    let id = in_transaction(conn, |tx| {
        tx.execute(
            "INSERT INTO pets (name, species, breed, age, weight, intake_date, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pet.name,
                pet.species,
                pet.breed,
                pet.age,
                pet.weight,
                format_intake_date(&intake_date),
                pet.notes,
            ],
        )?;
        Ok(tx.last_insert_rowid())
    })?;

    Ok(Pet {
        id: Some(id),
        intake_date: Some(intake_date),
        ..pet.clone()
    })
}

/// List all pets ordered by id.
pub fn list_pets(conn: &Connection) -> Result<Vec<Pet>> {
    let mut stmt = conn.prepare(&format!("{PET_SELECT_SQL} ORDER BY id"))?;
    let mut rows = stmt.query([])?;
    let mut pets = Vec::new();
    while let Some(row) = rows.next()? {
        pets.push(parse_pet_row(row)?);
    }
    Ok(pets)
}

pub fn get_pet(conn: &Connection, id: i64) -> Result<Option<Pet>> {
    let mut stmt = conn.prepare(&format!("{PET_SELECT_SQL} WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_pet_row(row)?)),
        None => Ok(None),
    }
}

/// Pets whose name equals `name` exactly (case-sensitive), ordered by id.
pub fn find_pets_by_name(conn: &Connection, name: &str) -> Result<Vec<Pet>> {
    let mut stmt = conn.prepare(&format!("{PET_SELECT_SQL} WHERE name = ?1 ORDER BY id"))?;
    let mut rows = stmt.query(params![name])?;
    let mut pets = Vec::new();
    while let Some(row) = rows.next()? {
        pets.push(parse_pet_row(row)?);
    }
    Ok(pets)
}

/// Replace every field except `id` and `intake_date`. Returns whether a row matched.
pub fn update_pet(conn: &mut Connection, id: i64, pet: &Pet) -> Result<bool> {
    in_transaction(conn, |tx| {
        let changed = tx.execute(
            "UPDATE pets
             SET name = ?1, species = ?2, breed = ?3, age = ?4, weight = ?5, notes = ?6
             WHERE id = ?7",
            params![pet.name, pet.species, pet.breed, pet.age, pet.weight, pet.notes, id],
        )?;
        Ok(changed > 0)
    })
}

pub fn delete_pet(conn: &mut Connection, id: i64) -> Result<bool> {
    in_transaction(conn, |tx| {
        let changed = tx.execute("DELETE FROM pets WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

fn parse_pet_row(row: &Row<'_>) -> Result<Pet> {
    let intake_date = match row.get::<_, Option<String>>(6)? {
        Some(text) => Some(parse_intake_date(&text)?),
        None => None,
    };

    Ok(Pet {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        species: row.get(2)?,
        breed: row.get(3)?,
        age: coerce_integer(row.get_ref(4)?, "age")?,
        weight: coerce_real(row.get_ref(5)?, "weight")?,
        intake_date,
        notes: row.get(7)?,
    })
}

// Column affinity does not guarantee the storage class, so numeric columns are
// read by value and converted to the declared type.
fn coerce_integer(value: ValueRef<'_>, column: &str) -> Result<Option<i64>> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i)),
        ValueRef::Real(f) => Ok(Some(f.trunc() as i64)),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|f| f.trunc() as i64))
                .map(Some)
                .ok_or_else(|| KennelError::Data(format!("Bad {} value '{}'", column, text)))
        }
        ValueRef::Blob(_) => Err(KennelError::Data(format!("Bad {} value: blob", column))),
    }
}

fn coerce_real(value: ValueRef<'_>, column: &str) -> Result<Option<f64>> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i as f64)),
        ValueRef::Real(f) => Ok(Some(f)),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            text.trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| KennelError::Data(format!("Bad {} value '{}'", column, text)))
        }
        ValueRef::Blob(_) => Err(KennelError::Data(format!("Bad {} value: blob", column))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::create_tables(&conn).unwrap();
        conn
    }

    fn rex() -> Pet {
        Pet {
            species: Some("dog".to_string()),
            age: Some(3),
            weight: Some(12.5),
            ..Pet::new("Rex".to_string())
        }
    }

    #[test]
    fn test_insert_assigns_id_and_intake_date() {
        let mut conn = open();
        let created = insert_pet(&mut conn, &rex()).unwrap();
        assert_eq!(created.id, Some(1));
        assert!(created.intake_date.is_some());

        let second = insert_pet(&mut conn, &Pet::new("Misu".to_string())).unwrap();
        assert_eq!(second.id, Some(2));
    }

    #[test]
    fn test_insert_then_get_round_trip() {
        let mut conn = open();
        let created = insert_pet(&mut conn, &rex()).unwrap();
        let fetched = get_pet(&conn, created.id.unwrap()).unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_get_missing_is_none() {
        let conn = open();
        assert!(get_pet(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_list_ordered_by_id() {
        let mut conn = open();
        for name in ["C", "A", "B"] {
            insert_pet(&mut conn, &Pet::new(name.to_string())).unwrap();
        }
        let ids: Vec<i64> = list_pets(&conn)
            .unwrap()
            .iter()
            .filter_map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_update_keeps_intake_date() {
        let mut conn = open();
        let created = insert_pet(&mut conn, &rex()).unwrap();
        let id = created.id.unwrap();

        let mut changed = Pet::new("Rex II".to_string());
        changed.weight = Some(14.0);
        changed.intake_date = chrono::NaiveDate::from_ymd_opt(1999, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0);
        assert!(update_pet(&mut conn, id, &changed).unwrap());

        let fetched = get_pet(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.name, "Rex II");
        assert_eq!(fetched.species, None);
        assert_eq!(fetched.age, None);
        assert_eq!(fetched.weight, Some(14.0));
        assert_eq!(fetched.intake_date, created.intake_date);

        assert!(!update_pet(&mut conn, 99, &changed).unwrap());
    }

    #[test]
    fn test_delete() {
        let mut conn = open();
        let created = insert_pet(&mut conn, &rex()).unwrap();
        assert!(!delete_pet(&mut conn, 99).unwrap());
        assert!(delete_pet(&mut conn, created.id.unwrap()).unwrap());
        assert!(get_pet(&conn, created.id.unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_find_by_name_is_exact() {
        let mut conn = open();
        insert_pet(&mut conn, &rex()).unwrap();
        insert_pet(&mut conn, &Pet::new("rex".to_string())).unwrap();
        insert_pet(&mut conn, &Pet::new("Rex".to_string())).unwrap();

        let found = find_pets_by_name(&conn, "Rex").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, Some(1));
        assert_eq!(found[1].id, Some(3));
        assert!(find_pets_by_name(&conn, "Re").unwrap().is_empty());
    }

    #[test]
    fn test_numeric_columns_are_coerced() {
        let conn = open();
        // Values written with a type other than the declared one.
        conn.execute(
            "INSERT INTO pets (name, age, weight) VALUES ('Odd', '4', '7')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO pets (name, age, weight) VALUES ('Odder', 5.9, 8)",
            [],
        )
        .unwrap();

        let pets = list_pets(&conn).unwrap();
        assert_eq!(pets[0].age, Some(4));
        assert_eq!(pets[0].weight, Some(7.0));
        assert_eq!(pets[1].age, Some(5));
        assert_eq!(pets[1].weight, Some(8.0));
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let mut conn = open();
        let result: Result<()> = in_transaction(&mut conn, |tx| {
            tx.execute("INSERT INTO pets (name) VALUES ('Ghost')", [])?;
            tx.execute("INSERT INTO pets (name) VALUES (NULL)", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(list_pets(&conn).unwrap().is_empty());
    }
}
