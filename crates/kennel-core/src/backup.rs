//! Local JSON backup store.
//!
//! The whole collection lives in one pretty-printed JSON array. Every operation
//! reads the file in full; every mutation rewrites it in full. A missing file or
//! one that is not a JSON array reads as an empty collection. Bad fields inside
//! an entry only affect that entry, and entries that cannot be used are written
//! back untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::pet::{format_intake_date, parse_intake_date};
use crate::models::Pet;

/// One entry of the backup file. Key names are fixed; existing files depend on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupRecord {
    #[serde(default, deserialize_with = "lenient_integer")]
    id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    nombre: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    especie: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    raza: Option<String>,
    #[serde(default, deserialize_with = "lenient_integer")]
    edad: Option<i64>,
    #[serde(default, deserialize_with = "lenient_real")]
    peso: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    fecha_ingreso: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    observaciones: Option<String>,
}

impl BackupRecord {
    fn from_pet(pet: &Pet) -> Self {
        Self {
            id: pet.id,
            nombre: Some(pet.name.clone()),
            especie: pet.species.clone(),
            raza: pet.breed.clone(),
            edad: pet.age,
            peso: pet.weight,
            fecha_ingreso: pet.intake_date.as_ref().map(format_intake_date),
            observaciones: pet.notes.clone(),
        }
    }

    /// The pet this record describes, or `None` when it has no id.
    fn into_pet(self) -> Option<Pet> {
        let id = self.id?;
        let intake_date = self.fecha_ingreso.as_deref().and_then(|text| {
            parse_intake_date(text)
                .map_err(|e| log::warn!("Backup record {}: {}. Leaving it empty.", id, e))
                .ok()
        });

        Some(Pet {
            id: Some(id),
            name: self.nombre.unwrap_or_default(),
            species: self.especie,
            breed: self.raza,
            age: self.edad,
            weight: self.peso,
            intake_date,
            notes: self.observaciones,
        })
    }
}

fn lenient_integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            let parsed = s
                .parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64));
            if parsed.is_none() {
                log::warn!("Ignoring non-integer value '{}' in backup file", s);
            }
            parsed
        }
        Some(other) => {
            log::warn!("Ignoring non-integer value {} in backup file", other);
            None
        }
    };
    Ok(parsed)
}

fn lenient_real<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let parsed = s.trim().parse::<f64>().ok();
            if parsed.is_none() {
                log::warn!("Ignoring non-numeric value '{}' in backup file", s);
            }
            parsed
        }
        Some(other) => {
            log::warn!("Ignoring non-numeric value {} in backup file", other);
            None
        }
    };
    Ok(parsed)
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other @ (Value::Number(_) | Value::Bool(_))) => Some(other.to_string()),
        Some(other) => {
            log::warn!("Ignoring non-text value {} in backup file", other);
            None
        }
    })
}

/// One element of the backup array as read, with the pet it decodes to.
///
/// `raw` is what gets written back, so entries the store cannot use (and keys it
/// does not know) survive a rewrite.
#[derive(Debug, Clone)]
struct Entry {
    raw: Value,
    pet: Option<Pet>,
}

impl Entry {
    fn decode(raw: Value) -> Self {
        let pet = match serde_json::from_value::<BackupRecord>(raw.clone()) {
            Ok(record) => {
                let pet = record.into_pet();
                if pet.is_none() {
                    log::warn!("Skipping backup entry without id: {}", raw);
                }
                pet
            }
            Err(e) => {
                log::warn!("Skipping unusable backup entry {}: {}", raw, e);
                None
            }
        };
        Self { raw, pet }
    }

    fn from_pet(pet: Pet) -> Result<Self> {
        let raw = serde_json::to_value(BackupRecord::from_pet(&pet))?;
        Ok(Self {
            raw,
            pet: Some(pet),
        })
    }

    /// Copy the editable fields of `pet` into this entry. `id` and the intake
    /// date stay as stored.
    fn overlay(&mut self, pet: &Pet) -> Result<()> {
        let Some(current) = self.pet.as_mut() else {
            return Ok(());
        };
        current.name = pet.name.clone();
        current.species = pet.species.clone();
        current.breed = pet.breed.clone();
        current.age = pet.age;
        current.weight = pet.weight;
        current.notes = pet.notes.clone();

        let updated = serde_json::to_value(BackupRecord::from_pet(current))?;
        if let (Value::Object(target), Value::Object(source)) = (&mut self.raw, updated) {
            for (key, value) in source {
                if key != "id" && key != "fecha_ingreso" {
                    target.insert(key, value);
                }
            }
        }
        Ok(())
    }
}

/// File-backed pet store used when the database is unavailable.
#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the backup file as an empty array if it does not exist yet.
    pub fn initialize(&self) -> Result<()> {
        if !self.path.exists() {
            self.write_all(&[])?;
            log::info!("Created empty backup file {}", self.path.display());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry. A missing or malformed file yields an empty collection.
    fn load(&self) -> Vec<Entry> {
        match self.try_load() {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(
                    "Could not read backup file {}: {}. Treating it as empty.",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<Entry>> {
        let text = fs::read_to_string(&self.path)?;
        let values: Vec<Value> = serde_json::from_str(&text)?;
        Ok(values.into_iter().map(Entry::decode).collect())
    }

    /// Usable pets, ascending by id.
    fn read_all(&self) -> Vec<Pet> {
        let mut pets: Vec<Pet> = self.load().into_iter().filter_map(|e| e.pet).collect();
        pets.sort_by_key(|p| p.id);
        pets
    }

    fn write_all(&self, entries: &[Entry]) -> Result<()> {
        let values: Vec<&Value> = entries.iter().map(|e| &e.raw).collect();
        let json = serde_json::to_string_pretty(&values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Store a new pet under `max(id) + 1` (or 1 when empty).
    pub fn create(&self, pet: &Pet) -> Result<Pet> {
        let mut entries = self.load();
        let next_id = entries
            .iter()
            .filter_map(|e| e.pet.as_ref().and_then(|p| p.id))
            .max()
            .unwrap_or(0)
            + 1;

        let created = Pet {
            id: Some(next_id),
            intake_date: Some(pet.intake_date_or_now()),
            ..pet.clone()
        };
        entries.push(Entry::from_pet(created.clone())?);
        self.write_all(&entries)?;
        Ok(created)
    }

    pub fn get_all(&self) -> Vec<Pet> {
        self.read_all()
    }

    pub fn get_by_id(&self, id: i64) -> Option<Pet> {
        self.read_all().into_iter().find(|p| p.id == Some(id))
    }

    /// Pets whose name equals `name` exactly (case-sensitive), ordered by id.
    pub fn find_by_name(&self, name: &str) -> Vec<Pet> {
        self.read_all()
            .into_iter()
            .filter(|p| p.name == name)
            .collect()
    }

    /// Replace every field except `id` and `intake_date`. Returns whether a record matched.
    pub fn update(&self, id: i64, pet: &Pet) -> Result<bool> {
        let mut entries = self.load();
        let Some(existing) = entries.iter_mut().find(|e| has_id(e, id)) else {
            return Ok(false);
        };
        existing.overlay(pet)?;

        self.write_all(&entries)?;
        Ok(true)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|e| !has_id(e, id));
        if entries.len() == before {
            return Ok(false);
        }
        self.write_all(&entries)?;
        Ok(true)
    }
}

fn has_id(entry: &Entry, id: i64) -> bool {
    entry.pet.as_ref().is_some_and(|p| p.id == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (BackupStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("pets_backup.json"));
        (store, dir)
    }

    #[test]
    fn test_initialize_creates_empty_array() {
        let (store, _dir) = store();
        store.initialize().unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.trim(), "[]");
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn test_initialize_keeps_existing_file() {
        let (store, _dir) = store();
        store.create(&Pet::new("Rex".to_string())).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.get_all().len(), 1);
    }

    #[test]
    fn test_ids_follow_max_plus_one() {
        let (store, _dir) = store();
        assert_eq!(store.create(&Pet::new("A".to_string())).unwrap().id, Some(1));
        assert_eq!(store.create(&Pet::new("B".to_string())).unwrap().id, Some(2));
        assert_eq!(store.create(&Pet::new("C".to_string())).unwrap().id, Some(3));
        assert!(store.delete(2).unwrap());
        assert_eq!(store.create(&Pet::new("D".to_string())).unwrap().id, Some(4));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (store, _dir) = store();
        assert!(store.get_all().is_empty());
        assert!(store.get_by_id(1).is_none());
        assert!(!store.delete(1).unwrap());
        assert!(!store.update(1, &Pet::new("X".to_string())).unwrap());
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let (store, _dir) = store();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.get_all().is_empty());
        let created = store.create(&Pet::new("Rex".to_string())).unwrap();
        assert_eq!(created.id, Some(1));
    }

    #[test]
    fn test_file_uses_stable_keys() {
        let (store, _dir) = store();
        let mut pet = Pet::new("Rex".to_string());
        pet.species = Some("dog".to_string());
        pet.age = Some(3);
        pet.weight = Some(12.5);
        store.create(&pet).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains('\n'), "Backup file should be pretty-printed");

        let value: Value = serde_json::from_str(&text).unwrap();
        let entry = &value[0];
        assert_eq!(entry["id"], 1);
        assert_eq!(entry["nombre"], "Rex");
        assert_eq!(entry["especie"], "dog");
        assert_eq!(entry["raza"], Value::Null);
        assert_eq!(entry["edad"], 3);
        assert_eq!(entry["peso"], 12.5);
        assert!(entry["fecha_ingreso"].is_string());
        assert_eq!(entry["observaciones"], Value::Null);
    }

    #[test]
    fn test_reads_loosely_typed_numbers() {
        let (store, _dir) = store();
        fs::write(
            store.path(),
            r#"[
  {"id": "2", "nombre": "Misu", "edad": 4.0, "peso": 3, "fecha_ingreso": "2024-05-01T10:00:00"},
  {"id": 1, "nombre": "Rex", "edad": "7", "peso": "12.5", "fecha_ingreso": null}
]"#,
        )
        .unwrap();

        let pets = store.get_all();
        assert_eq!(pets.len(), 2);
        assert_eq!(pets[0].id, Some(1));
        assert_eq!(pets[0].age, Some(7));
        assert_eq!(pets[0].weight, Some(12.5));
        assert_eq!(pets[0].intake_date, None);
        assert_eq!(pets[1].id, Some(2));
        assert_eq!(pets[1].age, Some(4));
        assert_eq!(pets[1].weight, Some(3.0));
        assert_eq!(
            pets[1].intake_date.map(|d| d.to_string()),
            Some("2024-05-01 10:00:00".to_string())
        );
    }

    #[test]
    fn test_bad_intake_date_only_affects_its_record() {
        let (store, _dir) = store();
        fs::write(
            store.path(),
            r#"[
  {"id": 1, "nombre": "Rex", "fecha_ingreso": "2024-05-01T10:00:00"},
  {"id": 2, "nombre": "Luna", "fecha_ingreso": "01/05/2024"},
  {"id": 3, "nombre": "Milo", "fecha_ingreso": "2024-06-02T09:30:00"}
]"#,
        )
        .unwrap();

        let pets = store.get_all();
        assert_eq!(pets.len(), 3);
        assert_eq!(pets[1].name, "Luna");
        assert_eq!(pets[1].intake_date, None);

        let created = store.create(&Pet::new("Kiwi".to_string())).unwrap();
        assert_eq!(created.id, Some(4));

        let names: Vec<String> = store.get_all().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Rex", "Luna", "Milo", "Kiwi"]);

        let value: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value[1]["fecha_ingreso"], "01/05/2024");
    }

    #[test]
    fn test_entry_without_id_survives_rewrite() {
        let (store, _dir) = store();
        fs::write(
            store.path(),
            r#"[{"nombre": "Ghost"}, {"id": 1, "nombre": "Rex", "edad": "old"}]"#,
        )
        .unwrap();

        let pets = store.get_all();
        assert_eq!(pets.len(), 1);
        assert_eq!(pets[0].name, "Rex");
        assert_eq!(pets[0].age, None);

        assert!(store.delete(1).unwrap());
        let value: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["nombre"], "Ghost");
    }

    #[test]
    fn test_update_keeps_stored_date_and_unknown_keys() {
        let (store, _dir) = store();
        fs::write(
            store.path(),
            r#"[{"id": 1, "nombre": "Rex", "fecha_ingreso": "01/05/2024", "chip": "985112"}]"#,
        )
        .unwrap();

        let mut pet = Pet::new("Max".to_string());
        pet.weight = Some(20.0);
        assert!(store.update(1, &pet).unwrap());

        let value: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value[0]["nombre"], "Max");
        assert_eq!(value[0]["peso"], 20.0);
        assert_eq!(value[0]["fecha_ingreso"], "01/05/2024");
        assert_eq!(value[0]["chip"], "985112");
    }

    #[test]
    fn test_utf8_names_are_written_verbatim() {
        let (store, _dir) = store();
        store.create(&Pet::new("Violène".to_string())).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("Violène"));
        assert_eq!(store.find_by_name("Violène").len(), 1);
    }
}
