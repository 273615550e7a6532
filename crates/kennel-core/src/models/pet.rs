use chrono::{Local, NaiveDateTime};

use crate::error::{KennelError, Result};

/// Text layout used for `intake_date` in both backends.
pub const INTAKE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq)]
pub struct Pet {
    pub id: Option<i64>,
    pub name: String,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub age: Option<i64>,
    pub weight: Option<f64>,
    pub intake_date: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

impl Pet {
    pub fn new(name: String) -> Self {
        Self {
            id: None,
            name,
            species: None,
            breed: None,
            age: None,
            weight: None,
            intake_date: None,
            notes: None,
        }
    }

    /// The stored intake date, or the current local time for a record being created.
    pub fn intake_date_or_now(&self) -> NaiveDateTime {
        self.intake_date
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

pub fn format_intake_date(date: &NaiveDateTime) -> String {
    date.format(INTAKE_DATE_FORMAT).to_string()
}

/// Parse a stored intake date. Accepts a trailing offset or a plain date as well,
/// since backup files may have been edited by hand.
pub fn parse_intake_date(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, INTAKE_DATE_FORMAT) {
        return Ok(dt);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt);
    }
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| KennelError::Data(format!("Bad intake date '{}'", text)))
}

/// Loosely-typed pet fields as they arrive from a form or command line.
///
/// `id` and `intake_date` are not part of the input: the first is assigned by the
/// backend, the second is set once at creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PetInput {
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub age: Option<i64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl PetInput {
    /// Validate the input and build a `Pet` carrying the given id.
    ///
    /// Blank optional text fields are stored as absent.
    pub fn into_pet(self, id: Option<i64>) -> Result<Pet> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(KennelError::MissingField("name"))?;

        Ok(Pet {
            id,
            name,
            species: non_blank(self.species),
            breed: non_blank(self.breed),
            age: self.age,
            weight: self.weight,
            intake_date: None,
            notes: non_blank(self.notes),
        })
    }
}

impl From<&Pet> for PetInput {
    fn from(pet: &Pet) -> Self {
        Self {
            name: Some(pet.name.clone()),
            species: pet.species.clone(),
            breed: pet.breed.clone(),
            age: pet.age,
            weight: pet.weight,
            notes: pet.notes.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
