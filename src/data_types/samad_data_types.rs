use std::collections::{btree_map, BTreeMap};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::errors::Rejection;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MealTime {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealTime {
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(MealTime::Breakfast),
            1 => Some(MealTime::Lunch),
            2 => Some(MealTime::Dinner),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum MealStatus {
    Reservable,
    Reserved,
    /// another meal of the same slot is already reserved
    SecondOptionReserved,
    Unavailable,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MealEntry {
    /// only valid within the page it was scraped from
    pub id: String,
    pub name: String,
    pub side_dish: Option<String>,
    /// Rial
    pub price: i64,
    pub meal_time: MealTime,
    pub date: DateTime<FixedOffset>,
    pub status: MealStatus,
}

/// A meal entry plus the form fields bound to its row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReserveRow {
    pub entry: MealEntry,
    pub checked: bool,
    pub disabled: bool,
    pub checkbox_field: String,
    pub count_field: Option<String>,
    pub select_field: Option<String>,
}

/// Every field needed to resubmit a reservation page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSnapshot(BTreeMap<String, String>);

impl FormSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// `application/x-www-form-urlencoded` body
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }

    pub fn from_encoded(body: &str) -> Self {
        Self(
            form_urlencoded::parse(body.as_bytes())
                .into_owned()
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a FormSnapshot {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome {
    pub toggled: bool,
    pub rejection: Option<Rejection>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub student_id: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("student_id", &self.student_id)
            .finish_non_exhaustive()
    }
}
