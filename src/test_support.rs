#![cfg(test)]

// Shared fixtures for unit tests.
use serde::{Deserialize, Serialize};

use crate::client::{Client, Model};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: i32,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self {
        Self { name: name.to_string(), age }
    }
}

impl Model for Person {
    fn collection_name() -> &'static str {
        "people"
    }
}

/// Memory client whose `people` collection holds Ann (25), Bob (30) and Cid (35).
pub fn seeded_people() -> Client {
    let c = Client::memory();
    let people = [Person::new("Ann", 25), Person::new("Bob", 30), Person::new("Cid", 35)];
    c.model::<Person>().create_many(&people).unwrap_or_else(|e| panic!("seeding people: {e}"));
    c
}
