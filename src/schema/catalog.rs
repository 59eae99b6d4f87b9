// src/schema/catalog.rs

use serde::Serialize;

use super::table::Table;

/// Tables of one schema dump, keyed by name and kept in dump order.
#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Catalog {
    tables: Vec<Table>,
}

impl Catalog {
    /// Insert a table; a table with the same name is replaced in place.
    pub fn insert(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name() == table.name()) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Remove and return a table, e.g. to apply overrides to it.
    pub fn take(&mut self, name: &str) -> Option<Table> {
        let idx = self.tables.iter().position(|t| t.name() == name)?;
        Some(self.tables.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(Table::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl IntoIterator for Catalog {
    type Item = Table;
    type IntoIter = std::vec::IntoIter<Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}
