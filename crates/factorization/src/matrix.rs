//! Sparse rating matrix: dense index maps plus (user, item, rating) triples.

use crate::table::{read_rating_table, TableColumns};
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{RatingRecord, RatingScale};
use std::collections::HashMap;
use std::path::Path;

/// Bijection between opaque identifiers and dense indices `0..len`.
///
/// Indices are assigned in first-insertion order, so two builds over the same
/// input sequence produce the same mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdIndex {
    ids: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from an ordered identifier list. Fails on duplicates.
    pub fn from_ids(ids: Vec<String>) -> Result<Self, String> {
        let mut lookup = HashMap::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            if lookup.insert(id.clone(), idx).is_some() {
                return Err(format!("duplicate identifier '{id}'"));
            }
        }
        Ok(Self { ids, lookup })
    }

    pub fn get_or_insert(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.lookup.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_string());
        self.lookup.insert(id.to_string(), idx);
        idx
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.lookup.get(id).copied()
    }

    pub fn id_of(&self, idx: usize) -> Option<&str> {
        self.ids.get(idx).map(String::as_str)
    }

    /// Identifiers ordered by index.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingTriple {
    pub user: usize,
    pub item: usize,
    pub rating: f64,
}

/// Internal representation consumed by the trainer.
#[derive(Debug, Clone)]
pub struct RatingMatrix {
    users: IdIndex,
    items: IdIndex,
    triples: Vec<RatingTriple>,
}

impl RatingMatrix {
    /// Build index maps and triples from a record sequence.
    ///
    /// Accepts any iterator of borrowed records so cross-validation folds can
    /// be built from index subsets without cloning the corpus.
    pub fn build<'a, I>(records: I) -> RecResult<Self>
    where
        I: IntoIterator<Item = &'a RatingRecord>,
    {
        let mut users = IdIndex::new();
        let mut items = IdIndex::new();
        let mut triples = Vec::new();

        for (row, record) in records.into_iter().enumerate() {
            if record.user_id.is_empty() || record.item_id.is_empty() {
                return Err(RecError::InvalidInput(format!(
                    "record {row}: empty user or item identifier"
                )));
            }
            if !record.rating.is_finite() {
                return Err(RecError::InvalidInput(format!(
                    "record {row}: rating is not finite"
                )));
            }
            triples.push(RatingTriple {
                user: users.get_or_insert(&record.user_id),
                item: items.get_or_insert(&record.item_id),
                rating: record.rating,
            });
        }

        if triples.is_empty() {
            return Err(RecError::InvalidInput("rating table has no rows".into()));
        }

        Ok(Self {
            users,
            items,
            triples,
        })
    }

    /// Read the rating table at `path` and build the matrix from it.
    pub fn from_table<P: AsRef<Path>>(
        path: P,
        columns: &TableColumns,
        scale: RatingScale,
    ) -> RecResult<Self> {
        let records = read_rating_table(path, columns, scale)?;
        Self::build(&records)
    }

    pub fn users(&self) -> &IdIndex {
        &self.users
    }

    pub fn items(&self) -> &IdIndex {
        &self.items
    }

    pub fn triples(&self) -> &[RatingTriple] {
        &self.triples
    }

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    pub fn n_ratings(&self) -> usize {
        self.triples.len()
    }

    /// Mean of all observed ratings.
    pub fn global_mean(&self) -> f64 {
        self.triples.iter().map(|t| t.rating).sum::<f64>() / self.triples.len() as f64
    }

    pub fn into_parts(self) -> (IdIndex, IdIndex, Vec<RatingTriple>) {
        (self.users, self.items, self.triples)
    }
}
