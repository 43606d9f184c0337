//! Reader for the cleaned rating table produced by the ingestion step.
//!
//! The table is a headered CSV. Only the user, item and rating columns are
//! read; any other columns (author, publisher, derived features) are ignored.
//! The table is trusted to be clean already, so a row that still violates
//! the contract is reported instead of repaired.

use bookrec_core::config::DataConfig;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{RatingRecord, RatingScale};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Header names of the three required columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    pub user: String,
    pub item: String,
    pub rating: String,
}

impl Default for TableColumns {
    fn default() -> Self {
        Self {
            user: "User-ID".to_string(),
            item: "Book-Title".to_string(),
            rating: "Book-Rating".to_string(),
        }
    }
}

impl From<&DataConfig> for TableColumns {
    fn from(config: &DataConfig) -> Self {
        Self {
            user: config.user_column.clone(),
            item: config.item_column.clone(),
            rating: config.rating_column.clone(),
        }
    }
}

/// Read the cleaned rating table at `path`.
pub fn read_rating_table<P: AsRef<Path>>(
    path: P,
    columns: &TableColumns,
    scale: RatingScale,
) -> RecResult<Vec<RatingRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let records = read_rating_csv(file, columns, scale)?;
    info!(
        path = %path.display(),
        rows = records.len(),
        "Rating table loaded"
    );
    Ok(records)
}

/// Read a cleaned rating table from any CSV source.
pub fn read_rating_csv<R: Read>(
    source: R,
    columns: &TableColumns,
    scale: RatingScale,
) -> RecResult<Vec<RatingRecord>> {
    let mut reader = csv::Reader::from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| RecError::InvalidInput(format!("failed to read table header: {e}")))?
        .clone();

    let position = |name: &str| -> RecResult<usize> {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            RecError::InvalidInput(format!(
                "required column '{name}' is missing; available columns: {:?}",
                headers.iter().collect::<Vec<_>>()
            ))
        })
    };
    let user_idx = position(&columns.user)?;
    let item_idx = position(&columns.item)?;
    let rating_idx = position(&columns.rating)?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = row + 2;
        let record = result
            .map_err(|e| RecError::InvalidInput(format!("line {line}: malformed row: {e}")))?;

        let user_id = required_field(&record, user_idx, &columns.user, line)?;
        let item_id = required_field(&record, item_idx, &columns.item, line)?;
        let raw_rating = required_field(&record, rating_idx, &columns.rating, line)?;

        let rating: f64 = raw_rating.parse().map_err(|_| {
            RecError::InvalidInput(format!(
                "line {line}: rating '{raw_rating}' is not a number"
            ))
        })?;
        if !scale.contains(rating) {
            return Err(RecError::InvalidInput(format!(
                "line {line}: rating {rating} outside scale [{}, {}]",
                scale.min, scale.max
            )));
        }

        records.push(RatingRecord::new(user_id, item_id, rating));
    }

    Ok(records)
}

fn required_field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
    line: usize,
) -> RecResult<&'r str> {
    match record.get(idx).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RecError::InvalidInput(format!(
            "line {line}: column '{name}' is empty"
        ))),
    }
}

/// Distinct item identifiers in first-occurrence order.
pub fn catalog_from_records(records: &[RatingRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.item_id.as_str()))
        .map(|r| r.item_id.clone())
        .collect()
}
