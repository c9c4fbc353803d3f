use std::path::Path;

use csv::{ReaderBuilder, Trim};
use log::{info, warn};
use serde::Deserialize;

use super::DatabaseResult;
use crate::record::Record;

/// One line of the ratings dump
#[derive(Debug, Deserialize)]
struct RatingRow {
    tconst: String,
    #[serde(rename = "averageRating")]
    average_rating: f32,
    #[serde(rename = "numVotes")]
    num_votes: i32,
}

/// Read a tab-separated ratings file with a `tconst averageRating numVotes` header
///
/// Rows that fail to parse or to validate are skipped.
pub fn load_tsv(path: impl AsRef<Path>) -> DatabaseResult<Vec<Record>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (line, row) in reader.deserialize::<RatingRow>().enumerate() {
        // Header is line 1
        let line = line + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping line {}: {}", line, e);
                skipped += 1;
                continue;
            }
        };

        match Record::new(row.tconst, row.average_rating, row.num_votes) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("skipping line {}: {}", line, e);
                skipped += 1;
            }
        }
    }

    info!(
        "loaded {} records from {} ({} skipped)",
        records.len(),
        path.display(),
        skipped
    );
    Ok(records)
}
