//! Typed records for every table the application reads or writes.
//!
//! Rows arrive from the hosted backend as loose JSON. They are decoded here,
//! at the boundary, and anything that does not match the expected shape is
//! rejected instead of being passed further into the application.

pub mod application;
pub mod auth;
pub mod calendar;
pub mod listing;
pub mod payment;
pub mod profile;
pub mod quote;
pub mod tier;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// A row type bound to the table it is stored in.
pub trait Record: DeserializeOwned {
    const TABLE: &'static str;
}

#[derive(Debug, Error)]
#[error("malformed {table} row: {source}")]
pub struct RowError {
    pub table: &'static str,
    pub source: serde_json::Error,
}

/// Decodes a single row, rejecting it if it does not match `T`.
pub fn decode_row<T: Record>(row: Value) -> Result<T, RowError> {
    serde_json::from_value(row).map_err(|source| RowError {
        table: T::TABLE,
        source,
    })
}

/// Decodes a result set, dropping (and logging) rows that fail validation.
pub fn decode_rows<T: Record>(rows: Vec<Value>) -> Vec<T> {
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .filter_map(|row| match decode_row::<T>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table = T::TABLE, error = %e, "Dropping row that failed shape validation");
                None
            }
        })
        .collect();

    if decoded.len() != total {
        warn!(
            table = T::TABLE,
            kept = decoded.len(),
            rejected = total - decoded.len(),
            "Some rows were rejected"
        );
    }
    decoded
}
