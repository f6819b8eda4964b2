//! SQLSTATE classification.
//!
//! Maps the five-character status code reported by the server onto the
//! [`DbError`] taxonomy.

use crate::error::DbError;

/// unique_violation
pub const CODE_DUPLICATE_ENTRY: &str = "23505";
/// undefined_table
pub const CODE_UNDEFINED_TABLE: &str = "42P01";
/// duplicate_table
pub const CODE_DUPLICATE_TABLE: &str = "42P07";
/// duplicate_object
pub const CODE_DUPLICATE_TYPE: &str = "42710";

/// Classify a provider error code and message.
///
/// Unknown codes keep both values in [`DbError::Query`]; the caller attaches
/// the query text.
pub fn classify(code: &str, message: &str) -> DbError {
    let message = message.to_string();
    match code {
        CODE_DUPLICATE_ENTRY => DbError::DuplicateEntry { message },
        CODE_UNDEFINED_TABLE => DbError::UndefinedTable { message },
        CODE_DUPLICATE_TABLE => DbError::DuplicateTable { message },
        CODE_DUPLICATE_TYPE => DbError::DuplicateType { message },
        _ => DbError::query(code, message),
    }
}
