//! ---
//! mesh_section: "03-directory-data-access"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Tabular store adapter and domain records."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! Cell-level codec shared by every record type. Booleans are the literal
//! tokens `TRUE`/`FALSE` (read case-insensitively; humans edit these
//! sheets), absent optionals are empty cells rather than any null marker,
//! and timestamps are RFC 3339.

use chrono::{DateTime, Utc};
use opsmesh_common::time::{format_timestamp, parse_timestamp};

/// A single row's decode failure.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    /// A required cell was empty or missing.
    #[error("missing required cell '{column}'")]
    Missing {
        /// Column name from the sheet schema.
        column: &'static str,
    },
    /// A boolean cell held something other than TRUE/FALSE.
    #[error("cell '{column}' is not a boolean: {value:?}")]
    Bool {
        /// Column name from the sheet schema.
        column: &'static str,
        /// Offending cell text.
        value: String,
    },
    /// A timestamp cell failed to parse as RFC 3339.
    #[error("cell '{column}' is not a timestamp: {value:?}")]
    Timestamp {
        /// Column name from the sheet schema.
        column: &'static str,
        /// Offending cell text.
        value: String,
    },
    /// A numeric cell failed to parse.
    #[error("cell '{column}' is not a number: {value:?}")]
    Number {
        /// Column name from the sheet schema.
        column: &'static str,
        /// Offending cell text.
        value: String,
    },
    /// An enumerated cell held an unknown token.
    #[error("cell '{column}' holds unknown token {value:?}")]
    Token {
        /// Column name from the sheet schema.
        column: &'static str,
        /// Offending cell text.
        value: String,
    },
}

/// Boolean serialization tokens.
pub const TRUE_TOKEN: &str = "TRUE";
/// See [`TRUE_TOKEN`].
pub const FALSE_TOKEN: &str = "FALSE";

/// Fetch a cell by index, treating short rows as trailing empty cells.
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// A required, non-empty string cell.
pub fn required(row: &[String], index: usize, column: &'static str) -> Result<String, RowError> {
    let value = cell(row, index).trim();
    if value.is_empty() {
        Err(RowError::Missing { column })
    } else {
        Ok(value.to_owned())
    }
}

/// An optional string cell; empty means absent.
pub fn optional(row: &[String], index: usize) -> Option<String> {
    let value = cell(row, index).trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

/// Serialize an optional string; absent becomes an empty cell.
pub fn optional_cell(value: Option<&str>) -> String {
    value.unwrap_or("").to_owned()
}

/// A boolean cell.
pub fn boolean(row: &[String], index: usize, column: &'static str) -> Result<bool, RowError> {
    let value = cell(row, index).trim();
    if value.eq_ignore_ascii_case(TRUE_TOKEN) {
        Ok(true)
    } else if value.eq_ignore_ascii_case(FALSE_TOKEN) {
        Ok(false)
    } else {
        Err(RowError::Bool {
            column,
            value: value.to_owned(),
        })
    }
}

/// Serialize a boolean cell.
pub fn boolean_cell(value: bool) -> String {
    if value { TRUE_TOKEN } else { FALSE_TOKEN }.to_owned()
}

/// A required timestamp cell.
pub fn timestamp(
    row: &[String],
    index: usize,
    column: &'static str,
) -> Result<DateTime<Utc>, RowError> {
    let value = required(row, index, column)?;
    parse_timestamp(&value).ok_or(RowError::Timestamp { column, value })
}

/// An optional timestamp cell; empty means absent, garbage is an error.
pub fn optional_timestamp(
    row: &[String],
    index: usize,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, RowError> {
    match optional(row, index) {
        None => Ok(None),
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .ok_or(RowError::Timestamp { column, value }),
    }
}

/// Serialize a timestamp cell.
pub fn timestamp_cell(value: DateTime<Utc>) -> String {
    format_timestamp(value)
}

/// Serialize an optional timestamp cell.
pub fn optional_timestamp_cell(value: Option<DateTime<Utc>>) -> String {
    value.map(format_timestamp).unwrap_or_default()
}

/// An optional integer cell.
pub fn optional_i64(
    row: &[String],
    index: usize,
    column: &'static str,
) -> Result<Option<i64>, RowError> {
    match optional(row, index) {
        None => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RowError::Number { column, value }),
    }
}

/// A required integer cell with a default for empty (sheets drop zeros).
pub fn i64_or(
    row: &[String],
    index: usize,
    column: &'static str,
    default: i64,
) -> Result<i64, RowError> {
    Ok(optional_i64(row, index, column)?.unwrap_or(default))
}

/// A JSON cell decoded leniently: empty or malformed text becomes an empty
/// object. Lenience is deliberate; a mangled metadata blob must not make a
/// whole directory row undecodable.
pub fn lenient_json(row: &[String], index: usize) -> serde_json::Value {
    let value = cell(row, index).trim();
    if value.is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
}

/// Serialize a JSON cell compactly; empty objects become empty cells.
pub fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}

/// Whether a raw sheet row is blank (deleted rows read back as empty cells).
pub fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_owned()).collect()
    }

    #[test]
    fn booleans_use_literal_tokens_case_insensitively() {
        assert!(boolean(&row(&["TRUE"]), 0, "is_active").unwrap());
        assert!(boolean(&row(&["true"]), 0, "is_active").unwrap());
        assert!(!boolean(&row(&["False"]), 0, "is_active").unwrap());
        assert!(boolean(&row(&["1"]), 0, "is_active").is_err());
        assert_eq!(boolean_cell(true), "TRUE");
        assert_eq!(boolean_cell(false), "FALSE");
    }

    #[test]
    fn optionals_round_trip_through_empty_cells() {
        assert_eq!(optional(&row(&["", "x"]), 0), None);
        assert_eq!(optional(&row(&["", "x"]), 1).as_deref(), Some("x"));
        assert_eq!(optional_cell(None), "");
        assert_eq!(optional_timestamp_cell(None), "");
        // Short rows read as trailing empties.
        assert_eq!(optional(&row(&["a"]), 5), None);
    }

    #[test]
    fn timestamps_reject_garbage_but_allow_absent() {
        let r = row(&["2026-01-02T03:04:05.000Z", "", "soon"]);
        assert!(timestamp(&r, 0, "created_at").is_ok());
        assert_eq!(optional_timestamp(&r, 1, "expires_at").unwrap(), None);
        assert!(optional_timestamp(&r, 2, "expires_at").is_err());
    }

    #[test]
    fn lenient_json_degrades_to_empty_object() {
        let r = row(&["{\"a\":1}", "not json", ""]);
        assert_eq!(lenient_json(&r, 0)["a"], 1);
        assert!(lenient_json(&r, 1).as_object().unwrap().is_empty());
        assert!(lenient_json(&r, 2).as_object().unwrap().is_empty());
    }

    #[test]
    fn blank_rows_are_detected() {
        assert!(is_blank(&row(&["", " ", ""])));
        assert!(!is_blank(&row(&["", "x"])));
    }
}
