//! Source-to-PostgreSQL type mapping and per-value transforms.
//!
//! Every source column maps to a PostgreSQL type name plus a [`Transform`]
//! applied to each raw value before it is rendered on the COPY stream. The
//! mapping is pure and deterministic; unmapped type tags fall back to
//! `text` with the identity transform.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDate;
use thiserror::Error;

use crate::core::schema::{Column, TypeTag};
use crate::core::value::SqlValue;

/// A per-value conversion failed; the owning row is rejected, the stream
/// continues.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid date {value:?}, expected YYYYMMDD")]
    Date { value: String },

    #[error("invalid numeric literal {value:?}")]
    Numeric { value: String },
}

/// A pure conversion from a raw source value to a value the sink can render.
///
/// Transforms are stateless and total over NULL: every variant maps
/// `SqlValue::Null` to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Pass the value through unchanged.
    Identity,

    /// Strip trailing spaces from fixed-width text fields. Idempotent.
    RightTrim,

    /// Trim a numeric field; all-blank becomes NULL, anything that does not
    /// parse as a number is an error.
    NumericTrim,

    /// dBase logical field: `Y`/`y`/`T`/`t` is true, `N`/`n`/`F`/`f` is
    /// false, `?` and blank are NULL.
    DbfLogical,

    /// dBase date field: `YYYYMMDD` text to a date value, blank to NULL.
    DbfDate,

    /// Base64-decode text destined for a `bytea` column; raw bytes pass
    /// through untouched.
    Base64Blob,
}

impl Transform {
    /// Apply the transform to one value.
    pub fn apply(&self, value: SqlValue) -> Result<SqlValue, TransformError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match self {
            Transform::Identity => Ok(value),

            Transform::RightTrim => Ok(match value {
                SqlValue::Text(s) => SqlValue::Text(s.trim_end_matches(' ').to_string()),
                other => other,
            }),

            Transform::NumericTrim => match value {
                SqlValue::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        Ok(SqlValue::Null)
                    } else if trimmed.parse::<f64>().is_ok() {
                        Ok(SqlValue::Text(trimmed.to_string()))
                    } else {
                        Err(TransformError::Numeric { value: s })
                    }
                }
                other => Ok(other),
            },

            Transform::DbfLogical => match value {
                SqlValue::Text(s) => Ok(match s.trim() {
                    "Y" | "y" | "T" | "t" => SqlValue::Bool(true),
                    "N" | "n" | "F" | "f" => SqlValue::Bool(false),
                    _ => SqlValue::Null,
                }),
                other => Ok(other),
            },

            Transform::DbfDate => match value {
                SqlValue::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() || trimmed.chars().all(|c| c == '0') {
                        Ok(SqlValue::Null)
                    } else {
                        NaiveDate::parse_from_str(trimmed, "%Y%m%d")
                            .map(SqlValue::Date)
                            .map_err(|_| TransformError::Date { value: s })
                    }
                }
                other => Ok(other),
            },

            Transform::Base64Blob => match value {
                SqlValue::Text(s) => Ok(SqlValue::Bytes(BASE64.decode(s.trim())?)),
                other => Ok(other),
            },
        }
    }
}

/// Map a discovered column to its PostgreSQL type and default transform.
pub fn map_column(col: &Column) -> (String, Transform) {
    match &col.tag {
        TypeTag::Dbf(tag) => map_dbf_type(*tag),
        TypeTag::Sqlite(decl) => map_sqlite_type(decl),
    }
}

/// DBF field-type mapping.
pub fn map_dbf_type(tag: char) -> (String, Transform) {
    match tag.to_ascii_uppercase() {
        'C' => ("text".to_string(), Transform::RightTrim),
        'N' => ("numeric".to_string(), Transform::NumericTrim),
        'F' => ("double precision".to_string(), Transform::NumericTrim),
        'L' => ("boolean".to_string(), Transform::DbfLogical),
        'D' => ("date".to_string(), Transform::DbfDate),
        'M' => ("text".to_string(), Transform::Identity),
        _ => ("text".to_string(), Transform::Identity),
    }
}

/// SQLite declared-type mapping, following SQLite's affinity rules.
///
/// The declared type is free text in SQLite; affinity is decided by
/// substring, in the order the SQLite documentation prescribes. Columns with
/// BLOB affinity get the base64 transform so that blobs exported as text
/// survive the trip.
pub fn map_sqlite_type(decl: &str) -> (String, Transform) {
    let upper = decl.to_uppercase();

    if upper.contains("INT") {
        ("bigint".to_string(), Transform::Identity)
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        ("text".to_string(), Transform::Identity)
    } else if upper.is_empty() || upper.contains("BLOB") {
        ("bytea".to_string(), Transform::Base64Blob)
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        ("double precision".to_string(), Transform::Identity)
    } else if upper.contains("BOOL") {
        ("boolean".to_string(), Transform::Identity)
    } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        ("timestamptz".to_string(), Transform::Identity)
    } else if upper.contains("DATE") {
        ("date".to_string(), Transform::Identity)
    } else {
        ("numeric".to_string(), Transform::Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_trim_idempotent() {
        let once = Transform::RightTrim
            .apply(SqlValue::Text("Alice     ".into()))
            .unwrap();
        assert_eq!(once, SqlValue::Text("Alice".into()));
        let twice = Transform::RightTrim.apply(once).unwrap();
        assert_eq!(twice, SqlValue::Text("Alice".into()));
    }

    #[test]
    fn test_right_trim_keeps_interior_spaces() {
        let v = Transform::RightTrim
            .apply(SqlValue::Text("a b  ".into()))
            .unwrap();
        assert_eq!(v, SqlValue::Text("a b".into()));
    }

    #[test]
    fn test_dbf_date_formats() {
        let v = Transform::DbfDate
            .apply(SqlValue::Text("20200301".into()))
            .unwrap();
        assert_eq!(
            v,
            SqlValue::Date(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_dbf_date_blank_is_null() {
        assert_eq!(
            Transform::DbfDate.apply(SqlValue::Text("".into())).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            Transform::DbfDate
                .apply(SqlValue::Text("        ".into()))
                .unwrap(),
            SqlValue::Null
        );
        // All-zero dates show up in real DBF files for "no date".
        assert_eq!(
            Transform::DbfDate
                .apply(SqlValue::Text("00000000".into()))
                .unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_dbf_date_invalid_is_error() {
        assert!(Transform::DbfDate
            .apply(SqlValue::Text("20201501".into()))
            .is_err());
    }

    #[test]
    fn test_dbf_logical() {
        let l = Transform::DbfLogical;
        assert_eq!(l.apply(SqlValue::Text("Y".into())).unwrap(), SqlValue::Bool(true));
        assert_eq!(l.apply(SqlValue::Text("t".into())).unwrap(), SqlValue::Bool(true));
        assert_eq!(l.apply(SqlValue::Text("N".into())).unwrap(), SqlValue::Bool(false));
        assert_eq!(l.apply(SqlValue::Text("?".into())).unwrap(), SqlValue::Null);
        assert_eq!(l.apply(SqlValue::Text(" ".into())).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_numeric_trim() {
        let n = Transform::NumericTrim;
        assert_eq!(
            n.apply(SqlValue::Text(" 42".into())).unwrap(),
            SqlValue::Text("42".into())
        );
        assert_eq!(n.apply(SqlValue::Text("   ".into())).unwrap(), SqlValue::Null);
        assert_eq!(
            n.apply(SqlValue::Text("-3.25".into())).unwrap(),
            SqlValue::Text("-3.25".into())
        );
        assert!(n.apply(SqlValue::Text("4x2".into())).is_err());
    }

    #[test]
    fn test_base64_blob_roundtrip() {
        let payload: Vec<u8> = vec![0, 1, 2, 255, 254];
        let encoded = BASE64.encode(&payload);
        let v = Transform::Base64Blob
            .apply(SqlValue::Text(encoded))
            .unwrap();
        assert_eq!(v, SqlValue::Bytes(payload));
    }

    #[test]
    fn test_base64_blob_passes_raw_bytes() {
        let v = Transform::Base64Blob
            .apply(SqlValue::Bytes(vec![1, 2, 3]))
            .unwrap();
        assert_eq!(v, SqlValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_base64_blob_invalid_is_error() {
        assert!(Transform::Base64Blob
            .apply(SqlValue::Text("not base64!!".into()))
            .is_err());
    }

    #[test]
    fn test_null_passes_every_transform() {
        for t in [
            Transform::Identity,
            Transform::RightTrim,
            Transform::NumericTrim,
            Transform::DbfLogical,
            Transform::DbfDate,
            Transform::Base64Blob,
        ] {
            assert_eq!(t.apply(SqlValue::Null).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn test_dbf_type_mapping() {
        assert_eq!(map_dbf_type('C'), ("text".into(), Transform::RightTrim));
        assert_eq!(map_dbf_type('N'), ("numeric".into(), Transform::NumericTrim));
        assert_eq!(map_dbf_type('L'), ("boolean".into(), Transform::DbfLogical));
        assert_eq!(map_dbf_type('D'), ("date".into(), Transform::DbfDate));
        assert_eq!(map_dbf_type('M'), ("text".into(), Transform::Identity));
        // Unmapped tags select text/identity.
        assert_eq!(map_dbf_type('Z'), ("text".into(), Transform::Identity));
    }

    #[test]
    fn test_sqlite_type_mapping() {
        assert_eq!(map_sqlite_type("INTEGER").0, "bigint");
        assert_eq!(map_sqlite_type("VARCHAR(40)").0, "text");
        assert_eq!(map_sqlite_type("BLOB"), ("bytea".into(), Transform::Base64Blob));
        assert_eq!(map_sqlite_type(""), ("bytea".into(), Transform::Base64Blob));
        assert_eq!(map_sqlite_type("REAL").0, "double precision");
        assert_eq!(map_sqlite_type("BOOLEAN").0, "boolean");
        assert_eq!(map_sqlite_type("DATETIME").0, "timestamptz");
        assert_eq!(map_sqlite_type("DATE").0, "date");
        assert_eq!(map_sqlite_type("DECIMAL(10,2)").0, "numeric");
    }
}
