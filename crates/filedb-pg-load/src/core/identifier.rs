//! PostgreSQL identifier quoting and case folding.
//!
//! SQL identifiers (table names, column names) cannot be passed as parameters
//! in prepared statements, so dynamic DDL and COPY statements must quote them.
//! Identifiers are wrapped in double quotes with embedded quotes doubled.
//!
//! Source identifiers arrive with whatever casing the file carries (DBF field
//! names are conventionally upper case). The folding policy matches the usual
//! expectation on the PostgreSQL side: names already wrapped in double quotes
//! are preserved verbatim, everything else is folded to lower case before
//! quoting.

use crate::error::{LoadError, Result};

/// Maximum identifier length accepted (PostgreSQL truncates at 63 bytes; we
/// reject outright rather than load into a silently renamed column).
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Identifier case policy applied before quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentCase {
    /// Fold unquoted identifiers to lower case (PostgreSQL convention).
    #[default]
    Fold,
    /// Keep source casing as-is.
    Preserve,
}

/// Validate an identifier before it is spliced into SQL.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the PostgreSQL length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LoadError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(LoadError::Config(format!(
            "Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(LoadError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Apply the case policy to a source identifier.
///
/// A name carrying its own double quotes opts out of folding; the quotes are
/// stripped here and re-added by [`quote_ident`].
#[must_use]
pub fn fold_case(name: &str, case: IdentCase) -> String {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        return name[1..name.len() - 1].to_string();
    }
    match case {
        IdentCase::Fold => name.to_lowercase(),
        IdentCase::Preserve => name.to_string(),
    }
}

/// Quote a PostgreSQL identifier, escaping embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fold then quote in one step; the common path for source-derived names.
pub fn target_ident(name: &str, case: IdentCase) -> Result<String> {
    let folded = fold_case(name, case);
    validate_identifier(&folded)?;
    Ok(quote_ident(&folded))
}

/// Quote a string as a SQL literal (single quotes doubled). Used for
/// `pg_get_serial_sequence` arguments and regclass casts only; data values
/// always travel through COPY or statement parameters.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_normal() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("my_table"), "\"my_table\"");
    }

    #[test]
    fn test_quote_ident_escapes_double_quote() {
        assert_eq!(quote_ident("table\"name"), "\"table\"\"name\"");
    }

    #[test]
    fn test_fold_case_lowercases() {
        assert_eq!(fold_case("NAME", IdentCase::Fold), "name");
        assert_eq!(fold_case("MixedCase", IdentCase::Fold), "mixedcase");
    }

    #[test]
    fn test_fold_case_preserve() {
        assert_eq!(fold_case("MixedCase", IdentCase::Preserve), "MixedCase");
    }

    #[test]
    fn test_fold_case_quoted_names_kept_verbatim() {
        assert_eq!(fold_case("\"Exact\"", IdentCase::Fold), "Exact");
    }

    #[test]
    fn test_target_ident() {
        assert_eq!(target_ident("NAME", IdentCase::Fold).unwrap(), "\"name\"");
        assert_eq!(
            target_ident("\"Exact\"", IdentCase::Fold).unwrap(),
            "\"Exact\""
        );
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        assert!(validate_identifier("a\0b").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&long).is_err());
        let max = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max).is_ok());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("users"), "'users'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
