//! PostgreSQL target: the COPY sink, schema materialization, reject files.

pub mod ddl;
pub mod postgres;
pub mod reject;

pub use postgres::{connect, copy_from_queue, SinkOptions, SinkStats};
pub use reject::RejectLog;

use crate::core::identifier::quote_ident;

/// Qualify a folded target table name with the target schema.
pub(crate) fn qualify(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("public", "users"), "\"public\".\"users\"");
    }
}
