//! SQLite source reader.
//!
//! Opens the database file read-only; discovery walks `sqlite_master` and
//! the `table_info`/`index_list`/`index_info` pragmas, and row streaming
//! materializes one `SELECT` per table. Each reader task opens its own
//! connection, so a connection never crosses a thread hand-off.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::schema::{Column, Index, Table, TypeTag};
use crate::core::value::{Row, SqlValue};
use crate::error::{LoadError, Result};
use crate::pipeline::queue::RowSender;
use crate::source::StreamOutcome;

/// An open read-only SQLite database.
pub struct SqliteSource {
    path: PathBuf,
    conn: Connection,
}

impl SqliteSource {
    /// Open the database file read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Discover all user tables with their columns and indexes.
    pub fn discover(&self) -> Result<Vec<Table>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = self.table_columns(&name)?;
            if columns.is_empty() {
                warn!("{}: table {} has no columns, skipping", self.path.display(), name);
                continue;
            }
            let indexes = self.table_indexes(&name)?;
            tables.push(Table {
                name,
                columns,
                indexes,
                row_count: None,
            });
        }
        Ok(tables)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<Column>> {
        let sql = format!("PRAGMA table_info({})", quote_sqlite_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get("name")?;
                let decl: Option<String> = row.get("type")?;
                let not_null: bool = row.get::<_, i64>("notnull")? != 0;
                Ok(Column {
                    name,
                    tag: TypeTag::Sqlite(decl.unwrap_or_default()),
                    length: 0,
                    decimals: 0,
                    not_null,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    fn table_indexes(&self, table: &str) -> Result<Vec<Index>> {
        let sql = format!("PRAGMA index_list({})", quote_sqlite_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let listed = stmt
            .query_map([], |row| {
                let name: String = row.get("name")?;
                let unique: bool = row.get::<_, i64>("unique")? != 0;
                let origin: String = row.get("origin")?;
                let partial: bool = row.get::<_, i64>("partial")? != 0;
                Ok((name, unique, origin, partial))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut indexes = Vec::new();
        for (name, unique, origin, partial) in listed {
            // Only explicitly created indexes travel; primary-key and
            // unique-constraint autoindexes are implied by the DDL.
            if origin != "c" {
                continue;
            }

            let columns = self.index_columns(&name)?;
            if columns.is_empty() {
                warn!(
                    "{}: index {} uses expressions, not recreating it",
                    self.path.display(),
                    name
                );
                continue;
            }

            let predicate = if partial {
                self.index_predicate(&name)?
            } else {
                None
            };

            indexes.push(Index {
                name,
                table: table.to_string(),
                columns,
                unique,
                predicate,
            });
        }
        Ok(indexes)
    }

    fn index_columns(&self, index: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA index_info({})", quote_sqlite_ident(index));
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, Option<String>>("name"))?
            .collect::<rusqlite::Result<Vec<Option<String>>>>()?;
        // A NULL column name means the key is an expression.
        Ok(names.into_iter().flatten().collect())
    }

    fn index_predicate(&self, index: &str) -> Result<Option<String>> {
        let sql: Option<String> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?1",
                [index],
                |row| row.get(0),
            )
            .unwrap_or(None);

        Ok(sql.and_then(|s| {
            // Byte-preserving case fold so the offset maps back onto `s`.
            s.to_ascii_uppercase()
                .rfind(" WHERE ")
                .map(|pos| s[pos + " WHERE ".len()..].trim().to_string())
        }))
    }

    /// Stream one table's rows into the queue in column order.
    ///
    /// A row-step failure is recoverable for the run: the outcome carries a
    /// [`LoadError::SourceQuery`] and the rows emitted before the failure.
    pub fn stream_rows(
        &self,
        table: &str,
        columns: &[Column],
        tx: &RowSender,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let column_list = columns
            .iter()
            .map(|c| quote_sqlite_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {}",
            column_list,
            quote_sqlite_ident(table)
        );

        let mut emitted = 0u64;
        let query_error = |e: rusqlite::Error| LoadError::SourceQuery {
            table: table.to_string(),
            source: e,
        };

        let mut stmt = match self.conn.prepare(&sql) {
            Ok(stmt) => stmt,
            Err(e) => {
                return StreamOutcome {
                    rows: 0,
                    error: Some(query_error(e)),
                }
            }
        };
        let mut rows = match stmt.query([]) {
            Ok(rows) => rows,
            Err(e) => {
                return StreamOutcome {
                    rows: 0,
                    error: Some(query_error(e)),
                }
            }
        };

        loop {
            if cancel.is_cancelled() {
                debug!("{}: cancelled after {} rows", table, emitted);
                break;
            }

            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    return StreamOutcome {
                        rows: emitted,
                        error: Some(query_error(e)),
                    }
                }
            };

            let mut values: Row = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                match row.get_ref(i) {
                    Ok(value) => values.push(value_from_ref(value)),
                    Err(e) => {
                        return StreamOutcome {
                            rows: emitted,
                            error: Some(query_error(e)),
                        }
                    }
                }
            }

            if tx.blocking_send(values).is_err() {
                // Sink is gone; it reports its own error.
                break;
            }
            emitted += 1;
        }

        StreamOutcome {
            rows: emitted,
            error: None,
        }
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Bytes(b.to_vec()),
    }
}

fn quote_sqlite_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
