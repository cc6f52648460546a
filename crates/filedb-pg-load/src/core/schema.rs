//! Schema metadata for source tables, columns, and indexes.
//!
//! These types are the format-agnostic representation produced by source
//! discovery and consumed by the type mapper, the schema materializer, and
//! the copy pipeline.

use crate::core::identifier::{fold_case, target_ident, IdentCase};
use crate::error::Result;
use crate::typemap::{self, Transform};

/// Source column type tag, carried verbatim from the source format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    /// DBF single-character field type (`C`, `N`, `L`, `D`, `M`, `F`, ...).
    Dbf(char),
    /// SQLite declared column type (`INTEGER`, `VARCHAR(40)`, `BLOB`, ...).
    Sqlite(String),
}

/// Column metadata, immutable after discovery.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name as spelled by the source.
    pub name: String,

    /// Source type tag.
    pub tag: TypeTag,

    /// Declared length in bytes (DBF field width; 0 when not applicable).
    pub length: u16,

    /// Declared decimal count (DBF numeric fields; 0 otherwise).
    pub decimals: u8,

    /// Whether the source declares the column NOT NULL.
    pub not_null: bool,
}

impl Column {
    /// Convenience constructor for a nullable column without length metadata.
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            tag,
            length: 0,
            decimals: 0,
            not_null: false,
        }
    }
}

/// Index metadata discovered from the source.
#[derive(Debug, Clone)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Owning table name (source spelling).
    pub table: String,

    /// Indexed column names in order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub unique: bool,

    /// Partial-index predicate, when the source declares one.
    pub predicate: Option<String>,
}

/// Table metadata: columns plus the indexes that will be rebuilt after the
/// table's data copy.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name as spelled by the source.
    pub name: String,

    /// Column definitions in source order.
    pub columns: Vec<Column>,

    /// Indexes owned by this table.
    pub indexes: Vec<Index>,

    /// Row count when the source header declares one (DBF); None otherwise.
    pub row_count: Option<u64>,
}

/// Everything needed to copy one table: the source spelling, the target
/// spelling, and the per-column transforms in row order.
///
/// Built once by the orchestrator; `columns`, `transforms`, and `pg_types`
/// always have the same length and the same order as the values each source
/// row carries.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    /// Table name on the source side.
    pub source_table: String,

    /// Folded (unquoted) table name on the PostgreSQL side.
    pub target_table: String,

    /// Column metadata in row order.
    pub columns: Vec<Column>,

    /// Per-column transforms, same cardinality and order as `columns`.
    pub transforms: Vec<Transform>,

    /// Mapped PostgreSQL type names, same cardinality and order as `columns`.
    pub pg_types: Vec<String>,

    /// Identifier case policy for this run.
    pub case: IdentCase,
}

impl SourceDescriptor {
    /// Build a descriptor from discovered table metadata, filling the
    /// transform and type defaults from the type mapper.
    pub fn new(table: &Table, case: IdentCase) -> Result<Self> {
        let mut transforms = Vec::with_capacity(table.columns.len());
        let mut pg_types = Vec::with_capacity(table.columns.len());
        for col in &table.columns {
            let (pg_type, transform) = typemap::map_column(col);
            pg_types.push(pg_type);
            transforms.push(transform);
        }
        debug_assert_eq!(table.columns.len(), transforms.len());

        Ok(Self {
            source_table: table.name.clone(),
            target_table: fold_case(&table.name, case),
            columns: table.columns.clone(),
            transforms,
            pg_types,
            case,
        })
    }

    /// Quoted target table name, ready to splice into SQL.
    pub fn quoted_target(&self) -> Result<String> {
        // target_table is already folded; quote it verbatim.
        target_ident(&self.target_table, IdentCase::Preserve)
    }

    /// Quoted column list for COPY and CREATE TABLE statements.
    pub fn quoted_columns(&self) -> Result<Vec<String>> {
        self.columns
            .iter()
            .map(|c| target_ident(&c.name, self.case))
            .collect()
    }

    /// `"<ident> <pg-type>"` definitions for CREATE TABLE, in column order.
    pub fn column_definitions(&self) -> Result<Vec<String>> {
        self.columns
            .iter()
            .zip(&self.pg_types)
            .map(|(col, pg_type)| {
                let ident = target_ident(&col.name, self.case)?;
                let null_clause = if col.not_null { " NOT NULL" } else { "" };
                Ok(format!("{} {}{}", ident, pg_type, null_clause))
            })
            .collect()
    }
}
