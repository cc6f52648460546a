//! Schema materialization: CREATE TABLE, TRUNCATE, index builds, sequence
//! resets.
//!
//! Table DDL for one invocation runs inside a single transaction and any
//! failure aborts the run. Index and sequence operations are per-object and
//! recoverable: a failure is logged against the object and the others
//! proceed.

use tokio_postgres::Client;
use tracing::{debug, info, warn};

use crate::core::identifier::{quote_ident, quote_literal, target_ident};
use crate::core::schema::{Index, SourceDescriptor};
use crate::error::{LoadError, Result};
use crate::target::qualify;

/// Create the target tables, optionally dropping first. One transaction for
/// the whole batch; any statement failure is a fatal [`LoadError::Schema`].
pub async fn create_tables(
    client: &mut Client,
    schema: &str,
    descriptors: &[SourceDescriptor],
    include_drop: bool,
) -> Result<usize> {
    let txn = client
        .transaction()
        .await
        .map_err(|e| LoadError::Schema(format!("opening DDL transaction: {}", e)))?;

    for desc in descriptors {
        let qualified = qualify(schema, &desc.target_table);

        if include_drop {
            let drop_sql = format!("DROP TABLE IF EXISTS {} CASCADE", qualified);
            txn.batch_execute(&drop_sql)
                .await
                .map_err(|e| LoadError::Schema(format!("{}: {}", drop_sql, e)))?;
        }

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            qualified,
            desc.column_definitions()?.join(",\n    ")
        );
        txn.batch_execute(&create_sql)
            .await
            .map_err(|e| LoadError::Schema(format!("creating {}: {}", qualified, e)))?;

        debug!("created table {}", qualified);
    }

    txn.commit()
        .await
        .map_err(|e| LoadError::Schema(format!("committing DDL: {}", e)))?;

    info!("created {} tables in schema {}", descriptors.len(), schema);
    Ok(descriptors.len())
}

/// Make sure the target schema exists.
pub async fn ensure_schema(client: &Client, schema: &str) -> Result<()> {
    let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
    client
        .batch_execute(&sql)
        .await
        .map_err(|e| LoadError::Schema(format!("{}: {}", sql, e)))?;
    Ok(())
}

/// Truncate all listed tables in one statement.
pub async fn truncate_tables(
    client: &Client,
    schema: &str,
    descriptors: &[SourceDescriptor],
) -> Result<()> {
    if descriptors.is_empty() {
        return Ok(());
    }
    let list = descriptors
        .iter()
        .map(|d| qualify(schema, &d.target_table))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("TRUNCATE {}", list);
    client
        .batch_execute(&sql)
        .await
        .map_err(|e| LoadError::Schema(format!("{}: {}", sql, e)))?;
    info!("truncated {} tables", descriptors.len());
    Ok(())
}

/// Build the CREATE INDEX statement for one source index.
pub fn index_ddl(schema: &str, desc: &SourceDescriptor, index: &Index) -> Result<String> {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let name = target_ident(&index.name, desc.case)?;
    let columns = index
        .columns
        .iter()
        .map(|c| target_ident(c, desc.case))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let mut sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        name,
        qualify(schema, &desc.target_table),
        columns
    );
    if let Some(predicate) = &index.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    Ok(sql)
}

/// Create one index on its own connection-owning task. Failure is recorded
/// against the index, not the run.
pub async fn create_index(
    target: &crate::config::TargetConfig,
    desc: &SourceDescriptor,
    index: &Index,
) -> Result<()> {
    let sql = index_ddl(&target.schema, desc, index)?;
    let client = crate::target::postgres::connect(target).await?;
    debug!("building index: {}", sql);
    client
        .batch_execute(&sql)
        .await
        .map_err(|e| LoadError::index(index.name.as_str(), e.to_string()))?;
    info!("built index {} on {}", index.name, desc.target_table);
    Ok(())
}

/// Reset every sequence owned by a column of the listed tables to
/// `MAX(column) + 1`, or 1 when the table is empty. Idempotent; returns the
/// number of sequences reset. Per-sequence failures are logged and skipped.
pub async fn reset_sequences(
    client: &Client,
    schema: &str,
    descriptors: &[SourceDescriptor],
) -> (u64, u64) {
    let mut reset = 0u64;
    let mut errors = 0u64;

    for desc in descriptors {
        let qualified = qualify(schema, &desc.target_table);

        for col in &desc.columns {
            let col_name =
                crate::core::identifier::fold_case(&col.name, desc.case);
            // pg_get_serial_sequence parses its first argument as a
            // possibly quoted qualified name, so the quoted form keeps
            // preserved-case table names resolvable.
            let seq: Option<String> = match client
                .query_one(
                    "SELECT pg_get_serial_sequence($1, $2)",
                    &[&qualified, &col_name],
                )
                .await
            {
                Ok(row) => row.get(0),
                Err(e) => {
                    warn!("{}: sequence lookup failed for {}: {}", qualified, col_name, e);
                    errors += 1;
                    continue;
                }
            };

            let Some(seq) = seq else { continue };

            let sql = format!(
                "SELECT setval({}::regclass, COALESCE((SELECT MAX({}) + 1 FROM {}), 1), false)",
                quote_literal(&seq),
                quote_ident(&col_name),
                qualified
            );
            match client.query_one(sql.as_str(), &[]).await {
                Ok(_) => {
                    debug!("reset sequence {} for {}", seq, qualified);
                    reset += 1;
                }
                Err(e) => {
                    let err = LoadError::sequence(seq.as_str(), e.to_string());
                    warn!("{}", err);
                    errors += 1;
                }
            }
        }
    }

    if reset > 0 {
        info!("reset {} sequences", reset);
    }
    (reset, errors)
}
