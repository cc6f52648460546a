//! PostgreSQL sink: streams queued rows through `COPY ... FROM STDIN`.
//!
//! Values travel in the text format of the COPY protocol: tab-separated
//! fields, newline-terminated records, `\N` for NULL, with backslash, tab,
//! newline and carriage return backslash-escaped. Booleans render as `t`/`f`,
//! dates as `YYYY-MM-DD`, byte arrays as `\x`-prefixed hex.

use bytes::Bytes;
use futures::SinkExt;
use tokio_postgres::{Client, CopyInSink, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{RunContext, TargetConfig};
use crate::core::schema::SourceDescriptor;
use crate::core::value::{Row, SqlValue};
use crate::error::{LoadError, Result};
use crate::pipeline::queue::RowReceiver;
use crate::target::qualify;
use crate::target::reject::RejectLog;

/// Flush the COPY buffer once it grows past this many bytes.
const COPY_FLUSH_BYTES: usize = 48 * 1024;

/// Options for one table's sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkOptions {
    /// TRUNCATE the target table before the copy.
    pub truncate: bool,
}

/// Counters reported by one sink run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkStats {
    /// Rows acknowledged by the server at COPY end.
    pub rows_written: u64,

    /// Rows rejected before being sent.
    pub errors: u64,

    /// Formatted payload bytes pushed onto the stream.
    pub bytes: u64,
}

/// Open a dedicated connection to the target database.
///
/// The connection driver runs on its own task; the sink task owns the
/// returned client exclusively.
pub async fn connect(target: &TargetConfig) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(&target.connection_string(), NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("postgres connection error: {}", e);
        }
    });
    Ok(client)
}

/// Consume the queue into `COPY <table> FROM STDIN` within one transaction.
///
/// Per-row transform failures reject the row and continue; a row whose
/// cardinality does not match the declared column count is a hard error and
/// nothing of that row is sent. On clean end-of-stream the COPY is finished
/// (the server's acknowledgment is the written-row count) and the
/// transaction commits; any hard error rolls back.
pub async fn copy_from_queue(
    target: &TargetConfig,
    desc: &SourceDescriptor,
    mut rx: RowReceiver,
    options: SinkOptions,
    ctx: &RunContext,
    cancel: CancellationToken,
) -> Result<SinkStats> {
    let table = desc.target_table.clone();
    let qualified = qualify(&target.schema, &table);
    let mut client = connect(target).await?;

    if options.truncate {
        debug!("{}: truncating before copy", table);
        client
            .execute(format!("TRUNCATE {}", qualified).as_str(), &[])
            .await?;
    }

    let columns = desc.quoted_columns()?;
    let copy_sql = format!("COPY {} ({}) FROM STDIN", qualified, columns.join(", "));

    let txn = client.transaction().await?;
    let sink: CopyInSink<Bytes> = txn.copy_in(copy_sql.as_str()).await?;
    tokio::pin!(sink);

    let mut stats = SinkStats::default();
    let mut reject = RejectLog::new(&ctx.root_dir, &table);
    let mut buf = String::with_capacity(COPY_FLUSH_BYTES + 1024);
    let mut row_index = 0u64;

    loop {
        let row = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{}: sink cancelled near row {}", table, row_index);
                return Err(LoadError::Cancelled);
            }
            row = rx.recv() => match row {
                Some(row) => row,
                None => break,
            },
        };
        row_index += 1;

        if row.len() != desc.columns.len() {
            return Err(LoadError::sink(
                table.as_str(),
                row_index,
                format!(
                    "row has {} values but the table declares {} columns",
                    row.len(),
                    desc.columns.len()
                ),
            ));
        }

        match render_row(desc, &row) {
            Ok(line) => {
                stats.bytes += line.len() as u64;
                buf.push_str(&line);
                if buf.len() >= COPY_FLUSH_BYTES {
                    send_buf(&mut sink, &mut buf, &table, row_index).await?;
                }
            }
            Err(reason) => {
                reject.log(&row, &reason)?;
                stats.errors += 1;
            }
        }
    }

    if !buf.is_empty() {
        send_buf(&mut sink, &mut buf, &table, row_index).await?;
    }

    stats.rows_written = sink
        .finish()
        .await
        .map_err(|e| LoadError::sink(table.as_str(), row_index, format!("finishing COPY: {}", e)))?;
    txn.commit().await?;

    info!(
        "{}: wrote {} rows ({} bytes, {} rejected)",
        table, stats.rows_written, stats.bytes, stats.errors
    );
    Ok(stats)
}

async fn send_buf(
    sink: &mut std::pin::Pin<&mut CopyInSink<Bytes>>,
    buf: &mut String,
    table: &str,
    row_index: u64,
) -> Result<()> {
    let data = Bytes::from(std::mem::take(buf));
    sink.send(data)
        .await
        .map_err(|e| LoadError::sink(table, row_index, format!("sending COPY data: {}", e)))
}

/// Apply the descriptor's transforms to one row and render it as a COPY
/// text line (newline included). A transform failure yields the reject
/// reason.
pub fn render_row(desc: &SourceDescriptor, row: &Row) -> std::result::Result<String, String> {
    let mut line = String::with_capacity(row.len() * 16);
    for (i, (value, transform)) in row.iter().zip(&desc.transforms).enumerate() {
        if i > 0 {
            line.push('\t');
        }
        let transformed = transform
            .apply(value.clone())
            .map_err(|e| format!("column {}: {}", desc.columns[i].name, e))?;
        escape_value(&mut line, &transformed);
    }
    line.push('\n');
    Ok(line)
}

/// Append one value in COPY text format.
pub fn escape_value(buf: &mut String, value: &SqlValue) {
    match value {
        SqlValue::Null => buf.push_str("\\N"),
        SqlValue::Bool(true) => buf.push('t'),
        SqlValue::Bool(false) => buf.push('f'),
        SqlValue::Int(i) => {
            buf.push_str(&i.to_string());
        }
        SqlValue::Real(f) => {
            if f.is_nan() {
                buf.push_str("NaN");
            } else if f.is_infinite() {
                buf.push_str(if *f > 0.0 { "Infinity" } else { "-Infinity" });
            } else {
                buf.push_str(&f.to_string());
            }
        }
        SqlValue::Text(s) => {
            for c in s.chars() {
                match c {
                    '\\' => buf.push_str("\\\\"),
                    '\t' => buf.push_str("\\t"),
                    '\n' => buf.push_str("\\n"),
                    '\r' => buf.push_str("\\r"),
                    _ => buf.push(c),
                }
            }
        }
        SqlValue::Bytes(b) => {
            // The bytea hex form is \x...; the leading backslash itself
            // needs escaping on the COPY stream.
            buf.push_str("\\\\x");
            for byte in b {
                buf.push_str(&format!("{:02x}", byte));
            }
        }
        SqlValue::Date(d) => {
            buf.push_str(&d.format("%Y-%m-%d").to_string());
        }
    }
}
