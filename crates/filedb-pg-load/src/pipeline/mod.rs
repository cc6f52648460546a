//! Per-table copy pipeline: one reader task, one bounded queue, one sink
//! task.
//!
//! The reader runs on a blocking thread (source parsing is synchronous file
//! or embedded-database I/O) and owns its source handle; the sink is an
//! async task owning its PostgreSQL connection. The queue between them is
//! the only shared state, and each side's counters are folded into the
//! table's stats only after both tasks have terminated.

pub mod queue;

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::{RunContext, SourceConfig, TargetConfig};
use crate::core::schema::SourceDescriptor;
use crate::error::LoadError;
use crate::source;
use crate::stats::TableStats;
use crate::target::{self, SinkOptions};

/// Options for one table copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    /// TRUNCATE the target table before streaming.
    pub truncate: bool,

    /// Row queue capacity.
    pub queue_capacity: usize,
}

/// Copy one table from the source into PostgreSQL.
///
/// Never returns an error: every failure mode is folded into the returned
/// [`TableStats`] so that other tables keep going. A source query error
/// counts one error and keeps the rows already queued; a format or sink
/// error marks the table failed.
pub async fn copy_table(
    source_config: SourceConfig,
    target_config: TargetConfig,
    desc: SourceDescriptor,
    options: CopyOptions,
    ctx: RunContext,
    cancel: CancellationToken,
) -> TableStats {
    let start = Instant::now();
    let mut stats = TableStats::new(desc.target_table.clone());

    let (tx, rx) = queue::bounded(options.queue_capacity);

    let reader = {
        let source_config = source_config.clone();
        let desc = desc.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            source::stream_table(&source_config, &desc, tx, cancel)
        })
    };

    let sink = {
        let desc = desc.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            target::copy_from_queue(
                &target_config,
                &desc,
                rx,
                SinkOptions {
                    truncate: options.truncate,
                },
                &ctx,
                cancel,
            )
            .await
        })
    };

    let (reader_result, sink_result) = tokio::join!(reader, sink);

    match reader_result {
        Ok(outcome) => {
            stats.rows_read = outcome.rows;
            match outcome.error {
                None => {}
                Some(e @ LoadError::SourceQuery { .. }) => {
                    // Recoverable: the stream ended early, the sink keeps
                    // what it already received.
                    warn!("{}", e);
                    stats.errors += 1;
                }
                Some(e) => {
                    error!("{}", e);
                    stats.failed = Some(e.to_string());
                }
            }
        }
        Err(e) => {
            stats.failed = Some(format!("reader task panicked: {}", e));
        }
    }

    match sink_result {
        Ok(Ok(sink_stats)) => {
            stats.rows_written = sink_stats.rows_written;
            stats.errors += sink_stats.errors;
            stats.bytes = sink_stats.bytes;
        }
        Ok(Err(e)) => {
            error!("{}", e);
            stats.errors += 1;
            if stats.failed.is_none() {
                stats.failed = Some(e.to_string());
            }
        }
        Err(e) => {
            stats.errors += 1;
            if stats.failed.is_none() {
                stats.failed = Some(format!("sink task panicked: {}", e));
            }
        }
    }

    stats.elapsed = start.elapsed();
    stats
}

#[cfg(test)]
mod tests {
    use super::queue;
    use crate::core::value::SqlValue;
    use std::time::Duration;

    // The sink's pace bounds the reader's pace through the fixed queue
    // capacity: with a slow consumer the producer can never get more than
    // `capacity` rows ahead.
    #[tokio::test]
    async fn test_backpressure_bounds_queue_depth() {
        const CAPACITY: usize = 8;
        const ROWS: u64 = 300;

        let (tx, mut rx) = queue::bounded(CAPACITY);
        let producer = tokio::task::spawn_blocking(move || {
            let mut max_in_flight = 0usize;
            for n in 0..ROWS {
                let in_flight = CAPACITY - tx.free_slots();
                max_in_flight = max_in_flight.max(in_flight);
                if tx.blocking_send(vec![SqlValue::Int(n as i64)]).is_err() {
                    break;
                }
            }
            max_in_flight
        });

        let consumer = tokio::spawn(async move {
            let mut count = 0u64;
            while rx.recv().await.is_some() {
                count += 1;
                tokio::time::sleep(Duration::from_micros(500)).await;
            }
            count
        });

        let (max_in_flight, count) = tokio::join!(producer, consumer);
        assert!(max_in_flight.unwrap() <= CAPACITY);
        assert_eq!(count.unwrap(), ROWS);
    }
}
