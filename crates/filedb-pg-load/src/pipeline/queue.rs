//! Bounded single-producer/single-consumer row queue.
//!
//! Connects one source reader to one PostgreSQL sink. The fixed capacity is
//! the backpressure mechanism: the sink's speed bounds the reader's speed
//! without unbounded memory.
//!
//! Built on `tokio::sync::mpsc::channel`, which gives exact-capacity blocking
//! semantics on both sides. Readers run on blocking threads and use
//! [`RowSender::blocking_send`]; the async sink awaits [`RowReceiver::recv`].
//! Dropping the sender closes the queue: the consumer drains remaining rows,
//! then observes end-of-stream. Sends after the consumer is gone fail.

use tokio::sync::mpsc;

use crate::core::value::Row;

/// Default queue capacity in rows.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Create a bounded row queue with the given capacity.
pub fn bounded(capacity: usize) -> (RowSender, RowReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RowSender { tx }, RowReceiver { rx })
}

/// Producer half, held by the reader task.
pub struct RowSender {
    tx: mpsc::Sender<Row>,
}

impl RowSender {
    /// Push a row, blocking the calling thread while the queue is full.
    ///
    /// Returns `Err` with the row when the consumer has gone away; the
    /// reader stops at that point.
    pub fn blocking_send(&self, row: Row) -> Result<(), Row> {
        self.tx.blocking_send(row).map_err(|e| e.0)
    }

    /// Push a row from async context (used by tests and stub producers).
    pub async fn send(&self, row: Row) -> Result<(), Row> {
        self.tx.send(row).await.map_err(|e| e.0)
    }

    /// Attempt a push without blocking.
    pub fn try_send(&self, row: Row) -> Result<(), Row> {
        self.tx.try_send(row).map_err(|e| match e {
            mpsc::error::TrySendError::Full(row) => row,
            mpsc::error::TrySendError::Closed(row) => row,
        })
    }

    /// Declared capacity remaining right now (used by backpressure tests).
    pub fn free_slots(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer half, held by the sink task.
pub struct RowReceiver {
    rx: mpsc::Receiver<Row>,
}

impl RowReceiver {
    /// Pop the next row, waiting while the queue is empty. Returns `None`
    /// once the producer is done and the queue has drained.
    pub async fn recv(&mut self) -> Option<Row> {
        self.rx.recv().await
    }

    /// Close the receiving side, signalling the producer to stop.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;

    fn row(n: i64) -> Row {
        vec![SqlValue::Int(n)]
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (tx, mut rx) = bounded(4);
        for n in 0..4 {
            tx.send(row(n)).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push(r);
        }
        assert_eq!(seen, vec![row(0), row(1), row(2), row(3)]);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let (tx, _rx) = bounded(2);
        tx.try_send(row(1)).unwrap();
        tx.try_send(row(2)).unwrap();
        // Third push must fail: the queue never exceeds its capacity.
        assert!(tx.try_send(row(3)).is_err());
        assert_eq!(tx.free_slots(), 0);
    }

    #[tokio::test]
    async fn test_drain_after_close_then_end_of_stream() {
        let (tx, mut rx) = bounded(4);
        tx.send(row(1)).await.unwrap();
        tx.send(row(2)).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(row(1)));
        assert_eq!(rx.recv().await, Some(row(2)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_fails_after_consumer_gone() {
        let (tx, rx) = bounded(2);
        drop(rx);
        assert!(tx.send(row(1)).await.is_err());
        assert!(tx.try_send(row(2)).is_err());
    }

    #[tokio::test]
    async fn test_blocking_send_from_worker_thread() {
        let (tx, mut rx) = bounded(2);
        let producer = tokio::task::spawn_blocking(move || {
            for n in 0..100 {
                if tx.blocking_send(row(n)).is_err() {
                    return n;
                }
            }
            100
        });

        let mut count = 0u64;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 100);
        assert_eq!(producer.await.unwrap(), 100);
    }
}
