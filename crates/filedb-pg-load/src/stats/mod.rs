//! Per-table counters, phase timings, and the final summary report.
//!
//! Each table's counters are written by exactly one reader/sink pair; the
//! collector only reads them after the pair has terminated. Phase states
//! cover the work around the copies: schema creation, index builds, and
//! sequence resets.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Counters for one table's copy.
#[derive(Debug, Clone, Default)]
pub struct TableStats {
    /// Target table name.
    pub table: String,

    /// Rows emitted by the reader.
    pub rows_read: u64,

    /// Rows acknowledged by the server.
    pub rows_written: u64,

    /// Rejected rows plus source-side stream errors.
    pub errors: u64,

    /// Formatted bytes pushed onto the COPY stream.
    pub bytes: u64,

    /// Wall time for the reader/sink pair.
    pub elapsed: Duration,

    /// Fatal error message when the table's copy failed.
    pub failed: Option<String>,
}

impl TableStats {
    /// New zeroed counters for a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }
}

/// Elapsed time and error count for a named non-copy phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseStats {
    /// Phase label as shown in the summary.
    pub label: String,

    /// Accumulated wall time.
    pub elapsed: Duration,

    /// Objects processed (tables created, indexes built, sequences reset).
    pub items: u64,

    /// Recoverable errors folded into this phase.
    pub errors: u64,
}

impl PhaseStats {
    /// New empty phase state.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Run a future inside this phase, folding its elapsed time in.
    pub async fn record<T, F: Future<Output = T>>(&mut self, f: F) -> T {
        let (value, elapsed) = timed(f).await;
        self.elapsed += elapsed;
        value
    }
}

/// Measure a future's wall time.
pub async fn timed<T, F: Future<Output = T>>(f: F) -> (T, Duration) {
    let start = Instant::now();
    let value = f.await;
    (value, start.elapsed())
}

/// All counters for one run, grouped by phase.
#[derive(Debug, Default)]
pub struct StateBundle {
    /// Schema phase (create or truncate), when it ran.
    pub before: Option<PhaseStats>,

    /// One entry per table that began a copy.
    pub tables: Vec<TableStats>,

    /// Index build phase, when it ran.
    pub index: Option<PhaseStats>,

    /// Sequence reset phase, when it ran.
    pub sequences: Option<PhaseStats>,
}

/// One summary line for a table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub errors: u64,
    pub bytes: u64,
    pub seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
}

/// One summary line for a non-copy phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub label: String,
    pub items: u64,
    pub errors: u64,
    pub seconds: f64,
}

/// The final aggregated report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total wall time in seconds.
    pub duration_seconds: f64,

    /// Per-table rows.
    pub tables: Vec<TableReport>,

    /// Non-copy phases in execution order.
    pub phases: Vec<PhaseReport>,

    /// Tables whose copy failed.
    pub failed_tables: Vec<String>,

    /// Sum of rows read across tables.
    pub total_rows_read: u64,

    /// Sum of rows written across tables.
    pub total_rows_written: u64,

    /// Sum of errors across tables and phases.
    pub total_errors: u64,
}

impl RunReport {
    /// Fold a completed bundle into the report.
    pub fn from_bundle(
        run_id: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        bundle: &StateBundle,
    ) -> Self {
        let tables: Vec<TableReport> = bundle
            .tables
            .iter()
            .map(|t| TableReport {
                table: t.table.clone(),
                rows_read: t.rows_read,
                rows_written: t.rows_written,
                errors: t.errors,
                bytes: t.bytes,
                seconds: t.elapsed.as_secs_f64(),
                failed: t.failed.clone(),
            })
            .collect();

        let phases: Vec<PhaseReport> = [&bundle.before, &bundle.index, &bundle.sequences]
            .into_iter()
            .flatten()
            .map(|p| PhaseReport {
                label: p.label.clone(),
                items: p.items,
                errors: p.errors,
                seconds: p.elapsed.as_secs_f64(),
            })
            .collect();

        let failed_tables = tables
            .iter()
            .filter(|t| t.failed.is_some())
            .map(|t| t.table.clone())
            .collect();

        let total_rows_read = tables.iter().map(|t| t.rows_read).sum();
        let total_rows_written = tables.iter().map(|t| t.rows_written).sum();
        let total_errors = tables.iter().map(|t| t.errors).sum::<u64>()
            + phases.iter().map(|p| p.errors).sum::<u64>();

        Self {
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables,
            phases,
            failed_tables,
            total_rows_read,
            total_rows_written,
            total_errors,
        }
    }

    /// Render the aligned text summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = format!(
            "{:-<22}  {:-<9}  {:-<9}  {:-<9}  {:-<9}\n",
            "", "", "", "", ""
        );

        out.push_str(&format!(
            "{:>22}  {:>9}  {:>9}  {:>9}  {:>9}\n",
            "table name", "read", "written", "errors", "time"
        ));
        out.push_str(&rule);

        for phase in self.phases.iter().filter(|p| p.label == "before load") {
            out.push_str(&render_phase_line(phase));
        }

        for table in &self.tables {
            let marker = if table.failed.is_some() { "!" } else { "" };
            out.push_str(&format!(
                "{:>22}  {:>9}  {:>9}  {:>9}  {:>8.3}s\n",
                format!("{}{}", marker, table.table),
                table.rows_read,
                table.rows_written,
                table.errors,
                table.seconds
            ));
        }

        for phase in self.phases.iter().filter(|p| p.label != "before load") {
            out.push_str(&render_phase_line(phase));
        }

        out.push_str(&rule);
        out.push_str(&format!(
            "{:>22}  {:>9}  {:>9}  {:>9}  {:>8.3}s\n",
            "Total",
            self.total_rows_read,
            self.total_rows_written,
            self.total_errors,
            self.duration_seconds
        ));

        for table in &self.failed_tables {
            out.push_str(&format!("! {}: copy failed\n", table));
        }
        out
    }

    /// Convert to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn render_phase_line(phase: &PhaseReport) -> String {
    format!(
        "{:>22}  {:>9}  {:>9}  {:>9}  {:>8.3}s\n",
        phase.label, "-", phase.items, phase.errors, phase.seconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> StateBundle {
        let mut before = PhaseStats::new("before load");
        before.items = 2;
        before.elapsed = Duration::from_millis(12);

        let mut index = PhaseStats::new("index build");
        index.items = 3;
        index.errors = 1;
        index.elapsed = Duration::from_millis(100);

        let mut users = TableStats::new("users");
        users.rows_read = 1000;
        users.rows_written = 1000;
        users.elapsed = Duration::from_millis(420);

        let mut posts = TableStats::new("posts");
        posts.rows_read = 10;
        posts.rows_written = 5;
        posts.errors = 1;
        posts.failed = Some("stream failure".into());

        StateBundle {
            before: Some(before),
            tables: vec![users, posts],
            index: Some(index),
            sequences: None,
        }
    }

    fn report() -> RunReport {
        let started = Utc::now();
        RunReport::from_bundle("run-1".into(), started, started, &bundle())
    }

    #[test]
    fn test_totals() {
        let report = report();
        assert_eq!(report.total_rows_read, 1010);
        assert_eq!(report.total_rows_written, 1005);
        // 1 table error + 1 index error
        assert_eq!(report.total_errors, 2);
        assert_eq!(report.failed_tables, vec!["posts".to_string()]);
    }

    #[test]
    fn test_exactly_one_entry_per_copied_table() {
        let report = report();
        let mut names: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), report.tables.len());
    }

    #[test]
    fn test_render_contains_rows_and_phases() {
        let rendered = report().render();
        assert!(rendered.contains("users"));
        assert!(rendered.contains("1000"));
        assert!(rendered.contains("before load"));
        assert!(rendered.contains("index build"));
        assert!(rendered.contains("Total"));
        assert!(rendered.contains("!posts"));
    }

    #[test]
    fn test_json_roundtrips() {
        let json = report().to_json().unwrap();
        assert!(json.contains("\"run_id\""));
        assert!(json.contains("\"users\""));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total_rows_read"], 1010);
    }

    #[tokio::test]
    async fn test_phase_record_accumulates_elapsed() {
        let mut phase = PhaseStats::new("before load");
        let value = phase
            .record(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                7
            })
            .await;
        assert_eq!(value, 7);
        assert!(phase.elapsed >= Duration::from_millis(15));
    }
}
