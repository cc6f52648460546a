//! Run orchestration: schema phase, parallel table copies, index builds,
//! sequence resets, summary.
//!
//! Worker layout: each active table gets one reader task and one sink task;
//! a semaphore bounds how many tables are active at once. A second
//! semaphore, sized to the largest per-table index count, bounds concurrent
//! index builds; index tasks for a table start once that table's data copy
//! is done and overlap later tables' copies. Sequence resets run after all
//! copies; the index pool drains last.

mod filter;

pub use filter::TableFilter;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, RunContext};
use crate::core::identifier::IdentCase;
use crate::core::schema::{Index, SourceDescriptor, Table};
use crate::error::{LoadError, Result};
use crate::pipeline::{self, CopyOptions};
use crate::source;
use crate::stats::{PhaseStats, RunReport, StateBundle, TableStats};
use crate::target::{self, ddl};

/// Load orchestrator.
pub struct Orchestrator {
    config: Config,
    ctx: RunContext,
}

impl Orchestrator {
    /// Create a new orchestrator from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ctx = RunContext::from_config(&config.load);
        Ok(Self { config, ctx })
    }

    /// Run the whole load and return the aggregated report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let load = self.config.load.clone();
        let target_config = self.config.target.clone();
        let case = if load.fold_identifiers {
            IdentCase::Fold
        } else {
            IdentCase::Preserve
        };

        info!(
            "run {}: loading {} source {} into {}:{}/{}",
            run_id,
            self.config.source.kind,
            self.config.source.path.display(),
            target_config.host,
            target_config.port,
            target_config.database
        );

        // Discovery runs on a blocking thread; the handle is released before
        // any copy starts.
        let source_config = self.config.source.clone();
        let mut tables = tokio::task::spawn_blocking(move || source::discover(&source_config))
            .await
            .map_err(|e| LoadError::Config(format!("discovery task panicked: {}", e)))??;

        let filter = TableFilter::from_options(&load)?;
        tables.retain(|t| filter.matches(&t.name));
        if tables.is_empty() {
            warn!("no tables selected, nothing to do");
        }

        let planned = build_plan(&tables, case)?;
        let mut bundle = StateBundle::default();

        // Schema phase. Freshly created tables are never truncated.
        let create_phase = !load.data_only && (load.create_tables || load.schema_only);
        let truncate_phase = !create_phase && load.truncate;
        if (create_phase || truncate_phase) && !planned.is_empty() {
            let mut phase = PhaseStats::new("before load");
            let descriptors: Vec<SourceDescriptor> =
                planned.iter().map(|p| p.descriptor.clone()).collect();
            let mut client = target::connect(&target_config).await?;

            if create_phase {
                phase
                    .record(ddl::ensure_schema(&client, &target_config.schema))
                    .await?;
                let created = phase
                    .record(ddl::create_tables(
                        &mut client,
                        &target_config.schema,
                        &descriptors,
                        load.include_drop,
                    ))
                    .await?;
                phase.items = created as u64;
            } else {
                phase
                    .record(ddl::truncate_tables(
                        &client,
                        &target_config.schema,
                        &descriptors,
                    ))
                    .await?;
                phase.items = descriptors.len() as u64;
            }
            bundle.before = Some(phase);
        }

        // Copy phase with the index pool alongside.
        let max_indexes = planned.iter().map(|p| p.indexes.len()).max().unwrap_or(0);
        let build_indexes =
            load.create_indexes && !load.data_only && !load.schema_only && max_indexes > 0;
        // No indexes means no index pool at all.
        let index_pool = build_indexes.then(|| Arc::new(Semaphore::new(max_indexes)));
        let (index_tx, mut index_rx) =
            mpsc::unbounded_channel::<JoinHandle<std::result::Result<(), LoadError>>>();

        if !load.schema_only {
            let copy_pool = Arc::new(Semaphore::new(load.concurrent_tables));
            let mut copy_handles: Vec<(String, JoinHandle<TableStats>)> = Vec::new();

            for plan in &planned {
                let table_name = plan.descriptor.target_table.clone();
                let handle = self.spawn_table_copy(
                    plan.clone(),
                    copy_pool.clone(),
                    index_pool.clone(),
                    index_tx.clone(),
                    cancel.clone(),
                );
                copy_handles.push((table_name, handle));
            }
            drop(index_tx);

            for (table_name, handle) in copy_handles {
                match handle.await {
                    Ok(stats) => bundle.tables.push(stats),
                    Err(e) => {
                        let mut stats = TableStats::new(table_name);
                        stats.failed = Some(format!("copy task panicked: {}", e));
                        bundle.tables.push(stats);
                    }
                }
            }
        } else {
            drop(index_tx);
        }

        // Sequence resets strictly follow all data copies.
        if load.reset_sequences && !cancel.is_cancelled() && !planned.is_empty() {
            let mut phase = PhaseStats::new("reset sequences");
            let descriptors: Vec<SourceDescriptor> =
                planned.iter().map(|p| p.descriptor.clone()).collect();
            match target::connect(&target_config).await {
                Ok(client) => {
                    let (reset, errors) = phase
                        .record(ddl::reset_sequences(
                            &client,
                            &target_config.schema,
                            &descriptors,
                        ))
                        .await;
                    phase.items = reset;
                    phase.errors = errors;
                }
                Err(e) => {
                    warn!("sequence reset skipped, connection failed: {}", e);
                    phase.errors += 1;
                }
            }
            bundle.sequences = Some(phase);
        }

        // Drain the index pool; failures were counted per index.
        if index_pool.is_some() {
            let mut phase = PhaseStats::new("index build");
            let (built, errors) = phase
                .record(async {
                    let mut built = 0u64;
                    let mut errors = 0u64;
                    while let Some(handle) = index_rx.recv().await {
                        match handle.await {
                            Ok(Ok(())) => built += 1,
                            Ok(Err(e)) => {
                                warn!("{}", e);
                                errors += 1;
                            }
                            Err(e) => {
                                warn!("index task panicked: {}", e);
                                errors += 1;
                            }
                        }
                    }
                    (built, errors)
                })
                .await;
            phase.items = built;
            phase.errors = errors;
            bundle.index = Some(phase);
        }

        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let completed_at = Utc::now();
        let report = RunReport::from_bundle(run_id, started_at, completed_at, &bundle);

        if let Some(path) = &self.ctx.summary_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, report.render())?;
            info!("summary written to {}", path.display());
        }

        Ok(report)
    }

    /// Spawn the reader/sink pair for one table; once its copy finishes,
    /// submit the table's index tasks to the index pool.
    fn spawn_table_copy(
        &self,
        plan: TablePlan,
        copy_pool: Arc<Semaphore>,
        index_pool: Option<Arc<Semaphore>>,
        index_tx: mpsc::UnboundedSender<JoinHandle<std::result::Result<(), LoadError>>>,
        cancel: CancellationToken,
    ) -> JoinHandle<TableStats> {
        let source_config = self.config.source.clone();
        let target_config = self.config.target.clone();
        let ctx = self.ctx.clone();
        let options = CopyOptions {
            // Bulk truncation already ran in the schema phase.
            truncate: false,
            queue_capacity: self.config.load.queue_capacity,
        };

        tokio::spawn(async move {
            let _permit = copy_pool
                .acquire_owned()
                .await
                .expect("copy pool semaphore closed");

            if cancel.is_cancelled() {
                let mut stats = TableStats::new(plan.descriptor.target_table.clone());
                stats.failed = Some("load cancelled".to_string());
                return stats;
            }

            debug!("{}: copy starting", plan.descriptor.target_table);
            let stats = pipeline::copy_table(
                source_config,
                target_config.clone(),
                plan.descriptor.clone(),
                options,
                ctx,
                cancel.clone(),
            )
            .await;

            if let Some(pool) = index_pool {
                if !cancel.is_cancelled() {
                    for index in plan.indexes {
                        let pool = pool.clone();
                        let target_config = target_config.clone();
                        let descriptor = plan.descriptor.clone();
                        let handle = tokio::spawn(async move {
                            let _permit = pool
                                .acquire_owned()
                                .await
                                .expect("index pool semaphore closed");
                            ddl::create_index(&target_config, &descriptor, &index).await
                        });
                        // The drain side outlives every copy task; a send
                        // failure only happens on shutdown.
                        let _ = index_tx.send(handle);
                    }
                }
            }

            stats
        })
    }
}

/// One table's copy plan: its descriptor plus the indexes to rebuild.
#[derive(Debug, Clone)]
struct TablePlan {
    descriptor: SourceDescriptor,
    indexes: Vec<Index>,
}

/// Build descriptors for the selected tables, filling column transforms and
/// type defaults once.
fn build_plan(tables: &[Table], case: IdentCase) -> Result<Vec<TablePlan>> {
    tables
        .iter()
        .map(|table| {
            Ok(TablePlan {
                descriptor: SourceDescriptor::new(table, case)?,
                indexes: table.indexes.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Encoding, LoadConfig, SourceConfig, SourceKind, TargetConfig};
    use crate::core::schema::{Column, TypeTag};
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            source: SourceConfig {
                kind: SourceKind::Sqlite,
                path: PathBuf::from("app.db"),
                encoding: Encoding::Utf8,
            },
            target: TargetConfig {
                host: "localhost".into(),
                port: 5432,
                database: "db".into(),
                user: "postgres".into(),
                password: "pw".into(),
                schema: "public".into(),
            },
            load: LoadConfig::default(),
        }
    }

    #[test]
    fn test_new_validates_config() {
        assert!(Orchestrator::new(config()).is_ok());

        let mut bad = config();
        bad.load.queue_capacity = 0;
        assert!(Orchestrator::new(bad).is_err());
    }

    #[test]
    fn test_build_plan_pairs_indexes_with_descriptors() {
        let tables = vec![Table {
            name: "users".into(),
            columns: vec![Column::new("id", TypeTag::Sqlite("INTEGER".into()))],
            indexes: vec![Index {
                name: "idx_users_id".into(),
                table: "users".into(),
                columns: vec!["id".into()],
                unique: true,
                predicate: None,
            }],
            row_count: None,
        }];

        let plan = build_plan(&tables, IdentCase::Fold).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].descriptor.target_table, "users");
        assert_eq!(plan[0].indexes.len(), 1);
        assert_eq!(
            plan[0].descriptor.columns.len(),
            plan[0].descriptor.transforms.len()
        );
    }
}
