//! Replication orchestrator.
//!
//! Spawns one [`PartitionWorker`] per partition, waits for all of them and
//! folds their outcomes into a [`ReplicationReport`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::traits::{ConnectionFactory, Dialect};
use crate::core::{ColumnSelection, ConnectionRole, PartitionSpec};
use crate::drivers::DriverFactory;
use crate::error::{ErrorKind, ReplicateError, Result};
use crate::pipeline::{PartitionOutcome, PartitionWorker, StatementBuilder};

/// Replication orchestrator.
pub struct Replicator {
    config: Config,
    factory: Arc<dyn ConnectionFactory>,
    source_dialect: Arc<dyn Dialect>,
    sink_dialect: Arc<dyn Dialect>,
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every partition committed.
    Completed,
    /// Some partitions committed, others failed.
    Partial,
    /// No partition committed.
    Failed,
    /// The run was cancelled from outside.
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of a single partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStatus {
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PartitionStatus::Completed => "completed",
            PartitionStatus::Failed => "failed",
            PartitionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Report for a single partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionReport {
    pub index: u32,

    pub status: PartitionStatus,

    /// Rows committed by this partition (0 unless completed).
    pub rows_written: u64,

    pub duration_seconds: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a replication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Number of partitions.
    pub jobs: u32,

    /// Rows committed by completed partitions.
    pub rows_written: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Per-partition outcomes, ordered by index.
    pub partitions: Vec<PartitionReport>,
}

impl ReplicationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Partitions that did not complete.
    pub fn failed_partitions(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| p.status != PartitionStatus::Completed)
    }
}

/// Statements a run would execute, computed without connecting.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationPlan {
    pub jobs: u32,
    pub batch_size: usize,
    /// `(partition index, read SQL)`; the index is bound as the parameter.
    pub reads: Vec<(u32, String)>,
    /// INSERT statement, `None` when the row width is only known once the
    /// first row arrives.
    pub insert: Option<String>,
}

/// Connectivity check for both endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub sink_connected: bool,
    pub sink_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_error: Option<String>,
    pub healthy: bool,
}

impl Replicator {
    /// Create a replicator using the real database drivers.
    ///
    /// No connection is opened until [`run`](Self::run) or
    /// [`health_check`](Self::health_check).
    pub fn new(config: Config) -> Result<Self> {
        let factory = DriverFactory::from_config(&config);
        let source_dialect = Arc::new(factory.dialect(ConnectionRole::Source)?);
        let sink_dialect = Arc::new(factory.dialect(ConnectionRole::Sink)?);
        Ok(Self::with_factory(
            config,
            Arc::new(factory),
            source_dialect,
            sink_dialect,
        ))
    }

    /// Create a replicator over an arbitrary connection factory.
    pub fn with_factory(
        config: Config,
        factory: Arc<dyn ConnectionFactory>,
        source_dialect: Arc<dyn Dialect>,
        sink_dialect: Arc<dyn Dialect>,
    ) -> Self {
        Self {
            config,
            factory,
            source_dialect,
            sink_dialect,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build every partition's read statement and the INSERT shape.
    pub fn plan(&self) -> Result<ReplicationPlan> {
        let jobs = self.config.replication.jobs;
        let source = self.config.source.table_descriptor();
        let sink = self.config.sink.table_descriptor();

        let read = StatementBuilder::new(self.source_dialect.as_ref())
            .build_read_statement(&source, jobs)?;
        let reads = PartitionSpec::all(jobs)?
            .into_iter()
            .map(|p| (p.index(), read.sql.clone()))
            .collect();

        let width = match (&sink.columns, &source.columns) {
            (ColumnSelection::Explicit(cols), _) => Some(cols.len()),
            (ColumnSelection::All, ColumnSelection::Explicit(cols))
                if source.effective_query().is_none() =>
            {
                Some(cols.len())
            }
            _ => None,
        };
        let insert = width
            .map(|w| {
                StatementBuilder::new(self.sink_dialect.as_ref()).build_insert_statement(&sink, w)
            })
            .transpose()?
            .map(|i| i.sql);

        Ok(ReplicationPlan {
            jobs,
            batch_size: self.config.replication.batch_size,
            reads,
            insert,
        })
    }

    /// Run every partition to completion.
    ///
    /// Partition failures are reported, not returned; `Err` is only
    /// returned when the run cannot start.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ReplicationReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        let replication = &self.config.replication;
        let partitions = PartitionSpec::all(replication.jobs)?;
        let source = Arc::new(self.config.source.table_descriptor());
        let sink = Arc::new(self.config.sink.table_descriptor());

        // Validate statement shapes once before opening any connection
        StatementBuilder::new(self.source_dialect.as_ref())
            .build_read_statement(&source, replication.jobs)?;

        info!(
            "Starting replication run {}: {} partitions, batch size {}{}",
            run_id,
            replication.jobs,
            replication.batch_size,
            if replication.fail_fast { ", fail fast" } else { "" }
        );

        let run_token = cancel.child_token();
        let mut handles = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let worker = PartitionWorker::new(
                self.factory.clone(),
                self.source_dialect.clone(),
                self.sink_dialect.clone(),
                partition,
                replication.batch_size,
                run_token.clone(),
            );
            let source = source.clone();
            let sink = sink.clone();
            let token = run_token.clone();
            let fail_fast = replication.fail_fast;

            let handle = tokio::spawn(async move {
                let outcome = worker.run(&source, &sink).await;
                if fail_fast {
                    if let Err(e) = &outcome.result {
                        if !matches!(e, ReplicateError::Cancelled) {
                            warn!(
                                "Partition {} failed, cancelling remaining partitions",
                                outcome.partition
                            );
                            token.cancel();
                        }
                    }
                }
                outcome
            });
            handles.push((partition, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (partition, handle) in handles {
            let report = match handle.await {
                Ok(outcome) => partition_report(outcome),
                Err(e) => {
                    error!("Partition {}: task panicked - {}", partition, e);
                    PartitionReport {
                        index: partition.index(),
                        status: PartitionStatus::Failed,
                        rows_written: 0,
                        duration_seconds: 0.0,
                        error_kind: Some(ErrorKind::Other),
                        error: Some(format!("Task panicked: {}", e)),
                    }
                }
            };
            reports.push(report);
        }

        let duration = start.elapsed();
        let rows_written: u64 = reports.iter().map(|r| r.rows_written).sum();
        let completed = reports.iter().filter(|r| r.status == PartitionStatus::Completed).count();

        let status = if completed == reports.len() {
            RunStatus::Completed
        } else if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else if completed == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };

        let rows_per_second = if duration.as_secs_f64() > 0.0 {
            (rows_written as f64 / duration.as_secs_f64()) as u64
        } else {
            0
        };

        info!(
            "Replication {}: {} rows, {}/{} partitions completed in {:.2}s ({} rows/sec)",
            status,
            rows_written,
            completed,
            reports.len(),
            duration.as_secs_f64(),
            rows_per_second
        );

        Ok(ReplicationReport {
            run_id,
            status,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: duration.as_secs_f64(),
            jobs: replication.jobs,
            rows_written,
            rows_per_second,
            partitions: reports,
        })
    }

    /// Open one source and one sink connection and time a round trip on each.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let (source_connected, source_latency_ms, source_error) =
            self.probe(ConnectionRole::Source).await;
        let (sink_connected, sink_latency_ms, sink_error) = self.probe(ConnectionRole::Sink).await;

        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            sink_connected,
            sink_latency_ms,
            sink_error,
            healthy: source_connected && sink_connected,
        })
    }

    async fn probe(&self, role: ConnectionRole) -> (bool, u64, Option<String>) {
        let start = Instant::now();
        let result = async {
            let mut conn = self.factory.open(role).await?;
            let ping = conn.execute("SELECT 1").await;
            if let Err(e) = conn.close().await {
                warn!("Health check: error closing {} connection: {}", role, e);
            }
            ping
        }
        .await;
        let latency = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => (true, latency, None),
            Err(e) => (false, latency, Some(e.to_string())),
        }
    }
}

fn partition_report(outcome: PartitionOutcome) -> PartitionReport {
    let index = outcome.partition.index();
    let duration_seconds = outcome.duration.as_secs_f64();
    match outcome.result {
        Ok(rows) => {
            info!("Partition {}: completed ({} rows)", outcome.partition, rows);
            PartitionReport {
                index,
                status: PartitionStatus::Completed,
                rows_written: rows,
                duration_seconds,
                error_kind: None,
                error: None,
            }
        }
        Err(e) => {
            let status = if matches!(e, ReplicateError::Cancelled) {
                warn!("Partition {}: cancelled", outcome.partition);
                PartitionStatus::Cancelled
            } else {
                error!("Partition {}: failed - {}", outcome.partition, e);
                PartitionStatus::Failed
            };
            PartitionReport {
                index,
                status,
                rows_written: 0,
                duration_seconds,
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
            }
        }
    }
}
