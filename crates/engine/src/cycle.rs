//! One poll cycle for one job: query, deliver, advance, commit.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use delta_core::{CaptureState, Clock, Job, Watermark};
use delta_registry::{JobRegistry, RegistryError};
use delta_source::{build_query, Dialect, SourceConnector, SourceError};
use delta_storage::{BatchSink, DeliveryError, ObjectKey};

use crate::advance::{advance, WatermarkAnomaly};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Fetching,
    Querying,
    Delivering,
    Committing,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CyclePhase::Fetching => "fetching",
            CyclePhase::Querying => "querying",
            CyclePhase::Delivering => "delivering",
            CyclePhase::Committing => "committing",
        })
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// The batch is durable at `key` but the watermark did not move; the
    /// next cycle re-delivers it.
    #[error("delivered to {key} but commit failed: {source}")]
    Commit {
        key: ObjectKey,
        #[source]
        source: RegistryError,
    },

    #[error("cycle task aborted: {0}")]
    Aborted(String),
}

impl CycleError {
    pub fn phase(&self) -> CyclePhase {
        match self {
            CycleError::Source(SourceError::UnsupportedVendor(_)) => CyclePhase::Fetching,
            CycleError::Source(_) => CyclePhase::Querying,
            CycleError::Delivery(_) => CyclePhase::Delivering,
            CycleError::Commit { .. } => CyclePhase::Committing,
            CycleError::Aborted(_) => CyclePhase::Fetching,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The source had no new rows; nothing was written or committed.
    Idle,
    Delivered {
        key: ObjectKey,
        rows: usize,
        watermark: Watermark,
        anomaly: Option<WatermarkAnomaly>,
    },
}

/// Collaborators shared by every cycle task.
#[derive(Clone)]
pub struct CycleRunner {
    pub registry: Arc<dyn JobRegistry>,
    pub connector: Arc<dyn SourceConnector>,
    pub sink: Arc<dyn BatchSink>,
    pub clock: Arc<dyn Clock>,
    pub page_size: u32,
}

impl CycleRunner {
    /// Run one cycle against the listed snapshot of `job`.
    pub async fn run(&self, job: &Job) -> Result<CycleOutcome, CycleError> {
        // Fetching: state comes from the snapshot already in hand.
        let current = job.state.last_watermark.as_ref();
        let dialect = Dialect::for_vendor(&job.source.vendor)?;

        // Querying
        let query = build_query(dialect, &job.capture, current, self.page_size);
        if job.capture.watermark_column.is_none() {
            debug!(job_id = %job.id, "no watermark column, re-reading leading page");
        }
        let rows = self.connector.fetch(&job.source, &query).await?;
        if rows.is_empty() {
            debug!(job_id = %job.id, "no new rows");
            return Ok(CycleOutcome::Idle);
        }

        // Delivering
        let Some(key) = self.sink.deliver(job, &rows).await? else {
            return Ok(CycleOutcome::Idle);
        };

        // Committing
        let adv = advance(&job.capture, current, &rows, self.clock.now());
        if let Some(anomaly) = &adv.anomaly {
            warn!(job_id = %job.id, anomaly = %anomaly, "watermark held steady");
        }
        self.registry
            .update_state(job.id, CaptureState::at(adv.watermark.clone()))
            .await
            .map_err(|source| CycleError::Commit {
                key: key.clone(),
                source,
            })?;

        Ok(CycleOutcome::Delivered {
            key,
            rows: rows.len(),
            watermark: adv.watermark,
            anomaly: adv.anomaly,
        })
    }
}
