// src/storage/mod.rs

//! Checkpoint persistence.
//!
//! A checkpoint is a versioned, checksummed snapshot of orchestrator
//! progress: the resume cursor plus every record committed so far. The
//! envelope is explicit about its schema version so a snapshot written by
//! an incompatible build is rejected outright instead of being misread.

mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::UnifiedRecord;

pub use local::JsonCheckpointStore;

/// Current checkpoint schema version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Durable snapshot of crawl progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,

    /// Highest task index such that every task at or below it has been
    /// processed. `None` when nothing has completed yet.
    pub last_completed_index: Option<u64>,

    pub saved_at: DateTime<Utc>,

    /// SHA-256 over the cursor and records, hex-encoded
    pub checksum: String,

    pub records: Vec<UnifiedRecord>,
}

impl Checkpoint {
    pub fn new(last_completed_index: Option<u64>, records: Vec<UnifiedRecord>) -> Result<Self> {
        let checksum = Self::compute_checksum(last_completed_index, &records)?;
        Ok(Self {
            version: CHECKPOINT_VERSION,
            last_completed_index,
            saved_at: Utc::now(),
            checksum,
            records,
        })
    }

    fn compute_checksum(
        last_completed_index: Option<u64>,
        records: &[UnifiedRecord],
    ) -> Result<String> {
        let payload = serde_json::to_vec(&(last_completed_index, records))?;
        Ok(hex::encode(Sha256::digest(&payload)))
    }

    /// Whether the stored checksum matches the envelope contents.
    pub fn verify(&self) -> bool {
        Self::compute_checksum(self.last_completed_index, &self.records)
            .map(|expected| expected == self.checksum)
            .unwrap_or(false)
    }

    /// First task index that still needs dispatching.
    pub fn resume_index(&self) -> usize {
        self.last_completed_index
            .map(|i| i as usize + 1)
            .unwrap_or(0)
    }
}

/// Storage backend for checkpoints.
///
/// `load` reports a corrupted or incompatible checkpoint as `None`:
/// starting over is always safe, aborting the run is not.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot atomically: a partial write must never
    /// corrupt the previous valid checkpoint.
    async fn save(&self, last_completed_index: Option<u64>, records: &[UnifiedRecord])
        -> Result<()>;

    /// The last valid checkpoint, or `None` when absent or unusable.
    async fn load(&self) -> Result<Option<Checkpoint>>;

    /// Remove the checkpoint after a successful full run.
    async fn clear(&self) -> Result<()>;
}
