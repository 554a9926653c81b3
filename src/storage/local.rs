// src/storage/local.rs

//! JSON-file checkpoint store.
//!
//! Writes go to a temp file next to the target and are renamed into
//! place, so the previous checkpoint stays valid until the new one is
//! fully on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::UnifiedRecord;
use crate::storage::{Checkpoint, CheckpointStore, CHECKPOINT_VERSION};

pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AppError::checkpoint)?;
        }

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(AppError::checkpoint)?;
        file.write_all(bytes).await.map_err(AppError::checkpoint)?;
        file.flush().await.map_err(AppError::checkpoint)?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(AppError::checkpoint)?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn save(
        &self,
        last_completed_index: Option<u64>,
        records: &[UnifiedRecord],
    ) -> Result<()> {
        let checkpoint = Checkpoint::new(last_completed_index, records.to_vec())?;
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        self.write_atomic(&bytes).await?;
        log::debug!(
            "checkpoint saved: cursor={:?}, {} records",
            last_completed_index,
            records.len()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<Checkpoint>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::checkpoint(e)),
        };

        let checkpoint: Checkpoint = match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                log::warn!(
                    "checkpoint at {:?} is unreadable ({}), starting over",
                    self.path,
                    e
                );
                return Ok(None);
            }
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            log::warn!(
                "checkpoint at {:?} has version {} (expected {}), starting over",
                self.path,
                checkpoint.version,
                CHECKPOINT_VERSION
            );
            return Ok(None);
        }

        if !checkpoint.verify() {
            log::warn!(
                "checkpoint at {:?} failed its checksum, starting over",
                self.path
            );
            return Ok(None);
        }

        Ok(Some(checkpoint))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::checkpoint(e)),
        }
    }
}
