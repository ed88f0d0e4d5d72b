//! # Checkpoint Persistence
//!
//! Durable snapshots of execution state, written after every step-status
//! transition and replayed for recovery. The engine only speaks to the
//! [`CheckpointStore`] trait; the blob layout is owned by this crate and
//! opaque to the storage collaborator.
//!
//! Two implementations ship here: an in-memory store (tests, embedded use)
//! and an append-only JSON-lines file store with one file per execution.

use crate::config::CheckpointConfig;
use crate::models::execution::{ExecutionCheckpoint, ExecutionId};
use crate::orchestration::errors::CheckpointError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Storage boundary for execution checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist one checkpoint
    async fn save(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), CheckpointError>;

    /// Load the highest-sequence checkpoint for an execution
    async fn load_latest(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionCheckpoint>, CheckpointError>;

    /// Every execution id with at least one checkpoint
    async fn list_executions(&self) -> Result<Vec<ExecutionId>, CheckpointError>;
}

/// Bounded in-memory checkpoint store
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    retain: usize,
    checkpoints: DashMap<ExecutionId, Vec<ExecutionCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new(config: &CheckpointConfig) -> Self {
        Self {
            retain: config.retain.max(1),
            checkpoints: DashMap::new(),
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), CheckpointError> {
        let mut entry = self
            .checkpoints
            .entry(checkpoint.execution_id())
            .or_default();
        entry.push(checkpoint.clone());
        let retain = self.retain.max(1);
        if entry.len() > retain {
            let excess = entry.len() - retain;
            entry.drain(..excess);
        }
        Ok(())
    }

    async fn load_latest(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionCheckpoint>, CheckpointError> {
        Ok(self
            .checkpoints
            .get(&execution_id)
            .and_then(|list| list.last().cloned()))
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionId>, CheckpointError> {
        Ok(self.checkpoints.iter().map(|e| *e.key()).collect())
    }
}

/// Append-only JSON-lines checkpoint store, one file per execution
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, execution_id: ExecutionId) -> PathBuf {
        self.dir.join(format!("{execution_id}.jsonl"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut line = serde_json::to_string(checkpoint)?;
        line.push('\n');

        let path = self.path_for(checkpoint.execution_id());
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        let mut file = options.open(&path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, line.as_bytes()).await?;
        debug!(
            execution_id = %checkpoint.execution_id(),
            sequence = checkpoint.sequence,
            "CHECKPOINT: Appended"
        );
        Ok(())
    }

    async fn load_latest(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionCheckpoint>, CheckpointError> {
        let path = self.path_for(execution_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<ExecutionCheckpoint> = None;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let checkpoint: ExecutionCheckpoint = serde_json::from_str(line)?;
            if latest.as_ref().map_or(true, |l| checkpoint.sequence >= l.sequence) {
                latest = Some(checkpoint);
            }
        }
        Ok(latest)
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionId>, CheckpointError> {
        let mut executions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(executions),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".jsonl") {
                if let Ok(id) = ExecutionId::from_str(stem) {
                    executions.push(id);
                }
            }
        }
        Ok(executions)
    }
}
