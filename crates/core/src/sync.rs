//! Sync driver
//!
//! Runs one direction end to end:
//!
//! ```text
//! Idle -> Enumerating -> MappingComplete -> Transferring(1..N) -> Done
//!   any state --error--> Failed
//! ```
//!
//! There is no retry state. A run reports success only if every mapped item
//! was transferred.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{CollisionPolicy, Direction, RunConfig};
use crate::enumerate::{list_members, walk_local};
use crate::error::{Error, Result};
use crate::mapping::{TransferItem, map_download, map_upload};
use crate::path::{LocalKind, LocalRef};
use crate::traits::SealedStore;
use crate::transfer::{TransferExecutor, TransferObserver};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Enumerating,
    MappingComplete { items: usize },
    Transferring { index: usize, total: usize },
    Done,
    Failed,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: Direction,
    pub bucket: String,
    pub object_key: String,
    pub items: Vec<TransferItem>,
    /// Plaintext bytes moved; zero for a dry run
    pub bytes: u64,
    pub dry_run: bool,
}

/// Drives a single download or upload run
pub struct SyncDriver<'a, S: SealedStore + ?Sized> {
    config: &'a RunConfig,
    store: &'a S,
    cancel: CancellationToken,
    observer: &'a dyn TransferObserver,
    state: RunState,
}

impl<'a, S: SealedStore + ?Sized> SyncDriver<'a, S> {
    pub fn new(
        config: &'a RunConfig,
        store: &'a S,
        cancel: CancellationToken,
        observer: &'a dyn TransferObserver,
    ) -> Self {
        Self {
            config,
            store,
            cancel,
            observer,
            state: RunState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run to completion or to the first error.
    pub async fn run(&mut self) -> Result<SyncReport> {
        match self.execute().await {
            Ok(report) => {
                self.transition(RunState::Done);
                tracing::info!(
                    direction = %self.config.direction,
                    items = report.items.len(),
                    bytes = report.bytes,
                    dry_run = report.dry_run,
                    "sync complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                tracing::debug!(error = %e, "sync failed");
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<SyncReport> {
        let config = self.config;
        let direction = config.direction;

        self.transition(RunState::Enumerating);
        let items = match direction {
            Direction::Download => self.plan_download().await,
            Direction::Upload => self.plan_upload(),
        }
        .map_err(|e| e.context(format!("{direction} {}", config.remote)))?;

        self.transition(RunState::MappingComplete { items: items.len() });
        self.observer.planned(&items);

        let mut report = SyncReport {
            direction,
            bucket: config.remote.bucket.clone(),
            object_key: config.remote.key.clone(),
            items,
            bytes: 0,
            dry_run: config.dry_run,
        };
        if config.dry_run {
            return Ok(report);
        }

        let total = report.items.len();
        let mut state = self.state;
        let executor = TransferExecutor::new(
            self.store,
            &config.remote.bucket,
            &self.cancel,
            self.observer,
        );
        let result = executor
            .run(&report.items, |index| {
                state = RunState::Transferring { index, total };
                tracing::debug!(?state, "state transition");
            })
            .await;
        self.state = state;

        report.bytes = result.map_err(|e| e.context(direction))?;
        Ok(report)
    }

    async fn plan_download(&self) -> Result<Vec<TransferItem>> {
        let config = self.config;
        let local = LocalRef::discover(&config.local)?;
        if local.is_file() {
            return Err(Error::InvalidPath(format!(
                "'{}' is a file; the download path must be a directory",
                config.local.display()
            )));
        }

        let members = list_members(self.store, &config.remote, &self.cancel).await?;
        tracing::debug!(members = members.len(), "enumerated remote members");
        map_download(&config.remote.key, &config.local, &members)
    }

    fn plan_upload(&self) -> Result<Vec<TransferItem>> {
        let config = self.config;
        let local = LocalRef::discover(&config.local)?;
        if local.kind == LocalKind::Missing {
            return Err(Error::NotFound(format!(
                "local path '{}' does not exist",
                config.local.display()
            )));
        }

        let files = walk_local(&local.path)?;
        let items = map_upload(&config.remote.key, &local.path, &files)?;

        if !config.remote.is_prefix() && items.len() > 1 {
            match config.collision {
                CollisionPolicy::Reject => {
                    return Err(Error::Conflict(format!(
                        "{} local files would all be written to the single key '{}'; \
                         end the key with '/' to keep the directory structure",
                        items.len(),
                        config.remote.key
                    )));
                }
                CollisionPolicy::LastWriterWins => {
                    tracing::warn!(
                        files = items.len(),
                        key = %config.remote.key,
                        "multiple files map to one key; the last one uploaded wins"
                    );
                }
            }
        }

        Ok(items)
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}
