//! The multisig batch queue: a durable, deduplicated, ordered list of
//! privileged calls waiting for the multisig to execute them.
//!
//! Draining is two-phase. [`BatchQueue::drain_all`] hands out the pending
//! calls but keeps them persisted until [`BatchQueue::commit`] confirms they
//! were executed or proposed; [`BatchQueue::restore`] puts them back.

use std::{
    fs,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use tracing::info;

use crate::{
    errors::ScriptError,
    types::PendingCall,
    utils::{read_json_file, write_json_file},
};

/// Durable storage for the batch document
pub trait BatchStore {
    /// Load the persisted calls, in insertion order.
    /// A store that was never written holds no calls.
    fn load(&self) -> Result<Vec<PendingCall>, ScriptError>;

    /// Replace the persisted calls. Must never leave a half-written document.
    fn store(&mut self, calls: &[PendingCall]) -> Result<(), ScriptError>;

    /// Remove the persisted document
    fn delete(&mut self) -> Result<(), ScriptError>;
}

/// A batch store backed by a single JSON array document
pub struct FileBatchStore {
    /// The path of the batch document
    path: PathBuf,
}

impl FileBatchStore {
    /// A store at `path`; the file is created on first store
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the batch document
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BatchStore for FileBatchStore {
    fn load(&self) -> Result<Vec<PendingCall>, ScriptError> {
        // An empty file is what a crashed first push would leave behind
        if fs::metadata(&self.path).is_ok_and(|m| m.len() == 0) {
            return Ok(Vec::new());
        }

        Ok(read_json_file(&self.path, ScriptError::ReadBatch)?.unwrap_or_default())
    }

    fn store(&mut self, calls: &[PendingCall]) -> Result<(), ScriptError> {
        write_json_file(&self.path, &calls, ScriptError::WriteBatch)
    }

    fn delete(&mut self) -> Result<(), ScriptError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScriptError::WriteBatch(e.to_string())),
        }
    }
}

/// A batch store held in memory
#[derive(Default)]
pub struct MemoryBatchStore {
    /// The persisted calls, `None` when no document exists
    calls: Option<Vec<PendingCall>>,
}

impl MemoryBatchStore {
    /// Whether a document currently exists
    pub fn exists(&self) -> bool {
        self.calls.is_some()
    }
}

impl BatchStore for MemoryBatchStore {
    fn load(&self) -> Result<Vec<PendingCall>, ScriptError> {
        Ok(self.calls.clone().unwrap_or_default())
    }

    fn store(&mut self, calls: &[PendingCall]) -> Result<(), ScriptError> {
        self.calls = Some(calls.to_vec());
        Ok(())
    }

    fn delete(&mut self) -> Result<(), ScriptError> {
        self.calls = None;
        Ok(())
    }
}

/// The queue of calls deferred to the multisig
pub struct BatchQueue {
    /// The durable backing store
    store: Box<dyn BatchStore>,
    /// Calls handed out by `drain_all` and not yet committed
    in_flight: Vec<PendingCall>,
    /// Calls waiting to be drained
    pending: Vec<PendingCall>,
}

impl BatchQueue {
    /// Open the queue, loading any calls persisted by a previous run
    pub fn open(store: Box<dyn BatchStore>) -> Result<Self, ScriptError> {
        let pending = store.load()?.into_iter().unique().collect();
        Ok(Self {
            store,
            in_flight: Vec::new(),
            pending,
        })
    }

    /// Append a call, returning whether it was new.
    ///
    /// A call identical in `(to, data, value)` to one already queued is
    /// dropped.
    pub fn push(&mut self, call: PendingCall) -> Result<bool, ScriptError> {
        if self.in_flight.contains(&call) || self.pending.contains(&call) {
            info!(
                "Call to {:#x} is already queued for the multisig, skipping",
                call.to
            );
            return Ok(false);
        }

        self.pending.push(call);
        if let Err(e) = self.persist() {
            self.pending.pop();
            return Err(e);
        }

        info!("Call queued for multisig execution ({} pending)", self.len());
        Ok(true)
    }

    /// The calls waiting to be drained, in insertion order
    pub fn pending(&self) -> &[PendingCall] {
        &self.pending
    }

    /// The number of calls not yet committed
    pub fn len(&self) -> usize {
        self.in_flight.len() + self.pending.len()
    }

    /// Whether no calls are waiting or in flight
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every pending call, in insertion order.
    ///
    /// The calls stay persisted until [`BatchQueue::commit`] is called.
    pub fn drain_all(&mut self) -> Vec<PendingCall> {
        let drained = std::mem::take(&mut self.pending);
        self.in_flight.extend(drained.iter().cloned());
        drained
    }

    /// Forget the drained calls for good, deleting the document if nothing
    /// else was queued since the drain
    pub fn commit(&mut self) -> Result<(), ScriptError> {
        if self.pending.is_empty() {
            self.store.delete()?;
        } else {
            self.store.store(&self.pending)?;
        }

        self.in_flight.clear();
        Ok(())
    }

    /// Return the drained calls to the front of the queue
    pub fn restore(&mut self) -> Result<(), ScriptError> {
        let mut restored = std::mem::take(&mut self.in_flight);
        restored.append(&mut self.pending);
        self.pending = restored;
        self.persist()
    }

    /// Write every uncommitted call to the backing store
    fn persist(&mut self) -> Result<(), ScriptError> {
        let calls = self
            .in_flight
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect_vec();
        self.store.store(&calls)
    }
}
