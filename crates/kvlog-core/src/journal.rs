//! Log-then-apply store wrapper
//!
//! [`JournaledStore`] is what a transport layer should mutate through: each
//! mutation is persisted to the transaction log first and only applied to the
//! store once its sequence is durable. A crash between the two steps leaves
//! the mutation in the log, where the next replay picks it up.
//!
//! Mutations are serialized: the store sees them in sequence order, the same
//! order replay applies them in. The journal must be the only producer on
//! its [`LogWriter`] for that to hold.

use crate::error::{LogError, Result};
use crate::store::KeyValueStore;
use crate::types::Sequence;
use crate::writer::LogWriter;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct JournaledStore<S> {
    store: S,
    log: Arc<LogWriter>,
    /// Held from enqueue until the store is updated
    order: Mutex<()>,
}

impl<S: KeyValueStore> JournaledStore<S> {
    pub fn new(store: S, log: Arc<LogWriter>) -> Self {
        Self {
            store,
            log,
            order: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn log(&self) -> &Arc<LogWriter> {
        &self.log
    }

    /// Persist a Put, then apply it; returns the event's sequence
    pub fn put(&self, key: &str, value: &str) -> Result<Sequence> {
        let _order = self.order.lock();
        let sequence = self.log.write_put(key, value)?.wait()?;
        self.store.put(key, value).map_err(|e| apply_error(sequence, e))?;
        Ok(sequence)
    }

    pub fn get(&self, key: &str) -> std::result::Result<String, S::Error> {
        self.store.get(key)
    }

    /// Persist a Delete, then apply it; returns the event's sequence
    pub fn delete(&self, key: &str) -> Result<Sequence> {
        let _order = self.order.lock();
        let sequence = self.log.write_delete(key)?.wait()?;
        self.store.delete(key).map_err(|e| apply_error(sequence, e))?;
        Ok(sequence)
    }

    pub fn into_inner(self) -> (S, Arc<LogWriter>) {
        (self.store, self.log)
    }
}

fn apply_error<E>(sequence: Sequence, error: E) -> LogError
where
    E: std::error::Error + Send + Sync + 'static,
{
    LogError::Apply {
        sequence,
        source: Box::new(error),
    }
}
