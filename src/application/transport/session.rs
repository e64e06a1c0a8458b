//! Worker-bound sessions.
//!
//! Each worker gets its own session, created lazily on first use and reused
//! until it has served `max_uses` requests or an attempt on it timed out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::domain::WorkerId;
use crate::error::ConfigError;

/// A dispatcher session owned by one worker.
#[derive(Debug)]
pub struct Session<S> {
    id: Uuid,
    worker: WorkerId,
    uses: AtomicU64,
    inner: S,
}

impl<S> Session<S> {
    fn new(worker: WorkerId, inner: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            worker,
            uses: AtomicU64::new(0),
            inner,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Requests checked out against this session so far.
    pub fn uses(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn exhausted(&self, max_uses: u64) -> bool {
        max_uses > 0 && self.uses() >= max_uses
    }
}

/// Map from worker to its current session.
#[derive(Debug)]
pub struct SessionPool<S> {
    sessions: DashMap<WorkerId, Arc<Session<S>>>,
    max_uses: u64,
}

impl<S> SessionPool<S> {
    /// `max_uses` of 0 keeps sessions for the worker's lifetime.
    pub fn new(max_uses: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            max_uses,
        }
    }

    /// Session for `worker`, opening one with `open` if none is usable.
    ///
    /// # Errors
    ///
    /// Propagates the error from `open`.
    pub fn checkout<F>(&self, worker: WorkerId, open: F) -> Result<Arc<Session<S>>, ConfigError>
    where
        F: FnOnce() -> Result<S, ConfigError>,
    {
        if let Some(session) = self.sessions.get(&worker) {
            if !session.exhausted(self.max_uses) {
                session.uses.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&session));
            }
        }

        let session = match self.sessions.entry(worker) {
            Entry::Occupied(mut entry) => {
                if entry.get().exhausted(self.max_uses) {
                    let fresh = Arc::new(Session::new(worker, open()?));
                    debug!(
                        worker = worker.label(),
                        old = %entry.get().id,
                        new = %fresh.id,
                        uses = entry.get().uses(),
                        "Recycling worker session"
                    );
                    entry.insert(Arc::clone(&fresh));
                    fresh
                } else {
                    Arc::clone(entry.get())
                }
            }
            Entry::Vacant(entry) => {
                let fresh = Arc::new(Session::new(worker, open()?));
                debug!(worker = worker.label(), session = %fresh.id, "Opened worker session");
                entry.insert(Arc::clone(&fresh));
                fresh
            }
        };
        session.uses.fetch_add(1, Ordering::Relaxed);
        Ok(session)
    }

    /// Drop the worker's session so the next checkout opens a fresh one.
    pub fn reset(&self, worker: WorkerId) -> bool {
        self.sessions.remove(&worker).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }
}
