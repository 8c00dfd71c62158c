//! In-memory store of the most recent search results.
//!
//! Single writer, many readers: a replacement builds the new snapshot
//! outside the lock and swaps an `Arc`, so readers only ever wait for the
//! pointer swap and never observe a half-replaced list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::job::Job;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Job not found: {0}")]
pub struct JobNotFound(pub String);

/// An immutable view of one search's results.
#[derive(Debug, Default)]
pub struct JobSnapshot {
    generation: u64,
    jobs: Vec<Job>,
    index: HashMap<String, usize>,
    replaced_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    fn build(generation: u64, jobs: Vec<Job>) -> Self {
        let mut kept = Vec::with_capacity(jobs.len());
        let mut index = HashMap::with_capacity(jobs.len());
        for job in jobs {
            // First occurrence wins; the search ranking is preserved.
            if index.contains_key(&job.id) {
                log::debug!("Dropping duplicate job {} from snapshot", job.id);
                continue;
            }
            index.insert(job.id.clone(), kept.len());
            kept.push(job);
        }
        Self {
            generation,
            jobs: kept,
            index,
            replaced_at: Some(Utc::now()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.index.get(id).map(|&i| &self.jobs[i])
    }

    pub fn replaced_at(&self) -> Option<DateTime<Utc>> {
        self.replaced_at
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Holds the latest search snapshot.
///
/// Every search takes a generation ticket from [`JobStore::next_generation`]
/// before calling the agent; [`JobStore::replace_if_newer`] only installs a
/// result whose ticket is newer than the current snapshot's.
pub struct JobStore {
    current: RwLock<Arc<JobSnapshot>>,
    generations: AtomicU64,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(JobSnapshot::default())),
            generations: AtomicU64::new(0),
        }
    }

    /// Issues a new, strictly increasing generation ticket.
    pub fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Atomically swaps in `jobs` as the current snapshot.
    pub fn replace(&self, jobs: Vec<Job>) {
        let generation = self.next_generation();
        self.replace_if_newer(generation, jobs);
    }

    /// Installs `jobs` if `generation` is newer than the current snapshot.
    /// Returns `false` when the result was superseded and discarded.
    pub fn replace_if_newer(&self, generation: u64, jobs: Vec<Job>) -> bool {
        self.offer(generation, jobs).1
    }

    /// Like [`JobStore::replace_if_newer`], but also hands back the
    /// deduplicated snapshot built from `jobs`, installed or not.
    pub fn offer(&self, generation: u64, jobs: Vec<Job>) -> (Arc<JobSnapshot>, bool) {
        let snapshot = Arc::new(JobSnapshot::build(generation, jobs));
        let mut guard = self.write_guard();
        if guard.generation >= generation {
            log::debug!(
                "Discarding search generation {} (current is {})",
                generation,
                guard.generation
            );
            return (snapshot, false);
        }
        *guard = Arc::clone(&snapshot);
        (snapshot, true)
    }

    /// Looks up a job in the current snapshot.
    pub fn get(&self, id: &str) -> Result<Job, JobNotFound> {
        self.snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| JobNotFound(id.to_string()))
    }

    /// Returns the current jobs in search order.
    pub fn list(&self) -> Vec<Job> {
        self.snapshot().jobs().to_vec()
    }

    /// Returns the current snapshot without copying it.
    pub fn snapshot(&self) -> Arc<JobSnapshot> {
        Arc::clone(&self.read_guard())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Arc<JobSnapshot>> {
        match self.current.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Arc<JobSnapshot>> {
        match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
