//! Per-job mutual exclusion for the dedup check-and-create sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async lock per job id.
///
/// Entries hold only weak references, so a job's lock disappears once no
/// apply intent for it is waiting or running.
#[derive(Default)]
pub struct JobLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `job_id`. Intents for other jobs are
    /// not affected.
    pub async fn lock(&self, job_id: &str) -> OwnedMutexGuard<()> {
        self.entry(job_id).lock_owned().await
    }

    fn entry(&self, job_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job lock table was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if let Some(existing) = locks.get(job_id).and_then(Weak::upgrade) {
            return existing;
        }

        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(job_id.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Number of jobs with a live lock.
    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(g) => g.values().filter(|w| w.strong_count() > 0).count(),
            Err(poisoned) => poisoned
                .into_inner()
                .values()
                .filter(|w| w.strong_count() > 0)
                .count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
