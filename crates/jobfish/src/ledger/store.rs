//! Append-only record of apply attempts with write-through persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::db::{application_repo, Database};

use super::application::{
    Application, ApplicationStatus, ApplicationUpdate, FailureKind, FailureReason,
};
use super::error::LedgerError;

#[derive(Default)]
struct LedgerState {
    /// Insertion order. Entries are never removed, so indices stay valid.
    entries: Vec<Application>,
    by_id: HashMap<String, usize>,
    /// job id -> index of its non-terminal application.
    in_flight: HashMap<String, usize>,
    by_remote_id: HashMap<String, usize>,
}

impl LedgerState {
    fn insert(&mut self, app: Application) {
        let idx = self.entries.len();
        self.by_id.insert(app.id.clone(), idx);
        if !app.is_terminal() {
            self.in_flight.insert(app.job_id.clone(), idx);
        }
        if let Some(remote_id) = &app.remote_id {
            self.by_remote_id.insert(remote_id.clone(), idx);
        }
        self.entries.push(app);
    }
}

/// The application ledger.
///
/// Serves reads from memory. When a [`Database`] is attached, every append
/// is persisted before it becomes visible, and every update is persisted
/// after it is applied.
pub struct ApplicationLedger {
    state: RwLock<LedgerState>,
    db: Option<Database>,
}

impl Default for ApplicationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationLedger {
    /// Creates a memory-only ledger.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            db: None,
        }
    }

    /// Creates a ledger backed by `db`. Call [`load_from_database`] to pick
    /// up applications from a previous run.
    ///
    /// [`load_from_database`]: ApplicationLedger::load_from_database
    pub fn with_database(db: Database) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            db: Some(db),
        }
    }

    /// Loads persisted applications into memory.
    ///
    /// Applications still `pending` belong to apply calls that died with the
    /// previous process; they are failed with reason `interrupted`.
    /// Returns the number of applications loaded.
    pub fn load_from_database(&self) -> Result<usize, LedgerError> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let mut rows = application_repo::list_all(db)?;
        // list_all is newest first; the ledger keeps insertion order.
        rows.reverse();

        let mut state = self.write_guard();
        let mut interrupted = 0usize;
        for row in rows {
            let mut app = Application::from_row(row);
            if state.by_id.contains_key(&app.id) {
                continue;
            }
            if app.status == ApplicationStatus::Pending {
                let update = ApplicationUpdate::failed(FailureReason::new(
                    FailureKind::Interrupted,
                    "process restarted before the agent acknowledged",
                ));
                if app.apply_update(update).is_ok() {
                    self.persist_update(&app);
                    interrupted += 1;
                }
            }
            if !app.is_terminal() {
                if let Some(existing) = state.in_flight.remove(&app.job_id) {
                    // Keep the newest in flight; the older one can no longer be tracked.
                    let older = &mut state.entries[existing];
                    log::warn!(
                        "Job {} has several in-flight applications on disk, failing {} in favour of {}",
                        app.job_id,
                        older.id,
                        app.id
                    );
                    let update = ApplicationUpdate::failed(FailureReason::new(
                        FailureKind::Interrupted,
                        "superseded by a newer in-flight application for the same job",
                    ));
                    if older.apply_update(update).is_ok() {
                        let older = older.clone();
                        self.persist_update(&older);
                        interrupted += 1;
                    }
                }
            }
            state.insert(app);
        }

        if interrupted > 0 {
            log::warn!(
                "Marked {} interrupted application(s) as failed",
                interrupted
            );
        }
        log::info!("Loaded {} application(s) from database", state.entries.len());
        Ok(state.entries.len())
    }

    /// Appends a new application.
    ///
    /// Refuses a second non-terminal application for the same job. Nothing
    /// becomes visible if persistence fails.
    pub fn append(&self, app: Application) -> Result<Application, LedgerError> {
        let mut state = self.write_guard();

        if state.by_id.contains_key(&app.id) {
            return Err(LedgerError::DuplicateId(app.id));
        }
        if !app.is_terminal() {
            if let Some(&idx) = state.in_flight.get(&app.job_id) {
                return Err(LedgerError::Conflict {
                    job_id: app.job_id,
                    application_id: state.entries[idx].id.clone(),
                });
            }
        }

        if let Some(db) = &self.db {
            application_repo::insert(db, &app.to_row()?)?;
        }

        log::debug!("Appended application {} for job {}", app.id, app.job_id);
        state.insert(app.clone());
        Ok(app)
    }

    /// Moves an application to a new status. Returns the updated record.
    ///
    /// The in-memory record is authoritative: a persistence failure here is
    /// logged and does not undo the transition.
    pub fn update(&self, id: &str, update: ApplicationUpdate) -> Result<Application, LedgerError> {
        let mut state = self.write_guard();
        let idx = *state
            .by_id
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        state.entries[idx].apply_update(update)?;

        let app = state.entries[idx].clone();
        if app.is_terminal() {
            if state.in_flight.get(&app.job_id) == Some(&idx) {
                state.in_flight.remove(&app.job_id);
            }
        }
        if let Some(remote_id) = &app.remote_id {
            state.by_remote_id.insert(remote_id.clone(), idx);
        }
        drop(state);

        self.persist_update(&app);
        log::debug!("Application {} is now {}", app.id, app.status);
        Ok(app)
    }

    pub fn get(&self, id: &str) -> Result<Application, LedgerError> {
        let state = self.read_guard();
        state
            .by_id
            .get(id)
            .map(|&idx| state.entries[idx].clone())
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Looks up an application by the agent's run id.
    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<Application> {
        let state = self.read_guard();
        state
            .by_remote_id
            .get(remote_id)
            .map(|&idx| state.entries[idx].clone())
    }

    /// Returns the job's `pending` or `streaming` application, if any.
    pub fn find_non_terminal_by_job(&self, job_id: &str) -> Option<Application> {
        let state = self.read_guard();
        state
            .in_flight
            .get(job_id)
            .map(|&idx| state.entries[idx].clone())
    }

    /// All applications, most recently created first. Ties on the creation
    /// timestamp fall back to insertion order, newest first.
    pub fn list(&self) -> Vec<Application> {
        let state = self.read_guard();
        let mut order: Vec<usize> = (0..state.entries.len()).collect();
        order.sort_by(|&a, &b| {
            state.entries[b]
                .created_at
                .cmp(&state.entries[a].created_at)
                .then(b.cmp(&a))
        });
        order.into_iter().map(|i| state.entries[i].clone()).collect()
    }

    /// Applications currently in `status`, oldest first.
    pub fn list_by_status(&self, status: ApplicationStatus) -> Vec<Application> {
        self.read_guard()
            .entries
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_guard().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist_update(&self, app: &Application) {
        let Some(db) = &self.db else {
            return;
        };
        let result = app
            .to_row()
            .and_then(|row| application_repo::update(db, &row));
        match result {
            Ok(true) => {}
            Ok(false) => log::warn!("Application {} missing from database on update", app.id),
            Err(e) => log::error!("Failed to persist application {}: {}", app.id, e),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, LedgerState> {
        match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Ledger lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, LedgerState> {
        match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Ledger lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
