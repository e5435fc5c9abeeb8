//! Background refresh of vendor rule tables.
//!
//! One worker thread drains a FIFO queue of firewall ids. Collection itself
//! is delegated to a [`RuleCollector`]; job state is persisted through a
//! [`SyncStateStore`] so a restart can find jobs that never finished.

use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::table::Table;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl SyncState {
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Queued | SyncState::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncProgress {
    pub target: String,
    pub state: SyncState,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl SyncProgress {
    fn new(target: &str, state: SyncState) -> Self {
        Self {
            target: target.to_string(),
            state,
            percent: 0,
            message: None,
            updated_at: Local::now().naive_local(),
        }
    }
}

/// Fetches a firewall's current rule table.
pub trait RuleCollector: Send + Sync {
    /// `progress` takes a percentage in `0..=100`.
    fn collect(&self, target: &str, progress: &dyn Fn(u8)) -> anyhow::Result<Table>;
}

/// Durable job state and the collected tables.
pub trait SyncStateStore: Send + Sync {
    fn load_jobs(&self) -> Result<Vec<SyncProgress>>;
    fn save_job(&self, job: &SyncProgress) -> Result<()>;
    fn save_rules(&self, target: &str, rules: &Table) -> Result<()>;
}

type ActiveJobs = Arc<Mutex<HashMap<String, SyncProgress>>>;

fn lock(jobs: &ActiveJobs) -> MutexGuard<'_, HashMap<String, SyncProgress>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SyncManager {
    sender: Option<Sender<String>>,
    active: ActiveJobs,
    state: Arc<dyn SyncStateStore>,
    worker: Option<JoinHandle<()>>,
}

impl SyncManager {
    /// Spawns the worker thread.
    pub fn start(collector: Arc<dyn RuleCollector>, state: Arc<dyn SyncStateStore>) -> Self {
        let (sender, receiver) = mpsc::channel::<String>();
        let active: ActiveJobs = Arc::default();

        let worker = {
            let active = Arc::clone(&active);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for target in receiver {
                    run_job(&target, collector.as_ref(), state.as_ref(), &active);
                }
                debug!("sync worker stopped");
            })
        };

        Self {
            sender: Some(sender),
            active,
            state,
            worker: Some(worker),
        }
    }

    /// Queues `target`. A target already queued or running is rejected.
    pub fn start_sync(&self, target: &str) -> Result<()> {
        let reject = |message: &str| Error::Sync {
            target: target.to_string(),
            message: message.to_string(),
        };

        let (job, previous) = {
            let mut active = lock(&self.active);
            if active.get(target).is_some_and(|j| j.state.is_active()) {
                warn!(target, "sync already in flight");
                return Err(reject("already in progress"));
            }
            let job = SyncProgress::new(target, SyncState::Queued);
            let previous = active.insert(target.to_string(), job.clone());
            (job, previous)
        };

        // A job that never reached the worker must not hold the target.
        let unqueue = |previous: Option<SyncProgress>| {
            let mut active = lock(&self.active);
            match previous {
                Some(p) => active.insert(target.to_string(), p),
                None => active.remove(target),
            };
        };

        if let Err(err) = self.state.save_job(&job) {
            unqueue(previous);
            return Err(err);
        }

        let sent = self
            .sender
            .as_ref()
            .is_some_and(|s| s.send(target.to_string()).is_ok());
        if !sent {
            unqueue(previous);
            return Err(reject("worker is not running"));
        }
        info!(target, "sync queued");
        Ok(())
    }

    pub fn progress(&self, target: &str) -> Option<SyncProgress> {
        lock(&self.active).get(target).cloned()
    }

    /// Jobs currently queued or running, ordered by target.
    pub fn active(&self) -> Vec<SyncProgress> {
        let mut jobs: Vec<SyncProgress> = lock(&self.active)
            .values()
            .filter(|j| j.state.is_active())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.target.cmp(&b.target));
        jobs
    }

    /// Marks jobs a previous process left unfinished as failed. Returns their targets.
    pub fn recover_interrupted(state: &dyn SyncStateStore) -> Result<Vec<String>> {
        let mut recovered = Vec::new();
        for mut job in state.load_jobs()? {
            if !job.state.is_active() {
                continue;
            }
            warn!(target = %job.target, was = ?job.state, "interrupted sync marked failed");
            job.state = SyncState::Failed;
            job.message = Some("interrupted by restart".to_string());
            job.updated_at = Local::now().naive_local();
            state.save_job(&job)?;
            recovered.push(job.target);
        }
        Ok(recovered)
    }

    /// Drains the queue and stops the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("sync worker panicked");
            }
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record(active: &ActiveJobs, state: &dyn SyncStateStore, job: &SyncProgress) {
    lock(active).insert(job.target.clone(), job.clone());
    if let Err(e) = state.save_job(job) {
        warn!(target = %job.target, error = %e, "failed to persist sync state");
    }
}

fn run_job(
    target: &str,
    collector: &dyn RuleCollector,
    state: &dyn SyncStateStore,
    active: &ActiveJobs,
) {
    let mut job = SyncProgress::new(target, SyncState::InProgress);
    record(active, state, &job);
    info!(target, "sync started");

    let report = |percent: u8| {
        let mut jobs = lock(active);
        if let Some(j) = jobs.get_mut(target) {
            j.percent = percent.min(100);
            j.updated_at = Local::now().naive_local();
        }
    };

    let outcome = collector
        .collect(target, &report)
        .map_err(|e| e.to_string())
        .and_then(|table| state.save_rules(target, &table).map_err(|e| e.to_string()));

    job.updated_at = Local::now().naive_local();
    match outcome {
        Ok(()) => {
            job.state = SyncState::Completed;
            job.percent = 100;
            info!(target, "sync completed");
        }
        Err(message) => {
            error!(target, %message, "sync failed");
            job.state = SyncState::Failed;
            job.message = Some(message);
        }
    }
    record(active, state, &job);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryState {
        jobs: Mutex<HashMap<String, SyncProgress>>,
        rules: Mutex<Vec<String>>,
        /// Number of upcoming `save_job` calls that fail.
        failing_saves: Mutex<usize>,
    }

    impl SyncStateStore for MemoryState {
        fn load_jobs(&self) -> Result<Vec<SyncProgress>> {
            Ok(self.jobs.lock().unwrap().values().cloned().collect())
        }

        fn save_job(&self, job: &SyncProgress) -> Result<()> {
            let mut failing = self.failing_saves.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            drop(failing);
            self.jobs.lock().unwrap().insert(job.target.clone(), job.clone());
            Ok(())
        }

        fn save_rules(&self, target: &str, _rules: &Table) -> Result<()> {
            self.rules.lock().unwrap().push(target.to_string());
            Ok(())
        }
    }

    /// Blocks each collection until the test releases it.
    struct GatedCollector {
        gate: Mutex<Receiver<()>>,
    }

    impl RuleCollector for GatedCollector {
        fn collect(&self, target: &str, progress: &dyn Fn(u8)) -> anyhow::Result<Table> {
            progress(50);
            self.gate
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|e| anyhow::anyhow!("gate closed: {e}"))?;
            if target == "broken" {
                anyhow::bail!("connection refused");
            }
            Ok(Table::default())
        }
    }

    fn manager() -> (SyncManager, Arc<MemoryState>, Sender<()>) {
        let (release, gate) = mpsc::channel();
        let state = Arc::new(MemoryState::default());
        let collector = Arc::new(GatedCollector {
            gate: Mutex::new(gate),
        });
        (SyncManager::start(collector, state.clone()), state, release)
    }

    #[test]
    fn in_flight_target_is_rejected() {
        let (manager, _state, release) = manager();
        manager.start_sync("fw-1").unwrap();

        let err = manager.start_sync("fw-1").unwrap_err();
        assert!(matches!(err, Error::Sync { ref target, .. } if target == "fw-1"));
        assert_eq!(manager.active().len(), 1);

        release.send(()).unwrap();
        manager.shutdown();
    }

    #[test]
    fn jobs_run_in_fifo_order_and_record_outcome() {
        let (manager, state, release) = manager();
        manager.start_sync("fw-1").unwrap();
        manager.start_sync("broken").unwrap();
        manager.start_sync("fw-2").unwrap();
        for _ in 0..3 {
            release.send(()).unwrap();
        }
        manager.shutdown();

        assert_eq!(*state.rules.lock().unwrap(), vec!["fw-1", "fw-2"]);
        let jobs = state.jobs.lock().unwrap();
        assert_eq!(jobs["fw-1"].state, SyncState::Completed);
        assert_eq!(jobs["fw-1"].percent, 100);
        assert_eq!(jobs["broken"].state, SyncState::Failed);
        assert_eq!(jobs["broken"].message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn finished_target_can_sync_again() {
        let (manager, state, release) = manager();
        manager.start_sync("fw-1").unwrap();
        release.send(()).unwrap();

        for _ in 0..500 {
            if manager.progress("fw-1").is_some_and(|p| !p.state.is_active()) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        manager.start_sync("fw-1").unwrap();
        release.send(()).unwrap();
        manager.shutdown();
        assert_eq!(state.rules.lock().unwrap().len(), 2);
    }

    #[test]
    fn failed_queue_write_releases_the_target() {
        let (manager, state, release) = manager();
        *state.failing_saves.lock().unwrap() = 1;

        let err = manager.start_sync("fw-1").unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert!(manager.progress("fw-1").is_none());
        assert!(manager.active().is_empty());

        manager.start_sync("fw-1").unwrap();
        release.send(()).unwrap();
        manager.shutdown();
        assert_eq!(*state.rules.lock().unwrap(), vec!["fw-1"]);
    }

    #[test]
    fn failed_queue_write_keeps_the_last_outcome() {
        let (manager, state, release) = manager();
        manager.start_sync("fw-1").unwrap();
        release.send(()).unwrap();
        // Wait for the persisted outcome so the worker's last write is done.
        for _ in 0..500 {
            let done = state
                .jobs
                .lock()
                .unwrap()
                .get("fw-1")
                .is_some_and(|j| j.state == SyncState::Completed);
            if done {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        *state.failing_saves.lock().unwrap() = 1;
        assert!(manager.start_sync("fw-1").is_err());
        assert_eq!(
            manager.progress("fw-1").map(|p| p.state),
            Some(SyncState::Completed)
        );
        manager.shutdown();
    }

    #[test]
    fn restart_marks_unfinished_jobs_failed() {
        let state = MemoryState::default();
        state.save_job(&SyncProgress::new("a", SyncState::InProgress)).unwrap();
        state.save_job(&SyncProgress::new("b", SyncState::Queued)).unwrap();
        state.save_job(&SyncProgress::new("c", SyncState::Completed)).unwrap();

        let mut recovered = SyncManager::recover_interrupted(&state).unwrap();
        recovered.sort();
        assert_eq!(recovered, vec!["a", "b"]);

        let jobs = state.jobs.lock().unwrap();
        assert_eq!(jobs["a"].state, SyncState::Failed);
        assert_eq!(jobs["c"].state, SyncState::Completed);
    }
}
