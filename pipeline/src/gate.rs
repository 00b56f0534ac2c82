//! Duplicate suppression and the global concurrency bound.
//!
//! [`IntakeGate::admit`] is cheap and never waits: it either claims the path
//! or reports that a task for it already exists. The returned [`Admission`]
//! then waits for one of the capacity slots. Both the path claim and the
//! slot are released when the guard drops, so every exit path, including
//! panics and cancelled futures, gives them back exactly once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// In-flight path set plus a bounded pool of capacity slots.
///
/// Cloning yields another handle to the same gate.
#[derive(Debug, Clone)]
pub struct IntakeGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    in_flight: DashSet<PathBuf>,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl IntakeGate {
    /// Create a gate with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(GateInner {
                in_flight: DashSet::new(),
                slots: Arc::new(Semaphore::new(capacity)),
                capacity,
            }),
        }
    }

    /// Claim `path` unless a task for it is already in flight.
    pub fn admit(&self, path: impl Into<PathBuf>) -> Option<Admission> {
        let path = path.into();
        if self.inner.in_flight.insert(path.clone()) {
            trace!("Admitted {}", path.display());
            Some(Admission {
                gate: self.inner.clone(),
                path,
            })
        } else {
            trace!("Already in flight: {}", path.display());
            None
        }
    }

    /// Whether a task for `path` currently exists.
    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.inner.in_flight.contains(path)
    }

    /// Number of admitted paths, waiting or running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots not currently held.
    pub fn available_slots(&self) -> usize {
        self.inner.slots.available_permits()
    }

    /// Stop handing out slots. Pending and future [`Admission::acquire`]
    /// calls return `None`; held slots are unaffected.
    pub fn close(&self) {
        self.inner.slots.close();
    }
}

/// A claimed path that does not hold a slot yet.
#[derive(Debug)]
pub struct Admission {
    gate: Arc<GateInner>,
    path: PathBuf,
}

impl Admission {
    /// The claimed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for a capacity slot.
    ///
    /// Returns `None` if the gate was closed; the path claim is released
    /// in that case.
    pub async fn acquire(self) -> Option<InFlight> {
        let permit = self.gate.slots.clone().acquire_owned().await.ok()?;
        Some(InFlight {
            admission: self,
            _permit: permit,
        })
    }

    /// Give the path claim back.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.gate.in_flight.remove(&self.path);
        trace!("Released {}", self.path.display());
    }
}

/// A claimed path holding a capacity slot.
#[derive(Debug)]
pub struct InFlight {
    admission: Admission,
    _permit: OwnedSemaphorePermit,
}

impl InFlight {
    /// The claimed path.
    pub fn path(&self) -> &Path {
        self.admission.path()
    }

    /// Give the slot and the path claim back.
    pub fn release(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::task::JoinSet;

    #[test]
    fn test_duplicate_admission_is_skipped() {
        let gate = IntakeGate::new(2);

        let first = gate.admit("/in/a.jpg");
        assert!(first.is_some());
        assert!(gate.admit("/in/a.jpg").is_none());
        assert!(gate.admit("/in/b.jpg").is_some());
        assert!(gate.is_in_flight(Path::new("/in/a.jpg")));

        drop(first);
        assert!(!gate.is_in_flight(Path::new("/in/a.jpg")));
        assert!(gate.admit("/in/a.jpg").is_some());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(IntakeGate::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_release_frees_slot_and_path() {
        let gate = IntakeGate::new(1);

        let running = gate.admit("/in/a.jpg").unwrap().acquire().await.unwrap();
        assert_eq!(running.path(), Path::new("/in/a.jpg"));
        assert_eq!(gate.available_slots(), 0);
        assert_eq!(gate.in_flight(), 1);

        running.release();
        assert_eq!(gate.available_slots(), 1);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_free_slot() {
        let gate = IntakeGate::new(1);
        let held = gate.admit("/in/a.jpg").unwrap().acquire().await.unwrap();

        let waiting = gate.admit("/in/b.jpg").unwrap();
        let pending = tokio::spawn(waiting.acquire());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        assert!(gate.is_in_flight(Path::new("/in/b.jpg")));

        drop(held);
        let acquired = pending.await.unwrap().unwrap();
        assert_eq!(acquired.path(), Path::new("/in/b.jpg"));
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let gate = IntakeGate::new(1);
        let _held = gate.admit("/in/a.jpg").unwrap().acquire().await.unwrap();

        let pending = tokio::spawn(gate.admit("/in/b.jpg").unwrap().acquire());
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.close();

        assert!(pending.await.unwrap().is_none());
        assert!(!gate.is_in_flight(Path::new("/in/b.jpg")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_runs_once() {
        let gate = IntakeGate::new(4);
        let executions = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for _ in 0..16 {
            let gate = gate.clone();
            let executions = executions.clone();
            tasks.spawn(async move {
                let Some(admission) = gate.admit("/in/same.jpg") else {
                    return;
                };
                let Some(running) = admission.acquire().await else {
                    return;
                };
                executions.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.release();
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slots_never_exceed_capacity() {
        const CAPACITY: usize = 3;
        let gate = IntakeGate::new(CAPACITY);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for i in 0..40 {
            let admission = gate.admit(format!("/in/{i}.jpg")).unwrap();
            let active = active.clone();
            let peak = peak.clone();
            tasks.spawn(async move {
                let running = admission.acquire().await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                running.release();
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= CAPACITY, "peak {peak} exceeded capacity");
        assert!(peak > 1);
        assert_eq!(gate.available_slots(), CAPACITY);
        assert_eq!(gate.in_flight(), 0);
    }
}
