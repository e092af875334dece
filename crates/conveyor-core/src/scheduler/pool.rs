//! Worker pool bookkeeping: bounded slots plus class-aware ready queues.

use std::collections::{HashMap, VecDeque};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::TaskId;

/// A live attempt occupying a worker slot.
pub(crate) struct RunningAttempt {
    /// Monotonic per-dispatcher sequence; outcome and grace-expiry
    /// messages carry it so stale reports are recognized and dropped.
    pub seq: u64,

    /// Raising this asks the executor to stop (cooperative).
    pub stop_tx: watch::Sender<bool>,

    pub join: JoinHandle<()>,
}

/// Bounded execution slots with two FIFO ready queues.
///
/// Claimed tasks wait here until a slot frees. Expedited/foreground
/// tasks (the urgent queue) dequeue before normal ones: they preempt
/// queue position, never already-running attempts.
pub(crate) struct WorkerPool {
    slots: usize,
    urgent: VecDeque<TaskId>,
    normal: VecDeque<TaskId>,
    active: HashMap<TaskId, RunningAttempt>,
}

impl WorkerPool {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: slots.max(1),
            urgent: VecDeque::new(),
            normal: VecDeque::new(),
            active: HashMap::new(),
        }
    }

    pub fn enqueue(&mut self, id: TaskId, urgent: bool) {
        if urgent {
            self.urgent.push_back(id);
        } else {
            self.normal.push_back(id);
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.slots
    }

    /// Next claimed task to dispatch, urgent class first.
    pub fn pop_ready(&mut self) -> Option<TaskId> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    pub fn activate(&mut self, id: TaskId, attempt: RunningAttempt) {
        self.active.insert(id, attempt);
    }

    /// Raise the stop signal of an active attempt. Returns the attempt
    /// sequence if one was running.
    pub fn signal_stop(&self, id: TaskId) -> Option<u64> {
        self.active.get(&id).map(|attempt| {
            let _ = attempt.stop_tx.send(true);
            attempt.seq
        })
    }

    /// Release the slot held by attempt `seq` of `id`. Returns false for
    /// stale sequences (the attempt was already superseded).
    pub fn finish(&mut self, id: TaskId, seq: u64) -> bool {
        match self.active.get(&id) {
            Some(attempt) if attempt.seq == seq => {
                self.active.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Forcibly abort attempt `seq` of `id` (cancellation grace expired).
    pub fn abort(&mut self, id: TaskId, seq: u64) -> bool {
        match self.active.get(&id) {
            Some(attempt) if attempt.seq == seq => {
                let attempt = self.active.remove(&id).expect("checked above");
                attempt.join.abort();
                true
            }
            _ => false,
        }
    }

    /// Drop a claimed-but-undispatched task from the ready queues.
    pub fn remove_ready(&mut self, id: TaskId) -> bool {
        let before = self.urgent.len() + self.normal.len();
        self.urgent.retain(|&queued| queued != id);
        self.normal.retain(|&queued| queued != id);
        before != self.urgent.len() + self.normal.len()
    }

    /// Abort everything still running (shutdown path).
    pub fn drain(&mut self) {
        for (_, attempt) in self.active.drain() {
            attempt.join.abort();
        }
        self.urgent.clear();
        self.normal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(seq: u64) -> RunningAttempt {
        let (stop_tx, _stop_rx) = watch::channel(false);
        RunningAttempt {
            seq,
            stop_tx,
            join: tokio::spawn(async {}),
        }
    }

    #[tokio::test]
    async fn urgent_queue_dequeues_first() {
        let mut pool = WorkerPool::new(1);
        let normal = TaskId::generate();
        let urgent = TaskId::generate();

        pool.enqueue(normal, false);
        pool.enqueue(urgent, true);

        assert_eq!(pool.pop_ready(), Some(urgent));
        assert_eq!(pool.pop_ready(), Some(normal));
        assert_eq!(pool.pop_ready(), None);
    }

    #[tokio::test]
    async fn fifo_within_a_class() {
        let mut pool = WorkerPool::new(1);
        let first = TaskId::generate();
        let second = TaskId::generate();

        pool.enqueue(first, false);
        pool.enqueue(second, false);

        assert_eq!(pool.pop_ready(), Some(first));
        assert_eq!(pool.pop_ready(), Some(second));
    }

    #[tokio::test]
    async fn capacity_tracks_active_attempts() {
        let mut pool = WorkerPool::new(2);
        assert!(pool.has_capacity());

        let a = TaskId::generate();
        let b = TaskId::generate();
        pool.activate(a, attempt(1));
        pool.activate(b, attempt(2));
        assert!(!pool.has_capacity());

        assert!(pool.finish(a, 1));
        assert!(pool.has_capacity());
    }

    #[tokio::test]
    async fn stale_sequences_are_ignored() {
        let mut pool = WorkerPool::new(1);
        let id = TaskId::generate();
        pool.activate(id, attempt(7));

        assert!(!pool.finish(id, 6));
        assert!(!pool.has_capacity()); // slot still held
        assert!(!pool.abort(id, 6));
        assert!(pool.finish(id, 7));
        assert!(pool.has_capacity());
    }

    #[tokio::test]
    async fn remove_ready_drops_queued_task() {
        let mut pool = WorkerPool::new(1);
        let id = TaskId::generate();
        pool.enqueue(id, false);

        assert!(pool.remove_ready(id));
        assert!(!pool.remove_ready(id));
        assert_eq!(pool.pop_ready(), None);
    }

    #[tokio::test]
    async fn zero_slots_is_clamped_to_one() {
        let pool = WorkerPool::new(0);
        assert!(pool.has_capacity());
    }
}
