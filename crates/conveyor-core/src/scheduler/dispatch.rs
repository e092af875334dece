//! Dispatch actor: the single writer of all task records.
//!
//! Every external input (submission, cancellation, worker completion,
//! progress report, conditions poke, timer expiry) arrives as a message
//! on one channel and is applied by one tokio task. That makes the
//! single-writer-per-record discipline structural: there is nothing to
//! lock because there is only one writer.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::domain::{
    Payload, Priority, Schedule, SchedulerError, TaskDefinition, TaskId, TaskRecord, TaskState,
};
use crate::ports::{ConditionsProvider, ExecutionOutcome, Notifier, ProgressReporter,
    ProgressUpdate, StopSignal, TaskStore};

use super::chain::ChainIndex;
use super::observe::{Observation, TaskUpdate, OBSERVER_CAPACITY};
use super::pool::{RunningAttempt, WorkerPool};
use super::registry::ExecutorRegistry;
use super::SchedulerConfig;

/// First retry delay when a store write fails.
const STORE_RETRY_INITIAL: Duration = Duration::from_millis(100);

/// Ceiling for the store-retry backoff.
const STORE_RETRY_MAX: Duration = Duration::from_secs(5);

/// Timer used when nothing is scheduled; an idle pass is harmless.
const IDLE_TICK: Duration = Duration::from_secs(60);

/// Messages funneled into the dispatch actor.
pub(crate) enum Command {
    Submit {
        definition: TaskDefinition,
        reply: oneshot::Sender<Result<TaskId, SchedulerError>>,
    },
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Observe {
        id: TaskId,
        reply: oneshot::Sender<Result<Observation, SchedulerError>>,
    },
    Status {
        id: TaskId,
        reply: oneshot::Sender<Result<TaskRecord, SchedulerError>>,
    },
    /// The environment changed; re-evaluate constraints now.
    ConditionsChanged,
    /// A worker finished attempt `seq` of task `id`.
    AttemptFinished {
        id: TaskId,
        seq: u64,
        outcome: ExecutionOutcome,
    },
    /// The cancellation grace period of attempt `seq` ran out.
    GraceExpired { id: TaskId, seq: u64 },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Heap entry for delayed wake-ups (retry backoff, periodic windows).
///
/// Reverse ordering turns `BinaryHeap` into a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledWake {
    at: DateTime<Utc>,
    id: TaskId,
}

impl PartialOrd for ScheduledWake {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledWake {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.at, other.id).cmp(&(self.at, self.id))
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    // absurdly large durations are capped rather than overflowing
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::hours(24 * 365))
}

pub(crate) struct Dispatcher {
    records: HashMap<TaskId, TaskRecord>,
    chains: ChainIndex,
    observers: HashMap<TaskId, broadcast::Sender<TaskUpdate>>,
    pool: WorkerPool,
    scheduled: BinaryHeap<ScheduledWake>,

    store: Arc<dyn TaskStore>,
    registry: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    conditions: Arc<dyn ConditionsProvider>,
    config: SchedulerConfig,

    /// Clone handed to spawned attempts and grace timers.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Clone handed to progress reporters.
    progress_tx: mpsc::UnboundedSender<ProgressUpdate>,

    attempt_seq: u64,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<ExecutorRegistry>,
        notifier: Arc<dyn Notifier>,
        conditions: Arc<dyn ConditionsProvider>,
        config: SchedulerConfig,
        cmd_tx: mpsc::UnboundedSender<Command>,
        progress_tx: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Self {
        Self {
            records: HashMap::new(),
            chains: ChainIndex::new(),
            observers: HashMap::new(),
            pool: WorkerPool::new(config.worker_slots),
            scheduled: BinaryHeap::new(),
            store,
            registry,
            notifier,
            conditions,
            config,
            cmd_tx,
            progress_tx,
            attempt_seq: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut progress_rx: mpsc::UnboundedReceiver<ProgressUpdate>,
    ) {
        self.reload().await;
        loop {
            self.pump().await;
            let wake = self.next_wake().unwrap_or(IDLE_TICK);
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle(cmd).await,
                    // all handles dropped: nothing can reach us anymore
                    None => break,
                },
                Some(update) = progress_rx.recv() => self.on_progress(update).await,
                _ = tokio::time::sleep(wake) => {}
            }
        }
        self.pool.drain();
        self.observers.clear();
        info!("dispatch loop stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { definition, reply } => {
                let _ = reply.send(self.on_submit(definition).await);
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.on_cancel(id).await);
            }
            Command::Observe { id, reply } => {
                let _ = reply.send(self.on_observe(id));
            }
            Command::Status { id, reply } => {
                let result = self
                    .records
                    .get(&id)
                    .cloned()
                    .ok_or(SchedulerError::NotFound(id));
                let _ = reply.send(result);
            }
            Command::ConditionsChanged => {
                // nothing to do here; the loop re-pumps after every message
            }
            Command::AttemptFinished { id, seq, outcome } => {
                self.on_attempt_finished(id, seq, outcome).await;
            }
            Command::GraceExpired { id, seq } => {
                if self.pool.abort(id, seq) {
                    warn!(task = %id, seq, "executor ignored its stop signal; attempt aborted");
                }
            }
            Command::Shutdown { reply } => {
                // handled in run(); unreachable, but answer anyway
                let _ = reply.send(());
            }
        }
    }

    // ----- admission -------------------------------------------------

    async fn on_submit(&mut self, definition: TaskDefinition) -> Result<TaskId, SchedulerError> {
        definition
            .validate()
            .map_err(SchedulerError::InvalidDefinition)?;
        if !self.registry.contains(&definition.kind) {
            return Err(SchedulerError::InvalidDefinition(format!(
                "no executor registered for kind={}",
                definition.kind
            )));
        }
        let id = definition.id;
        if self.records.contains_key(&id) {
            return Err(SchedulerError::InvalidDefinition(format!(
                "task id {id} is already in use"
            )));
        }

        let record = match definition.schedule {
            Schedule::Chained { after } => {
                let predecessor = self
                    .records
                    .get(&after)
                    .map(|p| (p.state, p.output.clone()))
                    .ok_or_else(|| {
                        SchedulerError::InvalidDefinition(format!(
                            "chain predecessor {after} does not exist"
                        ))
                    })?;
                match predecessor {
                    (TaskState::Succeeded, output) => {
                        // predecessor already done: admit directly, inherit its output
                        let mut record = TaskRecord::new(definition);
                        if let Some(output) = output {
                            record.definition.input.merge(&output);
                        }
                        record
                    }
                    (TaskState::Failed | TaskState::Cancelled, _) => {
                        // the chain is already broken; the new member is born cancelled
                        let mut record = TaskRecord::new(definition);
                        record.mark_cancelled();
                        record
                    }
                    _ => {
                        self.chains.link(id, after);
                        TaskRecord::new_blocked(definition)
                    }
                }
            }
            _ => TaskRecord::new(definition),
        };

        self.persist(&record).await;
        info!(task = %id, kind = %record.definition.kind, state = ?record.state, "task submitted");
        self.records.insert(id, record);
        Ok(id)
    }

    // ----- cancellation ----------------------------------------------

    async fn on_cancel(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        if !self.records.contains_key(&id) {
            return Err(SchedulerError::NotFound(id));
        }
        self.cancel_with_cascade(id).await;
        Ok(())
    }

    async fn cancel_with_cascade(&mut self, id: TaskId) {
        let mut targets = vec![id];
        targets.extend(self.chains.descendants(id));
        for target in targets {
            self.cancel_record(target).await;
            self.chains.release(target);
        }
    }

    /// Cancel one record (no cascade). No-op on terminal records.
    async fn cancel_record(&mut self, id: TaskId) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        let was_running = record.state == TaskState::Running;
        record.mark_cancelled();
        let snapshot = record.clone();

        if was_running {
            if let Some(seq) = self.pool.signal_stop(id) {
                // running attempt: advisory stop now, hard abort after grace
                let cmd_tx = self.cmd_tx.clone();
                let grace = self.config.cancel_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = cmd_tx.send(Command::GraceExpired { id, seq });
                });
            } else {
                // claimed but still waiting for a slot
                self.pool.remove_ready(id);
            }
        }

        self.persist(&snapshot).await;
        info!(task = %id, "task cancelled");
        self.emit(id);
    }

    // ----- observation -----------------------------------------------

    fn on_observe(&mut self, id: TaskId) -> Result<Observation, SchedulerError> {
        let record = self.records.get(&id).ok_or(SchedulerError::NotFound(id))?;
        let snapshot = TaskUpdate::snapshot(record);
        let rx = if snapshot.state.is_terminal() {
            // the snapshot is the whole story; hand out a closed channel
            let (tx, rx) = broadcast::channel(1);
            drop(tx);
            rx
        } else {
            self.observers
                .entry(id)
                .or_insert_with(|| broadcast::channel(OBSERVER_CAPACITY).0)
                .subscribe()
        };
        Ok(Observation::new(snapshot, rx))
    }

    /// Push the record's current snapshot to its subscribers.
    fn emit(&mut self, id: TaskId) {
        let Some(record) = self.records.get(&id) else {
            return;
        };
        let update = TaskUpdate::snapshot(record);
        let terminal = update.state.is_terminal();
        if let Some(tx) = self.observers.get(&id) {
            let _ = tx.send(update);
            if terminal {
                // dropping the sender closes every subscriber after the
                // terminal update has been delivered
                self.observers.remove(&id);
            }
        }
    }

    // ----- progress and completion -----------------------------------

    async fn on_progress(&mut self, update: ProgressUpdate) {
        let Some(record) = self.records.get_mut(&update.task_id) else {
            return;
        };
        if record.state != TaskState::Running {
            // late report from a finished or cancelled attempt
            return;
        }
        record.set_progress(update.progress);
        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.emit(update.task_id);
    }

    async fn on_attempt_finished(&mut self, id: TaskId, seq: u64, outcome: ExecutionOutcome) {
        if !self.pool.finish(id, seq) {
            debug!(task = %id, seq, "stale attempt outcome dropped");
            return;
        }
        let Some(record) = self.records.get(&id) else {
            return;
        };
        if record.state.is_terminal() {
            // cancelled while running; the late outcome is void
            debug!(task = %id, "outcome after terminal state ignored");
            return;
        }

        match outcome {
            ExecutionOutcome::Success(output) => self.on_success(id, output).await,
            ExecutionOutcome::Failure(error) => self.on_failure(id, error).await,
            ExecutionOutcome::Retry => self.on_failure(id, "retry requested".to_string()).await,
        }
    }

    async fn on_success(&mut self, id: TaskId, output: Payload) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        if let Schedule::Periodic { interval, flex } = record.definition.schedule {
            // a periodic task never terminates: show the finished cycle,
            // then re-enqueue for the start of the next flex window
            record.set_progress(100);
            record.output = Some(output);
            let completed = record.clone();
            self.persist(&completed).await;
            self.emit(id);

            let eligible_at = Utc::now() + to_chrono(interval.saturating_sub(flex));
            let record = self.records.get_mut(&id).expect("present above");
            record.reset_for_next_cycle(eligible_at);
            let snapshot = record.clone();
            self.persist(&snapshot).await;
            self.emit(id);
            self.scheduled.push(ScheduledWake { at: eligible_at, id });
            self.notifier.notify(&format!("task {id} finished its cycle"));
            info!(task = %id, next = %eligible_at, "periodic cycle completed");
            return;
        }

        record.mark_succeeded(output.clone());
        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.emit(id);
        self.notifier.notify(&format!("task {id} succeeded"));
        info!(task = %id, "task succeeded");

        // release chained successors
        for successor in self.chains.release(id) {
            let Some(succ) = self.records.get_mut(&successor) else {
                continue;
            };
            if succ.state != TaskState::Blocked {
                continue;
            }
            // the predecessor's output becomes part of the successor's input
            succ.definition.input.merge(&output);
            succ.unblock();
            let snapshot = succ.clone();
            self.persist(&snapshot).await;
            self.emit(successor);
            debug!(task = %successor, "unblocked by predecessor");
        }
    }

    async fn on_failure(&mut self, id: TaskId, error: String) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        let policy = record.definition.retry_policy.clone();
        if policy.exhausted(record.attempt_count) {
            record.mark_failed(error.clone());
            let snapshot = record.clone();
            self.persist(&snapshot).await;
            self.emit(id);
            self.notifier.notify(&format!("task {id} failed: {error}"));
            warn!(task = %id, attempts = snapshot.attempt_count, %error, "retries exhausted");

            // a broken chain cancels everything downstream
            let descendants = self.chains.descendants(id);
            self.chains.release(id);
            for target in descendants {
                self.cancel_record(target).await;
                self.chains.release(target);
            }
        } else {
            let delay = policy.next_delay(record.attempt_count);
            let at = Utc::now() + to_chrono(delay);
            record.schedule_retry(at, error);
            let snapshot = record.clone();
            self.persist(&snapshot).await;
            self.emit(id);
            self.scheduled.push(ScheduledWake { at, id });
            debug!(task = %id, attempt = snapshot.attempt_count, ?delay, "retry scheduled");
        }
    }

    // ----- scheduling pass -------------------------------------------

    /// One pass: promote due retries, claim eligible tasks, fill slots.
    async fn pump(&mut self) {
        let now = Utc::now();

        // promote tasks whose backoff / flex delay has elapsed
        while let Some(top) = self.scheduled.peek() {
            if top.at > now {
                break; // min-heap: nothing else is due either
            }
            let entry = self.scheduled.pop().expect("peeked above");
            let Some(record) = self.records.get_mut(&entry.id) else {
                continue;
            };
            // stale entries (cancelled, re-scheduled) just fall out here
            if record.state == TaskState::Retrying
                && record.next_eligible_at.is_none_or(|at| at <= now)
            {
                record.requeue();
                let snapshot = record.clone();
                self.persist(&snapshot).await;
                self.emit(entry.id);
            }
        }

        // claim every eligible enqueued task
        let conditions = self.conditions.current();
        let mut eligible: Vec<TaskId> = self
            .records
            .values()
            .filter(|r| {
                r.state == TaskState::Enqueued
                    && r.next_eligible_at.is_none_or(|at| at <= now)
                    && r.definition.constraints.satisfied_by(&conditions)
            })
            .map(|r| r.id())
            .collect();
        eligible.sort(); // submission order (ids are time-sortable)
        for id in eligible {
            let record = self.records.get_mut(&id).expect("listed above");
            record.start_attempt();
            let urgent = record.definition.priority.is_urgent();
            let snapshot = record.clone();
            self.persist(&snapshot).await;
            self.emit(id);
            self.pool.enqueue(id, urgent);
            debug!(task = %id, urgent, "claimed");
        }

        // hand ready tasks to free slots
        while self.pool.has_capacity() {
            let Some(id) = self.pool.pop_ready() else {
                break;
            };
            self.spawn_attempt(id).await;
        }
    }

    async fn spawn_attempt(&mut self, id: TaskId) {
        let (kind, priority, input) = {
            let Some(record) = self.records.get(&id) else {
                return;
            };
            if record.state != TaskState::Running {
                return;
            }
            (
                record.definition.kind.clone(),
                record.definition.priority,
                record.definition.input.clone(),
            )
        };
        let Some(executor) = self.registry.get(&kind) else {
            // registration is checked at submit; this is a defect guard
            let record = self.records.get_mut(&id).expect("present above");
            record.mark_failed(format!("executor for kind={kind} vanished"));
            let snapshot = record.clone();
            self.persist(&snapshot).await;
            self.emit(id);
            return;
        };

        if priority == Priority::Foreground {
            let token = self.notifier.foreground_affordance(id);
            debug!(task = %id, token = token.value(), "foreground affordance requested");
        }

        self.attempt_seq += 1;
        let seq = self.attempt_seq;
        let (stop_tx, stop_rx) = watch::channel(false);
        let reporter = ProgressReporter::new(id, self.progress_tx.clone());
        let stop = StopSignal::new(stop_rx);
        let cmd_tx = self.cmd_tx.clone();

        let join = tokio::spawn(async move {
            let outcome = executor.run(&input, reporter, stop).await;
            let _ = cmd_tx.send(Command::AttemptFinished { id, seq, outcome });
        });
        self.pool.activate(id, RunningAttempt { seq, stop_tx, join });
        debug!(task = %id, seq, "attempt dispatched");
    }

    /// How long the loop may sleep before something needs attention.
    fn next_wake(&self) -> Option<Duration> {
        let now = Utc::now();
        let mut wake = self.scheduled.peek().map(|s| s.at);

        // constraint-gated tasks have no timer of their own; poll for them
        let conditions = self.conditions.current();
        let gated = self.records.values().any(|r| {
            r.state == TaskState::Enqueued
                && r.next_eligible_at.is_none_or(|at| at <= now)
                && !r.definition.constraints.satisfied_by(&conditions)
        });
        if gated {
            let poll = now + to_chrono(self.config.poll_interval);
            wake = Some(wake.map_or(poll, |w| w.min(poll)));
        }

        wake.map(|w| (w - now).to_std().unwrap_or(Duration::ZERO))
    }

    // ----- persistence -----------------------------------------------

    /// Write-through with backoff. A state transition is never dropped:
    /// if the store is down this loop keeps retrying (and the dispatch
    /// loop waits with it).
    async fn persist(&self, record: &TaskRecord) {
        let mut delay = STORE_RETRY_INITIAL;
        loop {
            match self.store.put(record.clone()).await {
                Ok(()) => return,
                Err(error) => {
                    warn!(task = %record.id(), %error, ?delay, "store write failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(STORE_RETRY_MAX);
                }
            }
        }
    }

    /// Re-admit persisted records at process start.
    async fn reload(&mut self) {
        let mut delay = STORE_RETRY_INITIAL;
        let all = loop {
            match self.store.all().await {
                Ok(all) => break all,
                Err(error) => {
                    warn!(%error, ?delay, "store read failed at startup; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(STORE_RETRY_MAX);
                }
            }
        };
        if all.is_empty() {
            return;
        }

        for mut record in all {
            let id = record.id();
            match record.state {
                TaskState::Running => {
                    // the previous process died mid-attempt; the attempt
                    // stays counted, the task goes back in the queue
                    record.requeue();
                    self.persist(&record).await;
                }
                TaskState::Retrying | TaskState::Enqueued => {
                    if let Some(at) = record.next_eligible_at {
                        self.scheduled.push(ScheduledWake { at, id });
                    }
                }
                _ => {}
            }
            self.records.insert(id, record);
        }

        // rebuild chain links for still-blocked tasks
        let blocked: Vec<(TaskId, TaskId)> = self
            .records
            .values()
            .filter(|r| r.state == TaskState::Blocked)
            .filter_map(|r| match r.definition.schedule {
                Schedule::Chained { after } => Some((r.id(), after)),
                _ => None,
            })
            .collect();
        for (id, after) in blocked {
            match self.records.get(&after).map(|p| (p.state, p.output.clone())) {
                Some((TaskState::Succeeded, output)) => {
                    let record = self.records.get_mut(&id).expect("listed above");
                    if let Some(output) = output {
                        record.definition.input.merge(&output);
                    }
                    record.unblock();
                    let snapshot = record.clone();
                    self.persist(&snapshot).await;
                }
                Some((TaskState::Failed | TaskState::Cancelled, _)) | None => {
                    self.cancel_record(id).await;
                }
                Some(_) => self.chains.link(id, after),
            }
        }

        info!(count = self.records.len(), "task records reloaded");
    }
}
