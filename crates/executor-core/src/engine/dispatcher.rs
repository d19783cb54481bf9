//! Dispatcher: drives tasks from submission to `Done` or `Failed`.
//!
//! Design:
//! - One `Mutex<EngineState>` guards the capacity tracker, the stage queues
//!   and the task registry. Every transition ("pop, assign, mark dispatched",
//!   "release, route, requeue") runs inside a single critical section, which
//!   is what upholds the at-most-one-owner invariant.
//! - Work for the transport is collected in an `Outbox` while locked and
//!   sent after the lock is released; a slow worker never blocks routing.
//! - Events go to the `EventSink` while locked; sinks must not block.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::capacity::{CapacityTracker, SelectionPolicy};
use super::registry::TaskRegistry;
use super::retry::{RetryDecision, RetryPolicy};
use super::snapshot::{EngineSnapshot, StageStatus, SweepReport, WorkerSlots};
use super::stage_queue::{Popped, StageQueues};
use crate::domain::{
    EngineError, NextStage, ResultCode, StageName, TaskEvent, TaskId, TaskRecord, TaskState,
    TaskView, WorkerId,
};
use crate::ports::{Clock, Delivery, EventSink, IdGenerator, StageRouter, Transport};

pub(crate) const DEADLINE_EXCEEDED: &str = "dispatch deadline exceeded";

/// The three shared structures, always mutated together.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) capacity: CapacityTracker,
    pub(crate) queues: StageQueues,
    pub(crate) registry: TaskRegistry,
}

/// Transport work collected inside the critical section.
#[derive(Debug, Default)]
struct Outbox {
    deliveries: Vec<(WorkerId, Delivery)>,
    cancels: Vec<(WorkerId, TaskId)>,
}

enum Report {
    Done(ResultCode),
    Failed(String),
}

/// Who is reporting: a worker and the dispatch attempt it ran.
#[derive(Debug, Clone, Copy)]
struct Reporter<'a> {
    worker_id: &'a WorkerId,
    attempt: u32,
}

/// Where a failed attempt left the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureOutcome {
    Requeued,
    Frozen,
    Failed,
    Dropped,
}

pub struct Dispatcher {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) router: Arc<dyn StageRouter>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) selection: Arc<dyn SelectionPolicy>,
    pub(crate) retry: RetryPolicy,
    pub(crate) dispatch_timeout: Duration,
}

impl Dispatcher {
    /// Register a task on `stage` and dispatch it if a worker is free.
    pub async fn add_task(
        &self,
        task_id: TaskId,
        stage: StageName,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        let mut out = Outbox::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = self.clock.now();

            let record = TaskRecord::new(task_id.clone(), stage.clone(), payload, now);
            state.registry.insert(record)?;
            let queued = state.queues.push(&stage, task_id.clone(), false);
            debug!(%task_id, %stage, queued, "task added");

            self.fill_stage(state, &stage, now, &mut out);
        }
        self.flush(out).await;
        Ok(())
    }

    /// Like `add_task`, with a generated id.
    pub async fn submit(
        &self,
        stage: StageName,
        payload: serde_json::Value,
    ) -> Result<TaskId, EngineError> {
        let task_id = self.ids.generate_task_id();
        self.add_task(task_id.clone(), stage, payload).await?;
        Ok(task_id)
    }

    /// Cancel a task.
    ///
    /// Queued and frozen tasks are gone immediately. A dispatched task is
    /// flagged so it is never redispatched, and its worker gets a best-effort
    /// cancel; the record is dropped when the current attempt resolves.
    pub async fn remove_task(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let mut out = Outbox::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let record = state.registry.require_mut(task_id)?;
            if record.state == TaskState::Dispatched {
                record.cancelled = true;
                if let Some(owner) = record.owner.clone() {
                    debug!(%task_id, worker_id = %owner, "cancelling dispatched task");
                    out.cancels.push((owner, task_id.clone()));
                }
            } else {
                state.queues.remove(task_id);
                state.registry.remove(task_id);
                debug!(%task_id, "task removed");
            }
        }
        self.flush(out).await;
        Ok(())
    }

    /// A worker connected and advertised `max_capacity` slots for `stage`.
    pub async fn register_worker(
        &self,
        worker_id: WorkerId,
        stage: StageName,
        max_capacity: usize,
    ) -> Result<(), EngineError> {
        let mut out = Outbox::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = self.clock.now();

            state
                .capacity
                .register_worker(worker_id.clone(), stage.clone(), max_capacity)?;
            info!(%worker_id, %stage, max_capacity, "worker registered");

            self.fill_stage(state, &stage, now, &mut out);
        }
        self.flush(out).await;
        Ok(())
    }

    /// A worker went away. Its tasks go back to the head of their queues.
    pub async fn unregister_worker(&self, worker_id: &WorkerId) -> Result<(), EngineError> {
        let mut out = Outbox::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = self.clock.now();

            self.drop_worker(state, worker_id, now, &mut out)?;
        }
        self.flush(out).await;
        Ok(())
    }

    /// The owner finished the task's current stage.
    pub async fn task_done(
        &self,
        task_id: &TaskId,
        result_code: ResultCode,
    ) -> Result<(), EngineError> {
        self.report(task_id, None, Report::Done(result_code)).await
    }

    /// The owner could not process the task.
    pub async fn task_failed(
        &self,
        task_id: &TaskId,
        reason: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.report(task_id, None, Report::Failed(reason.into()))
            .await
    }

    /// `task_done`, rejected unless `worker_id` currently owns the task and
    /// `attempt` is the live dispatch attempt (`Delivery::attempt`).
    pub async fn task_done_from(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        attempt: u32,
        result_code: ResultCode,
    ) -> Result<(), EngineError> {
        let from = Reporter { worker_id, attempt };
        self.report(task_id, Some(from), Report::Done(result_code))
            .await
    }

    /// `task_failed`, with the same ownership and attempt checks as
    /// `task_done_from`.
    pub async fn task_failed_from(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        attempt: u32,
        reason: impl Into<String>,
    ) -> Result<(), EngineError> {
        let from = Reporter { worker_id, attempt };
        self.report(task_id, Some(from), Report::Failed(reason.into()))
            .await
    }

    /// One timeout pass: expire overdue dispatches and thaw frozen tasks.
    pub async fn sweep(&self) -> SweepReport {
        let mut out = Outbox::default();
        let mut report = SweepReport::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = self.clock.now();
            let mut touched = BTreeSet::new();

            for task_id in state.registry.overdue(now) {
                let worker_id = state.capacity.release(&task_id).ok();
                warn!(
                    %task_id,
                    worker_id = worker_id.as_ref().map(|w| w.to_string()),
                    "dispatch deadline exceeded"
                );
                report.expired += 1;

                if let Some(stage) = worker_id
                    .as_ref()
                    .and_then(|w| state.capacity.worker(w))
                    .map(|w| w.stage.clone())
                {
                    touched.insert(stage);
                }
                let outcome =
                    self.fail_attempt(state, &task_id, DEADLINE_EXCEEDED.to_string(), now, &mut out);
                if outcome == FailureOutcome::Failed {
                    report.failed += 1;
                }
            }

            for task_id in state.registry.thawed(now) {
                let Some(record) = state.registry.get_mut(&task_id) else {
                    continue;
                };
                record.requeue(now);
                let stage = record.stage.clone();
                state
                    .queues
                    .push(&stage, task_id.clone(), self.retry.requeue_ahead);
                debug!(%task_id, %stage, "frozen task thawed");
                report.thawed += 1;
                touched.insert(stage);
            }

            for stage in &touched {
                self.fill_stage(state, stage, now, &mut out);
            }
        }
        self.flush(out).await;
        if !report.is_empty() {
            info!(
                expired = report.expired,
                thawed = report.thawed,
                failed = report.failed,
                "sweep finished"
            );
        }
        report
    }

    /// Per-stage queue depth and worker slots, plus task counts.
    pub async fn state(&self) -> EngineSnapshot {
        let guard = self.state.lock().await;
        let mut snapshot = EngineSnapshot {
            tasks: guard.registry.counts_by_state(),
            ..EngineSnapshot::default()
        };

        let stages: BTreeSet<StageName> = guard
            .queues
            .stages()
            .chain(guard.capacity.stages())
            .cloned()
            .collect();
        for stage in stages {
            let workers = guard
                .capacity
                .workers_for_stage(&stage)
                .into_iter()
                .map(|w| WorkerSlots {
                    id: w.id.clone(),
                    free_slots: w.free_slots(),
                    max_capacity: w.max_capacity,
                })
                .collect();
            let status = StageStatus {
                queued: guard.queues.len(&stage),
                workers,
            };
            snapshot.stages.insert(stage, status);
        }
        snapshot
    }

    pub async fn task_info(&self, task_id: &TaskId) -> Option<TaskView> {
        let guard = self.state.lock().await;
        guard.registry.get(task_id).map(TaskRecord::view)
    }

    pub async fn free_slots(&self, worker_id: &WorkerId) -> Result<usize, EngineError> {
        self.state.lock().await.capacity.free_slots(worker_id)
    }

    /// Queued task ids of `stage`, head first.
    pub async fn queued(&self, stage: &StageName) -> Vec<TaskId> {
        self.state
            .lock()
            .await
            .queues
            .snapshot()
            .remove(stage)
            .unwrap_or_default()
    }

    /// Live (non-terminal) tasks.
    pub async fn task_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    async fn report(
        &self,
        task_id: &TaskId,
        from: Option<Reporter<'_>>,
        report: Report,
    ) -> Result<(), EngineError> {
        let mut out = Outbox::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = self.clock.now();

            let record = state
                .registry
                .get(task_id)
                .ok_or_else(|| EngineError::UnknownTask(task_id.clone()))?;
            // A report for an attempt that already expired must not settle
            // the one that replaced it, even on the same worker.
            let owned_by_reporter = match from {
                Some(from) => {
                    record.owner.as_ref() == Some(from.worker_id)
                        && record.attempts == from.attempt
                }
                None => true,
            };
            if record.state != TaskState::Dispatched || !owned_by_reporter {
                return Err(EngineError::TaskNotAssigned(task_id.clone()));
            }

            let worker_id = state.capacity.release(task_id)?;
            let worker_stage = state.capacity.worker(&worker_id).map(|w| w.stage.clone());

            match report {
                Report::Done(result_code) => {
                    debug!(%task_id, %worker_id, %result_code, "task done");
                    self.advance(state, task_id, result_code, now, &mut out);
                }
                Report::Failed(reason) => {
                    warn!(%task_id, %worker_id, %reason, "task failed");
                    self.fail_attempt(state, task_id, reason, now, &mut out);
                }
            }

            if let Some(stage) = worker_stage {
                self.fill_stage(state, &stage, now, &mut out);
            }
        }
        self.flush(out).await;
        Ok(())
    }

    /// Route a finished task to its next stage, or finish it.
    fn advance(
        &self,
        state: &mut EngineState,
        task_id: &TaskId,
        result_code: ResultCode,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) {
        let Some(record) = state.registry.get_mut(task_id) else {
            return;
        };
        if record.cancelled {
            state.registry.remove(task_id);
            debug!(%task_id, "cancelled task resolved");
            return;
        }

        let from = record.stage.clone();
        match self.router.next_stage(task_id, &from, &result_code) {
            NextStage::Stage(next) => {
                record.advance(next.clone(), now);
                state.queues.push(&next, task_id.clone(), false);
                debug!(%task_id, %from, to = %next, "task advanced");
                self.events.emit(TaskEvent::Advanced {
                    task_id: task_id.clone(),
                    from,
                    to: next.clone(),
                });
                self.fill_stage(state, &next, now, out);
            }
            NextStage::Terminal => {
                record.mark_done(now);
                state.registry.remove(task_id);
                info!(%task_id, stage = %from, %result_code, "task finished");
                self.events.emit(TaskEvent::Done {
                    task_id: task_id.clone(),
                    stage: from,
                    result_code,
                });
            }
        }
    }

    /// Count a failure against the task and freeze, requeue or fail it.
    /// The caller has already released the task's slot.
    fn fail_attempt(
        &self,
        state: &mut EngineState,
        task_id: &TaskId,
        reason: String,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) -> FailureOutcome {
        let Some(record) = state.registry.get_mut(task_id) else {
            return FailureOutcome::Dropped;
        };
        if record.cancelled {
            state.registry.remove(task_id);
            debug!(%task_id, "cancelled task resolved");
            return FailureOutcome::Dropped;
        }

        record.record_failure(reason);
        match self.retry.decide(record.retry_count) {
            RetryDecision::GiveUp => {
                record.mark_failed(now);
                let stage = record.stage.clone();
                let retry_count = record.retry_count;
                let reasons = state
                    .registry
                    .remove(task_id)
                    .map(|r| r.failures)
                    .unwrap_or_default();
                warn!(%task_id, %stage, retry_count, "task failed for good");
                self.events.emit(TaskEvent::Failed {
                    task_id: task_id.clone(),
                    stage,
                    retry_count,
                    reasons,
                });
                FailureOutcome::Failed
            }
            RetryDecision::Freeze { delay } if delay.is_zero() => {
                record.requeue(now);
                let stage = record.stage.clone();
                state
                    .queues
                    .push(&stage, task_id.clone(), self.retry.requeue_ahead);
                debug!(%task_id, %stage, "task requeued after failure");
                self.fill_stage(state, &stage, now, out);
                FailureOutcome::Requeued
            }
            RetryDecision::Freeze { delay } => {
                record.freeze(after(now, delay), now);
                debug!(%task_id, delay_ms = delay.as_millis() as u64, "task frozen");
                FailureOutcome::Frozen
            }
        }
    }

    /// Unregister a worker and requeue what it held at the head of the
    /// queue, keeping their assignment order.
    fn drop_worker(
        &self,
        state: &mut EngineState,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) -> Result<(), EngineError> {
        let worker = state.capacity.unregister_worker(worker_id)?;
        info!(
            %worker_id,
            stage = %worker.stage,
            orphaned = worker.assigned.len(),
            "worker unregistered"
        );

        let mut touched = BTreeSet::new();
        for task_id in worker.assigned.iter().rev() {
            let Some(record) = state.registry.get_mut(task_id) else {
                continue;
            };
            if record.cancelled {
                state.registry.remove(task_id);
                continue;
            }
            record.requeue(now);
            let stage = record.stage.clone();
            state.queues.push(&stage, task_id.clone(), true);
            touched.insert(stage);
        }

        for stage in &touched {
            self.fill_stage(state, stage, now, out);
        }
        Ok(())
    }

    /// Hand queued tasks of `stage` to free workers until one side runs out.
    fn fill_stage(
        &self,
        state: &mut EngineState,
        stage: &StageName,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) {
        if state.queues.is_empty(stage) || !state.capacity.has_free_worker(stage) {
            return;
        }
        loop {
            let candidates = state.capacity.free_workers_for_stage(stage);
            let Some(choice) = self.selection.select(&candidates) else {
                break;
            };
            let worker_id = choice.worker_id.clone();

            let task_id = match state.queues.pop(stage) {
                Popped::Found(task_id) => task_id,
                Popped::Empty => break,
            };
            let Some(record) = state.registry.get_mut(&task_id) else {
                warn!(%task_id, %stage, "queued task missing from registry");
                continue;
            };
            if !record.state.is_dispatchable() {
                warn!(%task_id, state = ?record.state, "queued task is not dispatchable");
                continue;
            }

            if let Err(err) = state.capacity.assign(&worker_id, task_id.clone()) {
                debug!(%task_id, %worker_id, %err, kind = ?err.kind(), "assignment refused");
                state.queues.push(stage, task_id, true);
                break;
            }
            record.dispatch(worker_id.clone(), after(now, self.dispatch_timeout), now);

            debug!(%task_id, %stage, %worker_id, attempt = record.attempts, "task dispatched");
            self.events.emit(TaskEvent::Dispatched {
                task_id: task_id.clone(),
                stage: stage.clone(),
                worker_id: worker_id.clone(),
                attempt: record.attempts,
            });
            out.deliveries.push((
                worker_id,
                Delivery {
                    task_id,
                    stage: stage.clone(),
                    payload: record.payload.clone(),
                    attempt: record.attempts,
                },
            ));
        }
    }

    /// Send collected transport work. Runs without the engine lock.
    async fn flush(&self, out: Outbox) {
        for (worker_id, task_id) in out.cancels {
            if let Err(err) = self.transport.cancel(&worker_id, &task_id).await {
                debug!(%task_id, %worker_id, %err, "cancel not delivered");
            }
        }

        let mut lost: HashSet<WorkerId> = HashSet::new();
        let mut pending: VecDeque<(WorkerId, Delivery)> = out.deliveries.into();
        while let Some((worker_id, delivery)) = pending.pop_front() {
            if lost.contains(&worker_id) {
                continue;
            }
            let Err(err) = self.transport.deliver(&worker_id, &delivery).await else {
                continue;
            };

            warn!(
                task_id = %delivery.task_id,
                %worker_id,
                %err,
                "delivery failed, dropping worker"
            );
            lost.insert(worker_id.clone());
            let retry = self.drop_lost_worker(&worker_id, &delivery.task_id).await;
            pending.extend(retry.deliveries);
        }
    }

    /// Treat a worker we could not reach as disconnected, provided it still
    /// owns the task we tried to send.
    async fn drop_lost_worker(&self, worker_id: &WorkerId, task_id: &TaskId) -> Outbox {
        let mut out = Outbox::default();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.capacity.owner_of(task_id) != Some(worker_id) {
            return out;
        }
        let now = self.clock.now();
        if let Err(err) = self.drop_worker(state, worker_id, now, &mut out) {
            debug!(%worker_id, %err, "lost worker already gone");
        }
        out
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
