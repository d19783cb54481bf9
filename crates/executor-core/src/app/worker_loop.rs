//! WorkerLoop - プロセス内ワーカー
//!
//! # フロー
//! 1. ChannelTransport に接続し、Dispatcher に register_worker
//! 2. 配送された Delivery ごとに StageHandler を JoinSet 上で実行
//! 3. 結果を task_done_from / task_failed_from で報告
//! 4. Cancel を受けたら実行中のハンドラを abort して失敗として報告
//!    （panic したハンドラも失敗として報告し、スロットをすぐ解放する）
//! 5. shutdown 時は unregister_worker（保持中のタスクはキューへ戻る）

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{EngineError, ResultCode, StageName, TaskId, WorkerId};
use crate::engine::Dispatcher;
use crate::impls::{ChannelTransport, WorkerMessage};
use crate::ports::{HandlerError, StageHandler};

pub(crate) const CANCELLED: &str = "cancelled by request";

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

const PANICKED: &str = "handler panicked";

/// One dispatch attempt of a task.
type Attempt = (TaskId, u32);

type Finished = (Attempt, Result<ResultCode, HandlerError>);

pub struct WorkerLoop {
    dispatcher: Arc<Dispatcher>,
    transport: ChannelTransport,
    handler: Arc<dyn StageHandler>,
    worker_id: WorkerId,
    stage: StageName,
    capacity: usize,
}

impl WorkerLoop {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        transport: ChannelTransport,
        handler: Arc<dyn StageHandler>,
        worker_id: WorkerId,
        stage: StageName,
        capacity: usize,
    ) -> Self {
        Self {
            dispatcher,
            transport,
            handler,
            worker_id,
            stage,
            capacity,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Runs until `shutdown` is cancelled or the transport drops the channel.
    pub async fn run(self, shutdown: CancellationToken) -> Result<WorkerStats, EngineError> {
        let mut inbox = self.transport.connect(self.worker_id.clone());
        if let Err(err) = self
            .dispatcher
            .register_worker(self.worker_id.clone(), self.stage.clone(), self.capacity)
            .await
        {
            self.transport.disconnect(&self.worker_id);
            return Err(err);
        }
        info!(worker_id = %self.worker_id, stage = %self.stage, capacity = self.capacity, "worker started");

        let mut running: JoinSet<Finished> = JoinSet::new();
        let mut handles: HashMap<Attempt, AbortHandle> = HashMap::new();
        let mut stats = WorkerStats::default();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(WorkerMessage::Task(delivery)) => {
                        debug!(worker_id = %self.worker_id, task_id = %delivery.task_id, attempt = delivery.attempt, "task received");
                        let handler = Arc::clone(&self.handler);
                        let attempt = (delivery.task_id.clone(), delivery.attempt);
                        let handle = running.spawn(async move {
                            let result = handler.handle(&delivery).await;
                            ((delivery.task_id, delivery.attempt), result)
                        });
                        handles.insert(attempt, handle);
                    }
                    Some(WorkerMessage::Cancel(task_id)) => {
                        let cancelled: Vec<Attempt> = handles
                            .keys()
                            .filter(|(id, _)| *id == task_id)
                            .cloned()
                            .collect();
                        for attempt in cancelled {
                            if let Some(handle) = handles.remove(&attempt) {
                                handle.abort();
                                stats.cancelled += 1;
                                self.report(&attempt, Err(HandlerError::new(CANCELLED))).await;
                            }
                        }
                    }
                    None => break,
                },
                Some(joined) = running.join_next_with_id(), if !running.is_empty() => match joined {
                    Ok((_, (attempt, result))) => {
                        handles.remove(&attempt);
                        match &result {
                            Ok(_) => stats.completed += 1,
                            Err(_) => stats.failed += 1,
                        }
                        self.report(&attempt, result).await;
                    }
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => {
                        let panicked = handles
                            .iter()
                            .find(|(_, handle)| handle.id() == err.id())
                            .map(|(attempt, _)| attempt.clone());
                        warn!(worker_id = %self.worker_id, task_id = ?panicked.as_ref().map(|(id, _)| id), %err, "stage handler panicked");
                        if let Some(attempt) = panicked {
                            handles.remove(&attempt);
                            stats.failed += 1;
                            self.report(&attempt, Err(HandlerError::new(PANICKED))).await;
                        }
                    }
                },
            }
        }

        running.shutdown().await;
        self.transport.disconnect(&self.worker_id);
        match self.dispatcher.unregister_worker(&self.worker_id).await {
            Ok(()) | Err(EngineError::UnknownWorker(_)) => {}
            Err(err) => return Err(err),
        }
        info!(
            worker_id = %self.worker_id,
            completed = stats.completed,
            failed = stats.failed,
            "worker stopped"
        );
        Ok(stats)
    }

    async fn report(&self, (task_id, attempt): &Attempt, result: Result<ResultCode, HandlerError>) {
        let reported = match result {
            Ok(code) => {
                self.dispatcher
                    .task_done_from(&self.worker_id, task_id, *attempt, code)
                    .await
            }
            Err(err) => {
                self.dispatcher
                    .task_failed_from(&self.worker_id, task_id, *attempt, err.to_string())
                    .await
            }
        };
        if let Err(err) = reported {
            // Typically the deadline passed and the task moved on without us.
            debug!(worker_id = %self.worker_id, %task_id, %err, "report rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineBuilder;
    use crate::config::EngineConfig;
    use crate::impls::{ChainRouter, MemoryEventSink};
    use crate::ports::Delivery;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl StageHandler for Echo {
        async fn handle(&self, delivery: &Delivery) -> Result<ResultCode, HandlerError> {
            if delivery.payload["fail"].as_bool() == Some(true) {
                return Err(HandlerError::new("payload asked to fail"));
            }
            Ok(ResultCode::ok())
        }
    }

    struct Hang;

    #[async_trait]
    impl StageHandler for Hang {
        async fn handle(&self, _delivery: &Delivery) -> Result<ResultCode, HandlerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ResultCode::ok())
        }
    }

    struct Boom;

    #[async_trait]
    impl StageHandler for Boom {
        async fn handle(&self, delivery: &Delivery) -> Result<ResultCode, HandlerError> {
            if delivery.payload["boom"].as_bool() == Some(true) {
                panic!("handler blew up on {}", delivery.task_id);
            }
            Ok(ResultCode::ok())
        }
    }

    fn engine(transport: &ChannelTransport, events: &MemoryEventSink) -> Arc<Dispatcher> {
        let config = EngineConfig {
            max_retries: 1,
            ..EngineConfig::default()
        };
        Arc::new(
            EngineBuilder::new(config)
                .router(ChainRouter::new(["s"]))
                .transport(transport.clone())
                .event_sink(events.clone())
                .build()
                .unwrap(),
        )
    }

    async fn wait_until_empty(dispatcher: &Dispatcher) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.task_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_worker_processes_and_reports() {
        let transport = ChannelTransport::new();
        let events = MemoryEventSink::new();
        let dispatcher = engine(&transport, &events);
        let shutdown = CancellationToken::new();

        let worker = WorkerLoop::new(
            dispatcher.clone(),
            transport.clone(),
            Arc::new(Echo),
            WorkerId::new("w1"),
            StageName::new("s"),
            2,
        );
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        while dispatcher.free_slots(&WorkerId::new("w1")).await.is_err() {
            tokio::task::yield_now().await;
        }

        for (id, fail) in [("ok1", false), ("ok2", false), ("bad", true)] {
            dispatcher
                .add_task(TaskId::new(id), StageName::new("s"), serde_json::json!({ "fail": fail }))
                .await
                .unwrap();
        }
        wait_until_empty(&dispatcher).await;

        shutdown.cancel();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(events.done_count(), 2);
        assert_eq!(events.failed_count(), 1);
        assert!(dispatcher.free_slots(&WorkerId::new("w1")).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_handler() {
        let transport = ChannelTransport::new();
        let events = MemoryEventSink::new();
        let dispatcher = engine(&transport, &events);
        let shutdown = CancellationToken::new();

        let worker = WorkerLoop::new(
            dispatcher.clone(),
            transport.clone(),
            Arc::new(Hang),
            WorkerId::new("w1"),
            StageName::new("s"),
            1,
        );
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        while dispatcher.free_slots(&WorkerId::new("w1")).await.is_err() {
            tokio::task::yield_now().await;
        }

        dispatcher
            .add_task(TaskId::new("long"), StageName::new("s"), serde_json::json!({}))
            .await
            .unwrap();
        dispatcher.remove_task(&TaskId::new("long")).await.unwrap();
        wait_until_empty(&dispatcher).await;

        shutdown.cancel();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.cancelled, 1);
        assert_eq!(events.done_count(), 0);
        assert_eq!(events.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported_and_frees_the_slot() {
        let transport = ChannelTransport::new();
        let events = MemoryEventSink::new();
        let dispatcher = engine(&transport, &events);
        let shutdown = CancellationToken::new();

        let worker = WorkerLoop::new(
            dispatcher.clone(),
            transport.clone(),
            Arc::new(Boom),
            WorkerId::new("w1"),
            StageName::new("s"),
            1,
        );
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        while dispatcher.free_slots(&WorkerId::new("w1")).await.is_err() {
            tokio::task::yield_now().await;
        }

        for (id, boom) in [("p", true), ("q", false)] {
            dispatcher
                .add_task(TaskId::new(id), StageName::new("s"), serde_json::json!({ "boom": boom }))
                .await
                .unwrap();
        }
        // The dispatch timeout is far off, so only the panic report can free the slot.
        wait_until_empty(&dispatcher).await;

        assert_eq!(dispatcher.free_slots(&WorkerId::new("w1")).await.unwrap(), 1);
        shutdown.cancel();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(events.done_count(), 1);
        assert_eq!(events.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_requeues_held_tasks() {
        let transport = ChannelTransport::new();
        let events = MemoryEventSink::new();
        let dispatcher = engine(&transport, &events);
        let shutdown = CancellationToken::new();

        let worker = WorkerLoop::new(
            dispatcher.clone(),
            transport.clone(),
            Arc::new(Hang),
            WorkerId::new("w1"),
            StageName::new("s"),
            1,
        );
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        while dispatcher.free_slots(&WorkerId::new("w1")).await.is_err() {
            tokio::task::yield_now().await;
        }
        dispatcher
            .add_task(TaskId::new("held"), StageName::new("s"), serde_json::json!({}))
            .await
            .unwrap();

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(dispatcher.queued(&StageName::new("s")).await, vec![TaskId::new("held")]);
    }
}
