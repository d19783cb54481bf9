//! SweeperLoop - 配送期限切れの回収と凍結タスクの解凍
//!
//! # フロー
//! 1. sweep_interval ごとに Dispatcher::sweep() を呼ぶ
//! 2. 期限切れ: worker から解放して task_failed と同じ扱い
//! 3. thaw_at を過ぎた Frozen タスクはキューへ戻す
//!
//! Missed ticks are skipped rather than bunched up after a stall.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::Dispatcher;

pub struct SweeperLoop {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl SweeperLoop {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
        }
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;
        info!(interval_ms = self.interval.as_millis() as u64, "sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.dispatcher.sweep().await;
                    debug!(?report, "sweep pass");
                }
            }
        }
        info!("sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineBuilder;
    use crate::config::EngineConfig;
    use crate::domain::{StageName, TaskId, TaskState, WorkerId};
    use crate::impls::{ChainRouter, RecordingTransport};

    #[tokio::test]
    async fn test_sweeper_expires_tasks_and_stops_on_cancellation() {
        let config = EngineConfig {
            dispatch_timeout_secs: 1,
            max_retries: 0,
            ..EngineConfig::default()
        };
        let dispatcher = Arc::new(
            EngineBuilder::new(config)
                .router(ChainRouter::new(["s"]))
                .transport(RecordingTransport::new())
                .build()
                .unwrap(),
        );
        let stage = StageName::new("s");
        dispatcher
            .register_worker(WorkerId::new("w"), stage.clone(), 1)
            .await
            .unwrap();
        dispatcher
            .add_task(TaskId::new("t"), stage, serde_json::json!(null))
            .await
            .unwrap();
        assert_eq!(
            dispatcher.task_info(&TaskId::new("t")).await.unwrap().state,
            TaskState::Dispatched
        );

        let shutdown = CancellationToken::new();
        let sweeper = SweeperLoop::new(dispatcher.clone(), Duration::from_millis(50));
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.task_info(&TaskId::new("t")).await.is_some() {
            assert!(tokio::time::Instant::now() < deadline, "task never expired");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
