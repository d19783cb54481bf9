//! In-process run: one engine, a few workers per stage, synthetic tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use executor_core::app::{
    EngineBuilder, EventSubscriber, LoggingSubscriber, PublisherLoop, SweeperLoop, WorkerLoop,
};
use executor_core::domain::{ResultCode, StageName, TaskEvent, WorkerId};
use executor_core::engine::EngineSnapshot;
use executor_core::impls::{ChainRouter, ChannelEventSink, ChannelTransport};
use executor_core::ports::{Delivery, HandlerError, StageHandler};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigFile;

/// Sleeps, then fails with the configured probability.
struct FlakyHandler {
    failure_rate: f64,
    delay: Duration,
}

#[async_trait]
impl StageHandler for FlakyHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<ResultCode, HandlerError> {
        tokio::time::sleep(self.delay).await;
        if rand::random::<f64>() < self.failure_rate {
            return Err(HandlerError::new(format!(
                "simulated failure in {} (attempt {})",
                delivery.stage, delivery.attempt
            )));
        }
        Ok(ResultCode::ok())
    }
}

/// Counts terminal events and wakes the waiter when all are in.
#[derive(Default)]
struct Completion {
    finished: AtomicUsize,
    failed: AtomicUsize,
    notify: Notify,
}

impl Completion {
    async fn wait_for(&self, total: usize) {
        loop {
            let notified = self.notify.notified();
            if self.finished.load(Ordering::SeqCst) >= total {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl EventSubscriber for Completion {
    async fn on_event(&self, event: &TaskEvent) {
        if !event.is_terminal() {
            return;
        }
        if matches!(event, TaskEvent::Failed { .. }) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

pub async fn run(config: ConfigFile) -> Result<EngineSnapshot> {
    let demo = config.demo;
    let router = ChainRouter::new(demo.stages.iter().cloned());
    let entry = router.first().cloned().context("no stages configured")?;

    let transport = ChannelTransport::new();
    let (events, event_rx) = ChannelEventSink::new();
    let dispatcher = Arc::new(
        EngineBuilder::new(config.engine.clone())
            .router(router)
            .transport(transport.clone())
            .event_sink(events)
            .build()
            .context("building engine")?,
    );

    let shutdown = CancellationToken::new();
    let completion = Arc::new(Completion::default());
    let publisher = tokio::spawn(
        PublisherLoop::new(event_rx)
            .subscribe(completion.clone())
            .subscribe(Arc::new(LoggingSubscriber))
            .run(shutdown.clone()),
    );
    let sweeper = tokio::spawn(
        SweeperLoop::new(dispatcher.clone(), config.engine.sweep_interval()).run(shutdown.clone()),
    );

    let handler = Arc::new(FlakyHandler {
        failure_rate: demo.failure_rate,
        delay: Duration::from_millis(demo.handler_delay_ms),
    });
    let mut workers = JoinSet::new();
    for stage in &demo.stages {
        for n in 0..demo.workers_per_stage {
            let worker = WorkerLoop::new(
                dispatcher.clone(),
                transport.clone(),
                handler.clone(),
                WorkerId::new(format!("{stage}-{n}")),
                StageName::new(stage.as_str()),
                demo.worker_capacity,
            );
            workers.spawn(worker.run(shutdown.clone()));
        }
    }

    for i in 0..demo.tasks {
        dispatcher
            .submit(entry.clone(), serde_json::json!({ "job": i }))
            .await
            .context("submitting task")?;
    }
    info!(tasks = demo.tasks, stages = demo.stages.len(), "tasks submitted");

    tokio::select! {
        _ = completion.wait_for(demo.tasks) => {
            info!(
                finished = completion.finished.load(Ordering::SeqCst),
                failed = completion.failed.load(Ordering::SeqCst),
                "all tasks reached a terminal state"
            );
        }
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            warn!("interrupted, shutting down");
        }
    }

    shutdown.cancel();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(stats)) => info!(?stats, "worker finished"),
            Ok(Err(err)) => warn!(%err, "worker stopped with an error"),
            Err(err) => warn!(%err, "worker task panicked"),
        }
    }
    sweeper.await.context("joining sweeper")?;
    publisher.await.context("joining publisher")?;

    Ok(dispatcher.state().await)
}
