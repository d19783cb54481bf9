//! executor-core
//!
//! Task-routing engine for pipelines of executor stages.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, state, outcome, events, errors）
//! - **engine**: CapacityTracker, StageQueues, TaskRegistry, RetryPolicy, Dispatcher
//! - **ports**: 抽象化レイヤー（StageRouter, Transport, EventSink, Clock, IdGenerator, StageHandler）
//! - **impls**: 実装（ChainRouter, ChannelTransport, イベントシンクなど）
//! - **app**: 組み立てと実行ループ（EngineBuilder, SweeperLoop, PublisherLoop, WorkerLoop）
//! - **config**: EngineConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod impls;
pub mod ports;

pub use self::app::EngineBuilder;
pub use self::config::EngineConfig;
pub use self::engine::Dispatcher;
