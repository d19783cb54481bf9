//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **ChainRouter**: 固定順序のステージ列
//! - **ChannelTransport**: プロセス内ワーカー向けの配送
//! - **RecordingTransport**: テスト用（送信内容を記録）
//! - **NoopEventSink / ChannelEventSink / MemoryEventSink**

pub mod chain_router;
pub mod channel_transport;
pub mod event_sinks;
pub mod recording;

pub use self::chain_router::ChainRouter;
pub use self::channel_transport::{ChannelTransport, WorkerMessage};
pub use self::event_sinks::{ChannelEventSink, MemoryEventSink, NoopEventSink};
pub use self::recording::RecordingTransport;
