//! App - アプリケーション層
//!
//! このモジュールは、engine と ports を組み合わせて実行単位を提供します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: Dispatcher の構築とワイヤリング
//! - **SweeperLoop**: 配送期限切れの回収・凍結タスクの解凍
//! - **PublisherLoop**: TaskEvent の配送
//! - **WorkerLoop**: プロセス内ワーカー（StageHandler を実行）

pub mod builder;
pub mod publisher_loop;
pub mod sweeper_loop;
pub mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::publisher_loop::{EventSubscriber, LoggingSubscriber, PublisherLoop};
pub use self::sweeper_loop::SweeperLoop;
pub use self::worker_loop::{WorkerLoop, WorkerStats};
