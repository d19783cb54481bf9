//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 依存はすべて明示的に渡す（グローバルな singleton は持たない）

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{ConfigError, EngineConfig};
use crate::engine::dispatcher::{Dispatcher, EngineState};
use crate::engine::{MostFreeSlots, RetryPolicy, SelectionPolicy};
use crate::impls::NoopEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, StageRouter, SystemClock, Transport, UlidGenerator};

/// EngineBuilder は Dispatcher を構築
///
/// # 使用例
/// ```ignore
/// let dispatcher = EngineBuilder::new(config)
///     .router(ChainRouter::new(["JobPath", "JobSanity"]))
///     .transport(transport)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - router と transport は必須
/// - config は build() 時に検証
/// - event sink / clock / id generator / selection policy には既定値がある
pub struct EngineBuilder {
    config: EngineConfig,
    router: Option<Arc<dyn StageRouter>>,
    transport: Option<Arc<dyn Transport>>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    selection: Arc<dyn SelectionPolicy>,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no stage router configured")]
    MissingRouter,

    #[error("no transport configured")]
    MissingTransport,

    #[error("invalid engine config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            router: None,
            transport: None,
            events: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            selection: Arc::new(MostFreeSlots),
        }
    }

    pub fn router(self, router: impl StageRouter + 'static) -> Self {
        self.router_arc(Arc::new(router))
    }

    pub fn router_arc(mut self, router: Arc<dyn StageRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn event_sink(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn selection_policy(mut self, selection: impl SelectionPolicy + 'static) -> Self {
        self.selection = Arc::new(selection);
        self
    }

    /// # 検証
    /// - router / transport が設定されているか
    /// - EngineConfig::validate()
    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let router = self.router.ok_or(BuildError::MissingRouter)?;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        self.config.validate()?;

        Ok(Dispatcher {
            state: Mutex::new(EngineState::default()),
            router,
            transport,
            events: self.events,
            clock: self.clock,
            ids: self.ids,
            selection: self.selection,
            retry: RetryPolicy::from_config(&self.config),
            dispatch_timeout: self.config.dispatch_timeout(),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
