//! Ports - 抽象化レイヤー
//!
//! The engine's collaborators: stage routing, transport to workers, event
//! notification, time and id generation.

pub mod clock;
pub mod event_sink;
pub mod handler;
pub mod id_generator;
pub mod router;
pub mod transport;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::handler::{HandlerError, StageHandler};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::router::StageRouter;
pub use self::transport::{Delivery, Transport, TransportError};
