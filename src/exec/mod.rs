//! Task execution: per-task event channels, per-kind sessions, and
//! sequential batch driving

mod batch;
mod channel;
mod session;

pub use batch::{BatchCanceller, BatchReport, BatchRunner};
pub use channel::{ChannelEvent, ChannelGuard, EventChannel};
pub use session::{ExecutionSession, SessionHandle, SessionState};
