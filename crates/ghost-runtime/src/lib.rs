//! Ghost Runtime - task stack, cache-backed persistence, sessions and queues

pub mod cache;
pub mod driver;
pub mod process;
pub mod queue;
pub mod session;
pub mod task;

pub use cache::{Cache, MemoryCache};
pub use driver::{CacheRuntime, RuntimeDriver, RuntimeFactory};
pub use process::Process;
pub use queue::{ChannelQueue, MemoryQueue, MessageQueue};
pub use session::Session;
pub use task::{Task, TaskLevel, TaskStatus};
