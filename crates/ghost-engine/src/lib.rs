//! Ghost Engine - thinks, focus, the operator kernel and the turn scheduler

pub mod container;
pub mod context;
pub mod event;
pub mod focus;
pub mod kernel;
pub mod mind;
pub mod mindset;
pub mod operator;
pub mod scheduler;
pub mod think;

pub use container::Container;
pub use context::{Context, Sender, TurnResult};
pub use event::{Event, EventKind};
pub use focus::{
    CommandDriver, Focus, FocusDriver, Intention, Matched, RegexDriver, Signal, Target,
};
pub use mind::Mind;
pub use mindset::{MemoryMetaStorage, Mindset, ThinkMetaStorage};
pub use operator::{Operator, WithdrawKind};
pub use scheduler::{Ghost, GhostBuilder, Reply};
pub use think::{
    FnStage, Reaction, Stage, StageResult, StageThink, TaskOptions, Think, ThinkDriver, ThinkMeta,
};
