//! Async input delivery
//!
//! Async inputs produced during a turn are pushed after the turn commits, in
//! the order they were scheduled.

use ghost_core::{Error, Input, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

pub trait MessageQueue: Send + Sync {
    fn push(&self, input: Input) -> Result<()>;
}

/// FIFO buffer, drained by whoever polls it.
#[derive(Default)]
pub struct MemoryQueue {
    inputs: Mutex<VecDeque<Input>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<Input> {
        self.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<Input> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Input>> {
        self.inputs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageQueue for MemoryQueue {
    fn push(&self, input: Input) -> Result<()> {
        self.lock().push_back(input);
        Ok(())
    }
}

/// Feeds async inputs into a tokio channel consumed by the shell loop.
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<Input>,
}

impl ChannelQueue {
    pub fn new(tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Input>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl MessageQueue for ChannelQueue {
    fn push(&self, input: Input) -> Result<()> {
        self.tx
            .send(input)
            .map_err(|e| Error::cache(format!("async input channel closed: {}", e.0.mid)))
    }
}
