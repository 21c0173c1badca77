use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{DeadLetter, HandoffMessage, LifecycleEvent, Publisher};

/// Publisher that keeps every message in memory.
///
/// `fail_next_handoffs` makes the next N hand-off publishes fail.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    handoffs: Mutex<Vec<HandoffMessage>>,
    events: Mutex<Vec<LifecycleEvent>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    fail_handoffs: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_handoffs(&self, n: usize) {
        self.fail_handoffs.store(n, Ordering::SeqCst);
    }

    pub fn handoffs(&self) -> Vec<HandoffMessage> {
        self.handoffs.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

fn push<T>(list: &Mutex<Vec<T>>, item: T) -> Result<()> {
    list.lock()
        .map_err(|_| anyhow!("Recording publisher lock poisoned"))?
        .push(item);
    Ok(())
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish_handoff(&self, message: &HandoffMessage) -> Result<()> {
        let injected = self
            .fail_handoffs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            bail!("Injected hand-off failure for {}", message.fingerprint);
        }
        push(&self.handoffs, message.clone())
    }

    async fn publish_event(&self, event: &LifecycleEvent) -> Result<()> {
        push(&self.events, event.clone())
    }

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        push(&self.dead_letters, letter.clone())
    }
}
