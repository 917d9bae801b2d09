// crates/dataset-core/src/runtime/memory/bus.rs
// ============================================================================
// Module: In-Memory Message Bus
// Description: Channel-backed bus with delayed redelivery and a send log.
// Purpose: Drive background workers in tests and single-node deployments.
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! Messages are delivered through an unbounded channel. Delayed sends are
//! delivered by a spawned timer task. Every accepted send is also recorded
//! in a log so tests can assert on enqueued work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::message::JobRunMessage;
use crate::interfaces::BusError;
use crate::interfaces::MessageBus;
use crate::interfaces::SendOptions;

// ============================================================================
// SECTION: Bus
// ============================================================================

#[derive(Debug, Default)]
struct BusState {
    sent: Vec<(JobRunMessage, SendOptions)>,
    failures: usize,
}

/// Channel-backed message bus.
#[derive(Debug, Clone)]
pub struct InMemoryMessageBus {
    sender: mpsc::UnboundedSender<JobRunMessage>,
    state: Arc<Mutex<BusState>>,
}

/// Receiving half of an [`InMemoryMessageBus`].
#[derive(Debug)]
pub struct MessageReceiver {
    receiver: mpsc::UnboundedReceiver<JobRunMessage>,
}

impl MessageReceiver {
    /// Waits for the next message; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<JobRunMessage> {
        self.receiver.recv().await
    }

    /// Returns the next immediately available message.
    pub fn try_recv(&mut self) -> Option<JobRunMessage> {
        self.receiver.try_recv().ok()
    }
}

impl InMemoryMessageBus {
    /// Creates a bus and its receiver.
    #[must_use]
    pub fn new() -> (Self, MessageReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                state: Arc::new(Mutex::new(BusState::default())),
            },
            MessageReceiver {
                receiver,
            },
        )
    }

    /// Returns every accepted send in order.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the log lock is poisoned.
    pub fn sent(&self) -> Result<Vec<(JobRunMessage, SendOptions)>, BusError> {
        let state = self.state.lock().map_err(|_| BusError::Send("bus log poisoned".to_string()))?;
        Ok(state.sent.clone())
    }

    /// Rejects the next `count` sends.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the log lock is poisoned.
    pub fn fail_next_sends(&self, count: usize) -> Result<(), BusError> {
        let mut state = self.state.lock().map_err(|_| BusError::Send("bus log poisoned".to_string()))?;
        state.failures = count;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn send(&self, message: &JobRunMessage, options: SendOptions) -> Result<(), BusError> {
        {
            let mut state = self.state.lock().map_err(|_| BusError::Send("bus log poisoned".to_string()))?;
            if state.failures > 0 {
                state.failures -= 1;
                return Err(BusError::Send("injected send failure".to_string()));
            }
            state.sent.push((message.clone(), options.clone()));
        }
        match options.delay.filter(|delay| !delay.is_zero()) {
            Some(delay) => {
                let sender = self.sender.clone();
                let message = message.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sender.send(message);
                });
                Ok(())
            }
            None => self.sender.send(message.clone()).map_err(|_| BusError::Send("bus receiver closed".to_string())),
        }
    }
}
