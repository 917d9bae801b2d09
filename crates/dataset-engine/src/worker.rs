// crates/dataset-engine/src/worker.rs
// ============================================================================
// Module: Job Worker
// Description: Message-type dispatch for background job runners.
// Purpose: Drain job-run messages and route them to their pipelines.
// Dependencies: dataset-core, async-trait, tokio
// ============================================================================

//! ## Overview
//! Runners register under a message type. Each runner owns its retry
//! policy and requeues its own messages, so the worker only routes,
//! records failures, and keeps draining. Delivery is at-least-once; every
//! runner tolerates redelivery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dataset_core::DatasetError;
use dataset_core::JobRunMessage;
use dataset_core::OpContext;
use dataset_core::runtime::memory::MessageReceiver;

use crate::events::EngineEvent;
use crate::events::EngineEventSink;
use crate::events::JOB_FAILED;

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Handles one job-run message type.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Processes one delivery of `message`.
    ///
    /// # Errors
    ///
    /// Returns an error the runner could neither retry nor record.
    async fn run(&self, ctx: &OpContext, message: &JobRunMessage) -> Result<(), DatasetError>;
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Routes job-run messages to registered runners.
#[derive(Clone)]
pub struct JobWorker {
    /// Runners by message type.
    runners: BTreeMap<String, Arc<dyn JobRunner>>,
    /// Failure sink.
    events: Arc<dyn EngineEventSink>,
}

impl JobWorker {
    /// Creates a worker without runners.
    #[must_use]
    pub fn new(events: Arc<dyn EngineEventSink>) -> Self {
        Self {
            runners: BTreeMap::new(),
            events,
        }
    }

    /// Registers `runner` for `message_type`, replacing any previous one.
    #[must_use]
    pub fn register(mut self, message_type: &str, runner: Arc<dyn JobRunner>) -> Self {
        self.runners.insert(message_type.to_string(), runner);
        self
    }

    /// Runs the handler of one message.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for unknown message types and
    /// the runner's error otherwise.
    pub async fn dispatch(&self, ctx: &OpContext, message: &JobRunMessage) -> Result<(), DatasetError> {
        let result = match self.runners.get(&message.msg_type) {
            Some(runner) => runner.run(ctx, message).await,
            None => Err(DatasetError::InvalidParam(format!("no runner for message type {}", message.msg_type))),
        };
        if let Err(err) = &result {
            let mut event =
                EngineEvent::error(JOB_FAILED, format!("{} delivery failed: {err}", message.msg_type)).caused_by(err);
            if let Some(job_id) = message.job_id {
                event = event.job(job_id);
            }
            if let Ok(version_id) = message.version_id() {
                event = event.version(version_id);
            }
            self.events.record(&event);
        }
        result
    }

    /// Drains `receiver` until the context ends or the bus closes.
    ///
    /// Returns the number of messages handled.
    pub async fn run(&self, ctx: &OpContext, receiver: &mut MessageReceiver) -> u64 {
        let mut handled = 0_u64;
        loop {
            let message = tokio::select! {
                _ = ctx.done() => break,
                message = receiver.recv() => message,
            };
            let Some(message) = message else {
                break;
            };
            // Failures are recorded by dispatch; the loop keeps draining.
            let _ = self.dispatch(ctx, &message).await;
            handled += 1;
        }
        handled
    }
}
