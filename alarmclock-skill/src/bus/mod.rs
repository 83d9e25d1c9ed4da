//! Message bus seam.
//!
//! The skill only ever publishes through [`Publisher`]; inbound traffic
//! arrives as already-decoded [`Inbound`] values on a channel. The MQTT
//! transport lives in [`mqtt`]; tests use [`RecordingPublisher`].

pub mod messages;
pub mod mqtt;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::tracing::prelude::*;

pub use messages::{Inbound, IntentKind, IntentMessage, Outbound};

#[async_trait]
pub trait Publisher: Send + Sync + fmt::Debug {
    async fn publish(&self, message: Outbound) -> Result<(), TransportError>;
}

/// Publish in order. Failures are logged and do not stop the rest.
pub async fn publish_all(publisher: &dyn Publisher, messages: Vec<Outbound>) {
    for message in messages {
        let topic = message.topic();
        if let Err(e) = publisher.publish(message).await {
            warn!(topic = %topic, error = %e, "Publish failed");
        }
    }
}

/// Keeps every published message in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Outbound>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail without recording.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Drain what was published so far.
    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.published.lock())
    }

    pub fn published(&self) -> Vec<Outbound> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: Outbound) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("recording publisher offline".into()));
        }
        self.published.lock().push(message);
        Ok(())
    }
}
