//! Message bus contract (spec §2.1, §4.1) — an external collaborator the
//! daemon consumes events from, never implemented here. A concrete
//! transport (AMQP, a websocket relay, whatever the deployment uses) adapts
//! to this trait, the way `BuildSystemClient` stands in for XML-RPC.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{RepoDoneEvent, TagEvent};

/// One message off the bus, already demultiplexed by topic family. Other
/// topics are handed to the classifier as `Unrecognized` rather than
/// dropped at this layer, so unexpected topics surface as a classifier
/// decision, not a silent bus-level filter.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Tag(TagEvent),
    RepoDone(RepoDoneEvent),
    Unrecognized { topic: String },
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribe and start delivering messages into `sender`. Returns once
    /// the subscription is live; delivery continues on the bus
    /// implementation's own task until the channel's receiver is dropped.
    async fn subscribe(&self, sender: mpsc::Sender<BusMessage>) -> anyhow::Result<()>;
}

/// In-memory bus used by tests: messages pushed with [`FakeBus::push`] are
/// forwarded to every subscriber in order.
#[derive(Default)]
pub struct FakeBus {
    queued: tokio::sync::Mutex<Vec<BusMessage>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, msg: BusMessage) {
        self.queued.lock().await.push(msg);
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn subscribe(&self, sender: mpsc::Sender<BusMessage>) -> anyhow::Result<()> {
        let queued = std::mem::take(&mut *self.queued.lock().await);
        for msg in queued {
            sender.send(msg).await.ok();
        }
        Ok(())
    }
}
