use std::sync::{Arc, Mutex};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::debug;

use crate::device::types::DeviceEvent;

/// Fans every event out to all subscribers, in emission order.
///
/// Publishing never blocks, so it is safe to call from the notification task. Subscribers
/// that dropped their receiver are removed on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    senders: Arc<Mutex<Vec<UnboundedSender<DeviceEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<DeviceEvent> {
        let (sender, receiver) = unbounded();
        self.senders.lock().expect("Failed to lock EventBus senders").push(sender);
        receiver
    }

    /// Adds an existing sender, for example one owned by an application event loop.
    pub fn attach(&self, sender: UnboundedSender<DeviceEvent>) {
        self.senders.lock().expect("Failed to lock EventBus senders").push(sender);
    }

    pub fn publish(&self, event: DeviceEvent) {
        let mut senders = self.senders.lock().expect("Failed to lock EventBus senders");
        senders.retain(|sender| {
            if sender.unbounded_send(event.clone()).is_err() {
                debug!("Dropping closed event subscriber");
                return false;
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().expect("Failed to lock EventBus senders").len()
    }
}
