//! Per-conversation fan-out of messages to every connection following that
//! conversation.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use parley_core::{ClientId, ConversationId};

/// A message pushed to a conversation's followers.
#[derive(Clone, Debug)]
pub struct BroadcastEvent {
    /// Connection that produced it; that connection skips it.
    /// `None` for producers outside any connection.
    pub origin: Option<ClientId>,
    pub message: Value,
}

impl BroadcastEvent {
    pub fn external(message: Value) -> Self {
        Self {
            origin: None,
            message,
        }
    }
}

pub struct BroadcastHub {
    channels: DashMap<ConversationId, broadcast::Sender<BroadcastEvent>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, chat_id: &ConversationId) -> broadcast::Receiver<BroadcastEvent> {
        self.channels
            .entry(chat_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send to every follower of `chat_id`. Returns how many received it.
    pub fn publish(&self, chat_id: &ConversationId, event: BroadcastEvent) -> usize {
        let Some(sender) = self.channels.get(chat_id) else {
            return 0;
        };
        let recipients = sender.send(event).unwrap_or(0);
        debug!(chat_id = %chat_id, recipients, "broadcast message");
        recipients
    }

    /// Drop the channel for `chat_id` once nobody follows it.
    pub fn release(&self, chat_id: &ConversationId) {
        let _ = self
            .channels
            .remove_if(chat_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn conversation_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One connection's view of the hub: follows at most one conversation.
pub struct Subscription {
    hub: Arc<BroadcastHub>,
    current: Option<(ConversationId, broadcast::Receiver<BroadcastEvent>)>,
}

impl Subscription {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub, current: None }
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.current.as_ref().map(|(id, _)| id)
    }

    /// Switch to `chat_id` if it differs from what we follow now.
    pub fn follow(&mut self, chat_id: Option<&ConversationId>) {
        let Some(chat_id) = chat_id else {
            return;
        };
        if self.conversation() == Some(chat_id) {
            return;
        }
        self.leave();
        let rx = self.hub.subscribe(chat_id);
        self.current = Some((chat_id.clone(), rx));
    }

    fn leave(&mut self) {
        if let Some((old, rx)) = self.current.take() {
            drop(rx);
            self.hub.release(&old);
        }
    }

    /// Wait for the next event. Pends forever while nothing is followed.
    pub async fn recv(&mut self) -> BroadcastEvent {
        loop {
            let Some((chat_id, rx)) = self.current.as_mut() else {
                return std::future::pending().await;
            };
            match rx.recv().await {
                Ok(event) => return event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(chat_id = %chat_id, skipped = n, "subscriber lagged, dropped broadcasts");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.current = None;
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn chat(id: &str) -> ConversationId {
        ConversationId::from_raw(id)
    }

    fn followers(hub: &BroadcastHub, chat_id: &ConversationId) -> usize {
        hub.channels
            .get(chat_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    #[test]
    fn publish_without_followers_reaches_nobody() {
        let hub = BroadcastHub::new(8);
        assert_eq!(hub.publish(&chat("a"), BroadcastEvent::external(json!({}))), 0);
        assert_eq!(hub.conversation_count(), 0);
    }

    #[tokio::test]
    async fn followers_of_conversation_receive() {
        let hub = BroadcastHub::new(8);
        let mut rx1 = hub.subscribe(&chat("a"));
        let mut rx2 = hub.subscribe(&chat("a"));
        let mut other = hub.subscribe(&chat("b"));

        let sent = hub.publish(&chat("a"), BroadcastEvent::external(json!({"content": "x"})));
        assert_eq!(sent, 2);
        assert_eq!(rx1.recv().await.unwrap().message["content"], "x");
        assert_eq!(rx2.recv().await.unwrap().message["content"], "x");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn release_keeps_channels_with_followers() {
        let hub = BroadcastHub::new(8);
        let rx = hub.subscribe(&chat("a"));
        hub.release(&chat("a"));
        assert_eq!(followers(&hub, &chat("a")), 1);

        drop(rx);
        hub.release(&chat("a"));
        assert_eq!(hub.conversation_count(), 0);
    }

    #[tokio::test]
    async fn subscription_switches_conversation() {
        let hub = Arc::new(BroadcastHub::new(8));
        let mut sub = Subscription::new(Arc::clone(&hub));

        sub.follow(Some(&chat("a")));
        assert_eq!(followers(&hub, &chat("a")), 1);

        sub.follow(Some(&chat("b")));
        assert_eq!(sub.conversation(), Some(&chat("b")));
        assert_eq!(followers(&hub, &chat("a")), 0);
        assert_eq!(followers(&hub, &chat("b")), 1);

        hub.publish(&chat("b"), BroadcastEvent::external(json!("hello")));
        let event = sub.recv().await;
        assert_eq!(event.message, json!("hello"));
        assert!(event.origin.is_none());
    }

    #[tokio::test]
    async fn follow_none_keeps_current() {
        let hub = Arc::new(BroadcastHub::new(8));
        let mut sub = Subscription::new(Arc::clone(&hub));
        sub.follow(Some(&chat("a")));
        sub.follow(None);
        assert_eq!(sub.conversation(), Some(&chat("a")));
    }

    #[tokio::test]
    async fn idle_subscription_pends() {
        let hub = Arc::new(BroadcastHub::new(8));
        let mut sub = Subscription::new(hub);
        let waited = tokio::time::timeout(Duration::from_millis(20), sub.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_to_newest() {
        let hub = Arc::new(BroadcastHub::new(1));
        let mut sub = Subscription::new(Arc::clone(&hub));
        sub.follow(Some(&chat("a")));

        hub.publish(&chat("a"), BroadcastEvent::external(json!(1)));
        hub.publish(&chat("a"), BroadcastEvent::external(json!(2)));

        assert_eq!(sub.recv().await.message, json!(2));
    }

    #[test]
    fn dropping_subscription_releases_channel() {
        let hub = Arc::new(BroadcastHub::new(8));
        {
            let mut sub = Subscription::new(Arc::clone(&hub));
            sub.follow(Some(&chat("a")));
            assert_eq!(hub.conversation_count(), 1);
        }
        assert_eq!(hub.conversation_count(), 0);
    }
}
