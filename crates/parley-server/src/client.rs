//! Connected client bookkeeping: outbound queue and liveness.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use parley_core::ClientId;

/// A connected WebSocket client.
pub struct ClientConnection {
    pub id: ClientId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<String>,
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping check.
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Count of frames dropped due to a full channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    pub fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a reply, waiting for room if the queue is full. Returns `false`
    /// only once the writer has gone away.
    pub async fn reply(&self, frame: String) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    /// Queue a pushed frame without waiting. Returns `false` if the queue is
    /// full or closed.
    pub fn send(&self, frame: String) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a pong (or any inbound activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag. `true` if the client was heard from
    /// since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Registry of all connected clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientConnection>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Register a new client and return it with the receiving end of its
    /// outbound queue.
    pub fn register(&self) -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let client = Arc::new(ClientConnection::new(ClientId::generate(), tx));
        let _ = self.clients.insert(client.id.clone(), Arc::clone(&client));
        (client, rx)
    }

    pub fn unregister(&self, id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(id) {
            info!(
                client_id = %id,
                age_ms = client.age().as_millis() as u64,
                dropped = client.drop_count(),
                "client unregistered"
            );
        }
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }
}
