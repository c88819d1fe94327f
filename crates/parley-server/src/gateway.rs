use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use parley_core::{DocumentId, MessageDocument, ProtocolError};
use parley_store::MessageStore;

/// What the peer sees when the insert task itself dies.
pub const GENERIC_FAILURE: &str = "internal error";

/// Runs store inserts on the blocking pool so one connection's write never
/// stalls the others.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn MessageStore>,
    timeout: Option<Duration>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Bound each insert. An insert that outlives the bound may still land.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Insert one finished document and return its store id. No retries.
    #[instrument(skip_all, fields(chat_id = %document.chat_id))]
    pub async fn persist(&self, document: &MessageDocument) -> Result<DocumentId, ProtocolError> {
        let store = Arc::clone(&self.store);
        let pending = document.clone();
        let task = tokio::task::spawn_blocking(move || store.insert(&pending));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "message insert timed out");
                    return Err(ProtocolError::Persistence(format!(
                        "persistence timed out after {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(id)) => {
                debug!(id = %id, "message persisted");
                Ok(id)
            }
            Ok(Err(e)) => {
                error!(error = %e, role = %document.role, "failed to insert message");
                Err(ProtocolError::Persistence(e.to_string()))
            }
            Err(e) => {
                error!(error = %e, role = %document.role, "message insert task failed");
                Err(ProtocolError::Persistence(GENERIC_FAILURE.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ConversationId, ValidatedMessage};
    use parley_store::{Database, MessageRepo, StoreError};

    struct FailingStore;

    impl MessageStore for FailingStore {
        fn insert(&self, _message: &MessageDocument) -> Result<DocumentId, StoreError> {
            Err(StoreError::Database("disk I/O error".into()))
        }
    }

    struct PanickingStore;

    impl MessageStore for PanickingStore {
        fn insert(&self, _message: &MessageDocument) -> Result<DocumentId, StoreError> {
            panic!("driver bug");
        }
    }

    struct SlowStore(Duration);

    impl MessageStore for SlowStore {
        fn insert(&self, _message: &MessageDocument) -> Result<DocumentId, StoreError> {
            std::thread::sleep(self.0);
            Ok(DocumentId::new(1))
        }
    }

    fn doc() -> MessageDocument {
        MessageDocument::new(
            ConversationId::from_raw("c1"),
            ValidatedMessage {
                role: "user".into(),
                content: "hi".into(),
            },
        )
    }

    #[tokio::test]
    async fn persists_through_store() {
        let db = Database::in_memory().unwrap();
        let gateway = PersistenceGateway::new(Arc::new(MessageRepo::new(db.clone())));

        let id = gateway.persist(&doc()).await.unwrap();
        let stored = MessageRepo::new(db).get(id).unwrap();
        assert_eq!(stored.chat_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn store_failure_surfaces_cause() {
        let gateway = PersistenceGateway::new(Arc::new(FailingStore));
        let err = gateway.persist(&doc()).await.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Persistence("database error: disk I/O error".into())
        );
    }

    #[tokio::test]
    async fn worker_panic_is_generic_error() {
        let gateway = PersistenceGateway::new(Arc::new(PanickingStore));
        let err = gateway.persist(&doc()).await.unwrap_err();
        assert_eq!(err, ProtocolError::Persistence(GENERIC_FAILURE.into()));
    }

    #[tokio::test]
    async fn slow_insert_hits_timeout() {
        let gateway = PersistenceGateway::new(Arc::new(SlowStore(Duration::from_millis(500))))
            .with_timeout(Some(Duration::from_millis(20)));
        let err = gateway.persist(&doc()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Persistence(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn no_timeout_waits_for_slow_insert() {
        let gateway = PersistenceGateway::new(Arc::new(SlowStore(Duration::from_millis(30))));
        assert_eq!(gateway.persist(&doc()).await.unwrap(), DocumentId::new(1));
    }
}
