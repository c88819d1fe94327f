//! The chat protocol for one connection, independent of the socket.
//!
//! Each inbound frame runs decode -> resolve conversation -> validate ->
//! persist, and always yields exactly one response while the session is
//! open. Failures become `{"errors": ...}` frames; none close the session.

use std::sync::Arc;

use tracing::debug;

use parley_core::codec::decode_frame;
use parley_core::validate::validate_message;
use parley_core::{
    ClientId, ConnectionState, ConversationId, MessageDocument, ProtocolError, Session,
};

use crate::broadcast::{BroadcastEvent, BroadcastHub};
use crate::gateway::PersistenceGateway;
use crate::response::OutgoingResponse;

pub struct ConnectionHandler {
    client_id: ClientId,
    session: Session,
    gateway: PersistenceGateway,
    hub: Arc<BroadcastHub>,
}

impl ConnectionHandler {
    pub fn new(
        client_id: ClientId,
        seed: Option<ConversationId>,
        gateway: PersistenceGateway,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            client_id,
            session: Session::seeded(seed),
            gateway,
            hub,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.session.conversation_id()
    }

    pub fn on_connect(&mut self) -> OutgoingResponse {
        self.session.open();
        OutgoingResponse::created()
    }

    /// Handle one text frame. `None` once the session is closed.
    pub async fn on_frame(&mut self, text: &str) -> Option<OutgoingResponse> {
        if !self.session.is_open() {
            debug!(client_id = %self.client_id, "frame after close ignored");
            return None;
        }

        let response = match self.process(text).await {
            Ok(document) => OutgoingResponse::saved(document),
            Err(e) => {
                debug!(client_id = %self.client_id, kind = e.error_kind(), "frame rejected");
                OutgoingResponse::from_error(&e)
            }
        };
        Some(response)
    }

    async fn process(&mut self, text: &str) -> Result<MessageDocument, ProtocolError> {
        let mut payload = decode_frame(text)?;
        let chat_id = self.session.resolve_conversation(&mut payload);

        let message = validate_message(&payload).map_err(|errors| {
            debug!(chat_id = %chat_id, %errors, "message validation failed");
            ProtocolError::ValidationFailed(errors)
        })?;

        let document = MessageDocument::new(chat_id, message);
        let id = self.gateway.persist(&document).await?;
        let document = document.with_id(id);

        self.share(&document);
        Ok(document)
    }

    /// Push a stored message to the other followers of its conversation.
    fn share(&self, document: &MessageDocument) {
        match serde_json::to_value(document) {
            Ok(message) => {
                let _ = self.hub.publish(
                    &document.chat_id,
                    BroadcastEvent {
                        origin: Some(self.client_id.clone()),
                        message,
                    },
                );
            }
            Err(e) => debug!(error = %e, "could not encode message for broadcast"),
        }
    }

    /// Forward a broadcast. The session is not touched; our own
    /// publications are skipped.
    pub fn on_broadcast(&self, event: BroadcastEvent) -> Option<OutgoingResponse> {
        if !self.session.is_open() || event.origin.as_ref() == Some(&self.client_id) {
            return None;
        }
        Some(OutgoingResponse::broadcast(event.message))
    }

    pub fn on_disconnect(&mut self) {
        self.session.close();
    }
}
