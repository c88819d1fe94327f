//! Per-connection conversation state.

use serde_json::Value;
use tracing::debug;

use crate::ids::ConversationId;
use crate::messages::Payload;

/// Query parameter names accepted at connect time, in precedence order.
pub const CONNECT_PARAMS: [&str; 3] = ["chat", "chat_id", "chatId"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// State owned by exactly one connection for its whole lifetime.
#[derive(Debug)]
pub struct Session {
    conversation_id: Option<ConversationId>,
    state: ConnectionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::seeded(None)
    }

    /// Start with a conversation already chosen (e.g. from the upgrade URL).
    pub fn seeded(conversation_id: Option<ConversationId>) -> Self {
        Self {
            conversation_id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// `Connecting -> Open`. A closed session stays closed.
    pub fn open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Pick the conversation for the current message.
    ///
    /// First match wins: an explicit `chat_id` in the payload (which also
    /// becomes the session default), then the session's current id, then a
    /// freshly generated one. The result is written back into the payload.
    pub fn resolve_conversation(&mut self, payload: &mut Payload) -> ConversationId {
        let resolved = if let Some(requested) = requested_conversation(payload) {
            debug!(chat_id = %requested, "using provided chat_id");
            self.conversation_id = Some(requested.clone());
            requested
        } else if let Some(existing) = &self.conversation_id {
            debug!(chat_id = %existing, "using existing session chat_id");
            existing.clone()
        } else {
            let fresh = ConversationId::generate();
            debug!(chat_id = %fresh, "created new chat_id");
            self.conversation_id = Some(fresh.clone());
            fresh
        };

        let _ = payload.insert("chat_id".into(), Value::String(resolved.to_string()));
        resolved
    }
}

/// Read a usable `chat_id` out of a payload.
///
/// Non-empty strings and non-zero numbers count. Zero, booleans, arrays and
/// objects are treated as absent.
pub fn requested_conversation(payload: &Payload) -> Option<ConversationId> {
    match payload.get("chat_id")? {
        Value::String(s) if !s.is_empty() => Some(ConversationId::from_raw(s.as_str())),
        Value::Number(n) if n.as_f64() != Some(0.0) => {
            Some(ConversationId::from_raw(n.to_string()))
        }
        _ => None,
    }
}

/// Resolve a conversation id supplied at connect time.
///
/// Absent or empty means no seed. A value that is not a UUID is replaced
/// with a fresh id instead of being rejected.
pub fn conversation_from_connect_param(raw: Option<&str>) -> Option<ConversationId> {
    let raw = raw.filter(|v| !v.is_empty())?;
    match ConversationId::parse_uuid(raw) {
        Some(id) => Some(id),
        None => {
            let fresh = ConversationId::generate();
            debug!(requested = raw, chat_id = %fresh, "connect chat_id is not a UUID, generated a new one");
            Some(fresh)
        }
    }
}
