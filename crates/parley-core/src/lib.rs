//! Protocol types shared by the parley crates: frame decoding, message
//! validation, conversation resolution and the persisted document shape.

pub mod codec;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod session;
pub mod validate;

pub use errors::{FieldErrors, ProtocolError};
pub use ids::{ClientId, ConversationId, DocumentId};
pub use messages::{MessageDocument, Payload};
pub use session::{ConnectionState, Session};
pub use validate::ValidatedMessage;
