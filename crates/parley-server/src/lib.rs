pub mod broadcast;
pub mod client;
pub mod connection;
pub mod gateway;
pub mod handler;
pub mod response;
pub mod server;

pub use broadcast::{BroadcastEvent, BroadcastHub};
pub use gateway::PersistenceGateway;
pub use handler::ConnectionHandler;
pub use response::OutgoingResponse;
pub use server::{start, ServerConfig, ServerHandle};
