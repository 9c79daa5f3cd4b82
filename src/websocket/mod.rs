pub mod connection;
pub mod handler;
pub mod session;
pub mod types;

pub use connection::PresenceRegistry;
pub use handler::ws_handler;
