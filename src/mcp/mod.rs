//! Model Context Protocol plumbing: transports, the handshake client, the
//! connection cache, and the tool registry built on top of them.

pub mod client;
pub mod connection;
pub mod hub;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub mod testing;
