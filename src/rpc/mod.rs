// src/rpc/mod.rs
//! Local control interface: JSON-RPC over a Unix domain socket

/// Command-line side of the control socket
pub mod client;
/// Method table
pub mod endpoint;
/// Subscription fan-out
pub mod hub;
/// Wire envelopes
pub mod messages;
/// Socket listener and per-connection sessions
pub mod server;

pub use client::RpcClient;
pub use endpoint::ControlEndpoint;
pub use hub::{NotificationHub, SubscriptionHandle, SubscriptionSink};
pub use server::RpcServer;
