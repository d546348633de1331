// src/cli/mod.rs
//! Command-line interface definitions

/// Subcommands and their options
pub mod commands;

pub use commands::{
    Action, Commands, ConfigOptions, FeedOptions, RpcMethod, RpcOptions, ServiceOptions,
    default_socket_path,
};
