// src/cli/commands.rs
use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// File name of the control socket
pub const SOCKET_FILE_NAME: &str = "pool-miner.sock";

/// Pool Miner - pool mining worker with a local control socket
#[derive(Parser, Debug)]
#[command(name = "pool-miner")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Run the mining service in the foreground
    Service(ServiceOptions),

    /// Send one control call to a running service
    Rpc(RpcOptions),

    /// Print live hash rate, status and submission events
    Feed(FeedOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for running the service
#[derive(Parser, Debug)]
pub struct ServiceOptions {
    /// Path to configuration file (default: searched in the usual places)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path of the control socket
    #[arg(short, long, default_value_os_t = default_socket_path())]
    pub socket: PathBuf,
}

/// Control calls available from the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "camelCase")]
pub enum RpcMethod {
    /// Print the status snapshot
    GetStatus,
    /// Print whether mining is wanted
    IsRunning,
    /// Start mining
    Start,
    /// Stop mining
    Stop,
}

impl RpcMethod {
    /// Fully qualified method name on the control socket
    pub fn method_name(self) -> &'static str {
        match self {
            RpcMethod::GetStatus => "mining_getStatus",
            RpcMethod::IsRunning => "mining_isRunning",
            RpcMethod::Start => "mining_start",
            RpcMethod::Stop => "mining_stop",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

/// Options for a single control call
#[derive(Parser, Debug)]
pub struct RpcOptions {
    /// Call to perform
    #[arg(value_enum)]
    pub method: RpcMethod,

    /// Path of the control socket
    #[arg(short, long, default_value_os_t = default_socket_path())]
    pub socket: PathBuf,
}

/// Options for the event feed
#[derive(Parser, Debug)]
pub struct FeedOptions {
    /// Path of the control socket
    #[arg(short, long, default_value_os_t = default_socket_path())]
    pub socket: PathBuf,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "pool-miner.toml")]
    pub output: PathBuf,
}

/// Control socket location when none is given
///
/// `$XDG_RUNTIME_DIR/pool-miner.sock`, or the same file name in the
/// temporary directory.
pub fn default_socket_path() -> PathBuf {
    env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join(SOCKET_FILE_NAME)
}
