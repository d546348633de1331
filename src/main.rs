// src/main.rs
use clap::Parser;
use pool_miner_rs::cli::{self, Action, RpcMethod};
use pool_miner_rs::config::{self, FileConfigSource};
use pool_miner_rs::network::PoolClientFactory;
use pool_miner_rs::rpc::{ControlEndpoint, NotificationHub, RpcClient, RpcServer};
use pool_miner_rs::service::{MiningOrchestrator, ServiceStateMachine};
use pool_miner_rs::types::StreamKind;
use pool_miner_rs::utils::{self, MinerError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;

/// Main entry point
///
/// An invariant violation inside the service surfaces here as an error,
/// which ends the process with a non-zero exit code.
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        Action::Service(opts) => run_service(opts),
        Action::Rpc(opts) => call_service(opts),
        Action::Feed(opts) => watch_feed(opts),
        Action::Config(opts) => generate_config(opts),
    }
}

/// Runs orchestrator, state machine and control socket until SIGINT or SIGTERM
fn run_service(opts: cli::ServiceOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let rt = Runtime::new()?;
    rt.block_on(async {
        let source = Arc::new(FileConfigSource::new(opts.config));
        let orchestrator = Arc::new(MiningOrchestrator::new(
            source,
            Arc::new(PoolClientFactory::default()),
        ));
        let hub = Arc::new(NotificationHub::new(orchestrator.clone()));
        let endpoint = Arc::new(ControlEndpoint::new(orchestrator.clone(), hub));

        let shutdown = CancellationToken::new();
        let server = RpcServer::bind(&opts.socket, endpoint)?;
        let server = tokio::spawn(server.serve(shutdown.clone()));
        let mut machine = tokio::spawn(ServiceStateMachine::new(orchestrator.clone()).run(shutdown.clone()));

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;
        log::info!("Mining service started");

        let early_exit = tokio::select! {
            _ = sigint.recv() => {
                log::info!("Received SIGINT");
                None
            }
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM");
                None
            }
            result = &mut machine => Some(result),
        };

        log::trace!("Shutting down");
        orchestrator.stop();
        shutdown.cancel();

        let machine_result = match early_exit {
            Some(result) => result?,
            None => machine.await?,
        };
        server.await??;
        machine_result?;

        log::info!("Exiting");
        Ok(())
    })
}

/// Performs a single control call and prints its result
fn call_service(opts: cli::RpcOptions) -> Result<(), MinerError> {
    utils::init_cli_logging();

    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut client = RpcClient::connect(&opts.socket).await?;
        match opts.method {
            RpcMethod::GetStatus => {
                let status = client.get_status().await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            RpcMethod::IsRunning => println!("{}", client.is_running().await?),
            RpcMethod::Start => {
                client.start().await?;
                println!("Mining started");
            }
            RpcMethod::Stop => {
                client.stop().await?;
                println!("Mining stopped");
            }
        }
        Ok(())
    })
}

/// Subscribes to every stream and prints events until Enter is pressed
fn watch_feed(opts: cli::FeedOptions) -> Result<(), MinerError> {
    utils::init_cli_logging();

    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut client = RpcClient::connect(&opts.socket).await?;
        let mut streams = HashMap::new();
        for kind in StreamKind::ALL {
            let id = client.subscribe(kind).await?;
            streams.insert(id, kind);
        }
        println!("Watching the mining service, press Enter to quit");

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = stdin.next_line() => break,
                notification = client.next_notification() => match notification? {
                    Some(params) => match streams.get(&params.subscription) {
                        Some(StreamKind::HashRate) => {
                            let rate = params.result.as_f64().unwrap_or_default();
                            println!("hash rate: {:.2} H/s", rate);
                        }
                        Some(kind) => println!("{}: {}", kind, params.result),
                        None => log::debug!("Event for unknown subscription {}", params.subscription),
                    },
                    None => {
                        println!("The service closed the connection");
                        break;
                    }
                },
            }
        }
        Ok(())
    })
}

/// Writes the configuration template
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let template = config::generate_template();
    std::fs::write(&opts.output, template)?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}
