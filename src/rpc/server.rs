// src/rpc/server.rs
//! Control socket
//!
//! Newline-delimited JSON-RPC over a Unix domain socket. Every accepted
//! connection is a session with its own outbound queue; closing the
//! connection ends all of its subscriptions.

use crate::rpc::endpoint::ControlEndpoint;
use crate::rpc::hub::{Delivery, SubscriptionSink};
use crate::rpc::messages::{
    ErrorObject, INVALID_REQUEST, JSONRPC_VERSION, Notification, PARSE_ERROR, Request, Response,
};
use crate::utils::error::MinerError;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

/// Longest accepted request line
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Notifications queued per session before events are dropped
pub const SESSION_QUEUE: usize = 64;

/// Listening control socket
pub struct RpcServer {
    listener: UnixListener,
    path: PathBuf,
    endpoint: Arc<ControlEndpoint>,
}

impl RpcServer {
    /// Binds the socket, replacing a stale socket file left by an earlier run
    ///
    /// # Errors
    /// `MinerError::IoError` if the socket cannot be created.
    pub fn bind(path: &Path, endpoint: Arc<ControlEndpoint>) -> Result<Self, MinerError> {
        if path.exists() {
            log::debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        log::info!("Control socket listening on {}", path.display());
        Ok(RpcServer {
            listener,
            path: path.to_path_buf(),
            endpoint,
        })
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections until `shutdown` is cancelled
    ///
    /// Cancelling `shutdown` also ends every open session. The socket file
    /// is removed on return.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), MinerError> {
        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        log::debug!("Control client connected");
                        let session = Session::new(self.endpoint.clone(), shutdown.child_token());
                        tokio::spawn(session.run(stream));
                    }
                    Err(e) => {
                        log::error!("Failed to accept control connection: {}", e);
                        break Err(MinerError::from(e));
                    }
                },
            }
        };

        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("Could not remove {}: {}", self.path.display(), e);
        }
        log::info!("Control socket closed");
        result
    }
}

struct Session {
    endpoint: Arc<ControlEndpoint>,
    closed: CancellationToken,
}

impl Session {
    fn new(endpoint: Arc<ControlEndpoint>, closed: CancellationToken) -> Self {
        Session { endpoint, closed }
    }

    async fn run(self, stream: UnixStream) {
        let mut conn = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let (tx, mut deliveries) = mpsc::channel(SESSION_QUEUE);
        let sink = SubscriptionSink::new(tx, self.closed.clone());

        if let Err(e) = self.pump(&mut conn, &mut deliveries, &sink).await {
            log::debug!("Control session ended: {}", e);
        }
        // ends every subscription of this session
        self.closed.cancel();
        log::debug!("Control client disconnected");
    }

    async fn pump(
        &self,
        conn: &mut Framed<UnixStream, LinesCodec>,
        deliveries: &mut mpsc::Receiver<Delivery>,
        sink: &SubscriptionSink,
    ) -> Result<(), MinerError> {
        loop {
            tokio::select! {
                _ = self.closed.cancelled() => return Ok(()),
                line = conn.next() => match line {
                    Some(line) => {
                        if let Some(response) = self.handle_line(&line?, sink) {
                            conn.send(serde_json::to_string(&response)?).await?;
                        }
                    }
                    None => return Ok(()),
                },
                Some(delivery) = deliveries.recv() => {
                    let notification = Notification::new(
                        delivery.subscription,
                        serde_json::to_value(&delivery.event)?,
                    );
                    conn.send(serde_json::to_string(&notification)?).await?;
                }
            }
        }
    }

    fn handle_line(&self, line: &str, sink: &SubscriptionSink) -> Option<Response> {
        if line.trim().is_empty() {
            return None;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(Response::failure(
                    Value::Null,
                    ErrorObject::new(PARSE_ERROR, format!("Parse error: {}", e)),
                ));
            }
        };
        let id = value.get("id").cloned();
        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(Response::failure(
                    id.unwrap_or(Value::Null),
                    ErrorObject::new(INVALID_REQUEST, format!("Invalid request: {}", e)),
                ));
            }
        };
        if request.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            return Some(Response::failure(
                id.unwrap_or(Value::Null),
                ErrorObject::new(INVALID_REQUEST, "Invalid request: jsonrpc must be \"2.0\""),
            ));
        }

        let outcome = self.endpoint.call(&request.method, &request.params, sink);
        let id = request.id?;
        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => {
                log::debug!("{} failed: {}", request.method, error.message);
                Response::failure(id, error)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::client::RpcClient;
    use crate::rpc::hub::NotificationHub;
    use crate::rpc::messages::METHOD_NOT_FOUND;
    use crate::service::orchestrator::MiningOrchestrator;
    use crate::testing::{ScriptedEngineFactory, StaticConfigSource, sample_config};
    use crate::types::StreamKind;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::timeout;

    struct Harness {
        dir: PathBuf,
        socket: PathBuf,
        orchestrator: Arc<MiningOrchestrator>,
        hub: Arc<NotificationHub>,
        shutdown: CancellationToken,
        server: tokio::task::JoinHandle<Result<(), MinerError>>,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn harness(name: &str) -> Harness {
        let dir = std::env::temp_dir().join(format!("pool-miner-rpc-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let socket = dir.join("control.sock");

        let orchestrator = Arc::new(MiningOrchestrator::new(
            Arc::new(StaticConfigSource::new(Some(sample_config()))),
            Arc::new(ScriptedEngineFactory::default()),
        ));
        let hub = Arc::new(NotificationHub::new(orchestrator.clone()));
        let endpoint = Arc::new(ControlEndpoint::new(orchestrator.clone(), hub.clone()));
        let server = RpcServer::bind(&socket, endpoint).unwrap();
        assert_eq!(server.path(), socket.as_path());

        let shutdown = CancellationToken::new();
        let server = tokio::spawn(server.serve(shutdown.clone()));
        Harness {
            dir,
            socket,
            orchestrator,
            hub,
            shutdown,
            server,
        }
    }

    async fn wait_for_count(hub: &NotificationHub, kind: StreamKind, count: usize) {
        timeout(Duration::from_secs(5), async {
            while hub.subscriber_count(kind) != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn control_calls_reach_the_orchestrator() {
        let mut h = harness("calls");
        let mut client = RpcClient::connect(&h.socket).await.unwrap();

        assert!(client.is_running().await.unwrap());
        client.stop().await.unwrap();
        assert!(!h.orchestrator.is_running());
        assert!(!client.get_status().await.unwrap().is_running);
        client.start().await.unwrap();
        assert!(client.is_running().await.unwrap());

        let err = client.call("mining_isPaused", Value::Null).await.unwrap_err();
        assert!(matches!(err, MinerError::RpcError { code, .. } if code == METHOD_NOT_FOUND));

        h.shutdown.cancel();
        (&mut h.server).await.unwrap().unwrap();
        assert!(!h.socket.exists());
    }

    #[tokio::test]
    async fn subscriptions_deliver_status_events() {
        let h = harness("status");
        let mut client = RpcClient::connect(&h.socket).await.unwrap();
        let id = client.subscribe(StreamKind::Status).await.unwrap();

        h.orchestrator.load_config().unwrap();
        h.orchestrator.initialize_engine().unwrap();
        let run = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_until_stopped().await })
        };

        let notification = timeout(Duration::from_secs(5), client.next_notification())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(notification.subscription, id);
        assert_eq!(notification.result["isConnected"], json!(true));

        client.stop().await.unwrap();
        run.await.unwrap().unwrap();
        let notification = timeout(Duration::from_secs(5), client.next_notification())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(notification.result["isConnected"], json!(false));

        assert!(client.unsubscribe(&id).await.unwrap());
        assert_eq!(h.hub.subscriber_count(StreamKind::Status), 0);
    }

    #[tokio::test]
    async fn disconnect_removes_subscriptions() {
        let h = harness("disconnect");
        let mut client = RpcClient::connect(&h.socket).await.unwrap();
        for kind in StreamKind::ALL {
            client.subscribe(kind).await.unwrap();
        }
        assert_eq!(h.hub.subscriber_count(StreamKind::HashRate), 1);

        drop(client);
        for kind in StreamKind::ALL {
            wait_for_count(&h.hub, kind, 0).await;
        }
    }

    #[tokio::test]
    async fn malformed_lines_get_error_responses() {
        let h = harness("malformed");
        let stream = UnixStream::connect(&h.socket).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"{not json\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], json!(PARSE_ERROR));
        assert_eq!(reply["id"], Value::Null);

        write
            .write_all(b"{\"jsonrpc\":\"1.0\",\"id\":4,\"method\":\"mining_isRunning\"}\n")
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], json!(INVALID_REQUEST));
        assert_eq!(reply["id"], json!(4));

        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"mining_isRunning\"}\n")
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 5, "result": true}));
    }
}
