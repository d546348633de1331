// src/rpc/client.rs
use crate::rpc::messages::{Request, ServerMessage, SubscriptionParams};
use crate::service::status::MiningStatus;
use crate::types::StreamKind;
use crate::utils::error::MinerError;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::Path;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};

/// Client side of the control socket
///
/// Calls are answered in order; notifications that arrive while waiting
/// for a response are buffered for [`next_notification`](Self::next_notification).
pub struct RpcClient {
    conn: Framed<UnixStream, LinesCodec>,
    next_id: u64,
    pending: VecDeque<SubscriptionParams>,
}

impl RpcClient {
    /// Connects to a running service
    ///
    /// # Errors
    /// `MinerError::ConnectError` if nothing listens on `path`.
    pub async fn connect(path: &Path) -> Result<Self, MinerError> {
        let stream = UnixStream::connect(path).await.map_err(|e| {
            MinerError::ConnectError(format!("Cannot reach the service at {}: {}", path.display(), e))
        })?;
        Ok(RpcClient {
            conn: Framed::new(stream, LinesCodec::new()),
            next_id: 1,
            pending: VecDeque::new(),
        })
    }

    /// Performs one call and waits for its response
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, MinerError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = Request::new(id, method, params);
        self.conn.send(serde_json::to_string(&request)?).await?;

        loop {
            match self.read().await? {
                Some(ServerMessage::Notification(n)) => self.pending.push_back(n.params),
                Some(ServerMessage::Response(response)) if response.id == json!(id) => {
                    return response.into_result();
                }
                Some(ServerMessage::Response(response)) => {
                    log::debug!("Ignoring response to unknown request {}", response.id);
                }
                None => {
                    return Err(MinerError::ProtocolError(
                        "Service closed the connection".into(),
                    ));
                }
            }
        }
    }

    /// Current status snapshot
    pub async fn get_status(&mut self) -> Result<MiningStatus, MinerError> {
        let value = self.call("mining_getStatus", json!([])).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Whether mining is wanted
    pub async fn is_running(&mut self) -> Result<bool, MinerError> {
        let value = self.call("mining_isRunning", json!([])).await?;
        value
            .as_bool()
            .ok_or_else(|| MinerError::ProtocolError(format!("Expected a boolean, got {}", value)))
    }

    /// Asks the service to mine
    pub async fn start(&mut self) -> Result<(), MinerError> {
        self.call("mining_start", json!([])).await.map(|_| ())
    }

    /// Asks the service to stop mining
    pub async fn stop(&mut self) -> Result<(), MinerError> {
        self.call("mining_stop", json!([])).await.map(|_| ())
    }

    /// Subscribes to a stream and returns the subscription id
    pub async fn subscribe(&mut self, kind: StreamKind) -> Result<String, MinerError> {
        let method = format!("mining_{}", kind.subscription_method());
        let value = self.call(&method, json!([])).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MinerError::ProtocolError(format!("Expected a subscription id, got {}", value)))
    }

    /// Ends a subscription; `false` if the service did not know it
    pub async fn unsubscribe(&mut self, id: &str) -> Result<bool, MinerError> {
        let value = self.call("mining_unsubscribe", json!([id])).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Waits for the next subscription event
    ///
    /// Returns `None` once the service closes the connection.
    pub async fn next_notification(&mut self) -> Result<Option<SubscriptionParams>, MinerError> {
        if let Some(params) = self.pending.pop_front() {
            return Ok(Some(params));
        }
        loop {
            match self.read().await? {
                Some(ServerMessage::Notification(n)) => return Ok(Some(n.params)),
                Some(ServerMessage::Response(response)) => {
                    log::debug!("Ignoring unsolicited response {}", response.id);
                }
                None => return Ok(None),
            }
        }
    }

    async fn read(&mut self) -> Result<Option<ServerMessage>, MinerError> {
        match self.conn.next().await {
            Some(line) => Ok(Some(serde_json::from_str(&line?)?)),
            None => Ok(None),
        }
    }
}
