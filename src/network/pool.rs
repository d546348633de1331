// src/network/pool.rs

//! Mining pool client implementation
//!
//! Speaks a line-delimited JSON stratum dialect over TCP. This is the
//! production [`MiningEngine`]: it owns the pool connection, the worker
//! threads and the hash rate meter for one configuration.
use crate::config::{MinerConfig, MinerSettings};
use crate::miner::algorithm::{Algorithm, Keccak};
use crate::miner::engine::{EngineEvents, EngineFactory, MiningEngine};
use crate::miner::scheduler::{MiningJob, SHARE_QUEUE, Scheduler, Share};
use crate::stats::{DEFAULT_SAMPLE_INTERVAL, HashRateMeter};
use crate::utils::error::MinerError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

/// Longest line accepted from a pool
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long a TCP connect to the pool may take
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request id of the subscribe call
const SUBSCRIBE_ID: u64 = 1;
/// Request id of the authorize call
const AUTHORIZE_ID: u64 = 2;
/// First request id used for share submissions
const FIRST_SUBMIT_ID: u64 = 100;

type PoolConnection = Framed<TcpStream, LinesCodec>;

/// Client for communicating with a mining pool
///
/// Handles all pool protocol interactions including:
/// - Connection management
/// - Job distribution to workers
/// - Share submission and acceptance accounting
pub struct PoolClient {
    /// Miner identity sent to the pool
    miner: MinerSettings,
    /// Job distribution to worker threads
    scheduler: Scheduler,
    /// Hash counting for hash rate samples
    meter: HashRateMeter,
    /// Telemetry senders owned by the orchestrator
    events: EngineEvents,
    /// Connection between `connect` and `listen`
    connection: Mutex<Option<PoolConnection>>,
    /// Address of the connected pool
    remote: StdMutex<Option<SocketAddr>>,
    /// Shares from the workers of the current run
    shares: StdMutex<Option<Receiver<Share>>>,
    /// Shares accepted by the pool
    accepted: AtomicU64,
    /// Next submission request id
    next_id: AtomicU64,
}

impl PoolClient {
    /// Creates a new PoolClient instance
    ///
    /// # Arguments
    /// * `miner` - Miner identity and worker settings
    /// * `algorithm` - Hash function for the workers
    /// * `sample_interval` - Interval between hash rate samples
    /// * `events` - Telemetry senders
    pub fn new(
        miner: MinerSettings,
        algorithm: Arc<dyn Algorithm>,
        sample_interval: Duration,
        events: EngineEvents,
    ) -> Self {
        let scheduler = Scheduler::new(algorithm, miner.batch_size);
        PoolClient {
            miner,
            scheduler,
            meter: HashRateMeter::new(sample_interval),
            events,
            connection: Mutex::new(None),
            remote: StdMutex::new(None),
            shares: StdMutex::new(None),
            accepted: AtomicU64::new(0),
            next_id: AtomicU64::new(FIRST_SUBMIT_ID),
        }
    }

    /// Sends the subscribe and authorize requests
    async fn login(&self) -> Result<(), MinerError> {
        let mut guard = self.connection.lock().await;
        let conn = guard
            .as_mut()
            .ok_or(MinerError::RunError("Not connected".into()))?;

        send(
            conn,
            json!({
                "id": SUBSCRIBE_ID,
                "method": "mining.subscribe",
                "params": [format!("pool_miner-rs/{}", env!("CARGO_PKG_VERSION"))]
            }),
        )
        .await?;
        send(
            conn,
            json!({
                "id": AUTHORIZE_ID,
                "method": "mining.authorize",
                "params": [self.miner.username, self.miner.miner_id]
            }),
        )
        .await
    }

    /// Main event loop for pool communication
    ///
    /// Handles:
    /// - Receiving jobs and responses from the pool
    /// - Submitting shares found by the workers
    async fn run(
        &self,
        conn: &mut PoolConnection,
        shares: &mut Receiver<Share>,
        cancel: &CancellationToken,
    ) -> Result<(), MinerError> {
        let mut pending = HashSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = conn.next() => {
                    match msg {
                        Some(Ok(line)) => self.handle_message(&line, &mut pending)?,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(MinerError::RunError("Pool closed the connection".into())),
                    }
                }
                Some(share) = shares.recv() => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    pending.insert(id);
                    self.submit_share(conn, id, &share).await?;
                }
            }
        }
    }

    /// Handles one line received from the pool
    ///
    /// # Errors
    /// Returns `MinerError` if:
    /// - Message parsing fails
    /// - Job handling fails
    /// - The pool rejects the handshake
    fn handle_message(&self, message: &str, pending: &mut HashSet<u64>) -> Result<(), MinerError> {
        let json: Value = serde_json::from_str(message)?;

        if let Some(method) = json.get("method").and_then(|m| m.as_str()) {
            match method {
                "mining.notify" => self.handle_job(&json)?,
                _ => log::warn!("Unknown method received: {}", method),
            }
            return Ok(());
        }

        let Some(id) = json.get("id").and_then(|id| id.as_u64()) else {
            return Err(MinerError::ProtocolError(format!("Unexpected message: {}", message)));
        };
        let error = json.get("error").filter(|e| !e.is_null());

        if pending.remove(&id) {
            if json.get("result").and_then(|r| r.as_bool()) == Some(true) {
                let accepted = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("Share {} accepted ({} total)", id, accepted);
                self.events.emit_submission(accepted);
            } else {
                log::warn!("Share {} rejected: {}", id, error.unwrap_or(&Value::Null));
            }
        } else if let Some(error) = error {
            if id == SUBSCRIBE_ID || id == AUTHORIZE_ID {
                return Err(MinerError::ProtocolError(format!("Pool rejected handshake: {}", error)));
            }
            log::warn!("Pool error for request {}: {}", id, error);
        }
        Ok(())
    }

    /// Processes incoming mining job notifications
    ///
    /// # Errors
    /// Returns `MinerError` if:
    /// - Required fields are missing
    /// - Hex decoding fails
    fn handle_job(&self, json: &Value) -> Result<(), MinerError> {
        let params = json["params"]
            .as_object()
            .ok_or_else(|| MinerError::ProtocolError("Missing params object".to_string()))?;
        let field = |name: &str| {
            params
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| MinerError::ProtocolError(format!("Missing {}", name)))
        };

        let job = MiningJob {
            job_id: field("job_id")?.to_string(),
            blob: hex::decode(field("blob")?)?,
            target: hex::decode(field("target")?)?,
        };

        self.scheduler.update_job(job);
        Ok(())
    }

    /// Submits a completed share to the mining pool
    async fn submit_share(&self, conn: &mut PoolConnection, id: u64, share: &Share) -> Result<(), MinerError> {
        let message = json!({
            "id": id,
            "method": "mining.submit",
            "params": [
                self.miner.miner_id,
                share.job_id,
                format!("{:016x}", share.nonce),
                hex::encode(share.result)
            ]
        });

        send(conn, message).await
    }
}

#[async_trait]
impl MiningEngine for PoolClient {
    fn start_workers(&self, cancel: CancellationToken) {
        let (share_tx, share_rx) = mpsc::channel(SHARE_QUEUE);
        *self.shares.lock().unwrap_or_else(|e| e.into_inner()) = Some(share_rx);

        self.scheduler
            .start_mining(self.miner.threads, cancel.clone(), share_tx, self.meter.hash_sender());
        self.meter.start_sampling(self.events.clone(), cancel);
    }

    async fn connect(&self, pool_address: &str) -> Result<(), MinerError> {
        let stream =
            connect_within(CONNECT_TIMEOUT, pool_address, TcpStream::connect(pool_address)).await?;
        let peer = stream.peer_addr()?;
        log::info!("Connected to pool {}", peer);

        *self.remote.lock().unwrap_or_else(|e| e.into_inner()) = Some(peer);
        *self.connection.lock().await = Some(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        ));
        Ok(())
    }

    async fn handshake(&self) -> Result<(), MinerError> {
        self.login().await
    }

    async fn listen(&self, cancel: CancellationToken) -> Result<(), MinerError> {
        let mut conn = self
            .connection
            .lock()
            .await
            .take()
            .ok_or(MinerError::RunError("Not connected".into()))?;
        let mut shares = self
            .shares
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(MinerError::RunError("Workers not started".into()))?;

        let result = self.run(&mut conn, &mut shares, &cancel).await;

        self.scheduler.clear_job();
        *self.remote.lock().unwrap_or_else(|e| e.into_inner()) = None;
        result.map_err(|e| match e {
            MinerError::RunError(_) => e,
            other => MinerError::RunError(other.to_string()),
        })
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|addr| addr.to_string())
    }

    fn total_successes(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

/// Bounds a connect attempt, mapping both failure and timeout to `ConnectError`
async fn connect_within<T>(
    limit: Duration,
    pool_address: &str,
    attempt: impl Future<Output = io::Result<T>>,
) -> Result<T, MinerError> {
    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(MinerError::ConnectError(format!(
            "Connection to '{}' failed: {}",
            pool_address, e
        ))),
        Err(_) => Err(MinerError::ConnectError(format!(
            "Connection to '{}' timed out after {:?}",
            pool_address, limit
        ))),
    }
}

/// Internal helper for sending JSON messages as one line
async fn send(conn: &mut PoolConnection, value: Value) -> Result<(), MinerError> {
    conn.send(value.to_string()).await?;
    Ok(())
}

/// Builds [`PoolClient`] engines
pub struct PoolClientFactory {
    algorithm: Arc<dyn Algorithm>,
    sample_interval: Duration,
}

impl PoolClientFactory {
    /// Factory with a custom hash function and sampling interval
    pub fn new(algorithm: Arc<dyn Algorithm>, sample_interval: Duration) -> Self {
        PoolClientFactory {
            algorithm,
            sample_interval,
        }
    }
}

impl Default for PoolClientFactory {
    fn default() -> Self {
        Self::new(Arc::new(Keccak), DEFAULT_SAMPLE_INTERVAL)
    }
}

impl EngineFactory for PoolClientFactory {
    fn create(
        &self,
        config: &MinerConfig,
        events: EngineEvents,
    ) -> Result<Arc<dyn MiningEngine>, MinerError> {
        if config.miner.threads == 0 || config.miner.batch_size == 0 {
            return Err(MinerError::EngineInitError(
                "Worker threads and batch size must be positive".into(),
            ));
        }
        log::debug!(
            "Creating pool client for {} ({} threads)",
            config.miner.miner_id,
            config.miner.threads
        );
        Ok(Arc::new(PoolClient::new(
            config.miner.clone(),
            self.algorithm.clone(),
            self.sample_interval,
            events,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn config(threads: usize) -> MinerConfig {
        MinerConfig {
            miner: MinerSettings {
                username: "operator@example.com".into(),
                miner_id: "rig-1".into(),
                threads,
                batch_size: 4,
            },
            pool: PoolSettings {
                host: "127.0.0.1:1".into(),
            },
        }
    }

    fn events() -> (EngineEvents, mpsc::Receiver<f64>, mpsc::Receiver<u64>) {
        let (hash_tx, hash_rx) = mpsc::channel(64);
        let (sub_tx, sub_rx) = mpsc::channel(64);
        (EngineEvents::new(hash_tx, sub_tx), hash_rx, sub_rx)
    }

    /// Accepts one worker, answers the handshake, hands out an easy job and
    /// accepts every share.
    async fn fake_pool(listener: TcpListener) -> Result<Vec<String>, MinerError> {
        let (socket, _) = listener.accept().await?;
        let mut conn = Framed::new(socket, LinesCodec::new());
        let mut methods = Vec::new();

        for _ in 0..2 {
            let line = conn.next().await.unwrap()?;
            let request: Value = serde_json::from_str(&line)?;
            methods.push(request["method"].as_str().unwrap().to_string());
            conn.send(json!({"id": request["id"], "result": true, "error": null}).to_string())
                .await?;
        }
        conn.send(
            json!({
                "method": "mining.notify",
                "params": {"job_id": "j1", "blob": "00112233", "target": "ff".repeat(32)}
            })
            .to_string(),
        )
        .await?;

        while let Some(Ok(line)) = conn.next().await {
            let request: Value = serde_json::from_str(&line)?;
            assert_eq!(request["method"], "mining.submit");
            assert_eq!(request["params"][0], "rig-1");
            assert_eq!(request["params"][1], "j1");
            if conn
                .send(json!({"id": request["id"], "result": true, "error": null}).to_string())
                .await
                .is_err()
            {
                break;
            }
        }
        Ok(methods)
    }

    #[tokio::test]
    async fn mines_against_pool_and_counts_accepted_shares() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let pool = tokio::spawn(fake_pool(listener));

        let (events, _hash_rx, mut sub_rx) = events();
        let engine = PoolClientFactory::default().create(&config(1), events).unwrap();
        let cancel = CancellationToken::new();

        engine.start_workers(cancel.clone());
        engine.connect(&addr).await.unwrap();
        assert_eq!(engine.remote_addr(), Some(addr.clone()));
        engine.handshake().await.unwrap();

        let listening = {
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.listen(cancel).await })
        };

        let first = timeout(Duration::from_secs(10), sub_rx.recv()).await.unwrap();
        assert_eq!(first, Some(1));
        assert!(engine.total_successes() >= 1);

        cancel.cancel();
        assert!(listening.await.unwrap().is_ok());
        assert_eq!(engine.remote_addr(), None);

        let methods = pool.await.unwrap().unwrap();
        assert_eq!(methods, vec!["mining.subscribe", "mining.authorize"]);
    }

    #[tokio::test]
    async fn unreachable_pool_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (events, _hash_rx, _sub_rx) = events();
        let engine = PoolClientFactory::default().create(&config(1), events).unwrap();
        let err = engine.connect(&addr).await.unwrap_err();
        assert!(matches!(err, MinerError::ConnectError(_)));
    }

    #[tokio::test]
    async fn stalled_connect_times_out() {
        let pending = std::future::pending::<std::io::Result<()>>();
        let err = connect_within(Duration::from_millis(20), "pool.test:3333", pending)
            .await
            .unwrap_err();
        match err {
            MinerError::ConnectError(message) => {
                assert!(message.contains("timed out"), "{}", message);
                assert!(message.contains("pool.test:3333"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn pool_hangup_is_a_run_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let pool = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let (events, _hash_rx, _sub_rx) = events();
        let engine = PoolClientFactory::default().create(&config(1), events).unwrap();
        let cancel = CancellationToken::new();
        engine.start_workers(cancel.clone());
        engine.connect(&addr).await.unwrap();
        pool.await.unwrap();

        let err = engine.listen(cancel.clone()).await.unwrap_err();
        assert!(matches!(err, MinerError::RunError(_)));
        cancel.cancel();
    }

    #[test]
    fn rejects_zero_threads() {
        let (events, _hash_rx, _sub_rx) = events();
        let result = PoolClientFactory::default().create(&config(0), events);
        assert!(matches!(result, Err(MinerError::EngineInitError(_))));
    }
}
