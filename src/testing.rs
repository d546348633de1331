// src/testing.rs
//! Scripted collaborators for unit tests

use crate::config::{ConfigSource, MinerConfig, MinerSettings, PoolSettings};
use crate::miner::engine::{EngineEvents, EngineFactory, MiningEngine};
use crate::utils::error::MinerError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub(crate) fn sample_config() -> MinerConfig {
    MinerConfig {
        miner: MinerSettings {
            username: "operator@example.com".into(),
            miner_id: "rig-1".into(),
            threads: 1,
            batch_size: 10,
        },
        pool: PoolSettings {
            host: "pool.test:4444".into(),
        },
    }
}

/// Config source returning whatever the test put in it
pub(crate) struct StaticConfigSource {
    config: Mutex<Option<MinerConfig>>,
    loads: AtomicUsize,
}

impl StaticConfigSource {
    pub(crate) fn new(config: Option<MinerConfig>) -> Self {
        StaticConfigSource {
            config: Mutex::new(config),
            loads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set(&self, config: Option<MinerConfig>) {
        *self.config.lock().unwrap() = config;
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<MinerConfig, MinerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.config
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| MinerError::ConfigError("Configuration file could not be read".into()))
    }
}

/// Outcomes shared by a scripted factory and every engine it built
#[derive(Default)]
pub(crate) struct EngineScript {
    fail_init: AtomicBool,
    fail_connect: AtomicBool,
    fail_listen: AtomicBool,
    successes_per_run: AtomicU64,
    created: AtomicUsize,
    connects: AtomicUsize,
    connections: Mutex<Vec<CancellationToken>>,
}

impl EngineScript {
    pub(crate) fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes `listen` fail immediately instead of waiting for cancellation
    pub(crate) fn set_fail_listen(&self, fail: bool) {
        self.fail_listen.store(fail, Ordering::SeqCst);
    }

    /// Shares "accepted" on every successful connect
    pub(crate) fn set_successes_per_run(&self, successes: u64) {
        self.successes_per_run.store(successes, Ordering::SeqCst);
    }

    pub(crate) fn engines_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Simulates the pool dropping every open connection
    pub(crate) fn disconnect_all(&self) {
        for connection in self.connections.lock().unwrap().drain(..) {
            connection.cancel();
        }
    }
}

#[derive(Default)]
pub(crate) struct ScriptedEngineFactory {
    script: Arc<EngineScript>,
}

impl ScriptedEngineFactory {
    pub(crate) fn script(&self) -> Arc<EngineScript> {
        self.script.clone()
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(
        &self,
        config: &MinerConfig,
        _events: EngineEvents,
    ) -> Result<Arc<dyn MiningEngine>, MinerError> {
        if self.script.fail_init.load(Ordering::SeqCst) {
            return Err(MinerError::EngineInitError("scripted init failure".into()));
        }
        self.script.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            script: self.script.clone(),
            pool_address: config.pool_address().to_string(),
            successes: AtomicU64::new(0),
            connection: Mutex::new(None),
        }))
    }
}

pub(crate) struct ScriptedEngine {
    script: Arc<EngineScript>,
    pool_address: String,
    successes: AtomicU64,
    connection: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl MiningEngine for ScriptedEngine {
    fn start_workers(&self, _cancel: CancellationToken) {}

    async fn connect(&self, _pool_address: &str) -> Result<(), MinerError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_connect.load(Ordering::SeqCst) {
            return Err(MinerError::ConnectError("scripted connect failure".into()));
        }
        let dropped = CancellationToken::new();
        self.script.connections.lock().unwrap().push(dropped.clone());
        *self.connection.lock().unwrap() = Some(dropped);
        self.successes
            .fetch_add(self.script.successes_per_run.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }

    async fn handshake(&self) -> Result<(), MinerError> {
        Ok(())
    }

    async fn listen(&self, cancel: CancellationToken) -> Result<(), MinerError> {
        let dropped = self.connection.lock().unwrap().take().unwrap_or_default();
        if self.script.fail_listen.load(Ordering::SeqCst) {
            return Err(MinerError::RunError("scripted network fault".into()));
        }
        tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            _ = dropped.cancelled() => Err(MinerError::RunError("connection dropped".into())),
        }
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.pool_address.clone())
    }

    fn total_successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }
}
