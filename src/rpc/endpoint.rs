// src/rpc/endpoint.rs
use crate::rpc::hub::{NotificationHub, SubscriptionSink};
use crate::rpc::messages::{ErrorObject, INVALID_PARAMS, METHOD_NOT_FOUND};
use crate::service::orchestrator::MiningOrchestrator;
use crate::types::StreamKind;
use crate::utils::error::MinerError;
use serde_json::Value;
use std::sync::Arc;

/// Namespace prefix of every control method
pub const NAMESPACE: &str = "mining";

/// Method table of the control socket
///
/// Plain delegation to the orchestrator and the notification hub; the
/// endpoint keeps no state of its own.
pub struct ControlEndpoint {
    orchestrator: Arc<MiningOrchestrator>,
    hub: Arc<NotificationHub>,
}

impl ControlEndpoint {
    /// Creates the endpoint
    pub fn new(orchestrator: Arc<MiningOrchestrator>, hub: Arc<NotificationHub>) -> Self {
        ControlEndpoint { orchestrator, hub }
    }

    /// Executes one call on behalf of the connection owning `sink`
    pub fn call(&self, method: &str, params: &Value, sink: &SubscriptionSink) -> Result<Value, ErrorObject> {
        log::trace!("ControlEndpoint::call {}", method);
        let not_found = || ErrorObject::new(METHOD_NOT_FOUND, format!("The method {} does not exist", method));
        let name = method
            .strip_prefix(NAMESPACE)
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(not_found)?;

        match name {
            "getStatus" => Ok(serde_json::to_value(self.orchestrator.get_status()).map_err(MinerError::from)?),
            "isRunning" => Ok(Value::Bool(self.orchestrator.is_running())),
            "start" => {
                self.orchestrator.start();
                Ok(Value::Null)
            }
            "stop" => {
                self.orchestrator.stop();
                Ok(Value::Null)
            }
            "unsubscribe" => {
                let id = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| ErrorObject::new(INVALID_PARAMS, "Expected a subscription id"))?;
                Ok(Value::Bool(self.hub.unsubscribe(id)))
            }
            other => {
                let kind = StreamKind::ALL
                    .into_iter()
                    .find(|kind| kind.subscription_method() == other)
                    .ok_or_else(not_found)?;
                let handle = self.hub.subscribe(kind, sink)?;
                Ok(Value::String(handle.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::messages::SERVER_ERROR;
    use crate::testing::{ScriptedEngineFactory, StaticConfigSource};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn endpoint() -> (ControlEndpoint, Arc<NotificationHub>, SubscriptionSink) {
        let orchestrator = Arc::new(MiningOrchestrator::new(
            Arc::new(StaticConfigSource::new(None)),
            Arc::new(ScriptedEngineFactory::default()),
        ));
        let hub = Arc::new(NotificationHub::new(orchestrator.clone()));
        let (tx, _rx) = mpsc::channel(4);
        let sink = SubscriptionSink::new(tx, CancellationToken::new());
        (ControlEndpoint::new(orchestrator, hub.clone()), hub, sink)
    }

    #[tokio::test]
    async fn start_stop_and_queries() {
        let (endpoint, _hub, sink) = endpoint();
        let none = Value::Null;

        assert_eq!(endpoint.call("mining_isRunning", &none, &sink), Ok(json!(true)));
        assert_eq!(endpoint.call("mining_stop", &none, &sink), Ok(Value::Null));
        assert_eq!(endpoint.call("mining_isRunning", &none, &sink), Ok(json!(false)));
        assert_eq!(endpoint.call("mining_start", &none, &sink), Ok(Value::Null));

        let status = endpoint.call("mining_getStatus", &none, &sink).unwrap();
        assert_eq!(
            status,
            json!({"isRunning": true, "isConnected": false, "totalBlocksSubmitted": 0})
        );
    }

    #[tokio::test]
    async fn subscriptions_return_hex_ids() {
        let (endpoint, hub, sink) = endpoint();
        let id = endpoint
            .call("mining_statusSubscription", &Value::Null, &sink)
            .unwrap();
        let id = id.as_str().unwrap().to_string();
        assert!(id.starts_with("0x"));
        assert_eq!(hub.subscriber_count(StreamKind::Status), 1);

        assert_eq!(
            endpoint.call("mining_unsubscribe", &json!([id]), &sink),
            Ok(json!(true))
        );
        assert_eq!(
            endpoint.call("mining_unsubscribe", &json!(["0xdead"]), &sink),
            Ok(json!(false))
        );
        assert_eq!(hub.subscriber_count(StreamKind::Status), 0);
    }

    #[tokio::test]
    async fn unknown_methods_and_bad_params() {
        let (endpoint, _hub, sink) = endpoint();
        for method in ["mining_isPaused", "eth_blockNumber", "mining", "mining_status"] {
            let err = endpoint.call(method, &Value::Null, &sink).unwrap_err();
            assert_eq!(err.code, METHOD_NOT_FOUND, "{}", method);
        }
        let err = endpoint.call("mining_unsubscribe", &json!([]), &sink).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_ne!(err.code, SERVER_ERROR);
    }
}
