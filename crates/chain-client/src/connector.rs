//! Supervised RPC connection to one chain.
//!
//! A connector owns a subxt client behind a supervisor task. The supervisor
//! follows runtime upgrades, keeps a finalized-head subscription open as a
//! liveness probe and reconnects with exponential backoff when either fails.
//! Readiness is published on a watch channel so callers can block until the
//! connection is back instead of failing every query during an outage.

use futures::StreamExt;
use noter_reconciler::{ChainError, ChainResult};
use std::sync::Arc;
use std::time::Duration;
use subxt::{OnlineClient, PolkadotConfig};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Limit on each connection attempt.
    pub connect_timeout: Duration,
    /// Limit on waiting for a lost connection to come back.
    pub ready_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(120),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

type ClientSlot = Arc<RwLock<Option<OnlineClient<PolkadotConfig>>>>;

/// Supervised connection to one chain endpoint.
pub struct ChainConnector {
    label: String,
    endpoint: String,
    config: ConnectorConfig,
    client: ClientSlot,
    ready: watch::Receiver<bool>,
    supervisor: JoinHandle<()>,
}

impl ChainConnector {
    /// Connect to `endpoint` and start supervising the connection.
    ///
    /// Fails if the first connection is not established within
    /// `connect_timeout`.
    pub async fn connect(
        label: impl Into<String>,
        endpoint: impl Into<String>,
        config: ConnectorConfig,
    ) -> ChainResult<Arc<Self>> {
        let label = label.into();
        let endpoint = endpoint.into();

        info!(chain = %label, endpoint = %endpoint, "Connecting to chain");
        let client = open(&endpoint, config.connect_timeout).await?;
        info!(
            chain = %label,
            spec_version = client.runtime_version().spec_version,
            "Connected to chain"
        );

        let slot: ClientSlot = Arc::new(RwLock::new(Some(client.clone())));
        let (ready_tx, ready) = watch::channel(true);
        let supervisor = tokio::spawn(supervise(
            label.clone(),
            endpoint.clone(),
            config.clone(),
            slot.clone(),
            ready_tx,
            client,
        ));

        Ok(Arc::new(Self {
            label,
            endpoint,
            config,
            client: slot,
            ready,
            supervisor,
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the connection is currently up.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolve once the connection is up.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.clone();
        // An error means the supervisor is gone; nothing left to wait for.
        let _ = ready.wait_for(|up| *up).await;
    }

    /// A live client, waiting up to `ready_timeout` for a reconnect.
    pub async fn client(&self) -> ChainResult<OnlineClient<PolkadotConfig>> {
        if tokio::time::timeout(self.config.ready_timeout, self.wait_ready())
            .await
            .is_err()
        {
            return Err(ChainError::NotReady(self.label.clone()));
        }

        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| ChainError::NotReady(self.label.clone()))
    }
}

impl Drop for ChainConnector {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

async fn open(endpoint: &str, timeout: Duration) -> ChainResult<OnlineClient<PolkadotConfig>> {
    match tokio::time::timeout(timeout, OnlineClient::<PolkadotConfig>::from_url(endpoint)).await {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => Err(ChainError::Connection {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(ChainError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!("timed out after {}s", timeout.as_secs()),
        }),
    }
}

pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

async fn supervise(
    label: String,
    endpoint: String,
    config: ConnectorConfig,
    slot: ClientSlot,
    ready_tx: watch::Sender<bool>,
    mut client: OnlineClient<PolkadotConfig>,
) {
    loop {
        let reason = serve(&client).await;

        ready_tx.send_replace(false);
        *slot.write().await = None;
        warn!(chain = %label, reason = %reason, "Connection lost, reconnecting");

        let mut backoff = config.initial_backoff;
        let mut attempt: u32 = 0;
        client = loop {
            tokio::time::sleep(backoff).await;
            attempt += 1;
            match open(&endpoint, config.connect_timeout).await {
                Ok(client) => break client,
                Err(e) => {
                    warn!(
                        chain = %label,
                        attempt,
                        error = %e,
                        retry_in_secs = next_backoff(backoff, config.max_backoff).as_secs(),
                        "Reconnect failed"
                    );
                    backoff = next_backoff(backoff, config.max_backoff);
                }
            }
        };

        *slot.write().await = Some(client.clone());
        ready_tx.send_replace(true);
        info!(chain = %label, attempt, "Reconnected");
    }
}

/// Keep the runtime metadata current and watch finalized heads until either
/// fails. Returns the failure reason.
async fn serve(client: &OnlineClient<PolkadotConfig>) -> String {
    let updater = client.updater();
    let mut heads = match client.blocks().subscribe_finalized().await {
        Ok(heads) => heads,
        Err(e) => return e.to_string(),
    };

    let liveness = async move {
        while let Some(head) = heads.next().await {
            match head {
                Ok(block) => debug!(number = block.number(), "Finalized head"),
                Err(e) => return e.to_string(),
            }
        }
        "finalized head subscription ended".to_string()
    };

    tokio::select! {
        result = updater.perform_runtime_updates() => match result {
            Ok(()) => "runtime update subscription ended".to_string(),
            Err(e) => e.to_string(),
        },
        reason = liveness => reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let max = Duration::from_secs(30);
        let mut backoff = Duration::from_secs(1);
        let mut seen = vec![backoff.as_secs()];
        for _ in 0..6 {
            backoff = next_backoff(backoff, max);
            seen.push(backoff.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails() {
        let config = ConnectorConfig {
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let result = ChainConnector::connect("relay", "ws://127.0.0.1:1", config).await;
        assert!(matches!(result, Err(ChainError::Connection { .. })));
    }
}
