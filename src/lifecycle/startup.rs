//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared HTTP client
//! - Construct breakers, prober, session store, executor and facade once
//! - Start the background prober loop on request

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::api::CambioApi;
use crate::config::ClientConfig;
use crate::health::EndpointProber;
use crate::lifecycle::shutdown::Shutdown;
use crate::resilience::{CircuitBreakerRegistry, ResilientExecutor};
use crate::session::{FileStorage, SessionStorage, SessionStore};

const USER_AGENT: &str = concat!("cambio-client/", env!("CARGO_PKG_VERSION"));

/// Idle pooled connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Every process-wide service, built once and shared.
#[derive(Debug, Clone)]
pub struct Services {
    pub config: Arc<ClientConfig>,
    pub breakers: CircuitBreakerRegistry,
    pub prober: Arc<EndpointProber>,
    pub session: Arc<SessionStore>,
    pub executor: Arc<ResilientExecutor>,
    pub api: CambioApi,
    pub shutdown: Shutdown,
}

impl Services {
    /// Build services with the session persisted under the configured directory.
    pub fn bootstrap(config: ClientConfig) -> Result<Self, StartupError> {
        let storage = Arc::new(FileStorage::new(config.session.storage_dir.clone()));
        Self::with_storage(config, storage)
    }

    /// Build services over an explicit session storage.
    pub fn with_storage(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()?;
        Ok(Self::with_client(config, storage, client))
    }

    /// Build services around a caller-supplied HTTP client.
    pub fn with_client(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        client: reqwest::Client,
    ) -> Self {
        let breakers = CircuitBreakerRegistry::new(&config.breaker);
        let prober = Arc::new(EndpointProber::new(
            &config.endpoints.urls,
            config.probe.clone(),
            breakers.clone(),
            client.clone(),
        ));
        let session = Arc::new(SessionStore::open(storage, &config.session));
        let executor = Arc::new(ResilientExecutor::new(
            client,
            prober.clone(),
            breakers.clone(),
            session.clone(),
            config.retries.clone(),
            &config.timeouts,
        ));
        let api = CambioApi::new(executor.clone(), config.timeouts.export());

        tracing::info!(
            endpoints = config.endpoints.urls.len(),
            failure_threshold = config.breaker.failure_threshold,
            max_retries = config.retries.max_retries,
            authenticated = session.is_authenticated(),
            "Services initialized"
        );

        Self {
            config: Arc::new(config),
            breakers,
            prober,
            session,
            executor,
            api,
            shutdown: Shutdown::new(),
        }
    }

    /// Run the prober loop in the background until shutdown.
    pub fn spawn_prober(&self) -> JoinHandle<()> {
        let prober = self.prober.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(prober.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStorage;

    #[tokio::test]
    async fn test_services_share_one_registry() {
        let services = Services::with_storage(ClientConfig::default(), Arc::new(MemoryStorage::new())).unwrap();
        services.breakers.record_failure("http://shared.test");
        assert_eq!(services.executor.breakers().consecutive_failures("http://shared.test"), 1);
        assert!(Arc::ptr_eq(services.api.session(), &services.session));
        assert!(!services.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_prober_stops_on_shutdown() {
        let mut config = ClientConfig::default();
        config.endpoints.urls = vec!["http://127.0.0.1:9".to_string()];
        config.probe.timeout_ms = 50;
        let services = Services::with_storage(config, Arc::new(MemoryStorage::new())).unwrap();

        let handle = services.spawn_prober();
        tokio::time::sleep(Duration::from_millis(20)).await;
        services.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("prober exits")
            .unwrap();
    }
}
