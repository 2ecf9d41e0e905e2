//! Production subsystem factory.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::agent::local::LocalAgent;
use crate::agent::subsystem::{ClusterAgent, Subsystem, SubsystemError, SubsystemFactory};
use crate::config::Config;
use crate::http::HttpServer;
use crate::net::RpcServer;
use crate::observability::Telemetry;

#[derive(Default)]
struct Started {
    agent: Option<Arc<LocalAgent>>,
    rpc_addr: Option<SocketAddr>,
    http_addr: Option<SocketAddr>,
}

/// Starts the in-process agent, the RPC server and the HTTP API.
///
/// The RPC and HTTP servers serve the agent started by [`start_agent`],
/// so it must be called first.
///
/// [`start_agent`]: SubsystemFactory::start_agent
#[derive(Default)]
pub struct LocalSubsystems {
    started: Mutex<Started>,
}

impl LocalSubsystems {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Started> {
        match self.started.lock() {
            Ok(started) => started,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn agent(&self) -> Result<Arc<LocalAgent>, SubsystemError> {
        self.lock()
            .agent
            .clone()
            .ok_or_else(|| SubsystemError::Failed("agent has not been started".to_string()))
    }

    /// Address the RPC server is bound to, once started.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.lock().rpc_addr
    }

    /// Address the HTTP API is bound to, once started.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.lock().http_addr
    }
}

#[async_trait]
impl SubsystemFactory for LocalSubsystems {
    async fn start_agent(
        &self,
        config: Arc<Config>,
        telemetry: Telemetry,
    ) -> Result<Arc<dyn ClusterAgent>, SubsystemError> {
        let agent = Arc::new(LocalAgent::new(config, telemetry));
        self.lock().agent = Some(agent.clone());
        let agent: Arc<dyn ClusterAgent> = agent;
        Ok(agent)
    }

    async fn start_rpc(
        &self,
        config: Arc<Config>,
        telemetry: Telemetry,
    ) -> Result<Option<Arc<dyn Subsystem>>, SubsystemError> {
        let Some(addr) = config.rpc_addr() else {
            tracing::info!("RPC server disabled");
            return Ok(None);
        };
        let server = RpcServer::start(&addr, self.agent()?, telemetry).await?;
        self.lock().rpc_addr = Some(server.local_addr());
        let server: Arc<dyn Subsystem> = Arc::new(server);
        Ok(Some(server))
    }

    async fn start_http(
        &self,
        config: Arc<Config>,
        telemetry: Telemetry,
    ) -> Result<Option<Arc<dyn Subsystem>>, SubsystemError> {
        let Some(addr) = config.http_addr() else {
            tracing::info!("HTTP API disabled");
            return Ok(None);
        };
        let server = HttpServer::start(&addr, self.agent()?, telemetry).await?;
        self.lock().http_addr = Some(server.local_addr());
        let server: Arc<dyn Subsystem> = Arc::new(server);
        Ok(Some(server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::inmem::InmemSink;
    use crate::observability::metrics::{INMEM_INTERVAL, INMEM_RETAIN};

    fn telemetry() -> Telemetry {
        Telemetry::inmem_only(Arc::new(InmemSink::new(INMEM_INTERVAL, INMEM_RETAIN)))
    }

    fn config(http: i32, server: i32) -> Arc<Config> {
        let mut config = Config {
            node_name: "alpha".into(),
            bind_addr: "127.0.0.1".into(),
            ..Config::defaults()
        };
        config.ports.http = http;
        config.ports.server = server;
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_servers_require_agent() {
        let factory = LocalSubsystems::new();
        let err = factory.start_rpc(config(0, 0), telemetry()).await.err().unwrap();
        assert!(matches!(err, SubsystemError::Failed(_)));
    }

    #[tokio::test]
    async fn test_negative_ports_disable_servers() {
        let factory = LocalSubsystems::new();
        let config = config(-1, -1);
        factory.start_agent(config.clone(), telemetry()).await.unwrap();

        assert!(factory.start_rpc(config.clone(), telemetry()).await.unwrap().is_none());
        assert!(factory.start_http(config, telemetry()).await.unwrap().is_none());
        assert!(factory.http_addr().is_none());
    }

    #[tokio::test]
    async fn test_ephemeral_ports() {
        let factory = LocalSubsystems::new();
        let config = config(0, 0);
        let agent = factory.start_agent(config.clone(), telemetry()).await.unwrap();
        let rpc = factory.start_rpc(config.clone(), telemetry()).await.unwrap().unwrap();
        let http = factory.start_http(config, telemetry()).await.unwrap().unwrap();

        assert_ne!(factory.rpc_addr().unwrap().port(), 0);
        assert_ne!(factory.http_addr().unwrap().port(), 0);

        http.shutdown().await.unwrap();
        rpc.shutdown().await.unwrap();
        agent.shutdown().await.unwrap();
    }
}
