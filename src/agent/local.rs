//! The local cluster agent.
//!
//! # Responsibilities
//! - Keep the local catalog of services and checks
//! - Track cluster members, starting with this node
//! - Join other agents over their internal RPC port
//!
//! # Design Decisions
//! - A join attempt is one TCP round trip: `JOIN <node> <addr>` → `OK <node>`
//! - Per-address join failures are logged, only the success count is returned
//! - Registration after shutdown is rejected

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::agent::catalog::{LocalCatalog, Member, Membership, NodeService};
use crate::agent::subsystem::{ClusterAgent, RegistrationError, Subsystem, SubsystemError};
use crate::config::schema::DEFAULT_SERVER_PORT;
use crate::config::Config;
use crate::health::{CheckStatus, CheckType, HealthCheck};
use crate::observability::Telemetry;

/// Time allowed for one join round trip.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cluster agent backed by in-process state.
pub struct LocalAgent {
    config: Arc<Config>,
    telemetry: Telemetry,
    catalog: LocalCatalog,
    members: Membership,
    sync_started: AtomicBool,
    stopped: AtomicBool,
}

impl LocalAgent {
    /// Create the agent. The local node is a member from the start.
    pub fn new(config: Arc<Config>, telemetry: Telemetry) -> Self {
        let members = Membership::new();
        members.alive(&config.node_name, &self_addr(&config));

        Self {
            config,
            telemetry,
            catalog: LocalCatalog::new(),
            members,
            sync_started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn catalog(&self) -> &LocalCatalog {
        &self.catalog
    }

    pub fn members(&self) -> Vec<Member> {
        self.members.all()
    }

    /// This node's member record.
    pub fn local_member(&self) -> Option<Member> {
        self.members.get(&self.config.node_name)
    }

    /// Whether `start_sync` has been called.
    pub fn is_syncing(&self) -> bool {
        self.sync_started.load(Ordering::Acquire)
    }

    /// A peer asked to join through the RPC server.
    pub fn handle_join(&self, node: &str, addr: &str) {
        if self.members.alive(node, addr) {
            tracing::info!(node = %node, addr = %addr, "Member joined");
        }
    }

    async fn join_one(&self, addr: &str) -> Result<Member, std::io::Error> {
        let target = with_default_port(addr, self.default_port());
        let request = format!("JOIN {} {}\n", self.config.node_name, self_addr(&self.config));

        let exchange = async {
            let mut stream = TcpStream::connect(&target).await?;
            stream.write_all(request.as_bytes()).await?;

            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            Ok::<String, std::io::Error>(line)
        };

        let line = tokio::time::timeout(JOIN_TIMEOUT, exchange)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "join timed out"))??;

        match line.trim_end().strip_prefix("OK ") {
            Some(node) if !node.is_empty() => Ok(Member {
                name: node.to_string(),
                addr: target,
                status: crate::agent::catalog::MemberStatus::Alive,
            }),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected join reply: {:?}", line.trim_end()),
            )),
        }
    }

    fn default_port(&self) -> i32 {
        if self.config.ports.server > 0 {
            self.config.ports.server
        } else {
            DEFAULT_SERVER_PORT
        }
    }

    fn ensure_running(&self) -> Result<(), RegistrationError> {
        if self.stopped.load(Ordering::Acquire) {
            Err(RegistrationError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn update_gauges(&self) {
        self.telemetry
            .set_gauge("agent.catalog.services", self.catalog.service_count() as f64);
        self.telemetry
            .set_gauge("agent.catalog.checks", self.catalog.check_count() as f64);
    }
}

/// Address other members reach this node at.
fn self_addr(config: &Config) -> String {
    format!("{}:{}", config.advertise(), config.ports.server.max(0))
}

/// Append `port` when `addr` carries none.
fn with_default_port(addr: &str, port: i32) -> String {
    if addr.parse::<std::net::SocketAddr>().is_ok() {
        return addr.to_string();
    }
    // Bare IPv6 literals contain colons but no port
    if addr.parse::<std::net::Ipv6Addr>().is_ok() {
        return format!("[{}]:{}", addr, port);
    }
    match addr.rsplit_once(':') {
        Some((_, p)) if p.parse::<u16>().is_ok() => addr.to_string(),
        _ => format!("{}:{}", addr, port),
    }
}

#[async_trait]
impl Subsystem for LocalAgent {
    fn name(&self) -> &str {
        "agent"
    }

    async fn shutdown(&self) -> Result<(), SubsystemError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.members.left(&self.config.node_name);
        tracing::info!(node = %self.config.node_name, "Agent stopped");
        Ok(())
    }
}

#[async_trait]
impl ClusterAgent for LocalAgent {
    async fn join(&self, addrs: &[String]) -> usize {
        let mut joined = 0;
        for addr in addrs {
            match self.join_one(addr).await {
                Ok(member) => {
                    tracing::info!(addr = %addr, node = %member.name, "Joined agent");
                    self.members.alive(&member.name, &member.addr);
                    self.telemetry.incr_counter("agent.join.success", 1);
                    joined += 1;
                }
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "Failed to join agent");
                    self.telemetry.incr_counter("agent.join.failure", 1);
                }
            }
        }
        joined
    }

    async fn add_service(
        &self,
        service: NodeService,
        check: Option<CheckType>,
    ) -> Result<(), RegistrationError> {
        self.ensure_running()?;
        if service.service.is_empty() {
            return Err(RegistrationError::MissingServiceName);
        }
        if let Some(check) = &check {
            if !check.is_valid() {
                return Err(RegistrationError::InvalidCheckType);
            }
        }

        tracing::debug!(service = %service.service, id = %service.id, "Registering service");

        if check.is_some() {
            self.catalog.put_check(HealthCheck {
                node: self.config.node_name.clone(),
                check_id: format!("service:{}", service.id),
                name: format!("Service '{}' check", service.service),
                status: CheckStatus::Critical,
                notes: String::new(),
                output: String::new(),
                service_id: service.id.clone(),
                service_name: service.service.clone(),
            });
        }
        self.catalog.put_service(service);
        self.update_gauges();
        Ok(())
    }

    async fn add_check(&self, mut check: HealthCheck, check_type: CheckType) -> Result<(), RegistrationError> {
        self.ensure_running()?;
        if check.name.is_empty() {
            return Err(RegistrationError::MissingCheckName);
        }
        if !check_type.is_valid() {
            return Err(RegistrationError::InvalidCheckType);
        }
        if !check.service_id.is_empty() {
            let service = self
                .catalog
                .service(&check.service_id)
                .ok_or_else(|| RegistrationError::UnknownService(check.service_id.clone()))?;
            check.service_name = service.service;
        }

        tracing::debug!(check = %check.name, id = %check.check_id, "Registering check");
        self.catalog.put_check(check);
        self.update_gauges();
        Ok(())
    }

    fn start_sync(&self) {
        if self.sync_started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Sync already started");
            return;
        }
        tracing::info!(
            services = self.catalog.service_count(),
            checks = self.catalog.check_count(),
            "Local registration complete, starting sync"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::inmem::InmemSink;
    use crate::observability::metrics::{INMEM_INTERVAL, INMEM_RETAIN};
    use tokio::net::TcpListener;

    fn agent(node: &str) -> LocalAgent {
        let config = Config {
            node_name: node.into(),
            ..Config::defaults()
        };
        let telemetry = Telemetry::inmem_only(Arc::new(InmemSink::new(INMEM_INTERVAL, INMEM_RETAIN)));
        LocalAgent::new(Arc::new(config), telemetry)
    }

    fn check(name: &str) -> HealthCheck {
        HealthCheck {
            node: "a".into(),
            check_id: name.into(),
            name: name.into(),
            status: CheckStatus::Critical,
            notes: String::new(),
            output: String::new(),
            service_id: String::new(),
            service_name: String::new(),
        }
    }

    fn ttl() -> CheckType {
        CheckType { ttl_secs: 10, ..Default::default() }
    }

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("10.0.0.1", 8300), "10.0.0.1:8300");
        assert_eq!(with_default_port("10.0.0.1:9000", 8300), "10.0.0.1:9000");
        assert_eq!(with_default_port("node.local", 8300), "node.local:8300");
        assert_eq!(with_default_port("::1", 8300), "[::1]:8300");
        assert_eq!(with_default_port("[::1]:9000", 8300), "[::1]:9000");
    }

    #[tokio::test]
    async fn test_local_member_present() {
        let agent = agent("alpha");
        assert_eq!(agent.local_member().unwrap().name, "alpha");
        assert_eq!(agent.members().len(), 1);
    }

    #[tokio::test]
    async fn test_service_with_check() {
        let agent = agent("alpha");
        let service = NodeService { id: "web".into(), service: "web".into(), port: 80, ..Default::default() };
        agent.add_service(service, Some(ttl())).await.unwrap();

        let checks = agent.catalog().checks();
        let check = checks.get("service:web").unwrap();
        assert_eq!(check.service_id, "web");
        assert_eq!(check.status, CheckStatus::Critical);
    }

    #[tokio::test]
    async fn test_service_rejections() {
        let agent = agent("alpha");
        let err = agent.add_service(NodeService::default(), None).await.unwrap_err();
        assert_eq!(err, RegistrationError::MissingServiceName);

        let service = NodeService { id: "db".into(), service: "db".into(), ..Default::default() };
        let err = agent
            .add_service(service, Some(CheckType::default()))
            .await
            .unwrap_err();
        assert_eq!(err, RegistrationError::InvalidCheckType);
    }

    #[tokio::test]
    async fn test_check_bound_to_unknown_service() {
        let agent = agent("alpha");
        let mut c = check("cache");
        c.service_id = "redis".into();
        let err = agent.add_check(c, ttl()).await.unwrap_err();
        assert_eq!(err, RegistrationError::UnknownService("redis".into()));
    }

    #[tokio::test]
    async fn test_registration_after_shutdown() {
        let agent = agent("alpha");
        agent.shutdown().await.unwrap();
        agent.shutdown().await.unwrap();

        let err = agent.add_check(check("mem"), ttl()).await.unwrap_err();
        assert_eq!(err, RegistrationError::ShuttingDown);
    }

    #[tokio::test]
    async fn test_start_sync_once() {
        let agent = agent("alpha");
        assert!(!agent.is_syncing());
        agent.start_sync();
        agent.start_sync();
        assert!(agent.is_syncing());
    }

    #[tokio::test]
    async fn test_join_counts_reachable_peers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("JOIN alpha "));
            reader.get_mut().write_all(b"OK beta\n").await.unwrap();
        });

        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let unreachable = closed.local_addr().unwrap();
        drop(closed);

        let agent = agent("alpha");
        let joined = agent
            .join(&[peer.to_string(), unreachable.to_string()])
            .await;
        assert_eq!(joined, 1);
        assert!(agent.members().iter().any(|m| m.name == "beta"));
    }
}
