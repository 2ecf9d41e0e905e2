//! Internal RPC server.
//!
//! A line protocol spoken between agents:
//!
//! ```text
//! PING                → PONG
//! JOIN <node> <addr>  → OK <local node>
//! MEMBERS             → JSON array of members
//! anything else       → ERR <reason>
//! ```

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::agent::{LocalAgent, Subsystem, SubsystemError};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::Telemetry;

/// Concurrent RPC connections allowed.
pub const MAX_RPC_CONNECTIONS: usize = 256;

/// Longest request line accepted, newline excluded.
pub const MAX_LINE_BYTES: usize = 4096;

/// How long shutdown waits for the accept loop and its connections.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The running RPC server.
pub struct RpcServer {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcServer {
    /// Bind `addr` and start serving requests for `agent`.
    pub async fn start(
        addr: &str,
        agent: Arc<LocalAgent>,
        telemetry: Telemetry,
    ) -> Result<Self, SubsystemError> {
        let listener = Listener::bind(addr, MAX_RPC_CONNECTIONS)
            .await
            .map_err(|e| match e {
                ListenerError::Bind(source) => SubsystemError::Bind {
                    addr: addr.to_string(),
                    source,
                },
                other => SubsystemError::Failed(other.to_string()),
            })?;
        let local_addr = listener.local_addr().map_err(|source| SubsystemError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, agent, telemetry, stopped));

        Ok(Self {
            local_addr,
            stop,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(
    listener: Listener,
    agent: Arc<LocalAgent>,
    telemetry: Telemetry,
    mut stopped: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = stopped.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    telemetry.incr_counter("agent.rpc.connections", 1);
                    let agent = agent.clone();
                    connections.spawn(async move {
                        if let Err(e) = serve_connection(stream, &agent).await {
                            tracing::debug!(peer = %peer, error = %e, "RPC connection closed with error");
                        }
                        drop(permit);
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => tracing::warn!(error = %e, "RPC accept failed"),
            },
        }
    }

    // Open connections end with the server
    connections.shutdown().await;
}

async fn serve_connection(stream: TcpStream, agent: &LocalAgent) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(());
        }
        if read > MAX_LINE_BYTES && !line.ends_with('\n') {
            write.write_all(b"ERR request too long\n").await?;
            return Ok(());
        }

        let reply = handle_line(line.trim(), agent);
        write.write_all(reply.as_bytes()).await?;
        write.write_all(b"\n").await?;
    }
}

/// Answer one request line.
fn handle_line(line: &str, agent: &LocalAgent) -> String {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("PING") => "PONG".to_string(),
        Some("JOIN") => match (parts.next(), parts.next(), parts.next()) {
            (Some(node), Some(addr), None) => {
                agent.handle_join(node, addr);
                format!("OK {}", agent.config().node_name)
            }
            _ => "ERR usage: JOIN <node> <addr>".to_string(),
        },
        Some("MEMBERS") => match serde_json::to_string(&agent.members()) {
            Ok(json) => json,
            Err(e) => format!("ERR {}", e),
        },
        Some(other) => format!("ERR unknown command '{}'", other),
        None => "ERR empty request".to_string(),
    }
}

#[async_trait]
impl Subsystem for RpcServer {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn shutdown(&self) -> Result<(), SubsystemError> {
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut task) = task else {
            return Ok(());
        };

        let _ = self.stop.send(true);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(joined) => {
                joined.map_err(|e| SubsystemError::Failed(format!("rpc accept loop: {}", e)))?
            }
            Err(_) => {
                task.abort();
                return Err(SubsystemError::Failed("rpc drain timed out".into()));
            }
        }
        tracing::info!(addr = %self.local_addr, "RPC server stopped");
        Ok(())
    }
}
