use std::{net::SocketAddr, sync::Arc, time::Duration};

use crate::{error::Error, socket::DeadlineUdpSocket};

use super::{Discover, discover_any};

const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Discovers the reflexive address of a long-lived socket, running the
/// blocking exchange on the runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct StunDiscover {
    socket: Arc<DeadlineUdpSocket>,
    servers: Vec<String>,
    timeout: Duration,
}

impl StunDiscover {
    pub fn new(socket: Arc<DeadlineUdpSocket>, servers: Vec<String>) -> Self {
        Self {
            socket,
            servers,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Single server taken from `STUN_SERVER`, falling back to a public one.
    pub fn from_env(socket: Arc<DeadlineUdpSocket>) -> Self {
        let server = std::env::var("STUN_SERVER").unwrap_or_else(|_| DEFAULT_STUN_SERVER.into());

        Self::new(socket, vec![server])
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

impl Discover for StunDiscover {
    type Error = Error;

    async fn discover(&self) -> Result<(SocketAddr, u16), Self::Error> {
        let local_port = self.socket.local_addr()?.port();

        let socket = self.socket.clone();
        let servers = self.servers.clone();
        let timeout = self.timeout;

        let addr = tokio::task::spawn_blocking(move || {
            discover_any(servers.as_slice(), &*socket, timeout)
        })
        .await??;

        Ok((addr, local_port))
    }
}
