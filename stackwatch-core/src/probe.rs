use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::catalog::TcpTarget;

/// Active HTTP/TCP checks. Failures come back as plain values; a service
/// that does not answer yet is routine, not exceptional.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Status code of a GET against `url`
    async fn http_status(&self, url: &str, timeout: Duration) -> Result<u16, String>;

    /// Succeeds if a TCP connection can be opened within `timeout`
    async fn tcp_connect(&self, target: &TcpTarget, timeout: Duration) -> Result<(), String>;
}

/// Per-kind probe deadlines
#[derive(Clone, Copy, Debug)]
pub struct ProbeTimeouts {
    pub http: Duration,
    pub tcp: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            http: Duration::from_millis(800),
            tcp: Duration::from_millis(300),
        }
    }
}

/// Probes real endpoints over the network
pub struct NetProbe {
    client: reqwest::Client,
}

impl NetProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for NetProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for NetProbe {
    async fn http_status(&self, url: &str, timeout: Duration) -> Result<u16, String> {
        let request = self.client.get(url).timeout(timeout).send();
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(resp)) => Ok(resp.status().as_u16()),
            Ok(Err(e)) if e.is_timeout() => Err("timeout".into()),
            Ok(Err(e)) if e.is_connect() => Err("connection refused".into()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("timeout".into()),
        }
    }

    async fn tcp_connect(&self, target: &TcpTarget, timeout: Duration) -> Result<(), String> {
        let addr = (target.host.as_str(), target.port);
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("connection timeout".into()),
        }
    }
}
