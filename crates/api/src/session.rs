use echobridge_core::{BridgeConfig, Error, Result};
use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{debug, info};

/// How the backend proxy setting resolves.
#[derive(Debug, PartialEq)]
enum ProxyResolution {
    /// Route through this proxy URL.
    UseProxy(String),
    /// `proxy: ""` disables every proxy, environment included.
    ForceDirectConnect,
    /// Not configured; reqwest reads HTTPS_PROXY/HTTP_PROXY itself.
    None,
}

fn resolve_proxy(proxy: Option<&str>) -> ProxyResolution {
    match proxy.map(str::trim) {
        Some("") => ProxyResolution::ForceDirectConnect,
        Some(p) => ProxyResolution::UseProxy(p.to_string()),
        None => ProxyResolution::None,
    }
}

/// Builds the pooled HTTP client for one session.
pub fn build_http_client(
    proxy: Option<&str>,
    base_url: &str,
    timeout: Duration,
) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);

    match resolve_proxy(proxy) {
        ProxyResolution::UseProxy(proxy_url) => {
            let p = Proxy::all(&proxy_url)
                .map_err(|e| Error::Config(format!("invalid proxy '{}': {}", proxy_url, e)))?;
            info!(proxy = %proxy_url, backend = %base_url, "Backend connection using proxy");
            builder = builder.proxy(p);
        }
        ProxyResolution::ForceDirectConnect => {
            info!(backend = %base_url, "Backend connection forced direct (proxy disabled)");
            builder = builder.no_proxy();
        }
        ProxyResolution::None => {}
    }

    builder
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

/// Holds the connection pool between `connect` and `disconnect`.
///
/// No retries and no protocol knowledge live here.
pub struct TransportSession {
    base_url: String,
    timeout: Duration,
    proxy: Option<String>,
    client: Option<Client>,
    opened: u64,
}

impl TransportSession {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            timeout: config.timeout_duration(),
            proxy: config.proxy.clone(),
            client: None,
            opened: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            debug!(backend = %self.base_url, "Already connected");
            return Ok(());
        }
        let client = build_http_client(self.proxy.as_deref(), &self.base_url, self.timeout)?;
        self.client = Some(client);
        self.opened += 1;
        info!(backend = %self.base_url, session = self.opened, "API bridge connected");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            info!(backend = %self.base_url, "API bridge disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Clones the pooled client out; the clone shares the same pool.
    pub fn client(&self) -> Result<Client> {
        self.client.clone().ok_or(Error::NotConnected)
    }

    pub fn sessions_opened(&self) -> u64 {
        self.opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_proxy() {
        assert_eq!(resolve_proxy(Some("")), ProxyResolution::ForceDirectConnect);
        assert_eq!(resolve_proxy(Some("  ")), ProxyResolution::ForceDirectConnect);
        assert_eq!(
            resolve_proxy(Some("http://proxy.local:8080")),
            ProxyResolution::UseProxy("http://proxy.local:8080".to_string())
        );
        assert_eq!(resolve_proxy(None), ProxyResolution::None);
    }

    #[test]
    fn test_build_http_client_variants() {
        let timeout = Duration::from_secs(5);
        assert!(build_http_client(None, "http://localhost:5000", timeout).is_ok());
        assert!(build_http_client(Some(""), "http://localhost:5000", timeout).is_ok());
        assert!(build_http_client(
            Some("http://proxy.local:3128"),
            "http://localhost:5000",
            timeout
        )
        .is_ok());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut session = TransportSession::new(&BridgeConfig::default());
        assert!(!session.is_connected());
        assert!(matches!(session.client(), Err(Error::NotConnected)));

        session.connect().unwrap();
        session.connect().unwrap();
        assert!(session.is_connected());
        assert_eq!(session.sessions_opened(), 1);
        assert!(session.client().is_ok());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut session = TransportSession::new(&BridgeConfig::default());
        session.disconnect();
        session.connect().unwrap();
        session.disconnect();
        session.disconnect();
        assert!(!session.is_connected());
        assert!(matches!(session.client(), Err(Error::NotConnected)));

        session.connect().unwrap();
        assert_eq!(session.sessions_opened(), 2);
    }
}
