pub mod circuit;
pub mod headers;

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Method, Url};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

pub use circuit::{Admission, CircuitBreaker, CircuitState};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network failure for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("circuit open, refusing {url}")]
    CircuitOpen { url: String },

    #[error("transport closed")]
    Closed,

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("invalid rate limit {value}, expected a positive integer")]
    InvalidRate { value: u32 },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Failures a caller should read as "no information" and move on from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. }
                | TransportError::CircuitOpen { .. }
                | TransportError::Closed
                | TransportError::InvalidUrl { .. }
        )
    }
}

/// One fetched response. Built once by the transport and only ever read afterwards.
#[derive(Clone, Debug)]
pub struct ProbeResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub size: usize,
    pub latency: Duration,
}

impl ProbeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_script(&self) -> bool {
        self.content_type().contains("javascript") || crate::utils::is_script_path(&self.url)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub rate: u32,
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
    pub circuit_threshold: u32,
    pub circuit_cooldown: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            rate: 20,
            timeout: Duration::from_secs(10),
            proxy: None,
            follow_redirects: true,
            circuit_threshold: circuit::DEFAULT_FAILURE_THRESHOLD,
            circuit_cooldown: circuit::DEFAULT_COOLDOWN,
        }
    }
}

/// Rate-limited, circuit-broken HTTP client shared by every worker of a scan.
pub struct Transport {
    client: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
    breaker: CircuitBreaker,
    closed: AtomicBool,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("breaker", &self.breaker)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let rate = NonZeroU32::new(config.rate)
            .ok_or(TransportError::InvalidRate { value: config.rate })?;
        // burst of one keeps every one-second window at or below `rate`
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);

        let client = build_client(
            config.proxy.as_deref(),
            config.timeout,
            config.follow_redirects,
        )?;

        Ok(Self {
            client,
            limiter: RateLimiter::direct(quota),
            breaker: CircuitBreaker::new(config.circuit_threshold, config.circuit_cooldown),
            closed: AtomicBool::new(false),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn get(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        self.request(Method::GET, url, RequestOptions::default())
            .await
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<ProbeResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let parsed = Url::parse(url).map_err(|_| TransportError::InvalidUrl {
            url: url.to_string(),
        })?;

        let admission = self.breaker.admit();
        if admission == Admission::Rejected {
            return Err(TransportError::CircuitOpen {
                url: url.to_string(),
            });
        }

        self.limiter.until_ready().await;
        // the circuit may have opened while this call waited for a token
        if admission == Admission::Allowed && self.breaker.state() != CircuitState::Closed {
            return Err(TransportError::CircuitOpen {
                url: url.to_string(),
            });
        }
        let result = self.dispatch(method, parsed, &options).await;
        match &result {
            Ok(resp) => self.breaker.record_status(resp.status),
            Err(_) if admission == Admission::Probe => self.breaker.record_network_failure(),
            Err(_) => {}
        }
        result
    }

    /// GET against a third-party service. Rate limited, but its errors
    /// never count against the target's circuit.
    pub async fn fetch_external(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let parsed = Url::parse(url).map_err(|_| TransportError::InvalidUrl {
            url: url.to_string(),
        })?;
        self.limiter.until_ready().await;
        self.dispatch(Method::GET, parsed, &RequestOptions::default())
            .await
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        options: &RequestOptions,
    ) -> Result<ProbeResponse, TransportError> {
        let url_str = url.to_string();
        let headers = headers::merge_headers(headers::random_headers(), &options.headers);
        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = options.body.as_ref() {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::Network {
                url: url_str.clone(),
                source: e,
            })?;
        let status = resp.status().as_u16();
        let mut resp_headers = HashMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(v) = v.to_str() {
                resp_headers.insert(k.as_str().to_lowercase(), v.to_string());
            }
        }
        let bytes = resp.bytes().await.map_err(|e| TransportError::Network {
            url: url_str.clone(),
            source: e,
        })?;
        let latency = start.elapsed();
        debug!("{} {} ({} bytes, {:?})", status, url_str, bytes.len(), latency);

        Ok(ProbeResponse {
            url: url_str,
            status,
            size: bytes.len(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            headers: resp_headers,
            latency,
        })
    }
}

fn build_client(
    proxy: Option<&str>,
    timeout: Duration,
    follow_redirects: bool,
) -> Result<reqwest::Client, TransportError> {
    let redirect_policy = if follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .redirect(redirect_policy)
        .timeout(timeout)
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| TransportError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| TransportError::Build { source: e })
}
