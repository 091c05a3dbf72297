// reqwest-backed network with upstream forwarding
// Author: kelexine (https://github.com/kelexine)

use super::Network;
use crate::config::{NetworkConfig, OriginConfig};
use crate::error::{CoordinatorError, Result};
use crate::models::{RequestDescriptor, Response};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use std::time::Duration;
use tracing::debug;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// HTTP network used in production.
///
/// Requests addressed to the public origin are rewritten onto the upstream
/// server; anything else is fetched from its own URL.
pub struct HttpNetwork {
    http_client: Client,
    origin: Url,
    upstream: Url,
}

impl HttpNetwork {
    pub fn new(network: &NetworkConfig, origin: &OriginConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_seconds))
            .pool_max_idle_per_host(network.pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .use_rustls_tls();
        if let Some(secs) = network.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| CoordinatorError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let parse = |url: &str| {
            Url::parse(url).map_err(|e| CoordinatorError::Config(format!("invalid URL '{}': {}", url, e)))
        };

        debug!("Created upstream HTTP client for {}", origin.upstream_url);

        Ok(Self {
            http_client,
            origin: parse(&origin.public_url)?,
            upstream: parse(&origin.upstream_url)?,
        })
    }

    /// Where a request is actually sent.
    fn target_url(&self, request: &RequestDescriptor) -> Result<Url> {
        if request.url.origin() != self.origin.origin() {
            return Ok(request.url.clone());
        }
        self.upstream
            .join(&request.path_and_query())
            .map_err(|e| CoordinatorError::InvalidRequest(format!("cannot forward {}: {}", request.url, e)))
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response> {
        let url = self.target_url(request)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CoordinatorError::InvalidRequest(format!("bad method {}: {}", request.method, e)))?;

        debug!("Fetching {} {}", request.method, url);

        let mut outgoing = self.http_client.request(method, url.clone());
        for (name, value) in request.headers.iter().filter(|(n, _)| !is_hop_by_hop(n)) {
            outgoing = outgoing.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            outgoing = outgoing.body(request.body.clone());
        }

        let response = outgoing
            .send()
            .await
            .map_err(|e| CoordinatorError::NetworkUnavailable(format!("{}: {}", url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CoordinatorError::NetworkUnavailable(format!("{}: body read failed: {}", url, e)))?;

        Ok(Response {
            status,
            headers,
            body,
            stored_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Destination;

    fn network() -> HttpNetwork {
        let origin = OriginConfig {
            public_url: "http://app.local:8080".to_string(),
            upstream_url: "http://127.0.0.1:3000/base/".to_string(),
            forward_foreign: false,
        };
        HttpNetwork::new(&NetworkConfig::default(), &origin).unwrap()
    }

    #[test]
    fn test_same_origin_rewritten_to_upstream() {
        let req = RequestDescriptor::get("http://app.local:8080/app.js?v=2", Destination::Script).unwrap();
        let target = network().target_url(&req).unwrap();
        assert_eq!(target.as_str(), "http://127.0.0.1:3000/app.js?v=2");
    }

    #[test]
    fn test_cross_origin_untouched() {
        let req = RequestDescriptor::get("https://fonts.example.com/a.woff2", Destination::Font).unwrap();
        let target = network().target_url(&req).unwrap();
        assert_eq!(target.as_str(), "https://fonts.example.com/a.woff2");
    }

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("host"));
        assert!(!is_hop_by_hop("accept"));
    }
}
