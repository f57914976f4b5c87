use std::{fmt, time::Duration};

use serde::Deserialize;
use shared::protocol::DEFAULT_PORT;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

const SRV_SERVICE: &str = "_obs._tcp";
const DOH_RESOLVER: &str = "https://dns.google/resolve";
const SRV_RECORD_TYPE: u16 = 33;
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("SRV lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no usable SRV record for {0}")]
    NoRecord(String),
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// Parses an explicit address: `ws://host:port`, `host:port`, or `None` for
/// a bare host that needs discovery.
pub fn parse_address(addr: &str) -> Option<Endpoint> {
    let addr = addr.trim();
    if addr.contains("://") {
        let url = Url::parse(addr).ok()?;
        let host = url.host_str()?.to_string();
        return Some(Endpoint::new(host, url.port().unwrap_or(DEFAULT_PORT)));
    }
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    (!host.is_empty()).then(|| Endpoint::new(host, port))
}

/// Picks the best SRV target out of a DNS-over-HTTPS JSON answer.
pub fn parse_srv_answer(raw: &str) -> Option<Endpoint> {
    let response: DohResponse = serde_json::from_str(raw).ok()?;
    if response.status != 0 {
        return None;
    }
    response
        .answer
        .iter()
        .filter(|answer| answer.record_type == SRV_RECORD_TYPE)
        .filter_map(|answer| {
            let mut fields = answer.data.split_whitespace();
            let priority: u16 = fields.next()?.parse().ok()?;
            let _weight: u16 = fields.next()?.parse().ok()?;
            let port: u16 = fields.next()?.parse().ok()?;
            let target = fields.next()?.trim_end_matches('.');
            (!target.is_empty()).then(|| (priority, Endpoint::new(target, port)))
        })
        .min_by_key(|(priority, _)| *priority)
        .map(|(_, endpoint)| endpoint)
}

pub async fn lookup_srv(client: &reqwest::Client, host: &str) -> Result<Endpoint, DiscoveryError> {
    let record = format!("{SRV_SERVICE}.{host}");
    let body = client
        .get(DOH_RESOLVER)
        .query(&[("name", record.as_str()), ("type", "SRV")])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_srv_answer(&body).ok_or(DiscoveryError::NoRecord(record))
}

/// Resolves `addr` to an endpoint. Discovery failures fall back to the
/// default port on the given host.
pub async fn resolve_endpoint(addr: &str) -> Endpoint {
    if let Some(endpoint) = parse_address(addr) {
        return endpoint;
    }
    let host = addr.trim();
    let fallback = Endpoint::new(host, DEFAULT_PORT);
    let client = match reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            warn!(host, error = %err, "cannot build resolver client; using default port");
            return fallback;
        }
    };
    match lookup_srv(&client, host).await {
        Ok(endpoint) => {
            info!(host, %endpoint, "resolved SRV record");
            endpoint
        }
        Err(err) => {
            warn!(host, error = %err, "SRV lookup failed; using default port");
            fallback
        }
    }
}
