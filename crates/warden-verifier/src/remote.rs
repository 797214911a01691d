//! # Remote Edge-Configuration Probe
//!
//! A caching HTTP client for a Cloudflare-style configuration API. Every
//! response is a `{success, errors, result}` envelope; the cached payload is
//! the parsed `result` value, keyed by request path with a 60-second TTL.
//!
//! Non-success envelopes surface as `FleetError::Upstream` carrying the
//! first error's code and message. HTTP 429 surfaces distinctly as
//! `RateLimited` so callers can back off. Request timeouts (10 s) surface
//! as `Timeout`. The edge checks translate those failures into `unknown`
//! compliance items rather than propagating them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;

use warden_core::{CheckStatus, FleetError, ReportItem, VerificationMethod};

/// Outbound request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a cached `result` stays fresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cipher names the edge may serve that count as FIPS-approved.
/// AES-GCM suites only; the empty list means provider defaults, which
/// include non-approved suites.
const APPROVED_EDGE_CIPHERS: &[&str] = &[
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "AES128-GCM-SHA256",
    "AES256-GCM-SHA384",
];

/// Days before certificate expiry at which the check degrades to a warning.
const CERT_EXPIRY_WARNING_DAYS: i64 = 30;

/// Connection settings for the edge API.
#[derive(Debug, Clone)]
pub struct EdgeApiConfig {
    /// API base, e.g. `https://api.cloudflare.com/client/v4`.
    pub base_url: String,
    pub api_token: String,
    pub zone_id: String,
    pub account_id: Option<String>,
    pub tunnel_id: Option<String>,
    pub cache_ttl: Duration,
}

impl EdgeApiConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            zone_id: zone_id.into(),
            account_id: None,
            tunnel_id: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Standard response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiEnvelopeError>,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelopeError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

struct CacheEntry {
    value: serde_json::Value,
    fetched_at: Instant,
}

/// Caching client for the edge configuration API. Thread-safe; the cache
/// lock is never held across a request.
pub struct EdgeApiClient {
    http: reqwest::Client,
    config: EdgeApiConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl EdgeApiClient {
    pub fn new(config: EdgeApiConfig) -> Result<Self, FleetError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let bearer = format!("Bearer {}", config.api_token);
        let mut auth = reqwest::header::HeaderValue::from_str(&bearer)
            .map_err(|_| FleetError::BadRequest("api token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| FleetError::Internal(format!("build http client: {e}")))?;

        Ok(Self {
            http,
            config,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Fetch the `result` payload for an API path, consulting the cache.
    pub async fn get(&self, path: &str) -> Result<serde_json::Value, FleetError> {
        if let Some(value) = self.cached(path) {
            return Ok(value);
        }

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FleetError::Timeout(format!("GET {path}"))
            } else {
                FleetError::Upstream {
                    code: None,
                    message: format!("GET {path}: {e}"),
                }
            }
        })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FleetError::RateLimited);
        }

        let envelope: ApiEnvelope = response.json().await.map_err(|e| FleetError::Upstream {
            code: None,
            message: format!("GET {path}: malformed envelope: {e}"),
        })?;

        if !envelope.success {
            let first = envelope.errors.first();
            return Err(FleetError::Upstream {
                code: first.and_then(|e| e.code),
                message: first
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "unspecified upstream error".into()),
            });
        }

        self.cache.write().insert(
            path.to_string(),
            CacheEntry {
                value: envelope.result.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(envelope.result)
    }

    fn cached(&self, path: &str) -> Option<serde_json::Value> {
        let cache = self.cache.read();
        let entry = cache.get(path)?;
        if entry.fetched_at.elapsed() < self.config.cache_ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Drop every cached payload. Exposed to admins for forced refresh.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Run the zone TLS checks and render them as compliance items.
    ///
    /// Each check degrades independently: an unreachable or failing API
    /// yields an `unknown` item carrying the error text, never an `Err`.
    pub async fn edge_checks(&self) -> Vec<ReportItem> {
        let zone = self.config.zone_id.clone();
        let mut items = vec![
            self.min_tls_check(&zone).await,
            self.cipher_check(&zone).await,
            self.certificate_check(&zone).await,
        ];
        if let (Some(account), Some(tunnel)) =
            (self.config.account_id.clone(), self.config.tunnel_id.clone())
        {
            items.push(self.tunnel_check(&account, &tunnel).await);
        }
        items
    }

    async fn min_tls_check(&self, zone: &str) -> ReportItem {
        let name = "Edge minimum TLS version";
        match self.get(&format!("zones/{zone}/settings/min_tls_version")).await {
            Ok(result) => {
                let value = result["value"].as_str().unwrap_or_default().to_string();
                let status = match value.parse::<f64>() {
                    Ok(v) if v >= 1.2 => CheckStatus::Pass,
                    Ok(_) => CheckStatus::Fail,
                    Err(_) => CheckStatus::Unknown,
                };
                ReportItem::with_status("cp-min-tls", name, status)
                    .detail(format!("min_tls_version={value}"))
                    .remediation("raise the zone minimum TLS version to 1.2 or higher")
                    .method(VerificationMethod::Api)
            }
            Err(e) => probe_unknown("cp-min-tls", name, &e),
        }
    }

    async fn cipher_check(&self, zone: &str) -> ReportItem {
        let name = "Edge cipher allowlist";
        match self.get(&format!("zones/{zone}/settings/ciphers")).await {
            Ok(result) => {
                let ciphers: Vec<String> = result["value"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();

                if ciphers.is_empty() {
                    // Provider defaults apply, and those include suites
                    // outside the approved set.
                    return ReportItem::with_status("cp-ciphers", name, CheckStatus::Warning)
                        .detail("no explicit cipher list; provider defaults include non-approved suites")
                        .remediation("pin the zone cipher list to AES-GCM suites")
                        .method(VerificationMethod::Api);
                }

                let offenders: Vec<&String> = ciphers
                    .iter()
                    .filter(|c| !APPROVED_EDGE_CIPHERS.contains(&c.as_str()))
                    .collect();
                if offenders.is_empty() {
                    ReportItem::with_status("cp-ciphers", name, CheckStatus::Pass)
                        .detail(format!("{} approved suites pinned", ciphers.len()))
                        .method(VerificationMethod::Api)
                } else {
                    ReportItem::with_status("cp-ciphers", name, CheckStatus::Fail)
                        .detail(format!(
                            "non-approved suites configured: {}",
                            offenders
                                .iter()
                                .map(|s| s.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                        .remediation("remove non-AES-GCM suites from the zone cipher list")
                        .method(VerificationMethod::Api)
                }
            }
            Err(e) => probe_unknown("cp-ciphers", name, &e),
        }
    }

    async fn tunnel_check(&self, account: &str, tunnel: &str) -> ReportItem {
        let name = "Edge tunnel health";
        match self
            .get(&format!("accounts/{account}/cfd_tunnel/{tunnel}"))
            .await
        {
            Ok(result) => {
                let tunnel_status = result["status"].as_str().unwrap_or("unknown").to_string();
                let status = match tunnel_status.as_str() {
                    "healthy" | "active" => CheckStatus::Pass,
                    "degraded" => CheckStatus::Warning,
                    "down" | "inactive" => CheckStatus::Fail,
                    _ => CheckStatus::Unknown,
                };
                ReportItem::with_status("cp-tunnel", name, status)
                    .detail(format!("tunnel status {tunnel_status}"))
                    .method(VerificationMethod::Api)
            }
            Err(e) => probe_unknown("cp-tunnel", name, &e),
        }
    }

    async fn certificate_check(&self, zone: &str) -> ReportItem {
        let name = "Edge certificate expiry";
        match self.get(&format!("zones/{zone}/ssl/certificate_packs")).await {
            Ok(result) => {
                let earliest = result
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|pack| pack["expires_on"].as_str())
                    .filter_map(|raw| {
                        chrono::DateTime::parse_from_rfc3339(raw)
                            .ok()
                            .map(|dt| dt.with_timezone(&chrono::Utc))
                    })
                    .min();

                match earliest {
                    None => ReportItem::with_status("cp-cert-expiry", name, CheckStatus::Unknown)
                        .detail("no certificate packs visible for zone")
                        .method(VerificationMethod::Api),
                    Some(expires) => {
                        let days_left = (expires - chrono::Utc::now()).num_days();
                        let status = if days_left < 0 {
                            CheckStatus::Fail
                        } else if days_left <= CERT_EXPIRY_WARNING_DAYS {
                            CheckStatus::Warning
                        } else {
                            CheckStatus::Pass
                        };
                        ReportItem::with_status("cp-cert-expiry", name, status)
                            .detail(format!(
                                "earliest certificate expires {} ({days_left} days)",
                                expires.format("%Y-%m-%d")
                            ))
                            .remediation("renew the edge certificate before expiry")
                            .method(VerificationMethod::Api)
                    }
                }
            }
            Err(e) => probe_unknown("cp-cert-expiry", name, &e),
        }
    }
}

/// An `unknown` item carrying the probe failure. Rate limiting is called
/// out explicitly so operators know to expect recovery without action.
fn probe_unknown(id: &str, name: &str, err: &FleetError) -> ReportItem {
    tracing::debug!(check = id, error = %err, "edge probe degraded to unknown");
    let detail = match err {
        FleetError::RateLimited => "edge API rate limited; retry after back-off".to_string(),
        other => format!("probe failed: {other}"),
    };
    ReportItem::with_status(id, name, CheckStatus::Unknown)
        .detail(detail)
        .method(VerificationMethod::Api)
}

impl std::fmt::Debug for EdgeApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeApiClient")
            .field("base_url", &self.config.base_url)
            .field("zone_id", &self.config.zone_id)
            .field("cached_paths", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}
