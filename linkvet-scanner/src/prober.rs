//! Reachability probe for a single URL: HEAD first, one GET fallback.

use crate::error::Result;
use crate::limiter::{DomainRateLimiter, domain_of};
use crate::result::{NetworkErrorKind, ProbeAttempt, ProbeMethod, ProbeOutcome, ProbeTrace};
use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_FALLBACK_STATUSES: [u16; 3] = [403, 405, 406];

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub timeout: Duration,
    pub browser_headers: bool,
    /// HEAD statuses that trigger a GET retry
    pub fallback_statuses: BTreeSet<u16>,
    pub max_redirects: usize,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            browser_headers: true,
            fallback_statuses: DEFAULT_FALLBACK_STATUSES.into_iter().collect(),
            max_redirects: 10,
        }
    }
}

pub struct Prober {
    client: Client,
    config: ProberConfig,
}

impl Prober {
    pub fn new(config: ProberConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(true);

        builder = if config.browser_headers {
            builder.default_headers(browser_headers())
        } else {
            builder.user_agent(concat!("linkvet/", env!("CARGO_PKG_VERSION")))
        };

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::new(ProberConfig {
            timeout,
            ..ProberConfig::default()
        })
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Probe one URL. Never fails: every problem becomes an attempt outcome.
    pub async fn probe(&self, url: &str) -> ProbeTrace {
        self.probe_with_limiter(url, None).await
    }

    /// Probe one URL, taking a slot from `limiter` before each attempt so the
    /// GET fallback is spaced from the HEAD like any other request.
    pub async fn probe_paced(&self, url: &str, limiter: &DomainRateLimiter) -> ProbeTrace {
        self.probe_with_limiter(url, Some(limiter)).await
    }

    async fn probe_with_limiter(&self, url: &str, limiter: Option<&DomainRateLimiter>) -> ProbeTrace {
        let domain = match limiter.map(|_| domain_of(url)) {
            Some(Ok(domain)) => Some(domain),
            Some(Err(e)) => {
                debug!("No rate limit for {}: {}", url, e);
                None
            }
            None => None,
        };

        wait_for_slot(limiter, domain.as_deref()).await;
        let head = self.attempt(url, ProbeMethod::Head).await;
        let fallback = self.needs_fallback(&head.outcome);
        let mut attempts = vec![head];

        if fallback {
            debug!("HEAD {} gave {}, retrying with GET", url, attempts[0].outcome);
            wait_for_slot(limiter, domain.as_deref()).await;
            attempts.push(self.attempt(url, ProbeMethod::Get).await);
        }

        ProbeTrace {
            url: url.to_string(),
            attempts,
        }
    }

    pub fn needs_fallback(&self, outcome: &ProbeOutcome) -> bool {
        match outcome {
            ProbeOutcome::Success(_) => false,
            ProbeOutcome::HttpError(status) => self.config.fallback_statuses.contains(status),
            ProbeOutcome::NetworkError(kind) => !kind.is_terminal(),
            ProbeOutcome::Timeout => true,
        }
    }

    async fn attempt(&self, url: &str, method: ProbeMethod) -> ProbeAttempt {
        let started_at = Utc::now();

        let (outcome, reason) = match Url::parse(url) {
            Err(e) => (
                ProbeOutcome::NetworkError(NetworkErrorKind::InvalidUrl),
                Some(e.to_string()),
            ),
            Ok(parsed) => {
                let http_method = match method {
                    ProbeMethod::Head => Method::HEAD,
                    ProbeMethod::Get => Method::GET,
                };

                // The body is never read; dropping the response closes it.
                match self.client.request(http_method, parsed).send().await {
                    Ok(response) => {
                        let status = response.status();
                        (
                            ProbeOutcome::from_status(status.as_u16()),
                            status.canonical_reason().map(String::from),
                        )
                    }
                    Err(e) => (classify_error(&e), Some(error_text(&e))),
                }
            }
        };

        debug!("{} {} -> {}", method.as_str(), url, outcome);

        ProbeAttempt {
            url: url.to_string(),
            method,
            started_at,
            finished_at: Utc::now(),
            outcome,
            reason,
            browser_headers: self.config.browser_headers,
        }
    }
}

async fn wait_for_slot(limiter: Option<&DomainRateLimiter>, domain: Option<&str>) {
    if let (Some(limiter), Some(domain)) = (limiter, domain) {
        limiter.acquire(domain).await;
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers
}

/// Map a transport error onto the probe outcome taxonomy
pub fn classify_error(error: &reqwest::Error) -> ProbeOutcome {
    if error.is_timeout() || chain_has_io_kind(error, std::io::ErrorKind::TimedOut) {
        return ProbeOutcome::Timeout;
    }
    if error.is_redirect() {
        return ProbeOutcome::NetworkError(NetworkErrorKind::TooManyRedirects);
    }
    if error.is_builder() {
        return ProbeOutcome::NetworkError(NetworkErrorKind::InvalidUrl);
    }

    let text = error_text(error).to_lowercase();

    let kind = if chain_has_io_kind(error, std::io::ErrorKind::ConnectionRefused)
        || text.contains("connection refused")
    {
        NetworkErrorKind::ConnectionRefused
    } else if text.contains("dns error")
        || text.contains("failed to lookup address")
        || text.contains("name or service not known")
        || text.contains("no such host")
    {
        NetworkErrorKind::DnsFailure
    } else if text.contains("certificate")
        || text.contains("tls")
        || text.contains("ssl")
        || text.contains("handshake")
    {
        NetworkErrorKind::TlsError
    } else {
        NetworkErrorKind::Other
    };

    ProbeOutcome::NetworkError(kind)
}

/// The error and all of its sources, joined
fn error_text(error: &reqwest::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

fn chain_has_io_kind(error: &reqwest::Error, kind: std::io::ErrorKind) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>()
            && io.kind() == kind
        {
            return true;
        }
        source = inner.source();
    }
    false
}
