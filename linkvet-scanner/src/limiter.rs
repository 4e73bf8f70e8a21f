//! Per-domain request spacing.
//!
//! Each domain gets its own policy entry behind its own async mutex. The
//! entry is held while the caller waits out the remaining interval, so two
//! grants for the same domain can never land closer together than the
//! domain's interval, while callers for different domains never touch the
//! same lock.

use crate::error::{Result, ScanError};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

pub const DEFAULT_DOMAIN_INTERVAL: Duration = Duration::from_millis(500);

/// Hosts known to throttle automated clients
pub const RATE_SENSITIVE_DOMAINS: [(&str, u64); 4] = [
    ("doi.org", 2000),
    ("jstor.org", 2000),
    ("oed.com", 3000),
    ("britishmuseum.org", 3000),
];

#[derive(Debug, Clone)]
pub struct DomainPolicy {
    pub domain: String,
    pub min_interval: Duration,
    pub last_request_at: Option<Instant>,
}

impl DomainPolicy {
    fn new(domain: String, min_interval: Duration) -> Self {
        Self {
            domain,
            min_interval,
            last_request_at: None,
        }
    }

    /// How long a request issued at `now` would still have to wait
    pub fn remaining_wait(&self, now: Instant) -> Duration {
        match self.last_request_at {
            Some(last) => (last + self.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

pub struct DomainRateLimiter {
    policies: DashMap<String, Arc<Mutex<DomainPolicy>>>,
    default_interval: Duration,
    overrides: BTreeMap<String, Duration>,
}

impl DomainRateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            policies: DashMap::new(),
            default_interval,
            overrides: BTreeMap::new(),
        }
    }

    /// Limiter preloaded with slower intervals for rate-sensitive hosts
    pub fn with_builtin_overrides(default_interval: Duration) -> Self {
        RATE_SENSITIVE_DOMAINS
            .iter()
            .fold(Self::new(default_interval), |limiter, (domain, ms)| {
                limiter.with_override(*domain, Duration::from_millis(*ms))
            })
    }

    /// Set the interval for a domain and all of its subdomains
    pub fn with_override(mut self, domain: impl Into<String>, interval: Duration) -> Self {
        self.overrides.insert(domain.into().to_ascii_lowercase(), interval);
        self
    }

    /// Interval that applies to `domain`; the most specific override wins
    pub fn interval_for(&self, domain: &str) -> Duration {
        let domain = domain.to_ascii_lowercase();
        self.overrides
            .iter()
            .filter(|(pattern, _)| {
                domain == **pattern || domain.ends_with(&format!(".{}", pattern))
            })
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, interval)| *interval)
            .unwrap_or(self.default_interval)
    }

    /// Wait until `domain` may be contacted again and claim the slot.
    ///
    /// Returns the instant the request was granted.
    pub async fn acquire(&self, domain: &str) -> Instant {
        let key = domain.to_ascii_lowercase();
        let entry = self
            .policies
            .entry(key.clone())
            .or_insert_with(|| {
                let interval = self.interval_for(&key);
                Arc::new(Mutex::new(DomainPolicy::new(key.clone(), interval)))
            })
            .clone();

        let mut policy = entry.lock().await;

        let wait = policy.remaining_wait(Instant::now());
        if !wait.is_zero() {
            debug!("Waiting {:?} before next request to {}", wait, policy.domain);
            tokio::time::sleep(wait).await;
        }

        let granted = Instant::now();
        policy.last_request_at = Some(match policy.last_request_at {
            Some(last) if last > granted => last,
            _ => granted,
        });
        granted
    }

    /// Number of domains seen so far
    pub fn domain_count(&self) -> usize {
        self.policies.len()
    }

    /// Snapshot of a domain's policy, if the domain has been seen
    pub async fn policy(&self, domain: &str) -> Option<DomainPolicy> {
        let entry = self.policies.get(&domain.to_ascii_lowercase())?.clone();
        let policy = entry.lock().await;
        Some(policy.clone())
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::with_builtin_overrides(DEFAULT_DOMAIN_INTERVAL)
    }
}

/// Host component of a URL, lowercased
pub fn domain_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| ScanError::InvalidUrl(format!("{}: no host", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://Example.COM/path").unwrap(), "example.com");
        assert_eq!(domain_of("http://127.0.0.1:8080/").unwrap(), "127.0.0.1");
        assert!(domain_of("not a url").is_err());
    }

    #[test]
    fn test_interval_overrides_match_subdomains() {
        let limiter = DomainRateLimiter::with_builtin_overrides(Duration::from_millis(500));
        assert_eq!(limiter.interval_for("example.com"), Duration::from_millis(500));
        assert_eq!(limiter.interval_for("doi.org"), Duration::from_millis(2000));
        assert_eq!(limiter.interval_for("www.jstor.org"), Duration::from_millis(2000));
        assert_eq!(limiter.interval_for("OED.com"), Duration::from_millis(3000));
        assert_eq!(limiter.interval_for("notdoi.org"), Duration::from_millis(500));
    }

    #[test]
    fn test_most_specific_override_wins() {
        let limiter = DomainRateLimiter::new(Duration::from_millis(100))
            .with_override("example.com", Duration::from_millis(1000))
            .with_override("api.example.com", Duration::from_millis(50));
        assert_eq!(limiter.interval_for("api.example.com"), Duration::from_millis(50));
        assert_eq!(limiter.interval_for("www.example.com"), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = DomainRateLimiter::new(Duration::from_millis(500));
        let before = Instant::now();
        let granted = limiter.acquire("example.com").await;
        assert_eq!(granted, before);
        assert_eq!(limiter.domain_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_waits_for_interval() {
        let limiter = DomainRateLimiter::new(Duration::from_millis(500));
        let first = limiter.acquire("example.com").await;
        let second = limiter.acquire("example.com").await;
        assert!(second - first >= Duration::from_millis(500));

        let policy = limiter.policy("example.com").await.unwrap();
        assert_eq!(policy.last_request_at, Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_are_spaced() {
        let limiter = Arc::new(DomainRateLimiter::new(Duration::from_millis(500)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("example.com").await })
            })
            .collect();

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(500),
                "grants {:?} and {:?} are too close",
                pair[0],
                pair[1]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_domains_are_not_serialized() {
        let limiter = Arc::new(DomainRateLimiter::new(Duration::from_secs(10)));
        let start = Instant::now();

        let handles: Vec<_> = ["a.example", "b.example", "c.example"]
            .into_iter()
            .map(|domain| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire(domain).await })
            })
            .collect();

        for handle in handles {
            let granted = handle.await.unwrap();
            assert!(granted - start < Duration::from_secs(1));
        }
        assert_eq!(limiter.domain_count(), 3);
    }
}
