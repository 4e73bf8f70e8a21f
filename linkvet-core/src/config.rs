//! Run configuration: defaults, JSON config file and validation.

use crate::classify::ClassificationPolicy;
use crate::error::ConfigError;
use linkvet_scanner::limiter::{DomainRateLimiter, RATE_SENSITIVE_DOMAINS};
use linkvet_scanner::prober::{DEFAULT_FALLBACK_STATUSES, ProberConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OUTPUT_PATH: &str = "broken_links_report.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub max_workers: usize,
    pub batch_size: usize,
    pub request_timeout_secs: u64,
    pub default_domain_interval_ms: u64,
    /// Host to minimum interval in milliseconds; also applies to subdomains
    pub domain_intervals: BTreeMap<String, u64>,
    pub output_path: PathBuf,
    /// Defaults to `<output_path>.checkpoint.json`
    pub checkpoint_path: Option<PathBuf>,
    pub flush_every: usize,
    pub flush_interval_secs: u64,
    pub strict_markup: bool,
    pub browser_headers: bool,
    pub fallback_statuses: BTreeSet<u16>,
    pub classification: ClassificationPolicy,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            batch_size: 20,
            request_timeout_secs: 10,
            default_domain_interval_ms: 500,
            domain_intervals: RATE_SENSITIVE_DOMAINS
                .iter()
                .map(|(domain, ms)| (domain.to_string(), *ms))
                .collect(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            checkpoint_path: None,
            flush_every: 20,
            flush_interval_secs: 30,
            strict_markup: false,
            browser_headers: true,
            fallback_statuses: DEFAULT_FALLBACK_STATUSES.into_iter().collect(),
            classification: ClassificationPolicy::default(),
        }
    }
}

impl CheckConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 5] = [
            ("max_workers", self.max_workers as u64),
            ("batch_size", self.batch_size as u64),
            ("request_timeout_secs", self.request_timeout_secs),
            ("flush_every", self.flush_every as u64),
            ("flush_interval_secs", self.flush_interval_secs),
        ];

        for (option, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidOption {
                    option,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.fallback_statuses.is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "fallback_statuses",
                reason: "at least one status is required".to_string(),
            });
        }

        if let Some(status) = self
            .fallback_statuses
            .iter()
            .chain(&self.classification.broken_statuses)
            .chain(&self.classification.browser_only_statuses)
            .find(|s| !(100..=999).contains(*s))
        {
            return Err(ConfigError::InvalidOption {
                option: "classification",
                reason: format!("{} is not an HTTP status code", status),
            });
        }

        let overlap = self.classification.overlapping_statuses();
        if !overlap.is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "classification",
                reason: format!(
                    "statuses {:?} are both broken and browser-only",
                    overlap
                ),
            });
        }

        if let Some(domain) = self.domain_intervals.keys().find(|d| d.trim().is_empty()) {
            return Err(ConfigError::InvalidOption {
                option: "domain_intervals",
                reason: format!("empty domain name {:?}", domain),
            });
        }

        Ok(())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        match &self.checkpoint_path {
            Some(path) => path.clone(),
            None => {
                let mut name = self.output_path.clone().into_os_string();
                name.push(".checkpoint.json");
                PathBuf::from(name)
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn limiter(&self) -> DomainRateLimiter {
        self.domain_intervals.iter().fold(
            DomainRateLimiter::new(Duration::from_millis(self.default_domain_interval_ms)),
            |limiter, (domain, ms)| limiter.with_override(domain.as_str(), Duration::from_millis(*ms)),
        )
    }

    pub fn prober_config(&self) -> ProberConfig {
        ProberConfig {
            timeout: self.request_timeout(),
            browser_headers: self.browser_headers,
            fallback_statuses: self.fallback_statuses.clone(),
            ..ProberConfig::default()
        }
    }
}
