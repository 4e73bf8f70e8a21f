use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// HTTP method used for a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Head => "HEAD",
            ProbeMethod::Get => "GET",
        }
    }
}

/// Transport-level failure kinds. Timeouts are a separate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    DnsFailure,
    ConnectionRefused,
    TlsError,
    TooManyRedirects,
    InvalidUrl,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::DnsFailure => "DNS failure",
            NetworkErrorKind::ConnectionRefused => "connection refused",
            NetworkErrorKind::TlsError => "TLS error",
            NetworkErrorKind::TooManyRedirects => "too many redirects",
            NetworkErrorKind::InvalidUrl => "invalid URL",
            NetworkErrorKind::Other => "network error",
        }
    }

    /// A retry with another method cannot repair these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NetworkErrorKind::DnsFailure
                | NetworkErrorKind::ConnectionRefused
                | NetworkErrorKind::TooManyRedirects
                | NetworkErrorKind::InvalidUrl
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// 2xx or 3xx
    Success(u16),
    HttpError(u16),
    NetworkError(NetworkErrorKind),
    Timeout,
}

impl ProbeOutcome {
    pub fn from_status(status: u16) -> Self {
        if (200..400).contains(&status) {
            ProbeOutcome::Success(status)
        } else {
            ProbeOutcome::HttpError(status)
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Success(code) | ProbeOutcome::HttpError(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeOutcome::Timeout)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success(code) | ProbeOutcome::HttpError(code) => write!(f, "HTTP {}", code),
            ProbeOutcome::NetworkError(kind) => f.write_str(kind.as_str()),
            ProbeOutcome::Timeout => f.write_str("timeout"),
        }
    }
}

/// One network request made against a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeAttempt {
    pub url: String,
    pub method: ProbeMethod,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    /// Reason phrase or error text, kept for diagnostics only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub browser_headers: bool,
}

/// Every attempt made for one URL, HEAD first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeTrace {
    pub url: String,
    pub attempts: Vec<ProbeAttempt>,
}

impl ProbeTrace {
    pub fn final_attempt(&self) -> Option<&ProbeAttempt> {
        self.attempts.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    DefinitelyBroken,
    WorksInBrowser,
    MayWorkInBrowser,
    Ok,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::DefinitelyBroken,
        Category::WorksInBrowser,
        Category::MayWorkInBrowser,
        Category::Ok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DefinitelyBroken => "DEFINITELY_BROKEN",
            Category::WorksInBrowser => "WORKS_IN_BROWSER",
            Category::MayWorkInBrowser => "MAY_WORK_IN_BROWSER",
            Category::Ok => "OK",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::DefinitelyBroken => "DEFINITELY BROKEN",
            Category::WorksInBrowser => "WORKS IN BROWSER",
            Category::MayWorkInBrowser => "MAY WORK IN BROWSER",
            Category::Ok => "OK",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified URL, ready for checkpointing and reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub attempts: Vec<ProbeAttempt>,
    pub category: Category,
    pub referencing_documents: BTreeSet<String>,
}

impl ProbeResult {
    pub fn new(trace: ProbeTrace, category: Category, referencing_documents: BTreeSet<String>) -> Self {
        Self {
            url: trace.url,
            attempts: trace.attempts,
            category,
            referencing_documents,
        }
    }

    pub fn final_outcome(&self) -> Option<ProbeOutcome> {
        self.attempts.last().map(|a| a.outcome)
    }

    /// e.g. `HEAD: HTTP 403, GET: HTTP 200`
    pub fn attempt_chain(&self) -> String {
        if self.attempts.is_empty() {
            return "not probed".to_string();
        }

        self.attempts
            .iter()
            .map(|a| match a.reason.as_deref() {
                Some(reason) if a.outcome.status().is_some() && !reason.is_empty() => {
                    format!("{}: {} {}", a.method.as_str(), a.outcome, reason)
                }
                _ => format!("{}: {}", a.method.as_str(), a.outcome),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
