//! Maps probe attempts onto report categories.

use linkvet_scanner::result::{Category, NetworkErrorKind, ProbeAttempt, ProbeOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Status sets that decide between the non-OK categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationPolicy {
    /// Final statuses that mean the resource is gone
    pub broken_statuses: BTreeSet<u16>,
    /// Final statuses that typically clear up in a real browser session
    pub browser_only_statuses: BTreeSet<u16>,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            broken_statuses: [404, 410].into_iter().collect(),
            browser_only_statuses: [401, 403, 406].into_iter().collect(),
        }
    }
}

impl ClassificationPolicy {
    /// Statuses that appear in both sets
    pub fn overlapping_statuses(&self) -> Vec<u16> {
        self.broken_statuses
            .intersection(&self.browser_only_statuses)
            .copied()
            .collect()
    }
}

/// Classify the attempts made for one URL.
///
/// Only the last attempt decides, except that a timeout is definitive only
/// when every attempt timed out.
pub fn classify(attempts: &[ProbeAttempt], policy: &ClassificationPolicy) -> Category {
    let Some(last) = attempts.last() else {
        return Category::MayWorkInBrowser;
    };

    match last.outcome {
        ProbeOutcome::Success(_) => Category::Ok,
        ProbeOutcome::HttpError(status) if policy.broken_statuses.contains(&status) => {
            Category::DefinitelyBroken
        }
        ProbeOutcome::HttpError(status)
            if policy.browser_only_statuses.contains(&status) && last.browser_headers =>
        {
            Category::WorksInBrowser
        }
        ProbeOutcome::HttpError(_) => Category::MayWorkInBrowser,
        ProbeOutcome::NetworkError(
            NetworkErrorKind::DnsFailure
            | NetworkErrorKind::ConnectionRefused
            | NetworkErrorKind::InvalidUrl,
        ) => Category::DefinitelyBroken,
        ProbeOutcome::NetworkError(_) => Category::MayWorkInBrowser,
        ProbeOutcome::Timeout => {
            if attempts.iter().all(|a| a.outcome.is_timeout()) {
                Category::DefinitelyBroken
            } else {
                Category::MayWorkInBrowser
            }
        }
    }
}
