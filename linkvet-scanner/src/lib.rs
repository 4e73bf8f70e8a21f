pub mod error;
pub mod extract;
pub mod limiter;
pub mod prober;
pub mod result;

pub use error::ScanError;
pub use extract::{DocumentCollection, Extraction, ExtractionIssue, LinkKind, LinkReference, LocalReference};
pub use limiter::{DomainPolicy, DomainRateLimiter, domain_of};
pub use prober::{Prober, ProberConfig};
pub use result::{Category, NetworkErrorKind, ProbeAttempt, ProbeMethod, ProbeOutcome, ProbeResult, ProbeTrace};
