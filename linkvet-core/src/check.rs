//! Batch scheduler for probing extracted links.
//!
//! Pending URLs are split into batches. Each batch is fed through a bounded
//! channel to a fixed set of worker tasks. A worker probes each URL through
//! the shared domain limiter (one slot per HTTP attempt), classifies it, and
//! hands the result to a single collector task that owns the checkpoint. The checkpoint is flushed on a
//! cadence and at every batch boundary.

use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::classify::{ClassificationPolicy, classify};
use crate::config::CheckConfig;
use crate::error::{CheckError, PersistenceError};
use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use linkvet_scanner::extract::LinkReference;
use linkvet_scanner::limiter::{DomainRateLimiter, domain_of};
use linkvet_scanner::prober::Prober;
use linkvet_scanner::result::{Category, ProbeResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Options for configuring a check run
pub struct CheckOptions {
    pub config: CheckConfig,
    pub show_progress_bars: bool,
}

/// Callback invoked with each result as soon as it is classified
pub type CheckProgressCallback = Arc<dyn Fn(&ProbeResult) + Send + Sync>;

#[derive(Debug)]
pub enum CheckOutcome {
    /// Every pending URL was probed
    Completed(CheckpointState),
    /// Cancellation was requested; the state holds everything finished so far
    Interrupted(CheckpointState),
}

impl CheckOutcome {
    pub fn state(&self) -> &CheckpointState {
        match self {
            CheckOutcome::Completed(state) | CheckOutcome::Interrupted(state) => state,
        }
    }

    pub fn into_state(self) -> CheckpointState {
        match self {
            CheckOutcome::Completed(state) | CheckOutcome::Interrupted(state) => state,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, CheckOutcome::Interrupted(_))
    }
}

enum CheckpointMsg {
    Result(Box<ProbeResult>),
    /// Flush now; the sender is answered only if the flush succeeded
    Flush(oneshot::Sender<()>),
}

struct WorkerContext {
    prober: Prober,
    limiter: DomainRateLimiter,
    policy: ClassificationPolicy,
    results: mpsc::Sender<CheckpointMsg>,
    shutdown: watch::Receiver<bool>,
    progress_bar: Option<ProgressBar>,
    progress_callback: Option<CheckProgressCallback>,
}

/// Probe every link not yet recorded in `state`.
///
/// Setting `shutdown` to `true` stops dispatch; probes already in flight run
/// to completion and are recorded before the final checkpoint flush.
pub async fn execute_check(
    links: &BTreeMap<String, LinkReference>,
    state: CheckpointState,
    store: CheckpointStore,
    options: CheckOptions,
    shutdown: watch::Receiver<bool>,
    progress_callback: Option<CheckProgressCallback>,
) -> Result<CheckOutcome, CheckError> {
    let CheckOptions {
        config,
        show_progress_bars,
    } = options;

    config.validate()?;
    let prober = Prober::new(config.prober_config())?;

    let pending = schedule_order(links.values().filter(|l| !state.is_processed(&l.url)));
    let already_checked = state.len();

    info!(
        "Checking {} URL(s) ({} already checked) with {} worker(s), batches of {}",
        pending.len(),
        already_checked,
        config.max_workers,
        config.batch_size
    );

    let progress_bar = if show_progress_bars && !pending.is_empty() {
        let pb = ProgressBar::new(pending.len() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    } else {
        None
    };

    let (results_tx, results_rx) = mpsc::channel(config.max_workers.max(1) * 4);
    let collector = tokio::spawn(run_collector(
        state,
        store,
        results_rx,
        config.flush_every,
        config.flush_interval(),
    ));

    let context = Arc::new(WorkerContext {
        prober,
        limiter: config.limiter(),
        policy: config.classification.clone(),
        results: results_tx.clone(),
        shutdown: shutdown.clone(),
        progress_bar: progress_bar.clone(),
        progress_callback,
    });

    let mut interrupted = false;
    let batch_count = pending.len().div_ceil(config.batch_size);

    for (index, batch) in pending.chunks(config.batch_size).enumerate() {
        if *shutdown.borrow() {
            interrupted = true;
            break;
        }

        debug!("Batch {}/{}: {} URL(s)", index + 1, batch_count, batch.len());

        let (url_tx, url_rx) = mpsc::channel::<LinkReference>(config.max_workers);
        let url_rx = Arc::new(Mutex::new(url_rx));

        let workers: Vec<_> = (0..config.max_workers.min(batch.len()))
            .map(|worker_id| tokio::spawn(run_worker(worker_id, url_rx.clone(), context.clone())))
            .collect();

        let mut cancel = shutdown.clone();
        for link in batch {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    interrupted = true;
                    break;
                }
                sent = url_tx.send(link.clone()) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(url_tx);

        try_join_all(workers).await?;

        let (ack_tx, ack_rx) = oneshot::channel();
        if results_tx.send(CheckpointMsg::Flush(ack_tx)).await.is_err() || ack_rx.await.is_err() {
            // The collector stopped; its error surfaces below
            break;
        }

        if interrupted || *shutdown.borrow() {
            interrupted = true;
            break;
        }
    }

    drop(results_tx);
    drop(context);
    let state = collector.await??;

    if let Some(pb) = progress_bar {
        if interrupted {
            pb.abandon_with_message("interrupted");
        } else {
            pb.finish_with_message("done");
        }
    }

    if interrupted {
        warn!(
            "Check interrupted after {} of {} URL(s)",
            state.len(),
            links.len()
        );
        Ok(CheckOutcome::Interrupted(state))
    } else {
        info!("Check complete: {} URL(s) classified", state.len());
        Ok(CheckOutcome::Completed(state))
    }
}

async fn run_worker(
    worker_id: usize,
    urls: Arc<Mutex<mpsc::Receiver<LinkReference>>>,
    context: Arc<WorkerContext>,
) {
    loop {
        let next = { urls.lock().await.recv().await };
        let Some(link) = next else {
            break;
        };

        if *context.shutdown.borrow() {
            break;
        }

        let trace = context.prober.probe_paced(&link.url, &context.limiter).await;
        let category = classify(&trace.attempts, &context.policy);
        let result = ProbeResult::new(trace, category, link.source_documents);

        if category == Category::DefinitelyBroken {
            warn!("Broken link {} ({})", result.url, result.attempt_chain());
        } else {
            debug!("Worker {}: {} -> {}", worker_id, result.url, category);
        }

        if let Some(ref callback) = context.progress_callback {
            callback(&result);
        }

        if context
            .results
            .send(CheckpointMsg::Result(Box::new(result)))
            .await
            .is_err()
        {
            break;
        }

        if let Some(ref pb) = context.progress_bar {
            pb.inc(1);
        }
    }
}

async fn run_collector(
    mut state: CheckpointState,
    store: CheckpointStore,
    mut messages: mpsc::Receiver<CheckpointMsg>,
    flush_every: usize,
    flush_interval: Duration,
) -> Result<CheckpointState, PersistenceError> {
    let mut unflushed = 0usize;
    let mut last_flush = Instant::now();

    loop {
        let message = tokio::select! {
            message = messages.recv() => message,
            _ = tokio::time::sleep_until(last_flush + flush_interval), if unflushed > 0 => {
                store.flush(&state)?;
                unflushed = 0;
                last_flush = Instant::now();
                continue;
            }
        };

        let Some(message) = message else {
            break;
        };

        match message {
            CheckpointMsg::Result(result) => {
                if state.record(*result) {
                    unflushed += 1;
                }
                if unflushed >= flush_every {
                    store.flush(&state)?;
                    unflushed = 0;
                    last_flush = Instant::now();
                }
            }
            CheckpointMsg::Flush(ack) => {
                store.flush(&state)?;
                unflushed = 0;
                last_flush = Instant::now();
                let _ = ack.send(());
            }
        }
    }

    store.flush(&state)?;
    Ok(state)
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Order links round-robin across domains, domains and URLs both sorted.
pub fn schedule_order<'a>(links: impl IntoIterator<Item = &'a LinkReference>) -> Vec<LinkReference> {
    let mut by_domain: BTreeMap<String, VecDeque<LinkReference>> = BTreeMap::new();
    for link in links {
        let domain = domain_of(&link.url).unwrap_or_default();
        by_domain.entry(domain).or_default().push_back(link.clone());
    }

    let mut ordered = Vec::new();
    while !by_domain.is_empty() {
        by_domain.retain(|_, queue| {
            if let Some(link) = queue.pop_front() {
                ordered.push(link);
            }
            !queue.is_empty()
        });
    }
    ordered
}
