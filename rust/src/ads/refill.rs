use std::sync::Arc;
use std::thread;

use flume::{Receiver, Sender};

use super::{AdHandle, AdRotationRegistry, RequestDenied};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdLoadError {
    #[error("ad network unavailable: {0}")]
    Network(String),
    #[error("no fill")]
    NoFill,
    #[error("ad sdk error: {0}")]
    Sdk(String),
}

/// The host ad SDK as seen from the core. Blocking; always called from the
/// refill worker thread.
pub trait AdLoader<H: AdHandle>: Send + 'static {
    fn load(&self, count: usize) -> Result<Vec<H>, AdLoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    Loaded { added: usize },
    AlreadyLoading,
    Throttled,
    Saturated,
    /// The registry was cleared while the fetch ran; the batch was disposed.
    Stale { discarded: usize },
    Failed { reason: String },
}

/// Run one guarded fetch against `loader` and append whatever arrives.
pub fn refill<H, L>(registry: &AdRotationRegistry<H>, loader: &L) -> RefillOutcome
where
    H: AdHandle,
    L: AdLoader<H> + ?Sized,
{
    let ticket = match registry.try_begin_request() {
        Ok(ticket) => ticket,
        Err(RequestDenied::AlreadyLoading) => return RefillOutcome::AlreadyLoading,
        Err(RequestDenied::Throttled) => return RefillOutcome::Throttled,
        Err(RequestDenied::Saturated) => return RefillOutcome::Saturated,
    };

    let wanted = ticket.wanted;
    tracing::debug!(wanted, "requesting ads");
    match loader.load(wanted) {
        Ok(ads) => {
            let arrived = ads.len();
            match registry.complete_request(ticket, ads) {
                Some(added) => {
                    tracing::info!(added, wanted, "ads loaded");
                    RefillOutcome::Loaded { added }
                }
                None => RefillOutcome::Stale {
                    discarded: arrived,
                },
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "ad load failed");
            registry.abort_request(ticket);
            RefillOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

enum RefillMsg {
    Refill,
}

/// Single-threaded "ad actor" that owns the loader and serializes fetches.
///
/// Requests never block the caller. Outcomes are published on
/// [`outcomes`](Self::outcomes). Dropping the worker stops the thread once
/// pending requests drain.
pub struct RefillWorker<H: AdHandle> {
    registry: Arc<AdRotationRegistry<H>>,
    tx: Sender<RefillMsg>,
    outcome_rx: Receiver<RefillOutcome>,
}

impl<H: AdHandle> RefillWorker<H> {
    pub fn spawn(registry: Arc<AdRotationRegistry<H>>, loader: Box<dyn AdLoader<H>>) -> Self {
        let (tx, rx) = flume::unbounded::<RefillMsg>();
        let (outcome_tx, outcome_rx) = flume::unbounded();

        let registry_for_worker = registry.clone();
        thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    RefillMsg::Refill => {
                        let outcome = refill(&registry_for_worker, &*loader);
                        // Nobody listening is fine.
                        let _ = outcome_tx.send(outcome);
                    }
                }
            }
            tracing::debug!("ad refill worker stopped");
        });

        Self {
            registry,
            tx,
            outcome_rx,
        }
    }

    pub fn registry(&self) -> &Arc<AdRotationRegistry<H>> {
        &self.registry
    }

    /// Kick off the first fetch. Only the caller that wins the registry's
    /// initialization latch enqueues it; returns whether this call did.
    pub fn initialize(&self) -> bool {
        if !self.registry.try_mark_initialized() {
            return false;
        }
        self.request_refill();
        true
    }

    pub fn request_refill(&self) {
        let _ = self.tx.send(RefillMsg::Refill);
    }

    pub fn outcomes(&self) -> Receiver<RefillOutcome> {
        self.outcome_rx.clone()
    }
}
