//! Native ad inventory: the rotation registry and the worker that refills it.

mod refill;
mod registry;

pub use refill::{refill, AdLoadError, AdLoader, RefillOutcome, RefillWorker};
pub use registry::{
    AdRotationRegistry, RegistryPolicy, RequestDenied, RequestTicket,
    DEFAULT_MIN_REQUEST_INTERVAL_MS, DEFAULT_TARGET_COUNT,
};

/// A loaded, displayable ad creative owned by the host ad SDK.
pub trait AdHandle: Send + Sync + 'static {
    /// Release the creative. Called exactly once, when the registry drops it
    /// or discards a batch that arrived after `clear`.
    fn dispose(&self);
}
