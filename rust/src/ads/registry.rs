use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::AdHandle;
use crate::clock::{Clock, MonotonicClock};

/// Minimum spacing between two permitted ad fetches.
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 5_000;

/// Desired number of loaded creatives kept on hand.
pub const DEFAULT_TARGET_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicy {
    pub min_request_interval_ms: u64,
    pub target_count: usize,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
            target_count: DEFAULT_TARGET_COUNT,
        }
    }
}

struct RegistryState<H> {
    // Load order. `None` is a slot whose creative never arrived.
    ads: Vec<Option<Arc<H>>>,
    loading: bool,
    rotation_cursor: usize,
    last_request_ms: Option<u64>,
    // Bumped by `clear`; a fetch started under an older value is stale.
    generation: u64,
}

impl<H> RegistryState<H> {
    fn empty() -> Self {
        Self {
            ads: Vec::new(),
            loading: false,
            rotation_cursor: 0,
            last_request_ms: None,
            generation: 0,
        }
    }

    fn valid_count(&self) -> usize {
        self.ads.iter().filter(|slot| slot.is_some()).count()
    }

    fn valid_at(&self, n: usize) -> Option<Arc<H>> {
        self.ads.iter().flatten().nth(n).cloned()
    }

    fn pick(&self, selector: u64) -> Option<Arc<H>> {
        let count = self.valid_count();
        if count == 0 {
            return None;
        }
        self.valid_at((selector % count as u64) as usize)
    }
}

/// A fetch admitted by [`AdRotationRegistry::try_begin_request`]. Hand it back
/// through [`complete_request`](AdRotationRegistry::complete_request) or
/// [`abort_request`](AdRotationRegistry::abort_request).
#[derive(Debug, PartialEq, Eq)]
pub struct RequestTicket {
    pub wanted: usize,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDenied {
    AlreadyLoading,
    Throttled,
    Saturated,
}

/// In-memory inventory of loaded ad creatives.
///
/// Serves creatives through three selection policies:
/// - [`next_for_rotation`](Self::next_for_rotation): cycles through the
///   inventory in load order, advancing on every call;
/// - [`at_index`](Self::at_index): stable lookup by slot index;
/// - [`for_position`](Self::for_position): stable lookup by a caller key such
///   as a list row identifier.
///
/// All selections are taken modulo the number of present creatives at call
/// time and return `None` when there are none.
///
/// The request throttle and the loading flag are advisory: the registry
/// answers questions, the caller decides whether to fetch.
/// [`try_begin_request`](Self::try_begin_request) bundles those checks for
/// fetchers that want them applied atomically.
pub struct AdRotationRegistry<H: AdHandle> {
    // Separate from `state` so init races never wait on selection.
    initialized: Mutex<bool>,
    state: Mutex<RegistryState<H>>,
    policy: RegistryPolicy,
    clock: Arc<dyn Clock>,
}

impl<H: AdHandle> AdRotationRegistry<H> {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self::with_clock(policy, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(policy: RegistryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            initialized: Mutex::new(false),
            state: Mutex::new(RegistryState::empty()),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    /// Flip the initialization latch. Only the caller that performs the
    /// false→true transition sees `true`, until [`clear`](Self::clear).
    pub fn try_mark_initialized(&self) -> bool {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return false;
        }
        *initialized = true;
        true
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.lock().loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// True when no fetch was recorded yet or the minimum interval has passed
    /// since the last one.
    pub fn can_request(&self) -> bool {
        let last = self.state.lock().last_request_ms;
        self.interval_elapsed(last)
    }

    fn interval_elapsed(&self, last_request_ms: Option<u64>) -> bool {
        match last_request_ms {
            None => true,
            Some(last) => {
                self.clock.now_ms().saturating_sub(last) >= self.policy.min_request_interval_ms
            }
        }
    }

    /// Admit a fetch in one critical section: refuse while loading, inside the
    /// throttle interval or at target; otherwise stamp the request, set
    /// `loading` and return how many creatives to ask for.
    pub fn try_begin_request(&self) -> Result<RequestTicket, RequestDenied> {
        let mut state = self.state.lock();
        if state.loading {
            return Err(RequestDenied::AlreadyLoading);
        }
        if !self.interval_elapsed(state.last_request_ms) {
            return Err(RequestDenied::Throttled);
        }
        let wanted = self.policy.target_count.saturating_sub(state.valid_count());
        if wanted == 0 {
            return Err(RequestDenied::Saturated);
        }
        state.last_request_ms = Some(self.clock.now_ms());
        state.loading = true;
        Ok(RequestTicket {
            wanted,
            generation: state.generation,
        })
    }

    /// Append the batch for `ticket` and drop the loading flag.
    ///
    /// If [`clear`](Self::clear) ran since the ticket was issued the batch is
    /// disposed instead, `loading` is left as `clear` set it, and `None` is
    /// returned.
    pub fn complete_request(&self, ticket: RequestTicket, ads: Vec<H>) -> Option<usize> {
        {
            let mut state = self.state.lock();
            if state.generation == ticket.generation {
                let added = ads.len();
                state.ads.extend(ads.into_iter().map(|ad| Some(Arc::new(ad))));
                state.loading = false;
                return Some(added);
            }
        }
        for ad in &ads {
            ad.dispose();
        }
        tracing::debug!(discarded = ads.len(), "dropping ads loaded before clear");
        None
    }

    /// Release `ticket` after a failed fetch. The throttle stamp stays.
    pub fn abort_request(&self, ticket: RequestTicket) {
        let mut state = self.state.lock();
        if state.generation == ticket.generation {
            state.loading = false;
        }
    }

    pub fn record_request(&self) {
        let now = self.clock.now_ms();
        self.state.lock().last_request_ms = Some(now);
    }

    pub fn push(&self, ad: H) {
        self.push_slot(Some(ad));
    }

    /// Append a slot in load order. `None` records a creative that failed to
    /// arrive; it is skipped by every selection.
    pub fn push_slot(&self, ad: Option<H>) {
        self.state.lock().ads.push(ad.map(Arc::new));
    }

    pub fn extend<I>(&self, ads: I)
    where
        I: IntoIterator<Item = H>,
    {
        let mut state = self.state.lock();
        state.ads.extend(ads.into_iter().map(|ad| Some(Arc::new(ad))));
    }

    /// Number of slots, including empty ones.
    pub fn len(&self) -> usize {
        self.state.lock().ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().ads.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.state.lock().valid_count()
    }

    pub fn target_count(&self) -> usize {
        self.policy.target_count
    }

    /// How many more creatives the fetcher should ask for.
    pub fn deficit(&self) -> usize {
        self.policy.target_count.saturating_sub(self.valid_count())
    }

    /// Pick the creative under the rotation cursor and advance it.
    ///
    /// Not idempotent: call once per logical display, never from a redraw path.
    pub fn next_for_rotation(&self) -> Option<Arc<H>> {
        let mut state = self.state.lock();
        let picked = state.pick(state.rotation_cursor as u64)?;
        state.rotation_cursor = state.rotation_cursor.wrapping_add(1);
        Some(picked)
    }

    pub fn at_index(&self, index: usize) -> Option<Arc<H>> {
        self.state.lock().pick(index as u64)
    }

    /// Stable creative for a caller-supplied key. The same key maps to the
    /// same creative for as long as the inventory is unchanged.
    pub fn for_position(&self, key: &str) -> Option<Arc<H>> {
        let hash = position_hash(key);
        self.state.lock().pick(hash)
    }

    /// Dispose every creative and return to the freshly constructed state.
    pub fn clear(&self) {
        let drained = {
            let mut initialized = self.initialized.lock();
            let mut state = self.state.lock();
            *initialized = false;
            let generation = state.generation.wrapping_add(1);
            let old = std::mem::replace(&mut *state, RegistryState::empty());
            state.generation = generation;
            old.ads
        };

        let mut disposed = 0usize;
        for ad in drained.into_iter().flatten() {
            ad.dispose();
            disposed += 1;
        }
        tracing::debug!(disposed, "ad registry cleared");
    }
}

impl<H: AdHandle> Drop for AdRotationRegistry<H> {
    fn drop(&mut self) {
        for ad in self.state.get_mut().ads.drain(..).flatten() {
            ad.dispose();
        }
    }
}

impl<H: AdHandle> std::fmt::Debug for AdRotationRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdRotationRegistry")
            .field("slots", &state.ads.len())
            .field("valid", &state.valid_count())
            .field("loading", &state.loading)
            .field("rotation_cursor", &state.rotation_cursor)
            .field("policy", &self.policy)
            .finish()
    }
}

fn position_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;

    #[derive(Debug)]
    struct TestAd {
        name: &'static str,
        disposed: Arc<AtomicUsize>,
    }

    impl AdHandle for TestAd {
        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ad(name: &'static str, disposed: &Arc<AtomicUsize>) -> TestAd {
        TestAd {
            name,
            disposed: disposed.clone(),
        }
    }

    fn registry_with(names: &[&'static str]) -> (AdRotationRegistry<TestAd>, Arc<AtomicUsize>) {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = AdRotationRegistry::new(RegistryPolicy::default());
        registry.extend(names.iter().map(|n| ad(n, &disposed)));
        (registry, disposed)
    }

    fn name(ad: Option<Arc<TestAd>>) -> Option<&'static str> {
        ad.map(|a| a.name)
    }

    #[test]
    fn rotation_cycles_in_load_order() {
        let (registry, _) = registry_with(&["A", "B", "C"]);
        assert_eq!(name(registry.next_for_rotation()), Some("A"));
        assert_eq!(name(registry.next_for_rotation()), Some("B"));
        assert_eq!(name(registry.next_for_rotation()), Some("C"));
        assert_eq!(name(registry.next_for_rotation()), Some("A"));
    }

    #[test]
    fn rotation_kth_call_is_k_mod_n() {
        let names = ["A", "B", "C", "D", "E"];
        let (registry, _) = registry_with(&names);
        for k in 0..23 {
            assert_eq!(name(registry.next_for_rotation()), Some(names[k % names.len()]));
        }
    }

    #[test]
    fn empty_registry_selects_nothing() {
        let (registry, _) = registry_with(&[]);
        assert!(registry.next_for_rotation().is_none());
        assert!(registry.at_index(2).is_none());
        assert!(registry.for_position("list_5").is_none());
    }

    #[test]
    fn empty_rotation_does_not_advance_cursor() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = AdRotationRegistry::new(RegistryPolicy::default());
        assert!(registry.next_for_rotation().is_none());
        registry.extend([ad("A", &disposed), ad("B", &disposed)]);
        assert_eq!(name(registry.next_for_rotation()), Some("A"));
    }

    #[test]
    fn absent_slots_are_skipped() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = AdRotationRegistry::new(RegistryPolicy::default());
        registry.push_slot(None);
        registry.push(ad("A", &disposed));
        registry.push_slot(None);
        registry.push(ad("B", &disposed));

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.valid_count(), 2);
        assert_eq!(name(registry.at_index(0)), Some("A"));
        assert_eq!(name(registry.at_index(1)), Some("B"));
        assert_eq!(name(registry.at_index(3)), Some("B"));
        assert_eq!(name(registry.next_for_rotation()), Some("A"));
        assert_eq!(name(registry.next_for_rotation()), Some("B"));
    }

    #[test]
    fn at_index_is_idempotent_and_leaves_cursor_alone() {
        let (registry, _) = registry_with(&["A", "B", "C"]);
        assert_eq!(name(registry.at_index(4)), Some("B"));
        assert_eq!(name(registry.at_index(4)), Some("B"));
        assert_eq!(name(registry.next_for_rotation()), Some("A"));
    }

    #[test]
    fn for_position_is_stable_per_key() {
        let (registry, _) = registry_with(&["A", "B", "C"]);
        for i in 0..20 {
            let key = format!("list_{i}");
            let first = name(registry.for_position(&key));
            assert!(first.is_some());
            assert_eq!(first, name(registry.for_position(&key)));
        }
    }

    #[test]
    fn for_position_spreads_distinct_keys() {
        let (registry, _) = registry_with(&["A", "B", "C"]);
        let mut seen = std::collections::HashSet::new();
        for i in 0..32 {
            seen.insert(name(registry.for_position(&format!("list_{i}"))));
        }
        assert!(seen.len() >= 2, "32 keys all mapped to one ad");
    }

    #[test]
    fn position_hash_is_fixed() {
        assert_eq!(position_hash("x"), position_hash("x"));
        assert_ne!(position_hash("list_1"), position_hash("list_2"));
    }

    #[test]
    fn init_latch_flips_once_until_clear() {
        let (registry, _) = registry_with(&[]);
        assert!(registry.try_mark_initialized());
        assert!(!registry.try_mark_initialized());
        assert!(registry.is_initialized());
        registry.clear();
        assert!(!registry.is_initialized());
        assert!(registry.try_mark_initialized());
    }

    #[test]
    fn init_latch_has_single_winner_across_threads() {
        let registry: Arc<AdRotationRegistry<TestAd>> =
            Arc::new(AdRotationRegistry::new(RegistryPolicy::default()));
        let barrier = Arc::new(Barrier::new(16));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if registry.try_mark_initialized() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_throttle_respects_interval() {
        let clock = ManualClock::new(1_000);
        let registry: AdRotationRegistry<TestAd> =
            AdRotationRegistry::with_clock(RegistryPolicy::default(), Arc::new(clock.clone()));

        assert!(registry.can_request());
        registry.record_request();
        assert!(!registry.can_request());
        clock.advance_ms(4_999);
        assert!(!registry.can_request());
        clock.advance_ms(1);
        assert!(registry.can_request());
    }

    #[test]
    fn loading_flag_last_writer_wins() {
        let (registry, _) = registry_with(&[]);
        assert!(!registry.is_loading());
        registry.set_loading(true);
        registry.set_loading(true);
        assert!(registry.is_loading());
        registry.set_loading(false);
        assert!(!registry.is_loading());
    }

    #[test]
    fn deficit_tracks_target() {
        let (registry, _) = registry_with(&["A", "B"]);
        assert_eq!(registry.target_count(), 6);
        assert_eq!(registry.deficit(), 4);
        registry.push_slot(None);
        assert_eq!(registry.deficit(), 4);
    }

    #[test]
    fn clear_disposes_everything_and_resets() {
        let clock = ManualClock::new(0);
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry =
            AdRotationRegistry::with_clock(RegistryPolicy::default(), Arc::new(clock.clone()));
        registry.extend([ad("A", &disposed), ad("B", &disposed)]);
        registry.push_slot(None);
        registry.try_mark_initialized();
        registry.set_loading(true);
        registry.record_request();
        registry.next_for_rotation();

        registry.clear();

        assert_eq!(disposed.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
        assert!(!registry.is_loading());
        assert!(registry.can_request());
        assert!(registry.next_for_rotation().is_none());
        assert!(registry.at_index(0).is_none());
        assert!(registry.for_position("x").is_none());
        assert!(registry.try_mark_initialized());

        registry.push(ad("C", &disposed));
        assert_eq!(name(registry.next_for_rotation()), Some("C"));
    }

    #[test]
    fn drop_disposes_remaining_ads() {
        let (registry, disposed) = registry_with(&["A", "B", "C"]);
        drop(registry);
        assert_eq!(disposed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn begin_request_admits_one_fetch_at_a_time() {
        let clock = ManualClock::new(0);
        let registry: AdRotationRegistry<TestAd> =
            AdRotationRegistry::with_clock(RegistryPolicy::default(), Arc::new(clock.clone()));

        let ticket = registry.try_begin_request().unwrap();
        assert_eq!(ticket.wanted, 6);
        assert!(registry.is_loading());
        assert!(!registry.can_request());
        assert_eq!(
            registry.try_begin_request(),
            Err(RequestDenied::AlreadyLoading)
        );

        registry.abort_request(ticket);
        assert!(!registry.is_loading());
        assert_eq!(registry.try_begin_request(), Err(RequestDenied::Throttled));

        clock.advance_ms(DEFAULT_MIN_REQUEST_INTERVAL_MS);
        let disposed = Arc::new(AtomicUsize::new(0));
        let ticket = registry.try_begin_request().unwrap();
        let batch = (0..6).map(|_| ad("A", &disposed)).collect();
        assert_eq!(registry.complete_request(ticket, batch), Some(6));
        assert!(!registry.is_loading());

        clock.advance_ms(DEFAULT_MIN_REQUEST_INTERVAL_MS);
        assert_eq!(registry.try_begin_request(), Err(RequestDenied::Saturated));
    }

    #[test]
    fn concurrent_begin_request_has_single_winner() {
        let registry: Arc<AdRotationRegistry<TestAd>> =
            Arc::new(AdRotationRegistry::new(RegistryPolicy::default()));
        let barrier = Arc::new(Barrier::new(8));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                let admitted = admitted.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if registry.try_begin_request().is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_ticket_after_clear_is_disposed_and_leaves_new_fetch_alone() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = AdRotationRegistry::new(RegistryPolicy::default());
        let old = registry.try_begin_request().unwrap();
        registry.clear();

        let fresh = registry.try_begin_request().unwrap();
        registry.abort_request(old);
        assert!(registry.is_loading());

        let stale_batch = vec![ad("A", &disposed), ad("B", &disposed)];
        let old_again = RequestTicket {
            wanted: 2,
            generation: 0,
        };
        assert_eq!(registry.complete_request(old_again, stale_batch), None);
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
        assert_eq!(registry.valid_count(), 0);
        assert!(registry.is_loading());

        assert_eq!(
            registry.complete_request(fresh, vec![ad("C", &disposed)]),
            Some(1)
        );
        assert_eq!(name(registry.next_for_rotation()), Some("C"));
    }
}
