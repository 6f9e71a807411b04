//! UniFFI surface consumed by the iOS and Android shells.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::account::{self, AccountLinker, DiagnosticsSink, LinkAccountResult, LinkError};
use crate::ads::{AdHandle, AdLoadError, AdLoader, AdRotationRegistry, RefillOutcome, RefillWorker};
use crate::assistants::{self, AssistantChoice, AssistantEntry, LinkLauncher, PackageQuery};
use crate::config::{self, AppConfig};
use crate::leaderboard::{self, LeaderboardEntry, LeaderboardSummary};
use crate::logging;
use crate::prefs::JsonFileStore;
use crate::retention::{self, RetentionReminder};
use crate::search::SearchQuery;

/// Host ad SDK. Creatives stay on the host side; the core tracks them by id.
#[uniffi::export(callback_interface)]
pub trait HostAdBridge: Send + Sync + 'static {
    /// Load up to `count` native ads and return the ids of those that loaded.
    fn load_ads(&self, count: u32) -> Vec<String>;
    fn dispose_ad(&self, ad_id: String);
}

#[uniffi::export(callback_interface)]
pub trait AdRefillObserver: Send + Sync + 'static {
    fn on_refill(&self, update: AdRefillUpdate);
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AdRefillUpdate {
    Loaded { added: u32 },
    AlreadyLoading,
    Throttled,
    Saturated,
    Stale { discarded: u32 },
    Failed { reason: String },
}

impl From<RefillOutcome> for AdRefillUpdate {
    fn from(outcome: RefillOutcome) -> Self {
        match outcome {
            RefillOutcome::Loaded { added } => AdRefillUpdate::Loaded {
                added: u32::try_from(added).unwrap_or(u32::MAX),
            },
            RefillOutcome::AlreadyLoading => AdRefillUpdate::AlreadyLoading,
            RefillOutcome::Throttled => AdRefillUpdate::Throttled,
            RefillOutcome::Saturated => AdRefillUpdate::Saturated,
            RefillOutcome::Stale { discarded } => AdRefillUpdate::Stale {
                discarded: u32::try_from(discarded).unwrap_or(u32::MAX),
            },
            RefillOutcome::Failed { reason } => AdRefillUpdate::Failed { reason },
        }
    }
}

struct HostAd {
    id: String,
    bridge: Arc<dyn HostAdBridge>,
}

impl AdHandle for HostAd {
    fn dispose(&self) {
        self.bridge.dispose_ad(self.id.clone());
    }
}

struct HostAdLoader {
    bridge: Arc<dyn HostAdBridge>,
}

impl AdLoader<HostAd> for HostAdLoader {
    fn load(&self, count: usize) -> Result<Vec<HostAd>, AdLoadError> {
        let ids = self
            .bridge
            .load_ads(u32::try_from(count).unwrap_or(u32::MAX));
        if ids.is_empty() {
            return Err(AdLoadError::NoFill);
        }
        Ok(ids
            .into_iter()
            .map(|id| HostAd {
                id,
                bridge: self.bridge.clone(),
            })
            .collect())
    }
}

#[derive(uniffi::Object)]
pub struct FfiAdRegistry {
    worker: RefillWorker<HostAd>,
    ads_enabled: bool,
    listening: AtomicBool,
}

#[uniffi::export]
impl FfiAdRegistry {
    #[uniffi::constructor]
    pub fn new(data_dir: String, bridge: Box<dyn HostAdBridge>) -> Arc<Self> {
        logging::init_logging(&data_dir);
        let config = config::load_app_config(&data_dir);
        let policy = config.registry_policy();
        tracing::info!(
            target_count = policy.target_count,
            min_request_interval_ms = policy.min_request_interval_ms,
            ads_enabled = config.ads_enabled(),
            "FfiAdRegistry::new()"
        );

        let bridge: Arc<dyn HostAdBridge> = Arc::from(bridge);
        let registry = Arc::new(AdRotationRegistry::new(policy));
        let worker = RefillWorker::spawn(registry, Box::new(HostAdLoader { bridge }));
        Arc::new(Self {
            worker,
            ads_enabled: config.ads_enabled(),
            listening: AtomicBool::new(false),
        })
    }

    /// Start the first fetch. Returns true only for the call that did.
    pub fn initialize(&self) -> bool {
        if !self.ads_enabled {
            return false;
        }
        self.worker.initialize()
    }

    pub fn request_refill(&self) {
        if self.ads_enabled {
            self.worker.request_refill();
        }
    }

    pub fn listen_for_refills(&self, observer: Box<dyn AdRefillObserver>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let rx = self.worker.outcomes();
        thread::spawn(move || {
            while let Ok(outcome) = rx.recv() {
                observer.on_refill(outcome.into());
            }
        });
    }

    pub fn next_for_rotation(&self) -> Option<String> {
        self.worker
            .registry()
            .next_for_rotation()
            .map(|ad| ad.id.clone())
    }

    pub fn at_index(&self, index: u32) -> Option<String> {
        self.worker
            .registry()
            .at_index(index as usize)
            .map(|ad| ad.id.clone())
    }

    pub fn for_position(&self, key: String) -> Option<String> {
        self.worker
            .registry()
            .for_position(&key)
            .map(|ad| ad.id.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.worker.registry().is_loading()
    }

    pub fn valid_count(&self) -> u32 {
        self.worker.registry().valid_count() as u32
    }

    pub fn target_count(&self) -> u32 {
        self.worker.registry().target_count() as u32
    }

    pub fn clear(&self) {
        self.worker.registry().clear();
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct RetentionAckResult {
    pub ok: bool,
    pub error_message: Option<String>,
}

#[derive(uniffi::Object)]
pub struct FfiRetentionReminder {
    reminder: RetentionReminder,
}

#[uniffi::export]
impl FfiRetentionReminder {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        let config: AppConfig = config::load_app_config(&data_dir);
        let store = Arc::new(JsonFileStore::open(&data_dir));
        Arc::new(Self {
            reminder: RetentionReminder::new(store, config.remind_after_days()),
        })
    }

    pub fn should_show_today(&self) -> bool {
        self.reminder
            .should_show(retention::epoch_day_now())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "retention reminder check failed");
                false
            })
    }

    pub fn acknowledge(&self, retention_days: Option<u32>) -> RetentionAckResult {
        match self.reminder.acknowledge(retention_days) {
            Ok(()) => RetentionAckResult {
                ok: true,
                error_message: None,
            },
            Err(e) => RetentionAckResult {
                ok: false,
                error_message: Some(e.to_string()),
            },
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.reminder.retention_days()
    }

    pub fn retention_choices(&self) -> Vec<u32> {
        retention::RETENTION_CHOICES.to_vec()
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct HostLinkResponse {
    pub linked: bool,
    /// Set when the host caught an unexpected failure during lookup.
    pub error_message: Option<String>,
}

#[uniffi::export(callback_interface)]
pub trait HostAccountLinker: Send + Sync + 'static {
    fn link(&self, token: String) -> HostLinkResponse;
}

#[uniffi::export(callback_interface)]
pub trait HostDiagnostics: Send + Sync + 'static {
    fn record_error(&self, context: String, message: String);
}

struct LinkerAdapter(Box<dyn HostAccountLinker>);

impl AccountLinker for LinkerAdapter {
    fn link(&self, token: &str) -> Result<bool, LinkError> {
        let response = self.0.link(token.to_string());
        match response.error_message {
            Some(message) => Err(LinkError::Unexpected(message)),
            None => Ok(response.linked),
        }
    }
}

struct DiagnosticsAdapter(Box<dyn HostDiagnostics>);

impl DiagnosticsSink for DiagnosticsAdapter {
    fn record_error(&self, context: &str, message: &str) {
        self.0.record_error(context.to_string(), message.to_string());
    }
}

#[uniffi::export]
pub fn link_account(
    linker: Box<dyn HostAccountLinker>,
    diagnostics: Box<dyn HostDiagnostics>,
    token: Option<String>,
) -> LinkAccountResult {
    account::link_account(
        &LinkerAdapter(linker),
        &DiagnosticsAdapter(diagnostics),
        token.as_deref(),
    )
}

struct InstalledPackages(HashSet<String>);

impl PackageQuery for InstalledPackages {
    fn is_installed(&self, package_id: &str) -> bool {
        self.0.contains(package_id)
    }
}

#[uniffi::export]
pub fn assistant_catalog() -> Vec<AssistantEntry> {
    assistants::default_catalog()
}

/// Catalog entries whose package appears in `installed_package_ids`.
#[uniffi::export]
pub fn available_assistants(installed_package_ids: Vec<String>) -> Vec<AssistantEntry> {
    let installed = InstalledPackages(installed_package_ids.into_iter().collect());
    assistants::available(&assistants::default_catalog(), &installed)
}

#[uniffi::export(callback_interface)]
pub trait HostLinkLauncher: Send + Sync + 'static {
    fn open_url(&self, url: String);
}

struct LauncherAdapter(Box<dyn HostLinkLauncher>);

impl LinkLauncher for LauncherAdapter {
    fn open_url(&self, url: &str) {
        self.0.open_url(url.to_string());
    }
}

/// Offer the installed assistants, or open the web fallback when none are.
#[uniffi::export]
pub fn choose_assistant(
    installed_package_ids: Vec<String>,
    launcher: Box<dyn HostLinkLauncher>,
) -> AssistantChoice {
    let installed = InstalledPackages(installed_package_ids.into_iter().collect());
    assistants::choose(
        &assistants::default_catalog(),
        &installed,
        &LauncherAdapter(launcher),
    )
}

#[uniffi::export]
pub fn summarize_leaderboard(entries: Vec<LeaderboardEntry>, user_id: String) -> LeaderboardSummary {
    leaderboard::summarize(&entries, &user_id)
}

#[uniffi::export]
pub fn normalize_search_query(raw: String) -> String {
    SearchQuery::new(&raw).normalized()
}

#[uniffi::export]
pub fn search_matches(query: String, text: String) -> bool {
    SearchQuery::new(&query).matches(&text)
}

#[uniffi::export]
pub fn default_config_json() -> String {
    config::default_app_config_json()
}
