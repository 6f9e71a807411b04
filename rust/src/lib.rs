mod account;
mod ads;
mod assistants;
mod clock;
mod config;
mod error;
mod ffi;
mod leaderboard;
mod logging;
mod prefs;
mod retention;
mod search;

pub use account::{AccountLinker, DiagnosticsSink, LinkAccountResult, LinkError, LinkErrorKind};
pub use ads::*;
pub use assistants::{
    available, choose, default_catalog, AssistantChoice, AssistantEntry, LinkLauncher,
    PackageQuery,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{load_app_config, AppConfig, CONFIG_FILE_NAME};
pub use error::{DiagError, Result};
pub use ffi::*;
pub use leaderboard::{summarize, LeaderboardEntry, LeaderboardSummary};
pub use logging::init_logging;
pub use prefs::{JsonFileStore, KeyValueStore, MemoryStore, PREFS_FILE_NAME};
pub use retention::*;
pub use search::SearchQuery;

uniffi::setup_scaffolding!();
