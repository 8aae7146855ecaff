use crate::api::espn_api::ESPN_BASE_URL;
use crate::utils::lock::{LockPolicy, DEFAULT_LOCK_DAY};
use crate::utils::reconcile::ReconcileOptions;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by the web server and the CLI.
/// Every flag can also come from the environment (or a `.env` file).
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Address the web server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: String,

    /// JSON snapshot file backing the store
    #[arg(long, env = "DATA_FILE", default_value = "cache/pickem.json")]
    pub data_file: PathBuf,

    /// Bearer token required on admin routes; unset disables the check
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    #[arg(long, env = "ESPN_BASE_URL", default_value = ESPN_BASE_URL)]
    pub espn_base_url: String,

    /// Maximum provider requests in flight during reconciliation
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = 4)]
    pub reconcile_concurrency: usize,

    /// Per-request timeout against the provider, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Offset (hours east of UTC) used to decide which day a kickoff falls on
    #[arg(long, env = "LOCK_UTC_OFFSET_HOURS", default_value_t = -5, allow_negative_numbers = true)]
    pub lock_utc_offset_hours: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            data_file: PathBuf::from("cache/pickem.json"),
            admin_token: None,
            espn_base_url: ESPN_BASE_URL.to_string(),
            reconcile_concurrency: 4,
            fetch_timeout_secs: 10,
            lock_utc_offset_hours: -5,
        }
    }
}

impl AppConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn lock_policy(&self) -> Result<LockPolicy> {
        LockPolicy::new(DEFAULT_LOCK_DAY, self.lock_utc_offset_hours).with_context(|| {
            format!(
                "LOCK_UTC_OFFSET_HOURS out of range: {}",
                self.lock_utc_offset_hours
            )
        })
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            concurrency: self.reconcile_concurrency.max(1),
            fetch_timeout: self.fetch_timeout(),
        }
    }
}

/// Load `.env` and install the tracing subscriber (RUST_LOG, default `info`)
pub fn init_logging() {
    dotenv::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
