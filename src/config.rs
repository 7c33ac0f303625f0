use std::path::PathBuf;
use std::time::Duration;

use crate::payment::PaymentFailurePolicy;
use crate::policy::RECONCILE_INTERVAL;

/// Daemon settings, read from `PARKD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub reconcile_interval: Duration,
    pub compact_threshold: u64,
    pub seed_file: Option<PathBuf>,
    pub payment_failure_policy: PaymentFailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            reconcile_interval: RECONCILE_INTERVAL,
            compact_threshold: 1000,
            seed_file: None,
            payment_failure_policy: PaymentFailurePolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; malformed values are errors.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();
        let parsed = |key: &str| -> Option<String> {
            get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        let reconcile_secs: Option<u64> = parse(&parsed, "PARKD_RECONCILE_INTERVAL_SECS")?;
        if reconcile_secs == Some(0) {
            return Err("PARKD_RECONCILE_INTERVAL_SECS must be positive".into());
        }

        Ok(Self {
            data_dir: parsed("PARKD_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            metrics_port: parse(&parsed, "PARKD_METRICS_PORT")?,
            reconcile_interval: reconcile_secs
                .map_or(defaults.reconcile_interval, Duration::from_secs),
            compact_threshold: parse(&parsed, "PARKD_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            seed_file: parsed("PARKD_SEED_FILE").map(PathBuf::from),
            payment_failure_policy: parse(&parsed, "PARKD_PAYMENT_FAILURE_POLICY")?
                .unwrap_or(defaults.payment_failure_policy),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| raw.parse().map_err(|e| format!("invalid {key}={raw:?}: {e}")))
        .transpose()
}
