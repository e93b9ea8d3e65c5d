use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DIR: &str = "/data/local/tmp/autocall";
pub const DEFAULT_PORT: u16 = 21633;
/// Package whose permission state stands in for ours; the daemon runs as shell.
pub const DEFAULT_PACKAGE: &str = "com.android.shell";

pub const POLLING_INTERVAL: Duration = Duration::from_secs(30);
pub const AUTO_HANG_UP_DELAY: Duration = Duration::from_secs(20);
pub const WAKE_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const WAKE_LOCK_TIMEOUT: Duration = Duration::from_secs(60);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    pub dir: PathBuf,
    pub port: u16,
    pub package: String,
    pub log_filter: String,
    pub polling_interval: Duration,
    pub hang_up_delay: Duration,
    pub wake_settle_delay: Duration,
    pub wake_lock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR),
            port: DEFAULT_PORT,
            package: DEFAULT_PACKAGE.to_string(),
            log_filter: "debug".to_string(),
            polling_interval: POLLING_INTERVAL,
            hang_up_delay: AUTO_HANG_UP_DELAY,
            wake_settle_delay: WAKE_SETTLE_DELAY,
            wake_lock_timeout: WAKE_LOCK_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("AUTOCALL_DIR").filter(|d| !d.is_empty()) {
            config.dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("AUTOCALL_PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(package) = lookup("AUTOCALL_PACKAGE").filter(|p| !p.is_empty()) {
            config.package = package;
        }
        if let Some(filter) = lookup("AUTOCALL_LOG").filter(|f| !f.is_empty()) {
            config.log_filter = filter;
        }
        config
    }

    pub fn prefs_path(&self) -> PathBuf {
        self.dir.join("prefs.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join("autocall.log")
    }
}
