use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://example.com/api/phone";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Prefs {
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default)]
    service_running: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            service_running: false,
        }
    }
}

/// The two persisted settings, written through to a JSON file on every change.
pub struct PreferenceStore {
    path: PathBuf,
    prefs: Mutex<Prefs>,
}

impl PreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "unreadable prefs, using defaults");
                Prefs::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Prefs::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read prefs, using defaults");
                Prefs::default()
            }
        };
        Self {
            path,
            prefs: Mutex::new(prefs),
        }
    }

    pub fn api_url(&self) -> String {
        self.lock().api_url.clone()
    }

    pub fn set_api_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
                reason: "empty".into(),
            });
        }
        self.update(|p| p.api_url = url.to_string())
    }

    pub fn is_service_running(&self) -> bool {
        self.lock().service_running
    }

    pub fn set_service_running(&self, running: bool) -> Result<()> {
        self.update(|p| p.service_running = running)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Prefs> {
        self.prefs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut Prefs)) -> Result<()> {
        let mut prefs = self.lock();
        f(&mut prefs);
        persist(&self.path, &prefs)
    }
}

fn persist(path: &Path, prefs: &Prefs) -> Result<()> {
    let json = serde_json::to_vec_pretty(prefs).map_err(|e| Error::Prefs(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn scratch_path(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static NEXT: AtomicU32 = AtomicU32::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir()
        .join(format!("autocall-test-{}-{n}", std::process::id()))
        .join(name)
}
