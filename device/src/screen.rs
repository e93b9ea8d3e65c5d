use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::Result;
use crate::platform::{Platform, sdk};

pub const WAKE_LOCK_TAG: &str = "AutoCall:ScreenWakeLock";

struct WakeLock {
    generation: u64,
    expiry: JoinHandle<()>,
}

#[derive(Default)]
struct ScreenState {
    wake_lock: Option<WakeLock>,
    generation: u64,
}

struct Inner {
    platform: Arc<dyn Platform>,
    wake_lock_timeout: Duration,
    state: Mutex<ScreenState>,
}

/// Turns the screen on and gets the keyguard out of the way before a call.
///
/// The wake lock is modeled as "stay awake" on the device, released when the
/// timeout lapses or on [`ScreenManager::release_wake_lock`].
#[derive(Clone)]
pub struct ScreenManager {
    inner: Arc<Inner>,
}

impl ScreenManager {
    pub fn new(platform: Arc<dyn Platform>, wake_lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                wake_lock_timeout,
                state: Mutex::new(ScreenState::default()),
            }),
        }
    }

    /// Errors are logged here; a failed wake never blocks the call attempt.
    pub fn wake_up_and_unlock(&self) {
        tracing::debug!("waking up screen and unlocking");
        if let Err(e) = self.acquire_wake_lock() {
            tracing::error!(error = %e, "error acquiring wake lock");
        }

        match self.is_screen_locked() {
            Ok(true) => {
                tracing::debug!("screen is locked, attempting to unlock");
                if let Err(e) = self.unlock_screen() {
                    tracing::error!(error = %e, "error unlocking screen");
                }
            }
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "error reading lock state"),
        }
    }

    /// Every call wakes the screen; the stay-awake flag and its expiry are
    /// armed once per held lock.
    fn acquire_wake_lock(&self) -> Result<()> {
        let platform = &self.inner.platform;
        let mut state = self.state();
        platform.wake_screen()?;
        if state.wake_lock.is_some() {
            tracing::debug!("wake lock already held");
            return Ok(());
        }

        platform.set_stay_awake(true)?;

        state.generation += 1;
        let generation = state.generation;
        let timeout = self.inner.wake_lock_timeout;
        let manager = self.clone();
        let expiry = tokio::spawn(async move {
            time::sleep(timeout).await;
            manager.expire(generation);
        });
        state.wake_lock = Some(WakeLock { generation, expiry });
        tracing::debug!(tag = WAKE_LOCK_TAG, ?timeout, "wake lock acquired");
        Ok(())
    }

    fn expire(&self, generation: u64) {
        let mut state = self.state();
        if state.wake_lock.as_ref().map(|l| l.generation) != Some(generation) {
            return;
        }
        state.wake_lock = None;
        drop(state);
        self.stay_awake_off();
        tracing::debug!(tag = WAKE_LOCK_TAG, "wake lock timed out");
    }

    pub fn release_wake_lock(&self) {
        let Some(lock) = self.state().wake_lock.take() else {
            return;
        };
        lock.expiry.abort();
        self.stay_awake_off();
        tracing::debug!(tag = WAKE_LOCK_TAG, "wake lock released");
    }

    fn stay_awake_off(&self) {
        if let Err(e) = self.inner.platform.set_stay_awake(false) {
            tracing::error!(error = %e, "error releasing wake lock");
        }
    }

    /// A killed daemon never releases its lock; called at boot to turn
    /// stay-awake off unless this process holds one.
    pub fn clear_stale_stay_awake(&self) {
        if self.is_wake_lock_held() {
            return;
        }
        tracing::debug!("clearing stay-awake left from a previous run");
        self.stay_awake_off();
    }

    pub fn is_wake_lock_held(&self) -> bool {
        self.state().wake_lock.is_some()
    }

    fn is_screen_locked(&self) -> Result<bool> {
        let platform = &self.inner.platform;
        if platform.sdk_int() >= sdk::LOLLIPOP_MR1 {
            platform.is_device_locked()
        } else {
            platform.is_keyguard_locked()
        }
    }

    fn unlock_screen(&self) -> Result<()> {
        let platform = &self.inner.platform;
        if platform.sdk_int() >= sdk::O_MR1 {
            platform.dismiss_keyguard()?;
            tracing::debug!("requested keyguard dismiss");
        } else {
            platform.disable_keyguard()?;
            tracing::debug!("disabled keyguard");
        }
        Ok(())
    }

    pub fn cleanup(&self) {
        self.release_wake_lock();
    }

    fn state(&self) -> MutexGuard<'_, ScreenState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
