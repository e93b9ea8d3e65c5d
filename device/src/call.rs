use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::{Error, Result};
use crate::permissions::{ANSWER_PHONE_CALLS, CALL_PHONE};
use crate::platform::{Platform, sdk};

#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub number: String,
    pub placed_at: Instant,
}

#[derive(Default)]
struct CallState {
    active: Option<ActiveCall>,
    /// Bumped per placed call so a timer can tell whether its call is still current.
    generation: u64,
    hang_up: Option<JoinHandle<()>>,
}

struct Inner {
    platform: Arc<dyn Platform>,
    hang_up_after: Duration,
    state: Mutex<CallState>,
}

/// Places calls and ends each one automatically after `hang_up_after`.
#[derive(Clone)]
pub struct CallManager {
    inner: Arc<Inner>,
}

impl CallManager {
    pub fn new(platform: Arc<dyn Platform>, hang_up_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                hang_up_after,
                state: Mutex::new(CallState::default()),
            }),
        }
    }

    /// Must be called from within the tokio runtime; the hang-up timer is a task.
    pub fn make_call(&self, number: &str) -> Result<()> {
        if !self.inner.platform.permission_granted(CALL_PHONE)? {
            tracing::error!("CALL_PHONE permission not granted");
            return Err(Error::PermissionDenied("CALL_PHONE"));
        }

        tracing::debug!(number, "making call");
        self.inner.platform.place_call(number)?;

        let mut state = self.state();
        state.active = Some(ActiveCall {
            number: number.to_string(),
            placed_at: Instant::now(),
        });
        state.generation += 1;
        self.schedule_auto_hang_up(&mut state);
        Ok(())
    }

    fn schedule_auto_hang_up(&self, state: &mut CallState) {
        if let Some(stale) = state.hang_up.take() {
            stale.abort();
        }
        let generation = state.generation;
        let delay = self.inner.hang_up_after;
        let manager = self.clone();
        state.hang_up = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            manager.auto_hang_up(generation);
        }));
    }

    fn auto_hang_up(&self, generation: u64) {
        {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(generation, "stale hang-up timer ignored");
                return;
            }
            // This task is the handle's owner; drop it rather than abort ourselves.
            state.hang_up.take();
        }
        if let Err(e) = self.hang_up() {
            tracing::error!(error = %e, "auto hang-up failed");
        }
    }

    /// The call is considered over even if ending it failed.
    pub fn hang_up(&self) -> Result<()> {
        let mut state = self.state();
        let Some(call) = state.active.take() else {
            tracing::debug!("no active call to hang up");
            return Ok(());
        };

        tracing::debug!(number = %call.number, elapsed = ?call.placed_at.elapsed(), "attempting to hang up call");
        let result = self.end_call();
        if let Some(timer) = state.hang_up.take() {
            timer.abort();
        }
        result
    }

    fn end_call(&self) -> Result<()> {
        let platform = &self.inner.platform;
        if platform.sdk_int() >= sdk::P {
            if !platform.permission_granted(ANSWER_PHONE_CALLS)? {
                tracing::error!("ANSWER_PHONE_CALLS permission not granted");
                return Err(Error::PermissionDenied("ANSWER_PHONE_CALLS"));
            }
            platform.end_call()?;
            tracing::debug!("call ended using telecom");
        } else {
            platform.end_call_legacy()?;
            tracing::debug!("call ended using telephony binder");
        }
        Ok(())
    }

    pub fn cancel_auto_hang_up(&self) {
        if let Some(timer) = self.state().hang_up.take() {
            timer.abort();
        }
    }

    pub fn cleanup(&self) {
        let mut state = self.state();
        if let Some(timer) = state.hang_up.take() {
            timer.abort();
        }
        state.active = None;
    }

    pub fn is_call_active(&self) -> bool {
        self.state().active.is_some()
    }

    pub fn active_call(&self) -> Option<ActiveCall> {
        self.state().active.clone()
    }

    fn state(&self) -> MutexGuard<'_, CallState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{Event, FakePlatform};

    const DELAY: Duration = Duration::from_secs(20);

    fn manager(platform: FakePlatform) -> (Arc<FakePlatform>, CallManager) {
        let platform = Arc::new(platform);
        let calls = CallManager::new(platform.clone(), DELAY);
        (platform, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn hangs_up_after_delay() {
        let (platform, calls) = manager(FakePlatform::fully_granted(34));
        calls.make_call("13800138000").unwrap();
        assert!(calls.is_call_active());
        assert_eq!(calls.active_call().unwrap().number, "13800138000");

        time::sleep(Duration::from_secs(19)).await;
        assert_eq!(platform.count(&Event::EndCall), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(platform.count(&Event::EndCall), 1);
        assert!(!calls.is_call_active());
    }

    #[tokio::test(start_paused = true)]
    async fn new_call_cancels_stale_timer() {
        let (platform, calls) = manager(FakePlatform::fully_granted(34));
        calls.make_call("111").unwrap();
        time::sleep(Duration::from_secs(10)).await;
        calls.make_call("222").unwrap();

        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(platform.count(&Event::EndCall), 0);
        assert_eq!(calls.active_call().unwrap().number, "222");

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(platform.count(&Event::EndCall), 1);
        assert!(!calls.is_call_active());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_hang_up_cancels_timer() {
        let (platform, calls) = manager(FakePlatform::fully_granted(34));
        calls.make_call("111").unwrap();
        calls.hang_up().unwrap();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(platform.count(&Event::EndCall), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_leaves_call_up() {
        let (platform, calls) = manager(FakePlatform::fully_granted(34));
        calls.make_call("111").unwrap();
        calls.cancel_auto_hang_up();
        time::sleep(Duration::from_secs(30)).await;
        assert!(calls.is_call_active());
        assert_eq!(platform.count(&Event::EndCall), 0);
    }

    #[tokio::test]
    async fn refuses_without_call_permission() {
        let (platform, calls) = manager(FakePlatform::new(34));
        assert!(matches!(calls.make_call("111"), Err(Error::PermissionDenied("CALL_PHONE"))));
        assert!(platform.events().is_empty());
        assert!(!calls.is_call_active());
    }

    #[tokio::test]
    async fn missing_answer_permission_still_clears_call() {
        let platform = FakePlatform::new(30);
        platform.grant(CALL_PHONE);
        let (platform, calls) = manager(platform);
        calls.make_call("111").unwrap();
        assert!(matches!(calls.hang_up(), Err(Error::PermissionDenied("ANSWER_PHONE_CALLS"))));
        assert!(!calls.is_call_active());
        assert_eq!(platform.count(&Event::EndCall), 0);
    }

    #[tokio::test]
    async fn pre_p_uses_legacy_path() {
        let platform = FakePlatform::new(26);
        platform.grant(CALL_PHONE);
        let (platform, calls) = manager(platform);
        calls.make_call("111").unwrap();
        calls.hang_up().unwrap();
        assert_eq!(platform.count(&Event::EndCallLegacy), 1);
    }

    #[tokio::test]
    async fn hang_up_without_call_is_noop() {
        let (platform, calls) = manager(FakePlatform::fully_granted(34));
        calls.hang_up().unwrap();
        assert!(platform.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_call_and_timer() {
        let (platform, calls) = manager(FakePlatform::fully_granted(34));
        calls.make_call("111").unwrap();
        calls.cleanup();
        time::sleep(Duration::from_secs(30)).await;
        assert!(!calls.is_call_active());
        assert_eq!(platform.count(&Event::EndCall), 0);
    }
}
