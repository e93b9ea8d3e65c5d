use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time;

use crate::api::PhoneApi;
use crate::call::CallManager;
use crate::config::Config;
use crate::error::Result;
use crate::notify::Notifier;
use crate::permissions::{self, PermissionReport};
use crate::platform::Platform;
use crate::prefs::PreferenceStore;
use crate::screen::ScreenManager;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PollOutcome {
    Number(String),
    Empty,
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PollRecord {
    pub at_unix_ms: u64,
    pub outcome: PollOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub api_url: String,
    pub call_active: bool,
    pub active_number: Option<String>,
    pub polls: u64,
    pub last_poll: Option<PollRecord>,
}

#[derive(Default)]
struct ServiceState {
    polling: Option<JoinHandle<()>>,
    pending_dial: Option<JoinHandle<()>>,
    polls: u64,
    last_poll: Option<PollRecord>,
}

/// Polls the configured endpoint and dials whatever number it hands out.
pub struct AutoCallService {
    polling_interval: Duration,
    wake_settle_delay: Duration,
    prefs: Arc<PreferenceStore>,
    platform: Arc<dyn Platform>,
    calls: CallManager,
    screen: ScreenManager,
    notifier: Notifier,
    state: Mutex<ServiceState>,
}

impl AutoCallService {
    pub fn new(config: &Config, prefs: Arc<PreferenceStore>, platform: Arc<dyn Platform>) -> Arc<Self> {
        Arc::new(Self {
            polling_interval: config.polling_interval,
            wake_settle_delay: config.wake_settle_delay,
            calls: CallManager::new(platform.clone(), config.hang_up_delay),
            screen: ScreenManager::new(platform.clone(), config.wake_lock_timeout),
            notifier: Notifier::new(platform.clone()),
            prefs,
            platform,
            state: Mutex::new(ServiceState::default()),
        })
    }

    /// Starting an already running service restarts polling with the current URL.
    pub fn start(self: &Arc<Self>) {
        tracing::info!("service started");
        self.notifier.update("Service started");
        if let Err(e) = self.prefs.set_service_running(true) {
            tracing::error!(error = %e, "failed to persist running flag");
        }

        let api = self.initialize_api();
        self.stop_polling();

        let service = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                service.poll_once(api.as_ref()).await;
                time::sleep(service.polling_interval).await;
            }
        });
        self.state().polling = Some(handle);
    }

    fn initialize_api(&self) -> Option<PhoneApi> {
        let url = self.prefs.api_url();
        tracing::debug!(url = %url, "initializing api service");
        match PhoneApi::new(&url) {
            Ok(api) => Some(api),
            Err(e) => {
                tracing::error!(error = %e, "error initializing api service");
                None
            }
        }
    }

    /// Boot-time entry: clears stay-awake left by a killed daemon, then
    /// resumes polling if the service was running when it went down.
    pub fn resume_if_needed(self: &Arc<Self>) -> bool {
        self.screen.clear_stale_stay_awake();
        if !self.prefs.is_service_running() {
            return false;
        }
        tracing::info!("service was running before, resuming");
        self.start();
        true
    }

    pub fn restart_if_running(self: &Arc<Self>) {
        if self.is_running() {
            self.start();
        }
    }

    pub fn stop(&self) {
        tracing::info!("service stopped");
        self.stop_polling();
        self.calls.cleanup();
        self.screen.cleanup();
        if let Err(e) = self.prefs.set_service_running(false) {
            tracing::error!(error = %e, "failed to persist running flag");
        }
        self.notifier.update("Service stopped");
    }

    fn stop_polling(&self) {
        let mut state = self.state();
        if let Some(polling) = state.polling.take() {
            polling.abort();
        }
        if let Some(dial) = state.pending_dial.take() {
            dial.abort();
        }
    }

    async fn poll_once(self: &Arc<Self>, api: Option<&PhoneApi>) {
        tracing::debug!("polling for phone number");
        self.notifier.update("Checking for calls...");

        let fetched = match api {
            Some(api) => api.fetch_phone_number().await,
            None => {
                tracing::error!("api service not initialized");
                Ok(None)
            }
        };

        let outcome = match fetched {
            Ok(Some(number)) => {
                tracing::info!(number = %number, "phone number received");
                self.notifier.update(format!("Calling: {number}"));
                self.make_phone_call(number.clone());
                PollOutcome::Number(number)
            }
            Ok(None) => {
                tracing::debug!("no phone number received");
                self.notifier.update("Waiting for calls...");
                PollOutcome::Empty
            }
            Err(e) => {
                tracing::error!(error = %e, "error in polling loop");
                self.notifier.update("Waiting for calls...");
                PollOutcome::Error(e.to_string())
            }
        };

        let mut state = self.state();
        state.polls += 1;
        state.last_poll = Some(PollRecord {
            at_unix_ms: unix_ms(),
            outcome,
        });
    }

    fn make_phone_call(self: &Arc<Self>, number: String) {
        self.screen.wake_up_and_unlock();

        let service = self.clone();
        let dial = tokio::spawn(async move {
            time::sleep(service.wake_settle_delay).await;
            match service.calls.make_call(&number) {
                Ok(()) => tracing::debug!(number = %number, "call initiated"),
                Err(e) => tracing::error!(number = %number, error = %e, "error making phone call"),
            }
        });
        if let Some(previous) = self.state().pending_dial.replace(dial) {
            previous.abort();
        }
    }

    pub fn hang_up(&self) -> Result<()> {
        self.calls.hang_up()
    }

    pub fn permissions(&self) -> PermissionReport {
        permissions::check(self.platform.as_ref())
    }

    pub fn request_permissions(&self) -> PermissionReport {
        permissions::request_missing(self.platform.as_ref())
    }

    pub fn prefs(&self) -> &PreferenceStore {
        &self.prefs
    }

    pub fn is_running(&self) -> bool {
        self.state().polling.is_some()
    }

    pub fn status(&self) -> ServiceStatus {
        let call = self.calls.active_call();
        let state = self.state();
        ServiceStatus {
            running: state.polling.is_some(),
            api_url: self.prefs.api_url(),
            call_active: call.is_some(),
            active_number: call.map(|c| c.number),
            polls: state.polls,
            last_poll: state.last_poll.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
