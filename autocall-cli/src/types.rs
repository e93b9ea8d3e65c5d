use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct ApiUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PollOutcome {
    Number(String),
    Empty,
    Error(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollRecord {
    pub at_unix_ms: u64,
    pub outcome: PollOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub api_url: String,
    pub call_active: bool,
    pub active_number: Option<String>,
    pub polls: u64,
    pub last_poll: Option<PollRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionState {
    pub name: String,
    pub granted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionReport {
    pub permissions: Vec<PermissionState>,
    pub overlay: bool,
    pub battery_optimization_disabled: bool,
}
