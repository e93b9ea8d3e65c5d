use serde::Serialize;

use crate::error::Result;
use crate::platform::{Platform, sdk};

pub const CALL_PHONE: &str = "android.permission.CALL_PHONE";
pub const READ_PHONE_STATE: &str = "android.permission.READ_PHONE_STATE";
pub const WAKE_LOCK: &str = "android.permission.WAKE_LOCK";
pub const FOREGROUND_SERVICE: &str = "android.permission.FOREGROUND_SERVICE";
pub const INTERNET: &str = "android.permission.INTERNET";
pub const ANSWER_PHONE_CALLS: &str = "android.permission.ANSWER_PHONE_CALLS";
pub const USE_FULL_SCREEN_INTENT: &str = "android.permission.USE_FULL_SCREEN_INTENT";
pub const POST_NOTIFICATIONS: &str = "android.permission.POST_NOTIFICATIONS";
pub const FOREGROUND_SERVICE_PHONE_CALL: &str = "android.permission.FOREGROUND_SERVICE_PHONE_CALL";

pub fn required_permissions(sdk_int: u32) -> Vec<&'static str> {
    let mut permissions = vec![
        CALL_PHONE,
        READ_PHONE_STATE,
        WAKE_LOCK,
        FOREGROUND_SERVICE,
        INTERNET,
    ];
    if sdk_int >= sdk::P {
        permissions.push(ANSWER_PHONE_CALLS);
    }
    if sdk_int >= sdk::Q {
        permissions.push(USE_FULL_SCREEN_INTENT);
    }
    if sdk_int >= sdk::TIRAMISU {
        permissions.push(POST_NOTIFICATIONS);
    }
    if sdk_int >= sdk::UPSIDE_DOWN_CAKE {
        permissions.push(FOREGROUND_SERVICE_PHONE_CALL);
    }
    permissions
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionState {
    pub name: &'static str,
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionReport {
    pub permissions: Vec<PermissionState>,
    pub overlay: bool,
    pub battery_optimization_disabled: bool,
}

impl PermissionReport {
    pub fn has_all_permissions(&self) -> bool {
        self.permissions.iter().all(|p| p.granted)
    }

    /// Everything the service needs before it is allowed to start.
    pub fn all_granted(&self) -> bool {
        self.has_all_permissions() && self.overlay && self.battery_optimization_disabled
    }

    pub fn missing(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.permissions.iter().filter(|p| !p.granted).map(|p| p.name)
    }
}

/// Failed lookups count as not granted.
pub fn check(platform: &dyn Platform) -> PermissionReport {
    let sdk_int = platform.sdk_int();
    let permissions = required_permissions(sdk_int)
        .into_iter()
        .map(|name| PermissionState {
            name,
            granted: granted_or_log(name, platform.permission_granted(name)),
        })
        .collect();
    let (overlay, battery_optimization_disabled) = if sdk_int >= sdk::M {
        (
            granted_or_log("overlay", platform.can_draw_overlays()),
            granted_or_log("battery optimization", platform.is_ignoring_battery_optimizations()),
        )
    } else {
        (true, true)
    };
    PermissionReport {
        permissions,
        overlay,
        battery_optimization_disabled,
    }
}

fn granted_or_log(what: &str, result: Result<bool>) -> bool {
    result.unwrap_or_else(|e| {
        tracing::warn!(permission = what, error = %e, "permission lookup failed");
        false
    })
}

/// Requests the first missing group, in order: runtime permissions, overlay,
/// battery optimization. Returns the report after the attempt.
pub fn request_missing(platform: &dyn Platform) -> PermissionReport {
    let report = check(platform);
    if !report.has_all_permissions() {
        for name in report.missing() {
            match platform.grant_permission(name) {
                Ok(()) => tracing::info!(permission = name, "permission granted"),
                Err(e) => tracing::warn!(permission = name, error = %e, "permission grant refused"),
            }
        }
    } else if !report.overlay {
        if let Err(e) = platform.grant_overlay() {
            tracing::warn!(error = %e, "overlay grant failed");
        }
    } else if !report.battery_optimization_disabled {
        if let Err(e) = platform.disable_battery_optimization() {
            tracing::warn!(error = %e, "battery optimization whitelist failed");
        }
    }
    check(platform)
}
