use std::process::Command;

use crate::error::{Error, Result};
use crate::notify::Notification;
use crate::platform::Platform;

const FLAG_ACTIVITY_NEW_TASK: &str = "0x10000000";
/// `ITelephony.endCall` transaction on the releases that still exposed it.
const LEGACY_END_CALL_TRANSACTION: &str = "5";
const OVERLAY_OP: &str = "SYSTEM_ALERT_WINDOW";

/// Drives the device through the shell tools available to the shell uid.
pub struct ShellPlatform {
    sdk_int: u32,
    package: String,
}

impl ShellPlatform {
    pub fn new(sdk_int: u32, package: impl Into<String>) -> Self {
        Self {
            sdk_int,
            package: package.into(),
        }
    }
}

impl Platform for ShellPlatform {
    fn sdk_int(&self) -> u32 {
        self.sdk_int
    }

    fn permission_granted(&self, permission: &str) -> Result<bool> {
        let dump = run("dumpsys", &["package", &self.package])?;
        Ok(permission_granted_in(&dump, permission))
    }

    fn grant_permission(&self, permission: &str) -> Result<()> {
        run("pm", &["grant", &self.package, permission]).map(drop)
    }

    fn can_draw_overlays(&self) -> Result<bool> {
        let out = run("appops", &["get", &self.package, OVERLAY_OP])?;
        Ok(appop_allowed(&out, OVERLAY_OP))
    }

    fn grant_overlay(&self) -> Result<()> {
        run("appops", &["set", &self.package, OVERLAY_OP, "allow"]).map(drop)
    }

    fn is_ignoring_battery_optimizations(&self) -> Result<bool> {
        let out = run("dumpsys", &["deviceidle", "whitelist"])?;
        Ok(idle_whitelisted(&out, &self.package))
    }

    fn disable_battery_optimization(&self) -> Result<()> {
        run("dumpsys", &["deviceidle", "whitelist", &format!("+{}", self.package)]).map(drop)
    }

    fn place_call(&self, number: &str) -> Result<()> {
        let uri = tel_uri(number);
        let out = run(
            "am",
            &[
                "start",
                "-a",
                "android.intent.action.CALL",
                "-d",
                &uri,
                "-f",
                FLAG_ACTIVITY_NEW_TASK,
            ],
        )?;
        if let Some(line) = out.lines().find(|l| l.starts_with("Error")) {
            return Err(Error::Command {
                command: "am start".into(),
                message: line.trim().to_string(),
            });
        }
        Ok(())
    }

    fn end_call(&self) -> Result<()> {
        run("input", &["keyevent", "KEYCODE_ENDCALL"]).map(drop)
    }

    fn end_call_legacy(&self) -> Result<()> {
        run("service", &["call", "phone", LEGACY_END_CALL_TRANSACTION]).map(drop)
    }

    fn wake_screen(&self) -> Result<()> {
        run("input", &["keyevent", "KEYCODE_WAKEUP"]).map(drop)
    }

    fn set_stay_awake(&self, on: bool) -> Result<()> {
        run("svc", &["power", "stayon", if on { "true" } else { "false" }]).map(drop)
    }

    fn is_device_locked(&self) -> Result<bool> {
        let out = run("dumpsys", &["trust"])?;
        Ok(device_locked_in(&out))
    }

    fn is_keyguard_locked(&self) -> Result<bool> {
        let out = run("dumpsys", &["window", "policy"])?;
        Ok(keyguard_showing_in(&out))
    }

    fn dismiss_keyguard(&self) -> Result<()> {
        run("wm", &["dismiss-keyguard"]).map(drop)
    }

    fn disable_keyguard(&self) -> Result<()> {
        // Menu dismisses an insecure keyguard on pre-O_MR1 builds.
        run("input", &["keyevent", "KEYCODE_MENU"]).map(drop)
    }

    fn post_notification(&self, notification: &Notification) -> Result<()> {
        run(
            "cmd",
            &[
                "notification",
                "post",
                "-S",
                "bigtext",
                "-t",
                notification.title,
                &notification.tag(),
                &notification.text,
            ],
        )
        .map(drop)
    }
}

fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program).args(args).output().map_err(|e| Error::Command {
        command: format_command(program, args),
        message: e.to_string(),
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Command {
            command: format_command(program, args),
            message: format!("{} {} {}", output.status, stdout.trim(), stderr.trim())
                .trim()
                .to_string(),
        });
    }
    Ok(stdout)
}

fn format_command(program: &str, args: &[&str]) -> String {
    let mut out = String::from(program);
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}

/// `#` ends the URI's scheme-specific part, so it has to be escaped.
fn tel_uri(number: &str) -> String {
    let mut uri = String::from("tel:");
    for c in number.trim().chars() {
        match c {
            '#' => uri.push_str("%23"),
            ' ' => {}
            c => uri.push(c),
        }
    }
    uri
}

/// Matches `android.permission.X: granted=true` lines from `dumpsys package`.
fn permission_granted_in(dump: &str, permission: &str) -> bool {
    dump.lines().any(|line| {
        line.trim()
            .strip_prefix(permission)
            .and_then(|rest| rest.strip_prefix(": "))
            .is_some_and(|rest| rest.starts_with("granted=true"))
    })
}

fn appop_allowed(out: &str, op: &str) -> bool {
    out.lines().any(|line| {
        line.trim()
            .strip_prefix(op)
            .and_then(|rest| rest.strip_prefix(": "))
            .is_some_and(|mode| mode.starts_with("allow"))
    })
}

/// Lines look like `user,com.example,10123` or `system-excidle,com.android.shell,2000`.
fn idle_whitelisted(out: &str, package: &str) -> bool {
    out.lines()
        .filter_map(|line| line.trim().split(',').nth(1))
        .any(|pkg| pkg == package)
}

fn device_locked_in(out: &str) -> bool {
    let users: Vec<&str> = out.lines().filter(|l| l.contains("deviceLocked=")).collect();
    users
        .iter()
        .find(|l| l.contains("(current)"))
        .or(users.first())
        .is_some_and(|l| l.contains("deviceLocked=1"))
}

fn keyguard_showing_in(out: &str) -> bool {
    out.split_whitespace().any(|token| {
        matches!(
            token.trim_end_matches(','),
            "showing=true" | "mShowingLockscreen=true" | "isStatusBarKeyguard=true"
        )
    })
}
