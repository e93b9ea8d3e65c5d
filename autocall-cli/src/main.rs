use anyhow::{Result, bail};
use argh::FromArgs;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::client::{Client, StartOutcome};
use crate::types::{PermissionReport, PollOutcome, ServiceStatus};

mod assets;
mod client;
mod runner;
mod types;

/// Auto call service CLI
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

fn socket_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME not set"))?;
    Ok(PathBuf::from(format!("{home}/.local/state/autocall.sock")))
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Start(StartCmd),
    Status(StatusCmd),
    SetUrl(SetUrlCmd),
    ServiceStart(ServiceStartCmd),
    ServiceStop(ServiceStopCmd),
    HangUp(HangUpCmd),
    Permissions(PermissionsCmd),
    Version(VersionCmd),
}

/// deploy and start the autocall daemon on device
#[derive(FromArgs)]
#[argh(subcommand, name = "start")]
struct StartCmd {}

/// show service status
#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
struct StatusCmd {
    /// print raw json
    #[argh(switch)]
    json: bool,
}

/// set the phone number endpoint
#[derive(FromArgs)]
#[argh(subcommand, name = "set-url")]
struct SetUrlCmd {
    #[argh(positional)]
    url: String,
}

/// start polling
#[derive(FromArgs)]
#[argh(subcommand, name = "service-start")]
struct ServiceStartCmd {
    /// start even if permissions are missing
    #[argh(switch)]
    force: bool,
}

/// stop polling
#[derive(FromArgs)]
#[argh(subcommand, name = "service-stop")]
struct ServiceStopCmd {}

/// end the current call now
#[derive(FromArgs)]
#[argh(subcommand, name = "hang-up")]
struct HangUpCmd {}

/// show permission state
#[derive(FromArgs)]
#[argh(subcommand, name = "permissions")]
struct PermissionsCmd {
    /// grant whatever is missing
    #[argh(switch)]
    request: bool,
}

/// print version
#[derive(FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCmd {}

/// Check if the daemon is reachable; if not, deploy and start it.
async fn ensure_server(socket: &Path) -> Result<Client> {
    if socket.exists() {
        let client = Client::new(socket.to_path_buf())?;
        if client.status().await.is_ok() {
            return Ok(client);
        }
        eprintln!("debug: socket exists but daemon is not responding, restarting...");
    } else {
        eprintln!("debug: socket not found, starting daemon...");
    }

    runner::start(socket)?;
    wait_ready(socket).await
}

/// Daemon was spawned on device; poll until it answers.
async fn wait_ready(socket: &Path) -> Result<Client> {
    let client = Client::new(socket.to_path_buf())?;
    let mut delay_ms = 1u64;
    let mut total_ms = 0u64;
    loop {
        if client.status().await.is_ok() {
            eprintln!("debug: daemon ready after {total_ms}ms");
            return Ok(client);
        }
        if total_ms >= 30000 {
            bail!("daemon did not become ready after 30s");
        }
        delay_ms = (delay_ms * 2).min(1000);
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        total_ms += delay_ms;
    }
}

fn render_status(status: &ServiceStatus) -> String {
    let mut out = String::new();
    let state = if status.running { "Running" } else { "Stopped" };
    let _ = writeln!(out, "Service Status: {state}");
    let _ = writeln!(out, "API URL: {}", status.api_url);
    match (&status.active_number, status.call_active) {
        (Some(number), true) => {
            let _ = writeln!(out, "Call: active ({number})");
        }
        _ => {
            let _ = writeln!(out, "Call: idle");
        }
    }
    let _ = write!(out, "Polls: {}", status.polls);
    if let Some(last) = &status.last_poll {
        let outcome = match &last.outcome {
            PollOutcome::Number(number) => format!("number {number}"),
            PollOutcome::Empty => "no number".to_string(),
            PollOutcome::Error(message) => format!("error: {message}"),
        };
        let _ = write!(out, " (last at {}ms: {outcome})", last.at_unix_ms);
    }
    out
}

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

fn render_permissions(report: &PermissionReport) -> String {
    let basic = report.permissions.iter().all(|p| p.granted);
    let mut out = String::new();
    let _ = writeln!(out, "Basic Permissions: {}", mark(basic));
    for p in &report.permissions {
        let _ = writeln!(out, "  {} {}", mark(p.granted), p.name);
    }
    let _ = writeln!(out, "Overlay Permission: {}", mark(report.overlay));
    let _ = write!(
        out,
        "Battery Optimization: {}",
        if report.battery_optimization_disabled {
            "Disabled ✓"
        } else {
            "Enabled ✗"
        }
    );
    out
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let socket = socket_path()?;

    // Handle commands that don't need a client
    if let Command::Start(_) = &cli.command {
        runner::start(&socket)?;
        wait_ready(&socket).await?;
        return Ok(());
    }
    if let Command::Version(_) = &cli.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let client = ensure_server(&socket).await?;

    match cli.command {
        Command::Status(cmd) => {
            let status = client.status().await?;
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", render_status(&status));
            }
        }
        Command::SetUrl(cmd) => {
            if cmd.url.trim().is_empty() {
                bail!("please enter a valid url");
            }
            client.set_api_url(&cmd.url).await?;
            eprintln!("api url saved");
        }
        Command::ServiceStart(cmd) => match client.start_service(cmd.force).await? {
            StartOutcome::Started => eprintln!("service started"),
            StartOutcome::MissingPermissions(report) => {
                eprintln!("{}", render_permissions(&report));
                bail!("permissions required; run `autocall permissions --request` or pass --force");
            }
        },
        Command::ServiceStop(_) => {
            client.stop_service().await?;
            eprintln!("service stopped");
        }
        Command::HangUp(_) => {
            client.hang_up().await?;
        }
        Command::Permissions(cmd) => {
            let report = if cmd.request {
                client.request_permissions().await?
            } else {
                client.permissions().await?
            };
            println!("{}", render_permissions(&report));
        }
        Command::Start(_) | Command::Version(_) => unreachable!(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PermissionState, PollRecord};

    #[test]
    fn renders_running_status() {
        let status = ServiceStatus {
            running: true,
            api_url: "http://example.com/api/phone".into(),
            call_active: true,
            active_number: Some("13800138000".into()),
            polls: 4,
            last_poll: Some(PollRecord {
                at_unix_ms: 1000,
                outcome: PollOutcome::Number("13800138000".into()),
            }),
        };
        let text = render_status(&status);
        assert!(text.starts_with("Service Status: Running\n"));
        assert!(text.contains("Call: active (13800138000)"));
        assert!(text.ends_with("(last at 1000ms: number 13800138000)"));
    }

    #[test]
    fn parses_status_json_from_daemon() {
        let json = r#"{"running":false,"api_url":"http://x/","call_active":false,
            "active_number":null,"polls":2,
            "last_poll":{"at_unix_ms":5,"outcome":{"kind":"error","detail":"refused"}}}"#;
        let status: ServiceStatus = serde_json::from_str(json).unwrap();
        assert!(render_status(&status).ends_with("error: refused)"));

        let empty = r#"{"at_unix_ms":5,"outcome":{"kind":"empty"}}"#;
        let record: PollRecord = serde_json::from_str(empty).unwrap();
        assert!(matches!(record.outcome, PollOutcome::Empty));
    }

    #[test]
    fn renders_permission_report() {
        let report = PermissionReport {
            permissions: vec![
                PermissionState {
                    name: "android.permission.CALL_PHONE".into(),
                    granted: true,
                },
                PermissionState {
                    name: "android.permission.POST_NOTIFICATIONS".into(),
                    granted: false,
                },
            ],
            overlay: true,
            battery_optimization_disabled: false,
        };
        let text = render_permissions(&report);
        assert!(text.starts_with("Basic Permissions: ✗\n"));
        assert!(text.contains("  ✗ android.permission.POST_NOTIFICATIONS"));
        assert!(text.ends_with("Battery Optimization: Enabled ✗"));
    }
}
