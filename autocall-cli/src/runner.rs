use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::assets;

const DEVICE_DIR: &str = "/data/local/tmp/autocall";
const DEVICE_PORT: u16 = 21633;

pub fn start(socket_path: &Path) -> Result<()> {
    let device_dir = DEVICE_DIR.to_string();
    if assets::JAR.is_empty() {
        bail!("autocall.jar was not embedded; run device/build.sh and rebuild");
    }
    let so_bytes = select_so()?;
    if so_bytes.is_empty() {
        bail!("libautocall.so for this ABI was not embedded; run device/build.sh and rebuild");
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir {}", parent.display()))?;
    }
    let local_spec = format!("localfilesystem:{}", socket_path.display());
    let remote_spec = format!("tcp:{}", DEVICE_PORT);

    // Remove old forward so the socket file is recreated
    let _ = Command::new("adb")
        .args(["forward", "--remove", &local_spec])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    let _ = Command::new("adb")
        .args(["shell", "pkill", "-9", "-f", "autocall-daemon"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    // prefs.json lives here too, so keep the directory and replace only the binaries
    let setup = format!("mkdir -p {device_dir} && rm -f {device_dir}/autocall.jar {device_dir}/libautocall.so");
    run("adb", &["shell", &setup], "prepare device")?;

    push_bytes(assets::JAR, &format!("{device_dir}/autocall.jar"), "push jar")?;
    push_bytes(so_bytes, &format!("{device_dir}/libautocall.so"), "push .so")?;

    run(
        "adb",
        &["forward", &local_spec, &remote_spec],
        "configure adb forward",
    )?;

    // The device side spawns the daemon and exits; wait_ready polls for it.
    let classpath = format!("{device_dir}/autocall.jar");
    let lib_path = format!("{device_dir}/libautocall.so");
    run(
        "adb",
        &[
            "shell",
            "env",
            &format!("CLASSPATH={classpath}"),
            &format!("AUTOCALL_LIB={lib_path}"),
            &format!("AUTOCALL_DIR={device_dir}"),
            &format!("AUTOCALL_PORT={DEVICE_PORT}"),
            "app_process",
            "/system/bin",
            "com.autocall.Main",
        ],
        "start autocall",
    )?;

    eprintln!("debug: autocall daemon started");
    Ok(())
}

fn push_bytes(bytes: &[u8], device_path: &str, label: &str) -> Result<()> {
    let mut child = Command::new("adb")
        .args(["exec-in", &format!("cat > {device_path}")])
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("{label}: failed to spawn adb exec-in"))?;
    child
        .stdin
        .take()
        .context("adb exec-in stdin not captured")?
        .write_all(bytes)
        .with_context(|| format!("{label}: failed to write bytes"))?;
    let status = child
        .wait()
        .with_context(|| format!("{label}: failed to wait for adb exec-in"))?;
    if !status.success() {
        bail!("{label}: adb exec-in failed with status {status}");
    }
    Ok(())
}

fn select_so() -> Result<&'static [u8]> {
    let abi = adb_getprop("ro.product.cpu.abi")?;
    match abi_arch(&abi)? {
        "x86_64" => Ok(assets::SO_X86_64),
        _ => Ok(assets::SO_AARCH64),
    }
}

fn abi_arch(abi: &str) -> Result<&'static str> {
    match abi {
        "x86_64" => Ok("x86_64"),
        "arm64-v8a" => Ok("aarch64"),
        other => bail!("unsupported device ABI: {other}"),
    }
}

fn run(cmd: &str, args: &[&str], label: &str) -> Result<()> {
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("{label}: failed to spawn {}", format_command(cmd, args)))?;
    if !status.success() {
        bail!(
            "{}: command failed with status {}: {}",
            label,
            status,
            format_command(cmd, args)
        );
    }
    Ok(())
}

fn adb_getprop(prop: &str) -> Result<String> {
    let output = Command::new("adb")
        .args(["shell", "getprop", prop])
        .output()
        .with_context(|| format!("failed to run adb shell getprop {prop}"))?;
    if !output.status.success() {
        bail!("adb shell getprop {prop} failed (is a device connected?)");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn format_command(cmd: &str, args: &[&str]) -> String {
    let mut out = String::from(cmd);
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}
