use jni::JNIEnv;
use jni::objects::{JClass, JObjectArray};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub mod android;
pub mod api;
pub mod call;
pub mod config;
pub mod control;
pub mod error;
mod java;
pub mod notify;
pub mod permissions;
pub mod platform;
pub mod prefs;
pub mod screen;
pub mod service;

use config::Config;
use error::Result;
use prefs::PreferenceStore;
use service::AutoCallService;

fn spawn_daemon() -> Result<()> {
    let mut cmd = Command::new("app_process");
    cmd.arg0("autocall-daemon")
        .args(["/system/bin", "com.autocall.Main"])
        .env("AUTOCALL_DAEMON", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    cmd.spawn()?;
    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.dir)?;
    let log_file = std::fs::File::create(config.log_path())?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();
    Ok(())
}

fn run(env: &mut JNIEnv, config: Config) -> Result<()> {
    let sdk_int = java::sdk_int_or_getprop(env);
    tracing::info!(sdk_int, package = %config.package, port = config.port, "starting autocall");

    let platform = Arc::new(android::ShellPlatform::new(sdk_int, config.package.clone()));
    let prefs = Arc::new(PreferenceStore::open(config.prefs_path()));
    let service = AutoCallService::new(&config, prefs, platform);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        service.resume_if_needed();

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(port = config.port, "control api ready");
        axum::serve(listener, control::router(service)).await?;
        Ok::<_, error::Error>(())
    })
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_com_autocall_Main_nativeRun(
    mut env: JNIEnv,
    _class: JClass,
    _java_args: JObjectArray,
) {
    if std::env::var("AUTOCALL_DAEMON").is_err() {
        // Parent: detach a daemon child and return so adb shell can exit
        if let Err(e) = spawn_daemon() {
            eprintln!("autocall: failed to spawn daemon: {e}");
        }
        return;
    }

    let config = Config::from_env();
    if let Err(e) = init_logging(&config) {
        eprintln!("autocall: failed to set up logging in {}: {e}", config.dir.display());
        return;
    }

    if let Err(e) = run(&mut env, config) {
        tracing::error!(error = %e, "autocall exited");
    }
}
