use jni::JNIEnv;
use jni::objects::{JObject, JString, JValue};
use std::process::Command;

use crate::error::{Error, Result};

fn format_exception(env: &mut JNIEnv, exc: &JObject) -> String {
    // printStackTrace(PrintWriter) keeps the cause chain
    let mut try_format = || -> Option<String> {
        let sw_class = env.find_class("java/io/StringWriter").ok()?;
        let sw = env.new_object(&sw_class, "()V", &[]).ok()?;
        let pw_class = env.find_class("java/io/PrintWriter").ok()?;
        let pw = env
            .new_object(&pw_class, "(Ljava/io/Writer;)V", &[JValue::Object(&sw)])
            .ok()?;
        env.call_method(
            exc,
            "printStackTrace",
            "(Ljava/io/PrintWriter;)V",
            &[JValue::Object(&pw)],
        )
        .ok()?;
        let result = env
            .call_method(&sw, "toString", "()Ljava/lang/String;", &[])
            .ok()?
            .l()
            .ok()?;
        let jstr: JString = result.into();
        env.get_string(&jstr).ok().map(|s| s.into())
    };
    try_format().unwrap_or_else(|| "<failed to format exception>".into())
}

fn get_exception_message(env: &mut JNIEnv) -> Option<String> {
    if !env.exception_check().unwrap_or(false) {
        return None;
    }
    let exc = env.exception_occurred().ok()?;
    env.exception_clear().ok();
    Some(format_exception(env, &exc))
}

fn jni_error(env: &mut JNIEnv, call: &'static str, e: jni::errors::Error) -> Error {
    let message = get_exception_message(env).unwrap_or_else(|| e.to_string());
    Error::Jni { call, message }
}

/// `Build.VERSION.SDK_INT` of the running system.
pub fn sdk_int(env: &mut JNIEnv) -> Result<u32> {
    let value = env
        .get_static_field("android/os/Build$VERSION", "SDK_INT", "I")
        .map_err(|e| jni_error(env, "Build.VERSION.SDK_INT", e))?
        .i()
        .map_err(|e| jni_error(env, "Build.VERSION.SDK_INT", e))?;
    u32::try_from(value).map_err(|_| Error::Jni {
        call: "Build.VERSION.SDK_INT",
        message: format!("negative sdk level {value}"),
    })
}

/// Falls back to the system property when the JVM lookup fails.
pub fn sdk_int_or_getprop(env: &mut JNIEnv) -> u32 {
    match sdk_int(env) {
        Ok(sdk) => sdk,
        Err(e) => {
            tracing::warn!(error = %e, "reading SDK_INT over jni failed, trying getprop");
            Command::new("getprop")
                .arg("ro.build.version.sdk")
                .output()
                .ok()
                .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().parse().ok())
                .unwrap_or_else(|| {
                    tracing::error!("could not determine sdk level, assuming 34");
                    34
                })
        }
    }
}
