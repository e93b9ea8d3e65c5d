pub static JAR: &[u8] = include_bytes!(env!("AUTOCALL_JAR"));
pub static SO_X86_64: &[u8] = include_bytes!(env!("AUTOCALL_SO_X86_64"));
pub static SO_AARCH64: &[u8] = include_bytes!(env!("AUTOCALL_SO_AARCH64"));
