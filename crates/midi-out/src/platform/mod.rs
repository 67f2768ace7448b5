#[cfg(target_os = "windows")]
pub mod windows;

pub mod unsupported;
