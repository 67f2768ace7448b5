/// Cross-platform MIDI output: device enumeration, open-by-name, and
/// short/long message transmission through the OS MIDI subsystem.
///
/// Only Windows has a real backing implementation (WinMM). Everywhere else
/// the backend is a stub that reports no devices and refuses to open, so
/// callers degrade gracefully instead of failing hard.

pub mod config;
pub mod output;
pub mod platform;

// Only the WinMM backend drives a raw port. The test arm keeps the
// scripted send-flow tests building on non-Windows targets.
#[cfg(any(target_os = "windows", test))]
mod port;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::OutputConfig;
pub use output::MidiOutput;

/// Device name sentinel meaning "use the platform default output device".
pub const DEVICE_AUTO: &str = "auto";

/// One enumerable MIDI output device: platform index plus display name.
/// Indices are only stable for the lifetime of a single enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: String,
}

/// Errors from MIDI output operations. All of them are local and
/// recoverable; callers typically log and keep running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiOutError {
    /// This platform has no MIDI output implementation.
    #[error("MIDI output not supported on this platform")]
    Unsupported,

    /// The platform reports zero output devices.
    #[error("no MIDI output devices available")]
    NoDevices,

    /// A send was attempted with no device open.
    #[error("no MIDI output device is open")]
    NotOpen,

    /// A send was attempted with an empty payload.
    #[error("empty MIDI message")]
    EmptyMessage,

    /// The platform call failed with the given result code.
    #[error("MIDI device error (code {0})")]
    Device(u32),
}

/// Result alias for MIDI output operations.
pub type MidiOutResult<T> = Result<T, MidiOutError>;

/// Trait for platform MIDI output backends.
pub trait OutputBackend: Send {
    /// Short backend tag for logs ("winmm", "unsupported").
    fn id(&self) -> &'static str;

    /// Whether this platform has a real implementation.
    fn supported(&self) -> bool {
        true
    }

    /// Number of output devices currently present.
    fn device_count(&self) -> u32;

    /// Enumerate output devices, names included. Queried fresh on every
    /// call; devices whose capability query fails are skipped.
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Open an output device by platform index, returning the owning port.
    fn open(&self, device_id: u32) -> MidiOutResult<Box<dyn OutputPort>>;
}

/// An open MIDI output device. Dropping the port resets and closes it.
pub trait OutputPort: Send {
    /// Platform index this port was opened with.
    fn device_id(&self) -> u32;

    /// Transmit one MIDI message (short or SysEx).
    fn send(&mut self, data: &[u8]) -> MidiOutResult<()>;
}

/// Create the MIDI output backend for the build platform.
pub fn create_backend() -> Box<dyn OutputBackend> {
    #[cfg(target_os = "windows")]
    {
        Box::new(platform::windows::WinmmBackend::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(platform::unsupported::UnsupportedBackend::new())
    }
}
