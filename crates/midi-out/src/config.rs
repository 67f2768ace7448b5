/// Configuration types for MIDI output.
///
/// `OutputConfig` maps to the `[midi]` section of a TOML config file.
/// Reading the file is the binary's job; the library only consumes the
/// parsed section at init time.

use serde::Deserialize;

/// MIDI output section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Whether MIDI output should be brought up at all.
    #[serde(default)]
    pub enabled: bool,

    /// Output device name, or "auto" for the platform default.
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: default_device(),
        }
    }
}

fn default_device() -> String { crate::DEVICE_AUTO.to_string() }
