/// Stub backend for platforms without a MIDI output implementation.
///
/// Reports zero devices and refuses every open, so callers see an empty
/// device list and benign failures instead of hard errors.

use tracing::debug;

use crate::{DeviceInfo, MidiOutError, MidiOutResult, OutputBackend, OutputPort};

pub struct UnsupportedBackend;

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for UnsupportedBackend {
    fn id(&self) -> &'static str {
        "unsupported"
    }

    fn supported(&self) -> bool {
        false
    }

    fn device_count(&self) -> u32 {
        0
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }

    fn open(&self, device_id: u32) -> MidiOutResult<Box<dyn OutputPort>> {
        debug!(device = device_id, "MIDI output not supported on this platform");
        Err(MidiOutError::Unsupported)
    }
}
