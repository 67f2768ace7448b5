/// Message transmission over one open output device.
///
/// Short messages (up to three bytes) pack into a single word; longer
/// messages (SysEx) need a platform buffer prepared before transmission
/// and released afterward, on success and failure alike. `RawPort` is the
/// seam between this flow and the actual platform calls, so the flow can
/// be driven by a scripted fake in tests.

use tracing::{debug, warn};

use crate::{MidiOutError, MidiOutResult, OutputPort};

/// Longest message that fits a packed short-message word.
pub(crate) const SHORT_MSG_MAX: usize = 3;

/// Pack up to three MIDI bytes little-endian into one word: byte 0 in
/// bits 0-7, byte 1 in bits 8-15, byte 2 in bits 16-23.
pub(crate) fn pack_short(data: &[u8]) -> u32 {
    let mut word = 0u32;
    for (i, &byte) in data.iter().take(SHORT_MSG_MAX).enumerate() {
        word |= (byte as u32) << (8 * i);
    }
    word
}

/// Primitive operations of one open platform device handle.
/// Each returns the platform result code; 0 means success.
pub(crate) trait RawPort: Send {
    /// Transmit one packed short-message word.
    fn short_msg(&mut self, word: u32) -> u32;

    /// Stage a long-message buffer for transmission.
    fn prepare(&mut self, data: &[u8]) -> u32;

    /// Transmit the staged buffer.
    fn long_msg(&mut self) -> u32;

    /// Release the staged buffer.
    fn unprepare(&mut self) -> u32;

    fn reset(&mut self);

    fn close(&mut self);
}

/// An open output device: a raw platform handle plus the send flow.
pub(crate) struct DevicePort<R: RawPort> {
    device_id: u32,
    raw: R,
}

impl<R: RawPort> DevicePort<R> {
    pub(crate) fn new(device_id: u32, raw: R) -> Self {
        Self { device_id, raw }
    }

    fn send_short(&mut self, data: &[u8]) -> MidiOutResult<()> {
        let word = pack_short(data);
        let rc = self.raw.short_msg(word);
        if rc != 0 {
            warn!(code = rc, "Failed to send short MIDI message");
            return Err(MidiOutError::Device(rc));
        }
        Ok(())
    }

    fn send_long(&mut self, data: &[u8]) -> MidiOutResult<()> {
        let rc = self.raw.prepare(data);
        if rc != 0 {
            warn!(code = rc, "Failed to prepare long MIDI message");
            return Err(MidiOutError::Device(rc));
        }

        let send_rc = self.raw.long_msg();

        // The buffer must be released whether or not the send went through;
        // only the submit result decides the outcome.
        let unprep_rc = self.raw.unprepare();
        if unprep_rc != 0 {
            debug!(code = unprep_rc, "Failed to release long MIDI message buffer");
        }

        if send_rc != 0 {
            warn!(code = send_rc, "Failed to send long MIDI message");
            return Err(MidiOutError::Device(send_rc));
        }
        Ok(())
    }
}

impl<R: RawPort> OutputPort for DevicePort<R> {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn send(&mut self, data: &[u8]) -> MidiOutResult<()> {
        if data.len() <= SHORT_MSG_MAX {
            self.send_short(data)
        } else {
            self.send_long(data)
        }
    }
}

impl<R: RawPort> Drop for DevicePort<R> {
    fn drop(&mut self) {
        self.raw.reset();
        self.raw.close();
        debug!(device = self.device_id, "Closed MIDI output device");
    }
}
