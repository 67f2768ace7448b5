/// MIDI output facade: owns the platform backend and at most one open
/// output port at a time.
///
/// The open port lives in an `Option`; replacing or dropping it resets and
/// closes the underlying device, so a second open can never leak the first
/// handle and a closed adapter fails sends cleanly.

use tracing::{debug, error, info, warn};

use crate::config::OutputConfig;
use crate::{
    create_backend, DeviceInfo, MidiOutError, MidiOutResult, OutputBackend, OutputPort,
    DEVICE_AUTO,
};

pub struct MidiOutput {
    backend: Box<dyn OutputBackend>,
    port: Option<Box<dyn OutputPort>>,
}

impl MidiOutput {
    /// Create an output adapter over the build platform's backend.
    pub fn new() -> Self {
        Self::with_backend(create_backend())
    }

    /// Create an output adapter over a specific backend.
    pub fn with_backend(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            backend,
            port: None,
        }
    }

    /// Bring up MIDI output per the configuration: log what the platform
    /// reports and, when output is enabled, open the configured device.
    /// Never fails; a device that can't be opened is logged and skipped
    /// so the rest of the application keeps running.
    pub fn init(&mut self, config: &OutputConfig) {
        info!(backend = self.backend.id(), "Initializing MIDI output");

        if !self.backend.supported() {
            info!("MIDI output not yet implemented on this platform");
            return;
        }

        let devices = self.backend.devices();
        info!(count = devices.len(), "Found MIDI output devices");
        for dev in &devices {
            info!(id = dev.id, name = %dev.name, "MIDI output device");
        }

        if config.enabled && !config.device.is_empty() {
            match self.open(&config.device) {
                Ok(()) => info!(device = %config.device, "MIDI output ready"),
                Err(e) => warn!(device = %config.device, "MIDI output unavailable: {}", e),
            }
        }
    }

    /// Close any open device. Safe to call repeatedly; dropping the
    /// adapter has the same effect.
    pub fn shutdown(&mut self) {
        self.close();
    }

    /// Enumerate output devices. Queried fresh from the platform on every
    /// call; empty when none are present or the platform has no
    /// implementation.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.backend.devices()
    }

    /// Open an output device by name, closing any previously open one
    /// first. `"auto"` or an empty name selects the platform default
    /// (device 0) without enumerating; a name that matches no device
    /// falls back to the default with a warning rather than failing.
    pub fn open(&mut self, device_name: &str) -> MidiOutResult<()> {
        self.close();

        if !self.backend.supported() {
            warn!("MIDI output not supported on this platform");
            return Err(MidiOutError::Unsupported);
        }

        let device_id = self.resolve_device(device_name);

        if self.backend.device_count() == 0 {
            warn!("No MIDI output devices available");
            return Err(MidiOutError::NoDevices);
        }

        match self.backend.open(device_id) {
            Ok(port) => {
                info!(device = device_id, "Opened MIDI output device");
                self.port = Some(port);
                Ok(())
            }
            Err(e) => {
                error!(device = device_id, "Failed to open MIDI output device: {}", e);
                Err(e)
            }
        }
    }

    /// Map a configured device name to a platform index. `"auto"` and the
    /// empty string pick device 0 directly; otherwise the first exact name
    /// match wins, falling back to device 0 when nothing matches.
    fn resolve_device(&self, device_name: &str) -> u32 {
        if device_name.is_empty() || device_name == DEVICE_AUTO {
            return 0;
        }

        for dev in self.backend.devices() {
            if dev.name == device_name {
                info!(device = dev.id, name = %dev.name, "Matched configured MIDI output device");
                return dev.id;
            }
        }

        warn!(name = %device_name, "MIDI output device not found, using default");
        0
    }

    /// Close the open device, if any. The dropped port resets the device
    /// and releases the platform handle.
    pub fn close(&mut self) {
        self.port = None;
    }

    /// Whether an output device is currently open.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Send one MIDI message to the open device. Up to three bytes go out
    /// as a single packed word; anything longer is transmitted as a
    /// SysEx-style long message.
    pub fn send(&mut self, data: &[u8]) -> MidiOutResult<()> {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => {
                debug!("MIDI send with no open device");
                return Err(MidiOutError::NotOpen);
            }
        };

        if data.is_empty() {
            debug!("MIDI send with empty message");
            return Err(MidiOutError::EmptyMessage);
        }

        port.send(data)
    }

    /// Send All Sound Off (CC 120) + All Notes Off (CC 123) on all 16
    /// channels.
    pub fn send_all_off(&mut self) -> MidiOutResult<()> {
        for ch in 0u8..16 {
            let status = 0xB0 | ch;
            // CC 120 = All Sound Off
            self.send(&[status, 120, 0])?;
            // CC 123 = All Notes Off
            self.send(&[status, 123, 0])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::unsupported::UnsupportedBackend;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Enumerate,
        Open(u32),
        Close(u32),
        Send(u32, Vec<u8>),
    }

    type EventLog = Arc<Mutex<Vec<Event>>>;

    /// Backend over a fixed device list that records every call.
    struct FakeBackend {
        devices: Vec<DeviceInfo>,
        open_rc: Option<u32>,
        events: EventLog,
    }

    impl FakeBackend {
        fn new(names: &[&str]) -> Self {
            let devices = names
                .iter()
                .enumerate()
                .map(|(id, name)| DeviceInfo {
                    id: id as u32,
                    name: name.to_string(),
                })
                .collect();
            Self {
                devices,
                open_rc: None,
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl OutputBackend for FakeBackend {
        fn id(&self) -> &'static str {
            "fake"
        }

        fn device_count(&self) -> u32 {
            self.devices.len() as u32
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            self.events.lock().unwrap().push(Event::Enumerate);
            self.devices.clone()
        }

        fn open(&self, device_id: u32) -> MidiOutResult<Box<dyn OutputPort>> {
            if let Some(code) = self.open_rc {
                return Err(MidiOutError::Device(code));
            }
            self.events.lock().unwrap().push(Event::Open(device_id));
            Ok(Box::new(FakePort {
                device_id,
                events: Arc::clone(&self.events),
            }))
        }
    }

    struct FakePort {
        device_id: u32,
        events: EventLog,
    }

    impl OutputPort for FakePort {
        fn device_id(&self) -> u32 {
            self.device_id
        }

        fn send(&mut self, data: &[u8]) -> MidiOutResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(Event::Send(self.device_id, data.to_vec()));
            Ok(())
        }
    }

    impl Drop for FakePort {
        fn drop(&mut self) {
            self.events.lock().unwrap().push(Event::Close(self.device_id));
        }
    }

    fn output_with(names: &[&str]) -> (MidiOutput, EventLog) {
        let backend = FakeBackend::new(names);
        let events = Arc::clone(&backend.events);
        (MidiOutput::with_backend(Box::new(backend)), events)
    }

    fn output_with_failing_open(names: &[&str], code: u32) -> (MidiOutput, EventLog) {
        let mut backend = FakeBackend::new(names);
        backend.open_rc = Some(code);
        let events = Arc::clone(&backend.events);
        (MidiOutput::with_backend(Box::new(backend)), events)
    }

    #[test]
    fn test_open_auto_selects_default_without_enumerating() {
        let (mut out, events) = output_with(&["Device A", "Device B"]);

        out.open("auto").unwrap();

        assert_eq!(*events.lock().unwrap(), vec![Event::Open(0)]);
        assert!(out.is_open());
    }

    #[test]
    fn test_open_empty_name_behaves_like_auto() {
        let (mut out, events) = output_with(&["Device A", "Device B"]);

        out.open("").unwrap();

        assert_eq!(*events.lock().unwrap(), vec![Event::Open(0)]);
    }

    #[test]
    fn test_open_by_exact_name() {
        let (mut out, events) = output_with(&["Device A", "Device B"]);

        out.open("Device B").unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::Enumerate, Event::Open(1)]
        );
    }

    #[test]
    fn test_open_unknown_name_falls_back_to_default() {
        let (mut out, events) = output_with(&["Device A", "Device B"]);

        // A misconfigured name is not an error: the default device opens.
        out.open("No Such Device").unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::Enumerate, Event::Open(0)]
        );
        assert!(out.is_open());
    }

    #[test]
    fn test_open_with_no_devices_fails_without_attempting() {
        let (mut out, events) = output_with(&[]);

        assert_eq!(out.open("auto"), Err(MidiOutError::NoDevices));
        assert!(events.lock().unwrap().is_empty());
        assert!(!out.is_open());
    }

    #[test]
    fn test_open_named_with_no_devices_resolves_then_fails() {
        let (mut out, events) = output_with(&[]);

        // The name lookup (and its not-found warning) runs before the
        // device count is checked; the open itself is never attempted.
        assert_eq!(out.open("Device A"), Err(MidiOutError::NoDevices));
        assert_eq!(*events.lock().unwrap(), vec![Event::Enumerate]);
        assert!(!out.is_open());
    }

    #[test]
    fn test_reopen_closes_previous_port_first() {
        let (mut out, events) = output_with(&["Device A", "Device B"]);

        out.open("Device A").unwrap();
        out.open("Device B").unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                Event::Enumerate,
                Event::Open(0),
                Event::Close(0),
                Event::Enumerate,
                Event::Open(1),
            ]
        );
    }

    #[test]
    fn test_open_failure_leaves_adapter_closed() {
        let (mut out, _events) = output_with_failing_open(&["Device A"], 68);

        assert_eq!(out.open("auto"), Err(MidiOutError::Device(68)));
        assert!(!out.is_open());
        assert_eq!(out.send(&[0x90, 60, 100]), Err(MidiOutError::NotOpen));
    }

    #[test]
    fn test_send_without_open_fails_benignly() {
        let (mut out, _events) = output_with(&["Device A"]);

        assert_eq!(out.send(&[0x90, 60, 100]), Err(MidiOutError::NotOpen));
    }

    #[test]
    fn test_send_empty_message_fails() {
        let (mut out, events) = output_with(&["Device A"]);
        out.open("auto").unwrap();

        assert_eq!(out.send(&[]), Err(MidiOutError::EmptyMessage));
        let log = events.lock().unwrap();
        assert!(!log.iter().any(|e| matches!(e, Event::Send(_, _))));
    }

    #[test]
    fn test_send_after_close_fails() {
        let (mut out, _events) = output_with(&["Device A"]);

        out.open("auto").unwrap();
        out.send(&[0x90, 60, 100]).unwrap();
        out.close();

        assert!(!out.is_open());
        assert_eq!(out.send(&[0x80, 60, 0]), Err(MidiOutError::NotOpen));
    }

    #[test]
    fn test_devices_enumerates_fresh_each_call() {
        let (out, events) = output_with(&["Device A"]);

        out.devices();
        out.devices();

        let log = events.lock().unwrap();
        let enumerations = log.iter().filter(|e| **e == Event::Enumerate).count();
        assert_eq!(enumerations, 2);
    }

    #[test]
    fn test_init_disabled_lists_but_does_not_open() {
        let (mut out, events) = output_with(&["Device A"]);

        out.init(&OutputConfig::default());

        assert!(!out.is_open());
        let log = events.lock().unwrap();
        assert!(log.contains(&Event::Enumerate));
        assert!(!log.iter().any(|e| matches!(e, Event::Open(_))));
    }

    #[test]
    fn test_init_enabled_opens_configured_device() {
        let (mut out, _events) = output_with(&["Device A", "Device B"]);

        out.init(&OutputConfig {
            enabled: true,
            device: "Device B".to_string(),
        });

        assert!(out.is_open());
    }

    #[test]
    fn test_init_enabled_with_no_devices_stays_up() {
        let (mut out, _events) = output_with(&[]);

        out.init(&OutputConfig {
            enabled: true,
            device: "auto".to_string(),
        });

        assert!(!out.is_open());
    }

    #[test]
    fn test_send_all_off_covers_all_channels() {
        let (mut out, events) = output_with(&["Device A"]);
        out.open("auto").unwrap();

        out.send_all_off().unwrap();

        let log = events.lock().unwrap();
        let sends: Vec<&Vec<u8>> = log
            .iter()
            .filter_map(|e| match e {
                Event::Send(_, data) => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(sends.len(), 32);
        assert_eq!(*sends[0], vec![0xB0, 120, 0]);
        assert_eq!(*sends[1], vec![0xB0, 123, 0]);
        assert_eq!(*sends[30], vec![0xBF, 120, 0]);
        assert_eq!(*sends[31], vec![0xBF, 123, 0]);
    }

    #[test]
    fn test_shutdown_without_open_is_noop() {
        let (mut out, events) = output_with(&["Device A"]);

        out.shutdown();
        out.shutdown();

        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_closes_open_port() {
        let (mut out, events) = output_with(&["Device A"]);
        out.open("auto").unwrap();

        drop(out);

        assert!(events.lock().unwrap().contains(&Event::Close(0)));
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut out, events) = output_with(&["Device A", "Device B"]);

        out.init(&OutputConfig::default());
        let devices = out.devices();
        assert_eq!(devices.len(), 2);

        out.open(&devices[0].name).unwrap();
        out.send(&[0x90, 60, 100]).unwrap();
        out.send(&[0x80, 60, 0]).unwrap();
        out.close();
        out.shutdown();

        assert!(!out.is_open());
        let log = events.lock().unwrap();
        let closes = log.iter().filter(|e| matches!(e, Event::Close(_))).count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_unsupported_backend_degrades_gracefully() {
        let mut out = MidiOutput::with_backend(Box::new(UnsupportedBackend::new()));

        assert!(out.devices().is_empty());
        assert_eq!(out.open("auto"), Err(MidiOutError::Unsupported));
        assert_eq!(out.open("Some Device"), Err(MidiOutError::Unsupported));
        assert_eq!(out.send(&[0xF8]), Err(MidiOutError::NotOpen));

        out.init(&OutputConfig {
            enabled: true,
            device: "auto".to_string(),
        });
        assert!(!out.is_open());
    }
}
