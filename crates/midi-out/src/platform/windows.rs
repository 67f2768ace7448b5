/// WinMM (winmm.dll) backend for MIDI output.
///
/// Binds the multimedia MIDI calls directly: enumeration via
/// midiOutGetNumDevs / midiOutGetDevCapsW, short messages via
/// midiOutShortMsg, and SysEx via the midiOutPrepareHeader /
/// midiOutLongMsg / midiOutUnprepareHeader sequence. winmm ships with
/// every Windows install, so this links unconditionally.

use tracing::debug;

use crate::port::{DevicePort, RawPort};
use crate::{DeviceInfo, MidiOutError, MidiOutResult, OutputBackend, OutputPort};

#[allow(non_camel_case_types, non_snake_case)]
mod ffi {
    use std::ffi::c_void;

    pub type UINT = u32;
    pub type UINT_PTR = usize;
    pub type DWORD = u32;
    pub type DWORD_PTR = usize;
    pub type WORD = u16;
    pub type WCHAR = u16;
    pub type MMRESULT = u32;
    pub type MMVERSION = u32;
    pub type HMIDIOUT = *mut c_void;
    pub type LPSTR = *mut i8;

    pub const MMSYSERR_NOERROR: MMRESULT = 0;
    pub const MMSYSERR_ERROR: MMRESULT = 1;
    pub const MAXPNAMELEN: usize = 32;
    pub const CALLBACK_NULL: DWORD = 0;

    #[repr(C)]
    pub struct MIDIOUTCAPSW {
        pub wMid: WORD,
        pub wPid: WORD,
        pub vDriverVersion: MMVERSION,
        pub szPname: [WCHAR; MAXPNAMELEN],
        pub wTechnology: WORD,
        pub wVoices: WORD,
        pub wNotes: WORD,
        pub wChannelMask: WORD,
        pub dwSupport: DWORD,
    }

    #[repr(C)]
    pub struct MIDIHDR {
        pub lpData: LPSTR,
        pub dwBufferLength: DWORD,
        pub dwBytesRecorded: DWORD,
        pub dwUser: DWORD_PTR,
        pub dwFlags: DWORD,
        pub lpNext: *mut MIDIHDR,
        pub reserved: DWORD_PTR,
        pub dwOffset: DWORD,
        pub dwReserved: [DWORD_PTR; 8],
    }

    // winmm - always available on Windows
    #[link(name = "winmm")]
    extern "system" {
        pub fn midiOutGetNumDevs() -> UINT;
        pub fn midiOutGetDevCapsW(
            uDeviceID: UINT_PTR,
            pmoc: *mut MIDIOUTCAPSW,
            cbmoc: UINT,
        ) -> MMRESULT;
        pub fn midiOutOpen(
            phmo: *mut HMIDIOUT,
            uDeviceID: UINT,
            dwCallback: DWORD_PTR,
            dwInstance: DWORD_PTR,
            fdwOpen: DWORD,
        ) -> MMRESULT;
        pub fn midiOutClose(hmo: HMIDIOUT) -> MMRESULT;
        pub fn midiOutReset(hmo: HMIDIOUT) -> MMRESULT;
        pub fn midiOutShortMsg(hmo: HMIDIOUT, dwMsg: DWORD) -> MMRESULT;
        pub fn midiOutPrepareHeader(hmo: HMIDIOUT, pmh: *mut MIDIHDR, cbmh: UINT) -> MMRESULT;
        pub fn midiOutUnprepareHeader(hmo: HMIDIOUT, pmh: *mut MIDIHDR, cbmh: UINT) -> MMRESULT;
        pub fn midiOutLongMsg(hmo: HMIDIOUT, pmh: *mut MIDIHDR, cbmh: UINT) -> MMRESULT;
    }
}

/// Decode a null-terminated UTF-16 device name from a caps struct.
fn wide_name_to_string(wide: &[ffi::WCHAR]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

/// MIDI output backend over the WinMM multimedia API.
pub struct WinmmBackend;

impl WinmmBackend {
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for WinmmBackend {
    fn id(&self) -> &'static str {
        "winmm"
    }

    fn device_count(&self) -> u32 {
        unsafe { ffi::midiOutGetNumDevs() }
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        let count = unsafe { ffi::midiOutGetNumDevs() };
        let mut devices = Vec::with_capacity(count as usize);

        for id in 0..count {
            let mut caps: ffi::MIDIOUTCAPSW = unsafe { std::mem::zeroed() };
            let rc = unsafe {
                ffi::midiOutGetDevCapsW(
                    id as ffi::UINT_PTR,
                    &mut caps,
                    std::mem::size_of::<ffi::MIDIOUTCAPSW>() as ffi::UINT,
                )
            };
            if rc != ffi::MMSYSERR_NOERROR {
                debug!(device = id, code = rc, "Skipping MIDI device with failing capability query");
                continue;
            }

            devices.push(DeviceInfo {
                id,
                name: wide_name_to_string(&caps.szPname),
            });
        }

        devices
    }

    fn open(&self, device_id: u32) -> MidiOutResult<Box<dyn OutputPort>> {
        let mut handle: ffi::HMIDIOUT = std::ptr::null_mut();
        let rc = unsafe { ffi::midiOutOpen(&mut handle, device_id, 0, 0, ffi::CALLBACK_NULL) };
        if rc != ffi::MMSYSERR_NOERROR {
            return Err(MidiOutError::Device(rc));
        }

        Ok(Box::new(DevicePort::new(device_id, WinmmRaw::new(handle))))
    }
}

/// Owned copy of a long message plus the header the driver works on.
/// Boxed by the raw port so the header never moves while prepared.
struct LongBuffer {
    data: Vec<u8>,
    header: ffi::MIDIHDR,
}

/// One open WinMM handle. Keeps the staged SysEx buffer alive between
/// prepare and unprepare.
struct WinmmRaw {
    handle: ffi::HMIDIOUT,
    staged: Option<Box<LongBuffer>>,
}

// SAFETY: HMIDIOUT is an opaque token the multimedia API accepts from any
// thread; all calls on it go through &mut self, so access is serialized.
unsafe impl Send for WinmmRaw {}

impl WinmmRaw {
    fn new(handle: ffi::HMIDIOUT) -> Self {
        Self {
            handle,
            staged: None,
        }
    }
}

impl RawPort for WinmmRaw {
    fn short_msg(&mut self, word: u32) -> u32 {
        unsafe { ffi::midiOutShortMsg(self.handle, word) }
    }

    fn prepare(&mut self, data: &[u8]) -> u32 {
        let mut buf = Box::new(LongBuffer {
            data: data.to_vec(),
            header: unsafe { std::mem::zeroed() },
        });
        let data_ptr = buf.data.as_mut_ptr() as ffi::LPSTR;
        let data_len = buf.data.len() as ffi::DWORD;
        buf.header.lpData = data_ptr;
        buf.header.dwBufferLength = data_len;
        buf.header.dwBytesRecorded = data_len;

        let rc = unsafe {
            ffi::midiOutPrepareHeader(
                self.handle,
                &mut buf.header,
                std::mem::size_of::<ffi::MIDIHDR>() as ffi::UINT,
            )
        };
        if rc == ffi::MMSYSERR_NOERROR {
            self.staged = Some(buf);
        }
        rc
    }

    fn long_msg(&mut self) -> u32 {
        match self.staged.as_mut() {
            Some(buf) => unsafe {
                ffi::midiOutLongMsg(
                    self.handle,
                    &mut buf.header,
                    std::mem::size_of::<ffi::MIDIHDR>() as ffi::UINT,
                )
            },
            None => ffi::MMSYSERR_ERROR,
        }
    }

    fn unprepare(&mut self) -> u32 {
        match self.staged.take() {
            // The buffer is freed only after the driver lets go of it.
            Some(mut buf) => unsafe {
                ffi::midiOutUnprepareHeader(
                    self.handle,
                    &mut buf.header,
                    std::mem::size_of::<ffi::MIDIHDR>() as ffi::UINT,
                )
            },
            None => ffi::MMSYSERR_NOERROR,
        }
    }

    fn reset(&mut self) {
        unsafe { ffi::midiOutReset(self.handle) };
    }

    fn close(&mut self) {
        unsafe { ffi::midiOutClose(self.handle) };
    }
}
