//! Windows COM port implementation.
//!
//! Translates the abstract settings record into a DCB control block plus a
//! COMMTIMEOUTS structure approximating the POSIX minimum-bytes/timeout
//! read semantics. Windows has no output-processing equivalent of OPOST,
//! so that flag is a no-op here; everything else must behave identically
//! to the termios branch.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use tracing::trace;
use winapi::shared::minwindef::DWORD;
use winapi::um::commapi::{ClearCommError, GetCommState, SetCommState, SetCommTimeouts};
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winbase::{
    COMMTIMEOUTS, COMSTAT, DCB, EVENPARITY, MAXDWORD, NOPARITY, ODDPARITY, ONESTOPBIT,
    RTS_CONTROL_ENABLE, RTS_CONTROL_HANDSHAKE, TWOSTOPBITS,
};
use winapi::um::winnt::{FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, HANDLE};

use super::NativePort;
use crate::error::{Result, SerialError};
use crate::settings::{Parity, PortMode, PortSettings, StopBits};

/// A serial port backed by a Windows COM handle.
pub struct ComPort {
    handle: HANDLE,
}

// The handle is exclusively owned and only touched under the port lock.
unsafe impl Send for ComPort {}

impl ComPort {
    /// Open a COM device with the direction flags implied by `mode`.
    ///
    /// Bare names like `COM12` are prefixed into the `\\.\` device
    /// namespace before the native call.
    pub fn open(path: &Path, mode: PortMode) -> Result<Self> {
        let name = path.to_string_lossy();
        let qualified = if name.starts_with(r"\\") {
            name.into_owned()
        } else {
            format!(r"\\.\{name}")
        };

        let mut wide: Vec<u16> = OsStr::new(&qualified).encode_wide().collect();
        wide.push(0);

        let mut access: DWORD = 0;
        if mode.receives() {
            access |= GENERIC_READ;
        }
        if mode.transmits() {
            access |= GENERIC_WRITE;
        }

        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                access,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(SerialError::FailedToOpen(io::Error::last_os_error()));
        }

        let mut port = Self { handle };

        // Start out returning immediately from reads so the readiness probe
        // and the pipeline read never block the port lock.
        port.set_read_timeouts(0, 0)?;

        trace!(device = %qualified, "opened COM device");
        Ok(port)
    }

    /// Configure COMMTIMEOUTS to approximate the POSIX VMIN/VTIME model:
    /// zero/zero returns immediately with whatever is buffered, a non-zero
    /// timeout bounds the whole read, and a byte threshold with no timeout
    /// waits for the first byte and then drains what is available.
    fn set_read_timeouts(&mut self, min_read_bytes: u8, timeout_tenths: u8) -> Result<()> {
        let timeouts = match (min_read_bytes, timeout_tenths) {
            (0, 0) => COMMTIMEOUTS {
                ReadIntervalTimeout: MAXDWORD,
                ReadTotalTimeoutMultiplier: 0,
                ReadTotalTimeoutConstant: 0,
                WriteTotalTimeoutMultiplier: 0,
                WriteTotalTimeoutConstant: 0,
            },
            (_, 0) => COMMTIMEOUTS {
                ReadIntervalTimeout: MAXDWORD,
                ReadTotalTimeoutMultiplier: MAXDWORD,
                ReadTotalTimeoutConstant: MAXDWORD - 1,
                WriteTotalTimeoutMultiplier: 0,
                WriteTotalTimeoutConstant: 0,
            },
            (_, tenths) => COMMTIMEOUTS {
                ReadIntervalTimeout: 0,
                ReadTotalTimeoutMultiplier: 0,
                ReadTotalTimeoutConstant: DWORD::from(tenths) * 100,
                WriteTotalTimeoutMultiplier: 0,
                WriteTotalTimeoutConstant: 0,
            },
        };

        if unsafe { SetCommTimeouts(self.handle, &timeouts as *const _ as *mut _) } == 0 {
            return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
        }
        Ok(())
    }
}

impl Drop for ComPort {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

impl NativePort for ComPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut len: DWORD = 0;
        let ok = unsafe {
            ReadFile(
                self.handle,
                buf.as_mut_ptr().cast(),
                buf.len() as DWORD,
                &mut len,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(SerialError::Io(io::Error::last_os_error()));
        }
        Ok(len as usize)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut len: DWORD = 0;
        let ok = unsafe {
            WriteFile(
                self.handle,
                buf.as_ptr().cast(),
                buf.len() as DWORD,
                &mut len,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(SerialError::Io(io::Error::last_os_error()));
        }
        Ok(len as usize)
    }

    fn readable(&mut self) -> Result<bool> {
        let mut errors: DWORD = 0;
        let mut status: COMSTAT = unsafe { std::mem::zeroed() };
        if unsafe { ClearCommError(self.handle, &mut errors, &mut status) } == 0 {
            return Err(SerialError::Io(io::Error::last_os_error()));
        }
        Ok(status.cbInQue > 0)
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<()> {
        // The DCB carries a single line speed; asymmetric rates are a
        // POSIX-only capability.
        if settings.rx_baud != settings.tx_baud {
            return Err(SerialError::invalid_port(
                "differing receive/transmit baud rates are not supported on this platform",
            ));
        }

        let mut dcb: DCB = unsafe { std::mem::zeroed() };
        dcb.DCBlength = std::mem::size_of::<DCB>() as DWORD;
        if unsafe { GetCommState(self.handle, &mut dcb) } == 0 {
            return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
        }

        dcb.BaudRate = settings.tx_baud.value() as DWORD;
        dcb.ByteSize = settings.data_bits.width();
        dcb.set_fBinary(1);

        match settings.parity {
            Parity::None => {
                dcb.Parity = NOPARITY;
                dcb.set_fParity(0);
            }
            Parity::Even => {
                dcb.Parity = EVENPARITY;
                dcb.set_fParity(1);
            }
            Parity::Odd => {
                dcb.Parity = ODDPARITY;
                dcb.set_fParity(1);
            }
        }

        dcb.StopBits = match settings.stop_bits {
            StopBits::One => ONESTOPBIT,
            StopBits::Two => TWOSTOPBITS,
        };

        if settings.hardware_flow_control {
            dcb.set_fOutxCtsFlow(1);
            dcb.set_fRtsControl(RTS_CONTROL_HANDSHAKE);
        } else {
            dcb.set_fOutxCtsFlow(0);
            dcb.set_fRtsControl(RTS_CONTROL_ENABLE);
        }

        if settings.software_flow_control {
            dcb.set_fOutX(1);
            dcb.set_fInX(1);
        } else {
            dcb.set_fOutX(0);
            dcb.set_fInX(0);
        }

        if unsafe { SetCommState(self.handle, &mut dcb) } == 0 {
            return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
        }

        self.set_read_timeouts(settings.min_read_bytes, settings.timeout)
    }
}

impl std::fmt::Debug for ComPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComPort").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let err = ComPort::open(Path::new("COM255"), PortMode::ReceiveAndTransmit).unwrap_err();
        assert!(matches!(err, SerialError::FailedToOpen(_)));
    }
}
