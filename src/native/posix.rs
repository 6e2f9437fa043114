//! POSIX termios port implementation.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libc::{c_int, c_void, size_t};
use tracing::trace;

use super::NativePort;
use crate::error::{Result, SerialError};
use crate::settings::{DataBits, Parity, PortMode, PortSettings, StopBits};

/// A serial port backed by a POSIX file descriptor.
pub struct PosixPort {
    fd: c_int,
}

impl PosixPort {
    /// Open the device node at `path` with the direction flags implied by
    /// `mode`. The descriptor is opened non-blocking and never becomes the
    /// controlling terminal.
    pub fn open(path: &Path, mode: PortMode) -> Result<Self> {
        let cstr = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| SerialError::FailedToOpen(io::Error::from(io::ErrorKind::InvalidInput)))?;

        let direction = match mode {
            PortMode::Receive => libc::O_RDONLY,
            PortMode::Transmit => libc::O_WRONLY,
            PortMode::ReceiveAndTransmit => libc::O_RDWR,
        };

        let fd = unsafe { libc::open(cstr.as_ptr(), direction | libc::O_NOCTTY | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(SerialError::FailedToOpen(io::Error::last_os_error()));
        }

        trace!(?path, fd, "opened device node");
        Ok(Self { fd })
    }
}

impl Drop for PosixPort {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl NativePort for PosixPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len =
            unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len() as size_t) };
        if len >= 0 {
            return Ok(len as usize);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Ok(0),
            Some(libc::ENXIO) => Err(SerialError::DeviceNotConnected),
            _ => Err(SerialError::Io(err)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let len = unsafe { libc::write(self.fd, buf.as_ptr() as *const c_void, buf.len() as size_t) };
        if len >= 0 {
            return Ok(len as usize);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Ok(0),
            Some(libc::ENXIO) => Err(SerialError::DeviceNotConnected),
            _ => Err(SerialError::Io(err)),
        }
    }

    fn readable(&mut self) -> Result<bool> {
        let mut fds = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // Zero timeout: probe only, never block under the port lock.
        let ready = unsafe { libc::poll(&mut fds, 1, 0) };
        if ready < 0 {
            return Err(SerialError::Io(io::Error::last_os_error()));
        }
        Ok(ready > 0 && fds.revents & libc::POLLIN != 0)
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<()> {
        let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
        if unsafe { libc::tcgetattr(self.fd, termios.as_mut_ptr()) } < 0 {
            return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
        }
        let mut termios = unsafe { termios.assume_init() };

        translate_settings(&mut termios, settings)?;

        // TCSANOW: commit immediately, without queuing unsent output.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &termios) } < 0 {
            return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
        }
        Ok(())
    }
}

/// Rewrite a termios control block from the abstract settings record. Pure
/// flag surgery on the in-memory structure; the caller commits it.
fn translate_settings(termios: &mut libc::termios, settings: &PortSettings) -> Result<()> {
    if unsafe { libc::cfsetispeed(termios, settings.rx_baud.speed()) } < 0 {
        return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
    }
    if unsafe { libc::cfsetospeed(termios, settings.tx_baud.speed()) } < 0 {
        return Err(SerialError::invalid_port(io::Error::last_os_error().to_string()));
    }

    match settings.parity {
        Parity::None => {
            termios.c_cflag &= !(libc::PARENB | libc::PARODD);
            termios.c_iflag &= !libc::INPCK;
            termios.c_iflag |= libc::IGNPAR;
        }
        Parity::Even => {
            termios.c_cflag |= libc::PARENB;
            termios.c_cflag &= !libc::PARODD;
            termios.c_iflag |= libc::INPCK;
            termios.c_iflag &= !libc::IGNPAR;
        }
        Parity::Odd => {
            termios.c_cflag |= libc::PARENB | libc::PARODD;
            termios.c_iflag |= libc::INPCK;
            termios.c_iflag &= !libc::IGNPAR;
        }
    }

    match settings.stop_bits {
        StopBits::One => termios.c_cflag &= !libc::CSTOPB,
        StopBits::Two => termios.c_cflag |= libc::CSTOPB,
    }

    // CSIZE is a multi-bit field: clear it before setting the width.
    termios.c_cflag &= !libc::CSIZE;
    termios.c_cflag |= match settings.data_bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };

    // Raw passthrough of CR/LF on input.
    termios.c_iflag &= !(libc::INLCR | libc::IGNCR | libc::ICRNL);

    if settings.hardware_flow_control {
        termios.c_cflag |= libc::CRTSCTS;
    } else {
        termios.c_cflag &= !libc::CRTSCTS;
    }

    if settings.software_flow_control {
        termios.c_iflag |= libc::IXON | libc::IXOFF | libc::IXANY;
    } else {
        termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    }

    // Enable the receiver, ignore modem control lines, and force raw mode:
    // no canonical line editing, echo, signal generation, or extended
    // input processing.
    termios.c_cflag |= libc::CREAD | libc::CLOCAL;
    termios.c_lflag &= !(libc::ICANON
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHONL
        | libc::ISIG
        | libc::IEXTEN);

    if settings.output_processing {
        termios.c_oflag |= libc::OPOST;
    } else {
        termios.c_oflag &= !libc::OPOST;
    }

    termios.c_cc[libc::VMIN] = settings.min_read_bytes as libc::cc_t;
    termios.c_cc[libc::VTIME] = settings.timeout as libc::cc_t;

    Ok(())
}

impl std::fmt::Debug for PosixPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosixPort").field("fd", &self.fd).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let err = PosixPort::open(
            Path::new("/dev/nonexistent_serial_device_12345"),
            PortMode::ReceiveAndTransmit,
        )
        .unwrap_err();
        assert!(matches!(err, SerialError::FailedToOpen(_)));
    }

    #[test]
    fn test_open_rejects_interior_nul() {
        let err = PosixPort::open(Path::new("/dev/tty\0S0"), PortMode::Receive).unwrap_err();
        assert!(matches!(err, SerialError::FailedToOpen(_)));
    }

    /// A control block the way a console-inherited tty commonly has it:
    /// canonical mode, echo, and extended input processing all enabled.
    fn console_like_termios() -> libc::termios {
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        termios.c_lflag = libc::ICANON
            | libc::ECHO
            | libc::ECHOE
            | libc::ECHOK
            | libc::ECHONL
            | libc::ISIG
            | libc::IEXTEN;
        termios.c_iflag = libc::INLCR | libc::ICRNL | libc::IXON | libc::INPCK;
        termios.c_oflag = libc::OPOST;
        termios
    }

    #[test]
    fn test_translate_forces_full_raw_mode() {
        let mut termios = console_like_termios();
        translate_settings(&mut termios, &PortSettings::default()).unwrap();

        let local_off = libc::ICANON
            | libc::ECHO
            | libc::ECHOE
            | libc::ECHOK
            | libc::ECHONL
            | libc::ISIG
            | libc::IEXTEN;
        assert_eq!(termios.c_lflag & local_off, 0);
        assert_eq!(
            termios.c_iflag & (libc::INLCR | libc::IGNCR | libc::ICRNL),
            0
        );
        assert_eq!(termios.c_oflag & libc::OPOST, 0);
        assert_eq!(
            termios.c_cflag & (libc::CREAD | libc::CLOCAL),
            libc::CREAD | libc::CLOCAL
        );
        assert_eq!(termios.c_cflag & libc::CSIZE, libc::CS8);
        assert_eq!(termios.c_cc[libc::VMIN], 1);
        assert_eq!(termios.c_cc[libc::VTIME], 0);
    }

    #[test]
    fn test_translate_parity_drives_input_check_flags() {
        let mut termios = console_like_termios();
        translate_settings(&mut termios, &PortSettings::default()).unwrap();
        assert_eq!(termios.c_cflag & (libc::PARENB | libc::PARODD), 0);
        assert_eq!(termios.c_iflag & libc::INPCK, 0);
        assert_ne!(termios.c_iflag & libc::IGNPAR, 0);

        let even = PortSettings {
            parity: Parity::Even,
            ..PortSettings::default()
        };
        let mut termios = console_like_termios();
        translate_settings(&mut termios, &even).unwrap();
        assert_ne!(termios.c_cflag & libc::PARENB, 0);
        assert_eq!(termios.c_cflag & libc::PARODD, 0);
        assert_ne!(termios.c_iflag & libc::INPCK, 0);
        assert_eq!(termios.c_iflag & libc::IGNPAR, 0);

        let odd = PortSettings {
            parity: Parity::Odd,
            ..PortSettings::default()
        };
        let mut termios = console_like_termios();
        translate_settings(&mut termios, &odd).unwrap();
        assert_ne!(termios.c_cflag & libc::PARENB, 0);
        assert_ne!(termios.c_cflag & libc::PARODD, 0);
        assert_ne!(termios.c_iflag & libc::INPCK, 0);
        assert_eq!(termios.c_iflag & libc::IGNPAR, 0);
    }
}
