//! Line configuration value types.
//!
//! These types form the abstract settings record consumed by the platform
//! configuration translator. Native field names and units never leak into
//! this module; the per-platform mappings live on the descriptor types
//! themselves and are selected at build time.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SerialError};

/// Recognized baud rates.
///
/// Constructing a `BaudRate` from an arbitrary numeric value fails with
/// [`SerialError::InvalidPort`] unless the value is one of the recognized
/// set. The extended rates above 230400 are only available on Linux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaudRate {
    Baud0,
    Baud50,
    Baud75,
    Baud110,
    Baud134,
    Baud150,
    Baud200,
    Baud300,
    Baud600,
    Baud1200,
    Baud1800,
    Baud2400,
    Baud4800,
    Baud9600,
    Baud19200,
    Baud38400,
    Baud57600,
    Baud115200,
    Baud230400,
    #[cfg(target_os = "linux")]
    Baud460800,
    #[cfg(target_os = "linux")]
    Baud500000,
    #[cfg(target_os = "linux")]
    Baud576000,
    #[cfg(target_os = "linux")]
    Baud921600,
    #[cfg(target_os = "linux")]
    Baud1000000,
    #[cfg(target_os = "linux")]
    Baud1152000,
    #[cfg(target_os = "linux")]
    Baud1500000,
    #[cfg(target_os = "linux")]
    Baud2000000,
    #[cfg(target_os = "linux")]
    Baud2500000,
    #[cfg(target_os = "linux")]
    Baud3000000,
    #[cfg(target_os = "linux")]
    Baud3500000,
    #[cfg(target_os = "linux")]
    Baud4000000,
}

impl BaudRate {
    /// Construct a baud rate from its numeric value.
    pub fn from_value(value: u32) -> Result<Self> {
        let rate = match value {
            0 => Self::Baud0,
            50 => Self::Baud50,
            75 => Self::Baud75,
            110 => Self::Baud110,
            134 => Self::Baud134,
            150 => Self::Baud150,
            200 => Self::Baud200,
            300 => Self::Baud300,
            600 => Self::Baud600,
            1200 => Self::Baud1200,
            1800 => Self::Baud1800,
            2400 => Self::Baud2400,
            4800 => Self::Baud4800,
            9600 => Self::Baud9600,
            19200 => Self::Baud19200,
            38400 => Self::Baud38400,
            57600 => Self::Baud57600,
            115200 => Self::Baud115200,
            230400 => Self::Baud230400,
            #[cfg(target_os = "linux")]
            460800 => Self::Baud460800,
            #[cfg(target_os = "linux")]
            500000 => Self::Baud500000,
            #[cfg(target_os = "linux")]
            576000 => Self::Baud576000,
            #[cfg(target_os = "linux")]
            921600 => Self::Baud921600,
            #[cfg(target_os = "linux")]
            1000000 => Self::Baud1000000,
            #[cfg(target_os = "linux")]
            1152000 => Self::Baud1152000,
            #[cfg(target_os = "linux")]
            1500000 => Self::Baud1500000,
            #[cfg(target_os = "linux")]
            2000000 => Self::Baud2000000,
            #[cfg(target_os = "linux")]
            2500000 => Self::Baud2500000,
            #[cfg(target_os = "linux")]
            3000000 => Self::Baud3000000,
            #[cfg(target_os = "linux")]
            3500000 => Self::Baud3500000,
            #[cfg(target_os = "linux")]
            4000000 => Self::Baud4000000,
            other => {
                return Err(SerialError::invalid_port(format!(
                    "unsupported baud rate: {other}"
                )))
            }
        };
        Ok(rate)
    }

    /// The canonical numeric value of this baud rate.
    pub fn value(&self) -> u32 {
        match self {
            Self::Baud0 => 0,
            Self::Baud50 => 50,
            Self::Baud75 => 75,
            Self::Baud110 => 110,
            Self::Baud134 => 134,
            Self::Baud150 => 150,
            Self::Baud200 => 200,
            Self::Baud300 => 300,
            Self::Baud600 => 600,
            Self::Baud1200 => 1200,
            Self::Baud1800 => 1800,
            Self::Baud2400 => 2400,
            Self::Baud4800 => 4800,
            Self::Baud9600 => 9600,
            Self::Baud19200 => 19200,
            Self::Baud38400 => 38400,
            Self::Baud57600 => 57600,
            Self::Baud115200 => 115200,
            Self::Baud230400 => 230400,
            #[cfg(target_os = "linux")]
            Self::Baud460800 => 460800,
            #[cfg(target_os = "linux")]
            Self::Baud500000 => 500000,
            #[cfg(target_os = "linux")]
            Self::Baud576000 => 576000,
            #[cfg(target_os = "linux")]
            Self::Baud921600 => 921600,
            #[cfg(target_os = "linux")]
            Self::Baud1000000 => 1000000,
            #[cfg(target_os = "linux")]
            Self::Baud1152000 => 1152000,
            #[cfg(target_os = "linux")]
            Self::Baud1500000 => 1500000,
            #[cfg(target_os = "linux")]
            Self::Baud2000000 => 2000000,
            #[cfg(target_os = "linux")]
            Self::Baud2500000 => 2500000,
            #[cfg(target_os = "linux")]
            Self::Baud3000000 => 3000000,
            #[cfg(target_os = "linux")]
            Self::Baud3500000 => 3500000,
            #[cfg(target_os = "linux")]
            Self::Baud4000000 => 4000000,
        }
    }

    /// The termios speed constant for this baud rate.
    #[cfg(unix)]
    pub(crate) fn speed(&self) -> libc::speed_t {
        match self {
            Self::Baud0 => libc::B0,
            Self::Baud50 => libc::B50,
            Self::Baud75 => libc::B75,
            Self::Baud110 => libc::B110,
            Self::Baud134 => libc::B134,
            Self::Baud150 => libc::B150,
            Self::Baud200 => libc::B200,
            Self::Baud300 => libc::B300,
            Self::Baud600 => libc::B600,
            Self::Baud1200 => libc::B1200,
            Self::Baud1800 => libc::B1800,
            Self::Baud2400 => libc::B2400,
            Self::Baud4800 => libc::B4800,
            Self::Baud9600 => libc::B9600,
            Self::Baud19200 => libc::B19200,
            Self::Baud38400 => libc::B38400,
            Self::Baud57600 => libc::B57600,
            Self::Baud115200 => libc::B115200,
            Self::Baud230400 => libc::B230400,
            #[cfg(target_os = "linux")]
            Self::Baud460800 => libc::B460800,
            #[cfg(target_os = "linux")]
            Self::Baud500000 => libc::B500000,
            #[cfg(target_os = "linux")]
            Self::Baud576000 => libc::B576000,
            #[cfg(target_os = "linux")]
            Self::Baud921600 => libc::B921600,
            #[cfg(target_os = "linux")]
            Self::Baud1000000 => libc::B1000000,
            #[cfg(target_os = "linux")]
            Self::Baud1152000 => libc::B1152000,
            #[cfg(target_os = "linux")]
            Self::Baud1500000 => libc::B1500000,
            #[cfg(target_os = "linux")]
            Self::Baud2000000 => libc::B2000000,
            #[cfg(target_os = "linux")]
            Self::Baud2500000 => libc::B2500000,
            #[cfg(target_os = "linux")]
            Self::Baud3000000 => libc::B3000000,
            #[cfg(target_os = "linux")]
            Self::Baud3500000 => libc::B3500000,
            #[cfg(target_os = "linux")]
            Self::Baud4000000 => libc::B4000000,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// The width of the character in bits.
    pub fn width(&self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

/// Direction requested when opening a port. Fixed for the lifetime of the
/// open session; determines whether the read-distribution pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortMode {
    Receive,
    Transmit,
    ReceiveAndTransmit,
}

impl PortMode {
    /// Build a mode from direction flags. Fails with
    /// [`SerialError::MustReceiveOrTransmit`] when neither is set.
    pub fn from_flags(receive: bool, transmit: bool) -> Result<Self> {
        match (receive, transmit) {
            (true, true) => Ok(Self::ReceiveAndTransmit),
            (true, false) => Ok(Self::Receive),
            (false, true) => Ok(Self::Transmit),
            (false, false) => Err(SerialError::MustReceiveOrTransmit),
        }
    }

    /// Whether this mode includes the receive direction.
    pub fn receives(&self) -> bool {
        matches!(self, Self::Receive | Self::ReceiveAndTransmit)
    }

    /// Whether this mode includes the transmit direction.
    pub fn transmits(&self) -> bool {
        matches!(self, Self::Transmit | Self::ReceiveAndTransmit)
    }
}

/// Abstract line configuration applied to an open port.
///
/// The receive and transmit baud rates may differ on POSIX targets. The
/// `timeout` field is expressed in driver time units (tenths of a second);
/// zero means block indefinitely at the driver. Settings are never
/// persisted across close/reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub rx_baud: BaudRate,
    pub tx_baud: BaudRate,
    /// Minimum number of bytes a driver read returns (0-255).
    pub min_read_bytes: u8,
    /// Driver read timeout in tenths of a second; 0 blocks indefinitely.
    pub timeout: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
    pub hardware_flow_control: bool,
    pub software_flow_control: bool,
    /// Enable native output processing; off means raw passthrough.
    pub output_processing: bool,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            rx_baud: BaudRate::Baud9600,
            tx_baud: BaudRate::Baud9600,
            min_read_bytes: 1,
            timeout: 0,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: DataBits::Eight,
            hardware_flow_control: false,
            software_flow_control: false,
            output_processing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const RECOGNIZED: &[u32] = &[
        0, 50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400,
        57600, 115200, 230400,
    ];

    #[test]
    fn test_baud_round_trip() {
        for &value in RECOGNIZED {
            let rate = BaudRate::from_value(value).expect("recognized value");
            assert_eq!(rate.value(), value);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_extended_baud_round_trip() {
        for value in [
            460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000, 2500000, 3000000,
            3500000, 4000000,
        ] {
            let rate = BaudRate::from_value(value).expect("recognized value");
            assert_eq!(rate.value(), value);
        }
    }

    #[test]
    fn test_unrecognized_baud_is_rejected() {
        let err = BaudRate::from_value(12345).unwrap_err();
        assert!(matches!(err, crate::SerialError::InvalidPort(_)));
    }

    proptest! {
        #[test]
        fn prop_baud_construction_is_total(value in 0u32..=4_000_000) {
            match BaudRate::from_value(value) {
                Ok(rate) => prop_assert_eq!(rate.value(), value),
                Err(err) => prop_assert!(matches!(err, crate::SerialError::InvalidPort(_))),
            }
        }
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(
            PortMode::from_flags(true, true).unwrap(),
            PortMode::ReceiveAndTransmit
        );
        assert_eq!(PortMode::from_flags(true, false).unwrap(), PortMode::Receive);
        assert_eq!(
            PortMode::from_flags(false, true).unwrap(),
            PortMode::Transmit
        );
        assert!(matches!(
            PortMode::from_flags(false, false),
            Err(crate::SerialError::MustReceiveOrTransmit)
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = PortSettings::default();
        assert_eq!(settings.rx_baud, BaudRate::Baud9600);
        assert_eq!(settings.tx_baud, BaudRate::Baud9600);
        assert_eq!(settings.min_read_bytes, 1);
        assert_eq!(settings.timeout, 0);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert!(!settings.hardware_flow_control);
        assert!(!settings.software_flow_control);
        assert!(!settings.output_processing);
    }

    #[test]
    fn test_data_bits_width() {
        assert_eq!(DataBits::Five.width(), 5);
        assert_eq!(DataBits::Eight.width(), 8);
    }
}
