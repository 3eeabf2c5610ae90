//! Bit rate to termios line-speed lookup.

use nix::sys::termios::BaudRate;

use crate::error::{Result, SerialError};

/// serial port baud rate
pub const COMMON_BAUD_RATES: &[u32] = &[
    4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 1000000, 1500000, 2000000,
];

/// Resolves a nominal bit rate to the platform line-speed code.
///
/// Rates above 230400 only exist on some platforms; where the host does not
/// define them they are rejected like any other unknown rate.
pub fn resolve(baud: u32) -> Result<BaudRate> {
    let speed = match baud {
        0 => BaudRate::B0,
        50 => BaudRate::B50,
        75 => BaudRate::B75,
        110 => BaudRate::B110,
        134 => BaudRate::B134,
        150 => BaudRate::B150,
        200 => BaudRate::B200,
        300 => BaudRate::B300,
        600 => BaudRate::B600,
        1200 => BaudRate::B1200,
        1800 => BaudRate::B1800,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460800 => BaudRate::B460800,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        921600 => BaudRate::B921600,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1000000 => BaudRate::B1000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1152000 => BaudRate::B1152000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1500000 => BaudRate::B1500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        2000000 => BaudRate::B2000000,
        #[cfg(all(
            any(target_os = "linux", target_os = "android"),
            not(target_arch = "sparc64")
        ))]
        2500000 => BaudRate::B2500000,
        #[cfg(all(
            any(target_os = "linux", target_os = "android"),
            not(target_arch = "sparc64")
        ))]
        3000000 => BaudRate::B3000000,
        #[cfg(all(
            any(target_os = "linux", target_os = "android"),
            not(target_arch = "sparc64")
        ))]
        3500000 => BaudRate::B3500000,
        #[cfg(all(
            any(target_os = "linux", target_os = "android"),
            not(target_arch = "sparc64")
        ))]
        4000000 => BaudRate::B4000000,
        other => return Err(SerialError::UnsupportedBaudRate(other)),
    };
    Ok(speed)
}

/// Whether `baud` resolves on this platform.
#[must_use]
pub fn is_supported(baud: u32) -> bool {
    resolve(baud).is_ok()
}
