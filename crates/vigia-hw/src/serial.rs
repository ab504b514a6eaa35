//! Raw byte link to a door controller over a serial device node.
//!
//! The controllers speak a newline-terminated ASCII protocol at 8N1. The
//! port is put into raw mode so the tty layer never rewrites our bytes.

use nix::sys::termios::{self, BaudRate, ControlFlags, FlushArg, SetArg};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;
use thiserror::Error;

/// Controller firmware resets when the port opens; commands sent before it
/// comes back up are lost.
const SETTLE_AFTER_OPEN: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("configure {path}: {source}")]
    Configure { path: String, source: nix::Error },
    #[error("write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
}

/// An open, configured serial connection.
#[derive(Debug)]
pub struct SerialLink {
    file: File,
    path: String,
}

impl SerialLink {
    /// Open and configure the device: raw mode, 8N1, no flow control.
    pub fn open(path: &str, baud: u32) -> Result<Self, LinkError> {
        let rate = baud_rate(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| LinkError::Open {
                path: path.to_string(),
                source,
            })?;

        let configure = |source| LinkError::Configure {
            path: path.to_string(),
            source,
        };

        let mut tio = termios::tcgetattr(&file).map_err(configure)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, rate).map_err(configure)?;
        tio.control_flags |= ControlFlags::CREAD | ControlFlags::CLOCAL;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(configure)?;
        termios::tcflush(&file, FlushArg::TCIOFLUSH).map_err(configure)?;

        std::thread::sleep(SETTLE_AFTER_OPEN);

        tracing::info!(device = path, baud, "serial link open");
        Ok(Self {
            file,
            path: path.to_string(),
        })
    }

    /// Write one framed command and flush it to the wire.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.file
            .write_all(bytes)
            .and_then(|()| self.file.flush())
            .map_err(|source| LinkError::Write {
                path: self.path.clone(),
                source,
            })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn baud_rate(baud: u32) -> Result<BaudRate, LinkError> {
    match baud {
        9600 => Ok(BaudRate::B9600),
        19200 => Ok(BaudRate::B19200),
        38400 => Ok(BaudRate::B38400),
        57600 => Ok(BaudRate::B57600),
        115200 => Ok(BaudRate::B115200),
        other => Err(LinkError::UnsupportedBaud(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_baud_rejected() {
        assert!(matches!(
            baud_rate(12345),
            Err(LinkError::UnsupportedBaud(12345))
        ));
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = SerialLink::open("/dev/vigia-test-does-not-exist", 9600).unwrap_err();
        assert!(matches!(err, LinkError::Open { .. }));
    }
}
