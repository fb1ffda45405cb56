//! Byte-level access to the embedded controller through the `ec_sys` debug
//! interface (`/sys/kernel/debug/ec/ec0/io`).
//!
//! Every access opens the file, seeks, reads or writes, and closes it again.
//! No handle is kept between calls, so two processes poking the EC at the
//! same time are not coordinated in any way.

use crate::util::error::EcError;
use crate::util::sysfs::classify_io_error;
use log::{error, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Number of bytes fetched by a register read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWidth {
    Byte,
    Word,
}

impl ReadWidth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
        }
    }
}

/// Raw register access. Implementations log their own failures; callers only
/// see whether data came back.
pub trait RegisterIo {
    /// Write a single byte. Returns false if the write did not happen.
    fn write(&self, address: u8, value: u8) -> bool;

    /// Read up to `len` bytes starting at `address`. `None` means nothing
    /// could be read, including a zero-length read.
    fn read_bytes(&self, address: u8, len: usize) -> Option<Vec<u8>>;

    /// Read a big-endian unsigned value. `Some(0)` is a genuine zero.
    fn read(&self, address: u8, width: ReadWidth) -> Option<u16> {
        self.read_bytes(address, width.bytes())
            .map(|bytes| bytes.iter().fold(0u16, |acc, &b| (acc << 8) | u16::from(b)))
    }

    /// Read as a lowercase hex string, two digits per byte read.
    fn read_hex(&self, address: u8, width: ReadWidth) -> Option<String> {
        self.read_bytes(address, width.bytes())
            .map(|bytes| bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// The file-backed EC interface.
#[derive(Debug, Clone)]
pub struct EcInterface {
    path: PathBuf,
}

impl EcInterface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    // The debug interface misbehaves when opened read-only, so reads use r+w too
    fn open(&self) -> Result<File, EcError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| classify_io_error(&self.path, &e))
    }

    /// Write one byte, reporting the failure kind.
    pub fn try_write(&self, address: u8, value: u8) -> Result<(), EcError> {
        let mut file = self.open()?;
        file.seek(SeekFrom::Start(u64::from(address)))
            .map_err(|e| classify_io_error(&self.path, &e))?;
        file.write_all(&[value])
            .map_err(|e| classify_io_error(&self.path, &e))
    }

    /// Read up to `len` bytes, reporting the failure kind.
    pub fn try_read(&self, address: u8, len: usize) -> Result<Vec<u8>, EcError> {
        let mut file = self.open()?;
        file.seek(SeekFrom::Start(u64::from(address)))
            .map_err(|e| classify_io_error(&self.path, &e))?;

        let mut data = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut data)
            .map_err(|e| classify_io_error(&self.path, &e))?;

        if data.is_empty() {
            return Err(EcError::EmptyRead(address));
        }
        Ok(data)
    }
}

impl RegisterIo for EcInterface {
    fn write(&self, address: u8, value: u8) -> bool {
        match self.try_write(address, value) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write {value} to EC address {address:#04x}: {e}");
                false
            }
        }
    }

    fn read_bytes(&self, address: u8, len: usize) -> Option<Vec<u8>> {
        match self.try_read(address, len) {
            Ok(data) => Some(data),
            Err(e @ EcError::EmptyRead(_)) => {
                warn!("{e}");
                None
            }
            Err(e) => {
                error!("Failed to read {len} byte(s) from EC address {address:#04x}: {e}");
                None
            }
        }
    }
}
