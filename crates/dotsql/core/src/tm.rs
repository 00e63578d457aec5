// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

// Durable transaction status management
// Transaction ids and their {active, committed, aborted} outcomes live in a
// single status file: a fixed checksummed header followed by one status byte
// per id. Updates are flushed before the call returns, so commit decisions
// survive a crash. Queries are served from an in-memory mirror.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use tracing::debug;

use dotsql_common::{SUPER_XID, Xid};

use crate::common::{EngineError, EngineResult, calculate_checksum};

/// Magic number identifying transaction status files (DOTX)
const XID_FILE_MAGIC: [u8; 4] = [0x44, 0x4F, 0x54, 0x58];
/// Current status file format version
const XID_FILE_VERSION: u32 = 1;
/// Size of the status file header in bytes
const XID_HEADER_SIZE: usize = 20;

const STATUS_ACTIVE: u8 = 0;
const STATUS_COMMITTED: u8 = 1;
const STATUS_ABORTED: u8 = 2;

/// Contract the engine consumes for transaction status
pub trait TransactionManager: Send + Sync {
    /// Allocate a fresh transaction id and durably mark it active
    fn begin(&self) -> EngineResult<Xid>;

    /// Durably record `xid` as committed
    fn commit(&self, xid: Xid) -> EngineResult<()>;

    /// Durably record `xid` as aborted
    fn abort(&self, xid: Xid) -> EngineResult<()>;

    /// Whether `xid` committed. The super transaction always reports
    /// committed; active and aborted ids report false.
    fn is_committed(&self, xid: Xid) -> bool;
}

struct TmInner {
    file: std::fs::File,
    counter: u64,
    statuses: Vec<u8>,
}

impl TmInner {
    fn write_header(&mut self) -> EngineResult<()> {
        let mut header = [0u8; XID_HEADER_SIZE];
        header[0..4].copy_from_slice(&XID_FILE_MAGIC);
        LittleEndian::write_u32(&mut header[4..8], XID_FILE_VERSION);
        LittleEndian::write_u64(&mut header[8..16], self.counter);
        let checksum = calculate_checksum(&header[0..16]);
        LittleEndian::write_u32(&mut header[16..20], checksum);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        Ok(())
    }

    fn write_status(&mut self, xid: Xid, status: u8) -> EngineResult<()> {
        self.statuses[(xid - 1) as usize] = status;
        self.file
            .seek(SeekFrom::Start(XID_HEADER_SIZE as u64 + xid - 1))?;
        self.file.write_all(&[status])?;
        Ok(())
    }
}

/// File-backed transaction manager
pub struct FileTransactionManager {
    inner: Mutex<TmInner>,
}

impl FileTransactionManager {
    /// Create a fresh status file at `path`
    pub fn create(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut inner = TmInner {
            file,
            counter: 0,
            statuses: Vec::new(),
        };
        inner.write_header()?;
        inner.file.sync_data()?;
        debug!("created transaction status file at {}", path.display());
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Open an existing status file, validating its header
    pub fn open(path: &Path) -> EngineResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header = [0u8; XID_HEADER_SIZE];
        file.read_exact(&mut header)
            .map_err(|_| EngineError::Corruption("header is truncated".to_string()))?;
        if header[0..4] != XID_FILE_MAGIC {
            return Err(EngineError::Corruption("bad magic number".to_string()));
        }
        let version = LittleEndian::read_u32(&header[4..8]);
        if version != XID_FILE_VERSION {
            return Err(EngineError::Corruption(format!(
                "unsupported version {version}"
            )));
        }
        let checksum = LittleEndian::read_u32(&header[16..20]);
        if checksum != calculate_checksum(&header[0..16]) {
            return Err(EngineError::Corruption("header checksum mismatch".to_string()));
        }

        let counter = LittleEndian::read_u64(&header[8..16]);
        let mut statuses = Vec::new();
        file.read_to_end(&mut statuses)?;
        if statuses.len() as u64 != counter {
            return Err(EngineError::Corruption(format!(
                "expected {} status bytes, found {}",
                counter,
                statuses.len()
            )));
        }

        debug!(
            "opened transaction status file at {} with {} transactions",
            path.display(),
            counter
        );
        Ok(Self {
            inner: Mutex::new(TmInner {
                file,
                counter,
                statuses,
            }),
        })
    }

    /// Open the status file at `path`, creating it on first use
    pub fn open_or_create(path: &Path) -> EngineResult<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn set_status(&self, xid: Xid, status: u8) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if xid == SUPER_XID || xid > inner.counter {
            return Err(EngineError::InvalidOperation(format!(
                "transaction {xid} was never allocated"
            )));
        }
        inner.write_status(xid, status)?;
        inner.file.sync_data()?;
        Ok(())
    }
}

impl TransactionManager for FileTransactionManager {
    fn begin(&self) -> EngineResult<Xid> {
        let mut inner = self.inner.lock();
        inner.counter += 1;
        let xid = inner.counter;
        inner.statuses.push(STATUS_ACTIVE);
        inner.write_status(xid, STATUS_ACTIVE)?;
        inner.write_header()?;
        inner.file.sync_data()?;
        Ok(xid)
    }

    fn commit(&self, xid: Xid) -> EngineResult<()> {
        self.set_status(xid, STATUS_COMMITTED)
    }

    fn abort(&self, xid: Xid) -> EngineResult<()> {
        self.set_status(xid, STATUS_ABORTED)
    }

    fn is_committed(&self, xid: Xid) -> bool {
        if xid == SUPER_XID {
            return true;
        }
        let inner = self.inner.lock();
        inner.statuses.get((xid - 1) as usize) == Some(&STATUS_COMMITTED)
    }
}
