//! Write-Ahead Log
//!
//! Durable, ordered, appendable record stream backing crash recovery. One
//! [`Transaction`] per record, framed so records are self-delimiting and
//! replayable in append order:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized Transaction)]
//! ```
//!
//! Every record that has returned `Ok` from [`WriteAheadLog::append`] is on
//! stable storage: the append path flushes and issues `fsync` before
//! returning. Records are never truncated or rewritten in normal operation;
//! the only reader is recovery.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Transaction;

/// Frame header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

struct WalWriter {
    writer: BufWriter<File>,
    /// Current end-of-log offset.
    offset: u64,
}

/// Append-only transaction log with a durable-flush barrier per record.
pub struct WriteAheadLog {
    path: PathBuf,
    /// Appends are serialized even if the caller is not.
    writer: Mutex<WalWriter>,
}

impl WriteAheadLog {
    /// Open (or create) the log file at `path` in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
        })
    }

    /// Append one transaction and force it to stable storage.
    ///
    /// Returns the byte offset of the record. On any error the caller must
    /// assume the record is not durable.
    pub fn append(&self, tran: &Transaction) -> Result<u64> {
        let payload = bincode::serialize(tran)?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock();
        let record_offset = w.offset;

        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;

        // Durability barrier: the caller's ack waits on this.
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;

        w.offset += HEADER_SIZE + payload.len() as u64;
        debug!(offset = record_offset, len = payload.len(), "wal append");
        Ok(record_offset)
    }

    /// Standalone durability barrier.
    pub fn flush(&self) -> Result<()> {
        let mut w = self.writer.lock();
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Stream every record payload in append order.
    ///
    /// Holds the append lock for the duration, so the stream sees a stable
    /// prefix of the log. A truncated frame at the tail is a torn write
    /// from a crash after the last barrier; it terminates the stream with
    /// a warning. A complete frame that fails its CRC or carries a
    /// zero-length payload is structural corruption and fails the read.
    pub fn read_all<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let _guard = self.writer.lock();

        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;

        let mut offset: u64 = 0;
        while offset < file_len {
            if file_len - offset < HEADER_SIZE {
                warn!(offset, file_len, "torn wal header at tail; stopping replay");
                break;
            }

            let mut header = [0u8; HEADER_SIZE as usize];
            reader.read_exact(&mut header)?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 {
                return Err(Error::WalCorrupt {
                    offset,
                    reason: "zero-length frame".into(),
                });
            }
            if offset + HEADER_SIZE + u64::from(length) > file_len {
                warn!(
                    offset,
                    length, file_len, "torn wal payload at tail; stopping replay"
                );
                break;
            }

            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                return Err(Error::WalCorrupt {
                    offset,
                    reason: format!("crc mismatch: expected {expected_crc}, got {actual_crc}"),
                });
            }

            visit(&payload)?;
            offset += HEADER_SIZE + u64::from(length);
        }
        Ok(())
    }

    /// Current end-of-log offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().offset
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the underlying handle.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}
