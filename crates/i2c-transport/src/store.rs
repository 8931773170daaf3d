use crate::{DescriptorStore, Result, TransportError, RECORD_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Value of a never-written storage byte, as on erased EEPROM or flash.
const ERASED: u8 = 0xFF;

fn check_index(index: u8, records: usize) -> Result<usize> {
    let idx = index as usize;
    if idx < records {
        Ok(idx * RECORD_SIZE)
    } else {
        Err(TransportError::RecordOutOfRange { index, records })
    }
}

/// RAM-backed record store with a fixed byte capacity.
///
/// Counts store round-trips so callers can verify caching behaviour.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bytes: Vec<u8>,
    reads: usize,
    writes: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![ERASED; capacity],
            reads: 0,
            writes: 0,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for MemoryStore {
    /// 512 bytes, the EEPROM size commonly reserved on small microcontrollers.
    fn default() -> Self {
        Self::new(512)
    }
}

impl DescriptorStore for MemoryStore {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn get(&mut self, index: u8) -> Result<[u8; RECORD_SIZE]> {
        let offset = check_index(index, self.records())?;
        self.reads += 1;
        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(&self.bytes[offset..offset + RECORD_SIZE]);
        Ok(record)
    }

    fn put(&mut self, index: u8, record: &[u8; RECORD_SIZE]) -> Result<()> {
        let offset = check_index(index, self.records())?;
        self.writes += 1;
        self.bytes[offset..offset + RECORD_SIZE].copy_from_slice(record);
        Ok(())
    }
}

/// File-backed record store emulating an EEPROM image on disk.
pub struct FileStore {
    path: PathBuf,
    file: File,
    capacity: usize,
}

impl FileStore {
    /// Open (or create) an image of `capacity` bytes at `path`.
    ///
    /// A new or short file is padded with erased bytes; existing contents are kept.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| TransportError::Io(format!("{}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| TransportError::Io(e.to_string()))?
            .len() as usize;
        if len < capacity {
            file.seek(SeekFrom::End(0))
                .map_err(|e| TransportError::Io(e.to_string()))?;
            file.write_all(&vec![ERASED; capacity - len])
                .map_err(|e| TransportError::Io(e.to_string()))?;
            file.flush().map_err(|e| TransportError::Io(e.to_string()))?;
        }
        tracing::debug!(path = %path.display(), capacity, "opened descriptor image");
        Ok(Self {
            path,
            file,
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DescriptorStore for FileStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn get(&mut self, index: u8) -> Result<[u8; RECORD_SIZE]> {
        let offset = check_index(index, self.records())?;
        let mut record = [0u8; RECORD_SIZE];
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.file
            .read_exact(&mut record)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(record)
    }

    fn put(&mut self, index: u8, record: &[u8; RECORD_SIZE]) -> Result<()> {
        let offset = check_index(index, self.records())?;
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.file
            .write_all(record)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.file
            .sync_data()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }
}
