//! On-disk page format of the file host.
//!
//! One file per tree. Page 0 holds the [`FileHeader`], every other page slot
//! holds a [`PageWithChecksum`] padded to [`PAGE_SIZE`]. Each `read_page`
//! call is exactly one seek and one read.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{CrossmatchError, CrossmatchResult};

use super::index_constants::{MAGIC, PAGE_SIZE, VERSION};
use super::index_types::{IndexKind, KeyDomain, Page, PageId, TreeInfo};

/// File header stored in page 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub tree_id: u128,
    pub kind: IndexKind,
    pub domain: KeyDomain,
    pub root_page: PageId,
    pub next_page_id: PageId,
    pub height: u32,
    pub entry_count: u64,
}

impl FileHeader {
    pub fn new(info: &TreeInfo, next_page_id: PageId) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: PAGE_SIZE as u32,
            tree_id: info.tree_id.as_u128(),
            kind: info.kind.clone(),
            domain: info.domain,
            root_page: info.root_page,
            next_page_id,
            height: info.height,
            entry_count: info.entry_count,
        }
    }

    /// Checks that the header describes a file this host can read.
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC && self.version == VERSION && self.page_size as usize == PAGE_SIZE
    }

    pub fn to_info(&self, name: &str) -> TreeInfo {
        TreeInfo {
            tree_id: uuid::Uuid::from_u128(self.tree_id),
            name: name.to_string(),
            kind: self.kind.clone(),
            domain: self.domain,
            root_page: self.root_page,
            height: self.height,
            entry_count: self.entry_count,
        }
    }
}

/// A page wrapped with CRC32 checksum for corruption detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithChecksum {
    pub checksum: u32,
    pub page: Page,
}

impl PageWithChecksum {
    pub fn new(page: Page) -> Self {
        let checksum = Self::calculate_checksum(&page);
        Self { checksum, page }
    }

    pub fn calculate_checksum(page: &Page) -> u32 {
        let serialized =
            bincode::serde::encode_to_vec(page, bincode::config::legacy()).unwrap_or_default();
        crc32(&serialized)
    }

    /// Verifies the checksum and that the slot holds the expected page.
    pub fn into_page(self, page_id: PageId) -> CrossmatchResult<Page> {
        let expected = Self::calculate_checksum(&self.page);
        if self.checksum != expected {
            return Err(CrossmatchError::corrupt(
                page_id,
                format!(
                    "checksum mismatch (expected: {:x}, got: {:x})",
                    expected, self.checksum
                ),
            ));
        }
        if self.page.page_id != page_id {
            return Err(CrossmatchError::corrupt(
                page_id,
                format!("slot holds page {}", self.page.page_id),
            ));
        }
        Ok(self.page)
    }
}

/// CRC32-MPEG2
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}

/// Handles reading/writing individual pages of one tree file.
pub struct Storage {
    file: RwLock<File>,
    path: PathBuf,
}

impl Storage {
    /// Create a new storage file, failing if one exists
    pub fn create(path: &Path) -> CrossmatchResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Open an existing storage file
    pub fn open(path: &Path) -> CrossmatchResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read header from disk (single read operation)
    pub fn read_header(&self) -> CrossmatchResult<FileHeader> {
        let buffer = self.read_slot(0)?;
        bincode::serde::decode_from_slice(&buffer, bincode::config::legacy())
            .map(|(header, _)| header)
            .map_err(|e| CrossmatchError::Serialization(e.to_string()))
    }

    /// Write header to disk
    pub fn write_header(&self, header: &FileHeader) -> CrossmatchResult<()> {
        let bytes = bincode::serde::encode_to_vec(header, bincode::config::legacy())
            .map_err(|e| CrossmatchError::Serialization(e.to_string()))?;
        self.write_slot(0, bytes)
    }

    /// Read a single page, verifying its checksum.
    pub fn read_page(&self, page_id: PageId) -> CrossmatchResult<Page> {
        if page_id == 0 {
            return Err(CrossmatchError::corrupt(0, "page 0 is reserved for the header"));
        }

        let buffer = match self.read_slot(page_id) {
            Ok(buffer) => buffer,
            Err(CrossmatchError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(CrossmatchError::corrupt(page_id, "page lies past end of file"))
            }
            Err(e) => return Err(e),
        };

        let wrapped: PageWithChecksum =
            bincode::serde::decode_from_slice(&buffer, bincode::config::legacy())
                .map(|(page, _)| page)
                .map_err(|e| CrossmatchError::corrupt(page_id, e.to_string()))?;

        wrapped.into_page(page_id)
    }

    /// Write a single page with checksum
    pub fn write_page(&self, page: &Page) -> CrossmatchResult<()> {
        if page.page_id == 0 {
            return Err(CrossmatchError::InvalidOperation(
                "Cannot write to page 0 (reserved for header)".into(),
            ));
        }

        let wrapped = PageWithChecksum::new(page.clone());
        let bytes = bincode::serde::encode_to_vec(&wrapped, bincode::config::legacy())
            .map_err(|e| CrossmatchError::Serialization(e.to_string()))?;
        if bytes.len() > PAGE_SIZE {
            return Err(CrossmatchError::InvalidOperation(format!(
                "Page {} too large: {} bytes (max {})",
                page.page_id,
                bytes.len(),
                PAGE_SIZE
            )));
        }
        self.write_slot(page.page_id, bytes)
    }

    /// Sync file to disk
    pub fn sync(&self) -> CrossmatchResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn read_slot(&self, slot: PageId) -> CrossmatchResult<Vec<u8>> {
        let offset = slot * PAGE_SIZE as u64;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_slot(&self, slot: PageId, bytes: Vec<u8>) -> CrossmatchResult<()> {
        let mut padded = bytes;
        padded.resize(PAGE_SIZE, 0);

        let offset = slot * PAGE_SIZE as u64;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&padded)?;
        Ok(())
    }
}
