//! Raw sector storage backing a container.
//!
//! All sectors after the header live in one contiguous buffer; sector `i`
//! occupies bytes `i * sector_size .. (i + 1) * sector_size`. Sectors are
//! never removed, so indices stay stable for every chain that names them.

use crate::common::{Error, Result};

/// Fixed-size sector storage
#[derive(Debug, Clone)]
pub struct SectorList {
    /// Bytes per sector (512 or 4096)
    sector_size: usize,
    /// Concatenated sector payloads
    data: Vec<u8>,
}

impl SectorList {
    /// Create an empty sector list.
    pub fn new(sector_size: usize) -> Self {
        Self {
            sector_size,
            data: Vec::new(),
        }
    }

    /// Wrap the bytes following the header.
    ///
    /// A trailing partial sector is zero-padded; the returned flag reports
    /// whether padding was needed.
    pub fn from_bytes(sector_size: usize, mut data: Vec<u8>) -> (Self, bool) {
        let remainder = data.len() % sector_size;
        let padded = remainder != 0;
        if padded {
            data.resize(data.len() + (sector_size - remainder), 0);
        }
        (Self { sector_size, data }, padded)
    }

    /// Bytes per sector.
    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Number of sectors.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.len() / self.sector_size
    }

    /// Borrow sector `index`.
    pub fn get(&self, index: u32) -> Result<&[u8]> {
        let range = self.range(index)?;
        Ok(&self.data[range])
    }

    /// Mutably borrow sector `index`.
    pub fn get_mut(&mut self, index: u32) -> Result<&mut [u8]> {
        let range = self.range(index)?;
        Ok(&mut self.data[range])
    }

    /// Overwrite part of sector `index`, starting at `offset`.
    pub fn write(&mut self, index: u32, offset: usize, bytes: &[u8]) -> Result<()> {
        let sector_size = self.sector_size;
        if offset + bytes.len() > sector_size {
            return Err(Error::OutOfBounds {
                index: (offset + bytes.len()) as u64,
                count: sector_size as u64,
            });
        }
        let sector = self.get_mut(index)?;
        sector[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Append a sector, returning its index (the previous count).
    ///
    /// Short input is zero-padded and long input truncated to one sector.
    pub fn append(&mut self, bytes: &[u8]) -> u32 {
        let index = self.count() as u32;
        let take = bytes.len().min(self.sector_size);
        self.data.extend_from_slice(&bytes[..take]);
        self.data.resize((index as usize + 1) * self.sector_size, 0);
        index
    }

    /// Append zeroed sectors until `count` sectors exist.
    pub fn extend_to(&mut self, count: usize) {
        if count > self.count() {
            self.data.resize(count * self.sector_size, 0);
        }
    }

    /// All sector bytes, in index order.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, index: u32) -> Result<std::ops::Range<usize>> {
        let count = self.count();
        if index as usize >= count {
            return Err(Error::OutOfBounds {
                index: index as u64,
                count: count as u64,
            });
        }
        let start = index as usize * self.sector_size;
        Ok(start..start + self.sector_size)
    }
}
