//! Mini-stream storage for small documents
//!
//! Documents smaller than the cutoff (4096 bytes) live in 64-byte mini
//! sectors chained by the MiniFAT. The mini sectors themselves are packed
//! into one ordinary stream, the ministream, whose main-sector chain is
//! owned by the root entry. Growing the ministream is therefore a main
//! allocation: [`MiniStore`] borrows the [`MainStore`] for exactly that.

use super::chain::{self, BlockSource, BlockStore, BlockTable};
use super::consts::*;
use super::fat::{AllocationTable, MainStore};
use crate::common::{Error, Result};

/// MiniFAT plus the location and size of the ministream.
#[derive(Debug, Clone, Default)]
pub struct MiniState {
    /// One entry per mini sector
    pub table: AllocationTable,
    /// Main sectors of the ministream, in order
    pub stream_chain: Vec<u32>,
    /// Logical ministream size in bytes (stored as the root entry's size)
    pub stream_size: u64,
}

impl MiniState {
    /// Empty mini state for a new container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sector of the ministream, or `ENDOFCHAIN` when it is empty.
    #[inline]
    pub fn stream_start(&self) -> u32 {
        self.stream_chain.first().copied().unwrap_or(ENDOFCHAIN)
    }

    /// Mini sectors backed by the ministream chain.
    pub(crate) fn capacity(&self, sector_size: usize) -> usize {
        self.stream_chain.len() * sector_size / MINI_SECTOR_SIZE
    }

    /// Main sector and byte offset holding mini sector `index`.
    pub(crate) fn locate(&self, index: u32, sector_size: usize) -> Result<(u32, usize)> {
        let byte_offset = index as usize * MINI_SECTOR_SIZE;
        let sector = self
            .stream_chain
            .get(byte_offset / sector_size)
            .copied()
            .ok_or(Error::OutOfBounds {
                index: index as u64,
                count: self.capacity(sector_size) as u64,
            })?;
        Ok((sector, byte_offset % sector_size))
    }

    /// Mini sectors both described by the MiniFAT and backed by the ministream.
    pub(crate) fn block_count(&self, sector_size: usize) -> usize {
        self.table.len().min(self.capacity(sector_size))
    }
}

/// Read-only view of the mini tier.
#[derive(Clone, Copy)]
pub struct MiniView<'a> {
    main: &'a MainStore,
    state: &'a MiniState,
}

impl<'a> MiniView<'a> {
    pub fn new(main: &'a MainStore, state: &'a MiniState) -> Self {
        Self { main, state }
    }
}

impl BlockTable for MiniView<'_> {
    #[inline]
    fn block_size(&self) -> usize {
        MINI_SECTOR_SIZE
    }

    fn block_count(&self) -> usize {
        self.state.block_count(self.main.block_size())
    }

    fn next_block(&self, index: u32) -> Result<u32> {
        self.state.table.get(index)
    }
}

impl BlockSource for MiniView<'_> {
    fn read_block(&self, index: u32) -> Result<&[u8]> {
        let (sector, offset) = self.state.locate(index, self.main.block_size())?;
        let data = self.main.read_block(sector)?;
        Ok(&data[offset..offset + MINI_SECTOR_SIZE])
    }
}

/// Mutable view of the mini tier, able to grow the ministream.
pub struct MiniStore<'a> {
    main: &'a mut MainStore,
    state: &'a mut MiniState,
}

impl<'a> MiniStore<'a> {
    pub fn new(main: &'a mut MainStore, state: &'a mut MiniState) -> Self {
        Self { main, state }
    }

    /// Extend the ministream chain until it backs mini sector `index`.
    fn ensure_backed(&mut self, index: u32) -> Result<()> {
        let sector_size = self.main.block_size();
        while self.state.capacity(sector_size) <= index as usize {
            let last = self.state.stream_chain.last().copied().unwrap_or(ENDOFCHAIN);
            let sector = chain::append_block(&mut *self.main, last)?;
            chain::write_padded(&mut *self.main, sector, &[])?;
            self.state.stream_chain.push(sector);
            tracing::debug!(
                sector,
                sectors = self.state.stream_chain.len(),
                "grew ministream"
            );
        }
        Ok(())
    }
}

impl BlockTable for MiniStore<'_> {
    #[inline]
    fn block_size(&self) -> usize {
        MINI_SECTOR_SIZE
    }

    fn block_count(&self) -> usize {
        self.state.block_count(self.main.block_size())
    }

    fn next_block(&self, index: u32) -> Result<u32> {
        self.state.table.get(index)
    }
}

impl BlockSource for MiniStore<'_> {
    fn read_block(&self, index: u32) -> Result<&[u8]> {
        let (sector, offset) = self.state.locate(index, self.main.block_size())?;
        let data = self.main.read_block(sector)?;
        Ok(&data[offset..offset + MINI_SECTOR_SIZE])
    }
}

impl BlockStore for MiniStore<'_> {
    fn set_next_block(&mut self, index: u32, next: u32) -> Result<()> {
        self.state.table.set(index, next)
    }

    fn acquire_free_block(&mut self) -> Result<u32> {
        let index = match self.state.table.first_free() {
            Some(index) => index,
            None => {
                self.state.table.extend_free(1);
                self.state.table.len() as u32 - 1
            },
        };
        self.ensure_backed(index)?;
        let end = (index as u64 + 1) * MINI_SECTOR_SIZE as u64;
        self.state.stream_size = self.state.stream_size.max(end);
        Ok(index)
    }

    fn write_block(&mut self, index: u32, offset: usize, data: &[u8]) -> Result<()> {
        if offset + data.len() > MINI_SECTOR_SIZE {
            return Err(Error::OutOfBounds {
                index: (offset + data.len()) as u64,
                count: MINI_SECTOR_SIZE as u64,
            });
        }
        let (sector, base) = self.state.locate(index, self.main.block_size())?;
        self.main.write_block(sector, base + offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_writes_share_one_sector() {
        let mut main = MainStore::new(512);
        let mut mini = MiniState::new();

        let a = chain::write_chain(&mut MiniStore::new(&mut main, &mut mini), &[1u8; 10]).unwrap();
        let b = chain::write_chain(&mut MiniStore::new(&mut main, &mut mini), &[2u8; 100]).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(mini.stream_chain.len(), 1);
        assert_eq!(mini.stream_size, 3 * 64);

        let view = MiniView::new(&main, &mini);
        let (data, _) = chain::read_stream(&view, b, 100, true).unwrap();
        assert_eq!(data, vec![2u8; 100]);
        assert_eq!(chain::walk(&view, b, Some(100), true).unwrap().blocks, vec![1, 2]);
    }

    #[test]
    fn test_ministream_grows_across_sectors() {
        let mut main = MainStore::new(512);
        let mut mini = MiniState::new();
        // 4000 bytes need 63 mini sectors, eight main sectors
        let start = chain::write_chain(&mut MiniStore::new(&mut main, &mut mini), &[5u8; 4000]).unwrap();

        assert_eq!(mini.stream_chain.len(), 8);
        let view = MiniView::new(&main, &mini);
        let (data, _) = chain::read_stream(&view, start, 4000, true).unwrap();
        assert_eq!(data, vec![5u8; 4000]);
    }

    #[test]
    fn test_freed_mini_sectors_are_reused() {
        let mut main = MainStore::new(512);
        let mut mini = MiniState::new();
        let mut store = MiniStore::new(&mut main, &mut mini);
        let a = chain::write_chain(&mut store, &[1u8; 130]).unwrap();
        let _b = chain::write_chain(&mut store, &[2u8; 10]).unwrap();
        let a_blocks = chain::walk(&store, a, Some(130), true).unwrap().blocks;

        chain::free_chain(&mut store, a, true).unwrap();
        let c = chain::write_chain(&mut store, &[3u8; 130]).unwrap();
        assert_eq!(chain::walk(&store, c, Some(130), true).unwrap().blocks, a_blocks);
    }

    #[test]
    fn test_write_block_rejects_overflow() {
        let mut main = MainStore::new(512);
        let mut mini = MiniState::new();
        let mut store = MiniStore::new(&mut main, &mut mini);
        let block = chain::append_block(&mut store, ENDOFCHAIN).unwrap();
        assert!(store.write_block(block, 60, &[0u8; 8]).is_err());
    }
}
