//! Chained block allocation shared by the FAT and the MiniFAT.
//!
//! Both tables are the same structure at different granularity: an array
//! with one entry per block giving the next block of the same stream, or a
//! sentinel. [`BlockTable`] abstracts over the table alone, [`BlockSource`]
//! and [`BlockStore`] add the bytes behind it; the free functions here
//! implement walking, reading, allocating and freeing once for both tiers.
//!
//! # Allocation policy
//!
//! Free blocks are found first-fit, scanning the table for `FREESECT` in
//! index order, and only when none is left does the store grow. This keeps
//! allocation deterministic: freeing a stream and writing another of the
//! same size reuses exactly the same blocks.

use super::consts::*;
use crate::common::{ChainFault, Error, Result};
use fixedbitset::FixedBitSet;

/// The next-block table of a chained block store.
pub trait BlockTable {
    /// Bytes per block.
    fn block_size(&self) -> usize;

    /// Number of blocks that are both described by the table and backed
    /// by storage. Chain entries at or past this index are out of range.
    fn block_count(&self) -> usize;

    /// Table entry for `index`.
    fn next_block(&self, index: u32) -> Result<u32>;
}

/// Read access to a chained block store.
pub trait BlockSource: BlockTable {
    /// Payload of block `index`.
    fn read_block(&self, index: u32) -> Result<&[u8]>;
}

/// Write access to a chained block store.
pub trait BlockStore: BlockSource {
    /// Overwrite the table entry for `index`.
    fn set_next_block(&mut self, index: u32, next: u32) -> Result<()>;

    /// Return the lowest-indexed `FREESECT` block, growing storage (and the
    /// table itself) when none is free. The block is not yet claimed.
    fn acquire_free_block(&mut self) -> Result<u32>;

    /// Overwrite part of block `index`, starting at `offset`.
    fn write_block(&mut self, index: u32, offset: usize, data: &[u8]) -> Result<()>;
}

/// Result of walking a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    /// Blocks in stream order.
    pub blocks: Vec<u32>,
    /// Where and why the walk stopped early, in lenient mode.
    pub fault: Option<(u32, ChainFault)>,
}

impl Chain {
    /// Whether the walk was cut short by corruption.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.fault.is_some()
    }
}

/// Walk the chain starting at `start`.
///
/// With a declared size, the chain must cover it and may not run more than
/// one block past it. Strict walks fail with [`Error::CorruptChain`] on the
/// first fault; lenient walks log a warning and return the prefix gathered
/// so far.
pub fn walk<S: BlockTable + ?Sized>(
    store: &S,
    start: u32,
    declared_size: Option<u64>,
    strict: bool,
) -> Result<Chain> {
    if declared_size == Some(0) {
        return Ok(Chain::default());
    }

    let block_size = store.block_size() as u64;
    let count = store.block_count();
    let mut visited = FixedBitSet::with_capacity(count);
    let mut blocks = Vec::new();
    let mut current = start;

    let fault = loop {
        if current == ENDOFCHAIN {
            match declared_size {
                Some(size) if (blocks.len() as u64) * block_size < size => {
                    break Some(ChainFault::TooShort);
                },
                _ => break None,
            }
        }
        if current > MAXREGSECT {
            break Some(ChainFault::UnexpectedSentinel);
        }
        if current as usize >= count {
            break Some(ChainFault::OutOfRange);
        }
        if visited.contains(current as usize) {
            break Some(ChainFault::Cycle);
        }
        if let Some(size) = declared_size
            && (blocks.len() as u64 + 1) * block_size > size + block_size
        {
            break Some(ChainFault::TooLong);
        }

        visited.insert(current as usize);
        blocks.push(current);
        current = store.next_block(current)?;
    };

    match fault {
        None => Ok(Chain {
            blocks,
            fault: None,
        }),
        Some(reason) if strict => Err(Error::CorruptChain {
            start,
            sector: current,
            reason,
        }),
        Some(reason) => {
            tracing::warn!(
                start,
                sector = current,
                %reason,
                kept = blocks.len(),
                "truncating corrupt chain"
            );
            Ok(Chain {
                blocks,
                fault: Some((current, reason)),
            })
        },
    }
}

/// Read a whole stream: concatenate the chain's blocks and cut to `size`.
///
/// Returns the bytes and whether the chain was truncated by corruption.
pub fn read_stream<S: BlockSource + ?Sized>(
    store: &S,
    start: u32,
    size: u64,
    strict: bool,
) -> Result<(Vec<u8>, bool)> {
    let chain = walk(store, start, Some(size), strict)?;
    let mut data = Vec::with_capacity(chain.blocks.len() * store.block_size());
    for &block in &chain.blocks {
        data.extend_from_slice(store.read_block(block)?);
    }
    data.truncate(size as usize);
    Ok((data, chain.is_truncated()))
}

/// Read a stream whose length is only known from its chain (directory,
/// MiniFAT).
pub fn read_unsized<S: BlockSource + ?Sized>(
    store: &S,
    start: u32,
    strict: bool,
) -> Result<(Vec<u8>, bool)> {
    let chain = walk(store, start, None, strict)?;
    let mut data = Vec::with_capacity(chain.blocks.len() * store.block_size());
    for &block in &chain.blocks {
        data.extend_from_slice(store.read_block(block)?);
    }
    Ok((data, chain.is_truncated()))
}

/// Claim one free block and link it after `last` (or start a new chain when
/// `last` is `ENDOFCHAIN`).
pub fn append_block<S: BlockStore + ?Sized>(store: &mut S, last: u32) -> Result<u32> {
    let block = store.acquire_free_block()?;
    store.set_next_block(block, ENDOFCHAIN)?;
    if last != ENDOFCHAIN {
        store.set_next_block(last, block)?;
    }
    tracing::trace!(block, after = last, "claimed block");
    Ok(block)
}

/// Allocate enough linked blocks for `byte_size` bytes.
///
/// Returns the blocks in chain order; empty for a zero size.
pub fn allocate_blocks<S: BlockStore + ?Sized>(store: &mut S, byte_size: u64) -> Result<Vec<u32>> {
    let count = byte_size.div_ceil(store.block_size() as u64) as usize;
    let mut blocks = Vec::with_capacity(count);
    let mut last = ENDOFCHAIN;
    for _ in 0..count {
        last = append_block(store, last)?;
        blocks.push(last);
    }
    Ok(blocks)
}

/// Allocate a chain for `byte_size` bytes and return its start block, or
/// `ENDOFCHAIN` for an empty stream.
pub fn allocate_chain<S: BlockStore + ?Sized>(store: &mut S, byte_size: u64) -> Result<u32> {
    let blocks = allocate_blocks(store, byte_size)?;
    Ok(blocks.first().copied().unwrap_or(ENDOFCHAIN))
}

/// Allocate a chain and fill it with `data`, zero-padding the last block.
pub fn write_chain<S: BlockStore + ?Sized>(store: &mut S, data: &[u8]) -> Result<u32> {
    let block_size = store.block_size();
    let blocks = allocate_blocks(store, data.len() as u64)?;
    for (&block, chunk) in blocks.iter().zip(data.chunks(block_size)) {
        write_padded(store, block, chunk)?;
    }
    Ok(blocks.first().copied().unwrap_or(ENDOFCHAIN))
}

/// Write `chunk` at the start of `block` and zero the remainder.
pub fn write_padded<S: BlockStore + ?Sized>(store: &mut S, block: u32, chunk: &[u8]) -> Result<()> {
    store.write_block(block, 0, chunk)?;
    let block_size = store.block_size();
    if chunk.len() < block_size {
        let zeros = vec![0u8; block_size - chunk.len()];
        store.write_block(block, chunk.len(), &zeros)?;
    }
    Ok(())
}

/// Mark every block of the chain starting at `start` as free.
///
/// The storage is not shrunk and the bytes are not cleared. Returns the
/// number of blocks released.
pub fn free_chain<S: BlockStore + ?Sized>(store: &mut S, start: u32, strict: bool) -> Result<usize> {
    if start == ENDOFCHAIN || start == FREESECT {
        return Ok(0);
    }
    let chain = walk(&*store, start, None, strict)?;
    for &block in &chain.blocks {
        store.set_next_block(block, FREESECT)?;
    }
    Ok(chain.blocks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory store for exercising the chain logic in isolation.
    struct VecStore {
        table: Vec<u32>,
        data: Vec<Vec<u8>>,
        block_size: usize,
    }

    impl VecStore {
        fn new(block_size: usize) -> Self {
            Self {
                table: Vec::new(),
                data: Vec::new(),
                block_size,
            }
        }
    }

    impl BlockTable for VecStore {
        fn block_size(&self) -> usize {
            self.block_size
        }
        fn block_count(&self) -> usize {
            self.table.len()
        }
        fn next_block(&self, index: u32) -> Result<u32> {
            self.table
                .get(index as usize)
                .copied()
                .ok_or(Error::OutOfBounds {
                    index: index as u64,
                    count: self.table.len() as u64,
                })
        }
    }

    impl BlockSource for VecStore {
        fn read_block(&self, index: u32) -> Result<&[u8]> {
            Ok(&self.data[index as usize])
        }
    }

    impl BlockStore for VecStore {
        fn set_next_block(&mut self, index: u32, next: u32) -> Result<()> {
            self.table[index as usize] = next;
            Ok(())
        }
        fn acquire_free_block(&mut self) -> Result<u32> {
            if let Some(pos) = self.table.iter().position(|&e| e == FREESECT) {
                return Ok(pos as u32);
            }
            self.table.push(FREESECT);
            self.data.push(vec![0; self.block_size]);
            Ok(self.table.len() as u32 - 1)
        }
        fn write_block(&mut self, index: u32, offset: usize, data: &[u8]) -> Result<()> {
            self.data[index as usize][offset..offset + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn test_allocate_links_in_order() {
        let mut store = VecStore::new(64);
        let start = allocate_chain(&mut store, 150).unwrap();
        assert_eq!(start, 0);
        assert_eq!(store.table, vec![1, 2, ENDOFCHAIN]);
    }

    #[test]
    fn test_empty_chain() {
        let mut store = VecStore::new(64);
        assert_eq!(allocate_chain(&mut store, 0).unwrap(), ENDOFCHAIN);
        assert!(store.table.is_empty());
        assert!(walk(&store, ENDOFCHAIN, None, true).unwrap().blocks.is_empty());
    }

    #[test]
    fn test_free_then_reuse_same_blocks() {
        let mut store = VecStore::new(64);
        let a = write_chain(&mut store, &[1u8; 200]).unwrap();
        let _b = write_chain(&mut store, &[2u8; 64]).unwrap();
        let a_blocks = walk(&store, a, Some(200), true).unwrap().blocks;

        assert_eq!(free_chain(&mut store, a, true).unwrap(), 4);
        let c = write_chain(&mut store, &[3u8; 200]).unwrap();
        assert_eq!(walk(&store, c, Some(200), true).unwrap().blocks, a_blocks);
    }

    #[test]
    fn test_read_truncates_to_size() {
        let mut store = VecStore::new(64);
        let start = write_chain(&mut store, &[9u8; 100]).unwrap();
        let (data, truncated) = read_stream(&store, start, 100, true).unwrap();
        assert_eq!(data, vec![9u8; 100]);
        assert!(!truncated);
        // Padding in the last block is zeroed
        assert!(store.data[1][36..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cycle_strict_and_lenient() {
        let mut store = VecStore::new(64);
        let start = write_chain(&mut store, &[5u8; 192]).unwrap();
        // 0 -> 1 -> 1 -> ...
        store.table[1] = 1;

        match walk(&store, start, None, true) {
            Err(Error::CorruptChain { reason, sector, .. }) => {
                assert_eq!(reason, ChainFault::Cycle);
                assert_eq!(sector, 1);
            },
            other => panic!("expected corrupt chain, got {other:?}"),
        }

        let chain = walk(&store, start, None, false).unwrap();
        assert_eq!(chain.blocks, vec![0, 1]);
        assert_eq!(chain.fault, Some((1, ChainFault::Cycle)));

        let (data, truncated) = read_stream(&store, start, 192, false).unwrap();
        assert!(truncated);
        assert_eq!(data.len(), 128);
    }

    #[test]
    fn test_chain_longer_than_declared() {
        let mut store = VecStore::new(64);
        let start = write_chain(&mut store, &[1u8; 256]).unwrap();
        // Four blocks cover 256 bytes: fine for 192 (one spare block), not for 100
        assert!(walk(&store, start, Some(192), true).is_ok());
        assert!(matches!(
            walk(&store, start, Some(100), true),
            Err(Error::CorruptChain {
                reason: ChainFault::TooLong,
                ..
            })
        ));
    }

    #[test]
    fn test_chain_shorter_than_declared() {
        let mut store = VecStore::new(64);
        let start = write_chain(&mut store, &[1u8; 64]).unwrap();
        assert!(matches!(
            walk(&store, start, Some(500), true),
            Err(Error::CorruptChain {
                reason: ChainFault::TooShort,
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_pointer() {
        let mut store = VecStore::new(64);
        let start = write_chain(&mut store, &[1u8; 64]).unwrap();
        store.table[0] = 42;
        assert!(matches!(
            walk(&store, start, None, true),
            Err(Error::CorruptChain {
                reason: ChainFault::OutOfRange,
                sector: 42,
                ..
            })
        ));
    }
}
