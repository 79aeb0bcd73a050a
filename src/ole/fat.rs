//! FAT (File Allocation Table) and the main-sector block store
//!
//! The FAT maps sector numbers to the next sector in a chain, enabling
//! variable-length streams to be stored in the compound file.
//!
//! # Implementation Notes
//!
//! - Regular sectors use positive chain values
//! - FAT sectors are marked with FATSECT (0xFFFFFFFD)
//! - DIFAT sectors are marked with DIFSECT (0xFFFFFFFC)
//! - End of chain is marked with ENDOFCHAIN (0xFFFFFFFE)
//! - Free sectors are marked with FREESECT (0xFFFFFFFF)
//!
//! The table describes the sectors that hold it. When no free entry is
//! left, a new FAT sector is placed at the first index the grown table
//! covers and marks itself `FATSECT` in its own first slot, so the table is
//! always consistent before any data sector relies on it. Table contents
//! are written back into their sectors only when the container is saved.

use super::chain::{BlockSource, BlockStore, BlockTable};
use super::consts::*;
use super::difat;
use super::sector::SectorList;
use crate::common::binary::{read_u32_array, write_u32_blocks};
use crate::common::{Error, Result};

/// One allocation table: an entry per block holding the next block or a
/// sentinel. Used for both the FAT and the MiniFAT.
#[derive(Debug, Clone, Default)]
pub struct AllocationTable {
    entries: Vec<u32>,
    /// No `FREESECT` entry exists below this index
    free_hint: usize,
}

impl AllocationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap entries read from disk.
    pub fn from_entries(entries: Vec<u32>) -> Self {
        Self {
            entries,
            free_hint: 0,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `index`.
    pub fn get(&self, index: u32) -> Result<u32> {
        self.entries
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfBounds {
                index: index as u64,
                count: self.entries.len() as u64,
            })
    }

    /// Overwrite the entry for `index`.
    pub fn set(&mut self, index: u32, value: u32) -> Result<()> {
        let count = self.entries.len();
        let slot = self
            .entries
            .get_mut(index as usize)
            .ok_or(Error::OutOfBounds {
                index: index as u64,
                count: count as u64,
            })?;
        *slot = value;
        if value == FREESECT && (index as usize) < self.free_hint {
            self.free_hint = index as usize;
        }
        Ok(())
    }

    /// Lowest-indexed free entry, if any.
    pub fn first_free(&mut self) -> Option<u32> {
        let found = self.entries[self.free_hint..]
            .iter()
            .position(|&entry| entry == FREESECT)
            .map(|pos| self.free_hint + pos);
        self.free_hint = found.unwrap_or(self.entries.len());
        found.map(|index| index as u32)
    }

    /// Append `count` free entries.
    pub fn extend_free(&mut self, count: usize) {
        self.entries.resize(self.entries.len() + count, FREESECT);
    }

    /// All entries.
    #[inline]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Entries padded with `FREESECT` to whole sectors, ready to store.
    pub fn to_sector_bytes(&self, sector_size: usize) -> Vec<u8> {
        write_u32_blocks(&self.entries, sector_size, FREESECT)
    }
}

/// An allocation table on its own, for walking chains whose blocks are
/// not held in memory.
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    table: &'a AllocationTable,
    block_size: usize,
    block_count: usize,
}

impl<'a> TableView<'a> {
    /// `block_count` caps the usable entries, e.g. at the sectors present.
    pub fn new(table: &'a AllocationTable, block_size: usize, block_count: usize) -> Self {
        Self {
            table,
            block_size,
            block_count: block_count.min(table.len()),
        }
    }
}

impl BlockTable for TableView<'_> {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_count(&self) -> usize {
        self.block_count
    }

    #[inline]
    fn next_block(&self, index: u32) -> Result<u32> {
        self.table.get(index)
    }
}

/// Main sector storage together with the FAT that chains it.
#[derive(Debug, Clone)]
pub struct MainStore {
    sectors: SectorList,
    table: AllocationTable,
    /// Sectors holding the FAT, in table order
    fat_sectors: Vec<u32>,
    /// Sectors holding the DIFAT, in chain order
    difat_sectors: Vec<u32>,
}

impl MainStore {
    /// Empty store for a new container. The first allocation creates the
    /// first FAT sector at index 0.
    pub fn new(sector_size: usize) -> Self {
        Self {
            sectors: SectorList::new(sector_size),
            table: AllocationTable::new(),
            fat_sectors: Vec::new(),
            difat_sectors: Vec::new(),
        }
    }

    /// Load the FAT named by `fat_sectors` out of `sectors`.
    pub fn load(sectors: SectorList, fat_sectors: Vec<u32>, difat_sectors: Vec<u32>) -> Result<Self> {
        let entries_per_sector = sectors.sector_size() / 4;
        let mut entries = Vec::with_capacity(fat_sectors.len() * entries_per_sector);
        for &sector in &fat_sectors {
            entries.extend(read_u32_array(sectors.get(sector)?));
        }
        tracing::debug!(
            fat_sectors = fat_sectors.len(),
            difat_sectors = difat_sectors.len(),
            sectors = sectors.count(),
            "loaded allocation table"
        );
        Ok(Self {
            sectors,
            table: AllocationTable::from_entries(entries),
            fat_sectors,
            difat_sectors,
        })
    }

    /// Sector storage.
    #[inline]
    pub fn sectors(&self) -> &SectorList {
        &self.sectors
    }

    /// The FAT.
    #[inline]
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Sectors holding the FAT.
    #[inline]
    pub fn fat_sectors(&self) -> &[u32] {
        &self.fat_sectors
    }

    /// Sectors holding the DIFAT.
    #[inline]
    pub fn difat_sectors(&self) -> &[u32] {
        &self.difat_sectors
    }

    /// Write the FAT and DIFAT into the sectors reserved for them.
    ///
    /// Must run after the last allocation of a save; it allocates nothing
    /// itself.
    pub fn write_tables(&mut self) -> Result<()> {
        let sector_size = self.sectors.sector_size();
        let entries_per_sector = sector_size / 4;
        let fat_bytes = self.table.to_sector_bytes(sector_size);
        for (i, &sector) in self.fat_sectors.iter().enumerate() {
            let start = i * entries_per_sector * 4;
            self.sectors
                .write(sector, 0, &fat_bytes[start..start + sector_size])?;
        }

        let difat_blocks = difat::generate(&self.fat_sectors, &self.difat_sectors, sector_size);
        for (&sector, block) in self.difat_sectors.iter().zip(difat_blocks.iter()) {
            self.sectors.write(sector, 0, block)?;
        }
        Ok(())
    }

    /// Add one FAT sector (and a DIFAT sector when the header slots and
    /// existing DIFAT sectors are full).
    fn grow_table(&mut self) -> Result<()> {
        let sector_size = self.sectors.sector_size();
        let entries_per_sector = sector_size / 4;

        // The new FAT sector sits at the first index it describes
        let fat_sector = self.table.len() as u32;
        self.table.extend_free(entries_per_sector);
        self.table.set(fat_sector, FATSECT)?;
        self.sectors.extend_to(fat_sector as usize + 1);
        self.fat_sectors.push(fat_sector);

        if self.fat_sectors.len() > difat::capacity(self.difat_sectors.len(), sector_size) {
            let difat_sector = self.table.first_free().ok_or_else(|| {
                Error::InvalidData("FAT sector left no room for a DIFAT sector".to_string())
            })?;
            self.table.set(difat_sector, DIFSECT)?;
            self.sectors.extend_to(difat_sector as usize + 1);
            self.difat_sectors.push(difat_sector);
            tracing::debug!(difat_sector, "added DIFAT sector");
        }

        tracing::debug!(
            fat_sector,
            fat_sectors = self.fat_sectors.len(),
            "grew allocation table"
        );
        Ok(())
    }
}

impl BlockTable for MainStore {
    #[inline]
    fn block_size(&self) -> usize {
        self.sectors.sector_size()
    }

    #[inline]
    fn block_count(&self) -> usize {
        self.table.len().min(self.sectors.count())
    }

    #[inline]
    fn next_block(&self, index: u32) -> Result<u32> {
        self.table.get(index)
    }
}

impl BlockSource for MainStore {
    #[inline]
    fn read_block(&self, index: u32) -> Result<&[u8]> {
        self.sectors.get(index)
    }
}

impl BlockStore for MainStore {
    #[inline]
    fn set_next_block(&mut self, index: u32, next: u32) -> Result<()> {
        self.table.set(index, next)
    }

    fn acquire_free_block(&mut self) -> Result<u32> {
        loop {
            if let Some(index) = self.table.first_free() {
                // Free table entries past the end of the file get backing
                // storage on demand
                self.sectors.extend_to(index as usize + 1);
                return Ok(index);
            }
            self.grow_table()?;
        }
    }

    #[inline]
    fn write_block(&mut self, index: u32, offset: usize, data: &[u8]) -> Result<()> {
        self.sectors.write(index, offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::chain;

    #[test]
    fn test_table_first_free() {
        let mut table = AllocationTable::from_entries(vec![ENDOFCHAIN, FREESECT, 0, FREESECT]);
        assert_eq!(table.first_free(), Some(1));
        table.set(1, ENDOFCHAIN).unwrap();
        assert_eq!(table.first_free(), Some(3));
        table.set(3, ENDOFCHAIN).unwrap();
        assert_eq!(table.first_free(), None);
        // Freeing below the hint makes the entry visible again
        table.set(1, FREESECT).unwrap();
        assert_eq!(table.first_free(), Some(1));
    }

    #[test]
    fn test_table_padding() {
        let table = AllocationTable::from_entries(vec![1, ENDOFCHAIN]);
        let bytes = table.to_sector_bytes(512);
        assert_eq!(bytes.len(), 512);
        assert_eq!(read_u32_array(&bytes)[2], FREESECT);
    }

    #[test]
    fn test_first_allocation_creates_fat_sector() {
        let mut store = MainStore::new(512);
        let start = chain::allocate_chain(&mut store, 10).unwrap();

        assert_eq!(start, 1);
        assert_eq!(store.fat_sectors(), &[0]);
        assert_eq!(store.table().entries()[0], FATSECT);
        assert_eq!(store.table().entries()[1], ENDOFCHAIN);
        assert_eq!(store.table().len(), 128);
        assert_eq!(store.sectors().count(), 2);
    }

    #[test]
    fn test_table_grows_at_covered_index() {
        let mut store = MainStore::new(512);
        // 127 data sectors fill the first FAT sector
        chain::allocate_chain(&mut store, 127 * 512).unwrap();
        assert_eq!(store.fat_sectors(), &[0]);

        let next = chain::allocate_chain(&mut store, 1).unwrap();
        assert_eq!(store.fat_sectors(), &[0, 128]);
        assert_eq!(store.table().entries()[128], FATSECT);
        assert_eq!(next, 129);
    }

    #[test]
    fn test_difat_sector_added_past_header_slots() {
        let mut store = MainStore::new(512);
        // Enough data to need 110 FAT sectors
        let data_sectors = 109 * 127 + 1;
        chain::allocate_chain(&mut store, data_sectors as u64 * 512).unwrap();

        assert_eq!(store.fat_sectors().len(), 110);
        assert_eq!(store.difat_sectors().len(), 1);
        let difat_sector = store.difat_sectors()[0];
        assert_eq!(store.table().get(difat_sector).unwrap(), DIFSECT);
        assert_eq!(difat_sector, store.fat_sectors()[109] + 1);
    }

    #[test]
    fn test_write_tables_backfills_fat() {
        let mut store = MainStore::new(512);
        chain::allocate_chain(&mut store, 1024).unwrap();
        store.write_tables().unwrap();

        let fat = read_u32_array(store.sectors().get(0).unwrap());
        assert_eq!(&fat[..4], &[FATSECT, 2, ENDOFCHAIN, FREESECT]);
    }

    #[test]
    fn test_load_round_trip() {
        let mut store = MainStore::new(512);
        let start = chain::write_chain(&mut store, &[7u8; 700]).unwrap();
        store.write_tables().unwrap();

        let loaded = MainStore::load(store.sectors().clone(), vec![0], Vec::new()).unwrap();
        let (data, _) = chain::read_stream(&loaded, start, 700, true).unwrap();
        assert_eq!(data, vec![7u8; 700]);
    }
}
