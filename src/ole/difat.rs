//! DIFAT (Double Indirect FAT) for OLE2 files
//!
//! The DIFAT is used when the FAT requires more than 109 sectors.
//! The header can store the first 109 FAT sector IDs, but additional
//! FAT sectors need to be tracked in DIFAT sectors.
//!
//! - Each DIFAT sector contains FAT sector IDs and a pointer to the next DIFAT sector
//! - For 512-byte sectors: 127 FAT sector IDs + 1 next pointer (128 * 4 = 512)
//! - For 4096-byte sectors: 1023 FAT sector IDs + 1 next pointer (1024 * 4 = 4096)

use super::consts::*;
use super::header::HeaderBlock;
use super::sector::SectorList;
use crate::common::binary::read_u32_array;
use crate::common::{Error, Result};
use fixedbitset::FixedBitSet;

/// FAT sector IDs one DIFAT sector holds.
#[inline]
pub fn ids_per_sector(sector_size: usize) -> usize {
    sector_size / 4 - 1
}

/// FAT sectors addressable by the header plus `difat_sectors` DIFAT sectors.
#[inline]
pub fn capacity(difat_sectors: usize, sector_size: usize) -> usize {
    HEADER_DIFAT_SLOTS + difat_sectors * ids_per_sector(sector_size)
}

/// Collect the FAT sector list from the header and the DIFAT chain.
///
/// Returns `(fat_sectors, difat_sectors)`. A DIFAT chain that loops, runs
/// off the end of the file or ends before listing every FAT sector makes
/// the header untrustworthy, so all of these are format errors.
pub fn load(header: &HeaderBlock, sectors: &SectorList) -> Result<(Vec<u32>, Vec<u32>)> {
    load_with(header, sectors.sector_size(), sectors.count(), |id| {
        sectors.get(id).map(<[u8]>::to_vec)
    })
}

/// Like [`load`], fetching each DIFAT sector through `read_sector`.
///
/// `sector_count` is the number of sectors the file holds; ids at or past
/// it are rejected before `read_sector` is called.
pub fn load_with<F>(
    header: &HeaderBlock,
    sector_size: usize,
    sector_count: usize,
    mut read_sector: F,
) -> Result<(Vec<u32>, Vec<u32>)>
where
    F: FnMut(u32) -> Result<Vec<u8>>,
{
    let wanted = header.num_fat_sectors as usize;
    let mut fat_sectors = header.fat_sectors.clone();
    let mut difat_sectors = Vec::new();

    let per_sector = ids_per_sector(sector_size);
    let mut visited = FixedBitSet::with_capacity(sector_count);
    let mut current = header.first_difat_sector;

    while fat_sectors.len() < wanted {
        if current > MAXREGSECT {
            return Err(Error::InvalidFormat(format!(
                "DIFAT chain ended after {} of {} FAT sectors",
                fat_sectors.len(),
                wanted
            )));
        }
        if current as usize >= sector_count {
            return Err(Error::InvalidFormat(format!(
                "DIFAT sector {} is beyond end of file",
                current
            )));
        }
        if visited.contains(current as usize) {
            return Err(Error::InvalidFormat(format!(
                "DIFAT chain loops at sector {}",
                current
            )));
        }
        visited.insert(current as usize);
        difat_sectors.push(current);

        let ids = read_u32_array(&read_sector(current)?);
        for &id in ids.iter().take(per_sector) {
            if fat_sectors.len() == wanted {
                break;
            }
            if id as usize >= sector_count {
                return Err(Error::InvalidFormat(format!(
                    "FAT sector {} listed in DIFAT is beyond end of file",
                    id
                )));
            }
            fat_sectors.push(id);
        }
        current = ids[per_sector];
    }

    if difat_sectors.len() != header.num_difat_sectors as usize {
        tracing::warn!(
            declared = header.num_difat_sectors,
            found = difat_sectors.len(),
            "DIFAT sector count disagrees with header"
        );
    }
    Ok((fat_sectors, difat_sectors))
}

/// Generate DIFAT sector contents
///
/// One block per entry of `difat_sectors`, each holding the FAT sector IDs
/// beyond the first 109, padded with `FREESECT`, and ending in the index of
/// the next DIFAT sector (or `ENDOFCHAIN` for the last one).
pub fn generate(fat_sectors: &[u32], difat_sectors: &[u32], sector_size: usize) -> Vec<Vec<u8>> {
    let per_sector = ids_per_sector(sector_size);
    let overflow = fat_sectors.get(HEADER_DIFAT_SLOTS..).unwrap_or(&[]);

    (0..difat_sectors.len())
        .map(|i| {
            let mut block = vec![0xFFu8; sector_size];
            let start = (i * per_sector).min(overflow.len());
            let end = ((i + 1) * per_sector).min(overflow.len());
            for (slot, &id) in overflow[start..end].iter().enumerate() {
                block[slot * 4..slot * 4 + 4].copy_from_slice(&id.to_le_bytes());
            }
            let next = difat_sectors.get(i + 1).copied().unwrap_or(ENDOFCHAIN);
            block[sector_size - 4..].copy_from_slice(&next.to_le_bytes());
            block
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::config::SectorSize;

    #[test]
    fn test_capacity() {
        assert_eq!(capacity(0, 512), 109);
        assert_eq!(capacity(1, 512), 109 + 127);
        assert_eq!(capacity(1, 4096), 109 + 1023);
    }

    #[test]
    fn test_generate_links_non_contiguous_sectors() {
        let fat_sectors: Vec<u32> = (0..(109 + 130)).collect();
        let blocks = generate(&fat_sectors, &[500, 300], 512);
        assert_eq!(blocks.len(), 2);

        let first = read_u32_array(&blocks[0]);
        assert_eq!(first[0], 109);
        assert_eq!(first[126], 109 + 126);
        assert_eq!(first[127], 300);

        let second = read_u32_array(&blocks[1]);
        assert_eq!(&second[..3], &[236, 237, 238]);
        assert_eq!(second[3], FREESECT);
        assert_eq!(second[127], ENDOFCHAIN);
    }

    #[test]
    fn test_no_difat_needed() {
        assert!(generate(&[0, 1, 2], &[], 512).is_empty());
    }

    #[test]
    fn test_load_follows_chain() {
        let mut sectors = SectorList::new(512);
        sectors.extend_to(400);
        let fat_sectors: Vec<u32> = (0..112).collect();
        let block = &generate(&fat_sectors, &[399], 512)[0];
        sectors.write(399, 0, block).unwrap();

        let mut header = HeaderBlock::new(SectorSize::Small);
        header.num_fat_sectors = 112;
        header.fat_sectors = (0..109).collect();
        header.first_difat_sector = 399;
        header.num_difat_sectors = 1;

        let (fat, difat) = load(&header, &sectors).unwrap();
        assert_eq!(fat, fat_sectors);
        assert_eq!(difat, vec![399]);
    }

    #[test]
    fn test_load_detects_loop() {
        let mut sectors = SectorList::new(512);
        sectors.extend_to(300);
        // DIFAT sector pointing at itself, holding no useful ids
        let mut block = vec![0u8; 512];
        block[508..512].copy_from_slice(&10u32.to_le_bytes());
        sectors.write(10, 0, &block).unwrap();

        let mut header = HeaderBlock::new(SectorSize::Small);
        header.num_fat_sectors = 109 + 200;
        header.fat_sectors = vec![0; 109];
        header.first_difat_sector = 10;
        header.num_difat_sectors = 2;

        assert!(matches!(
            load(&header, &sectors),
            Err(Error::InvalidFormat(_))
        ));
    }
}
