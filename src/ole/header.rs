//! OLE2 header block
//!
//! Parses, validates and generates the 512-byte header at offset zero. For
//! 4096-byte sector files the header occupies a whole sector and the bytes
//! after the first 512 are zero.

use super::config::SectorSize;
use super::consts::*;
use crate::common::{Error, Result};
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32};
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes};

/// Raw OLE header structure (512 bytes)
///
/// This is the on-disk layout, field for field, per MS-CFB section 2.2.
#[derive(Debug, Clone, DeriveFromBytes, DeriveIntoBytes, Immutable)]
#[repr(C)]
struct RawHeader {
    /// Signature, always `MAGIC`
    signature: [u8; 8],
    /// Header CLSID, must be zero
    clsid: [u8; 16],
    /// Minor version (0x003E)
    minor_version: U16<LE>,
    /// Major version (3 or 4)
    major_version: U16<LE>,
    /// Byte order mark (0xFFFE)
    byte_order: U16<LE>,
    /// Sector size exponent
    sector_shift: U16<LE>,
    /// Mini sector size exponent
    mini_sector_shift: U16<LE>,
    /// Reserved, zero
    reserved: [u8; 6],
    /// Number of directory sectors (zero for version 3)
    num_dir_sectors: U32<LE>,
    /// Number of FAT sectors
    num_fat_sectors: U32<LE>,
    /// First directory sector
    first_dir_sector: U32<LE>,
    /// Transaction signature
    transaction_signature: U32<LE>,
    /// Mini stream cutoff size
    mini_stream_cutoff: U32<LE>,
    /// First MiniFAT sector
    first_minifat_sector: U32<LE>,
    /// Number of MiniFAT sectors
    num_minifat_sectors: U32<LE>,
    /// First DIFAT sector
    first_difat_sector: U32<LE>,
    /// Number of DIFAT sectors
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector locations
    difat: [U32<LE>; HEADER_DIFAT_SLOTS],
}

/// Decoded header block
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    /// Sector size of the container
    pub sector_size: SectorSize,
    /// Minor version as stored
    pub minor_version: u16,
    /// Number of directory sectors (meaningful for 4096-byte sectors only)
    pub num_dir_sectors: u32,
    /// Number of FAT sectors
    pub num_fat_sectors: u32,
    /// First sector of the directory stream
    pub first_dir_sector: u32,
    /// Transaction signature (preserved, never interpreted)
    pub transaction_signature: u32,
    /// Documents below this size live in the mini stream
    pub mini_stream_cutoff: u32,
    /// First MiniFAT sector or `ENDOFCHAIN`
    pub first_minifat_sector: u32,
    /// Number of MiniFAT sectors
    pub num_minifat_sectors: u32,
    /// First DIFAT sector or `ENDOFCHAIN`
    pub first_difat_sector: u32,
    /// Number of DIFAT sectors
    pub num_difat_sectors: u32,
    /// FAT sector locations held inline (at most 109)
    pub fat_sectors: Vec<u32>,
}

impl HeaderBlock {
    /// Header for a brand-new, empty container.
    pub fn new(sector_size: SectorSize) -> Self {
        Self {
            sector_size,
            minor_version: MINOR_VERSION,
            num_dir_sectors: 0,
            num_fat_sectors: 0,
            first_dir_sector: ENDOFCHAIN,
            transaction_signature: 0,
            mini_stream_cutoff: MINI_STREAM_CUTOFF,
            first_minifat_sector: ENDOFCHAIN,
            num_minifat_sectors: 0,
            first_difat_sector: ENDOFCHAIN,
            num_difat_sectors: 0,
            fat_sectors: Vec::new(),
        }
    }

    /// Parse and validate a header from the start of a container.
    ///
    /// Any inconsistency here is fatal: without a trustworthy header there is
    /// no way to locate the allocation table.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::NotOleFile);
        }
        if &data[0..8] != MAGIC {
            return Err(Error::NotOleFile);
        }

        let raw = RawHeader::read_from_bytes(&data[..HEADER_SIZE])
            .map_err(|_| Error::InvalidFormat("Failed to parse header".to_string()))?;

        if raw.byte_order.get() != BYTE_ORDER_LE {
            return Err(Error::InvalidFormat(format!(
                "Invalid byte order mark 0x{:04X}",
                raw.byte_order.get()
            )));
        }

        let shift = raw.sector_shift.get();
        let sector_size = SectorSize::from_shift(shift).ok_or_else(|| {
            Error::InvalidFormat(format!("Unsupported sector shift {}", shift))
        })?;

        let major = raw.major_version.get();
        if major != sector_size.major_version() {
            return Err(Error::InvalidFormat(format!(
                "Sector size mismatch: version {} with {}-byte sectors",
                major,
                sector_size.bytes()
            )));
        }

        if raw.mini_sector_shift.get() != MINI_SECTOR_SHIFT {
            return Err(Error::InvalidFormat(format!(
                "Unsupported mini sector shift {}",
                raw.mini_sector_shift.get()
            )));
        }

        let mini_stream_cutoff = raw.mini_stream_cutoff.get();
        if mini_stream_cutoff == 0 {
            return Err(Error::InvalidFormat(
                "Mini stream cutoff is zero".to_string(),
            ));
        }

        let num_fat_sectors = raw.num_fat_sectors.get();
        let inline = (num_fat_sectors as usize).min(HEADER_DIFAT_SLOTS);
        let mut fat_sectors = Vec::with_capacity(inline);
        for slot in raw.difat.iter().take(inline) {
            let sector = slot.get();
            if sector > MAXREGSECT {
                return Err(Error::InvalidFormat(format!(
                    "Header lists {} FAT sectors but slot {} is empty",
                    num_fat_sectors,
                    fat_sectors.len()
                )));
            }
            fat_sectors.push(sector);
        }

        let num_difat_sectors = raw.num_difat_sectors.get();
        if num_fat_sectors as usize > HEADER_DIFAT_SLOTS && num_difat_sectors == 0 {
            return Err(Error::InvalidFormat(
                "More than 109 FAT sectors but no DIFAT sectors".to_string(),
            ));
        }

        Ok(Self {
            sector_size,
            minor_version: raw.minor_version.get(),
            num_dir_sectors: raw.num_dir_sectors.get(),
            num_fat_sectors,
            first_dir_sector: raw.first_dir_sector.get(),
            transaction_signature: raw.transaction_signature.get(),
            mini_stream_cutoff,
            first_minifat_sector: raw.first_minifat_sector.get(),
            num_minifat_sectors: raw.num_minifat_sectors.get(),
            first_difat_sector: raw.first_difat_sector.get(),
            num_difat_sectors,
            fat_sectors,
        })
    }

    /// Check the header against the number of sectors actually present.
    pub fn validate_against(&self, sector_count: usize) -> Result<()> {
        let entries_per_sector = self.sector_size.bytes() / 4;
        let addressable = self.num_fat_sectors as usize * entries_per_sector;
        if sector_count > addressable {
            return Err(Error::InvalidFormat(format!(
                "File holds {} sectors but {} FAT sectors address only {}",
                sector_count, self.num_fat_sectors, addressable
            )));
        }
        for &sector in &self.fat_sectors {
            if sector as usize >= sector_count {
                return Err(Error::InvalidFormat(format!(
                    "FAT sector {} is beyond end of file ({} sectors)",
                    sector, sector_count
                )));
            }
        }
        if self.first_dir_sector as usize >= sector_count {
            return Err(Error::InvalidFormat(format!(
                "Directory start sector {} is beyond end of file",
                self.first_dir_sector
            )));
        }
        Ok(())
    }

    /// Generate the header sector
    ///
    /// Returns `sector_size` bytes: the 512-byte header followed by zero
    /// padding for 4096-byte sector files.
    pub fn generate(&self) -> Vec<u8> {
        let mut difat = [U32::<LE>::new(FREESECT); HEADER_DIFAT_SLOTS];
        for (slot, &sector) in difat.iter_mut().zip(self.fat_sectors.iter()) {
            *slot = U32::new(sector);
        }

        // csectDir must be zero for version 3 files
        let num_dir_sectors = match self.sector_size {
            SectorSize::Small => 0,
            SectorSize::Large => self.num_dir_sectors,
        };

        let raw = RawHeader {
            signature: *MAGIC,
            clsid: [0; 16],
            minor_version: U16::new(self.minor_version),
            major_version: U16::new(self.sector_size.major_version()),
            byte_order: U16::new(BYTE_ORDER_LE),
            sector_shift: U16::new(self.sector_size.shift()),
            mini_sector_shift: U16::new(MINI_SECTOR_SHIFT),
            reserved: [0; 6],
            num_dir_sectors: U32::new(num_dir_sectors),
            num_fat_sectors: U32::new(self.num_fat_sectors),
            first_dir_sector: U32::new(self.first_dir_sector),
            transaction_signature: U32::new(self.transaction_signature),
            mini_stream_cutoff: U32::new(self.mini_stream_cutoff),
            first_minifat_sector: U32::new(self.first_minifat_sector),
            num_minifat_sectors: U32::new(self.num_minifat_sectors),
            first_difat_sector: U32::new(self.first_difat_sector),
            num_difat_sectors: U32::new(self.num_difat_sectors),
            difat,
        };

        let mut header = vec![0u8; self.sector_size.bytes()];
        header[..HEADER_SIZE].copy_from_slice(raw.as_bytes());
        header
    }
}

/// Check if data looks like an OLE file by checking magic bytes
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && &data[0..8] == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_generation() {
        let mut header = HeaderBlock::new(SectorSize::Small);
        header.first_dir_sector = 10;
        header.fat_sectors = vec![1, 2, 3];
        header.num_fat_sectors = 3;

        let bytes = header.generate();

        assert_eq!(bytes.len(), 512);
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(&bytes[28..30], &0xFFFEu16.to_le_bytes()); // Little-endian marker
        assert_eq!(&bytes[76..80], &1u32.to_le_bytes());
        assert_eq!(&bytes[88..92], &FREESECT.to_le_bytes());
    }

    #[test]
    fn test_sector_size_512() {
        let bytes = HeaderBlock::new(SectorSize::Small).generate();

        // DLL version should be 3
        assert_eq!(&bytes[26..28], &3u16.to_le_bytes());
        // Sector shift should be 9 (2^9 = 512)
        assert_eq!(&bytes[30..32], &9u16.to_le_bytes());
    }

    #[test]
    fn test_sector_size_4096() {
        let mut header = HeaderBlock::new(SectorSize::Large);
        header.num_dir_sectors = 2;
        let bytes = header.generate();

        assert_eq!(bytes.len(), 4096);
        assert_eq!(&bytes[26..28], &4u16.to_le_bytes());
        assert_eq!(&bytes[30..32], &12u16.to_le_bytes());
        assert_eq!(&bytes[40..44], &2u32.to_le_bytes());
        assert!(bytes[512..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_generated() {
        let mut header = HeaderBlock::new(SectorSize::Small);
        header.first_dir_sector = 1;
        header.fat_sectors = vec![0];
        header.num_fat_sectors = 1;

        let parsed = HeaderBlock::parse(&header.generate()).unwrap();
        assert_eq!(parsed.sector_size, SectorSize::Small);
        assert_eq!(parsed.first_dir_sector, 1);
        assert_eq!(parsed.fat_sectors, vec![0]);
        assert_eq!(parsed.mini_stream_cutoff, 4096);
        assert_eq!(parsed.first_minifat_sector, ENDOFCHAIN);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = HeaderBlock::new(SectorSize::Small).generate();
        bytes[0] = 0;
        assert!(matches!(HeaderBlock::parse(&bytes), Err(Error::NotOleFile)));
    }

    #[test]
    fn test_big_endian_marker_rejected() {
        let mut bytes = HeaderBlock::new(SectorSize::Small).generate();
        bytes[28..30].copy_from_slice(&0xFEFFu16.to_le_bytes());
        let err = HeaderBlock::parse(&bytes).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_version_sector_mismatch() {
        let mut bytes = HeaderBlock::new(SectorSize::Small).generate();
        bytes[26..28].copy_from_slice(&4u16.to_le_bytes());
        assert!(matches!(
            HeaderBlock::parse(&bytes),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = HeaderBlock::new(SectorSize::Small).generate();
        assert!(matches!(
            HeaderBlock::parse(&bytes[..100]),
            Err(Error::NotOleFile)
        ));
    }

    #[test]
    fn test_validate_against_length() {
        let mut header = HeaderBlock::new(SectorSize::Small);
        header.first_dir_sector = 1;
        header.fat_sectors = vec![5];
        header.num_fat_sectors = 1;
        assert!(header.validate_against(2).is_err());
        assert!(header.validate_against(6).is_ok());
        // One FAT sector addresses 128 sectors
        assert!(header.validate_against(129).is_err());
    }
}
