//! Directory entry (property) records
//!
//! Each entry is a fixed 128-byte record. This module converts between the
//! on-disk record and [`Property`], validates names, and defines the
//! sibling ordering used to build the per-directory search tree.
//!
//! ## Directory Entry Ordering
//!
//! Siblings are ordered the way Microsoft readers expect:
//!
//! 1. **Sort by name length first** (shorter names come before longer names)
//! 2. **Then sort alphabetically** (case-insensitive) for same-length names
//! 3. **Special case**: `_VBA_PROJECT` always comes last
//! 4. **Special case**: Names starting with `__` are pushed later
//!
//! Lengths are counted in UTF-16 code units, which is what the record stores.

use super::config::SectorSize;
use super::consts::*;
use crate::common::{Error, Result};
use encoding_rs::UTF_16LE;
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32, U64};
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes};

/// Raw directory entry structure (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes, DeriveIntoBytes, Immutable)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    /// Left sibling SID
    sid_left: U32<LE>,
    /// Right sibling SID
    sid_right: U32<LE>,
    /// Child SID
    sid_child: U32<LE>,
    /// CLSID (16 bytes)
    clsid: [u8; 16],
    /// State bits
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    /// Starting sector
    start_sector: U32<LE>,
    /// Stream size
    stream_size: U64<LE>,
}

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// The root storage; owns the ministream
    Root,
    /// A storage (directory)
    Directory,
    /// A stream (document)
    Document,
}

impl PropertyKind {
    fn from_raw(value: u8) -> Option<Self> {
        match value {
            STGTY_ROOT => Some(PropertyKind::Root),
            STGTY_STORAGE => Some(PropertyKind::Directory),
            STGTY_STREAM => Some(PropertyKind::Document),
            _ => None,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            PropertyKind::Root => STGTY_ROOT,
            PropertyKind::Directory => STGTY_STORAGE,
            PropertyKind::Document => STGTY_STREAM,
        }
    }

    /// Root or directory.
    #[inline]
    pub fn is_directory(self) -> bool {
        !matches!(self, PropertyKind::Document)
    }
}

/// One node of the directory tree.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    /// FILETIME, preserved as read
    pub created: u64,
    /// FILETIME, preserved as read
    pub modified: u64,
    /// First block of the data, in the main or mini tier
    pub start: u32,
    pub size: u64,
    /// Slot of the containing directory; `None` only for the root
    pub parent: Option<usize>,
    /// Child slots in sibling order
    pub children: Vec<usize>,
    /// Bumped whenever the content is replaced or the entry is removed
    pub generation: u64,
}

impl Property {
    fn blank(name: String, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            clsid: [0; 16],
            state_bits: 0,
            created: 0,
            modified: 0,
            start: ENDOFCHAIN,
            size: 0,
            parent: None,
            children: Vec::new(),
            generation: 0,
        }
    }

    /// The root entry of a new container.
    pub fn root() -> Self {
        Self::blank(ROOT_ENTRY_NAME.to_string(), PropertyKind::Root)
    }

    /// An empty document.
    pub fn document(name: impl Into<String>) -> Self {
        Self::blank(name.into(), PropertyKind::Document)
    }

    /// An empty directory.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::blank(name.into(), PropertyKind::Directory)
    }
}

/// Tree links of a record as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    pub left: u32,
    pub right: u32,
    pub child: u32,
}

impl Links {
    pub const NONE: Links = Links {
        left: NOSTREAM,
        right: NOSTREAM,
        child: NOSTREAM,
    };
}

/// Decode one 128-byte record. Unused slots decode to `None`.
pub fn decode(data: &[u8], sector_size: SectorSize) -> Result<Option<(Property, Links)>> {
    let raw = RawDirectoryEntry::read_from_bytes(data)
        .map_err(|_| Error::InvalidData("Failed to parse directory entry".to_string()))?;

    if raw.entry_type == STGTY_EMPTY {
        return Ok(None);
    }
    let kind = PropertyKind::from_raw(raw.entry_type).ok_or_else(|| {
        Error::InvalidData(format!("Unknown directory entry type {}", raw.entry_type))
    })?;

    let name_len = (raw.name_len.get() as usize).min(raw.name.len());
    let name_bytes = &raw.name[..name_len.saturating_sub(2) & !1];
    let (decoded, _) = UTF_16LE.decode_without_bom_handling(name_bytes);
    let name = decoded.trim_end_matches('\0').to_string();

    // Version 3 readers must ignore the high half of the size
    let size = match sector_size {
        SectorSize::Small => raw.stream_size.get() & 0xFFFF_FFFF,
        SectorSize::Large => raw.stream_size.get(),
    };

    let property = Property {
        name,
        kind,
        clsid: raw.clsid,
        state_bits: raw.state_bits.get(),
        created: raw.creation_time.get(),
        modified: raw.modified_time.get(),
        start: raw.start_sector.get(),
        size,
        parent: None,
        children: Vec::new(),
        generation: 0,
    };
    let links = Links {
        left: raw.sid_left.get(),
        right: raw.sid_right.get(),
        child: raw.sid_child.get(),
    };
    Ok(Some((property, links)))
}

/// Encode a record with the given tree links and node color.
pub fn encode(property: &Property, links: Links, color: u8) -> [u8; DIRENTRY_SIZE] {
    let mut name = [0u8; 64];
    let mut units = 0;
    for (i, unit) in property.name.encode_utf16().take(MAX_NAME_LEN).enumerate() {
        name[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        units += 1;
    }

    let raw = RawDirectoryEntry {
        name,
        name_len: U16::new(((units + 1) * 2) as u16),
        entry_type: property.kind.to_raw(),
        node_color: color,
        sid_left: U32::new(links.left),
        sid_right: U32::new(links.right),
        sid_child: U32::new(links.child),
        clsid: property.clsid,
        state_bits: U32::new(property.state_bits),
        creation_time: U64::new(property.created),
        modified_time: U64::new(property.modified),
        start_sector: U32::new(property.start),
        stream_size: U64::new(property.size),
    };

    let mut out = [0u8; DIRENTRY_SIZE];
    out.copy_from_slice(raw.as_bytes());
    out
}

/// Record for an unused directory slot.
pub fn encode_empty() -> [u8; DIRENTRY_SIZE] {
    let mut out = [0u8; DIRENTRY_SIZE];
    out[68..80].fill(0xFF);
    out
}

/// Check a new entry name: 1 to 31 UTF-16 units, none of `/ \ : !`.
pub fn validate_name(name: &str) -> Result<()> {
    let units = name.encode_utf16().count();
    if units == 0 || units > MAX_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "{:?} must be 1 to {} UTF-16 units long",
            name, MAX_NAME_LEN
        )));
    }
    if let Some(bad) = name.chars().find(|c| matches!(c, '/' | '\\' | ':' | '!')) {
        return Err(Error::InvalidName(format!(
            "{:?} contains forbidden character {:?}",
            name, bad
        )));
    }
    Ok(())
}

/// Sort key for siblings: shorter names first, then uppercase comparison.
/// Names that differ only in case compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    len: usize,
    upper: String,
}

impl CollationKey {
    pub fn new(name: &str) -> Self {
        Self {
            len: name.encode_utf16().count(),
            upper: name.to_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_document() {
        let mut prop = Property::document("WordDocument");
        prop.start = 7;
        prop.size = 10_000;
        prop.clsid = [3; 16];
        prop.created = 0x01D0_0000_0000_0000;
        let links = Links {
            left: 2,
            right: NOSTREAM,
            child: NOSTREAM,
        };

        let bytes = encode(&prop, links, COLOR_RED);
        assert_eq!(&bytes[64..66], &26u16.to_le_bytes());
        assert_eq!(bytes[66], STGTY_STREAM);
        assert_eq!(bytes[67], COLOR_RED);

        let (decoded, decoded_links) = decode(&bytes, SectorSize::Small).unwrap().unwrap();
        assert_eq!(decoded.name, "WordDocument");
        assert_eq!(decoded.kind, PropertyKind::Document);
        assert_eq!(decoded.start, 7);
        assert_eq!(decoded.size, 10_000);
        assert_eq!(decoded.clsid, [3; 16]);
        assert_eq!(decoded.created, 0x01D0_0000_0000_0000);
        assert_eq!(decoded_links, links);
    }

    #[test]
    fn test_empty_slot() {
        assert!(decode(&encode_empty(), SectorSize::Small).unwrap().is_none());
    }

    #[test]
    fn test_v3_ignores_size_high_half() {
        let mut prop = Property::document("x");
        prop.size = 0x0000_0001_0000_0010;
        let bytes = encode(&prop, Links::NONE, COLOR_BLACK);
        let (small, _) = decode(&bytes, SectorSize::Small).unwrap().unwrap();
        let (large, _) = decode(&bytes, SectorSize::Large).unwrap().unwrap();
        assert_eq!(small.size, 0x10);
        assert_eq!(large.size, 0x0000_0001_0000_0010);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = encode(&Property::document("x"), Links::NONE, COLOR_BLACK);
        bytes[66] = 9;
        assert!(matches!(
            decode(&bytes, SectorSize::Small),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("Data").is_ok());
        assert!(validate_name("\u{5}SummaryInformation").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(32)).is_err());
        assert!(validate_name(&"a".repeat(31)).is_ok());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a!b").is_err());
    }

    #[test]
    fn test_collation_order() {
        let mut names = vec!["WordDocument", "1Table", "Data", "_VBA_PROJECT", "__SRP_0", "ABCDEFGHIJKL", "abc"];
        names.sort_by_key(|n| CollationKey::new(n));
        assert_eq!(
            names,
            vec!["abc", "Data", "1Table", "__SRP_0", "ABCDEFGHIJKL", "WordDocument", "_VBA_PROJECT"]
        );
        assert_eq!(CollationKey::new("data"), CollationKey::new("DATA"));
        // Leading underscores get no special treatment
        assert!(CollationKey::new("ZZ") < CollationKey::new("__A"));
        assert!(CollationKey::new("BB") < CollationKey::new("_A"));
    }
}
