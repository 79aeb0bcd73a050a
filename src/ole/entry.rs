//! Public snapshots of directory entries.

use super::path::DocumentPath;
use super::property::{Property, PropertyKind};
use chrono::{DateTime, Utc};

/// 100-nanosecond intervals between 1601-01-01 and the Unix epoch.
const WINDOWS_EPOCH_OFFSET: i64 = 116_444_736_000_000_000;

/// Convert a FILETIME to UTC. Zero (unset) and out-of-range values give `None`.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let ticks = i64::try_from(filetime).ok()?.checked_sub(WINDOWS_EPOCH_OFFSET)?;
    DateTime::from_timestamp(
        ticks.div_euclid(10_000_000),
        (ticks.rem_euclid(10_000_000) * 100) as u32,
    )
}

/// Kind of an entry as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Root,
    Directory,
    Document,
}

impl From<PropertyKind> for EntryKind {
    fn from(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Root => EntryKind::Root,
            PropertyKind::Directory => EntryKind::Directory,
            PropertyKind::Document => EntryKind::Document,
        }
    }
}

/// Directory entry information
///
/// A detached copy: later changes to the container are not reflected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path of the entry
    pub path: DocumentPath,
    /// Entry name (`"Root Entry"` for the root)
    pub name: String,
    /// Root, directory or document
    pub kind: EntryKind,
    /// Document size in bytes; ministream size for the root, zero for directories
    pub size: u64,
    /// Class ID
    pub clsid: [u8; 16],
    /// User-defined state bits
    pub state_bits: u32,
    /// Creation time (FILETIME)
    pub created: u64,
    /// Modification time (FILETIME)
    pub modified: u64,
}

impl Entry {
    pub(crate) fn from_property(path: DocumentPath, prop: &Property) -> Self {
        Self {
            path,
            name: prop.name.clone(),
            kind: prop.kind.into(),
            size: prop.size,
            clsid: prop.clsid,
            state_bits: prop.state_bits,
            created: prop.created,
            modified: prop.modified,
        }
    }

    /// Whether this entry is a document (stream).
    #[inline]
    pub fn is_document(&self) -> bool {
        self.kind == EntryKind::Document
    }

    /// Whether this entry is the root or a directory (storage).
    #[inline]
    pub fn is_directory(&self) -> bool {
        !self.is_document()
    }

    /// Creation time, when set.
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.created)
    }

    /// Modification time, when set.
    pub fn modified_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.modified)
    }

    /// Class ID formatted as a GUID string, or `None` when it is all zero.
    pub fn clsid_string(&self) -> Option<String> {
        if self.clsid.iter().all(|&b| b == 0) {
            return None;
        }
        let c = &self.clsid;
        Some(format!(
            "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            c[3], c[2], c[1], c[0], c[5], c[4], c[7], c[6],
            c[8], c[9], c[10], c[11], c[12], c[13], c[14], c[15]
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clsid_string() {
        let mut prop = Property::root();
        let entry = Entry::from_property(DocumentPath::root(), &prop);
        assert_eq!(entry.clsid_string(), None);

        // Word 97-2003 document
        prop.clsid = [
            0x06, 0x09, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x46,
        ];
        let entry = Entry::from_property(DocumentPath::root(), &prop);
        assert_eq!(
            entry.clsid_string().as_deref(),
            Some("00020906-0000-0000-C000-000000000046")
        );
        assert!(entry.is_directory());
    }

    #[test]
    fn test_filetime_conversion() {
        assert_eq!(filetime_to_datetime(0), None);
        let epoch = filetime_to_datetime(WINDOWS_EPOCH_OFFSET as u64).unwrap();
        assert_eq!(epoch.timestamp(), 0);
        // 2009-02-13 23:31:30 UTC
        let t = filetime_to_datetime(128_790_414_900_000_000).unwrap();
        assert_eq!(t.timestamp(), 1_234_567_890);
    }
}
