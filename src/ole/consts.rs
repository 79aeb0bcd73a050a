/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Minimal size of an empty OLE file with 512-byte sectors (1536 bytes)
pub const MINIMAL_OLEFILE_SIZE: usize = 1536;

/// Size of the header structure in bytes (the header sector may be larger)
pub const HEADER_SIZE: usize = 512;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Default sector size for version 3 (512 bytes)
pub const SECTOR_SIZE_V3: usize = 512;

/// Default sector size for version 4 (4096 bytes)
pub const SECTOR_SIZE_V4: usize = 4096;

/// Mini sector size (2^6)
pub const MINI_SECTOR_SIZE: usize = 64;

/// Mini sector shift written to new headers
pub const MINI_SECTOR_SHIFT: u16 = 6;

/// Documents strictly smaller than this live in the mini stream
pub const MINI_STREAM_CUTOFF: u32 = 4096;

/// Number of FAT sector slots held inline in the header
pub const HEADER_DIFAT_SLOTS: usize = 109;

/// Minor version written to new headers
pub const MINOR_VERSION: u16 = 0x003E;

/// Little-endian byte order mark
pub const BYTE_ORDER_LE: u16 = 0xFFFE;

/// Longest entry name in UTF-16 code units (excluding the terminator)
pub const MAX_NAME_LEN: usize = 31;

/// Name written for the root entry
pub const ROOT_ENTRY_NAME: &str = "Root Entry";

// Sector IDs (from AAF specifications)
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes a DIFAT sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

// Directory Entry IDs (from AAF specifications)
/// Maximum directory entry ID
pub const MAXREGSID: u32 = 0xFFFFFFFA; // -6
/// Unallocated directory entry
pub const NOSTREAM: u32 = 0xFFFFFFFF; // -1

// Object types in storage (from AAF specifications)
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;

// Red-black tree node colors
/// Red node
pub const COLOR_RED: u8 = 0;
/// Black node
pub const COLOR_BLACK: u8 = 1;
