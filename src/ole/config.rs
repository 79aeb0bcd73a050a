//! Configuration types for opening and creating containers.
//!
//! # Examples
//!
//! ```rust
//! use poifs::ole::{OleOptions, SectorSize};
//!
//! // Strict, 512-byte sectors
//! let options = OleOptions::default();
//!
//! // Recovery tooling: tolerate broken chains
//! let options = OleOptions::new()
//!     .with_sector_size(SectorSize::Large)
//!     .lenient();
//! assert!(!options.strict);
//! ```

use super::consts::{SECTOR_SIZE_V3, SECTOR_SIZE_V4};

/// Sector size of a container, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectorSize {
    /// 512-byte sectors (major version 3)
    #[default]
    Small,
    /// 4096-byte sectors (major version 4)
    Large,
}

impl SectorSize {
    /// Sector size in bytes.
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            SectorSize::Small => SECTOR_SIZE_V3,
            SectorSize::Large => SECTOR_SIZE_V4,
        }
    }

    /// Power-of-two exponent stored in the header.
    #[inline]
    pub fn shift(self) -> u16 {
        match self {
            SectorSize::Small => 9,
            SectorSize::Large => 12,
        }
    }

    /// Major version that goes with this sector size.
    #[inline]
    pub fn major_version(self) -> u16 {
        match self {
            SectorSize::Small => 3,
            SectorSize::Large => 4,
        }
    }

    /// Map a header sector-size exponent back to a size, if supported.
    pub fn from_shift(shift: u16) -> Option<Self> {
        match shift {
            9 => Some(SectorSize::Small),
            12 => Some(SectorSize::Large),
            _ => None,
        }
    }
}

/// Options controlling how a container is created or parsed.
#[derive(Debug, Clone)]
pub struct OleOptions {
    /// Sector size for newly created containers. Ignored when opening;
    /// the header decides.
    pub sector_size: SectorSize,
    /// Fail on corrupt chains and malformed directory trees instead of
    /// truncating them.
    pub strict: bool,
}

impl Default for OleOptions {
    fn default() -> Self {
        Self {
            sector_size: SectorSize::Small,
            strict: true,
        }
    }
}

impl OleOptions {
    /// Create options with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sector size used for new containers.
    #[inline]
    pub fn with_sector_size(mut self, size: SectorSize) -> Self {
        self.sector_size = size;
        self
    }

    /// Set strict or lenient parsing.
    #[inline]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Shorthand for `with_strict(false)`.
    ///
    /// Lenient parsing is lossy: corrupt chains are cut at the fault and
    /// unreachable directory entries are dropped, each with a warning.
    #[inline]
    pub fn lenient(self) -> Self {
        self.with_strict(false)
    }
}
