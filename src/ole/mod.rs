/// Constants for the compound file format
pub mod consts;

/// Container and parse options
mod config;

/// Header block codec
mod header;

/// Raw sector storage
mod sector;

/// Generic block-chain walking and allocation
mod chain;

/// FAT and the main block store
mod fat;

/// DIFAT loading and generation
mod difat;

/// MiniFAT and the ministream block store
mod minifat;

/// Directory entry codec and naming rules
mod property;

/// Property table and sibling trees
mod directory;

/// Entry paths
mod path;

/// Public entry snapshots
mod entry;

/// Document input and output streams
mod stream;

/// The container and its public API
mod file;

/// Listener-driven reading
mod reader;


// Re-export public types for convenient access
pub use config::{OleOptions, SectorSize};
pub use entry::{Entry, EntryKind, filetime_to_datetime};
pub use file::{Children, OleFile};
pub use header::{HeaderBlock, is_ole_file};
pub use path::DocumentPath;
pub use reader::{DocumentEvent, OleEventReader};
pub use stream::{DocumentInputStream, DocumentOutputStream, Tier};
