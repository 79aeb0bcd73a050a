//! The compound-file container
//!
//! [`OleFile`] owns the sector storage, both allocation tables and the
//! property table of one container, and hands out stream handles that
//! share it. Everything is single-threaded: handles hold an `Rc` to the
//! container state and validate themselves on every call.
//!
//! # Saving
//!
//! A container that was opened and never modified is written back exactly
//! as it was read. Otherwise the MiniFAT and directory streams are freed
//! and rewritten (the directory with freshly balanced sibling trees), and
//! the FAT and DIFAT are backfilled into the sectors reserved for them
//! during allocation. Data sectors of documents never move.

use super::chain::{self, BlockSource, BlockTable, Chain};
use super::config::{OleOptions, SectorSize};
use super::consts::*;
use super::difat;
use super::directory::PropertyTable;
use super::entry::Entry;
use super::fat::{AllocationTable, MainStore};
use super::header::HeaderBlock;
use super::minifat::{MiniState, MiniStore, MiniView};
use super::path::DocumentPath;
use super::property::{Property, PropertyKind};
use super::sector::SectorList;
use super::stream::{DocumentInputStream, DocumentOutputStream, Tier};
use crate::common::binary::read_u32_array;
use crate::common::{Error, Result};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;

/// Bytes of the file as it was read, for verbatim write-back.
#[derive(Debug)]
struct SourceImage {
    header_sector: Vec<u8>,
    body_len: usize,
}

/// Shared state behind an [`OleFile`] and its stream handles.
#[derive(Debug)]
pub(crate) struct Container {
    pub(crate) header: HeaderBlock,
    pub(crate) main: MainStore,
    pub(crate) mini: MiniState,
    pub(crate) props: PropertyTable,
    strict: bool,
    dirty: bool,
    closed: bool,
    source: Option<SourceImage>,
}

impl Container {
    fn new(options: &OleOptions) -> Self {
        Self {
            header: HeaderBlock::new(options.sector_size),
            main: MainStore::new(options.sector_size.bytes()),
            mini: MiniState::new(),
            props: PropertyTable::new(),
            strict: options.strict,
            dirty: true,
            closed: false,
            source: None,
        }
    }

    fn parse(mut data: Vec<u8>, options: &OleOptions) -> Result<Self> {
        let header = HeaderBlock::parse(&data)?;
        let strict = options.strict;
        let sector_size = header.sector_size.bytes();
        if data.len() < sector_size {
            return Err(Error::InvalidFormat(format!(
                "File of {} bytes is shorter than its {}-byte header sector",
                data.len(),
                sector_size
            )));
        }

        let body = data.split_off(sector_size);
        let body_len = body.len();
        let (sectors, padded) = SectorList::from_bytes(sector_size, body);
        if padded {
            tracing::warn!(body_len, sector_size, "file ends in a partial sector; zero-padding it");
        }
        header.validate_against(sectors.count())?;

        let (fat_sectors, difat_sectors) = difat::load(&header, &sectors)?;
        let main = MainStore::load(sectors, fat_sectors, difat_sectors)?;

        let (directory, dir_truncated) = chain::read_unsized(&main, header.first_dir_sector, strict)?;
        if dir_truncated {
            tracing::warn!("directory chain truncated; some entries may be missing");
        }
        let props = PropertyTable::parse(&directory, header.sector_size, strict)?;

        let mini_table = if header.first_minifat_sector == ENDOFCHAIN {
            AllocationTable::new()
        } else {
            let (bytes, _) = chain::read_unsized(&main, header.first_minifat_sector, strict)?;
            AllocationTable::from_entries(read_u32_array(&bytes))
        };
        let root = props.root()?;
        let stream_chain = if root.start == ENDOFCHAIN || root.size == 0 {
            Vec::new()
        } else {
            chain::walk(&main, root.start, Some(root.size), strict)?.blocks
        };
        let mini = MiniState {
            table: mini_table,
            stream_chain,
            stream_size: root.size,
        };

        let container = Self {
            header,
            main,
            mini,
            props,
            strict,
            dirty: false,
            closed: false,
            source: Some(SourceImage {
                header_sector: data,
                body_len,
            }),
        };
        if strict {
            container.validate_documents()?;
        }

        tracing::debug!(
            sector_size,
            sectors = container.main.sectors().count(),
            entries = container.props.preorder().len(),
            strict,
            "opened compound file"
        );
        Ok(container)
    }

    /// Walk every document chain strictly.
    fn validate_documents(&self) -> Result<()> {
        for slot in self.props.preorder() {
            if let Some(prop) = self.props.get(slot)
                && prop.kind == PropertyKind::Document
            {
                let tier = self.tier_of(prop);
                self.walk_with(tier, prop.start, prop.size, true)?;
            }
        }
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::HandleInvalid);
        }
        Ok(())
    }

    pub(crate) fn check_handle(&self, slot: usize, generation: u64) -> Result<()> {
        self.ensure_open()?;
        if !self.props.is_current(slot, generation) {
            return Err(Error::HandleInvalid);
        }
        Ok(())
    }

    /// Mini-stream cutoff in bytes.
    #[inline]
    pub(crate) fn cutoff(&self) -> u64 {
        self.header.mini_stream_cutoff as u64
    }

    pub(crate) fn tier_of(&self, prop: &Property) -> Tier {
        if prop.kind == PropertyKind::Document && prop.size < self.cutoff() {
            Tier::Mini
        } else {
            Tier::Main
        }
    }

    /// Document property in `slot`.
    pub(crate) fn document(&self, slot: usize) -> Result<&Property> {
        let prop = self
            .props
            .get(slot)
            .ok_or_else(|| Error::NotFound(format!("directory slot {}", slot)))?;
        if prop.kind != PropertyKind::Document {
            return Err(Error::NotADocument(prop.name.clone()));
        }
        Ok(prop)
    }

    pub(crate) fn walk(&self, tier: Tier, start: u32, size: u64) -> Result<Chain> {
        self.walk_with(tier, start, size, self.strict)
    }

    fn walk_with(&self, tier: Tier, start: u32, size: u64, strict: bool) -> Result<Chain> {
        match tier {
            Tier::Main => chain::walk(&self.main, start, Some(size), strict),
            Tier::Mini => chain::walk(&MiniView::new(&self.main, &self.mini), start, Some(size), strict),
        }
    }

    /// Copy `out.len()` bytes of `block`, starting at `offset`, into `out`.
    pub(crate) fn copy_block(&self, tier: Tier, block: u32, offset: usize, out: &mut [u8]) -> Result<()> {
        let end = offset + out.len();
        let mut copy = |data: &[u8]| out.copy_from_slice(&data[offset..end]);
        match tier {
            Tier::Main => copy(self.main.read_block(block)?),
            Tier::Mini => copy(MiniView::new(&self.main, &self.mini).read_block(block)?),
        }
        Ok(())
    }

    pub(crate) fn mini_store(&mut self) -> MiniStore<'_> {
        MiniStore::new(&mut self.main, &mut self.mini)
    }

    /// Release the data chain of `slot` in whichever tier holds it.
    fn free_content(&mut self, slot: usize) -> Result<()> {
        let prop = self.document(slot)?;
        if prop.size == 0 || prop.start == ENDOFCHAIN {
            return Ok(());
        }
        let (tier, start) = (self.tier_of(prop), prop.start);
        let freed = match tier {
            Tier::Main => chain::free_chain(&mut self.main, start, false)?,
            Tier::Mini => chain::free_chain(&mut self.mini_store(), start, false)?,
        };
        tracing::trace!(slot, ?tier, freed, "freed document chain");
        Ok(())
    }

    /// Drop the current content of `slot` ahead of a rewrite and return the
    /// generation the writer owns.
    pub(crate) fn begin_write(&mut self, slot: usize) -> Result<u64> {
        self.ensure_open()?;
        self.free_content(slot)?;
        if let Some(prop) = self.props.get_mut(slot) {
            prop.start = ENDOFCHAIN;
            prop.size = 0;
        }
        self.dirty = true;
        self.props
            .bump_generation(slot)
            .ok_or_else(|| Error::NotFound(format!("directory slot {}", slot)))
    }

    /// Publish the result of a write. Readers opened during the write are
    /// invalidated.
    pub(crate) fn finish_write(&mut self, slot: usize, start: u32, size: u64) -> Result<()> {
        let prop = self
            .props
            .get_mut(slot)
            .ok_or(Error::HandleInvalid)?;
        prop.start = start;
        prop.size = size;
        self.props.bump_generation(slot);
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, slot: usize) -> Result<()> {
        let is_document = self
            .props
            .get(slot)
            .is_some_and(|p| p.kind == PropertyKind::Document);
        if is_document {
            self.free_content(slot)?;
        }
        let removed = self.props.remove(slot)?;
        self.dirty = true;
        tracing::debug!(name = %removed.name, slot, "deleted entry");
        Ok(())
    }

    /// Rewrite the MiniFAT, root entry, directory and allocation tables.
    fn relayout(&mut self) -> Result<()> {
        let sector_size = self.header.sector_size;
        let bytes_per_sector = sector_size.bytes();

        chain::free_chain(&mut self.main, self.header.first_minifat_sector, false)?;
        let minifat = if self.mini.table.is_empty() {
            Vec::new()
        } else {
            self.mini.table.to_sector_bytes(bytes_per_sector)
        };
        let first_minifat = chain::write_chain(&mut self.main, &minifat)?;

        let root = self.props.root_mut()?;
        root.start = self.mini.stream_start();
        root.size = self.mini.stream_size;

        chain::free_chain(&mut self.main, self.header.first_dir_sector, false)?;
        let directory = self.props.serialize(sector_size);
        let first_dir = chain::write_chain(&mut self.main, &directory)?;

        self.main.write_tables()?;

        let fat_sectors = self.main.fat_sectors();
        let difat_sectors = self.main.difat_sectors();
        let header = &mut self.header;
        header.num_fat_sectors = fat_sectors.len() as u32;
        header.fat_sectors = fat_sectors.iter().take(HEADER_DIFAT_SLOTS).copied().collect();
        header.first_difat_sector = difat_sectors.first().copied().unwrap_or(ENDOFCHAIN);
        header.num_difat_sectors = difat_sectors.len() as u32;
        header.first_dir_sector = first_dir;
        header.num_dir_sectors = (directory.len() / bytes_per_sector) as u32;
        header.first_minifat_sector = first_minifat;
        header.num_minifat_sectors = (minifat.len() / bytes_per_sector) as u32;

        tracing::debug!(
            sectors = self.main.sectors().count(),
            fat_sectors = header.num_fat_sectors,
            difat_sectors = header.num_difat_sectors,
            directory_sectors = directory.len() / bytes_per_sector,
            minifat_sectors = header.num_minifat_sectors,
            "laid out compound file"
        );
        Ok(())
    }

    fn write_image<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        if !self.dirty
            && let Some(source) = &self.source
        {
            writer
                .write_all(&source.header_sector)
                .map_err(|e| Error::io("writing header sector", e))?;
            writer
                .write_all(&self.main.sectors().as_bytes()[..source.body_len])
                .map_err(|e| Error::io("writing sectors", e))?;
            return Ok(());
        }

        self.relayout()?;
        writer
            .write_all(&self.header.generate())
            .map_err(|e| Error::io("writing header sector", e))?;
        writer
            .write_all(self.main.sectors().as_bytes())
            .map_err(|e| Error::io("writing sectors", e))?;
        Ok(())
    }
}

/// An OLE2 compound file, opened from bytes or created empty.
///
/// All operations take `&self`; stream handles returned by
/// [`open_document`](Self::open_document) and
/// [`open_document_for_write`](Self::open_document_for_write) share the
/// container and stay usable while it is open.
///
/// ```
/// use poifs::ole::OleFile;
///
/// # fn main() -> poifs::Result<()> {
/// let ole = OleFile::new();
/// ole.create_directory("/", "Macros")?;
/// ole.create_document("/Macros", "Module1", b"Sub Main()")?;
///
/// let bytes = ole.to_bytes()?;
/// let reopened = OleFile::from_bytes(bytes)?;
/// assert_eq!(reopened.read_document("/Macros/Module1")?, b"Sub Main()");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OleFile {
    inner: Rc<RefCell<Container>>,
}

impl Default for OleFile {
    fn default() -> Self {
        Self::new()
    }
}

impl OleFile {
    /// Create an empty container with 512-byte sectors.
    pub fn new() -> Self {
        Self::with_options(OleOptions::default())
    }

    /// Create an empty container with the given options.
    pub fn with_options(options: OleOptions) -> Self {
        Self::wrap(Container::new(&options))
    }

    /// Read and parse a container, strictly.
    pub fn open<R: Read>(reader: R) -> Result<Self> {
        Self::open_with_options(reader, OleOptions::default())
    }

    /// Read and parse a container with the given options.
    pub fn open_with_options<R: Read>(mut reader: R, options: OleOptions) -> Result<Self> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| Error::io("reading container", e))?;
        Self::from_bytes_with_options(data, options)
    }

    /// Parse a container held in memory, strictly.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_options(data, OleOptions::default())
    }

    /// Parse a container held in memory with the given options.
    pub fn from_bytes_with_options(data: Vec<u8>, options: OleOptions) -> Result<Self> {
        Ok(Self::wrap(Container::parse(data, &options)?))
    }

    /// Open a container file on disk, strictly.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_path_with_options(path, OleOptions::default())
    }

    /// Open a container file on disk with the given options.
    pub fn open_path_with_options<P: AsRef<Path>>(path: P, options: OleOptions) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        Self::from_bytes_with_options(data, options)
    }

    fn wrap(container: Container) -> Self {
        Self {
            inner: Rc::new(RefCell::new(container)),
        }
    }

    /// Sector size of the container.
    pub fn sector_size(&self) -> SectorSize {
        self.inner.borrow().header.sector_size
    }

    /// Whether anything changed since the container was opened.
    pub fn is_modified(&self) -> bool {
        self.inner.borrow().dirty
    }

    /// The root entry.
    pub fn root(&self) -> Result<Entry> {
        self.entry(DocumentPath::root())
    }

    /// Look up an entry by path.
    pub fn entry(&self, path: impl Into<DocumentPath>) -> Result<Entry> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        let slot = inner.props.resolve(&path.into())?;
        let prop = inner.props.get(slot).ok_or(Error::HandleInvalid)?;
        Ok(Entry::from_property(inner.props.path_of(slot), prop))
    }

    /// Whether `path` names an entry.
    pub fn exists(&self, path: impl Into<DocumentPath>) -> bool {
        self.entry(path).is_ok()
    }

    /// Find `name` in directory `dir` (case-insensitive).
    pub fn find(&self, dir: impl Into<DocumentPath>, name: &str) -> Result<Entry> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        let dir = dir.into();
        let dir_slot = self.directory_slot(&inner, &dir)?;
        let slot = inner
            .props
            .find_child(dir_slot, name)
            .ok_or_else(|| Error::NotFound(dir.child(name).to_string()))?;
        let prop = inner.props.get(slot).ok_or(Error::HandleInvalid)?;
        Ok(Entry::from_property(inner.props.path_of(slot), prop))
    }

    /// Entries of directory `dir`, in sibling order.
    pub fn list(&self, dir: impl Into<DocumentPath>) -> Result<Vec<Entry>> {
        Ok(self.iter_children(dir)?.collect())
    }

    /// Lazily iterate over the entries of directory `dir`.
    ///
    /// The set of children is fixed when the iterator is created; entries
    /// deleted before they are reached are skipped. Calling this again
    /// restarts from the first child.
    pub fn iter_children(&self, dir: impl Into<DocumentPath>) -> Result<Children> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        let dir_slot = self.directory_slot(&inner, &dir.into())?;
        Ok(Children {
            container: Rc::clone(&self.inner),
            slots: inner.props.children(dir_slot).to_vec().into_iter(),
        })
    }

    /// Paths of every document, directories before their contents.
    pub fn list_documents(&self) -> Result<Vec<DocumentPath>> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        Ok(inner
            .props
            .preorder()
            .into_iter()
            .filter(|&slot| {
                inner
                    .props
                    .get(slot)
                    .is_some_and(|p| p.kind == PropertyKind::Document)
            })
            .map(|slot| inner.props.path_of(slot))
            .collect())
    }

    /// Size of a document in bytes.
    pub fn size(&self, path: impl Into<DocumentPath>) -> Result<u64> {
        Ok(self.entry(path)?.size)
    }

    /// Create an empty directory `name` inside `parent`.
    pub fn create_directory(&self, parent: impl Into<DocumentPath>, name: &str) -> Result<DocumentPath> {
        let parent = parent.into();
        let mut inner = self.inner.borrow_mut();
        inner.ensure_open()?;
        let parent_slot = self.directory_slot(&inner, &parent)?;
        inner.props.insert(parent_slot, Property::directory(name))?;
        inner.dirty = true;
        Ok(parent.child(name))
    }

    /// Create document `name` inside `parent` holding `data`.
    pub fn create_document(
        &self,
        parent: impl Into<DocumentPath>,
        name: &str,
        data: &[u8],
    ) -> Result<DocumentPath> {
        self.create_document_with(parent, name, data.len() as u64, |out| out.write_bytes(data))
    }

    /// Create document `name` of at most `size` bytes, filled by `writer`.
    ///
    /// The stream handed to `writer` rejects writes past `size` and is
    /// closed afterwards; the document's size is what was actually written.
    /// If `writer` fails the document is removed again.
    pub fn create_document_with<F>(
        &self,
        parent: impl Into<DocumentPath>,
        name: &str,
        size: u64,
        writer: F,
    ) -> Result<DocumentPath>
    where
        F: FnOnce(&mut DocumentOutputStream) -> Result<()>,
    {
        let parent = parent.into();
        let slot = {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_open()?;
            let parent_slot = self.directory_slot(&inner, &parent)?;
            let slot = inner.props.insert(parent_slot, Property::document(name))?;
            inner.dirty = true;
            slot
        };

        let mut out = DocumentOutputStream::open(Rc::clone(&self.inner), slot, Some(size))?;
        let result = writer(&mut out).and_then(|()| out.close());
        if let Err(err) = result {
            out.close().ok();
            self.inner.borrow_mut().delete(slot)?;
            return Err(err);
        }
        Ok(parent.child(name))
    }

    /// Open a document for reading.
    pub fn open_document(&self, path: impl Into<DocumentPath>) -> Result<DocumentInputStream> {
        let slot = self.resolve(&path.into())?;
        DocumentInputStream::open(Rc::clone(&self.inner), slot)
    }

    /// Read a whole document.
    pub fn read_document(&self, path: impl Into<DocumentPath>) -> Result<Vec<u8>> {
        self.open_document(path)?.read_to_vec()
    }

    /// Replace the content of an existing document.
    ///
    /// The old content is released immediately and the entry reads as
    /// empty until the returned stream is closed. Read handles opened
    /// before this call become invalid.
    pub fn open_document_for_write(
        &self,
        path: impl Into<DocumentPath>,
        limit: Option<u64>,
    ) -> Result<DocumentOutputStream> {
        let slot = self.resolve(&path.into())?;
        DocumentOutputStream::open(Rc::clone(&self.inner), slot, limit)
    }

    /// Delete a document or an empty directory.
    pub fn delete(&self, path: impl Into<DocumentPath>) -> Result<()> {
        let slot = self.resolve(&path.into())?;
        self.inner.borrow_mut().delete(slot)
    }

    /// Rename an entry within its directory, returning the new path.
    pub fn rename(&self, path: impl Into<DocumentPath>, new_name: &str) -> Result<DocumentPath> {
        let path = path.into();
        let slot = self.resolve(&path)?;
        let mut inner = self.inner.borrow_mut();
        inner.props.rename(slot, new_name)?;
        inner.dirty = true;
        Ok(inner.props.path_of(slot))
    }

    /// Set the class ID of an entry.
    pub fn set_clsid(&self, path: impl Into<DocumentPath>, clsid: [u8; 16]) -> Result<()> {
        let slot = self.resolve(&path.into())?;
        let mut inner = self.inner.borrow_mut();
        if let Some(prop) = inner.props.get_mut(slot) {
            prop.clsid = clsid;
        }
        inner.dirty = true;
        Ok(())
    }

    /// Tier and block indices of a document's chain.
    pub fn chain_of(&self, path: impl Into<DocumentPath>) -> Result<(Tier, Vec<u32>)> {
        let slot = self.resolve(&path.into())?;
        let inner = self.inner.borrow();
        let prop = inner.document(slot)?;
        let tier = inner.tier_of(prop);
        let chain = inner.walk(tier, prop.start, prop.size)?;
        Ok((tier, chain.blocks))
    }

    /// FAT entry for sector `index`.
    pub fn next_block(&self, index: u32) -> Result<u32> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        inner.main.next_block(index)
    }

    /// MiniFAT entry for mini sector `index`.
    pub fn mini_next_block(&self, index: u32) -> Result<u32> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        inner.mini.table.get(index)
    }

    /// Number of sectors after the header.
    pub fn sector_count(&self) -> usize {
        self.inner.borrow().main.sectors().count()
    }

    /// Serialize the container.
    ///
    /// Close output streams first; bytes still buffered in an open writer
    /// are not part of the image.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_open()?;
        inner.write_image(writer)
    }

    /// Serialize the container into memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serialize the container to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| Error::io(format!("writing {}", path.display()), e))
    }

    /// Close the container. Every handle, and this object, fails with
    /// `HandleInvalid` afterwards. Unsaved changes are discarded.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.closed {
            inner.closed = true;
            tracing::debug!(modified = inner.dirty, "closed compound file");
        }
    }

    fn resolve(&self, path: &DocumentPath) -> Result<usize> {
        let inner = self.inner.borrow();
        inner.ensure_open()?;
        inner.props.resolve(path)
    }

    fn directory_slot(&self, inner: &Container, dir: &DocumentPath) -> Result<usize> {
        let slot = inner.props.resolve(dir)?;
        match inner.props.get(slot) {
            Some(prop) if prop.kind.is_directory() => Ok(slot),
            Some(prop) => Err(Error::NotADirectory(prop.name.clone())),
            None => Err(Error::NotFound(dir.to_string())),
        }
    }
}

/// Iterator over the entries of one directory. See [`OleFile::iter_children`].
pub struct Children {
    container: Rc<RefCell<Container>>,
    slots: std::vec::IntoIter<usize>,
}

impl Iterator for Children {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let inner = self.container.borrow();
        if inner.closed {
            return None;
        }
        for slot in self.slots.by_ref() {
            if let Some(prop) = inner.props.get(slot) {
                return Some(Entry::from_property(inner.props.path_of(slot), prop));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::header::is_ole_file;

    #[test]
    fn test_empty_container_layout() {
        let ole = OleFile::new();
        let bytes = ole.to_bytes().unwrap();
        assert_eq!(bytes.len(), MINIMAL_OLEFILE_SIZE);
        assert!(is_ole_file(&bytes));

        let header = HeaderBlock::parse(&bytes).unwrap();
        assert_eq!(header.fat_sectors, vec![0]);
        assert_eq!(header.first_dir_sector, 1);
        assert_eq!(header.first_minifat_sector, ENDOFCHAIN);
    }

    #[test]
    fn test_unmodified_file_written_verbatim() {
        let ole = OleFile::new();
        ole.create_document("/", "A", &[1u8; 10]).unwrap();
        ole.create_document("/", "B", &[2u8; 5000]).unwrap();
        let bytes = ole.to_bytes().unwrap();

        let reopened = OleFile::from_bytes(bytes.clone()).unwrap();
        assert!(!reopened.is_modified());
        reopened.read_document("/B").unwrap();
        assert_eq!(reopened.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_relayout_is_stable() {
        let ole = OleFile::new();
        ole.create_document("/", "A", &[1u8; 700]).unwrap();
        let first = ole.to_bytes().unwrap();
        let second = ole.to_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let err = OleFile::from_bytes(vec![0u8; 2048]).unwrap_err();
        assert!(matches!(err, Error::NotOleFile));
        assert!(err.is_format_error());
    }

    #[test]
    fn test_closed_container_invalidates_handles() {
        let ole = OleFile::new();
        ole.create_document("/", "A", b"abc").unwrap();
        let mut stream = ole.open_document("/A").unwrap();
        ole.close();
        assert!(matches!(stream.read_u8(), Err(Error::HandleInvalid)));
        assert!(matches!(ole.entry("/A"), Err(Error::HandleInvalid)));
        assert!(matches!(ole.to_bytes(), Err(Error::HandleInvalid)));
    }

    #[test]
    fn test_validate_documents_strict_only() {
        let ole = OleFile::new();
        ole.create_document("/", "A", &[1u8; 100]).unwrap();
        let inner = ole.inner.borrow();
        assert!(inner.validate_documents().is_ok());
    }
}
