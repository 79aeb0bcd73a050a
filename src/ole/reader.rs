//! Listener-driven reading
//!
//! [`OleEventReader`] walks a container once and hands each document to the
//! listeners interested in it. Only the header and the tables (FAT,
//! directory, MiniFAT) are loaded up front; document sectors are fetched
//! from the source as each document is dispatched, so at most one document
//! is in memory at a time and documents nobody listens for are never read.
//! Corrupt chains are read leniently by default: the listener gets the
//! readable prefix and `truncated` is set.

use super::chain::{self, Chain};
use super::config::OleOptions;
use super::consts::*;
use super::difat;
use super::directory::PropertyTable;
use super::fat::{AllocationTable, TableView};
use super::header::HeaderBlock;
use super::minifat::MiniState;
use super::path::DocumentPath;
use super::property::{Property, PropertyKind};
use crate::common::binary::read_u32_array;
use crate::common::{Error, Result};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// One document delivered to a listener.
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    /// Directory holding the document
    pub path: DocumentPath,
    /// Document name
    pub name: String,
    /// Document content (possibly cut short, see `truncated`)
    pub data: Vec<u8>,
    /// Whether the document's chain was corrupt and `data` is a prefix
    pub truncated: bool,
}

impl DocumentEvent {
    /// Full path of the document.
    pub fn document_path(&self) -> DocumentPath {
        self.path.child(self.name.as_str())
    }
}

type Listener = Box<dyn FnMut(&DocumentEvent) -> Result<()>>;

struct Registration {
    dir: DocumentPath,
    name: String,
    listener: Listener,
}

impl Registration {
    fn matches(&self, dir: &DocumentPath, name: &str) -> bool {
        self.dir.len() == dir.len()
            && eq_names(&self.name, name)
            && self
                .dir
                .components()
                .iter()
                .zip(dir.components())
                .all(|(a, b)| eq_names(a, b))
    }
}

fn eq_names(a: &str, b: &str) -> bool {
    a.to_uppercase() == b.to_uppercase()
}

/// Reads a container and dispatches documents to registered listeners.
///
/// ```
/// use poifs::ole::{OleEventReader, OleFile};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// # fn main() -> poifs::Result<()> {
/// let ole = OleFile::new();
/// ole.create_document("/", "WordDocument", b"text")?;
/// let bytes = ole.to_bytes()?;
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&seen);
/// let mut reader = OleEventReader::new();
/// reader.register_all(move |event| {
///     sink.borrow_mut().push(event.name.clone());
///     Ok(())
/// });
/// reader.read_bytes(bytes)?;
/// assert_eq!(*seen.borrow(), ["WordDocument"]);
/// # Ok(())
/// # }
/// ```
pub struct OleEventReader {
    options: OleOptions,
    all: Vec<Listener>,
    targeted: Vec<Registration>,
}

impl Default for OleEventReader {
    fn default() -> Self {
        Self::new()
    }
}

impl OleEventReader {
    /// Reader that tolerates corrupt chains.
    pub fn new() -> Self {
        Self::with_options(OleOptions::default().lenient())
    }

    /// Reader with explicit options (e.g. strict chain checking).
    pub fn with_options(options: OleOptions) -> Self {
        Self {
            options,
            all: Vec::new(),
            targeted: Vec::new(),
        }
    }

    /// Call `listener` for every document.
    pub fn register_all<F>(&mut self, listener: F)
    where
        F: FnMut(&DocumentEvent) -> Result<()> + 'static,
    {
        self.all.push(Box::new(listener));
    }

    /// Call `listener` only for document `name` in directory `dir`.
    /// Names are matched case-insensitively.
    pub fn register<F>(&mut self, dir: impl Into<DocumentPath>, name: &str, listener: F)
    where
        F: FnMut(&DocumentEvent) -> Result<()> + 'static,
    {
        self.targeted.push(Registration {
            dir: dir.into(),
            name: name.to_string(),
            listener: Box::new(listener),
        });
    }

    /// Read a container from `reader` and dispatch its documents, parents
    /// before children.
    ///
    /// Returns the number of documents delivered to at least one listener.
    /// The first listener error stops the walk. In strict mode every
    /// document chain is checked before the first listener runs.
    pub fn read<R: Read + Seek>(&mut self, reader: R) -> Result<usize> {
        let strict = self.options.strict;
        let (mut source, header) = SectorReader::open(reader)?;
        let layout = Layout::load(&mut source, header, strict)?;

        let documents: Vec<usize> = layout
            .props
            .preorder()
            .into_iter()
            .filter(|&slot| {
                layout
                    .props
                    .get(slot)
                    .is_some_and(|p| p.kind == PropertyKind::Document)
            })
            .collect();
        if strict {
            for &slot in &documents {
                if let Some(prop) = layout.props.get(slot) {
                    layout.walk(prop, source.sector_count, true)?;
                }
            }
        }

        let mut delivered = 0;
        for slot in documents {
            let Some(prop) = layout.props.get(slot) else {
                continue;
            };
            let path = layout.props.path_of(slot);
            let dir = path.parent().unwrap_or_default();
            let name = prop.name.clone();
            if self.all.is_empty() && !self.targeted.iter().any(|r| r.matches(&dir, &name)) {
                continue;
            }

            let (data, truncated) = layout.read_document(&mut source, prop, strict)?;
            if truncated {
                tracing::warn!(path = %path, readable = data.len(), "delivering truncated document");
            }

            let event = DocumentEvent {
                path: dir,
                name,
                data,
                truncated,
            };

            let mut hit = false;
            for listener in &mut self.all {
                listener(&event)?;
                hit = true;
            }
            for registration in &mut self.targeted {
                if registration.matches(&event.path, &event.name) {
                    (registration.listener)(&event)?;
                    hit = true;
                }
            }
            if hit {
                delivered += 1;
            }
        }

        tracing::debug!(delivered, "dispatched documents");
        Ok(delivered)
    }

    /// [`read`](Self::read) over an in-memory container.
    pub fn read_bytes(&mut self, data: Vec<u8>) -> Result<usize> {
        self.read(Cursor::new(data))
    }
}

/// Sector-addressed access to a seekable container source.
struct SectorReader<R> {
    inner: R,
    sector_size: usize,
    sector_count: usize,
}

impl<R: Read + Seek> SectorReader<R> {
    /// Parse the header and size up the source.
    fn open(mut inner: R) -> Result<(Self, HeaderBlock)> {
        let file_len = inner
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io("measuring container", e))?;
        if file_len < HEADER_SIZE as u64 {
            return Err(Error::NotOleFile);
        }
        let head = read_span(&mut inner, 0, HEADER_SIZE)?;
        let header = HeaderBlock::parse(&head)?;
        let sector_size = header.sector_size.bytes();
        if file_len < sector_size as u64 {
            return Err(Error::InvalidFormat(format!(
                "File of {} bytes is shorter than its {}-byte header sector",
                file_len, sector_size
            )));
        }

        let body_len = file_len - sector_size as u64;
        if body_len % sector_size as u64 != 0 {
            tracing::warn!(body_len, sector_size, "file ends in a partial sector; zero-padding it");
        }
        let source = Self {
            inner,
            sector_size,
            sector_count: body_len.div_ceil(sector_size as u64) as usize,
        };
        Ok((source, header))
    }

    /// `len` bytes of `sector` starting at `offset`, zero-padded past the
    /// end of the source.
    fn read_at(&mut self, sector: u32, offset: usize, len: usize) -> Result<Vec<u8>> {
        if sector as usize >= self.sector_count {
            return Err(Error::OutOfBounds {
                index: sector as u64,
                count: self.sector_count as u64,
            });
        }
        let position = (sector as u64 + 1) * self.sector_size as u64 + offset as u64;
        read_span(&mut self.inner, position, len)
    }

    fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
        self.read_at(sector, 0, self.sector_size)
    }

    /// Concatenated sectors of a main chain.
    fn read_chain(&mut self, chain: &Chain) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(chain.blocks.len() * self.sector_size);
        for &sector in &chain.blocks {
            data.extend(self.read_sector(sector)?);
        }
        Ok(data)
    }
}

fn read_span<R: Read + Seek>(inner: &mut R, position: u64, len: usize) -> Result<Vec<u8>> {
    inner
        .seek(SeekFrom::Start(position))
        .map_err(|e| Error::io("seeking in container", e))?;
    let mut buf = Vec::with_capacity(len);
    inner
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| Error::io("reading container", e))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// The tables of a container, without any document content.
struct Layout {
    header: HeaderBlock,
    fat: AllocationTable,
    props: PropertyTable,
    mini: MiniState,
}

impl Layout {
    fn load<R: Read + Seek>(
        source: &mut SectorReader<R>,
        header: HeaderBlock,
        strict: bool,
    ) -> Result<Self> {
        let sector_size = source.sector_size;
        let sector_count = source.sector_count;
        header.validate_against(sector_count)?;

        let (fat_sectors, _) = difat::load_with(&header, sector_size, sector_count, |id| {
            source.read_sector(id)
        })?;
        let mut entries = Vec::with_capacity(fat_sectors.len() * sector_size / 4);
        for &sector in &fat_sectors {
            entries.extend(read_u32_array(&source.read_sector(sector)?));
        }
        let fat = AllocationTable::from_entries(entries);
        let main = TableView::new(&fat, sector_size, sector_count);

        let dir_chain = chain::walk(&main, header.first_dir_sector, None, strict)?;
        if dir_chain.is_truncated() {
            tracing::warn!("directory chain truncated; some entries may be missing");
        }
        let props = PropertyTable::parse(&source.read_chain(&dir_chain)?, header.sector_size, strict)?;

        let mini_table = if header.first_minifat_sector == ENDOFCHAIN {
            AllocationTable::new()
        } else {
            let minifat_chain = chain::walk(&main, header.first_minifat_sector, None, strict)?;
            AllocationTable::from_entries(read_u32_array(&source.read_chain(&minifat_chain)?))
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

        tracing::debug!(
            sector_size,
            sectors = sector_count,
            fat_sectors = fat_sectors.len(),
            "loaded container tables"
        );
        Ok(Self {
            header,
            fat,
            props,
            mini,
        })
    }

    fn is_mini(&self, prop: &Property) -> bool {
        prop.size < self.header.mini_stream_cutoff as u64
    }

    /// Walk a document's chain in the tier its size puts it in.
    fn walk(&self, prop: &Property, sector_count: usize, strict: bool) -> Result<Chain> {
        let sector_size = self.header.sector_size.bytes();
        if self.is_mini(prop) {
            let view = TableView::new(&self.mini.table, MINI_SECTOR_SIZE, self.mini.capacity(sector_size));
            chain::walk(&view, prop.start, Some(prop.size), strict)
        } else {
            let view = TableView::new(&self.fat, sector_size, sector_count);
            chain::walk(&view, prop.start, Some(prop.size), strict)
        }
    }

    /// Fetch a document's content. Returns the bytes and whether the chain
    /// was cut short by corruption.
    fn read_document<R: Read + Seek>(
        &self,
        source: &mut SectorReader<R>,
        prop: &Property,
        strict: bool,
    ) -> Result<(Vec<u8>, bool)> {
        let chain = self.walk(prop, source.sector_count, strict)?;
        let mut data = if self.is_mini(prop) {
            let mut data = Vec::with_capacity(chain.blocks.len() * MINI_SECTOR_SIZE);
            for &block in &chain.blocks {
                let (sector, offset) = self.mini.locate(block, source.sector_size)?;
                data.extend(source.read_at(sector, offset, MINI_SECTOR_SIZE)?);
            }
            data
        } else {
            source.read_chain(&chain)?
        };
        data.truncate(prop.size as usize);
        Ok((data, chain.is_truncated()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::OleFile;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Seekable source that tallies the bytes handed out by `read`.
    struct CountingSource {
        inner: Cursor<Vec<u8>>,
        consumed: Rc<Cell<u64>>,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.consumed.set(self.consumed.get() + n as u64);
            Ok(n)
        }
    }

    impl Seek for CountingSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn sample() -> Vec<u8> {
        let ole = OleFile::new();
        ole.create_document("/", "First", b"one").unwrap();
        ole.create_directory("/", "Dir").unwrap();
        ole.create_document("/Dir", "Inner", &[7u8; 5000]).unwrap();
        ole.to_bytes().unwrap()
    }

    #[test]
    fn test_register_all_sees_every_document() {
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&names);
        let mut reader = OleEventReader::new();
        reader.register_all(move |event| {
            sink.borrow_mut().push(event.document_path().to_string());
            Ok(())
        });

        assert_eq!(reader.read_bytes(sample()).unwrap(), 2);
        let mut names = names.borrow().clone();
        names.sort();
        assert_eq!(names, ["/Dir/Inner", "/First"]);
    }

    #[test]
    fn test_targeted_listener_is_case_insensitive() {
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&sizes);
        let mut reader = OleEventReader::new();
        reader.register("/dir", "INNER", move |event| {
            assert!(!event.truncated);
            sink.borrow_mut().push(event.data.len());
            Ok(())
        });

        assert_eq!(reader.read(std::io::Cursor::new(sample())).unwrap(), 1);
        assert_eq!(*sizes.borrow(), [5000]);
    }

    #[test]
    fn test_listener_error_stops_reading() {
        let mut reader = OleEventReader::new();
        reader.register_all(|_| Err(Error::InvalidData("stop".into())));
        assert!(matches!(reader.read_bytes(sample()), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_rejects_non_ole_input() {
        let mut reader = OleEventReader::new();
        assert!(reader.read_bytes(vec![0u8; 600]).unwrap_err().is_format_error());
    }

    #[test]
    fn test_only_requested_documents_are_fetched() {
        let big: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let ole = OleFile::new();
        ole.create_document("/", "Big", &big).unwrap();
        ole.create_document("/", "Small", b"tiny payload").unwrap();
        let bytes = ole.to_bytes().unwrap();
        let total = bytes.len() as u64;

        let consumed = Rc::new(Cell::new(0));
        let source = CountingSource {
            inner: Cursor::new(bytes),
            consumed: Rc::clone(&consumed),
        };
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut reader = OleEventReader::new();
        reader.register("/", "Small", move |event| {
            sink.borrow_mut().push(event.data.clone());
            Ok(())
        });

        assert_eq!(reader.read(source).unwrap(), 1);
        assert_eq!(*seen.borrow(), [b"tiny payload".to_vec()]);
        assert!(consumed.get() < 16 * 1024, "read {} of {} bytes", consumed.get(), total);
    }

    #[test]
    fn test_streamed_content_matches_random_access() {
        let ole = OleFile::new();
        for (i, size) in [0usize, 63, 65, 700, 4095, 4096, 9000].into_iter().enumerate() {
            let content: Vec<u8> = (0..size).map(|b| (b as u8).wrapping_add(i as u8)).collect();
            ole.create_document("/", &format!("Doc{i}"), &content).unwrap();
        }
        let bytes = ole.to_bytes().unwrap();
        let reopened = OleFile::from_bytes(bytes.clone()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut reader = OleEventReader::with_options(OleOptions::new());
        reader.register_all(move |event| {
            sink.borrow_mut().push((event.document_path(), event.data.clone()));
            Ok(())
        });
        assert_eq!(reader.read_bytes(bytes).unwrap(), 7);

        for (path, data) in seen.borrow().iter() {
            assert_eq!(*data, reopened.read_document(path).unwrap(), "{path}");
        }
    }
}
