//! Document stream handles
//!
//! [`DocumentInputStream`] gives random-access reads over one document;
//! [`DocumentOutputStream`] replaces a document's content with an
//! append-only write. Both borrow the container through a shared handle and
//! check on every call that the container is still open and that the entry
//! has not been deleted or rewritten since the handle was created.
//!
//! # Storage tier
//!
//! A writer keeps everything in memory until either the buffer reaches the
//! mini-stream cutoff or the stream is closed. Only then is the tier known:
//! crossing the cutoff commits to main sectors (allocated as they fill),
//! closing below it stores the bytes in the ministream.

use super::chain::{self, BlockTable};
use super::consts::{ENDOFCHAIN, MINI_SECTOR_SIZE};
use super::file::Container;
use crate::common::binary;
use crate::common::{Error, Result};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// Which allocation table a document's chain lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Regular sectors chained by the FAT
    Main,
    /// 64-byte mini sectors chained by the MiniFAT
    Mini,
}

/// Random-access reader over one document.
///
/// The chain is resolved when the stream is opened; reads fetch blocks on
/// demand. Implements [`io::Read`] and [`io::Seek`].
pub struct DocumentInputStream {
    container: Rc<RefCell<Container>>,
    slot: usize,
    generation: u64,
    tier: Tier,
    blocks: Vec<u32>,
    block_size: usize,
    size: u64,
    position: u64,
    mark: u64,
    truncated: bool,
    closed: bool,
}

impl DocumentInputStream {
    pub(crate) fn open(container: Rc<RefCell<Container>>, slot: usize) -> Result<Self> {
        let (generation, tier, chain, declared, block_size) = {
            let inner = container.borrow();
            inner.ensure_open()?;
            let prop = inner.document(slot)?;
            let tier = inner.tier_of(prop);
            let chain = inner.walk(tier, prop.start, prop.size)?;
            let block_size = match tier {
                Tier::Main => inner.main.block_size(),
                Tier::Mini => MINI_SECTOR_SIZE,
            };
            (prop.generation, tier, chain, prop.size, block_size)
        };

        let truncated = chain.is_truncated();
        let size = if truncated {
            declared.min((chain.blocks.len() * block_size) as u64)
        } else {
            declared
        };

        Ok(Self {
            container,
            slot,
            generation,
            tier,
            blocks: chain.blocks,
            block_size,
            size,
            position: 0,
            mark: 0,
            truncated,
            closed: false,
        })
    }

    /// Readable size in bytes. Shorter than the declared size when a
    /// lenient open cut a corrupt chain.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read offset.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Storage tier the document was read from.
    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Whether the chain was cut short by corruption.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes left before end of stream.
    pub fn available(&self) -> Result<u64> {
        self.check()?;
        Ok(self.size - self.position)
    }

    /// Read up to `buf.len()` bytes; returns 0 at end of stream.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check()?;
        let remaining = (self.size - self.position) as usize;
        let wanted = buf.len().min(remaining);
        let inner = self.container.borrow();

        let mut done = 0;
        while done < wanted {
            let block_index = (self.position as usize) / self.block_size;
            let offset = (self.position as usize) % self.block_size;
            let block = *self.blocks.get(block_index).ok_or(Error::OutOfBounds {
                index: block_index as u64,
                count: self.blocks.len() as u64,
            })?;
            let take = (self.block_size - offset).min(wanted - done);
            inner.copy_block(self.tier, block, offset, &mut buf[done..done + take])?;
            done += take;
            self.position += take as u64;
        }
        Ok(done)
    }

    /// Fill `buf` completely or fail with `OutOfBounds` without consuming.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.available()?;
        if (buf.len() as u64) > available {
            return Err(Error::OutOfBounds {
                index: self.position + buf.len() as u64,
                count: self.size,
            });
        }
        self.read_bytes(buf)?;
        Ok(())
    }

    /// Advance by up to `n` bytes, returning how far it moved.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        let step = n.min(self.available()?);
        self.position += step;
        Ok(step)
    }

    /// Move to an absolute offset within the stream.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.check()?;
        if offset > self.size {
            return Err(Error::OutOfBounds {
                index: offset,
                count: self.size,
            });
        }
        self.position = offset;
        Ok(())
    }

    /// Remember the current offset for [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = self.position;
    }

    /// Return to the last mark (the start when never marked).
    pub fn reset(&mut self) -> Result<()> {
        self.check()?;
        self.position = self.mark;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_fully(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_fully(&mut buf)?;
        Ok(binary::read_u16_le(&buf, 0)?)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_fully(&mut buf)?;
        Ok(binary::read_u32_le(&buf, 0)?)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_fully(&mut buf)?;
        Ok(binary::read_u64_le(&buf, 0)?)
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        self.read_u16_le().map(|v| v as i16)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.read_u32_le().map(|v| v as i32)
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        self.read_u64_le().map(|v| v as i64)
    }

    /// Read everything from the current offset to the end.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.available()? as usize];
        self.read_bytes(&mut data)?;
        Ok(data)
    }

    /// Release the handle. Later reads fail with `HandleInvalid`.
    pub fn close(&mut self) {
        self.closed = true;
        self.blocks = Vec::new();
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(Error::HandleInvalid);
        }
        self.container.borrow().check_handle(self.slot, self.generation)
    }
}

impl io::Read for DocumentInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl io::Seek for DocumentInputStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            io::SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}

impl std::fmt::Debug for DocumentInputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentInputStream")
            .field("slot", &self.slot)
            .field("tier", &self.tier)
            .field("size", &self.size)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Main-tier write progress once the stream has crossed the cutoff.
#[derive(Debug, Clone, Copy)]
struct Committed {
    first: u32,
    last: u32,
}

/// Append-only writer replacing one document's content.
///
/// The document's size and start sector change only in [`close`], which is
/// idempotent and also runs on drop. Implements [`io::Write`].
///
/// [`close`]: DocumentOutputStream::close
pub struct DocumentOutputStream {
    container: Rc<RefCell<Container>>,
    slot: usize,
    generation: u64,
    buffer: Vec<u8>,
    committed: Option<Committed>,
    written: u64,
    limit: Option<u64>,
    closed: bool,
}

impl DocumentOutputStream {
    pub(crate) fn open(
        container: Rc<RefCell<Container>>,
        slot: usize,
        limit: Option<u64>,
    ) -> Result<Self> {
        let generation = container.borrow_mut().begin_write(slot)?;
        Ok(Self {
            container,
            slot,
            generation,
            buffer: Vec::new(),
            committed: None,
            written: 0,
            limit,
            closed: false,
        })
    }

    /// Bytes written so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Byte limit given at open, if any.
    #[inline]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether [`close`](Self::close) has run.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append `data`. Nothing is written when the limit would be exceeded.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::WriteAfterClose);
        }
        let attempted = self.written + data.len() as u64;
        if let Some(limit) = self.limit
            && attempted > limit
        {
            return Err(Error::LimitExceeded { limit, attempted });
        }

        let mut inner = self.container.borrow_mut();
        inner.check_handle(self.slot, self.generation)?;
        self.buffer.extend_from_slice(data);
        self.written = attempted;

        if self.committed.is_none() && self.buffer.len() as u64 >= inner.cutoff() {
            tracing::trace!(slot = self.slot, "document crossed mini cutoff");
            self.committed = Some(Committed {
                first: ENDOFCHAIN,
                last: ENDOFCHAIN,
            });
        }
        if let Some(committed) = self.committed.as_mut() {
            let sector_size = inner.main.block_size();
            let full = self.buffer.len() / sector_size * sector_size;
            for chunk in self.buffer[..full].chunks(sector_size) {
                let sector = chain::append_block(&mut inner.main, committed.last)?;
                chain::write_padded(&mut inner.main, sector, chunk)?;
                if committed.first == ENDOFCHAIN {
                    committed.first = sector;
                }
                committed.last = sector;
            }
            self.buffer.drain(..full);
        }
        Ok(())
    }

    /// Finish the write and publish size and start sector on the entry.
    ///
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut inner = self.container.borrow_mut();
        if let Err(err) = inner.check_handle(self.slot, self.generation) {
            // The entry was deleted or rewritten under us; sectors already
            // committed belong to no entry and go back to the free pool.
            self.buffer = Vec::new();
            if let Some(committed) = self.committed.take()
                && inner.ensure_open().is_ok()
            {
                let freed = chain::free_chain(&mut inner.main, committed.first, false)?;
                tracing::debug!(slot = self.slot, freed, "released sectors of abandoned write");
            }
            return Err(err);
        }

        let start = match self.committed {
            Some(mut committed) => {
                if !self.buffer.is_empty() {
                    let sector = chain::append_block(&mut inner.main, committed.last)?;
                    chain::write_padded(&mut inner.main, sector, &self.buffer)?;
                    if committed.first == ENDOFCHAIN {
                        committed.first = sector;
                    }
                }
                committed.first
            },
            None if self.buffer.is_empty() => ENDOFCHAIN,
            None => chain::write_chain(&mut inner.mini_store(), &self.buffer)?,
        };
        self.buffer = Vec::new();
        inner.finish_write(self.slot, start, self.written)?;

        tracing::debug!(
            slot = self.slot,
            size = self.written,
            mini = self.committed.is_none() && self.written > 0,
            "closed document stream"
        );
        Ok(())
    }
}

impl io::Write for DocumentOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DocumentOutputStream {
    fn drop(&mut self) {
        if !self.closed
            && let Err(err) = self.close()
        {
            tracing::warn!(slot = self.slot, error = %err, "failed to close document stream on drop");
        }
    }
}

impl std::fmt::Debug for DocumentOutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentOutputStream")
            .field("slot", &self.slot)
            .field("written", &self.written)
            .field("limit", &self.limit)
            .field("committed", &self.committed.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
