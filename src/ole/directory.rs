//! Property table: the directory tree of a container
//!
//! On disk the directory is a flat array of 128-byte records; each
//! directory's children form a binary search tree through left/right
//! sibling links, and the directory points at the tree's root through its
//! child link. In memory every property keeps its children as a vector in
//! sibling order, so lookups are a binary search and the on-disk tree is
//! only rebuilt when the table is serialized.
//!
//! ## Binary Search Tree Structure
//!
//! On serialization, each directory's sorted children are organized into a
//! balanced BST:
//! - The middle element becomes the root of each subtree
//! - Left subtree contains entries before the middle
//! - Right subtree contains entries after the middle
//!
//! Every level but the deepest is full, so colouring the deepest level red
//! and everything else black yields a valid red-black tree. Tree shape is
//! not preserved from the file that was read; only membership and entry
//! metadata are.

use super::config::SectorSize;
use super::consts::*;
use super::path::DocumentPath;
use super::property::{self, CollationKey, Links, Property, PropertyKind};
use crate::common::{Error, Result};
use fixedbitset::FixedBitSet;

/// Slot of the root entry.
pub const ROOT: usize = 0;

/// All properties of a container, indexed by slot.
#[derive(Debug, Clone)]
pub struct PropertyTable {
    slots: Vec<Option<Property>>,
    /// Source of fresh generation numbers
    next_generation: u64,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTable {
    /// Table holding only an empty root.
    pub fn new() -> Self {
        Self {
            slots: vec![Some(Property::root())],
            next_generation: 1,
        }
    }

    /// Rebuild the tree from a directory stream.
    ///
    /// Only entries reachable from the root survive. Strict parsing rejects
    /// sibling links that loop or point outside the table, and siblings whose
    /// names collide; lenient parsing drops the offending entry (with its
    /// subtree) and logs a warning.
    pub fn parse(data: &[u8], sector_size: SectorSize, strict: bool) -> Result<Self> {
        let mut records = Vec::with_capacity(data.len() / DIRENTRY_SIZE);
        for chunk in data.chunks_exact(DIRENTRY_SIZE) {
            match property::decode(chunk, sector_size) {
                Ok(record) => records.push(record),
                Err(err) if !strict => {
                    tracing::warn!(sid = records.len(), error = %err, "skipping unreadable directory entry");
                    records.push(None);
                },
                Err(err) => return Err(err),
            }
        }

        let root_ok = matches!(records.first(), Some(Some((p, _))) if p.kind == PropertyKind::Root);
        if !root_ok {
            return Err(Error::InvalidFormat(
                "First directory entry is not the root".to_string(),
            ));
        }

        let links: Vec<Option<Links>> = records
            .iter()
            .map(|record| record.as_ref().map(|(_, links)| *links))
            .collect();
        let mut pending: Vec<Option<Property>> =
            records.into_iter().map(|record| record.map(|(p, _)| p)).collect();

        let mut table = Self {
            slots: Vec::with_capacity(pending.len()),
            next_generation: 1,
        };
        table.slots.resize_with(pending.len(), || None);
        table.slots[ROOT] = pending[ROOT].take();

        let mut visited = FixedBitSet::with_capacity(pending.len());
        visited.insert(ROOT);
        // (directory slot, root of its sibling tree)
        let mut directories = vec![(ROOT, links[ROOT].map_or(NOSTREAM, |l| l.child))];

        while let Some((dir, tree_root)) = directories.pop() {
            let mut stack = vec![tree_root];
            while let Some(sid) = stack.pop() {
                if sid == NOSTREAM {
                    continue;
                }
                let slot = sid as usize;
                let fault = if sid > MAXREGSID || slot >= pending.len() {
                    Some("points outside the directory")
                } else if visited.contains(slot) {
                    Some("revisits an entry")
                } else if pending[slot].is_none() {
                    Some("points at an unused entry")
                } else {
                    None
                };
                if let Some(fault) = fault {
                    if strict {
                        return Err(Error::InvalidFormat(format!(
                            "Directory link to {} {}",
                            sid, fault
                        )));
                    }
                    tracing::warn!(sid, parent = dir, fault, "dropping directory link");
                    continue;
                }
                visited.insert(slot);

                let Some(mut prop) = pending[slot].take() else {
                    continue;
                };
                if prop.kind == PropertyKind::Root {
                    if strict {
                        return Err(Error::InvalidFormat(format!(
                            "Second root entry at {}",
                            sid
                        )));
                    }
                    tracing::warn!(sid, "treating extra root entry as a directory");
                    prop.kind = PropertyKind::Directory;
                }
                let entry_links = links[slot].unwrap_or(Links::NONE);
                stack.push(entry_links.right);
                stack.push(entry_links.left);

                if let Some(existing) = table.find_child(dir, &prop.name) {
                    if strict {
                        return Err(Error::InvalidFormat(format!(
                            "Directory entry {} duplicates the name {:?} of entry {}",
                            sid, prop.name, existing
                        )));
                    }
                    tracing::warn!(sid, existing, name = %prop.name, "dropping entry with duplicate sibling name");
                    continue;
                }
                if prop.kind.is_directory() {
                    directories.push((slot, entry_links.child));
                }

                prop.parent = Some(dir);
                table.slots[slot] = Some(prop);
                table.attach(dir, slot);
            }
        }

        let dropped = pending.iter().filter(|p| p.is_some()).count();
        if dropped > 0 {
            tracing::debug!(dropped, "ignored unreachable directory entries");
        }
        Ok(table)
    }

    /// Property in `slot`.
    #[inline]
    pub fn get(&self, slot: usize) -> Option<&Property> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Mutable property in `slot`.
    #[inline]
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Property> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn require(&self, slot: usize) -> Result<&Property> {
        self.get(slot)
            .ok_or_else(|| Error::NotFound(format!("directory slot {}", slot)))
    }

    /// The root property.
    pub fn root(&self) -> Result<&Property> {
        self.require(ROOT)
    }

    /// Mutable root property.
    pub fn root_mut(&mut self) -> Result<&mut Property> {
        self.get_mut(ROOT)
            .ok_or_else(|| Error::InvalidFormat("Root entry missing".to_string()))
    }

    /// Child slots of `dir` in sibling order.
    pub fn children(&self, dir: usize) -> &[usize] {
        self.get(dir).map_or(&[], |p| p.children.as_slice())
    }

    /// Case-insensitive lookup of `name` among the children of `dir`.
    pub fn find_child(&self, dir: usize, name: &str) -> Option<usize> {
        let key = CollationKey::new(name);
        let children = self.children(dir);
        children
            .binary_search_by(|&child| self.key_of(child).cmp(&key))
            .ok()
            .map(|pos| children[pos])
    }

    /// Resolve a path from the root.
    pub fn resolve(&self, path: &DocumentPath) -> Result<usize> {
        let mut slot = ROOT;
        for component in path.components() {
            let prop = self.require(slot)?;
            if !prop.kind.is_directory() {
                return Err(Error::NotADirectory(prop.name.clone()));
            }
            slot = self
                .find_child(slot, component)
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
        }
        Ok(slot)
    }

    /// Path of the property in `slot`.
    pub fn path_of(&self, slot: usize) -> DocumentPath {
        let mut names = Vec::new();
        let mut current = slot;
        while let Some(prop) = self.get(current) {
            match prop.parent {
                Some(parent) => {
                    names.push(prop.name.clone());
                    current = parent;
                },
                None => break,
            }
        }
        names.reverse();
        DocumentPath::from_components(names)
    }

    /// Insert `prop` under `parent`, returning its slot.
    ///
    /// Freed slots are reused, lowest first.
    pub fn insert(&mut self, parent: usize, mut prop: Property) -> Result<usize> {
        property::validate_name(&prop.name)?;
        let parent_prop = self.require(parent)?;
        if !parent_prop.kind.is_directory() {
            return Err(Error::NotADirectory(parent_prop.name.clone()));
        }
        if self.find_child(parent, &prop.name).is_some() {
            return Err(Error::DuplicateName(prop.name));
        }

        prop.parent = Some(parent);
        prop.generation = self.fresh_generation();
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(prop);
                free
            },
            None => {
                self.slots.push(Some(prop));
                self.slots.len() - 1
            },
        };
        self.attach(parent, slot);
        Ok(slot)
    }

    /// Unlink and return the property in `slot`.
    ///
    /// The root cannot be removed and directories must be empty. Outstanding
    /// handles to the slot stop validating because the slot is vacated.
    pub fn remove(&mut self, slot: usize) -> Result<Property> {
        let prop = self.require(slot)?;
        let Some(parent) = prop.parent else {
            return Err(Error::InvalidName("the root entry cannot be removed".to_string()));
        };
        if !prop.children.is_empty() {
            return Err(Error::DirectoryNotEmpty(prop.name.clone()));
        }
        self.detach(parent, slot);
        self.slots[slot]
            .take()
            .ok_or_else(|| Error::NotFound(format!("directory slot {}", slot)))
    }

    /// Rename the property in `slot`, keeping its content and slot.
    pub fn rename(&mut self, slot: usize, new_name: &str) -> Result<()> {
        property::validate_name(new_name)?;
        let prop = self.require(slot)?;
        let Some(parent) = prop.parent else {
            return Err(Error::InvalidName("the root entry cannot be renamed".to_string()));
        };
        if let Some(existing) = self.find_child(parent, new_name)
            && existing != slot
        {
            return Err(Error::DuplicateName(new_name.to_string()));
        }

        self.detach(parent, slot);
        if let Some(prop) = self.get_mut(slot) {
            prop.name = new_name.to_string();
        }
        self.attach(parent, slot);
        Ok(())
    }

    /// Invalidate handles to `slot` by giving it a new generation.
    pub fn bump_generation(&mut self, slot: usize) -> Option<u64> {
        let generation = self.fresh_generation();
        let prop = self.get_mut(slot)?;
        prop.generation = generation;
        Some(generation)
    }

    /// Whether `slot` still holds the property a handle was opened on.
    #[inline]
    pub fn is_current(&self, slot: usize, generation: u64) -> bool {
        self.get(slot).is_some_and(|p| p.generation == generation)
    }

    /// Slots in preorder (directory before its children, siblings in order).
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut stack = vec![ROOT];
        while let Some(slot) = stack.pop() {
            if self.get(slot).is_none() {
                continue;
            }
            order.push(slot);
            stack.extend(self.children(slot).iter().rev());
        }
        order
    }

    /// Serialize to a directory stream.
    ///
    /// Live entries are compacted in preorder, so the root is always record
    /// 0, and the stream is padded with unused records to whole sectors.
    pub fn serialize(&self, sector_size: SectorSize) -> Vec<u8> {
        let order = self.preorder();
        let mut sid_of = vec![NOSTREAM; self.slots.len()];
        for (sid, &slot) in order.iter().enumerate() {
            sid_of[slot] = sid as u32;
        }

        let mut links = vec![Links::NONE; order.len()];
        let mut colors = vec![COLOR_BLACK; order.len()];
        for &slot in &order {
            let children: Vec<u32> = self.children(slot).iter().map(|&c| sid_of[c]).collect();
            if children.is_empty() {
                continue;
            }
            let max_depth = tree_depth(children.len());
            let tree_root = build_tree(&children, 0, max_depth, &mut links, &mut colors);
            links[sid_of[slot] as usize].child = tree_root;
        }

        let per_sector = sector_size.bytes() / DIRENTRY_SIZE;
        let records = order.len().div_ceil(per_sector) * per_sector;
        let mut out = Vec::with_capacity(records * DIRENTRY_SIZE);
        for (sid, &slot) in order.iter().enumerate() {
            if let Some(prop) = self.get(slot) {
                out.extend_from_slice(&property::encode(prop, links[sid], colors[sid]));
            }
        }
        while out.len() < records * DIRENTRY_SIZE {
            out.extend_from_slice(&property::encode_empty());
        }
        out
    }

    fn key_of(&self, slot: usize) -> CollationKey {
        CollationKey::new(self.get(slot).map_or("", |p| p.name.as_str()))
    }

    fn attach(&mut self, parent: usize, slot: usize) {
        let key = self.key_of(slot);
        let pos = self
            .children(parent)
            .partition_point(|&child| self.key_of(child) <= key);
        if let Some(parent_prop) = self.get_mut(parent) {
            parent_prop.children.insert(pos, slot);
        }
    }

    fn detach(&mut self, parent: usize, slot: usize) {
        if let Some(parent_prop) = self.get_mut(parent) {
            parent_prop.children.retain(|&child| child != slot);
        }
    }

    fn fresh_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

/// Depth of the deepest level of a midpoint-built tree of `n` nodes.
fn tree_depth(n: usize) -> usize {
    (usize::BITS - n.leading_zeros()) as usize - 1
}

/// Link `sids` (already in sibling order) into a balanced tree and return
/// its root.
fn build_tree(
    sids: &[u32],
    depth: usize,
    max_depth: usize,
    links: &mut [Links],
    colors: &mut [u8],
) -> u32 {
    if sids.is_empty() {
        return NOSTREAM;
    }
    let mid = sids.len() / 2;
    let sid = sids[mid];
    let left = build_tree(&sids[..mid], depth + 1, max_depth, links, colors);
    let right = build_tree(&sids[mid + 1..], depth + 1, max_depth, links, colors);

    let node = &mut links[sid as usize];
    node.left = left;
    node.right = right;
    colors[sid as usize] = if depth == max_depth && depth > 0 {
        COLOR_RED
    } else {
        COLOR_BLACK
    };
    sid
}
