//! The mounted image: a typed view over a raw byte buffer, with
//! bounds-checked accessors for the superblock, bitmap, inode table,
//! and data blocks, so region offset arithmetic lives in one place.
//!
//! `Mount` owns the memory-mapped image. Everything else in the crate
//! borrows from it rather than touching the buffer directly, through
//! typed in-place accessors instead of whole-block copies.

use crate::inode::RawInode;
use crate::layout::{Layout, Superblock, BLOCK_SIZE};
use memmap2::MmapMut;
use std::fs::File;
use std::mem::size_of;
use std::path::Path;
use std::slice;

pub struct Mount {
    map: MmapMut,
    pub layout: Layout,
}

impl Mount {
    /// Memory-maps `path` read-write and validates it carries a
    /// region layout consistent with its own superblock. Does not
    /// check the magic number — that is `Mount::is_a1fs`'s job, used
    /// by the formatter to decide whether to refuse without `-f`.
    pub fn open(path: &Path) -> std::io::Result<Mount> {
        let file = File::options().read(true).write(true).open(path)?;
        let mut mount = Self::from_file(file)?;
        if mount.is_a1fs() {
            mount.reload_layout();
        }
        Ok(mount)
    }

    pub fn from_file(file: File) -> std::io::Result<Mount> {
        let len = file.metadata()?.len();
        let map = unsafe { MmapMut::map_mut(&file)? };
        // `total_blocks` is derived straight from the file length and
        // is always valid; the remaining region offsets are unknown
        // until the superblock is read (or written by the formatter),
        // so they start out as harmless placeholders pointing at the
        // reserved block. `reload_layout` fills them in once a
        // superblock exists.
        let layout = Layout {
            total_blocks: len / BLOCK_SIZE,
            inode_table_blocks: 0,
            bitmap_blocks: 0,
            data_blocks: 0,
            bitmap_start: 2,
            inode_table_start: 2,
            data_region_start: 2,
        };
        Ok(Mount { map, layout })
    }

    /// Persists every mutation made so far to the backing file.
    /// Durability past this point is the mapping layer's job; the core
    /// only promises "last successfully returned operation is durable
    /// once flushed".
    pub fn flush(&self) -> std::io::Result<()> {
        self.map.flush()
    }

    fn block_ptr(&self, bid: u64) -> *const u8 {
        assert!(bid < self.layout.total_blocks);
        unsafe { self.map.as_ptr().add((bid * BLOCK_SIZE) as usize) }
    }

    fn block_ptr_mut(&mut self, bid: u64) -> *mut u8 {
        assert!(bid < self.layout.total_blocks);
        unsafe { self.map.as_mut_ptr().add((bid * BLOCK_SIZE) as usize) }
    }

    pub fn superblock(&self) -> &Superblock {
        unsafe { &*(self.block_ptr(1) as *const Superblock) }
    }

    pub fn superblock_mut(&mut self) -> &mut Superblock {
        unsafe { &mut *(self.block_ptr_mut(1) as *mut Superblock) }
    }

    /// Syncs `self.layout` from the on-disk superblock; called once
    /// after format or on a fresh mount of an already-formatted image.
    pub fn reload_layout(&mut self) {
        let sb = self.superblock();
        self.layout = Layout {
            total_blocks: sb.size / BLOCK_SIZE,
            inode_table_blocks: sb.data_region_start as u64 - sb.inode_table_start as u64,
            bitmap_blocks: sb.inode_table_start as u64 - sb.bitmap_start as u64,
            data_blocks: sb.data_block_count as u64,
            bitmap_start: sb.bitmap_start as u64,
            inode_table_start: sb.inode_table_start as u64,
            data_region_start: sb.data_region_start as u64,
        };
    }

    pub fn is_a1fs(&self) -> bool {
        let sb = self.superblock();
        if sb.magic != crate::layout::A1FS_MAGIC {
            return false;
        }
        match Layout::compute(sb.size, sb.inode_count) {
            Ok(layout) => layout.matches(sb),
            Err(_) => false,
        }
    }

    /// Whole bitmap region as a flat byte slice, LSB-first within
    /// each byte.
    pub fn bitmap(&self) -> &[u8] {
        let bytes = (self.layout.bitmap_blocks * BLOCK_SIZE) as usize;
        unsafe { slice::from_raw_parts(self.block_ptr(self.layout.bitmap_start), bytes) }
    }

    pub fn bitmap_mut(&mut self) -> &mut [u8] {
        let bytes = (self.layout.bitmap_blocks * BLOCK_SIZE) as usize;
        unsafe { slice::from_raw_parts_mut(self.block_ptr_mut(self.layout.bitmap_start), bytes) }
    }

    pub fn inode(&self, ino: u32) -> &RawInode {
        unsafe { &*(self.inode_ptr(ino) as *const RawInode) }
    }

    pub fn inode_mut(&mut self, ino: u32) -> &mut RawInode {
        unsafe { &mut *(self.inode_ptr_mut(ino) as *mut RawInode) }
    }

    fn inode_ptr(&self, ino: u32) -> *const u8 {
        let table_base = self.layout.inode_table_start * BLOCK_SIZE;
        let off = table_base as usize + ino as usize * size_of::<RawInode>();
        unsafe { self.map.as_ptr().add(off) }
    }

    fn inode_ptr_mut(&mut self, ino: u32) -> *mut u8 {
        let table_base = self.layout.inode_table_start * BLOCK_SIZE;
        let off = table_base as usize + ino as usize * size_of::<RawInode>();
        unsafe { self.map.as_mut_ptr().add(off) }
    }

    /// A raw data block by zero-based data-region index, addressed
    /// the same way the bitmap and extents address blocks.
    pub fn data_block(&self, block: u32) -> &[u8] {
        let bid = self.layout.data_region_start + block as u64;
        unsafe { slice::from_raw_parts(self.block_ptr(bid), BLOCK_SIZE as usize) }
    }

    pub fn data_block_mut(&mut self, block: u32) -> &mut [u8] {
        let bid = self.layout.data_region_start + block as u64;
        unsafe { slice::from_raw_parts_mut(self.block_ptr_mut(bid), BLOCK_SIZE as usize) }
    }
}
