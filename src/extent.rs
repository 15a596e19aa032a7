//! Inode extent list (direct + one indirect overflow block) and the
//! block-by-block iterator that walks it.

use crate::bitmap;
use crate::context::Mount;
use crate::error::{FsError, FsResult};
use crate::inode::{RawExtent, EXTENTS_PER_INDIRECT_BLOCK, N_DIRECT_EXTENTS};
use crate::layout::{BLOCK_SIZE, MAX_EXTENTS};
use std::slice;

/// Returns the `i`-th extent of `ino`: direct array when `i < 10`,
/// the indirect block otherwise.
pub fn get_extent(mount: &Mount, ino: u32, i: u32) -> RawExtent {
    let inode = mount.inode(ino);
    if (i as usize) < N_DIRECT_EXTENTS {
        inode.direct_extents[i as usize]
    } else {
        let blk = inode.indirect_extent_blk;
        let data = mount.data_block(blk);
        indirect_slice(data)[i as usize - N_DIRECT_EXTENTS]
    }
}

pub(crate) fn set_extent(mount: &mut Mount, ino: u32, i: u32, extent: RawExtent) {
    if (i as usize) < N_DIRECT_EXTENTS {
        mount.inode_mut(ino).direct_extents[i as usize] = extent;
    } else {
        let blk = mount.inode(ino).indirect_extent_blk;
        let data = mount.data_block_mut(blk);
        indirect_slice_mut(data)[i as usize - N_DIRECT_EXTENTS] = extent;
    }
}

fn indirect_slice(data: &[u8]) -> &[RawExtent] {
    unsafe { slice::from_raw_parts(data.as_ptr() as *const RawExtent, EXTENTS_PER_INDIRECT_BLOCK) }
}

fn indirect_slice_mut(data: &mut [u8]) -> &mut [RawExtent] {
    unsafe {
        slice::from_raw_parts_mut(data.as_mut_ptr() as *mut RawExtent, EXTENTS_PER_INDIRECT_BLOCK)
    }
}

/// A restartable, single-pass walk over an inode's logical data
/// blocks in order: extents in stored order, blocks within an extent
/// in order. Each call to `next` resolves one more logical block to
/// its data-region index. Unlike a pointer-chasing C-style iterator,
/// this holds no pointer into the image at all, only
/// `(extent_index, block_in_extent)` — it re-resolves against the
/// mount on every step, so it is never invalidated by intervening
/// mutation of unrelated inodes.
pub struct BlockIterator {
    ino: u32,
    extent_idx: u32,
    offset_in_extent: u32,
}

impl BlockIterator {
    pub fn new(ino: u32) -> Self {
        BlockIterator {
            ino,
            extent_idx: 0,
            offset_in_extent: 0,
        }
    }

    /// Yields the next logical block's data-region index, or `None`
    /// once every extent has been exhausted.
    pub fn next(&mut self, mount: &Mount) -> Option<u32> {
        loop {
            let num_extents = mount.inode(self.ino).num_extents;
            if self.extent_idx >= num_extents {
                return None;
            }
            let ext = get_extent(mount, self.ino, self.extent_idx);
            if self.offset_in_extent < ext.count {
                let blk = ext.start + self.offset_in_extent;
                self.offset_in_extent += 1;
                return Some(blk);
            }
            self.extent_idx += 1;
            self.offset_in_extent = 0;
        }
    }
}

/// Collects every logical data block of `ino`, in order, as a plain
/// `Vec`. Directory scans (lookup, readdir, free-slot search, rmdir's
/// emptiness check) all need the full block list rather than an
/// incremental walk, so they call this instead of driving
/// `BlockIterator` themselves.
pub fn dir_blocks(mount: &Mount, ino: u32) -> Vec<u32> {
    let mut it = BlockIterator::new(ino);
    let mut blocks = Vec::new();
    while let Some(b) = it.next(mount) {
        blocks.push(b);
    }
    blocks
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Extends `ino` by enough whole blocks to hold `additional_size` more
/// bytes, first absorbing any slack in the current last block before
/// allocating new extents. Leaves any partially-completed allocation
/// charged to the inode on failure — callers must not assume nothing
/// changed.
pub fn allocate_data_blocks(mount: &mut Mount, ino: u32, additional_size: u64) -> FsResult<()> {
    let size = mount.inode(ino).size;
    let slack = if size % BLOCK_SIZE != 0 {
        BLOCK_SIZE - (size % BLOCK_SIZE)
    } else {
        0
    };
    let need_bytes = additional_size.saturating_sub(slack);
    let mut need = ceil_div(need_bytes, BLOCK_SIZE);
    if need == 0 {
        return Ok(());
    }

    if (mount.superblock().free_data_block_count as u64) < need {
        return Err(FsError::NoSpace);
    }

    let num_extents = mount.inode(ino).num_extents;
    if num_extents > 0 {
        let last = get_extent(mount, ino, num_extents - 1);
        let tail_start = (last.start + last.count) as u64;
        let tail = bitmap::tail_length(mount.bitmap(), mount.layout.data_blocks, tail_start);
        let grow = need.min(tail);
        if grow > 0 {
            for b in 0..grow {
                bitmap::set(mount.bitmap_mut(), tail_start + b);
            }
            let grown = RawExtent {
                start: last.start,
                count: last.count + grow as u32,
            };
            set_extent(mount, ino, num_extents - 1, grown);
            mount.superblock_mut().free_data_block_count -= grow as u32;
            need -= grow;
        }
    }

    while need > 0 {
        let (s, r) = bitmap::find_run(mount.bitmap(), mount.layout.data_blocks, need);
        if r == 0 {
            return Err(FsError::NoSpace);
        }
        let cur_num_extents = mount.inode(ino).num_extents;
        if cur_num_extents >= MAX_EXTENTS {
            return Err(FsError::NoSpace);
        }
        if cur_num_extents as usize == N_DIRECT_EXTENTS && mount.inode(ino).indirect_extent_blk == 0
        {
            let (ib_start, ib_len) = bitmap::find_run(mount.bitmap(), mount.layout.data_blocks, 1);
            if ib_len < 1 {
                return Err(FsError::NoSpace);
            }
            bitmap::set(mount.bitmap_mut(), ib_start);
            mount.superblock_mut().free_data_block_count -= 1;
            mount.inode_mut(ino).indirect_extent_blk = ib_start as u32;
            mount.data_block_mut(ib_start as u32).fill(0);
        }

        set_extent(
            mount,
            ino,
            cur_num_extents,
            RawExtent {
                start: s as u32,
                count: r as u32,
            },
        );
        mount.inode_mut(ino).num_extents = cur_num_extents + 1;
        for b in 0..r {
            bitmap::set(mount.bitmap_mut(), s + b);
        }
        mount.superblock_mut().free_data_block_count -= r as u32;
        need -= r;
    }
    Ok(())
}

/// Releases every extent and the indirect block (if any) of `ino`,
/// incrementing `free_dblocks` once per extent by its full `count` —
/// incrementing once per extent, not once per block.
pub fn free_all_extents(mount: &mut Mount, ino: u32) {
    let num_extents = mount.inode(ino).num_extents;
    for i in 0..num_extents {
        let ext = get_extent(mount, ino, i);
        for b in 0..ext.count {
            bitmap::clear(mount.bitmap_mut(), (ext.start + b) as u64);
        }
        mount.superblock_mut().free_data_block_count += ext.count;
    }
    if mount.inode(ino).has_indirect() {
        let ib = mount.inode(ino).indirect_extent_blk;
        bitmap::clear(mount.bitmap_mut(), ib as u64);
        mount.superblock_mut().free_data_block_count += 1;
    }
    let inode = mount.inode_mut(ino);
    inode.num_extents = 0;
    inode.indirect_extent_blk = 0;
    inode.direct_extents = [RawExtent::EMPTY; N_DIRECT_EXTENTS];
}
