//! Reads and writes a contiguous byte range against a single inode,
//! plus truncate/hole-zeroing.
//!
//! Both `read_range` and `write_range` walk the inode's blocks with
//! the same block-iterator helper; the only difference is which
//! direction the copy goes.

use crate::context::Mount;
use crate::error::FsResult;
use crate::extent::{self, BlockIterator};
use crate::layout::BLOCK_SIZE;
use crate::time::Clock;

/// Reads up to `buf.len()` bytes of `ino` starting at `offset`.
/// Zero-fills `buf` first, then returns `0` once `offset >= size`, or
/// a short count when `offset + buf.len()` overruns EOF — holes never
/// leak uninitialized image bytes.
pub fn read_range(mount: &Mount, ino: u32, buf: &mut [u8], offset: u64) -> usize {
    buf.fill(0);
    let size = mount.inode(ino).size;
    if offset >= size {
        return 0;
    }
    let n = ((size - offset).min(buf.len() as u64)) as usize;
    let range_start = offset;
    let range_end = offset + n as u64;

    let mut it = BlockIterator::new(ino);
    let mut block_start = 0u64;
    while let Some(blk) = it.next(mount) {
        let block_end = block_start + BLOCK_SIZE;
        if block_end > range_start && block_start < range_end {
            let data = mount.data_block(blk);
            let copy_start = range_start.max(block_start);
            let copy_end = range_end.min(block_end);
            let src_off = (copy_start - block_start) as usize;
            let dst_off = (copy_start - range_start) as usize;
            let len = (copy_end - copy_start) as usize;
            buf[dst_off..dst_off + len].copy_from_slice(&data[src_off..src_off + len]);
        }
        block_start = block_end;
        if block_start >= range_end {
            break;
        }
    }
    n
}

/// Zero-fills the byte range `[start, end)` of `ino`'s already
/// allocated data blocks. Used both for the write-past-EOF hole and
/// for truncate's grow-in-place zeroing.
fn zero_range(mount: &mut Mount, ino: u32, start: u64, end: u64) {
    if start >= end {
        return;
    }
    let mut it = BlockIterator::new(ino);
    let mut block_start = 0u64;
    while let Some(blk) = it.next(mount) {
        let block_end = block_start + BLOCK_SIZE;
        if block_end > start && block_start < end {
            let zero_start = start.max(block_start);
            let zero_end = end.min(block_end);
            let lo = (zero_start - block_start) as usize;
            let hi = (zero_end - block_start) as usize;
            mount.data_block_mut(blk)[lo..hi].fill(0);
        }
        block_start = block_end;
        if block_start >= end {
            break;
        }
    }
}

/// Writes `buf` to `ino` at `offset`, extending the file (and
/// zero-filling any hole before `offset`) as needed. Sets
/// `size = max(size, offset + buf.len())` rather than unconditionally
/// adding `buf.len()`, so an overwrite within the existing file
/// never shrinks its reported size.
pub fn write_range(
    mount: &mut Mount,
    ino: u32,
    buf: &[u8],
    offset: u64,
    clock: &dyn Clock,
) -> FsResult<usize> {
    let now = clock.now()?;
    mount.inode_mut(ino).set_mtime(now);

    let mut size = mount.inode(ino).size;
    if offset > size {
        extent::allocate_data_blocks(mount, ino, offset - size)?;
        zero_range(mount, ino, size, offset);
        size = offset;
        mount.inode_mut(ino).size = size;
    }

    let new_end = offset + buf.len() as u64;
    if new_end > size {
        extent::allocate_data_blocks(mount, ino, new_end - size)?;
        mount.inode_mut(ino).size = new_end;
    }

    let mut it = BlockIterator::new(ino);
    let mut block_start = 0u64;
    let range_end = new_end;
    while let Some(blk) = it.next(mount) {
        let block_end = block_start + BLOCK_SIZE;
        if block_end > offset && block_start < range_end {
            let copy_start = offset.max(block_start);
            let copy_end = range_end.min(block_end);
            let src_off = (copy_start - offset) as usize;
            let dst_off = (copy_start - block_start) as usize;
            let len = (copy_end - copy_start) as usize;
            mount.data_block_mut(blk)[dst_off..dst_off + len]
                .copy_from_slice(&buf[src_off..src_off + len]);
        }
        block_start = block_end;
        if block_start >= range_end {
            break;
        }
    }
    Ok(buf.len())
}

/// Grows or shrinks `ino` to exactly `new_size` bytes.
pub fn truncate(mount: &mut Mount, ino: u32, new_size: u64, clock: &dyn Clock) -> FsResult<()> {
    let now = clock.now()?;
    mount.inode_mut(ino).set_mtime(now);

    let size = mount.inode(ino).size;
    if new_size > size {
        extent::allocate_data_blocks(mount, ino, new_size - size)?;
        zero_range(mount, ino, size, new_size);
    } else if new_size < size {
        shrink(mount, ino, new_size);
    }
    mount.inode_mut(ino).size = new_size;
    Ok(())
}

/// Releases every logical block whose start offset is at or past
/// `new_size`, trimming (or dropping) the extent that owns it, per
/// the per-block accounting below. Extents are stored as
/// contiguous, strictly increasing logical ranges, so at most one
/// extent straddles the `new_size` boundary: every extent before it
/// survives untouched, every extent at or after it loses every block.
fn shrink(mount: &mut Mount, ino: u32, new_size: u64) {
    let num_extents = mount.inode(ino).num_extents;
    let mut logical_block = 0u64;
    let mut new_num_extents = num_extents;

    for idx in 0..num_extents {
        let mut ext = extent::get_extent(mount, ino, idx);
        let mut keep = ext.count;
        for i in 0..ext.count {
            if (logical_block + i as u64) * BLOCK_SIZE >= new_size {
                keep = i;
                break;
            }
        }
        for j in keep..ext.count {
            crate::bitmap::clear(mount.bitmap_mut(), (ext.start + j) as u64);
            mount.superblock_mut().free_data_block_count += 1;
        }
        logical_block += ext.count as u64;
        ext.count = keep;
        extent::set_extent(mount, ino, idx, ext);
        if keep == 0 && new_num_extents == num_extents {
            new_num_extents = idx;
        }
    }

    mount.inode_mut(ino).num_extents = new_num_extents;
    if new_num_extents as usize <= crate::inode::N_DIRECT_EXTENTS {
        let ib = mount.inode(ino).indirect_extent_blk;
        if ib != 0 {
            crate::bitmap::clear(mount.bitmap_mut(), ib as u64);
            mount.superblock_mut().free_data_block_count += 1;
            mount.inode_mut(ino).indirect_extent_blk = 0;
        }
    }
}
