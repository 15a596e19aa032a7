//! Static region offsets and the on-disk superblock.
//!
//! All offset arithmetic for the four regions (reserved block,
//! superblock, bitmap, inode table, data region) is kept in this one
//! module so nothing downstream re-derives it.

use crate::inode::RawInode;
use std::mem::size_of;

/// Size of one block, in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// Fixed magic value identifying an a1fs image. Changing this is a
/// format-version break.
pub const A1FS_MAGIC: u32 = 0xA1F5_0001;

/// Longest directory entry name, not counting the NUL terminator.
pub const MAX_NAME_LEN: usize = 251;

/// Longest absolute path accepted by the path resolver.
pub const MAX_PATH_LEN: usize = 4096;

/// Upper bound on the number of extents a single inode may hold.
pub const MAX_EXTENTS: u32 = 512;

/// Block 0 is always reserved; block 1 always holds the superblock.
pub const RESERVED_BLOCK: u64 = 0;
pub const SUPERBLOCK_BLOCK: u64 = 1;

/// The on-disk superblock, stored at block 1.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub magic: u32,
    pub size: u64,
    pub inode_count: u32,
    pub free_inode_count: u32,
    pub data_block_count: u32,
    pub free_data_block_count: u32,
    pub bitmap_start: u32,
    pub inode_table_start: u32,
    pub data_region_start: u32,
}

/// Errors that can arise while deriving a region layout from an image
/// size and requested inode count (used by both the formatter and by
/// `Mount::open`'s sanity check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("image too small to hold {inodes} inodes")]
    ImageTooSmall { inodes: u32 },
    #[error("image size is not a multiple of the block size")]
    Unaligned,
}

/// Derived region layout for a given image size and inode count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Total blocks in the image (`T`).
    pub total_blocks: u64,
    /// Blocks occupied by the inode table (`I`).
    pub inode_table_blocks: u64,
    /// Blocks occupied by the data bitmap (`D`).
    pub bitmap_blocks: u64,
    /// Blocks in the data region (`DB`).
    pub data_blocks: u64,
    pub bitmap_start: u64,
    pub inode_table_start: u64,
    pub data_region_start: u64,
}

impl Layout {
    /// Derives the region layout for an image of `image_size` bytes
    /// formatted to hold `inode_count` inodes:
    /// `I = ceil(N * sizeof(inode) / B)`, `T = S/B`, `DR = T - I - 2`,
    /// `D = ceil(DR / (8B))`, `DB = DR - D`.
    pub fn compute(image_size: u64, inode_count: u32) -> Result<Layout, LayoutError> {
        if image_size % BLOCK_SIZE != 0 {
            return Err(LayoutError::Unaligned);
        }
        let total_blocks = image_size / BLOCK_SIZE;
        let inode_size = size_of::<RawInode>() as u64;
        let inode_table_blocks = ceil_div(inode_count as u64 * inode_size, BLOCK_SIZE);

        if total_blocks < inode_table_blocks + 2 {
            return Err(LayoutError::ImageTooSmall {
                inodes: inode_count,
            });
        }
        let dr = total_blocks - inode_table_blocks - 2;
        let bitmap_blocks = ceil_div(dr, 8 * BLOCK_SIZE);
        if bitmap_blocks > dr {
            return Err(LayoutError::ImageTooSmall {
                inodes: inode_count,
            });
        }
        let data_blocks = dr - bitmap_blocks;

        let bitmap_start = 2;
        let inode_table_start = bitmap_start + bitmap_blocks;
        let data_region_start = inode_table_start + inode_table_blocks;

        if total_blocks < inode_table_blocks + bitmap_blocks + 2 {
            return Err(LayoutError::ImageTooSmall {
                inodes: inode_count,
            });
        }

        Ok(Layout {
            total_blocks,
            inode_table_blocks,
            bitmap_blocks,
            data_blocks,
            bitmap_start,
            inode_table_start,
            data_region_start,
        })
    }

    /// Re-derives the layout implied by a superblock already on disk,
    /// used to detect whether an image already holds an a1fs:
    /// agreement between recorded and re-derived offsets means
    /// "already formatted".
    pub fn matches(&self, sb: &Superblock) -> bool {
        sb.size == self.total_blocks * BLOCK_SIZE
            && sb.bitmap_start == self.bitmap_start as u32
            && sb.inode_table_start == self.inode_table_start as u32
            && sb.data_region_start == self.data_region_start as u32
            && sb.data_block_count == self.data_blocks as u32
    }
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_256k_256_inodes() {
        let layout = Layout::compute(256 * 1024, 256).unwrap();
        assert_eq!(layout.total_blocks, 64);
        assert_eq!(layout.bitmap_start, 2);
        assert!(layout.inode_table_start > layout.bitmap_start);
        assert!(layout.data_region_start > layout.inode_table_start);
        assert_eq!(
            layout.data_region_start + layout.data_blocks,
            layout.total_blocks
        );
    }

    #[test]
    fn rejects_unaligned_size() {
        assert_eq!(Layout::compute(100, 4).unwrap_err(), LayoutError::Unaligned);
    }

    #[test]
    fn rejects_too_small_for_inode_count() {
        assert!(Layout::compute(BLOCK_SIZE * 4, 100_000).is_err());
    }
}
