//! The formatter: initializes an image with an empty a1fs filesystem.
//! A degenerate client of the bitmap allocator and inode manager — it
//! writes the initial region headers itself rather than going through
//! the general-purpose directory/file operations.

use crate::context::Mount;
use crate::inode::{RawInode, S_IFDIR};
use crate::layout::{Layout, LayoutError, Superblock, A1FS_MAGIC, BLOCK_SIZE};
use crate::path::ROOT_INODE;
use crate::time::Clock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("failed to read the system clock")]
    Clock,
}

/// Root directory's default permissions: `dir|0777`.
const ROOT_MODE: u16 = S_IFDIR | 0o777;

/// Writes a fresh superblock, zeroes the bitmap and inode table, and
/// allocates inode 0 as the root directory. `inode_count` must be > 0;
/// the image must already have been mapped via `Mount::from_file`.
pub fn format(mount: &mut Mount, inode_count: u32, clock: &dyn Clock) -> Result<(), FormatError> {
    let image_size = mount.layout.total_blocks * BLOCK_SIZE;
    let layout = Layout::compute(image_size, inode_count)?;
    mount.layout = layout;

    mount.bitmap_mut().fill(0);
    for ino in 0..inode_count {
        *mount.inode_mut(ino) = RawInode::FREE;
    }

    let now = clock.now().map_err(|_| FormatError::Clock)?;
    mount.inode_mut(ROOT_INODE).init(ROOT_MODE, 2, now);

    *mount.superblock_mut() = Superblock {
        magic: A1FS_MAGIC,
        size: image_size,
        inode_count,
        free_inode_count: inode_count - 1,
        data_block_count: layout.data_blocks as u32,
        free_data_block_count: layout.data_blocks as u32,
        bitmap_start: layout.bitmap_start as u32,
        inode_table_start: layout.inode_table_start as u32,
        data_region_start: layout.data_region_start as u32,
    };

    // Per §4.6, the root is initialized with size = 0 and
    // num_extents = 0, same as any other freshly `init`-ed inode; its
    // first block is allocated lazily the first time an entry is
    // added to it, through the same `add_dir_entry` path that grows
    // any other directory that has run out of free dentry slots.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SystemClock;
    use memmap2::MmapMut;
    use std::io::{Seek, SeekFrom, Write};

    fn image(size: u64) -> Mount {
        let mut file = tempfile::tempfile().unwrap();
        file.seek(SeekFrom::Start(size - 1)).unwrap();
        file.write_all(&[0]).unwrap();
        let _ = MmapMut::map_mut(&file); // sanity: mappable
        Mount::from_file(file).unwrap()
    }

    #[test]
    fn format_sets_up_root() {
        let mut mount = image(256 * 1024);
        format(&mut mount, 256, &SystemClock).unwrap();
        assert!(mount.is_a1fs());
        let root = mount.inode(ROOT_INODE);
        assert_eq!(root.links, 2);
        assert_eq!(root.size, 0);
        assert_eq!(root.num_extents, 0);
        assert_eq!(mount.superblock().free_inode_count, 255);
        assert_eq!(
            mount.superblock().free_data_block_count,
            mount.layout.data_blocks as u32
        );
    }
}
