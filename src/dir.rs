//! Adds and removes named entries in a directory inode, growing the
//! directory by one block when its current blocks are full.

use crate::context::Mount;
use crate::dirent::RawDentry;
use crate::error::{FsError, FsResult};
use crate::extent::{self, dir_blocks};
use crate::inode::is_dir;
use crate::layout::BLOCK_SIZE;
use crate::path::{self, lookup_in_dir};
use crate::time::Clock;

/// Picks the lowest-indexed inode with `links == 0`.
fn alloc_inode(mount: &mut Mount) -> FsResult<u32> {
    let total = mount.superblock().inode_count;
    for ino in 0..total {
        if mount.inode(ino).is_free() {
            return Ok(ino);
        }
    }
    Err(FsError::NoSpace)
}

fn find_free_slot_block(mount: &Mount, dir_ino: u32) -> Option<u32> {
    dir_blocks(mount, dir_ino)
        .into_iter()
        .find(|&blk| RawDentry::slice(mount.data_block(blk)).iter().any(RawDentry::is_free))
}

/// Resolves `path`, allocates a fresh inode, and links it into its
/// parent directory under its final path component.
pub fn add_dir_entry(
    mount: &mut Mount,
    path: &[u8],
    mode: u16,
    links: u16,
    clock: &dyn Clock,
) -> FsResult<u32> {
    path::check_len(path)?;
    if mount.superblock().free_inode_count == 0 {
        return Err(FsError::NoSpace);
    }
    let (parent_path, name) = path::split_parent(path)?;
    let parent_ino = path::resolve(mount, parent_path)?;
    if !is_dir(mount.inode(parent_ino).mode) {
        return Err(FsError::NotADirectory);
    }
    if lookup_in_dir(mount, parent_ino, name).is_ok() {
        return Err(FsError::AlreadyExists);
    }

    if is_dir(mode) {
        mount.inode_mut(parent_ino).links += 1;
    }

    let target_block = match find_free_slot_block(mount, parent_ino) {
        Some(blk) => blk,
        None => {
            extent::allocate_data_blocks(mount, parent_ino, BLOCK_SIZE)?;
            mount.inode_mut(parent_ino).size += BLOCK_SIZE;
            let blk = *dir_blocks(mount, parent_ino)
                .last()
                .expect("a block was just allocated");
            // A block reused from a deleted file carries its old
            // bytes; zero it so every slot reads as free.
            mount.data_block_mut(blk).fill(0);
            blk
        }
    };

    let ino = alloc_inode(mount)?;
    let now = clock.now()?;
    {
        let dentries = RawDentry::slice_mut(mount.data_block_mut(target_block));
        let slot = dentries
            .iter_mut()
            .find(|d| d.is_free())
            .expect("target block guaranteed to hold a free slot");
        slot.set_name(name);
        slot.inode = ino;
    }
    mount.inode_mut(ino).init(mode, links, now);
    mount.superblock_mut().free_inode_count -= 1;

    if is_dir(mode) {
        // A directory always owns at least one block so the first
        // `NUM_DENTRY_PER_BLOCK` entries placed in it never force a
        // second allocation.
        extent::allocate_data_blocks(mount, ino, BLOCK_SIZE)?;
        mount.inode_mut(ino).size = BLOCK_SIZE;
        let first_block = *dir_blocks(mount, ino).last().expect("block just allocated");
        mount.data_block_mut(first_block).fill(0);
    }

    Ok(ino)
}

/// Removes the dentry naming `path`'s final component from its parent
/// and, once the target's link count reaches zero, reclaims its
/// inode and data blocks.
pub fn remove_dir_entry(mount: &mut Mount, path: &[u8]) -> FsResult<()> {
    path::check_len(path)?;
    let (parent_path, name) = path::split_parent(path)?;
    let parent_ino = path::resolve(mount, parent_path)?;
    if !is_dir(mount.inode(parent_ino).mode) {
        return Err(FsError::NotADirectory);
    }
    let target_ino = lookup_in_dir(mount, parent_ino, name)?;

    if is_dir(mount.inode(target_ino).mode) {
        // A directory is created with links = 2 (its own `.` plus the
        // parent-> child edge; mkdir's `..` back-link is folded into
        // that same count, not tracked separately). Removing it must
        // drop exactly those 2, not 2 plus the edge again.
        mount.inode_mut(target_ino).links -= 2;
        mount.inode_mut(parent_ino).links -= 1;
    } else {
        // The parent -> child edge itself.
        mount.inode_mut(target_ino).links -= 1;
    }

    clear_dentry(mount, parent_ino, name)?;

    if mount.inode(target_ino).is_free() {
        extent::free_all_extents(mount, target_ino);
        mount.superblock_mut().free_inode_count += 1;
    }
    Ok(())
}

/// `true` if `dir_ino` has no live entries (the emptiness check
/// `rmdir` performs before calling `remove_dir_entry`).
pub fn is_empty(mount: &Mount, dir_ino: u32) -> bool {
    dir_blocks(mount, dir_ino).into_iter().all(|blk| {
        RawDentry::slice(mount.data_block(blk))
            .iter()
            .all(RawDentry::is_free)
    })
}

fn clear_dentry(mount: &mut Mount, dir_ino: u32, name: &[u8]) -> FsResult<()> {
    for blk in dir_blocks(mount, dir_ino) {
        let dentries = RawDentry::slice_mut(mount.data_block_mut(blk));
        if let Some(d) = dentries
            .iter_mut()
            .find(|d| !d.is_free() && d.name_bytes() == name)
        {
            d.clear();
            return Ok(());
        }
    }
    Err(FsError::NotFound)
}

/// Renames the dentry at `old_path` to the final component of
/// `new_path`, in place, without touching the target inode. Only
/// valid within a single directory; cross-directory rename stays
/// deliberately unsupported rather than inventing cross-inode link
/// bookkeeping beyond what a1fs already tracks.
pub fn rename(mount: &mut Mount, old_path: &[u8], new_path: &[u8]) -> FsResult<()> {
    path::check_len(old_path)?;
    path::check_len(new_path)?;
    let (old_parent, old_name) = path::split_parent(old_path)?;
    let (new_parent, new_name) = path::split_parent(new_path)?;
    if old_parent != new_parent {
        return Err(FsError::NotFound);
    }
    if new_name.len() > crate::layout::MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    let parent_ino = path::resolve(mount, old_parent)?;
    let _ = lookup_in_dir(mount, parent_ino, old_name)?;

    if let Ok(existing) = lookup_in_dir(mount, parent_ino, new_name) {
        if is_dir(mount.inode(existing).mode) {
            return Err(FsError::IsADirectory);
        }
        remove_dir_entry(mount, new_path)?;
    }

    for blk in dir_blocks(mount, parent_ino) {
        let dentries = RawDentry::slice_mut(mount.data_block_mut(blk));
        if let Some(d) = dentries.iter_mut().find(|d| !d.is_free() && d.name_bytes() == old_name) {
            d.set_name(new_name);
            return Ok(());
        }
    }
    Err(FsError::NotFound)
}
