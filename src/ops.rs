//! Operation façade: the small set of entry points the
//! external bridge invokes, each a thin composition of the lower
//! layers. Nothing here knows anything about FUSE — the driver
//! binary's adapter module is the only place that does.

use crate::dir;
use crate::dirent::RawDentry;
use crate::error::{FsError, FsResult};
use crate::extent::dir_blocks;
use crate::inode::{is_dir, S_IFDIR, S_IFREG};
use crate::layout::{BLOCK_SIZE, MAX_NAME_LEN};
use crate::{context::Mount, io, path, time::Clock};

#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u64,
    pub free_blocks: u64,
    pub inodes: u32,
    pub free_inodes: u32,
    pub name_max: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub mode: u16,
    pub links: u32,
    pub size: u64,
    pub blocks_512: u64,
    pub mtime: (u64, u32),
}

/// POSIX `UTIME_NOW`/`UTIME_OMIT` convention for `utimens`.
#[derive(Debug, Clone, Copy)]
pub enum TimeSpec {
    Omit,
    Now,
    Set(u64, u32),
}

pub fn statfs(mount: &Mount) -> StatFs {
    let sb = mount.superblock();
    StatFs {
        block_size: BLOCK_SIZE as u32,
        blocks: mount.layout.total_blocks,
        free_blocks: sb.free_data_block_count as u64,
        inodes: sb.inode_count,
        free_inodes: sb.free_inode_count,
        name_max: MAX_NAME_LEN as u32,
    }
}

pub fn getattr(mount: &Mount, p: &[u8]) -> FsResult<Attr> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    let inode = mount.inode(ino);
    Ok(Attr {
        mode: inode.mode,
        links: inode.links as u32,
        size: inode.size,
        blocks_512: inode.size / 512,
        mtime: (inode.mtime_sec, inode.mtime_nsec),
    })
}

/// Synthesizes `.` and `..` first, then enumerates live dentry slots
/// in block-then-extent order, handing each to `sink`. `sink` returns
/// `false` when it cannot accept any more entries (e.g. a full
/// caller buffer), which surfaces as **out-of-memory**.
pub fn readdir(
    mount: &Mount,
    p: &[u8],
    mut sink: impl FnMut(&[u8], u32, bool) -> bool,
) -> FsResult<()> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    if !is_dir(mount.inode(ino).mode) {
        return Err(FsError::NotADirectory);
    }

    let dotdot = if p == b"/" {
        ino
    } else {
        let (parent_path, _) = path::split_parent(p)?;
        path::resolve(mount, parent_path)?
    };

    if !sink(b".", ino, true) {
        return Err(FsError::OutOfMemory);
    }
    if !sink(b"..", dotdot, true) {
        return Err(FsError::OutOfMemory);
    }
    for blk in dir_blocks(mount, ino) {
        for dentry in RawDentry::slice(mount.data_block(blk)) {
            if dentry.is_free() {
                continue;
            }
            let child_is_dir = is_dir(mount.inode(dentry.inode).mode);
            if !sink(dentry.name_bytes(), dentry.inode, child_is_dir) {
                return Err(FsError::OutOfMemory);
            }
        }
    }
    Ok(())
}

pub fn mkdir(mount: &mut Mount, p: &[u8], mode: u16, clock: &dyn Clock) -> FsResult<u32> {
    dir::add_dir_entry(mount, p, (mode & 0o7777) | S_IFDIR, 2, clock)
}

pub fn rmdir(mount: &mut Mount, p: &[u8]) -> FsResult<()> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    if !is_dir(mount.inode(ino).mode) {
        return Err(FsError::NotADirectory);
    }
    if !dir::is_empty(mount, ino) {
        return Err(FsError::NotEmpty);
    }
    dir::remove_dir_entry(mount, p)
}

/// Caller asserts `mode` names a regular file.
pub fn create(mount: &mut Mount, p: &[u8], mode: u16, clock: &dyn Clock) -> FsResult<u32> {
    dir::add_dir_entry(mount, p, (mode & 0o7777) | S_IFREG, 1, clock)
}

pub fn unlink(mount: &mut Mount, p: &[u8]) -> FsResult<()> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    if is_dir(mount.inode(ino).mode) {
        return Err(FsError::IsADirectory);
    }
    dir::remove_dir_entry(mount, p)
}

pub fn rename(mount: &mut Mount, old: &[u8], new: &[u8]) -> FsResult<()> {
    dir::rename(mount, old, new)
}

pub fn utimens(
    mount: &mut Mount,
    p: &[u8],
    mtime: TimeSpec,
    clock: &dyn Clock,
) -> FsResult<()> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    match mtime {
        TimeSpec::Omit => Ok(()),
        TimeSpec::Now => {
            let now = clock.now()?;
            mount.inode_mut(ino).set_mtime(now);
            Ok(())
        }
        TimeSpec::Set(s, n) => {
            mount.inode_mut(ino).set_mtime((s, n));
            Ok(())
        }
    }
}

pub fn truncate(mount: &mut Mount, p: &[u8], new_size: u64, clock: &dyn Clock) -> FsResult<()> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    io::truncate(mount, ino, new_size, clock)
}

pub fn read(mount: &Mount, p: &[u8], buf: &mut [u8], offset: u64) -> FsResult<usize> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    Ok(io::read_range(mount, ino, buf, offset))
}

pub fn write(
    mount: &mut Mount,
    p: &[u8],
    data: &[u8],
    offset: u64,
    clock: &dyn Clock,
) -> FsResult<usize> {
    path::check_len(p)?;
    let ino = path::resolve(mount, p)?;
    io::write_range(mount, ino, data, offset, clock)
}
