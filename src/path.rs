//! Splits an absolute slash-separated path and walks directory entries
//! to yield an inode number.
//!
//! Paths and names are raw bytes, not `str`: §3's dentry name is
//! "UTF-8-unaware" and §1's Non-goals rule out any name encoding
//! beyond raw bytes, so nothing in this module (or its callers)
//! assumes a path is valid UTF-8.

use crate::context::Mount;
use crate::dirent::RawDentry;
use crate::error::{FsError, FsResult};
use crate::extent::dir_blocks;
use crate::inode::is_dir;
use crate::layout::MAX_PATH_LEN;

/// Inode number of the filesystem root, always allocated by the
/// formatter.
pub const ROOT_INODE: u32 = 0;

pub fn check_len(path: &[u8]) -> FsResult<()> {
    if path.len() >= MAX_PATH_LEN {
        Err(FsError::NameTooLong)
    } else {
        Ok(())
    }
}

/// Resolves an absolute path to an inode number, one component at a
/// time from the root. The trailing slash on `/` is the only
/// permitted trailing slash; name comparisons are byte-exact, no
/// normalization.
pub fn resolve(mount: &Mount, path: &[u8]) -> FsResult<u32> {
    if !path.starts_with(b"/") {
        return Err(FsError::NotFound);
    }
    let mut current = ROOT_INODE;
    for component in path.split(|&b| b == b'/').filter(|s| !s.is_empty()) {
        if !is_dir(mount.inode(current).mode) {
            return Err(FsError::NotADirectory);
        }
        current = lookup_in_dir(mount, current, component)?;
    }
    Ok(current)
}

/// Scans `dir_ino`'s data blocks entry-by-entry for `name`, returning
/// its inode number or **not-found**.
pub fn lookup_in_dir(mount: &Mount, dir_ino: u32, name: &[u8]) -> FsResult<u32> {
    for blk in dir_blocks(mount, dir_ino) {
        for dentry in RawDentry::slice(mount.data_block(blk)) {
            if !dentry.is_free() && dentry.name_bytes() == name {
                return Ok(dentry.inode);
            }
        }
    }
    Err(FsError::NotFound)
}

/// Splits `path` into its parent path and final component, as
/// `add_dir_entry`/`remove_dir_entry` need. Rejects the
/// root itself (it has no parent/name to split off) and any component
/// longer than `MAX_NAME_LEN` bytes.
pub fn split_parent(path: &[u8]) -> FsResult<(&[u8], &[u8])> {
    let trimmed = path.strip_suffix(b"/").unwrap_or(path);
    if trimmed.is_empty() {
        return Err(FsError::NotFound);
    }
    let slash = trimmed.iter().rposition(|&b| b == b'/').ok_or(FsError::NotFound)?;
    let parent: &[u8] = if slash == 0 { b"/" } else { &trimmed[..slash] };
    let name = &trimmed[slash + 1..];
    if name.len() > crate::layout::MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    Ok((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_path() {
        assert_eq!(split_parent(b"/file").unwrap(), (&b"/"[..], &b"file"[..]));
    }

    #[test]
    fn splits_nested_path() {
        assert_eq!(
            split_parent(b"/a/b/file").unwrap(),
            (&b"/a/b"[..], &b"file"[..])
        );
    }

    #[test]
    fn rejects_root() {
        assert!(split_parent(b"/").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        let mut long = b"/".to_vec();
        long.extend(std::iter::repeat(b'x').take(300));
        assert_eq!(split_parent(&long).unwrap_err(), FsError::NameTooLong);
    }

    #[test]
    fn accepts_non_utf8_component() {
        // 0xFF is not valid UTF-8 on its own; raw-byte names must
        // still split and resolve without requiring `str` validity.
        let path: &[u8] = b"/\xFF\xFE";
        let (parent, name) = split_parent(path).unwrap();
        assert_eq!(parent, b"/");
        assert_eq!(name, b"\xFF\xFE");
    }
}
