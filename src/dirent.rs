//! Directory entry record: a 252-byte NUL-terminated name
//! plus a 4-byte inode number, packed to fill a block.

use crate::layout::{BLOCK_SIZE, MAX_NAME_LEN};
use std::mem::size_of;
use std::slice;

/// `MAX_NAME_LEN` bytes of name plus the NUL terminator.
pub const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawDentry {
    pub name: [u8; NAME_FIELD_LEN],
    pub inode: u32,
}

pub const NUM_DENTRY_PER_BLOCK: usize = BLOCK_SIZE as usize / size_of::<RawDentry>();

impl RawDentry {
    pub const FREE: RawDentry = RawDentry {
        name: [0u8; NAME_FIELD_LEN],
        inode: 0,
    };

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        &self.name[..len]
    }

    /// Writes `name` into the entry, NUL-terminating it. Caller must
    /// have already checked `name.len() <= MAX_NAME_LEN`.
    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0u8; NAME_FIELD_LEN];
        self.name[..name.len()].copy_from_slice(name);
    }

    pub fn clear(&mut self) {
        *self = RawDentry::FREE;
    }

    /// Reinterprets a raw data block as the packed array of dentries
    /// it holds for a directory inode.
    pub fn slice(data: &[u8]) -> &[RawDentry] {
        unsafe { slice::from_raw_parts(data.as_ptr() as *const RawDentry, NUM_DENTRY_PER_BLOCK) }
    }

    pub fn slice_mut(data: &mut [u8]) -> &mut [RawDentry] {
        unsafe {
            slice::from_raw_parts_mut(data.as_mut_ptr() as *mut RawDentry, NUM_DENTRY_PER_BLOCK)
        }
    }
}

const _: () = assert!(size_of::<RawDentry>() <= BLOCK_SIZE as usize);
const _: () = assert!(BLOCK_SIZE as usize % size_of::<RawDentry>() == 0);
