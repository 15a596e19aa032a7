//! `a1fs`: mounts an image file at a mount point and serves file
//! operations through it.
//!
//! The FUSE bridge's dispatch loop, option parsing, and path-to-inode
//! caching convention it needs live only in this binary, the one place
//! that knows about `fuser`. Every callback below is a thin
//! translation: resolve a path (or an already-cached one), call
//! straight into [`a1fs::ops`], translate the result back into the
//! reply the bridge expects.

use a1fs::context::Mount;
use a1fs::error::FsError;
use a1fs::ops::{self, TimeSpec};
use a1fs::time::SystemClock;
use anyhow::{Context, Result};
use clap::Parser;
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// FUSE reserves inode 1 for the mount root; a1fs's root is always
/// inode 0, so every FUSE inode is the a1fs inode number plus one.
fn fuse_ino(a1fs_ino: u32) -> u64 {
    a1fs_ino as u64 + 1
}

/// How long the kernel may cache attribute/entry replies. a1fs has no
/// concurrent writers outside this single mount, so any TTL is safe;
/// one second is a conservative default for a single-user mount.
const TTL: Duration = Duration::from_secs(1);

/// Translates the core's path-based operation façade onto FUSE's
/// inode-based callback convention. a1fs has no hard links, so every
/// live inode has exactly one path, and this map — populated on every
/// `lookup` plus the root at mount time — is enough to recover it.
/// Never evicted: `forget` would otherwise need to drop entries that a
/// later callback still references before the kernel's own cache
/// would have dropped them.
struct A1fsDriver {
    mount: Mount,
    paths: HashMap<u64, Vec<u8>>,
}

impl A1fsDriver {
    fn new(mount: Mount) -> Self {
        let mut paths = HashMap::new();
        paths.insert(fuse_ino(a1fs::path::ROOT_INODE), b"/".to_vec());
        A1fsDriver { mount, paths }
    }

    fn path_of(&self, ino: u64) -> Option<&[u8]> {
        self.paths.get(&ino).map(Vec::as_slice)
    }

    /// Joins a parent path with a raw FUSE entry name. Names travel as
    /// bytes end to end (`OsStrExt::as_bytes`, not `to_string_lossy`)
    /// so a non-UTF-8 filename round-trips through the core instead of
    /// being corrupted into `U+FFFD` before it ever reaches a dentry.
    fn child_path(parent_path: &[u8], name: &OsStr) -> Vec<u8> {
        let mut path = parent_path.to_vec();
        if parent_path != b"/" {
            path.push(b'/');
        }
        path.extend_from_slice(name.as_bytes());
        path
    }

    fn attr(ino: u64, a: ops::Attr) -> FileAttr {
        let kind = if a1fs::inode::is_dir(a.mode) {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        let perm = a.mode & 0o7777;
        let mtime = UNIX_EPOCH + Duration::new(a.mtime.0, a.mtime.1);
        FileAttr {
            ino,
            size: a.size,
            blocks: a.blocks_512,
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm,
            nlink: a.links,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: a1fs::layout::BLOCK_SIZE as u32,
            flags: 0,
        }
    }
}

fn errno_of(e: FsError) -> i32 {
    e.errno().raw()
}

impl Filesystem for A1fsDriver {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::child_path(&parent_path, name);
        let child_ino = match a1fs::path::resolve(&self.mount, &child_path) {
            Ok(ino) => ino,
            Err(e) => {
                reply.error(errno_of(e));
                return;
            }
        };
        match ops::getattr(&self.mount, &child_path) {
            Ok(attr) => {
                let fino = fuse_ino(child_ino);
                self.paths.insert(fino, child_path);
                reply.entry(&TTL, &Self::attr(fino, attr), 0);
            }
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        match ops::getattr(&self.mount, &path) {
            Ok(attr) => reply.attr(&TTL, &Self::attr(ino, attr)),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(new_size) = size {
            if let Err(e) = ops::truncate(&mut self.mount, &path, new_size, &SystemClock) {
                reply.error(errno_of(e));
                return;
            }
        }
        // a1fs's inode has no atime field; atime updates are accepted
        // and silently ignored, per POSIX's UTIME_OMIT convention.
        let _ = atime;
        if let Some(m) = mtime {
            let spec = match m {
                TimeOrNow::Now => TimeSpec::Now,
                TimeOrNow::SpecificTime(t) => {
                    let dur = t.duration_since(UNIX_EPOCH).unwrap_or_default();
                    TimeSpec::Set(dur.as_secs(), dur.subsec_nanos())
                }
            };
            if let Err(e) = ops::utimens(&mut self.mount, &path, spec, &SystemClock) {
                reply.error(errno_of(e));
                return;
            }
        }
        match ops::getattr(&self.mount, &path) {
            Ok(attr) => reply.attr(&TTL, &Self::attr(ino, attr)),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut entries: Vec<(Vec<u8>, u32, bool)> = Vec::new();
        let res = ops::readdir(&self.mount, &path, |name, child_ino, is_dir| {
            entries.push((name.to_vec(), child_ino, is_dir));
            true
        });
        if let Err(e) = res {
            reply.error(errno_of(e));
            return;
        }
        for (i, (name, child_ino, is_dir)) in entries.into_iter().enumerate().skip(offset as usize)
        {
            let fino = fuse_ino(child_ino);
            let child_path = match name.as_slice() {
                b"." => path.clone(),
                b".." => self.path_of(fino).map(<[u8]>::to_vec).unwrap_or_else(|| path.clone()),
                _ => Self::child_path(&path, OsStr::from_bytes(&name)),
            };
            self.paths.entry(fino).or_insert(child_path);
            let kind = if is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            if reply.add(fino, (i + 1) as i64, kind, OsStr::from_bytes(&name)) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::child_path(&parent_path, name);
        match ops::mkdir(&mut self.mount, &child_path, mode as u16, &SystemClock) {
            Ok(ino) => {
                let fino = fuse_ino(ino);
                self.paths.insert(fino, child_path.clone());
                let attr = ops::getattr(&self.mount, &child_path).expect("just created");
                reply.entry(&TTL, &Self::attr(fino, attr), 0);
            }
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::child_path(&parent_path, name);
        match ops::rmdir(&mut self.mount, &child_path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::child_path(&parent_path, name);
        match ops::create(&mut self.mount, &child_path, mode as u16, &SystemClock) {
            Ok(ino) => {
                let fino = fuse_ino(ino);
                self.paths.insert(fino, child_path.clone());
                let attr = ops::getattr(&self.mount, &child_path).expect("just created");
                reply.created(&TTL, &Self::attr(fino, attr), 0, 0, 0);
            }
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::child_path(&parent_path, name);
        match ops::unlink(&mut self.mount, &child_path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(old_parent), Some(new_parent)) = (
            self.path_of(parent).map(<[u8]>::to_vec),
            self.path_of(newparent).map(<[u8]>::to_vec),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };
        let old_path = Self::child_path(&old_parent, name);
        let new_path = Self::child_path(&new_parent, newname);
        match ops::rename(&mut self.mount, &old_path, &new_path) {
            Ok(()) => {
                if let Ok(ino) = a1fs::path::resolve(&self.mount, &new_path) {
                    self.paths.insert(fuse_ino(ino), new_path);
                }
                reply.ok()
            }
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        // a1fs has no per-open file-handle state: every read/write
        // carries an absolute offset resolved fresh.
        reply.opened(0, 0);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match ops::read(&self.mount, &path, &mut buf, offset as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino).map(<[u8]>::to_vec) else {
            reply.error(libc::ENOENT);
            return;
        };
        match ops::write(&mut self.mount, &path, data, offset as u64, &SystemClock) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno_of(e)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let s = ops::statfs(&self.mount);
        reply.statfs(
            s.blocks,
            s.free_blocks,
            s.free_blocks,
            s.inodes as u64,
            s.free_inodes as u64,
            s.block_size,
            s.name_max,
            0,
        );
    }

    fn destroy(&mut self) {
        if let Err(e) = self.mount.flush() {
            warn!("failed to flush image on unmount: {e}");
        } else {
            debug!("image flushed cleanly on unmount");
        }
    }
}

/// Mount an a1fs image at a directory.
#[derive(Parser, Debug)]
#[command(name = "a1fs", version)]
struct Args {
    /// Path to the a1fs image file.
    image: PathBuf,

    /// Directory to mount the image at.
    mount_point: PathBuf,

    /// Raw options forwarded to the FUSE bridge (e.g. `allow_other`).
    #[arg(short = 'o', value_delimiter = ',')]
    options: Vec<String>,
}

fn run(args: Args) -> Result<()> {
    let mount = Mount::open(&args.image)
        .with_context(|| format!("failed to map {}", args.image.display()))?;
    if !mount.is_a1fs() {
        anyhow::bail!("{} does not hold a formatted a1fs image", args.image.display());
    }

    let mut options = vec![MountOption::FSName("a1fs".to_string())];
    for raw in &args.options {
        options.push(MountOption::CUSTOM(raw.clone()));
    }

    let driver = A1fsDriver::new(mount);
    fuser::mount2(driver, &args.mount_point, &options)
        .with_context(|| format!("failed to mount at {}", args.mount_point.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("a1fs: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}
