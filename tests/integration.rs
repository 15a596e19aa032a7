//! End-to-end scenarios against a real image file, exercising the
//! façade the way `mkfs.a1fs` + `a1fs` would.

use a1fs::context::Mount;
use a1fs::ops::{self, TimeSpec};
use a1fs::time::{Clock, SystemClock};
use std::io::{Seek, SeekFrom, Write};

const IMAGE_SIZE: u64 = 256 * 1024;
const NUM_INODES: u32 = 256;

/// A fixed wall clock, so `mtime` assertions don't race the real
/// clock between a write and the read that checks it.
struct FakeClock(u64);

impl Clock for FakeClock {
    fn now(&self) -> Result<(u64, u32), a1fs::error::FsError> {
        Ok((self.0, 0))
    }
}

fn formatted_image() -> Mount {
    let mut file = tempfile::tempfile().unwrap();
    file.seek(SeekFrom::Start(IMAGE_SIZE - 1)).unwrap();
    file.write_all(&[0]).unwrap();
    let mut mount = Mount::from_file(file).unwrap();
    a1fs::format::format(&mut mount, NUM_INODES, &SystemClock).unwrap();
    mount
}

/// Checks the counter/bitmap invariants from spec §8: `free_dblocks =
/// DB - popcount(bitmap)` and `free_inodes = |{i : links(i) = 0}|`.
fn assert_counters_consistent(mount: &Mount) {
    let sb = mount.superblock();
    let used = a1fs::bitmap::popcount(mount.bitmap(), mount.layout.data_blocks);
    assert_eq!(
        sb.free_data_block_count as u64,
        mount.layout.data_blocks - used
    );
    let free_inodes = (0..sb.inode_count)
        .filter(|&i| mount.inode(i).is_free())
        .count() as u32;
    assert_eq!(sb.free_inode_count, free_inodes);
}

fn collect_names(mount: &Mount, path: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    ops::readdir(mount, path, |name, _ino, _is_dir| {
        names.push(String::from_utf8_lossy(name).into_owned());
        true
    })
    .unwrap();
    names
}

#[test]
fn mkdir_lists_in_root_and_consumes_two_blocks() {
    let mut mount = formatted_image();
    ops::mkdir(&mut mount, b"/dir0", 0o755, &SystemClock).unwrap();

    let names = collect_names(&mount, b"/");
    assert_eq!(names, vec![".", "..", "dir0"]);

    let sf = ops::statfs(&mount);
    assert_eq!(sf.free_inodes, NUM_INODES - 2);
    // one block for root's own directory data, one for dir0's.
    assert_eq!(sf.free_blocks, mount.layout.data_blocks - 2);
}

#[test]
fn write_then_read_back() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/file", 0o644, &SystemClock).unwrap();

    ops::write(&mut mount, b"/file", b"Hello\n", 0, &SystemClock).unwrap();
    let mut buf = [0u8; 6];
    ops::read(&mount, b"/file", &mut buf, 0).unwrap();
    assert_eq!(&buf, b"Hello\n");

    ops::write(&mut mount, b"/file", b"World\n", 6, &SystemClock).unwrap();
    let mut buf = [0u8; 12];
    ops::read(&mount, b"/file", &mut buf, 0).unwrap();
    assert_eq!(&buf, b"Hello\nWorld\n");
}

#[test]
fn write_past_eof_leaves_zero_hole() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/file2", 0o644, &SystemClock).unwrap();

    ops::write(&mut mount, b"/file2", b"HelloWorld", 0, &SystemClock).unwrap();
    ops::write(&mut mount, b"/file2", b"AfterHole", 15, &SystemClock).unwrap();

    let mut buf = [0u8; 24];
    let n = ops::read(&mount, b"/file2", &mut buf, 0).unwrap();
    assert_eq!(n, 24);
    assert_eq!(&buf, b"HelloWorld\0\0\0\0\0AfterHole");
}

#[test]
fn truncate_grows_then_shrinks_reclaiming_blocks() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/file", 0o644, &SystemClock).unwrap();
    let free_before = ops::statfs(&mount).free_blocks;

    ops::truncate(&mut mount, b"/file", 32, &SystemClock).unwrap();
    let attr = ops::getattr(&mount, b"/file").unwrap();
    assert_eq!(attr.size, 32);
    let mut buf = [0xFFu8; 32];
    let n = ops::read(&mount, b"/file", &mut buf, 0).unwrap();
    assert_eq!(n, 32);
    assert_eq!(buf, [0u8; 32]);

    ops::truncate(&mut mount, b"/file", 16, &SystemClock).unwrap();
    assert_eq!(ops::getattr(&mount, b"/file").unwrap().size, 16);

    ops::truncate(&mut mount, b"/file", 8, &SystemClock).unwrap();
    assert_eq!(ops::getattr(&mount, b"/file").unwrap().size, 8);
    // still within the one block allocated at size 32; shrinking
    // inside it must not change the free count.
    assert_eq!(ops::statfs(&mount).free_blocks, free_before - 1);

    // truncating to exactly zero reclaims the block outright.
    ops::truncate(&mut mount, b"/file", 0, &SystemClock).unwrap();
    assert_eq!(ops::statfs(&mount).free_blocks, free_before);

    ops::unlink(&mut mount, b"/file").unwrap();
    assert_eq!(ops::statfs(&mount).free_blocks, free_before);
}

#[test]
fn mkdir_then_rmdir_restores_counters() {
    let mut mount = formatted_image();
    let sf_before = ops::statfs(&mount);
    let parent_links_before = ops::getattr(&mount, b"/").unwrap().links;

    ops::mkdir(&mut mount, b"/dir", 0o755, &SystemClock).unwrap();
    assert_counters_consistent(&mount);
    ops::rmdir(&mut mount, b"/dir").unwrap();

    let sf_after = ops::statfs(&mount);
    assert_eq!(sf_after.free_inodes, sf_before.free_inodes);
    assert_eq!(sf_after.free_blocks, sf_before.free_blocks);
    assert_eq!(ops::getattr(&mount, b"/").unwrap().links, parent_links_before);
    assert_counters_consistent(&mount);
}

#[test]
fn create_then_unlink_restores_counters() {
    let mut mount = formatted_image();
    let sf_before = ops::statfs(&mount);

    ops::create(&mut mount, b"/f", 0o644, &SystemClock).unwrap();
    ops::write(&mut mount, b"/f", b"some bytes", 0, &SystemClock).unwrap();
    assert_counters_consistent(&mount);
    ops::unlink(&mut mount, b"/f").unwrap();

    let sf_after = ops::statfs(&mount);
    assert_eq!(sf_after.free_inodes, sf_before.free_inodes);
    assert_eq!(sf_after.free_blocks, sf_before.free_blocks);
    assert_counters_consistent(&mount);
}

#[test]
fn rmdir_rejects_non_empty_directory() {
    let mut mount = formatted_image();
    ops::mkdir(&mut mount, b"/dir", 0o755, &SystemClock).unwrap();
    ops::create(&mut mount, b"/dir/file", 0o644, &SystemClock).unwrap();

    let err = ops::rmdir(&mut mount, b"/dir").unwrap_err();
    assert_eq!(err, a1fs::error::FsError::NotEmpty);
}

#[test]
fn mkdir_fills_one_block_before_allocating_a_second() {
    let mut mount = formatted_image();
    ops::mkdir(&mut mount, b"/parent", 0o755, &SystemClock).unwrap();

    let slots = a1fs::dirent::NUM_DENTRY_PER_BLOCK - 2; // "." and ".." already occupy two.
    let free_before_fill = {
        let parent_ino = a1fs::path::resolve(&mount, b"/parent").unwrap();
        mount.inode(parent_ino).num_extents
    };

    for i in 0..slots {
        let name = format!("/parent/f{i}").into_bytes();
        ops::create(&mut mount, &name, 0o644, &SystemClock).unwrap();
    }
    let parent_ino = a1fs::path::resolve(&mount, b"/parent").unwrap();
    assert_eq!(mount.inode(parent_ino).num_extents, free_before_fill);

    // the next entry must force a second block.
    ops::create(&mut mount, b"/parent/overflow", 0o644, &SystemClock).unwrap();
    let parent_ino = a1fs::path::resolve(&mount, b"/parent").unwrap();
    assert!(mount.inode(parent_ino).num_extents > free_before_fill);
}

#[test]
fn allocator_splits_across_extents_and_grows_indirect_block_at_11th() {
    let mut mount = formatted_image();
    ops::mkdir(&mut mount, b"/d", 0o755, &SystemClock).unwrap();
    ops::create(&mut mount, b"/d/a", 0o644, &SystemClock).unwrap();
    ops::truncate(&mut mount, b"/d/a", a1fs::layout::BLOCK_SIZE, &SystemClock).unwrap();

    // After every grow of "a", allocate a one-block spacer file so the
    // block immediately following "a"'s last extent is never free;
    // "a"'s next grow is then forced into a brand-new extent instead
    // of extending the previous one in place.
    for i in 0..11 {
        let spacer = format!("/d/spacer{i}").into_bytes();
        ops::create(&mut mount, &spacer, 0o644, &SystemClock).unwrap();
        ops::truncate(&mut mount, &spacer, a1fs::layout::BLOCK_SIZE, &SystemClock).unwrap();

        let size = ops::getattr(&mount, b"/d/a").unwrap().size;
        ops::truncate(&mut mount, b"/d/a", size + a1fs::layout::BLOCK_SIZE, &SystemClock).unwrap();
    }

    let a_ino = a1fs::path::resolve(&mount, b"/d/a").unwrap();
    assert!(mount.inode(a_ino).num_extents > 10, "expected fragmentation to force > 10 extents");
    assert_ne!(mount.inode(a_ino).indirect_extent_blk, 0);
    assert_counters_consistent(&mount);
}

#[test]
fn rename_within_same_directory() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/old", 0o644, &SystemClock).unwrap();
    ops::write(&mut mount, b"/old", b"data", 0, &SystemClock).unwrap();

    ops::rename(&mut mount, b"/old", b"/new").unwrap();
    assert!(ops::getattr(&mount, b"/old").is_err());
    let mut buf = [0u8; 4];
    ops::read(&mount, b"/new", &mut buf, 0).unwrap();
    assert_eq!(&buf, b"data");
}

#[test]
fn write_stamps_mtime_from_the_injected_clock() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/f", 0o644, &FakeClock(1000)).unwrap();
    assert_eq!(ops::getattr(&mount, b"/f").unwrap().mtime, (1000, 0));

    ops::write(&mut mount, b"/f", b"data", 0, &FakeClock(2000)).unwrap();
    assert_eq!(ops::getattr(&mount, b"/f").unwrap().mtime, (2000, 0));
}

#[test]
fn utimens_now_and_omit() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/f", 0o644, &SystemClock).unwrap();
    let before = ops::getattr(&mount, b"/f").unwrap().mtime;

    ops::utimens(&mut mount, b"/f", TimeSpec::Omit, &SystemClock).unwrap();
    assert_eq!(ops::getattr(&mount, b"/f").unwrap().mtime, before);

    ops::utimens(&mut mount, b"/f", TimeSpec::Set(12345, 0), &SystemClock).unwrap();
    assert_eq!(ops::getattr(&mount, b"/f").unwrap().mtime, (12345, 0));
}

#[test]
fn path_resolution_errors() {
    let mut mount = formatted_image();
    ops::create(&mut mount, b"/file", 0o644, &SystemClock).unwrap();

    assert_eq!(
        ops::getattr(&mount, b"/nope").unwrap_err(),
        a1fs::error::FsError::NotFound
    );
    assert_eq!(
        ops::getattr(&mount, b"/file/inside").unwrap_err(),
        a1fs::error::FsError::NotADirectory
    );
    assert_eq!(
        ops::getattr(&mount, b"relative").unwrap_err(),
        a1fs::error::FsError::NotFound
    );

    let mut long = b"/".to_vec();
    long.extend(std::iter::repeat(b'x').take(5000));
    assert_eq!(
        ops::getattr(&mount, &long).unwrap_err(),
        a1fs::error::FsError::NameTooLong
    );
}

#[test]
fn non_utf8_name_round_trips_verbatim() {
    let mut mount = formatted_image();
    let name: &[u8] = b"/\xFF\xFE.bin";
    ops::create(&mut mount, name, 0o644, &SystemClock).unwrap();
    ops::write(&mut mount, name, b"payload", 0, &SystemClock).unwrap();

    let mut entries = Vec::new();
    ops::readdir(&mount, b"/", |n, _ino, _is_dir| {
        entries.push(n.to_vec());
        true
    })
    .unwrap();
    assert!(entries.iter().any(|n| n == b"\xFF\xFE.bin"));

    let mut buf = [0u8; 7];
    ops::read(&mount, name, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"payload");
}

#[test]
fn format_mount_operate_unmount_remount_preserves_tree() {
    let mut file = tempfile::tempfile().unwrap();
    file.seek(SeekFrom::Start(IMAGE_SIZE - 1)).unwrap();
    file.write_all(&[0]).unwrap();
    let mut mount = Mount::from_file(file.try_clone().unwrap()).unwrap();
    a1fs::format::format(&mut mount, NUM_INODES, &SystemClock).unwrap();
    ops::mkdir(&mut mount, b"/dir", 0o755, &SystemClock).unwrap();
    ops::create(&mut mount, b"/dir/file", 0o644, &SystemClock).unwrap();
    ops::write(&mut mount, b"/dir/file", b"persisted", 0, &SystemClock).unwrap();
    mount.flush().unwrap();
    drop(mount);

    let mut remounted = Mount::from_file(file).unwrap();
    remounted.reload_layout();
    assert!(remounted.is_a1fs());
    let mut buf = [0u8; 9];
    ops::read(&remounted, b"/dir/file", &mut buf, 0).unwrap();
    assert_eq!(&buf, b"persisted");
    assert_eq!(collect_names(&remounted, b"/dir"), vec![".", "..", "file"]);
}
