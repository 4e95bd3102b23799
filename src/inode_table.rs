//! Inode read/write by inode number (spec §4.3, inode half).
//!
//! Inode number `0` is the root directory, embedded in the superblock rather than
//! the table (spec §3's "embedded root inode"). Inode numbers `1..=n_inodes` index
//! the table, computed the same way `mkfs`'s `INode::get_disk_offset` locates an
//! on-disk inode: `(size * idx) / block_size` picks the block, the remainder picks
//! the byte offset within it.

use crate::image::Image;
use crate::layout::Inode;
use crate::util::{from_bytes, reinterpret};

/// The root directory's reserved inode number.
pub const ROOT_INO: u64 = 0;

fn table_offset(image: &Image, nr: u64) -> (u64, usize) {
    let geometry = image.geometry();
    debug_assert!(nr >= 1 && nr <= geometry.inode_count, "inode number {nr} out of range");
    let size = core::mem::size_of::<Inode>() as u64;
    let idx = nr - 1;
    let b = geometry.ptr_inode() + (size * idx) / geometry.block_size;
    let off = ((size * idx) % geometry.block_size) as usize;
    (b, off)
}

/// Reads inode `nr` (0 = root).
pub fn read_inode(image: &Image, nr: u64) -> Inode {
    if nr == ROOT_INO {
        return image.read_superblock().root;
    }
    let (b, off) = table_offset(image, nr);
    let block = image.read_raw(b);
    let size = core::mem::size_of::<Inode>();
    from_bytes(&block[off..off + size])
}

/// Writes inode `nr` (0 = root), performing a read-modify-write of the enclosing block.
pub fn write_inode(image: &mut Image, nr: u64, inode: &Inode) {
    if nr == ROOT_INO {
        let mut sb = image.read_superblock();
        sb.root = *inode;
        image.write_superblock(&sb);
        return;
    }
    let (b, off) = table_offset(image, nr);
    let mut block = image.read_raw(b);
    let size = core::mem::size_of::<Inode>();
    block[off..off + size].copy_from_slice(reinterpret(inode));
    image.write_raw(b, &block);
}

/// Finds the first `Unused` inode in the table, not counting the root.
pub fn find_free_inode(image: &Image) -> Option<u64> {
    let geometry = image.geometry();
    (1..=geometry.inode_count).find(|&nr| read_inode(image, nr).attr.ty() == crate::layout::InodeType::Unused)
}
