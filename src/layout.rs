//! On-image byte layout: superblock, inode, and block-management records.
//!
//! Every struct here is `#[repr(C)]` plain-old-data copied in and out of the image
//! buffer by [`crate::util::reinterpret`]; none of them are ever used behind a
//! reference into the image directly, to keep the borrow checker out of unsafe
//! aliasing games. Layout mirrors the original `advfs_*_t` structures: attributes
//! padded to 128 bytes, a 512-byte inode, a 128-byte block-management record.

use crate::geometry::{HASH_LEN, INODE_BLOCKPTR, NAME_MAX};

/// Inode type tag. `Unused` marks a free slot in the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum InodeType {
    Unused = 0,
    Regular = 1,
    Dir = 2,
}

impl InodeType {
    fn from_raw(v: u64) -> Self {
        match v {
            1 => Self::Regular,
            2 => Self::Dir,
            _ => Self::Unused,
        }
    }
}

/// The fixed-size attribute block of an inode, padded to 128 bytes on image.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InodeAttr {
    pub ty: u64,
    pub mode: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    /// Byte length for regular files, number of valid children for directories.
    pub size: u64,
    /// Logical length of the block map.
    pub n_blocks: u64,
    _padding: [u8; 128 - 7 * 8],
}

impl InodeAttr {
    pub fn ty(&self) -> InodeType {
        InodeType::from_raw(self.ty)
    }

    fn unused() -> Self {
        Self {
            ty: InodeType::Unused as u64,
            mode: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            size: 0,
            n_blocks: 0,
            _padding: [0; 128 - 7 * 8],
        }
    }
}

/// A 512-byte inode record: attributes, a NUL-terminated name, and the block map.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Inode {
    pub attr: InodeAttr,
    /// NUL-terminated component name; unused for the root.
    pub name: [u8; NAME_MAX + 1],
    /// Direct slots, except the last which heads the indirect chain.
    pub blocks: [u64; INODE_BLOCKPTR],
}

const _: () = assert!(core::mem::size_of::<Inode>() == 512);

impl Inode {
    /// A zeroed, `Unused` inode.
    pub fn unused() -> Self {
        Self {
            attr: InodeAttr::unused(),
            name: [0; NAME_MAX + 1],
            blocks: [0; INODE_BLOCKPTR],
        }
    }

    /// Returns the name as a `&str`, stopping at the first NUL.
    pub fn name_str(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Sets the name field, truncating silently if it's impossibly long (callers must
    /// validate against `NAME_MAX` beforehand; this never panics on the happy path).
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_MAX + 1];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_MAX);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }
}

/// A 128-byte block-management record: the hash-BST node for one physical data block.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct BlockMgt {
    pub hash: [u8; HASH_LEN],
    pub refcount: u64,
    pub left: u64,
    pub right: u64,
    _padding: [u8; 128 - HASH_LEN - 3 * 8],
}

const _: () = assert!(core::mem::size_of::<BlockMgt>() == 128);

impl BlockMgt {
    pub fn empty() -> Self {
        Self {
            hash: [0; HASH_LEN],
            refcount: 0,
            left: 0,
            right: 0,
            _padding: [0; 128 - HASH_LEN - 3 * 8],
        }
    }
}

/// The superblock, occupying block 0.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Superblock {
    /// First block of the inode table.
    pub ptr_inode: u64,
    /// First block of the block-management table.
    pub ptr_block_mgt: u64,
    /// First data block.
    pub ptr_block: u64,
    /// Total number of inodes.
    pub n_inodes: u64,
    /// Number of inodes with a type other than `Unused`.
    pub n_inode_used: u64,
    /// Total number of data blocks.
    pub n_blocks: u64,
    /// `n_blocks - |free list|`.
    pub n_block_used: u64,
    /// Head of the free list, 0 = empty.
    pub freelist: u64,
    /// Root of the hash BST, 0 = empty.
    pub block_mgt_root: u64,
    /// The root directory's inode, embedded rather than indexed.
    pub root: Inode,
}

impl Superblock {
    pub fn new(geometry: &crate::geometry::Geometry, now: u64) -> Self {
        let mut root = Inode::unused();
        root.attr.ty = InodeType::Dir as u64;
        root.attr.mode = 0o755;
        root.attr.atime = now;
        root.attr.mtime = now;
        root.attr.ctime = now;
        root.attr.size = 0;
        root.attr.n_blocks = 0;
        Self {
            ptr_inode: geometry.ptr_inode(),
            ptr_block_mgt: geometry.ptr_block_mgt(),
            ptr_block: geometry.ptr_block(),
            n_inodes: geometry.inode_count,
            n_inode_used: 0,
            n_blocks: geometry.data_block_count(),
            n_block_used: 0,
            freelist: 0,
            block_mgt_root: 0,
            root,
        }
    }
}
