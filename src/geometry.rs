//! Image geometry: the sizes that are fixed for the lifetime of a mounted image.
//!
//! The original filesystem hardwires these as compile-time constants; here they are
//! plain fields so that tests can mount small images without rebuilding anything.

/// Length of a content hash in bytes (SHA-384).
pub const HASH_LEN: usize = 48;

/// Number of block-map slots stored directly in an inode. The last slot is the head
/// of the indirect chain rather than a data block.
pub const INODE_BLOCKPTR: usize = 16;

/// Maximum length of a path component, not counting the terminating NUL.
pub const NAME_MAX: usize = 255;

/// Geometry of an image: block size and the number of blocks/inodes it is carved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Size of a block in bytes.
    pub block_size: u64,
    /// Total number of blocks in the image, including metadata blocks.
    pub block_count: u64,
    /// Total number of inodes.
    pub inode_count: u64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: 4096,
            block_count: 10240,
            inode_count: 128,
        }
    }
}

impl Geometry {
    /// Number of 64-bit slots an indirect block can hold before its chain-link slot.
    pub fn indirect_slots(&self) -> u64 {
        self.block_size / 8 - 1
    }

    /// Number of inodes that fit in one block.
    pub fn inodes_per_block(&self) -> u64 {
        self.block_size / INODE_SIZE as u64
    }

    /// Number of block-mgt records that fit in one block.
    pub fn mgt_per_block(&self) -> u64 {
        self.block_size / BLOCK_MGT_SIZE as u64
    }

    /// Number of blocks occupied by the inode table.
    pub fn inode_area_blocks(&self) -> u64 {
        self.inode_count.div_ceil(self.inodes_per_block())
    }

    /// Number of blocks occupied by the block-management table (one record per data block).
    ///
    /// The block-management table must cover every block in the image, data blocks
    /// included, since any of them may end up hashed and tracked; sizing it against
    /// `block_count` keeps physical block numbers usable as a direct index.
    pub fn mgt_area_blocks(&self) -> u64 {
        self.block_count.div_ceil(self.mgt_per_block())
    }

    /// Physical block number of the first inode-table block.
    pub fn ptr_inode(&self) -> u64 {
        1
    }

    /// Physical block number of the first block-mgt-table block.
    pub fn ptr_block_mgt(&self) -> u64 {
        self.ptr_inode() + self.inode_area_blocks()
    }

    /// Physical block number of the first data block.
    pub fn ptr_block(&self) -> u64 {
        self.ptr_block_mgt() + self.mgt_area_blocks()
    }

    /// Number of blocks available for data (and free-list nodes).
    pub fn data_block_count(&self) -> u64 {
        self.block_count - self.ptr_block()
    }

    /// Total size of the image in bytes.
    pub fn image_size(&self) -> u64 {
        self.block_size * self.block_count
    }
}

/// Size in bytes of the on-image inode record.
pub const INODE_SIZE: usize = 512;
/// Size in bytes of the on-image block-management record.
pub const BLOCK_MGT_SIZE: usize = 128;
