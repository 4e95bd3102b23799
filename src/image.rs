//! The in-memory image: a single byte buffer carved into superblock, inode table,
//! block-management table, and data blocks, plus whole-block raw I/O (spec §4.1).
//!
//! No file, no `mmap`: the image is a RAM buffer for the life of the mount, matching
//! the filesystem's explicit non-goal of device persistence.

use crate::geometry::Geometry;
use crate::layout::Superblock;
use crate::util::{from_bytes, reinterpret};

/// Owns the raw byte buffer and exposes whole-block copy-in/copy-out.
pub struct Image {
    geometry: Geometry,
    buf: Vec<u8>,
}

impl Image {
    /// Allocates a fresh, zeroed image and seeds the superblock, free list, and root
    /// inode, mirroring `advfs_init`.
    pub fn new(geometry: Geometry, now: u64) -> Self {
        assert_eq!(geometry.block_size % crate::geometry::INODE_SIZE as u64, 0);
        assert_eq!(
            geometry.block_size % crate::geometry::BLOCK_MGT_SIZE as u64,
            0
        );
        assert!(geometry.block_size as usize >= core::mem::size_of::<Superblock>());
        assert!(geometry.ptr_block() < geometry.block_count);

        let mut img = Self {
            geometry,
            buf: vec![0u8; geometry.image_size() as usize],
        };

        // Every inode table slot starts Unused (all-zero already satisfies that, but
        // spell it out so the invariant doesn't depend on the zero-fill above).
        for nr in 1..=geometry.inode_count {
            img.write_inode_raw(nr, &crate::layout::Inode::unused());
        }

        // Free list: every data block points at its successor, last points at 0.
        let n_data = geometry.data_block_count();
        for i in 0..n_data {
            let b = geometry.ptr_block() + i;
            let next = if i + 1 < n_data { b + 1 } else { 0 };
            let mut block = vec![0u8; geometry.block_size as usize];
            block[0..8].copy_from_slice(&next.to_le_bytes());
            img.write_raw(b, &block);
        }

        let mut sb = Superblock::new(&geometry, now);
        sb.freelist = if n_data > 0 { geometry.ptr_block() } else { 0 };
        img.write_superblock(&sb);

        img
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Copies the whole block at physical block number `pos` out of the image.
    ///
    /// Precondition: `pos > 0` — block 0 is the superblock and goes through
    /// [`Image::read_superblock`] instead.
    pub fn read_raw(&self, pos: u64) -> Vec<u8> {
        debug_assert!(pos > 0, "block 0 is the superblock, not a raw block");
        let bs = self.geometry.block_size as usize;
        let off = pos as usize * bs;
        self.buf[off..off + bs].to_vec()
    }

    /// Copies a whole block into the image at physical block number `pos`.
    pub fn write_raw(&mut self, pos: u64, data: &[u8]) {
        debug_assert!(pos > 0, "block 0 is the superblock, not a raw block");
        let bs = self.geometry.block_size as usize;
        assert_eq!(data.len(), bs);
        let off = pos as usize * bs;
        self.buf[off..off + bs].copy_from_slice(data);
    }

    pub fn read_superblock(&self) -> Superblock {
        from_bytes(&self.buf[0..core::mem::size_of::<Superblock>()])
    }

    pub fn write_superblock(&mut self, sb: &Superblock) {
        let bytes = reinterpret(sb);
        self.buf[0..bytes.len()].copy_from_slice(bytes);
    }

    /// Low-level inode write used only during image initialisation, bypassing the
    /// table accessor in [`crate::inode_table`] (which wants a live superblock to
    /// validate bounds against).
    fn write_inode_raw(&mut self, nr: u64, inode: &crate::layout::Inode) {
        let geometry = self.geometry;
        let size = core::mem::size_of::<crate::layout::Inode>() as u64;
        let idx = nr - 1;
        let b = geometry.ptr_inode() + (size * idx) / geometry.block_size;
        let off = ((size * idx) % geometry.block_size) as usize;
        let bs = geometry.block_size as usize;
        let start = b as usize * bs + off;
        self.buf[start..start + size as usize].copy_from_slice(reinterpret(inode));
    }

    pub(crate) fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
