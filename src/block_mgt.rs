//! Block-management table read/write by physical block number (spec §4.3, mgt half).

use crate::image::Image;
use crate::layout::BlockMgt;
use crate::util::{from_bytes, reinterpret};

fn table_offset(image: &Image, b: u64) -> (u64, usize) {
    let geometry = image.geometry();
    let size = core::mem::size_of::<BlockMgt>() as u64;
    let bm = geometry.ptr_block_mgt() + (size * b) / geometry.block_size;
    let off = ((size * b) % geometry.block_size) as usize;
    (bm, off)
}

/// Reads the block-mgt record for physical block `b`.
pub fn read_mgt(image: &Image, b: u64) -> BlockMgt {
    let (bm, off) = table_offset(image, b);
    let block = image.read_raw(bm);
    let size = core::mem::size_of::<BlockMgt>();
    from_bytes(&block[off..off + size])
}

/// Writes the block-mgt record for physical block `b`.
pub fn write_mgt(image: &mut Image, b: u64, mgt: &BlockMgt) {
    let (bm, off) = table_offset(image, b);
    let mut block = image.read_raw(bm);
    let size = core::mem::size_of::<BlockMgt>();
    block[off..off + size].copy_from_slice(reinterpret(mgt));
    image.write_raw(bm, &block);
}
