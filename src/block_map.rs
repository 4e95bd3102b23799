//! Translates (inode, logical index) to a physical block number and back, growing
//! and shrinking the indirect chain as needed (spec §4.5).
//!
//! An indirect block holds `K = block_size/8 - 1` data-block slots followed by one
//! chain-link slot pointing at the next indirect block (0 = end of chain).

use crate::error::{CoreError, CoreResult};
use crate::geometry::INODE_BLOCKPTR;
use crate::image::Image;
use crate::inode_table::{read_inode, write_inode};
use crate::refcount::unref;

fn direct_slots() -> u64 {
    INODE_BLOCKPTR as u64 - 1
}

fn read_u64(block: &[u8], slot: usize) -> u64 {
    u64::from_le_bytes(block[slot * 8..slot * 8 + 8].try_into().unwrap())
}

fn write_u64(block: &mut [u8], slot: usize, value: u64) {
    block[slot * 8..slot * 8 + 8].copy_from_slice(&value.to_le_bytes());
}

/// Resolves logical index `i` of `inode_nr` to a physical block number, 0 = hole.
pub fn resolve(image: &Image, inode_nr: u64, i: u64) -> u64 {
    let inode = read_inode(image, inode_nr);
    let ds = direct_slots();
    if i < ds {
        return inode.blocks[i as usize];
    }
    let k = image.geometry().indirect_slots() as usize;
    let mut chain = inode.blocks[INODE_BLOCKPTR - 1];
    let mut rem = (i - ds) as usize;
    while chain != 0 {
        let block = image.read_raw(chain);
        if rem < k {
            return read_u64(&block, rem);
        }
        rem -= k;
        chain = read_u64(&block, k);
    }
    0
}

/// Writes physical block `pb` into logical index `i`'s slot, persisting the inode or
/// the indirect block it lives in. The slot must already exist (callers grow first).
pub fn update(image: &mut Image, inode_nr: u64, i: u64, pb: u64) {
    let ds = direct_slots();
    if i < ds {
        let mut inode = read_inode(image, inode_nr);
        inode.blocks[i as usize] = pb;
        write_inode(image, inode_nr, &inode);
        return;
    }
    let k = image.geometry().indirect_slots() as usize;
    let inode = read_inode(image, inode_nr);
    let mut chain = inode.blocks[INODE_BLOCKPTR - 1];
    let mut rem = (i - ds) as usize;
    while chain != 0 {
        let mut block = image.read_raw(chain);
        if rem < k {
            write_u64(&mut block, rem, pb);
            image.write_raw(chain, &block);
            return;
        }
        rem -= k;
        chain = read_u64(&block, k);
    }
    debug_assert!(false, "update() on a slot that was never grown into");
}

/// Grows the block map to `new_n_blocks`, allocating indirect chain blocks as
/// needed to cover the new range. Newly covered slots are holes (0); the direct
/// slots and freshly allocated indirect blocks start zeroed already.
pub fn grow(image: &mut Image, inode_nr: u64, new_n_blocks: u64) -> CoreResult<()> {
    let ds = direct_slots();
    let mut inode = read_inode(image, inode_nr);

    if new_n_blocks > ds {
        let k = image.geometry().indirect_slots();
        let needed_hops = (new_n_blocks - ds - 1) / k + 1;
        let bs = image.geometry().block_size as usize;

        let mut head = inode.blocks[INODE_BLOCKPTR - 1];
        if head == 0 {
            let nb = crate::alloc::alloc_block(image).ok_or(CoreError::OutOfSpace)?;
            image.write_raw(nb, &vec![0u8; bs]);
            inode.blocks[INODE_BLOCKPTR - 1] = nb;
            head = nb;
        }

        let mut cur = head;
        for _ in 1..needed_hops {
            let mut block = image.read_raw(cur);
            let next = read_u64(&block, k as usize);
            if next == 0 {
                let nb = crate::alloc::alloc_block(image).ok_or(CoreError::OutOfSpace)?;
                image.write_raw(nb, &vec![0u8; bs]);
                write_u64(&mut block, k as usize, nb);
                image.write_raw(cur, &block);
                cur = nb;
            } else {
                cur = next;
            }
        }
    }

    inode.attr.n_blocks = new_n_blocks;
    write_inode(image, inode_nr, &inode);
    Ok(())
}

/// Shrinks the block map to `new_n_blocks`: frees every data block whose logical
/// index is `>= new_n_blocks`, and every indirect block whose span lies entirely
/// beyond `new_n_blocks` (spec §9 Open Question 2 — not the original's loop shape).
pub fn shrink(image: &mut Image, inode_nr: u64, new_n_blocks: u64) {
    let mut inode = read_inode(image, inode_nr);
    let old_n_blocks = inode.attr.n_blocks;
    let ds = direct_slots();
    let k = image.geometry().indirect_slots() as usize;

    for i in new_n_blocks.min(ds)..old_n_blocks.min(ds) {
        let pb = inode.blocks[i as usize];
        if pb != 0 {
            unref(image, pb);
            inode.blocks[i as usize] = 0;
        }
    }

    if old_n_blocks > ds {
        let mut prev: Option<u64> = None;
        let mut chain = inode.blocks[INODE_BLOCKPTR - 1];
        let mut hop_start = ds;
        while chain != 0 {
            let hop_end = hop_start + k as u64;
            let mut block = image.read_raw(chain);
            let next = read_u64(&block, k);

            if hop_start >= new_n_blocks {
                // Whole indirect block lies beyond the new length: drop every live
                // data slot it holds, then free the block itself and unlink it.
                for s in 0..k {
                    let pb = read_u64(&block, s);
                    if pb != 0 {
                        unref(image, pb);
                    }
                }
                crate::alloc::free_block(image, chain);
                match prev {
                    None => inode.blocks[INODE_BLOCKPTR - 1] = next,
                    Some(p) => {
                        let mut pblock = image.read_raw(p);
                        write_u64(&mut pblock, k, next);
                        image.write_raw(p, &pblock);
                    }
                }
            } else {
                if hop_end > new_n_blocks {
                    let from = (new_n_blocks - hop_start) as usize;
                    let mut changed = false;
                    for s in from..k {
                        let pb = read_u64(&block, s);
                        if pb != 0 {
                            unref(image, pb);
                            write_u64(&mut block, s, 0);
                            changed = true;
                        }
                    }
                    if changed {
                        image.write_raw(chain, &block);
                    }
                }
                prev = Some(chain);
            }

            chain = next;
            hop_start = hop_end;
        }
    }

    inode.attr.n_blocks = new_n_blocks;
    write_inode(image, inode_nr, &inode);
}

/// Dispatches to [`grow`], [`shrink`], or a no-op depending on the current length.
pub fn resize(image: &mut Image, inode_nr: u64, new_n_blocks: u64) -> CoreResult<()> {
    let cur = read_inode(image, inode_nr).attr.n_blocks;
    match new_n_blocks.cmp(&cur) {
        std::cmp::Ordering::Greater => grow(image, inode_nr, new_n_blocks),
        std::cmp::Ordering::Less => {
            shrink(image, inode_nr, new_n_blocks);
            Ok(())
        }
        std::cmp::Ordering::Equal => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dedup;
    use crate::geometry::Geometry;
    use crate::inode_table::ROOT_INO;
    use crate::layout::InodeType;
    use crate::path;

    fn mk_file(image: &mut Image) -> u64 {
        let mut root = read_inode(image, ROOT_INO);
        root.attr.ty = InodeType::Dir as u64;
        write_inode(image, ROOT_INO, &root);
        let inr = path::resolve_path(image, "/f", true).unwrap();
        inr
    }

    #[test]
    fn grow_beyond_direct_slots_allocates_indirect_chain() {
        let geometry = Geometry {
            block_size: 1024,
            block_count: 4096,
            inode_count: 16,
        };
        let mut image = Image::new(geometry, 0);
        let inr = mk_file(&mut image);

        // Cross two indirect-block hops.
        let k = geometry.indirect_slots();
        let new_n = direct_slots() + k + 5;
        grow(&mut image, inr, new_n).unwrap();
        for i in 0..new_n {
            assert_eq!(resolve(&image, inr, i), 0, "fresh slot {i} must be a hole");
        }

        let payload = vec![0xAB; geometry.block_size as usize];
        dedup::write_block(&mut image, inr, &payload, new_n - 1).unwrap();
        assert_eq!(dedup::read_block(&image, inr, new_n - 1), payload);
    }

    #[test]
    fn shrink_frees_indirect_blocks_beyond_new_length() {
        let geometry = Geometry {
            block_size: 1024,
            block_count: 4096,
            inode_count: 16,
        };
        let mut image = Image::new(geometry, 0);
        let inr = mk_file(&mut image);
        let k = geometry.indirect_slots();
        let new_n = direct_slots() + k + 3;
        grow(&mut image, inr, new_n).unwrap();
        for i in 0..new_n {
            let payload = vec![(i % 250) as u8; geometry.block_size as usize];
            dedup::write_block(&mut image, inr, &payload, i).unwrap();
        }
        let used_before = image.read_superblock().n_block_used;

        shrink(&mut image, inr, direct_slots());
        for i in direct_slots()..new_n {
            assert_eq!(resolve(&image, inr, i), 0);
        }
        let used_after = image.read_superblock().n_block_used;
        assert!(used_after < used_before);
    }
}
