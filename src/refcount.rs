//! Shared refcount-drop logic for data blocks tracked in the hash BST.
//!
//! Lives below both the dedup engine and the block map, since the block map's
//! shrink path needs to drop a share exactly the way an overwrite does (spec §4.6's
//! `unref`), without the block map depending on the dedup engine (which depends on
//! the block map for resize).

use crate::alloc::free_block;
use crate::block_mgt::{read_mgt, write_mgt};
use crate::hash_bst;
use crate::image::Image;

/// Drops one reference to data block `b`. Frees it (and removes it from the hash
/// BST) once its refcount reaches zero.
pub fn unref(image: &mut Image, b: u64) {
    let mut mgt = read_mgt(image, b);
    if mgt.refcount <= 1 {
        hash_bst::delete(image, b);
        free_block(image, b);
    } else {
        mgt.refcount -= 1;
        write_mgt(image, b, &mgt);
    }
}
