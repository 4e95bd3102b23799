//! Binary search tree over 48-byte content hashes (spec §4.4).
//!
//! The tree lives entirely inside the block-management table: a "node" is the
//! block-mgt record of a physical block, `left`/`right` are physical block numbers,
//! and the root is a physical block number stored in the superblock. It is not
//! self-balancing, matching spec §4.4's explicit call: the testable property is
//! correctness, not balance.

use crate::block_mgt::{read_mgt, write_mgt};
use crate::error::{CoreError, CoreResult};
use crate::image::Image;

/// An edge in the tree: either the superblock's root pointer, or a child slot of a
/// node. Deletion and insertion both walk a chain of these rather than holding raw
/// references, since every node lives behind a byte copy out of the image.
#[derive(Clone, Copy)]
enum Link {
    Root,
    Left(u64),
    Right(u64),
}

fn get(image: &Image, link: Link) -> u64 {
    match link {
        Link::Root => image.read_superblock().block_mgt_root,
        Link::Left(p) => read_mgt(image, p).left,
        Link::Right(p) => read_mgt(image, p).right,
    }
}

fn set(image: &mut Image, link: Link, value: u64) {
    match link {
        Link::Root => {
            let mut sb = image.read_superblock();
            sb.block_mgt_root = value;
            image.write_superblock(&sb);
        }
        Link::Left(p) => {
            let mut m = read_mgt(image, p);
            m.left = value;
            write_mgt(image, p, &m);
        }
        Link::Right(p) => {
            let mut m = read_mgt(image, p);
            m.right = value;
            write_mgt(image, p, &m);
        }
    }
}

/// Looks up the physical block number whose hash equals `hash`, or 0 if absent.
pub fn search(image: &Image, hash: &[u8]) -> u64 {
    let mut cur = image.read_superblock().block_mgt_root;
    while cur != 0 {
        let node = read_mgt(image, cur);
        cur = match hash.cmp(&node.hash[..]) {
            std::cmp::Ordering::Equal => return cur,
            std::cmp::Ordering::Less => node.left,
            std::cmp::Ordering::Greater => node.right,
        };
    }
    0
}

/// Inserts physical block `b` into the tree, keyed by its own block-mgt hash.
///
/// Fails with [`CoreError::Fault`] on an equal-key collision: per spec §9's Open
/// Question 1, a deterministic image with a sound hash cannot produce two distinct
/// payloads sharing a 48-byte SHA-384 digest, so this is treated as "cannot happen"
/// rather than given a secondary resolution path.
pub fn insert(image: &mut Image, b: u64) -> CoreResult<()> {
    let hash = read_mgt(image, b).hash;
    let mut link = Link::Root;
    loop {
        let cur = get(image, link);
        if cur == 0 {
            set(image, link, b);
            return Ok(());
        }
        let node = read_mgt(image, cur);
        link = match hash[..].cmp(&node.hash[..]) {
            std::cmp::Ordering::Equal => return Err(CoreError::Fault),
            std::cmp::Ordering::Less => Link::Left(cur),
            std::cmp::Ordering::Greater => Link::Right(cur),
        };
    }
}

/// Removes the maximum-keyed node from the subtree rooted at `root`, returning
/// `(max_block, new_subtree_root)`. `root` must be non-zero.
fn remove_max(image: &mut Image, root: u64) -> (u64, u64) {
    let node = read_mgt(image, root);
    if node.right == 0 {
        return (root, node.left);
    }
    let (max_b, new_right) = remove_max(image, node.right);
    let mut node = read_mgt(image, root);
    node.right = new_right;
    write_mgt(image, root, &node);
    (max_b, root)
}

/// Removes physical block `b` from the tree, locating it by a hash-comparison walk
/// from the root as spec §4.4 specifies.
///
/// A node with two children is replaced by its in-order predecessor (the maximum of
/// its left subtree); a node with one child is replaced by that child; a leaf is
/// simply unlinked.
pub fn delete(image: &mut Image, b: u64) {
    let target_hash = read_mgt(image, b).hash;
    let mut link = Link::Root;
    loop {
        let cur = get(image, link);
        if cur == 0 {
            return;
        }
        if cur == b {
            break;
        }
        let node = read_mgt(image, cur);
        link = match target_hash[..].cmp(&node.hash[..]) {
            std::cmp::Ordering::Less => Link::Left(cur),
            std::cmp::Ordering::Greater => Link::Right(cur),
            std::cmp::Ordering::Equal => break,
        };
    }

    let node = read_mgt(image, b);
    let replacement = if node.left != 0 && node.right != 0 {
        let (max_b, new_left_root) = remove_max(image, node.left);
        let mut max_node = read_mgt(image, max_b);
        max_node.left = new_left_root;
        max_node.right = node.right;
        write_mgt(image, max_b, &max_node);
        max_b
    } else if node.left != 0 {
        node.left
    } else {
        node.right
    };
    set(image, link, replacement);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::Geometry;
    use crate::layout::BlockMgt;

    fn mk_image() -> Image {
        Image::new(
            Geometry {
                block_size: 1024,
                block_count: 64,
                inode_count: 8,
            },
            0,
        )
    }

    fn mk_hash(tag: u8) -> [u8; crate::geometry::HASH_LEN] {
        let mut h = [0u8; crate::geometry::HASH_LEN];
        h[0] = tag;
        h
    }

    #[test]
    fn insert_search_delete_roundtrip() {
        let mut image = mk_image();
        let blocks = [10u64, 20, 30, 5, 15, 25, 35];
        for (i, &b) in blocks.iter().enumerate() {
            let mut mgt = BlockMgt::empty();
            mgt.hash = mk_hash(i as u8 + 1);
            mgt.refcount = 1;
            write_mgt(&mut image, b, &mgt);
            insert(&mut image, b).unwrap();
        }
        for (i, &b) in blocks.iter().enumerate() {
            assert_eq!(search(&image, &mk_hash(i as u8 + 1)), b);
        }

        // Delete a two-children node (the first inserted, now internal) and check
        // every remaining block is still reachable afterwards.
        delete(&mut image, blocks[0]);
        for (i, &b) in blocks.iter().enumerate().skip(1) {
            assert_eq!(search(&image, &mk_hash(i as u8 + 1)), b);
        }
        assert_eq!(search(&image, &mk_hash(1)), 0);
    }

    #[test]
    fn bijection_with_refcounts() {
        let mut image = mk_image();
        for (i, b) in [1u64, 2, 3, 4].into_iter().enumerate() {
            let mut mgt = BlockMgt::empty();
            mgt.hash = mk_hash(i as u8 + 1);
            mgt.refcount = 1;
            write_mgt(&mut image, b, &mgt);
            insert(&mut image, b).unwrap();
        }
        delete(&mut image, 2);
        // A breadth-first walk should now visit exactly {1, 3, 4}.
        let mut seen = std::collections::HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(image.read_superblock().block_mgt_root);
        while let Some(cur) = queue.pop_front() {
            if cur == 0 || !seen.insert(cur) {
                continue;
            }
            let node = read_mgt(&image, cur);
            queue.push_back(node.left);
            queue.push_back(node.right);
        }
        assert_eq!(seen, std::collections::HashSet::from([1, 3, 4]));
    }
}
