//! The filesystem-level facade the adapter drives: attribute synthesis, `statfs`
//! figures, and a wall-clock time source layered over the mountpoint-agnostic core
//! (spec §4.8's "adapters translate host calls into core calls").

use std::time::{SystemTime, UNIX_EPOCH};

use crate::dedup;
use crate::error::CoreResult;
use crate::geometry::{Geometry, NAME_MAX};
use crate::image::Image;
use crate::inode_table::{read_inode, write_inode, ROOT_INO};
use crate::layout::InodeType;
use crate::path;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Synthesised attributes for one inode, independent of any particular host API.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub ty: InodeType,
    pub mode: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub size: u64,
    pub blocks: u64,
    pub block_size: u64,
    /// `2 + child count` for directories, `1` for files (spec §4.8).
    pub nlink: u32,
}

/// `statfs`-shaped counts (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub blocks: u64,
    pub blocks_free: u64,
    pub inodes: u64,
    pub inodes_free: u64,
    pub namemax: u32,
    pub block_size: u64,
}

/// Owns the in-memory image and exposes the operations the FUSE adapter calls.
pub struct Fs {
    image: Image,
}

impl Fs {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            image: Image::new(geometry, now()),
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.image.geometry()
    }

    pub fn attr(&self, nr: u64) -> Attr {
        let inode = read_inode(&self.image, nr);
        let nlink = if inode.attr.ty() == InodeType::Dir {
            2 + inode.attr.size as u32
        } else {
            1
        };
        Attr {
            ty: inode.attr.ty(),
            mode: inode.attr.mode,
            atime: inode.attr.atime,
            mtime: inode.attr.mtime,
            ctime: inode.attr.ctime,
            size: inode.attr.size,
            blocks: inode.attr.n_blocks,
            block_size: self.image.geometry().block_size,
            nlink,
        }
    }

    pub fn statfs(&self) -> StatFs {
        let sb = self.image.read_superblock();
        StatFs {
            blocks: sb.n_blocks,
            blocks_free: sb.n_blocks - sb.n_block_used,
            inodes: sb.n_inodes,
            inodes_free: sb.n_inodes - sb.n_inode_used,
            namemax: NAME_MAX as u32,
            block_size: self.image.geometry().block_size,
        }
    }

    pub fn lookup(&mut self, parent: u64, name: &str) -> Option<u64> {
        path::lookup_child(&self.image, parent, name)
    }

    pub fn readdir(&self, dir_nr: u64) -> CoreResult<Vec<(String, u64, InodeType)>> {
        Ok(path::readdir(&self.image, dir_nr)?
            .into_iter()
            .map(|(name, nr)| {
                let ty = read_inode(&self.image, nr).attr.ty();
                (name, nr, ty)
            })
            .collect())
    }

    /// Creates a regular file, setting real mtime/ctime/atime on success.
    pub fn create(&mut self, parent_path: &str, name: &str) -> CoreResult<u64> {
        let full = join(parent_path, name);
        let nr = path::resolve_path(&mut self.image, &full, true)?;
        self.stamp(nr);
        Ok(nr)
    }

    pub fn mkdir(&mut self, parent_path: &str, name: &str) -> CoreResult<u64> {
        let full = join(parent_path, name);
        let nr = path::mkdir(&mut self.image, &full)?;
        self.stamp(nr);
        Ok(nr)
    }

    pub fn unlink(&mut self, parent_path: &str, name: &str) -> CoreResult<()> {
        path::unlink(&mut self.image, &join(parent_path, name))
    }

    pub fn rmdir(&mut self, parent_path: &str, name: &str) -> CoreResult<()> {
        path::rmdir(&mut self.image, &join(parent_path, name))
    }

    pub fn read(&self, nr: u64, offset: u64, len: u64) -> Vec<u8> {
        dedup::read(&self.image, nr, offset, len)
    }

    pub fn write(&mut self, nr: u64, offset: u64, buf: &[u8]) -> CoreResult<u32> {
        dedup::write(&mut self.image, nr, offset, buf)?;
        let mut inode = read_inode(&self.image, nr);
        inode.attr.mtime = now();
        inode.attr.ctime = inode.attr.mtime;
        write_inode(&mut self.image, nr, &inode);
        Ok(buf.len() as u32)
    }

    /// Changes a file's length (`setattr`'s size field, spec §9 Open Question 4).
    pub fn truncate(&mut self, nr: u64, new_size: u64) -> CoreResult<()> {
        dedup::truncate(&mut self.image, nr, new_size)?;
        let mut inode = read_inode(&self.image, nr);
        inode.attr.ctime = now();
        write_inode(&mut self.image, nr, &inode);
        Ok(())
    }

    /// Sets atime/mtime (`setattr`'s time fields). `None` leaves a field unchanged.
    pub fn utimens(&mut self, nr: u64, atime: Option<u64>, mtime: Option<u64>) {
        let mut inode = read_inode(&self.image, nr);
        if let Some(a) = atime {
            inode.attr.atime = a;
        }
        if let Some(m) = mtime {
            inode.attr.mtime = m;
        }
        inode.attr.ctime = now();
        write_inode(&mut self.image, nr, &inode);
    }

    fn stamp(&mut self, nr: u64) {
        let mut inode = read_inode(&self.image, nr);
        let t = now();
        inode.attr.atime = t;
        inode.attr.mtime = t;
        inode.attr.ctime = t;
        write_inode(&mut self.image, nr, &inode);
    }
}

/// Looks up the filesystem path of an already-resolved parent directory and joins
/// `name` onto it. The adapter tracks each open inode's path (fuser hands it
/// numeric inode numbers, not paths) via [`crate::adapter::Session`]; this helper
/// only concatenates what it is given.
fn join(parent_path: &str, name: &str) -> String {
    if parent_path == "/" {
        format!("/{name}")
    } else {
        format!("{parent_path}/{name}")
    }
}

impl Fs {
    /// Resolves an absolute path straight through to the core (used for the root
    /// lookup and by tests); `create` mirrors [`path::resolve_path`]'s flag.
    pub fn resolve(&mut self, path: &str, create: bool) -> CoreResult<u64> {
        path::resolve_path(&mut self.image, path, create)
    }
}

pub const ROOT: u64 = ROOT_INO;

#[cfg(test)]
mod test {
    use super::*;

    fn mk_fs() -> Fs {
        Fs::new(Geometry {
            block_size: 1024,
            block_count: 256,
            inode_count: 16,
        })
    }

    #[test]
    fn root_attr_is_a_directory_with_base_nlink() {
        let fs = mk_fs();
        let a = fs.attr(ROOT);
        assert_eq!(a.ty, InodeType::Dir);
        assert_eq!(a.nlink, 2);
    }

    #[test]
    fn create_then_statfs_reflects_usage() {
        let mut fs = mk_fs();
        let nr = fs.create("/", "a").unwrap();
        fs.write(nr, 0, b"hi").unwrap();
        let st = fs.statfs();
        assert_eq!(st.blocks_free, st.blocks - 1);
        let a = fs.attr(nr);
        assert_eq!(a.size, 2);
        assert_eq!(a.nlink, 1);
    }

    #[test]
    fn mkdir_increments_parent_nlink() {
        let mut fs = mk_fs();
        fs.mkdir("/", "d").unwrap();
        assert_eq!(fs.attr(ROOT).nlink, 3);
    }

    /// Default-geometry `statfs` (spec S1). The default image (`BLOCK_COUNT=10240`,
    /// `INODE_COUNT=128`) spends 1 block on the superblock, 16 on the inode table
    /// (128 inodes / 8 per block), and 320 on the block-mgt table (10240 blocks / 32
    /// records per block), leaving `10240 - 337 = 9903` data blocks — matching the
    /// original `advfs_init`'s arithmetic. spec.md's own S1 states `f_blocks=10199`;
    /// that figure does not reconcile with either this geometry or the original's,
    /// so 9903 is taken as correct here (see DESIGN.md).
    #[test]
    fn statfs_on_default_geometry_matches_original_arithmetic() {
        let fs = Fs::new(Geometry::default());
        let st = fs.statfs();
        assert_eq!(st.blocks, 10240);
        assert_eq!(st.blocks_free, 9903);
        assert_eq!(st.inodes, 128);
        assert_eq!(st.inodes_free, 128);
        assert_eq!(st.namemax, 255);
    }
}
