//! Byte-level helpers for splicing plain-old-data structs into the image buffer.
//!
//! Grounded on the `reinterpret`-style casts the `mkfs` `ext2` factory uses to read and
//! write on-disk structures directly as byte slices.

/// Views `v` as its raw byte representation.
pub fn reinterpret<T>(v: &T) -> &[u8] {
    unsafe { core::slice::from_raw_parts(v as *const T as *const u8, core::mem::size_of::<T>()) }
}

/// Views `v` as its raw mutable byte representation.
pub fn reinterpret_mut<T>(v: &mut T) -> &mut [u8] {
    unsafe { core::slice::from_raw_parts_mut(v as *mut T as *mut u8, core::mem::size_of::<T>()) }
}

/// Copies a struct out of a byte slice.
///
/// Panics if `buf` is shorter than `size_of::<T>()`; callers only ever slice out of a
/// full-size image block, so this is an invariant violation, not a recoverable error.
pub fn from_bytes<T: Copy>(buf: &[u8]) -> T {
    assert!(buf.len() >= core::mem::size_of::<T>());
    unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const T) }
}
