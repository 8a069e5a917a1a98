// src/buffer.rs
//! Memory layout of `dyn<T>` values as seen by compiled code.
//!
//! Generated functions receive `dyn` arguments (including `block`) by
//! pointer to a [`DynBuffer`]. The layout is fixed so the code generator
//! can load fields at constant offsets.

use std::marker::PhantomData;

/// `{ data: *mut T, size: i32 }`, padded to 16 bytes.
#[repr(C)]
#[derive(Debug)]
pub struct DynBuffer<'a, T> {
    data: *mut T,
    size: i32,
    _reserved: i32,
    _marker: PhantomData<&'a mut [T]>,
}

/// Byte offset of the data pointer.
pub const DYN_DATA_OFFSET: i32 = 0;
/// Byte offset of the element count.
pub const DYN_SIZE_OFFSET: i32 = 8;
/// Total size of a `dyn` value.
pub const DYN_BYTE_SIZE: u32 = 16;

/// `block` is `dyn<float>`.
pub type Block<'a> = DynBuffer<'a, f32>;

impl<'a, T> DynBuffer<'a, T> {
    /// Borrow a slice. Slices longer than `i32::MAX` are truncated.
    pub fn from_slice(slice: &'a mut [T]) -> Self {
        let size = i32::try_from(slice.len()).unwrap_or(i32::MAX);
        Self {
            data: slice.as_mut_ptr(),
            size,
            _reserved: 0,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_slice(&self) -> &[T] {
        // Safety: constructed from a live slice of `size` elements borrowed for 'a.
        unsafe { std::slice::from_raw_parts(self.data, self.size as usize) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // Safety: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.data, self.size as usize) }
    }

    /// Pointer handed to compiled code.
    pub fn as_ptr(&mut self) -> *mut Self {
        self as *mut Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_codegen_offsets() {
        assert_eq!(std::mem::size_of::<Block<'_>>(), DYN_BYTE_SIZE as usize);
        let mut samples = [0.0f32; 4];
        let mut block = Block::from_slice(&mut samples);
        let base = block.as_ptr() as usize;
        let size_field = std::ptr::addr_of!(block.size) as usize;
        assert_eq!(size_field - base, DYN_SIZE_OFFSET as usize);
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn writes_go_through_to_the_slice() {
        let mut samples = [1.0f32, 2.0, 3.0];
        {
            let mut block = Block::from_slice(&mut samples);
            for s in block.as_mut_slice() {
                *s *= 2.0;
            }
        }
        assert_eq!(samples, [2.0, 4.0, 6.0]);
    }
}
