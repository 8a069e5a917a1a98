// src/class_data.rs
//
// Flat data segment holding every root-level variable of one compiled
// object. Entries are appended at aligned offsets until `finalise`, which
// allocates the backing buffer (16-byte aligned, padded to a multiple of 16)
// and writes the initial values. Pointers into the buffer stay valid for
// as long as the owner keeps it.

use std::ptr::NonNull;

use rustc_hash::FxHashMap;

use snex_identity::NamespacedIdentifier;

use crate::functions::FunctionId;
use crate::types::{ConstValue, TypeId, align_to};

#[derive(Debug, Clone)]
pub struct ClassDataEntry {
    pub id: NamespacedIdentifier,
    pub ty: TypeId,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    Duplicate,
    Finalised,
}

/// Root object whose destructor runs when the data segment is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestructorEntry {
    pub offset: u32,
    pub function: FunctionId,
}

/// Heap block behind a finalised segment. Held as a raw pointer taken from
/// a unique borrow, since generated code and the host write through it.
#[derive(Debug)]
struct Segment {
    words: NonNull<[u128]>,
}

impl Segment {
    fn zeroed(words: usize) -> Self {
        let block: &'static mut [u128] = Box::leak(vec![0u128; words].into_boxed_slice());
        Self {
            words: NonNull::from(block),
        }
    }

    fn base(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Safety: `words` came from `Box::leak` in `zeroed` and is released
        // only here.
        unsafe { drop(Box::from_raw(self.words.as_ptr())) };
    }
}

#[derive(Debug, Default)]
pub struct RootClassData {
    entries: Vec<ClassDataEntry>,
    by_id: FxHashMap<NamespacedIdentifier, usize>,
    initial: Vec<(u32, ConstValue)>,
    destructors: Vec<DestructorEntry>,
    size: u32,
    buffer: Option<Segment>,
}

// Safety: the segment is owned exclusively; the raw pointer is only shared
// with code that the owning object keeps alive.
unsafe impl Send for RootClassData {}

impl RootClassData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `size` bytes at the next offset aligned to `align`.
    pub fn allocate(
        &mut self,
        id: NamespacedIdentifier,
        ty: TypeId,
        size: u32,
        align: u32,
    ) -> Result<u32, AllocError> {
        if self.buffer.is_some() {
            return Err(AllocError::Finalised);
        }
        if self.by_id.contains_key(&id) {
            return Err(AllocError::Duplicate);
        }
        let offset = align_to(self.size, align.min(16));
        self.size = offset + size;
        self.by_id.insert(id.clone(), self.entries.len());
        self.entries.push(ClassDataEntry {
            id,
            ty,
            offset,
            size,
        });
        Ok(offset)
    }

    /// Record a value to write at `offset` when the buffer is allocated.
    pub fn set_initial_value(&mut self, offset: u32, value: ConstValue) {
        self.initial.push((offset, value));
    }

    pub fn add_destructor(&mut self, offset: u32, function: FunctionId) {
        self.destructors.push(DestructorEntry { offset, function });
    }

    /// Destructors in declaration order; callers run them in reverse.
    pub fn destructors(&self) -> &[DestructorEntry] {
        &self.destructors
    }

    /// Allocate and initialise the buffer. Idempotent.
    pub fn finalise(&mut self) {
        if self.buffer.is_some() {
            return;
        }
        self.size = align_to(self.size, 16);
        let words = (self.size / 16) as usize;
        let buffer = Segment::zeroed(words.max(1));
        let base = buffer.base();
        for (offset, value) in &self.initial {
            let bytes = value.to_bytes();
            debug_assert!(*offset as usize + bytes.len() <= self.size as usize);
            // Safety: offsets come from `allocate`, which keeps every entry
            // inside `size` bytes, and the buffer holds at least that many.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    base.add(*offset as usize),
                    bytes.len(),
                );
            }
        }
        tracing::debug!(
            size = self.size,
            entries = self.entries.len(),
            "finalised root class data"
        );
        self.buffer = Some(buffer);
    }

    pub fn is_finalised(&self) -> bool {
        self.buffer.is_some()
    }

    /// Base address of the data segment. `None` before `finalise`.
    pub fn base_ptr(&self) -> Option<*mut u8> {
        self.buffer.as_ref().map(Segment::base)
    }

    /// Address of a named entry. `None` before `finalise` or if unknown.
    pub fn data_pointer(&self, id: &NamespacedIdentifier) -> Option<*mut u8> {
        let base = self.base_ptr()?;
        let entry = &self.entries[*self.by_id.get(id)?];
        // Safety: entry offsets are within the allocated buffer.
        Some(unsafe { base.add(entry.offset as usize) })
    }

    pub fn entry(&self, id: &NamespacedIdentifier) -> Option<&ClassDataEntry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[ClassDataEntry] {
        &self.entries
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_identity::Interner;

    #[test]
    fn allocation_is_aligned_and_final() {
        let mut interner = Interner::new();
        let a = NamespacedIdentifier::single(interner.intern("a"));
        let b = NamespacedIdentifier::single(interner.intern("b"));
        let c = NamespacedIdentifier::single(interner.intern("c"));

        let mut data = RootClassData::new();
        assert!(data.base_ptr().is_none());
        assert_eq!(data.allocate(a.clone(), TypeId::INT, 4, 4), Ok(0));
        assert_eq!(data.allocate(b.clone(), TypeId::DOUBLE, 8, 8), Ok(8));
        assert_eq!(
            data.allocate(a.clone(), TypeId::INT, 4, 4),
            Err(AllocError::Duplicate)
        );
        data.set_initial_value(0, ConstValue::Int(7));
        data.set_initial_value(8, ConstValue::Double(0.25));
        data.finalise();

        assert_eq!(data.size(), 16);
        assert_eq!(
            data.allocate(c, TypeId::INT, 4, 4),
            Err(AllocError::Finalised)
        );
        let base = data.base_ptr().unwrap();
        assert_eq!(base as usize % 16, 0);
        unsafe {
            assert_eq!(*(data.data_pointer(&a).unwrap() as *const i32), 7);
            assert_eq!(*(data.data_pointer(&b).unwrap() as *const f64), 0.25);
        }
    }

    #[test]
    fn segment_is_writable_through_its_base_pointer() {
        let mut interner = Interner::new();
        let x = NamespacedIdentifier::single(interner.intern("x"));
        let mut data = RootClassData::new();
        data.allocate(x.clone(), TypeId::FLOAT, 4, 4).unwrap();
        data.finalise();

        let ptr = data.data_pointer(&x).unwrap() as *mut f32;
        unsafe { *ptr = 1.5 };
        let moved = data;
        assert_eq!(moved.data_pointer(&x).unwrap() as *mut f32, ptr);
        assert_eq!(unsafe { *ptr }, 1.5);
    }

    #[test]
    fn empty_segment_still_has_an_address() {
        let mut data = RootClassData::new();
        data.finalise();
        assert_eq!(data.size(), 0);
        assert!(data.base_ptr().is_some());
    }
}
