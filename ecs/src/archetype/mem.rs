use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
};

use crate::error::{Error, Result};

/// A raw, growable buffer of fixed-stride rows.
///
/// The buffer only tracks bytes; it never constructs or drops values. The owning archetype is
/// responsible for the initialisation state of every row. Growth relocates rows with `realloc`,
/// which is a valid move for every Rust type.
pub(crate) struct RowMemory {
    ptr: NonNull<u8>,
    capacity: usize,
    stride: usize,
    align: usize,
}

impl RowMemory {
    /// Create an empty buffer for rows of `stride` bytes aligned to `align`.
    pub fn new(stride: usize, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        debug_assert_eq!(stride % align, 0);
        Self {
            ptr: Self::dangling(align),
            capacity: 0,
            stride,
            align,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Grow the buffer to hold at least `capacity` rows.
    ///
    /// On failure the buffer is left exactly as it was and [`Error::OutOfMemory`] is returned.
    pub fn grow_to(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }
        if self.stride == 0 {
            self.capacity = capacity;
            return Ok(());
        }

        let new_layout = Self::layout(self.stride, self.align, capacity)?;
        let raw = if self.capacity == 0 {
            // SAFETY: new_layout has a non-zero size.
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = Self::layout(self.stride, self.align, self.capacity)?;
            // SAFETY: ptr was allocated with old_layout, and new_layout has the same alignment.
            unsafe { alloc::realloc(self.ptr.as_ptr(), old_layout, new_layout.size()) }
        };

        let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory {
            bytes: new_layout.size(),
        })?;
        self.ptr = ptr;
        self.capacity = capacity;
        Ok(())
    }

    /// Get a pointer to the start of row `index`.
    #[inline]
    pub fn row_ptr(&self, index: usize) -> NonNull<u8> {
        debug_assert!(
            index < self.capacity,
            "row {index} out of bounds for capacity {}",
            self.capacity
        );
        // SAFETY: index < capacity, so the offset stays inside the allocation (or is zero for
        // zero-stride rows).
        unsafe { self.ptr.add(index * self.stride) }
    }

    fn layout(stride: usize, align: usize, capacity: usize) -> Result<Layout> {
        let bytes = stride
            .checked_mul(capacity)
            .ok_or(Error::OutOfMemory { bytes: usize::MAX })?;
        Layout::from_size_align(bytes, align).map_err(|_| Error::OutOfMemory { bytes })
    }

    fn dangling(align: usize) -> NonNull<u8> {
        // SAFETY: align is a non-zero power of two.
        unsafe { NonNull::new_unchecked(ptr::without_provenance_mut(align)) }
    }
}

impl Drop for RowMemory {
    fn drop(&mut self) {
        if self.stride == 0 || self.capacity == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.stride, self.align, self.capacity) {
            // SAFETY: ptr was allocated with this layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_preserves_rows() {
        // Given
        let mut memory = RowMemory::new(8, 8);
        memory.grow_to(2).unwrap();
        unsafe {
            memory.row_ptr(0).cast::<u64>().write(11);
            memory.row_ptr(1).cast::<u64>().write(22);
        }

        // When
        memory.grow_to(64).unwrap();

        // Then
        assert_eq!(memory.capacity(), 64);
        unsafe {
            assert_eq!(memory.row_ptr(0).cast::<u64>().read(), 11);
            assert_eq!(memory.row_ptr(1).cast::<u64>().read(), 22);
        }
        assert_eq!(memory.row_ptr(1).as_ptr() as usize % 8, 0);
    }

    #[test]
    fn shrinking_is_ignored() {
        // Given
        let mut memory = RowMemory::new(4, 4);
        memory.grow_to(32).unwrap();

        // When
        memory.grow_to(8).unwrap();

        // Then
        assert_eq!(memory.capacity(), 32);
    }

    #[test]
    fn zero_stride_never_allocates() {
        // Given
        let mut memory = RowMemory::new(0, 1);

        // When
        memory.grow_to(1024).unwrap();

        // Then
        assert_eq!(memory.capacity(), 1024);
        assert_eq!(memory.row_ptr(0), memory.row_ptr(1023));
    }

    #[test]
    fn overflowing_growth_is_reported() {
        // Given
        let mut memory = RowMemory::new(1 << 20, 8);
        memory.grow_to(32).unwrap();

        // When
        let result = memory.grow_to(usize::MAX / 2);

        // Then - nothing changed
        assert!(matches!(result, Err(Error::OutOfMemory { .. })));
        assert_eq!(memory.capacity(), 32);
    }
}
