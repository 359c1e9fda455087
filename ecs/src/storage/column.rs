use std::{
    alloc::{self, Layout},
    any::TypeId,
    ptr::NonNull,
};

use crate::{
    component::{self, Component},
    storage::cell::Cell,
};

/// A fixed-capacity, type-erased column of uniform-sized elements.
///
/// A column owns one contiguous allocation sized for the chunk capacity at construction
/// and never grows; chunks are the unit of growth instead. Elements are stored without
/// compile-time type information and downcast where the type is known from context.
///
/// Zero-sized element layouts (tag components) allocate nothing at all: the column is
/// then purely a length counter, which is what makes tags membership-only markers.
///
/// # Safety
/// This structure maintains the following invariants:
/// - `data` points to a valid allocation when `capacity * size > 0`
/// - `len <= capacity`
/// - All elements in `[0..len)` are initialized, except transiently inside the
///   swap-removal and migration paths which restore the invariant before returning
/// - The layout used matches the actual element type
pub struct Column {
    /// Raw pointer to the start of the allocated memory.
    data: NonNull<u8>,

    /// Maximum number of elements the allocation can hold.
    capacity: usize,

    /// Number of initialized elements.
    len: usize,

    /// Info about the element type (layout, drop function, type id).
    info: component::Info,
}

impl Column {
    /// Create a new column for the given component info with a fixed element capacity.
    pub fn with_capacity(info: component::Info, capacity: usize) -> Self {
        let byte_size = info.layout().size() * capacity;
        let data = if byte_size == 0 {
            // Zero-sized storage is represented by an aligned dangling pointer.
            NonNull::new(info.layout().align() as *mut u8).expect("alignment is non-zero")
        } else {
            let layout = Layout::from_size_align(byte_size, info.layout().align())
                .expect("layout overflow");
            let ptr = unsafe { alloc::alloc(layout) };
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            NonNull::new(ptr).expect("allocation returned null")
        };

        Self {
            data,
            capacity,
            len: 0,
            info,
        }
    }

    /// Get the column info.
    #[inline]
    pub fn info(&self) -> &component::Info {
        &self.info
    }

    /// Get the number of initialized elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the column is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the fixed element capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a pointer to the element at the given row.
    #[inline]
    pub(crate) fn ptr_at(&self, row: usize) -> NonNull<u8> {
        debug_assert!(
            row < self.capacity,
            "row {} out of bounds (capacity: {})",
            row,
            self.capacity
        );
        // SAFETY: row < capacity keeps the offset within (or one past) the allocation,
        // and a dangling base is only used with a zero element size (offset 0).
        unsafe {
            NonNull::new_unchecked(self.data.as_ptr().add(row * self.info.layout().size()))
        }
    }

    /// Set the number of initialized elements.
    ///
    /// # Safety
    /// - `new_len` must be less than or equal to `capacity()`
    /// - All elements in `[0..new_len)` must be initialized
    #[inline]
    pub(crate) unsafe fn set_len(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.capacity,
            "new_len ({}) exceeds capacity ({})",
            new_len,
            self.capacity
        );
        self.len = new_len;
    }

    /// Write a value into the column at the given row.
    ///
    /// This writes to reserved but potentially uninitialized memory; the caller marks
    /// rows initialized afterwards via `set_len`.
    ///
    /// # Panics
    /// Panics if the type `C` does not match the column's component type.
    ///
    /// # Safety
    /// The caller must ensure `row < capacity()` and that any previous value at the row
    /// has been moved out or dropped.
    pub(crate) unsafe fn write<C: Component>(&mut self, row: usize, value: C) {
        self.ensure_type::<C>();
        debug_assert!(row < self.capacity, "row out of bounds");

        // SAFETY: The pointer is in bounds and properly aligned for C; the caller
        // guarantees the slot holds no live value.
        unsafe {
            self.ptr_at(row).as_ptr().cast::<C>().write(value);
        }
    }

    /// Get a reference to the element at the given row.
    ///
    /// Returns `None` if the row is not initialized (>= len).
    ///
    /// # Panics
    /// Panics if the type `C` does not match the column's component type.
    pub fn get<C: Component>(&self, row: usize) -> Option<&C> {
        if row >= self.len {
            return None;
        }
        Some(self.cell(row).as_ref())
    }

    /// Get a mutable reference to the element at the given row.
    ///
    /// Returns `None` if the row is not initialized (>= len).
    ///
    /// # Panics
    /// Panics if the type `C` does not match the column's component type.
    pub fn get_mut<C: Component>(&mut self, row: usize) -> Option<&mut C> {
        self.ensure_type::<C>();
        if row >= self.len {
            return None;
        }
        // SAFETY: The row is initialized and the type was just validated; &mut self
        // guarantees exclusivity.
        unsafe { Some(&mut *self.ptr_at(row).as_ptr().cast::<C>()) }
    }

    /// Drop the old value at the row in place and write a replacement.
    ///
    /// # Panics
    /// Panics if the type `C` does not match the column's component type.
    ///
    /// # Safety
    /// The caller must ensure `row < len()` (the slot holds a live value).
    pub(crate) unsafe fn replace<C: Component>(&mut self, row: usize, value: C) {
        self.ensure_type::<C>();
        debug_assert!(row < self.len, "row out of bounds");
        // SAFETY: The row holds an initialized value of the column's type.
        unsafe {
            (self.info.drop_fn())(self.ptr_at(row));
            self.ptr_at(row).as_ptr().cast::<C>().write(value);
        }
    }

    /// View the raw bytes of the element at the given row.
    ///
    /// Used by archetype migration to move values between columns without dropping them.
    ///
    /// # Safety
    /// The caller must ensure the row holds an initialized value.
    pub(crate) unsafe fn read_bytes(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.capacity, "row out of bounds");
        // SAFETY: In-bounds pointer; the caller guarantees initialization.
        unsafe {
            std::slice::from_raw_parts(self.ptr_at(row).as_ptr(), self.info.layout().size())
        }
    }

    /// Copy raw bytes into the element slot at the given row, without dropping anything.
    ///
    /// The byte length must match the element size. The source value must be forgotten
    /// by the caller (the bytes represent a move, not a clone).
    ///
    /// # Safety
    /// The caller must ensure `row < capacity()`, that `bytes` is a valid bit pattern of
    /// the column's element type, and that the destination slot holds no live value.
    pub(crate) unsafe fn write_bytes(&mut self, row: usize, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.info.layout().size(), "byte length mismatch");
        // SAFETY: In-bounds destination, non-overlapping with the borrowed source slice.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr_at(row).as_ptr(), bytes.len());
        }
    }

    /// Move the element bytes from one row to another within this column. The source
    /// slot is left logically uninitialized; nothing is dropped.
    ///
    /// # Safety
    /// The caller must ensure both rows are in capacity, the source holds a live value,
    /// and the destination holds none.
    pub(crate) unsafe fn move_row(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        // SAFETY: Distinct in-bounds rows cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr_at(src).as_ptr(),
                self.ptr_at(dst).as_ptr(),
                self.info.layout().size(),
            );
        }
    }

    /// Drop the value at the given row in place, leaving the slot uninitialized.
    ///
    /// # Safety
    /// The caller must ensure the row holds an initialized value and must restore the
    /// initialization invariant (refill the slot or shrink the length) before any other
    /// access.
    pub(crate) unsafe fn drop_at(&mut self, row: usize) {
        debug_assert!(row < self.len, "row out of bounds");
        // SAFETY: The row holds an initialized value of the column's type.
        unsafe {
            (self.info.drop_fn())(self.ptr_at(row));
        }
    }

    /// Get a cell for the given row.
    pub fn cell(&self, row: usize) -> Cell<'_> {
        debug_assert!(row < self.len, "invalid row index");
        Cell::new(self.ptr_at(row), &self.info)
    }

    /// Clear all elements from the column, calling their destructors.
    pub(crate) fn clear(&mut self) {
        for row in 0..self.len {
            // SAFETY: Every row below len is initialized.
            unsafe {
                (self.info.drop_fn())(self.ptr_at(row));
            }
        }
        self.len = 0;
    }

    /// Rebind an empty, shape-compatible column to a different component type.
    ///
    /// Used by the chunk pool when lending a recycled chunk to a new archetype: the
    /// allocation is reused, only the element metadata changes.
    ///
    /// # Panics
    /// Panics if the column still holds elements or the layouts differ.
    pub(crate) fn rebind(&mut self, info: component::Info) {
        assert!(self.is_empty(), "cannot rebind a non-empty column");
        assert_eq!(
            self.info.layout(),
            info.layout(),
            "cannot rebind a column to a different layout"
        );
        self.info = info;
    }

    /// Ensure the type `C` is valid for this column.
    ///
    /// # Panics
    /// Panics if the TypeId of `C` does not match the column's stored type.
    #[inline]
    pub(crate) fn ensure_type<C: Component>(&self) {
        assert!(
            TypeId::of::<C>() == self.info.type_id(),
            "type mismatch: attempted to use type {} with a column storing `{}`",
            std::any::type_name::<C>(),
            self.info.type_name(),
        );
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        // Drop all live elements, then release the allocation.
        self.clear();
        let byte_size = self.info.layout().size() * self.capacity;
        if byte_size > 0 {
            let layout = Layout::from_size_align(byte_size, self.info.layout().align())
                .expect("layout overflow");
            // SAFETY: data was allocated with exactly this layout in with_capacity.
            unsafe {
                alloc::dealloc(self.data.as_ptr(), layout);
            }
        }
    }
}

// SAFETY: Column owns its allocation outright and exposes no interior mutability; the
// Component bound (Send + Sync) covers every element type it can hold.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}
