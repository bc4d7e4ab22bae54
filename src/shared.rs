use std::marker::PhantomData;

/// Mutable slice handed to the workers of one colored or sliced pass.
///
/// The schedule, not the type system, guarantees that no element is reached
/// by two workers at once.
pub(crate) struct SharedSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for SharedSlice<'_, T> {}
unsafe impl<T: Send> Sync for SharedSlice<'_, T> {}

impl<T> Clone for SharedSlice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SharedSlice<'_, T> {}

impl<'a, T> SharedSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// No other reference to element `idx` may be alive while the returned one is.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, idx: usize) -> &'a mut T {
        assert!(idx < self.len, "index {idx} out of bounds for {}", self.len);
        unsafe { &mut *self.ptr.add(idx) }
    }
}
