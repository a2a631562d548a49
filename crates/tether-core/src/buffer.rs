//! Move-only byte buffer used for every payload that crosses the boundary.
//!
//! A `Buffer` either owns its allocation (created with [`Buffer::create`]) or
//! is a non-owning view into memory held elsewhere ([`Buffer::from_borrowed`]).
//! Owned memory is released exactly once: `release()` frees it and resets the
//! buffer to the empty, non-owned state, so a second call is a no-op. `Drop`
//! calls `release()`.
//!
//! The lifetime parameter ties a borrowed view to its source. Owned buffers
//! are `Buffer<'static>`.

use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::str::Utf8Error;

#[repr(C)]
pub struct Buffer<'a> {
    data: *mut u8,
    len: usize,
    owned: bool,
    _source: PhantomData<&'a [u8]>,
}

// An owned Buffer behaves like `Box<[u8]>` and a borrowed one like `&[u8]`.
unsafe impl Send for Buffer<'_> {}
unsafe impl Sync for Buffer<'_> {}

impl Buffer<'static> {
    /// Allocate `size` zeroed bytes owned by this buffer.
    ///
    /// Returns the empty, non-owned buffer when `size` is zero or the
    /// allocation fails. Check [`Buffer::is_empty`] before use.
    pub fn create(size: usize) -> Self {
        if size == 0 {
            return Self::empty();
        }

        let Ok(layout) = Layout::array::<u8>(size) else {
            return Self::empty();
        };

        let data = unsafe { alloc::alloc_zeroed(layout) };
        if data.is_null() {
            return Self::empty();
        }

        Self {
            data,
            len: size,
            owned: true,
            _source: PhantomData,
        }
    }

    /// Allocate an owned copy of `bytes`.
    pub fn copy_from(bytes: &[u8]) -> Self {
        let mut buffer = Self::create(bytes.len());
        if let Some(target) = buffer.as_mut_slice() {
            target.copy_from_slice(bytes);
        }
        buffer
    }
}

impl<'a> Buffer<'a> {
    /// The canonical "absent" buffer: no data, not owned.
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
            owned: false,
            _source: PhantomData,
        }
    }

    /// Wrap memory owned elsewhere. Nothing is allocated and the view is
    /// never freed by this buffer.
    pub fn from_borrowed(view: &'a [u8]) -> Self {
        Self {
            data: view.as_ptr().cast_mut(),
            len: view.len(),
            owned: false,
            _source: PhantomData,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_null() || self.len == 0
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn len(&self) -> usize {
        if self.data.is_null() { 0 } else { self.len }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.is_empty() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    /// Mutable access, only for buffers that own their memory.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.owned || self.is_empty() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(self.data, self.len) })
    }

    /// Copy the bytes into storage owned by the receiver (the native payload
    /// conversion). The buffer itself is left untouched.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.as_slice())
    }

    /// Move the payload out, leaving this buffer empty and non-owned.
    pub fn take(&mut self) -> Buffer<'a> {
        std::mem::take(self)
    }

    /// Free the backing allocation if owned, then clear the buffer.
    pub fn release(&mut self) {
        if self.owned && !self.data.is_null() {
            if let Ok(layout) = Layout::array::<u8>(self.len) {
                unsafe { alloc::dealloc(self.data, layout) };
            }
        }

        self.data = std::ptr::null_mut();
        self.len = 0;
        self.owned = false;
    }
}

impl Default for Buffer<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Buffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("owned", &self.owned)
            .finish()
    }
}

impl PartialEq for Buffer<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<'a> From<&'a [u8]> for Buffer<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self::from_borrowed(value)
    }
}

impl<'a> From<&'a Vec<u8>> for Buffer<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Self::from_borrowed(value.as_slice())
    }
}

impl<'a> From<&'a str> for Buffer<'a> {
    fn from(value: &'a str) -> Self {
        Self::from_borrowed(value.as_bytes())
    }
}

impl From<&Buffer<'_>> for Vec<u8> {
    fn from(value: &Buffer<'_>) -> Self {
        value.to_vec()
    }
}

impl TryFrom<&Buffer<'_>> for String {
    type Error = Utf8Error;

    fn try_from(value: &Buffer<'_>) -> Result<Self, Self::Error> {
        value.to_str().map(str::to_owned)
    }
}
