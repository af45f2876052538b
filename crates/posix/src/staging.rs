//! Staging buffers for pointer-taking primitives
//!
//! Calls such as `clock_gettime` or `sched_getaffinity` write through a raw
//! pointer. A [`StagingBuffer`] is a small block obtained from the backend's
//! own `malloc`, zero-filled on creation and freed on drop, so every exit
//! path releases it. Reads and writes are bounds-checked and typed; the raw
//! pointer is only handed to the backend call being staged.

use std::fmt;
use std::ptr::NonNull;

use libc::c_void;
use tracing::warn;

use crate::backend::RawBackend;
use crate::error::{PosixError, PosixResult};

/// Backend-allocated, zero-initialized scratch memory
pub struct StagingBuffer<'a> {
    backend: &'a dyn RawBackend,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'a> StagingBuffer<'a> {
    /// Allocate `len` zeroed bytes through `backend`
    pub fn new(backend: &'a dyn RawBackend, len: usize) -> PosixResult<Self> {
        let raw = backend.malloc(len.max(1))?;
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or_else(|| PosixError::native_failure("malloc", libc::ENOMEM))?;
        // SAFETY: `ptr` was just allocated with room for at least `len` bytes
        unsafe { ptr.as_ptr().write_bytes(0, len) };
        Ok(Self { backend, ptr, len })
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length buffer
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer for read-only staging
    pub fn as_ptr(&self) -> *const c_void {
        self.ptr.as_ptr().cast()
    }

    /// Pointer for a primitive that fills the buffer
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// Contents as bytes
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block is owned, initialized on creation and `len` long
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Contents as mutable bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `bytes` in at `offset`
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> PosixResult<()> {
        self.range_mut(offset, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Read a native-endian signed integer of `width` bytes (4 or 8)
    pub fn read_signed(&self, offset: usize, width: usize) -> PosixResult<i64> {
        let bytes = self.range(offset, width)?;
        match width {
            4 => Ok(i64::from(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
            8 => {
                let mut raw = [0_u8; 8];
                raw.copy_from_slice(bytes);
                Ok(i64::from_ne_bytes(raw))
            }
            other => Err(PosixError::invalid_argument(format!("unsupported integer width {other}"))),
        }
    }

    fn range(&self, offset: usize, width: usize) -> PosixResult<&[u8]> {
        let end = self.checked_end(offset, width)?;
        Ok(&self.as_slice()[offset..end])
    }

    fn range_mut(&mut self, offset: usize, width: usize) -> PosixResult<&mut [u8]> {
        let end = self.checked_end(offset, width)?;
        Ok(&mut self.as_mut_slice()[offset..end])
    }

    fn checked_end(&self, offset: usize, width: usize) -> PosixResult<usize> {
        offset
            .checked_add(width)
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                PosixError::invalid_argument(format!(
                    "{width} bytes at offset {offset} exceed staging buffer of {}",
                    self.len
                ))
            })
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from this backend's malloc and is freed exactly once here
        if let Err(err) = unsafe { self.backend.free(self.ptr.as_ptr().cast()) } {
            warn!(error = %err, len = self.len, "staging buffer could not be freed");
        }
    }
}

impl fmt::Debug for StagingBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Size of a struct field, for decoding native structs by layout
pub(crate) fn field_width<S, T>(_field: impl Fn(&S) -> &T) -> usize {
    std::mem::size_of::<T>()
}
