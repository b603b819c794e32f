//! `Buffer` and `BufferView` (spec component C2).
//!
//! Mirrors `ocl::standard::Buffer`'s shape (a cheap-to-clone handle wrapping
//! a reference-counted core object) but backs the bytes with a plain host
//! allocation rather than an OpenCL `cl_mem`, since this runtime's HAL
//! targets in-process device backends (§1: the interpreter host executable
//! backend) rather than a real accelerator driver.

use std::sync::Arc;

use parking_lot::RwLock;
use rt_core::{Error, ErrorBuilder, ErrorKind, Result, Shape, Type};

use crate::memory::{BufferUsage, MemoryType};

/// The length type used for buffer sizes and offsets, named to match
/// `spec.md`'s `device_size_t`.
pub type DeviceSize = u64;

struct BufferInner {
    bytes: RwLock<Vec<u8>>,
    memory_type: MemoryType,
    usage: BufferUsage,
    allocator_id: u64,
    device_id: Option<u64>,
    release: Arc<dyn Fn() + Send + Sync>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        (self.release)();
    }
}

/// An owned, reference-counted, byte-addressable memory region.
///
/// Cloning a `Buffer` clones the handle, not the bytes (`Arc` semantics);
/// the underlying allocation is released through its originating allocator
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Constructs a buffer of `size` zero-initialized bytes, tagged with the
    /// allocator and (optionally) device that own it.
    ///
    /// Called only by `Allocator` implementations; host code obtains
    /// buffers through [`crate::Allocator::allocate`].
    ///
    /// `release` is invoked exactly once, when the last clone of this
    /// buffer is dropped, so the minting allocator's outstanding count
    /// (`spec.md` §8, invariant 5) returns to its pre-allocation value
    /// without callers having to release anything by hand.
    pub(crate) fn new(
        size: DeviceSize,
        memory_type: MemoryType,
        usage: BufferUsage,
        allocator_id: u64,
        device_id: Option<u64>,
        release: Arc<dyn Fn() + Send + Sync>,
    ) -> Buffer {
        Buffer {
            inner: Arc::new(BufferInner {
                bytes: RwLock::new(vec![0u8; size as usize]),
                memory_type,
                usage,
                allocator_id,
                device_id,
                release,
            }),
        }
    }

    pub fn size(&self) -> DeviceSize {
        self.inner.bytes.read().len() as DeviceSize
    }

    pub fn memory_type(&self) -> MemoryType {
        self.inner.memory_type
    }

    pub fn usage(&self) -> BufferUsage {
        self.inner.usage
    }

    /// The id of the [`crate::Allocator`] that minted this buffer
    /// (spec.md §3: "a pointer to the Allocator that minted it, for release").
    pub fn allocator_id(&self) -> u64 {
        self.inner.allocator_id
    }

    /// The id of the owning [`crate::Device`], if any.
    pub fn device_id(&self) -> Option<u64> {
        self.inner.device_id
    }

    /// Number of live handles to this buffer, used by tests asserting the
    /// allocator's outstanding count returns to baseline after drop
    /// (`spec.md` §8, invariant 5).
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn read_bytes(&self) -> parking_lot::RwLockReadGuard<'_, Vec<u8>> {
        self.inner.bytes.read()
    }

    pub(crate) fn write_bytes(&self) -> parking_lot::RwLockWriteGuard<'_, Vec<u8>> {
        self.inner.bytes.write()
    }
}

/// A non-owning `(Buffer, element Type, Shape, byte-offset, byte-length)`
/// tuple. Multiple views may alias one buffer; the view itself places no
/// synchronization requirement beyond the usage flags at creation
/// (`spec.md` §3).
#[derive(Clone)]
pub struct BufferView {
    buffer: Buffer,
    element_type: Type,
    shape: Shape,
    byte_offset: usize,
    byte_length: usize,
}

impl BufferView {
    /// Builds a view over `buffer`, validating that `shape`'s element count
    /// times `element_type`'s size fits within `[byte_offset, byte_offset +
    /// byte_length)` and that range fits within the buffer.
    pub fn new(
        buffer: Buffer,
        element_type: Type,
        shape: Shape,
        byte_offset: usize,
        byte_length: usize,
    ) -> Result<BufferView> {
        let buf_len = buffer.size() as usize;
        if byte_offset.saturating_add(byte_length) > buf_len {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!(
                    "view range [{byte_offset}, {byte_offset}+{byte_length}) exceeds buffer of {buf_len} bytes"
                ))
                .build());
        }
        if element_type.is_builtin() {
            let expected = shape.element_count()? * element_type.element_size()?;
            if expected != byte_length {
                return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                    .with(format!(
                        "shape {shape} of {element_type} needs {expected} bytes, view declares {byte_length}"
                    ))
                    .build());
            }
        }
        Ok(BufferView {
            buffer,
            element_type,
            shape,
            byte_offset,
            byte_length,
        })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn element_type(&self) -> Type {
        self.element_type
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn element_count(&self) -> Result<usize> {
        self.shape.element_count()
    }

    /// Reads the view's region as a typed slice.
    ///
    /// # Panics
    /// Panics if `T`'s size doesn't match `element_type`'s declared size;
    /// callers must resolve the type-generic kernel specialization first
    /// (`spec.md` §4.7 type-dispatch), so a mismatch here is a dispatcher bug
    /// rather than a runtime input error.
    pub fn with_slice<T: Copy, R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        assert_eq!(std::mem::size_of::<T>(), self.element_type.element_size().unwrap_or(0));
        let bytes = self.buffer.read_bytes();
        let region = &bytes[self.byte_offset..self.byte_offset + self.byte_length];
        let ptr = region.as_ptr() as *const T;
        let len = self.byte_length / std::mem::size_of::<T>().max(1);
        // SAFETY: `ptr` is valid for `len * size_of::<T>()` bytes (checked by
        // `BufferView::new`), and `T: Copy` rules out any destructor running
        // over memory not actually holding `T` values laid out by our own
        // constant-materialization / kernel-output code.
        let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
        f(slice)
    }

    /// Mutably accesses the view's region as a typed slice. See
    /// [`BufferView::with_slice`] for the safety argument.
    pub fn with_slice_mut<T: Copy, R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        assert_eq!(std::mem::size_of::<T>(), self.element_type.element_size().unwrap_or(0));
        let mut bytes = self.buffer.write_bytes();
        let region = &mut bytes[self.byte_offset..self.byte_offset + self.byte_length];
        let ptr = region.as_mut_ptr() as *mut T;
        let len = self.byte_length / std::mem::size_of::<T>().max(1);
        let slice = unsafe { std::slice::from_raw_parts_mut(ptr, len) };
        f(slice)
    }

    /// Copies `T`-typed bytes into this view's backing region, asserting the
    /// lengths match exactly.
    pub fn copy_from_slice<T: Copy>(&self, src: &[T]) -> Result<()> {
        self.with_slice_mut::<T, Result<()>>(|dst| {
            if dst.len() != src.len() {
                return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                    .with(format!("length mismatch copying into view: {} vs {}", dst.len(), src.len()))
                    .build());
            }
            dst.copy_from_slice(src);
            Ok(())
        })
    }
}

impl std::fmt::Debug for BufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferView")
            .field("element_type", &self.element_type)
            .field("shape", &self.shape)
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}

/// Converts a buffer-release style error into the shared taxonomy; kept as
/// a free function so allocator backends can reuse it without importing
/// `rt_core::ErrorBuilder` directly.
pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
    ErrorBuilder::new(ErrorKind::InvalidArgument).with(message).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(len: usize) -> Buffer {
        Buffer::new(
            len as DeviceSize,
            MemoryType::host_only(),
            BufferUsage::TRANSFER,
            1,
            None,
            Arc::new(|| {}),
        )
    }

    #[test]
    fn view_rejects_mismatched_shape() {
        let buf = make_buffer(16);
        let err = BufferView::new(buf, Type::I32, Shape::new(vec![5]), 0, 16);
        assert!(err.is_err());
    }

    #[test]
    fn view_rejects_out_of_range() {
        let buf = make_buffer(16);
        let err = BufferView::new(buf, Type::I32, Shape::new(vec![4]), 8, 16);
        assert!(err.is_err());
    }

    #[test]
    fn roundtrip_typed_write_and_read() {
        let buf = make_buffer(16);
        let view = BufferView::new(buf, Type::I32, Shape::new(vec![4]), 0, 16).unwrap();
        view.copy_from_slice(&[1i32, 2, 3, 4]).unwrap();
        view.with_slice::<i32, _>(|s| assert_eq!(s, &[1, 2, 3, 4]));
    }

    #[test]
    fn strong_count_drops_to_one_after_view_dropped() {
        let buf = make_buffer(4);
        assert_eq!(buf.strong_count(), 1);
        {
            let view = BufferView::new(buf.clone(), Type::I8, Shape::new(vec![4]), 0, 4).unwrap();
            assert_eq!(buf.strong_count(), 2);
            drop(view);
        }
        assert_eq!(buf.strong_count(), 1);
    }
}
