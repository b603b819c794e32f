//! Allocator (spec component C3).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::buffer::{Buffer, DeviceSize};
use crate::memory::{BufferUsage, MemoryType};

/// Produces buffers satisfying a memory/usage requirement.
///
/// Mirrors `ocl`'s implicit per-context allocation path (`Buffer::builder()`
/// going through a `Context`), made explicit and testable as its own trait
/// since this runtime's HAL has no single "the" context object.
pub trait Allocator: Send + Sync {
    /// A stable id used by [`Buffer::allocator_id`] and by
    /// [`Allocator::can_use_buffer_like`] to recognize buffers it minted.
    fn id(&self) -> u64;

    /// Allocates `size` bytes satisfying `memory_type`/`usage`.
    fn allocate(&self, memory_type: MemoryType, usage: BufferUsage, size: DeviceSize) -> Result<Buffer>;

    /// Whether a buffer minted by `src_allocator` with `src_memory`/
    /// `src_usage` could stand in for a buffer this allocator would produce
    /// for `intended_usage`, avoiding an unnecessary copy.
    fn can_use_buffer_like(
        &self,
        src_allocator: &dyn Allocator,
        src_memory: MemoryType,
        src_usage: BufferUsage,
        intended_usage: BufferUsage,
    ) -> bool;

    /// Number of buffers currently outstanding (not yet dropped), used by
    /// the allocate/use/drop invariant test in `spec.md` §8.
    fn outstanding_count(&self) -> usize;
}

/// The simplest allocator: plain host memory, usable by the interpreter
/// backend and by any device as a safe fallback.
pub struct HostAllocator {
    id: u64,
    outstanding: Arc<AtomicUsize>,
}

impl HostAllocator {
    pub fn new(id: u64) -> HostAllocator {
        HostAllocator {
            id,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Allocator for HostAllocator {
    fn id(&self) -> u64 {
        self.id
    }

    fn allocate(&self, memory_type: MemoryType, usage: BufferUsage, size: DeviceSize) -> Result<Buffer> {
        if !memory_type.is_host_accessible() {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with("HostAllocator can only satisfy host-accessible memory types".to_string())
                .build());
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.outstanding.clone();
        let release: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            outstanding.fetch_sub(1, Ordering::SeqCst);
        });
        Ok(Buffer::new(size, memory_type, usage, self.id, None, release))
    }

    fn can_use_buffer_like(
        &self,
        src_allocator: &dyn Allocator,
        src_memory: MemoryType,
        _src_usage: BufferUsage,
        _intended_usage: BufferUsage,
    ) -> bool {
        src_allocator.id() == self.id || src_memory.is_host_accessible()
    }

    fn outstanding_count(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_release_returns_outstanding_to_baseline() {
        let alloc = HostAllocator::new(1);
        assert_eq!(alloc.outstanding_count(), 0);
        let buf = alloc
            .allocate(MemoryType::host_only(), BufferUsage::TRANSFER, 16)
            .unwrap();
        assert_eq!(alloc.outstanding_count(), 1);
        drop(buf);
        assert_eq!(alloc.outstanding_count(), 0);
    }

    #[test]
    fn rejects_non_host_accessible_memory() {
        let alloc = HostAllocator::new(1);
        let err = alloc.allocate(MemoryType::DEVICE_LOCAL, BufferUsage::TRANSFER, 16);
        assert!(err.is_err());
    }
}
