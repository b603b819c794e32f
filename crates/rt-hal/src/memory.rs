//! Buffer memory/usage bitfields (`spec.md` §3).
//!
//! Mirrors `ocl_core::{DeviceType, MemFlags}`: a `bitflags!`-backed newtype
//! over a machine word, with a handful of convenience combinators.

use bitflags::bitflags;

bitflags! {
    /// Where a buffer's bytes live and how they may be accessed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryType: u32 {
        const HOST_LOCAL     = 0b0000_0001;
        const DEVICE_LOCAL   = 0b0000_0010;
        const DEVICE_VISIBLE = 0b0000_0100;
        const HOST_VISIBLE   = 0b0000_1000;
        const HOST_COHERENT  = 0b0001_0000;
        const HOST_CACHED    = 0b0010_0000;
    }
}

impl MemoryType {
    /// Host memory visible only to the host (the fallback allocation kind
    /// used by `TryAllocateDeviceVisibleBuffer` when no device-visible
    /// memory is available).
    pub fn host_only() -> MemoryType {
        MemoryType::HOST_LOCAL | MemoryType::HOST_VISIBLE | MemoryType::HOST_COHERENT
    }

    /// True if buffers of this memory type are usable directly by a device
    /// (either resident on it, or visible to it without a copy).
    pub fn is_device_accessible(self) -> bool {
        self.intersects(MemoryType::DEVICE_LOCAL | MemoryType::DEVICE_VISIBLE)
    }

    /// True if the host may read/write this memory without an explicit
    /// transfer.
    pub fn is_host_accessible(self) -> bool {
        self.contains(MemoryType::HOST_VISIBLE)
    }
}

bitflags! {
    /// Declares the operations a buffer will be used for, matching the
    /// closed set named in `spec.md` §3 plus the handful an allocator
    /// needs to make residency decisions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER = 0b0000_0001;
        const MAPPING  = 0b0000_0010;
        const DISPATCH = 0b0000_0100;
        const CONSTANT = 0b0000_1000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_only_is_host_accessible_not_device_accessible() {
        let mt = MemoryType::host_only();
        assert!(mt.is_host_accessible());
        assert!(!mt.is_device_accessible());
    }

    #[test]
    fn device_local_is_device_accessible() {
        assert!(MemoryType::DEVICE_LOCAL.is_device_accessible());
        assert!(MemoryType::DEVICE_VISIBLE.is_device_accessible());
    }
}
