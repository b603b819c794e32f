//! Driver (spec component C4, part two): enumerates and creates devices.

use rt_core::Result;

use crate::device::{Device, DeviceInfo};

/// Enumerates `DeviceInfo` records and creates devices, mirroring
/// `ocl_core`'s platform/device enumeration functions but generalized past
/// OpenCL to any backend this runtime can drive (host interpreter, or a
/// future real accelerator backend).
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn enumerate_available_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Creates this driver's default device (spec.md §4.3).
    fn create_default_device(&self) -> Result<Device>;

    fn create_device(&self, info: &DeviceInfo) -> Result<Device>;
}
