//! `Instance` (spec component C12): the process-scope owner of the device
//! manager and an optional debug endpoint.

use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use rt_hal::DeviceManager;

/// A process-wide debug endpoint an `Instance` may own, matching
/// `spec.md` §4.10's "optional `DebugServer`". Source-map pretty-printing
/// and bytecode disassembly are exposed through `rt_bytecode` directly; this
/// trait is the narrow seam an `Instance` uses to stop accepting events
/// before it tears down devices.
pub trait DebugServer: Send + Sync {
    /// Called once, before the owning `Instance`'s `DeviceManager` is
    /// dropped, so no further event can reference a device about to
    /// disappear.
    fn stop(&self);
}

/// Owns the `DeviceManager` (and, optionally, a `DebugServer`) for the
/// lifetime of the process. Not `Clone`: there is exactly one instance per
/// host application (`spec.md` §4.10, §5 "Global / process-wide state").
pub struct Instance {
    debug_server: Option<Box<dyn DebugServer>>,
    device_manager: DeviceManager,
    next_id: AtomicU32,
}

impl Instance {
    pub fn new() -> Instance {
        Instance {
            debug_server: None,
            device_manager: DeviceManager::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn with_debug_server(debug_server: Box<dyn DebugServer>) -> Instance {
        Instance {
            debug_server: Some(debug_server),
            device_manager: DeviceManager::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn device_manager(&self) -> &DeviceManager {
        &self.device_manager
    }

    /// Returns a strictly increasing process-wide id (`spec.md` §8,
    /// testable property 4); never returns the same value twice, even
    /// under concurrent calls.
    pub fn next_unique_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for Instance {
    fn default() -> Instance {
        Instance::new()
    }
}

/// Destruction order matches `spec.md` §4.10: the debug server stops
/// accepting events first, then the device manager (and through it, every
/// registered device) is dropped. Rust already drops fields in declaration
/// order, so this is also what `#[derive]`-style field order would give us;
/// spelled out explicitly because the ordering is a correctness requirement,
/// not an implementation detail.
impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(server) = self.debug_server.take() {
            server.stop();
        }
        debug!("instance shutting down, {} device(s) registered", self.device_manager.registered_devices().len());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn next_unique_id_is_strictly_increasing() {
        let instance = Instance::new();
        let a = instance.next_unique_id();
        let b = instance.next_unique_id();
        let c = instance.next_unique_id();
        assert!(a < b);
        assert!(b < c);
    }

    struct FlagServer(Arc<AtomicBool>);
    impl DebugServer for FlagServer {
        fn stop(&self) {
            self.0.store(true, AtomicOrdering::SeqCst);
        }
    }

    #[test]
    fn dropping_instance_stops_debug_server() {
        let stopped = Arc::new(AtomicBool::new(false));
        let instance = Instance::with_debug_server(Box::new(FlagServer(stopped.clone())));
        drop(instance);
        assert!(stopped.load(AtomicOrdering::SeqCst));
    }

    #[test]
    fn device_manager_is_reachable_through_instance() {
        let instance = Instance::new();
        assert!(instance.device_manager().registered_devices().is_empty());
    }
}
